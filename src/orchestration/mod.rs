//! Image builder orchestration
//!
//! Provides the narrow builder interface the cache needs:
//! - build a Dockerfile stage from an archived context
//! - run an image and capture its output
//! - remove images and prune individual build cache records

pub mod archive;
mod docker;
mod runtime;
pub mod types;
pub mod usage;

pub use docker::DockerBuilder;
pub use runtime::ImageBuilder;
pub use types::{BuildReport, BuildRequest, CacheRecord};

/// Max number of output lines to include in build error messages.
const BUILD_ERROR_TAIL_LINES: usize = 50;

/// Extract the useful tail of build output for error diagnostics.
///
/// Combines stdout and stderr, then returns the last `BUILD_ERROR_TAIL_LINES`
/// lines so error messages are actionable without being overwhelming.
pub(crate) fn build_error_output(stdout: &str, stderr: &str) -> String {
    let lines: Vec<&str> = stdout.lines().chain(stderr.lines()).collect();
    let total = lines.len();
    let tail: Vec<&str> = if total > BUILD_ERROR_TAIL_LINES {
        lines[total - BUILD_ERROR_TAIL_LINES..].to_vec()
    } else {
        lines
    };
    tail.join("\n")
}
