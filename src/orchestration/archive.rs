//! Build context archiving
//!
//! The builder receives a tar stream holding `Dockerfile` and the caller's
//! directory tree under `context/`. Symlinks are followed, so a link inside
//! the context pulls its target into the archive.

use crate::error::{DkrError, DkrResult};
use std::io::Write;
use std::path::Path;

/// Archive entry the context tree is stored under
pub const CONTEXT_DIR: &str = "context";

/// Write the tar archive for a build into `writer` and return it once the
/// archive is complete.
///
/// Blocking; call from `spawn_blocking` in async code.
pub fn write_context<W: Write>(writer: W, dockerfile: &str, context: &Path) -> DkrResult<W> {
    let mut builder = tar::Builder::new(writer);
    builder.follow_symlinks(true);

    let mut header = tar::Header::new_gnu();
    header.set_size(dockerfile.len() as u64);
    header.set_mode(0o644);
    header.set_mtime(0);
    header.set_cksum();
    builder
        .append_data(&mut header, "Dockerfile", dockerfile.as_bytes())
        .map_err(|e| DkrError::io("archiving Dockerfile", e))?;

    builder
        .append_dir_all(CONTEXT_DIR, context)
        .map_err(|e| DkrError::io(format!("archiving context {}", context.display()), e))?;

    builder
        .into_inner()
        .map_err(|e| DkrError::io("finishing context archive", e))
}

/// The build archive as bytes
pub fn archive_context(dockerfile: &str, context: &Path) -> DkrResult<Vec<u8>> {
    write_context(Vec::new(), dockerfile, context)
}
