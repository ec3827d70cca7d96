//! Builder shared types
//!
//! Contains data structures exchanged with image builders.
//! The actual execution logic is in the builder implementations.

use std::path::PathBuf;

/// A single build invocation
#[derive(Debug, Clone)]
pub struct BuildRequest {
    /// Directory presented to the build as `context/`
    pub context: PathBuf,
    /// Dockerfile text
    pub dockerfile: String,
    /// Stage to stop at, or the final stage when `None`
    pub target: Option<String>,
    /// Build arguments (name, value)
    pub build_args: Vec<(String, String)>,
    /// File the builder writes the resulting image id to
    pub iidfile: Option<PathBuf>,
}

impl BuildRequest {
    pub fn build_arg(&self, name: &str) -> Option<&str> {
        self.build_args
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// Display name of the target stage
    pub fn target_name(&self) -> &str {
        self.target.as_deref().unwrap_or("final")
    }
}

/// Result of a build that the builder managed to run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildReport {
    pub success: bool,
    /// Tail of the combined build output
    pub output: String,
}

impl BuildReport {
    pub fn succeeded() -> Self {
        Self {
            success: true,
            output: String::new(),
        }
    }

    pub fn failed(output: impl Into<String>) -> Self {
        Self {
            success: false,
            output: output.into(),
        }
    }
}

/// One entry of the builder's cache usage listing
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheRecord {
    /// Cache record id
    pub id: String,
    /// Instruction that produced the record
    pub description: String,
    /// Whether the record is still referenced by another record or image
    pub shared: bool,
}
