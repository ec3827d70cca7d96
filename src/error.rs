//! Error types for dkrcache
//!
//! All modules use `DkrResult<T>` as their return type. Errors raised by the
//! wrapped task are never represented here: they travel inside an
//! [`Outcome`](crate::outcome::Outcome) and are handed back to the caller.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for dkrcache operations
pub type DkrResult<T> = Result<T, DkrError>;

/// All infrastructure errors that can occur in dkrcache
#[derive(Error, Debug)]
pub enum DkrError {
    // Builder errors
    #[error("Image build failed for target {target}: {output}")]
    BuildFailed { target: String, output: String },

    #[error("Builder did not write an image id to {0}")]
    MissingImageId(PathBuf),

    #[error("Hit-check build succeeded after the listener answered {requests} request(s)")]
    InconsistentProbe { requests: usize },

    #[error("Failed to run stored image {image}: {stderr}")]
    ImageRun { image: String, stderr: String },

    #[error("Unreadable cache usage listing: {0}")]
    CacheUsageParse(String),

    // Listener errors
    #[error("Listener on port {port} failed: {source}")]
    Listener {
        port: u16,
        #[source]
        source: std::io::Error,
    },

    // Outcome errors
    #[error("Failed to serialize outcome: {0}")]
    OutcomeSerialize(#[source] rmp_serde::encode::Error),

    #[error("Stored outcome in image {image} is unreadable: {source}")]
    OutcomeDeserialize {
        image: String,
        #[source]
        source: rmp_serde::decode::Error,
    },

    // Configuration errors
    #[error("Invalid configuration at {path}: {reason}")]
    ConfigInvalid { path: PathBuf, reason: String },

    // IO errors
    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    // Process errors
    #[error("Command failed: {command}")]
    CommandFailed {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Command execution error: {command}, stderr: {stderr}")]
    CommandExecution { command: String, stderr: String },

    // General errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl DkrError {
    /// Create an IO error with context
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Create a command failed error
    pub fn command_failed(command: impl Into<String>, source: std::io::Error) -> Self {
        Self::CommandFailed {
            command: command.into(),
            source,
        }
    }

    /// Create a command execution error
    pub fn command_exec(command: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self::CommandExecution {
            command: command.into(),
            stderr: stderr.into(),
        }
    }

    /// Get actionable hint for the error
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::CommandFailed { .. } => {
                Some("Is docker installed? Set [builder] program in config.toml otherwise")
            }
            Self::BuildFailed { .. } => {
                Some("Check that the docker daemon is running and supports host networking")
            }
            Self::CacheUsageParse(_) => {
                Some("dkrcache needs the buildx plugin: docker buildx version")
            }
            Self::OutcomeDeserialize { .. } => {
                Some("Remove the stored image with `docker rmi <image>`, the next run recomputes it")
            }
            _ => None,
        }
    }
}
