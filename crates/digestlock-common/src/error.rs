//! Unified error types for the digestlock workspace.
//!
//! Every pipeline stage reports failures through [`DigestlockError`]. The
//! first fatal error of an invocation cancels all sibling tasks and is the
//! single error surfaced to the caller.

use std::path::PathBuf;

use thiserror::Error;

/// Top-level error type shared across the workspace.
#[derive(Debug, Error)]
pub enum DigestlockError {
    /// An I/O operation failed.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path where the I/O error occurred.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// A configuration value is invalid.
    #[error("invalid configuration: {message}")]
    Config {
        /// Description of the invalid configuration.
        message: String,
    },

    /// A discovered path resolves outside the base directory.
    #[error("{path} is outside the base directory {base_dir}")]
    OutsideBaseDir {
        /// Offending path.
        path: PathBuf,
        /// Base directory that must contain every path.
        base_dir: PathBuf,
    },

    /// A glob pattern is malformed or could not be expanded.
    #[error("glob pattern {pattern:?} failed: {message}")]
    Glob {
        /// Pattern as supplied by the caller.
        pattern: String,
        /// Description of the failure.
        message: String,
    },

    /// A file could not be interpreted as its declared format.
    #[error("failed to parse {path}: {message}")]
    Parse {
        /// File being parsed.
        path: PathBuf,
        /// Description of the parse failure.
        message: String,
    },

    /// A YAML document could not be decoded or encoded.
    #[error("YAML error in {path}: {source}")]
    Yaml {
        /// File being processed.
        path: PathBuf,
        /// Underlying YAML error.
        source: serde_yaml::Error,
    },

    /// The injected resolver could not produce a digest.
    #[error("failed to resolve digest for {name}:{tag}: {message}")]
    Resolve {
        /// Image name.
        name: String,
        /// Image tag.
        tag: String,
        /// Description of the failure.
        message: String,
    },

    /// A file contains a different number of image slots than targets supplied.
    #[error("{path} has {actual} image slot(s) but {expected} target image(s) were supplied")]
    SlotMismatch {
        /// File being rewritten.
        path: PathBuf,
        /// Number of target images.
        expected: usize,
        /// Number of slots found in the file.
        actual: usize,
    },

    /// Target images disagree with each other or with the file contents.
    #[error("inconsistent images: {message}")]
    Consistency {
        /// Description of the inconsistency.
        message: String,
    },

    /// Serialization or deserialization of the lockfile failed.
    #[error("serialization error: {source}")]
    Serialization {
        /// Underlying serialization error.
        #[from]
        source: serde_json::Error,
    },

    /// The pipeline was cancelled before this task could finish.
    #[error("operation cancelled")]
    Cancelled,

    /// A spawned task panicked or was aborted.
    #[error("task failed: {message}")]
    Join {
        /// Description of the join failure.
        message: String,
    },
}

impl DigestlockError {
    /// Wraps an I/O error with the path it occurred at.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Builds a parse error for the given file.
    pub fn parse(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Parse {
            path: path.into(),
            message: message.into(),
        }
    }
}

impl From<tokio::task::JoinError> for DigestlockError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::Join {
            message: err.to_string(),
        }
    }
}

/// Convenience alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, DigestlockError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slot_mismatch_message_names_counts() {
        let err = DigestlockError::SlotMismatch {
            path: PathBuf::from("Dockerfile"),
            expected: 2,
            actual: 3,
        };
        let msg = err.to_string();
        assert!(msg.contains("Dockerfile"));
        assert!(msg.contains('3'));
        assert!(msg.contains('2'));
    }

    #[test]
    fn outside_base_dir_message_names_both_paths() {
        let err = DigestlockError::OutsideBaseDir {
            path: PathBuf::from("../Dockerfile"),
            base_dir: PathBuf::from("project"),
        };
        assert_eq!(
            err.to_string(),
            "../Dockerfile is outside the base directory project"
        );
    }
}
