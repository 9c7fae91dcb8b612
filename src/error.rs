use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors a pipeline stage can surface to the task graph.
///
/// Every stage is all-or-nothing: any of these aborts the stage, and the
/// graph runner decides whether to retry it or skip its dependents.
#[derive(Debug, Error)]
pub enum StageError {
    /// A required input file is missing, unreadable, or fails to parse
    /// under the expected format.
    #[error("stage input {}: {}", .path.display(), .message)]
    Input { path: PathBuf, message: String },

    /// Data does not conform to the expected column set, order, or shape.
    #[error("schema mismatch in {}: {}", .path.display(), .message)]
    SchemaMismatch { path: PathBuf, message: String },

    /// The destination is unwritable or another filesystem fault occurred.
    #[error("environment error at {}: {}", .path.display(), .message)]
    Environment { path: PathBuf, message: String },
}

impl StageError {
    pub fn input(path: impl AsRef<Path>, message: impl Into<String>) -> Self {
        StageError::Input {
            path: path.as_ref().to_path_buf(),
            message: message.into(),
        }
    }

    pub fn schema_mismatch(path: impl AsRef<Path>, message: impl Into<String>) -> Self {
        StageError::SchemaMismatch {
            path: path.as_ref().to_path_buf(),
            message: message.into(),
        }
    }

    pub fn environment(path: impl AsRef<Path>, message: impl Into<String>) -> Self {
        StageError::Environment {
            path: path.as_ref().to_path_buf(),
            message: message.into(),
        }
    }
}

/// Result type for stage callables.
pub type StageResult = Result<(), StageError>;
