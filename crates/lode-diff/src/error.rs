//! Error types for the diff crate.

use lode_dataset::DatasetError;
use lode_store::StoreError;

/// Errors that can occur while computing diffs.
#[derive(Debug, thiserror::Error)]
pub enum DiffError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Dataset(#[from] DatasetError),

    /// A user key filter pattern could not be understood.
    #[error("invalid filter {pattern:?}: {reason}")]
    InvalidFilter { pattern: String, reason: String },

    /// The working copy state file is unreadable.
    #[error("working copy error: {0}")]
    WorkingCopy(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl DiffError {
    /// Whether this is the store's "not found, but promised" failure.
    pub fn is_promised(&self) -> bool {
        match self {
            DiffError::Store(e) => e.is_promised(),
            DiffError::Dataset(DatasetError::Store(e)) => e.is_promised(),
            _ => false,
        }
    }
}

/// Convenience alias for diff results.
pub type DiffResult<T> = Result<T, DiffError>;
