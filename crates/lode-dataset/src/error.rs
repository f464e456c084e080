use lode_store::StoreError;
use lode_types::TypeError;

/// Errors raised while reading or writing datasets.
#[derive(Debug, thiserror::Error)]
pub enum DatasetError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("invalid item key: {0}")]
    Key(#[from] TypeError),

    /// The schema meta item is missing required fields or malformed.
    #[error("invalid schema: {0}")]
    Schema(String),

    #[error("invalid dataset path: {0:?}")]
    InvalidPath(String),

    /// The dataset tree does not have the expected layout.
    #[error("invalid dataset at {path}: {reason}")]
    Invalid { path: String, reason: String },

    #[error("unknown dataset type: {0}")]
    UnknownType(String),
}

impl DatasetError {
    pub(crate) fn invalid(path: &str, reason: impl Into<String>) -> Self {
        DatasetError::Invalid {
            path: path.to_string(),
            reason: reason.into(),
        }
    }
}

pub type DatasetResult<T> = Result<T, DatasetError>;
