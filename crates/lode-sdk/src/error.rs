use lode_dag::DagError;
use lode_dataset::DatasetError;
use lode_diff::DiffError;
use lode_refs::RefError;
use lode_spatial::SpatialError;
use lode_store::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SdkError {
    #[error("not a lode repository: {0}")]
    NotInitialized(String),

    /// The request itself is wrong: a bad revision range, `..` between
    /// trees, or a missing or mismatched working copy.
    #[error("{0}")]
    Usage(String),

    #[error("{0}")]
    InvalidOperation(String),

    /// Several CRS definitions where one is required, or a reprojection
    /// that cannot be performed.
    #[error("{0}")]
    Crs(String),

    /// A dataset type whose blobs are always local referenced a promised
    /// blob.
    #[error("internal error: promised blob in {dataset_type} dataset {ds_path}, which should never have missing blobs")]
    PromisedBlobInStrictDataset { ds_path: String, dataset_type: String },

    /// Exit status was asked for before a diff was written.
    #[error("internal error: write_diff must be called before the diff result is known")]
    NotRun,

    #[error("invalid config: {0}")]
    Config(String),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("dataset error: {0}")]
    Dataset(#[from] DatasetError),

    #[error("diff error: {0}")]
    Diff(#[from] DiffError),

    #[error("{0}")]
    Spatial(#[from] SpatialError),

    #[error("ref error: {0}")]
    Ref(#[from] RefError),

    #[error("history error: {0}")]
    Dag(#[from] DagError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SdkError {
    /// Process exit status for this error. `1` means "changes found" and is
    /// never used for errors.
    pub fn exit_code(&self) -> i32 {
        match self {
            SdkError::Usage(_) | SdkError::Diff(DiffError::InvalidFilter { .. }) => 2,
            SdkError::InvalidOperation(_) => 20,
            SdkError::Crs(_) | SdkError::Spatial(_) => 30,
            _ => 11,
        }
    }
}

pub type SdkResult<T> = Result<T, SdkError>;
