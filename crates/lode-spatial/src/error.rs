//! Error types for spatial operations.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SpatialError {
    #[error("WKT parse error: {0}")]
    WktParse(String),

    /// A CRS definition could not be identified. `context` is usually the
    /// dataset path.
    #[error("Invalid or unsupported CRS definition for {context}: {reason}")]
    InvalidCrs { context: String, reason: String },

    #[error("Can't reproject from {from} to {to}")]
    Reprojection { from: String, to: String },

    /// A tile's `nativeExtent` is not a comma-separated list of numbers.
    #[error("Invalid extent {0:?}")]
    InvalidExtent(String),
}

/// Result type for spatial operations.
pub type SpatialResult<T> = std::result::Result<T, SpatialError>;
