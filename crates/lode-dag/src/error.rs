//! Error types for the commit graph.

use lode_store::StoreError;
use lode_types::ObjectId;

/// Errors that can occur during graph operations.
#[derive(Debug, thiserror::Error)]
pub enum DagError {
    #[error("commit not found: {0}")]
    NodeNotFound(ObjectId),

    /// A commit names a parent that is not in the graph.
    #[error("dangling parent reference: commit {node} references missing parent {parent}")]
    DanglingParent { node: ObjectId, parent: ObjectId },

    #[error("duplicate commit: {0}")]
    DuplicateNode(ObjectId),

    /// Reading commits from the object store failed.
    #[error("storage error: {0}")]
    Store(#[from] StoreError),
}

/// Convenience alias for graph results.
pub type DagResult<T> = Result<T, DagError>;
