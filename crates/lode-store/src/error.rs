use lode_types::ObjectId;

/// Errors from object store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The requested object was not found, and no remote has promised it.
    #[error("object not found: {0}")]
    NotFound(ObjectId),

    /// The object is absent locally but known to exist on the promisor
    /// remote (it was omitted from a partial clone and can be fetched).
    #[error("object {0} is promised by the remote but not present locally")]
    Promised(ObjectId),

    /// Serialization or deserialization failure.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// I/O error from the underlying storage backend.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The object data is malformed or cannot be decoded.
    #[error("corrupt object {id}: {reason}")]
    CorruptObject { id: ObjectId, reason: String },

    /// Attempted to write a null object ID.
    #[error("cannot store object with null ID")]
    NullObjectId,

    /// Retrieving objects from the remote failed.
    #[error("fetch from remote failed: {0}")]
    Fetch(String),
}

impl StoreError {
    /// Returns `true` for the "not found, but promised" classification.
    pub fn is_promised(&self) -> bool {
        matches!(self, StoreError::Promised(_))
    }
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
