use serde_json::Value;
use lode_types::ObjectId;

use crate::error::{StoreError, StoreResult};
use crate::object::{Blob, CommitObject, StoredObject, Tree};

/// Content-addressed object store.
///
/// All implementations must satisfy these invariants:
/// - Objects are immutable once written; the same data always produces the
///   same ID.
/// - Writing an object that was promised clears the promise.
/// - Concurrent reads are always safe.
/// - All I/O errors are propagated, never silently ignored.
pub trait ObjectStore: Send + Sync {
    /// Read an object by its content-addressed ID.
    ///
    /// Returns `Ok(None)` if the object is not present locally (whether or
    /// not it is promised).
    fn read(&self, id: &ObjectId) -> StoreResult<Option<StoredObject>>;

    /// Write an object and return its content-addressed ID.
    fn write(&self, object: &StoredObject) -> StoreResult<ObjectId>;

    /// Check whether an object is present locally.
    fn exists(&self, id: &ObjectId) -> StoreResult<bool>;

    /// Check whether an absent object is known to the promisor remote.
    fn is_promised(&self, id: &ObjectId) -> StoreResult<bool>;

    /// All locally present ids whose hex form starts with `prefix`.
    fn ids_with_prefix(&self, prefix: &str) -> StoreResult<Vec<ObjectId>>;

    /// Read an object, classifying absence.
    ///
    /// Fails with [`StoreError::Promised`] when the object can be fetched
    /// from the remote, or [`StoreError::NotFound`] otherwise.
    fn dereference(&self, id: &ObjectId) -> StoreResult<StoredObject> {
        match self.read(id)? {
            Some(obj) => Ok(obj),
            None if self.is_promised(id)? => Err(StoreError::Promised(*id)),
            None => Err(StoreError::NotFound(*id)),
        }
    }

    fn read_blob(&self, id: &ObjectId) -> StoreResult<Blob> {
        Blob::from_stored_object(&self.dereference(id)?)
    }

    fn read_tree(&self, id: &ObjectId) -> StoreResult<Tree> {
        Tree::from_stored_object(&self.dereference(id)?)
    }

    fn read_commit(&self, id: &ObjectId) -> StoreResult<CommitObject> {
        CommitObject::from_stored_object(&self.dereference(id)?)
    }

    fn write_json_blob(&self, value: &Value) -> StoreResult<ObjectId> {
        self.write(&Blob::from_json(value)?.to_stored_object())
    }

    fn write_tree(&self, tree: &Tree) -> StoreResult<ObjectId> {
        self.write(&tree.to_stored_object()?)
    }

    fn write_commit(&self, commit: &CommitObject) -> StoreResult<ObjectId> {
        self.write(&commit.to_stored_object()?)
    }

    /// Write multiple objects and return their IDs.
    fn write_batch(&self, objects: &[StoredObject]) -> StoreResult<Vec<ObjectId>> {
        objects.iter().map(|obj| self.write(obj)).collect()
    }
}
