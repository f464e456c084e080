use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

use lode_types::ObjectId;

use crate::error::{StoreError, StoreResult};
use crate::object::StoredObject;
use crate::traits::ObjectStore;

/// In-memory, HashMap-based object store.
///
/// Intended for tests and embedding. Besides the objects themselves it keeps
/// the set of promised ids, so partial clones can be simulated by writing a
/// full repository and then calling [`InMemoryObjectStore::evict_to_promised`].
pub struct InMemoryObjectStore {
    objects: RwLock<HashMap<ObjectId, StoredObject>>,
    promised: RwLock<HashSet<ObjectId>>,
}

impl InMemoryObjectStore {
    pub fn new() -> Self {
        Self {
            objects: RwLock::new(HashMap::new()),
            promised: RwLock::new(HashSet::new()),
        }
    }

    /// Number of objects currently stored.
    pub fn len(&self) -> usize {
        self.objects.read().expect("lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.read().expect("lock poisoned").is_empty()
    }

    /// Record that `id` exists on the remote without storing it locally.
    pub fn mark_promised(&self, id: ObjectId) {
        self.promised.write().expect("lock poisoned").insert(id);
    }

    /// Drop a local object and mark it promised, as a partial clone would
    /// have left it. Returns `true` if the object was present.
    pub fn evict_to_promised(&self, id: &ObjectId) -> bool {
        let removed = self.objects.write().expect("lock poisoned").remove(id).is_some();
        if removed {
            self.mark_promised(*id);
        }
        removed
    }

    /// Number of ids currently promised but absent.
    pub fn promised_count(&self) -> usize {
        self.promised.read().expect("lock poisoned").len()
    }
}

impl Default for InMemoryObjectStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ObjectStore for InMemoryObjectStore {
    fn read(&self, id: &ObjectId) -> StoreResult<Option<StoredObject>> {
        let map = self.objects.read().expect("lock poisoned");
        Ok(map.get(id).cloned())
    }

    fn write(&self, object: &StoredObject) -> StoreResult<ObjectId> {
        let id = object.compute_id();
        if id.is_null() {
            return Err(StoreError::NullObjectId);
        }
        self.objects
            .write()
            .expect("lock poisoned")
            .entry(id)
            .or_insert_with(|| object.clone());
        self.promised.write().expect("lock poisoned").remove(&id);
        Ok(id)
    }

    fn exists(&self, id: &ObjectId) -> StoreResult<bool> {
        Ok(self.objects.read().expect("lock poisoned").contains_key(id))
    }

    fn is_promised(&self, id: &ObjectId) -> StoreResult<bool> {
        Ok(self.promised.read().expect("lock poisoned").contains(id))
    }

    fn ids_with_prefix(&self, prefix: &str) -> StoreResult<Vec<ObjectId>> {
        let map = self.objects.read().expect("lock poisoned");
        let mut ids: Vec<ObjectId> = map
            .keys()
            .filter(|id| id.matches_hex_prefix(prefix))
            .copied()
            .collect();
        ids.sort();
        Ok(ids)
    }
}

impl std::fmt::Debug for InMemoryObjectStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryObjectStore")
            .field("object_count", &self.len())
            .field("promised_count", &self.promised_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::{Blob, Tree, TreeEntry};
    use serde_json::json;

    fn make_blob(content: &[u8]) -> StoredObject {
        Blob::new(content.to_vec()).to_stored_object()
    }

    #[test]
    fn write_and_read_blob() {
        let store = InMemoryObjectStore::new();
        let obj = make_blob(b"hello world");
        let id = store.write(&obj).unwrap();
        assert_eq!(store.read(&id).unwrap().unwrap(), obj);
        assert!(store.exists(&id).unwrap());
    }

    #[test]
    fn same_content_produces_same_id() {
        let store = InMemoryObjectStore::new();
        let id1 = store.write(&make_blob(b"identical")).unwrap();
        let id2 = store.write(&make_blob(b"identical")).unwrap();
        assert_eq!(id1, id2);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn dereference_missing_is_not_found() {
        let store = InMemoryObjectStore::new();
        let id = ObjectId::from_bytes(b"missing");
        let err = store.dereference(&id).unwrap_err();
        assert!(matches!(err, StoreError::NotFound(missing) if missing == id));
        assert!(!err.is_promised());
    }

    #[test]
    fn dereference_evicted_is_promised() {
        let store = InMemoryObjectStore::new();
        let id = store.write_json_blob(&json!({"fid": 42})).unwrap();
        assert!(store.evict_to_promised(&id));
        assert!(store.read(&id).unwrap().is_none());
        assert!(store.dereference(&id).unwrap_err().is_promised());
    }

    #[test]
    fn writing_a_promised_object_fulfils_the_promise() {
        let store = InMemoryObjectStore::new();
        let obj = make_blob(b"fetched later");
        let id = store.write(&obj).unwrap();
        store.evict_to_promised(&id);
        assert_eq!(store.promised_count(), 1);

        store.write(&obj).unwrap();
        assert_eq!(store.promised_count(), 0);
        assert_eq!(store.read_blob(&id).unwrap().data, b"fetched later");
    }

    #[test]
    fn read_tree_rejects_blob() {
        let store = InMemoryObjectStore::new();
        let id = store.write(&make_blob(b"not a tree")).unwrap();
        assert!(matches!(store.read_tree(&id), Err(StoreError::CorruptObject { .. })));

        let tree_id = store
            .write_tree(&Tree::new(vec![TreeEntry::blob("x", id)]))
            .unwrap();
        assert_eq!(store.read_tree(&tree_id).unwrap().len(), 1);
    }

    #[test]
    fn prefix_lookup_is_sorted_and_filtered() {
        let store = InMemoryObjectStore::new();
        let id = store.write(&make_blob(b"aaa")).unwrap();
        store.write(&make_blob(b"bbb")).unwrap();
        let found = store.ids_with_prefix(&id.to_hex()[..10]).unwrap();
        assert_eq!(found, vec![id]);
        assert_eq!(store.ids_with_prefix("").unwrap().len(), 2);
    }
}
