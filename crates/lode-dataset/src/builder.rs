//! Writing datasets and snapshot trees into an object store.

use std::collections::BTreeMap;

use lode_store::{Blob, EntryMode, ObjectStore, Tree, TreeEntry};
use lode_types::{ItemKey, ObjectId};
use serde_json::Value;

use crate::error::{DatasetError, DatasetResult};
use crate::structure::RepoStructure;
use crate::types::DatasetType;

/// A directory being assembled from `/`-separated paths.
#[derive(Default)]
struct DirNode {
    leaves: BTreeMap<String, (EntryMode, ObjectId)>,
    dirs: BTreeMap<String, DirNode>,
}

impl DirNode {
    fn insert(&mut self, path: &str, mode: EntryMode, id: ObjectId) -> DatasetResult<()> {
        match path.split_once('/') {
            Some((head, rest)) => self.dirs.entry(head.to_string()).or_default().insert(rest, mode, id),
            None => {
                if self.leaves.insert(path.to_string(), (mode, id)).is_some() {
                    return Err(DatasetError::InvalidPath(path.to_string()));
                }
                Ok(())
            }
        }
    }

    fn write(&self, store: &dyn ObjectStore) -> DatasetResult<ObjectId> {
        let mut entries = Vec::with_capacity(self.leaves.len() + self.dirs.len());
        for (name, (mode, id)) in &self.leaves {
            entries.push(TreeEntry::new(*mode, name.clone(), *id));
        }
        for (name, dir) in &self.dirs {
            if self.leaves.contains_key(name) {
                return Err(DatasetError::InvalidPath(name.clone()));
            }
            entries.push(TreeEntry::tree(name.clone(), dir.write(store)?));
        }
        Ok(store.write_tree(&Tree::new(entries))?)
    }
}

fn validate_path(path: &str) -> DatasetResult<()> {
    let ok = !path.is_empty()
        && path
            .split('/')
            .all(|part| !part.is_empty() && !part.starts_with('.'));
    if ok {
        Ok(())
    } else {
        Err(DatasetError::InvalidPath(path.to_string()))
    }
}

fn encode_meta_item(name: &str, value: &Value) -> DatasetResult<Vec<u8>> {
    if name.ends_with(".json") {
        return serde_json::to_vec(value).map_err(|e| DatasetError::invalid(name, e.to_string()));
    }
    match value {
        Value::String(text) => Ok(text.as_bytes().to_vec()),
        _ => Err(DatasetError::invalid(name, "text meta item must be a string")),
    }
}

/// Builds the marker tree of one dataset.
#[derive(Clone, Debug)]
pub struct DatasetBuilder {
    path: String,
    dataset_type: DatasetType,
    meta: BTreeMap<String, Value>,
    items: BTreeMap<ItemKey, Value>,
}

impl DatasetBuilder {
    pub fn new(path: impl Into<String>, dataset_type: DatasetType) -> Self {
        Self {
            path: path.into(),
            dataset_type,
            meta: BTreeMap::new(),
            items: BTreeMap::new(),
        }
    }

    pub fn table(path: impl Into<String>) -> Self {
        Self::new(path, DatasetType::Table)
    }

    pub fn point_cloud(path: impl Into<String>) -> Self {
        Self::new(path, DatasetType::PointCloud)
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn dataset_type(&self) -> DatasetType {
        self.dataset_type
    }

    pub fn meta_json(mut self, name: impl Into<String>, value: Value) -> Self {
        self.meta.insert(name.into(), value);
        self
    }

    pub fn meta_text(mut self, name: impl Into<String>, text: impl Into<String>) -> Self {
        self.meta.insert(name.into(), Value::String(text.into()));
        self
    }

    pub fn remove_meta(mut self, name: &str) -> Self {
        self.meta.remove(name);
        self
    }

    pub fn item(mut self, key: impl Into<ItemKey>, value: Value) -> Self {
        self.items.insert(key.into(), value);
        self
    }

    pub fn remove_item(mut self, key: impl Into<ItemKey>) -> Self {
        self.items.remove(&key.into());
        self
    }

    /// Write meta and item blobs and the marker tree. Returns the marker
    /// tree id.
    pub fn write(&self, store: &dyn ObjectStore) -> DatasetResult<ObjectId> {
        validate_path(&self.path)?;
        let mut root = DirNode::default();
        for (name, value) in &self.meta {
            let blob = Blob::new(encode_meta_item(name, value)?);
            let id = store.write(&blob.to_stored_object())?;
            root.insert(&format!("meta/{name}"), EntryMode::Regular, id)?;
        }
        let item_dir = self.dataset_type.item_type();
        for (key, value) in &self.items {
            let name = key.entry_name();
            ItemKey::parse_entry_name(&name)?;
            let id = store.write_json_blob(value)?;
            root.insert(&format!("{item_dir}/{name}"), EntryMode::Regular, id)?;
        }
        root.write(store)
    }
}

/// Assembles a snapshot root tree from dataset marker trees.
#[derive(Clone, Debug, Default)]
pub struct RepoTreeBuilder {
    datasets: BTreeMap<String, (DatasetType, ObjectId)>,
}

impl RepoTreeBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from the datasets already present in a snapshot.
    pub fn from_structure(structure: &RepoStructure) -> DatasetResult<Self> {
        let mut builder = Self::new();
        for ds in structure.datasets()?.iter() {
            builder.insert(ds.path(), ds.dataset_type(), ds.tree_id())?;
        }
        Ok(builder)
    }

    /// Add or replace a dataset by its already-written marker tree.
    pub fn insert(
        &mut self,
        path: &str,
        dataset_type: DatasetType,
        tree_id: ObjectId,
    ) -> DatasetResult<&mut Self> {
        validate_path(path)?;
        self.datasets.insert(path.to_string(), (dataset_type, tree_id));
        Ok(self)
    }

    /// Write a dataset and add it, replacing any dataset at the same path.
    pub fn add(&mut self, store: &dyn ObjectStore, dataset: &DatasetBuilder) -> DatasetResult<&mut Self> {
        let tree_id = dataset.write(store)?;
        self.insert(dataset.path(), dataset.dataset_type(), tree_id)
    }

    pub fn remove(&mut self, path: &str) -> bool {
        self.datasets.remove(path).is_some()
    }

    /// Write the root tree. An empty builder writes the empty tree.
    pub fn write(&self, store: &dyn ObjectStore) -> DatasetResult<ObjectId> {
        let mut root = DirNode::default();
        for (path, (dataset_type, tree_id)) in &self.datasets {
            root.insert(
                &format!("{path}/{}", dataset_type.dirname()),
                EntryMode::Directory,
                *tree_id,
            )?;
        }
        root.write(store)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lode_store::InMemoryObjectStore;
    use serde_json::json;

    #[test]
    fn same_content_same_tree() {
        let store = InMemoryObjectStore::new();
        let a = DatasetBuilder::table("roads")
            .item(1, json!({"fid": 1}))
            .write(&store)
            .unwrap();
        let b = DatasetBuilder::table("roads")
            .item(1, json!({"fid": 1}))
            .write(&store)
            .unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn nested_dataset_paths() {
        let store = InMemoryObjectStore::new();
        let mut repo = RepoTreeBuilder::new();
        repo.add(&store, &DatasetBuilder::table("nz/parcels")).unwrap();
        repo.add(&store, &DatasetBuilder::table("nz/roads")).unwrap();
        let root = store.read_tree(&repo.write(&store).unwrap()).unwrap();
        assert_eq!(root.len(), 1);
        let nz = store.read_tree(&root.get("nz").unwrap().object_id).unwrap();
        assert_eq!(nz.len(), 2);
        let parcels = store.read_tree(&nz.get("parcels").unwrap().object_id).unwrap();
        assert!(parcels.get(".table-dataset").is_some());
    }

    #[test]
    fn rejects_hidden_or_empty_paths() {
        let store = InMemoryObjectStore::new();
        for path in ["", "a//b", ".lode", "a/.b"] {
            assert!(DatasetBuilder::table(path).write(&store).is_err(), "{path:?}");
        }
    }

    #[test]
    fn text_meta_must_be_string() {
        let store = InMemoryObjectStore::new();
        let err = DatasetBuilder::table("x")
            .meta_json("title", json!(5))
            .write(&store)
            .unwrap_err();
        assert!(matches!(err, DatasetError::Invalid { .. }));
    }

    #[test]
    fn remove_item_and_meta() {
        let store = InMemoryObjectStore::new();
        let full = DatasetBuilder::table("x")
            .meta_text("title", "X")
            .item(1, json!({"fid": 1}));
        let stripped = full.clone().remove_item(1).remove_meta("title");
        assert_ne!(full.write(&store).unwrap(), stripped.write(&store).unwrap());
        assert_eq!(
            stripped.write(&store).unwrap(),
            DatasetBuilder::table("x").write(&store).unwrap()
        );
    }
}
