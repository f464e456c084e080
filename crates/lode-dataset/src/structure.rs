use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use lode_store::{CommitObject, ObjectStore, StoreResult, Tree};
use lode_types::ObjectId;

use crate::dataset::Dataset;
use crate::error::DatasetResult;
use crate::types::DatasetType;

/// Id of the empty tree. It is never required to exist in a store.
pub fn empty_tree_id() -> ObjectId {
    Tree::empty()
        .to_stored_object()
        .map(|obj| obj.compute_id())
        .unwrap_or_else(|_| ObjectId::null())
}

/// One snapshot of a repository: a root tree, optionally reached via a commit.
#[derive(Clone)]
pub struct RepoStructure {
    store: Arc<dyn ObjectStore>,
    commit: Option<ObjectId>,
    tree: ObjectId,
}

impl RepoStructure {
    /// Snapshot of a commit's root tree.
    pub fn from_commit(store: Arc<dyn ObjectStore>, commit_id: ObjectId) -> StoreResult<Self> {
        let commit = store.read_commit(&commit_id)?;
        Ok(Self {
            store,
            commit: Some(commit_id),
            tree: commit.tree,
        })
    }

    /// Snapshot of a bare tree with no commit.
    pub fn from_tree(store: Arc<dyn ObjectStore>, tree: ObjectId) -> Self {
        Self {
            store,
            commit: None,
            tree,
        }
    }

    /// The empty snapshot (an unborn branch, or the parent of a root commit).
    pub fn empty(store: Arc<dyn ObjectStore>) -> Self {
        Self::from_tree(store, empty_tree_id())
    }

    pub fn commit(&self) -> Option<ObjectId> {
        self.commit
    }

    pub fn tree(&self) -> ObjectId {
        self.tree
    }

    pub fn store(&self) -> &Arc<dyn ObjectStore> {
        &self.store
    }

    /// Commit id when there is one, tree id otherwise.
    pub fn id(&self) -> ObjectId {
        self.commit.unwrap_or(self.tree)
    }

    pub fn is_empty_tree(&self) -> bool {
        self.tree == empty_tree_id()
    }

    pub fn read_commit(&self) -> StoreResult<Option<CommitObject>> {
        self.commit.map(|id| self.store.read_commit(&id)).transpose()
    }

    /// Discover every dataset in the snapshot.
    pub fn datasets(&self) -> DatasetResult<Datasets> {
        let mut found = BTreeMap::new();
        if !self.is_empty_tree() {
            self.walk(&self.tree, "", &mut found)?;
        }
        tracing::debug!(tree = %self.tree.short_hex(), count = found.len(), "discovered datasets");
        Ok(Datasets { datasets: found })
    }

    fn walk(
        &self,
        tree_id: &ObjectId,
        prefix: &str,
        found: &mut BTreeMap<String, Dataset>,
    ) -> DatasetResult<()> {
        let tree = self.store.read_tree(tree_id)?;
        for entry in tree.entries.iter().filter(|e| e.is_tree()) {
            if let Some(dataset_type) = DatasetType::from_dirname(&entry.name) {
                if !prefix.is_empty() {
                    let path = prefix.trim_end_matches('/').to_string();
                    let ds = Dataset::open(self.store.clone(), path.clone(), dataset_type, entry.object_id)?;
                    found.insert(path, ds);
                }
                continue;
            }
            if entry.name.starts_with('.') {
                continue;
            }
            self.walk(&entry.object_id, &format!("{prefix}{}/", entry.name), found)?;
        }
        Ok(())
    }
}

impl fmt::Debug for RepoStructure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RepoStructure")
            .field("commit", &self.commit.map(|c| c.short_hex()))
            .field("tree", &self.tree.short_hex())
            .finish()
    }
}

/// The datasets of one snapshot, keyed by path.
#[derive(Clone, Debug, Default)]
pub struct Datasets {
    datasets: BTreeMap<String, Dataset>,
}

impl Datasets {
    pub fn get(&self, path: &str) -> Option<&Dataset> {
        self.datasets.get(path)
    }

    pub fn contains(&self, path: &str) -> bool {
        self.datasets.contains_key(path)
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.datasets.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Dataset> {
        self.datasets.values()
    }

    pub fn len(&self) -> usize {
        self.datasets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.datasets.is_empty()
    }
}
