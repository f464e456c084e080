//! The working copy seen from the diff engine.
//!
//! Lode does not materialize checkouts. A working copy is the tree it was
//! last reset to plus a set of uncommitted edits, which is all the diff
//! needs to know about it.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;

use lode_dataset::Dataset;
use lode_types::{ItemKey, ObjectId};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::delta::{Delta, DeltaFlags, DeltaValue};
use crate::diff_structs::{DatasetDiff, DeltaDiff, MetaDelta};
use crate::error::{DiffError, DiffResult};
use crate::key_filter::DatasetKeyFilter;

/// Uncommitted state layered on a snapshot tree.
pub trait WorkingCopy: Send + Sync {
    /// Whether a working copy has been created at all.
    fn exists(&self) -> bool;

    /// The tree the working copy is based on.
    fn tree_id(&self) -> Option<ObjectId>;

    /// Whether the working copy is based on `tree`.
    fn matches_tree(&self, tree: &ObjectId) -> bool {
        self.tree_id().as_ref() == Some(tree)
    }

    /// Changes from `target` (the dataset in the working copy's base tree)
    /// to the working copy. Every delta is flagged
    /// [`DeltaFlags::WORKING_COPY_EDIT`].
    fn diff_dataset_to_working_copy(
        &self,
        ds_path: &str,
        target: Option<&Dataset>,
        filter: &DatasetKeyFilter,
    ) -> DiffResult<DatasetDiff>;
}

/// Edits to one dataset. `None` values are deletions.
#[derive(Clone, Debug, Default, PartialEq)]
struct DatasetEdits {
    meta: BTreeMap<String, Option<Value>>,
    items: BTreeMap<ItemKey, Option<Value>>,
}

/// A working copy held in memory, optionally saved as JSON.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct InMemoryWorkingCopy {
    tree: Option<ObjectId>,
    edits: BTreeMap<String, DatasetEdits>,
}

impl InMemoryWorkingCopy {
    /// A clean working copy based on `tree`.
    pub fn new(tree: ObjectId) -> Self {
        Self {
            tree: Some(tree),
            edits: BTreeMap::new(),
        }
    }

    /// A repository without a working copy (bare).
    pub fn none() -> Self {
        Self::default()
    }

    /// Rebase onto `tree`, discarding every edit.
    pub fn reset(&mut self, tree: ObjectId) {
        self.tree = Some(tree);
        self.edits.clear();
    }

    pub fn is_dirty(&self) -> bool {
        !self.edits.is_empty()
    }

    /// Paths of datasets with edits.
    pub fn dirty_paths(&self) -> impl Iterator<Item = &str> {
        self.edits.keys().map(String::as_str)
    }

    pub fn upsert_item(&mut self, ds_path: &str, key: impl Into<ItemKey>, value: Value) {
        self.edits_mut(ds_path).items.insert(key.into(), Some(value));
    }

    pub fn delete_item(&mut self, ds_path: &str, key: impl Into<ItemKey>) {
        self.edits_mut(ds_path).items.insert(key.into(), None);
    }

    /// Set (`Some`) or delete (`None`) a meta item.
    pub fn set_meta_item(&mut self, ds_path: &str, name: &str, value: Option<Value>) {
        self.edits_mut(ds_path).meta.insert(name.to_string(), value);
    }

    fn edits_mut(&mut self, ds_path: &str) -> &mut DatasetEdits {
        self.edits.entry(ds_path.to_string()).or_default()
    }

    /// Load from `path`. A missing file means there is no working copy.
    pub fn load(path: &Path) -> DiffResult<Self> {
        if !path.exists() {
            return Ok(Self::none());
        }
        let data = std::fs::read(path)?;
        let file: WorkingCopyFile = serde_json::from_slice(&data)
            .map_err(|e| DiffError::WorkingCopy(format!("{}: {e}", path.display())))?;
        Ok(file.into())
    }

    /// Save atomically to `path`.
    pub fn save(&self, path: &Path) -> DiffResult<()> {
        let data = serde_json::to_vec_pretty(&WorkingCopyFile::from(self))
            .map_err(|e| DiffError::WorkingCopy(e.to_string()))?;
        let dir = path.parent().unwrap_or_else(|| Path::new("."));
        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        tmp.write_all(&data)?;
        tmp.persist(path).map_err(|e| DiffError::Io(e.error))?;
        Ok(())
    }
}

impl WorkingCopy for InMemoryWorkingCopy {
    fn exists(&self) -> bool {
        self.tree.is_some()
    }

    fn tree_id(&self) -> Option<ObjectId> {
        self.tree
    }

    fn diff_dataset_to_working_copy(
        &self,
        ds_path: &str,
        target: Option<&Dataset>,
        filter: &DatasetKeyFilter,
    ) -> DiffResult<DatasetDiff> {
        let mut diff = DatasetDiff::new();
        let (Some(edits), Some(target)) = (self.edits.get(ds_path), target) else {
            return Ok(diff);
        };

        for (name, new) in &edits.meta {
            if !filter.matches_meta(name) {
                continue;
            }
            let old = target.get_meta_item(name)?;
            if let Some(delta) = MetaDelta::from_sides(old, new.clone()) {
                diff.insert_meta_delta(name.clone(), delta);
            }
        }

        if !edits.items.is_empty() {
            let item_type = target.item_type();
            let entries = target.item_entries()?;
            let mut items = DeltaDiff::new();
            for (key, new) in &edits.items {
                if !filter.matches_item(item_type, key) {
                    continue;
                }
                let old = entries
                    .get(key)
                    .map(|id| DeltaValue::stored(key.clone(), *id, target.store().clone()));
                let new = new.clone().map(|v| DeltaValue::inline(key.clone(), v));
                if let Some(delta) = Delta::from_sides(old, new) {
                    items.insert(delta.with_flags(DeltaFlags::WORKING_COPY_EDIT));
                }
            }
            diff.set_item_diff(item_type, items);
        }
        diff.prune();
        Ok(diff)
    }
}

/// On-disk form. Item keys may be integers, so items are stored as a list
/// rather than a JSON object.
#[derive(Serialize, Deserialize)]
struct WorkingCopyFile {
    tree: Option<ObjectId>,
    #[serde(default)]
    datasets: Vec<DatasetEditsFile>,
}

#[derive(Serialize, Deserialize)]
struct DatasetEditsFile {
    path: String,
    #[serde(default)]
    meta: BTreeMap<String, Option<Value>>,
    #[serde(default)]
    items: Vec<ItemEdit>,
}

#[derive(Serialize, Deserialize)]
struct ItemEdit {
    key: ItemKey,
    value: Option<Value>,
}

impl From<&InMemoryWorkingCopy> for WorkingCopyFile {
    fn from(wc: &InMemoryWorkingCopy) -> Self {
        let datasets = wc
            .edits
            .iter()
            .map(|(path, edits)| DatasetEditsFile {
                path: path.clone(),
                meta: edits.meta.clone(),
                items: edits
                    .items
                    .iter()
                    .map(|(key, value)| ItemEdit {
                        key: key.clone(),
                        value: value.clone(),
                    })
                    .collect(),
            })
            .collect();
        Self {
            tree: wc.tree,
            datasets,
        }
    }
}

impl From<WorkingCopyFile> for InMemoryWorkingCopy {
    fn from(file: WorkingCopyFile) -> Self {
        let edits = file
            .datasets
            .into_iter()
            .map(|ds| {
                let items = ds.items.into_iter().map(|e| (e.key, e.value)).collect();
                (ds.path, DatasetEdits { meta: ds.meta, items })
            })
            .collect();
        Self {
            tree: file.tree,
            edits,
        }
    }
}
