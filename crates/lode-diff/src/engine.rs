//! The dataset diff engine.
//!
//! Meta items are compared as dictionaries. Items are compared entry by
//! entry on their blob ids, so no item content is read while diffing: deltas
//! hold lazy [`DeltaValue`]s that are dereferenced only when a consumer
//! needs them.

use std::collections::BTreeMap;
use std::sync::Arc;

use lode_dataset::{Dataset, Datasets};
use lode_types::{ItemKey, ObjectId};

use crate::delta::{Delta, DeltaValue};
use crate::diff_structs::{DatasetDiff, DeltaDiff, MetaDelta, RepoDiff};
use crate::error::DiffResult;
use crate::key_filter::{DatasetKeyFilter, KeySet, RepoKeyFilter};
use crate::working_copy::WorkingCopy;

/// Diff two versions of a dataset. Either side may be absent, in which case
/// every item and meta item of the other side is inserted or deleted.
pub fn diff_dataset(
    old: Option<&Dataset>,
    new: Option<&Dataset>,
    filter: &DatasetKeyFilter,
) -> DiffResult<DatasetDiff> {
    let mut diff = DatasetDiff::new();
    if let (Some(o), Some(n)) = (old, new) {
        if o.tree_id() == n.tree_id() && o.dataset_type() == n.dataset_type() {
            return Ok(diff);
        }
    }

    let old_meta_tree = old.and_then(Dataset::meta_tree_id);
    let new_meta_tree = new.and_then(Dataset::meta_tree_id);
    if old_meta_tree != new_meta_tree {
        diff_meta(old, new, filter, &mut diff)?;
    }

    let mut item_types: Vec<&'static str> = old.iter().chain(new.iter()).map(|d| d.item_type()).collect();
    item_types.dedup();
    for item_type in item_types {
        let keys = filter.item_keys(item_type);
        if keys.is_empty() {
            continue;
        }
        let old = old.filter(|d| d.item_type() == item_type);
        let new = new.filter(|d| d.item_type() == item_type);
        let items = diff_items(old, new, &keys)?;
        if !items.is_empty() {
            diff.set_item_diff(item_type, items);
        }
    }
    Ok(diff)
}

fn diff_meta(
    old: Option<&Dataset>,
    new: Option<&Dataset>,
    filter: &DatasetKeyFilter,
    diff: &mut DatasetDiff,
) -> DiffResult<()> {
    let mut old_items = match old {
        Some(ds) => ds.meta_items()?,
        None => BTreeMap::new(),
    };
    let new_items = match new {
        Some(ds) => ds.meta_items()?,
        None => BTreeMap::new(),
    };
    for (name, new_value) in new_items {
        let old_value = old_items.remove(&name);
        if !filter.matches_meta(&name) {
            continue;
        }
        if let Some(delta) = MetaDelta::from_sides(old_value, Some(new_value)) {
            diff.insert_meta_delta(name, delta);
        }
    }
    for (name, old_value) in old_items {
        if filter.matches_meta(&name) {
            diff.insert_meta_delta(name, MetaDelta { old: Some(old_value), new: None });
        }
    }
    Ok(())
}

fn item_entries(ds: Option<&Dataset>) -> DiffResult<BTreeMap<ItemKey, ObjectId>> {
    Ok(match ds {
        Some(ds) => ds.item_entries()?,
        None => BTreeMap::new(),
    })
}

fn diff_items(
    old: Option<&Dataset>,
    new: Option<&Dataset>,
    keys: &KeySet,
) -> DiffResult<DeltaDiff> {
    let mut diff = DeltaDiff::new();
    if let (Some(o), Some(n)) = (old, new) {
        if o.item_tree_id() == n.item_tree_id() {
            return Ok(diff);
        }
    }
    let stored = |ds: Option<&Dataset>, key: &ItemKey, id: ObjectId| -> Option<DeltaValue> {
        ds.map(|ds| DeltaValue::stored(key.clone(), id, Arc::clone(ds.store())))
    };

    let mut old_entries = item_entries(old)?;
    let new_entries = item_entries(new)?;
    for (key, new_id) in new_entries {
        let old_id = old_entries.remove(&key);
        if old_id == Some(new_id) || !keys.contains(&key) {
            continue;
        }
        let old_value = old_id.and_then(|id| stored(old, &key, id));
        if let Some(delta) = Delta::from_sides(old_value, stored(new, &key, new_id)) {
            diff.insert(delta);
        }
    }
    for (key, old_id) in old_entries {
        if keys.contains(&key) {
            if let Some(value) = stored(old, &key, old_id) {
                diff.insert(Delta::delete(value));
            }
        }
    }
    Ok(diff)
}

/// Diff the dataset at `ds_path` from `base` to `target`, then on to the
/// working copy when one is given. The result spans base to working copy
/// directly.
pub fn get_dataset_diff(
    ds_path: &str,
    base: &Datasets,
    target: &Datasets,
    working_copy: Option<&dyn WorkingCopy>,
    filter: &DatasetKeyFilter,
) -> DiffResult<DatasetDiff> {
    let target_ds = target.get(ds_path);
    let mut diff = diff_dataset(base.get(ds_path), target_ds, filter)?;
    if let Some(wc) = working_copy {
        let wc_diff = wc.diff_dataset_to_working_copy(ds_path, target_ds, filter)?;
        diff = diff.compose(wc_diff);
    }
    diff.prune();
    tracing::debug!(
        ds_path,
        meta = diff.meta().count(),
        items = diff.feature_count(),
        "dataset diffed"
    );
    Ok(diff)
}

/// Diff every candidate dataset. The result holds only changed datasets.
pub fn get_repo_diff(
    base: &Datasets,
    target: &Datasets,
    working_copy: Option<&dyn WorkingCopy>,
    filter: &RepoKeyFilter,
) -> DiffResult<RepoDiff> {
    let mut repo_diff = RepoDiff::new();
    for ds_path in filter.candidate_paths(base.paths(), target.paths()) {
        let ds_filter = filter.dataset(&ds_path);
        let diff = get_dataset_diff(&ds_path, base, target, working_copy, &ds_filter)?;
        repo_diff.insert(ds_path, diff);
    }
    Ok(repo_diff)
}
