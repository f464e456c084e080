//! Diff containers: per item type, per dataset, per repository.
//!
//! Absent entries mean "no change": a dataset with no entry in a
//! [`RepoDiff`], an item type with no [`DeltaDiff`], or a key with no
//! [`Delta`].

use std::collections::btree_map::{self, BTreeMap};

use lode_types::ItemKey;
use serde_json::Value;

use crate::delta::Delta;

/// Deltas for one item type, in key order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DeltaDiff {
    deltas: BTreeMap<ItemKey, Delta>,
}

impl DeltaDiff {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a delta under its own key, replacing any previous one.
    pub fn insert(&mut self, delta: Delta) {
        self.deltas.insert(delta.key().clone(), delta);
    }

    pub fn get(&self, key: &ItemKey) -> Option<&Delta> {
        self.deltas.get(key)
    }

    pub fn len(&self) -> usize {
        self.deltas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.deltas.is_empty()
    }

    pub fn iter(&self) -> btree_map::Iter<'_, ItemKey, Delta> {
        self.deltas.iter()
    }

    /// All `(key, delta)` pairs in key order.
    pub fn sorted_items(&self) -> Vec<(ItemKey, Delta)> {
        self.deltas
            .iter()
            .map(|(k, d)| (k.clone(), d.clone()))
            .collect()
    }

    /// Apply `next` on top of this diff. Keys changed on both sides are
    /// collapsed with [`Delta::compose`].
    pub fn compose(mut self, next: DeltaDiff) -> DeltaDiff {
        for (key, delta) in next.deltas {
            match self.deltas.remove(&key) {
                Some(first) => {
                    if let Some(composed) = first.compose(delta) {
                        self.deltas.insert(key, composed);
                    }
                }
                None => {
                    self.deltas.insert(key, delta);
                }
            }
        }
        self
    }
}

impl IntoIterator for DeltaDiff {
    type Item = (ItemKey, Delta);
    type IntoIter = btree_map::IntoIter<ItemKey, Delta>;

    fn into_iter(self) -> Self::IntoIter {
        self.deltas.into_iter()
    }
}

impl FromIterator<Delta> for DeltaDiff {
    fn from_iter<I: IntoIterator<Item = Delta>>(iter: I) -> Self {
        let mut diff = DeltaDiff::new();
        for delta in iter {
            diff.insert(delta);
        }
        diff
    }
}

/// The change to one meta item. Meta items are small and always local, so
/// both sides are held in memory.
#[derive(Clone, Debug, PartialEq)]
pub struct MetaDelta {
    pub old: Option<Value>,
    pub new: Option<Value>,
}

impl MetaDelta {
    /// `None` when nothing changed.
    pub fn from_sides(old: Option<Value>, new: Option<Value>) -> Option<Self> {
        if old == new {
            None
        } else {
            Some(Self { old, new })
        }
    }

    pub fn compose(self, next: MetaDelta) -> Option<MetaDelta> {
        Self::from_sides(self.old, next.new)
    }
}

/// Everything that changed in one dataset.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DatasetDiff {
    meta: BTreeMap<String, MetaDelta>,
    items: BTreeMap<String, DeltaDiff>,
}

impl DatasetDiff {
    pub fn new() -> Self {
        Self::default()
    }

    /// No meta or item changes.
    pub fn is_empty(&self) -> bool {
        self.meta.is_empty() && self.items.values().all(DeltaDiff::is_empty)
    }

    /// Drop item types with no deltas.
    pub fn prune(&mut self) {
        self.items.retain(|_, diff| !diff.is_empty());
    }

    pub fn insert_meta_delta(&mut self, name: impl Into<String>, delta: MetaDelta) {
        self.meta.insert(name.into(), delta);
    }

    pub fn get_meta_delta(&self, name: &str) -> Option<&MetaDelta> {
        self.meta.get(name)
    }

    /// Meta deltas in name order.
    pub fn meta(&self) -> btree_map::Iter<'_, String, MetaDelta> {
        self.meta.iter()
    }

    pub fn set_item_diff(&mut self, item_type: impl Into<String>, diff: DeltaDiff) {
        self.items.insert(item_type.into(), diff);
    }

    pub fn item_diff(&self, item_type: &str) -> Option<&DeltaDiff> {
        self.items.get(item_type)
    }

    pub fn get_item_delta(&self, item_type: &str, key: &ItemKey) -> Option<&Delta> {
        self.items.get(item_type).and_then(|d| d.get(key))
    }

    /// Item types that have a sub-diff.
    pub fn item_types(&self) -> impl Iterator<Item = &str> {
        self.items.keys().map(String::as_str)
    }

    /// Number of changed items across all item types.
    pub fn feature_count(&self) -> usize {
        self.items.values().map(DeltaDiff::len).sum()
    }

    /// Apply `next` on top of this diff.
    pub fn compose(mut self, next: DatasetDiff) -> DatasetDiff {
        for (name, delta) in next.meta {
            match self.meta.remove(&name) {
                Some(first) => {
                    if let Some(composed) = first.compose(delta) {
                        self.meta.insert(name, composed);
                    }
                }
                None => {
                    self.meta.insert(name, delta);
                }
            }
        }
        for (item_type, diff) in next.items {
            let first = self.items.remove(&item_type).unwrap_or_default();
            self.items.insert(item_type, first.compose(diff));
        }
        self.prune();
        self
    }
}

/// Changed datasets, keyed by path. Only non-empty dataset diffs are kept.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RepoDiff {
    datasets: BTreeMap<String, DatasetDiff>,
}

impl RepoDiff {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a dataset diff. Empty diffs are ignored.
    pub fn insert(&mut self, ds_path: impl Into<String>, diff: DatasetDiff) {
        if !diff.is_empty() {
            self.datasets.insert(ds_path.into(), diff);
        }
    }

    pub fn get(&self, ds_path: &str) -> Option<&DatasetDiff> {
        self.datasets.get(ds_path)
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.datasets.keys().map(String::as_str)
    }

    pub fn iter(&self) -> btree_map::Iter<'_, String, DatasetDiff> {
        self.datasets.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.datasets.is_empty()
    }

    pub fn len(&self) -> usize {
        self.datasets.len()
    }

    pub fn feature_count(&self) -> usize {
        self.datasets.values().map(DatasetDiff::feature_count).sum()
    }
}

impl IntoIterator for RepoDiff {
    type Item = (String, DatasetDiff);
    type IntoIter = btree_map::IntoIter<String, DatasetDiff>;

    fn into_iter(self) -> Self::IntoIter {
        self.datasets.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delta::{DeltaFlags, DeltaValue};
    use serde_json::json;

    fn v(key: i64, value: Value) -> DeltaValue {
        DeltaValue::inline(ItemKey::Int(key), value)
    }

    #[test]
    fn sorted_items_follow_key_order() {
        let diff: DeltaDiff = [
            Delta::insert(v(10, json!(10))),
            Delta::insert(v(2, json!(2))),
            Delta::delete(v(1, json!(1))),
        ]
        .into_iter()
        .collect();
        let keys: Vec<ItemKey> = diff.sorted_items().into_iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec![ItemKey::Int(1), ItemKey::Int(2), ItemKey::Int(10)]);
    }

    #[test]
    fn compose_collapses_and_keeps_one_sided() {
        let first: DeltaDiff = [
            Delta::insert(v(1, json!("a"))),
            Delta::update(v(2, json!("b")), v(2, json!("c"))),
        ]
        .into_iter()
        .collect();
        let second: DeltaDiff = [
            Delta::delete(v(1, json!("a"))).with_flags(DeltaFlags::WORKING_COPY_EDIT),
            Delta::insert(v(3, json!("d"))).with_flags(DeltaFlags::WORKING_COPY_EDIT),
        ]
        .into_iter()
        .collect();
        let composed = first.compose(second);
        assert_eq!(composed.len(), 2);
        assert!(composed.get(&ItemKey::Int(1)).is_none());
        assert!(!composed.get(&ItemKey::Int(2)).unwrap().is_working_copy_edit());
        assert!(composed.get(&ItemKey::Int(3)).unwrap().is_working_copy_edit());
    }

    #[test]
    fn dataset_diff_accessors() {
        let mut diff = DatasetDiff::new();
        assert!(diff.is_empty());
        diff.set_item_diff("feature", DeltaDiff::new());
        assert!(diff.is_empty());
        diff.prune();
        assert_eq!(diff.item_types().count(), 0);

        diff.insert_meta_delta(
            "title",
            MetaDelta::from_sides(Some(json!("Old")), Some(json!("New"))).unwrap(),
        );
        diff.set_item_diff("feature", [Delta::insert(v(5, json!({})))].into_iter().collect());
        assert!(!diff.is_empty());
        assert_eq!(diff.get_meta_delta("title").unwrap().new, Some(json!("New")));
        assert!(diff.get_item_delta("feature", &ItemKey::Int(5)).is_some());
        assert!(diff.get_item_delta("tile", &ItemKey::Int(5)).is_none());
        assert_eq!(diff.feature_count(), 1);
    }

    #[test]
    fn meta_revert_composes_to_nothing() {
        let mut first = DatasetDiff::new();
        first.insert_meta_delta("title", MetaDelta::from_sides(Some(json!("a")), Some(json!("b"))).unwrap());
        let mut second = DatasetDiff::new();
        second.insert_meta_delta("title", MetaDelta::from_sides(Some(json!("b")), Some(json!("a"))).unwrap());
        assert!(first.compose(second).is_empty());
    }

    #[test]
    fn repo_diff_skips_empty_datasets() {
        let mut repo = RepoDiff::new();
        repo.insert("unchanged", DatasetDiff::new());
        let mut changed = DatasetDiff::new();
        changed.set_item_diff("feature", [Delta::insert(v(1, json!({})))].into_iter().collect());
        repo.insert("changed", changed);
        assert_eq!(repo.paths().collect::<Vec<_>>(), vec!["changed"]);
        assert_eq!(repo.feature_count(), 1);
    }

    mod composition {
        use super::*;
        use proptest::prelude::*;

        type State = BTreeMap<i64, u8>;

        fn diff_states(old: &State, new: &State) -> DeltaDiff {
            let keys: std::collections::BTreeSet<i64> = old.keys().chain(new.keys()).copied().collect();
            keys.into_iter()
                .filter_map(|k| {
                    let side = |s: &State| s.get(&k).map(|x| v(k, json!(x)));
                    Delta::from_sides(side(old), side(new))
                })
                .collect()
        }

        fn summary(diff: &DeltaDiff) -> Vec<(ItemKey, Option<lode_types::ObjectId>, Option<lode_types::ObjectId>)> {
            diff.iter()
                .map(|(k, d)| {
                    (
                        k.clone(),
                        d.old().map(|x| x.content_id()),
                        d.new_value().map(|x| x.content_id()),
                    )
                })
                .collect()
        }

        fn state() -> impl Strategy<Value = State> {
            proptest::collection::btree_map(0i64..8, 0u8..3, 0..8)
        }

        proptest! {
            #[test]
            fn chained_diffs_equal_direct_diff(base in state(), target in state(), wc in state()) {
                let composed = diff_states(&base, &target).compose(diff_states(&target, &wc));
                prop_assert_eq!(summary(&composed), summary(&diff_states(&base, &wc)));
            }

            #[test]
            fn no_op_second_half_changes_nothing(base in state(), target in state()) {
                let first = diff_states(&base, &target);
                let composed = first.clone().compose(diff_states(&target, &target));
                prop_assert_eq!(summary(&composed), summary(&first));
            }
        }
    }
}
