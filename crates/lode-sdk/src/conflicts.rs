//! Items in the working copy that collide with items outside the spatial
//! filter.
//!
//! A partial clone only holds items inside the filter. A new item inserted
//! in the working copy can reuse the key of an item the clone never saw;
//! committing it would silently replace that item.

use std::collections::{BTreeMap, BTreeSet};

use lode_diff::Delta;
use lode_types::ItemKey;

use crate::config::DiffConfig;

/// How many conflicting keys to list per dataset.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ConflictLimits {
    /// Keys shown when the list is truncated.
    pub inline: usize,
    /// Lists up to this long are shown in full.
    pub full: usize,
}

impl Default for ConflictLimits {
    fn default() -> Self {
        Self::from(&DiffConfig::default())
    }
}

impl From<&DiffConfig> for ConflictLimits {
    fn from(config: &DiffConfig) -> Self {
        Self {
            inline: config.conflict_inline_limit,
            full: config.conflict_full_limit,
        }
    }
}

/// Conflicting keys grouped by dataset path, then item type.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SpatialFilterConflicts {
    by_dataset: BTreeMap<String, BTreeMap<String, BTreeSet<ItemKey>>>,
}

impl SpatialFilterConflicts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, ds_path: &str, item_type: &str, key: ItemKey) {
        self.by_dataset
            .entry(ds_path.to_string())
            .or_default()
            .entry(item_type.to_string())
            .or_default()
            .insert(key);
    }

    /// Record the outcome of testing `delta` against the old and new
    /// filters. Only an item that already existed outside the old filter and
    /// still exists afterwards is a conflict.
    pub fn record_stat(
        &mut self,
        ds_path: &str,
        item_type: &str,
        key: &ItemKey,
        delta: &Delta,
        old_matched: bool,
        _new_matched: bool,
    ) {
        if !old_matched && delta.old().is_some() && delta.new_value().is_some() {
            self.record(ds_path, item_type, key.clone());
        }
    }

    pub fn is_empty(&self) -> bool {
        self.by_dataset.is_empty()
    }

    pub fn len(&self) -> usize {
        self.by_dataset
            .values()
            .flat_map(|types| types.values())
            .map(BTreeSet::len)
            .sum()
    }

    pub fn get(&self, ds_path: &str, item_type: &str) -> Option<&BTreeSet<ItemKey>> {
        self.by_dataset.get(ds_path)?.get(item_type)
    }

    /// Conflicts regrouped as item type, then dataset path.
    pub fn by_item_type(&self) -> BTreeMap<&str, BTreeMap<&str, &BTreeSet<ItemKey>>> {
        let mut grouped: BTreeMap<&str, BTreeMap<&str, &BTreeSet<ItemKey>>> = BTreeMap::new();
        for (ds_path, types) in &self.by_dataset {
            for (item_type, keys) in types {
                grouped
                    .entry(item_type.as_str())
                    .or_default()
                    .insert(ds_path.as_str(), keys);
            }
        }
        grouped
    }

    /// The warning shown after a diff, one block per item type. Empty when
    /// nothing conflicts.
    pub fn render_warnings(&self, limits: ConflictLimits) -> Vec<String> {
        let mut lines = Vec::new();
        for (item_type, datasets) in self.by_item_type() {
            let prop = if item_type == "feature" { "primary key value" } else { "name" };
            lines.push(format!(
                "Warning: Some {prop}s of newly-inserted {item_type}s in the working copy \
                 conflict with other {item_type}s outside the spatial filter - if committed, \
                 they would overwrite those {item_type}s."
            ));
            for (ds_path, keys) in datasets {
                lines.push(format!(
                    "  In dataset {ds_path} the conflicting {prop}s are: {}",
                    key_list(keys, limits)
                ));
            }
            lines.push(format!("  To continue, change the {prop}s of those {item_type}s."));
        }
        lines
    }
}

fn key_list(keys: &BTreeSet<ItemKey>, limits: ConflictLimits) -> String {
    let mut shown: Vec<String> = keys.iter().map(ToString::to_string).collect();
    if shown.len() <= limits.full {
        return shown.join(", ");
    }
    let inline = limits.inline.min(shown.len());
    let hidden = shown.len() - inline;
    shown.truncate(inline);
    format!("{}, (... {hidden} more)", shown.join(", "))
}
