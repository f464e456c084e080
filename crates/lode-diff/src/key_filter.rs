//! User-specified restrictions to datasets and item keys.
//!
//! Patterns take one of these forms:
//!
//! ```text
//! DATASET                     everything in the dataset
//! DATASET:KEY                 one item, of whatever item type the dataset holds
//! DATASET:ITEM_TYPE           every item of one type (feature, tile or meta)
//! DATASET:ITEM_TYPE:KEY       one item of one type
//! ```

use std::collections::{BTreeMap, BTreeSet};

use lode_types::ItemKey;

use crate::error::{DiffError, DiffResult};

/// Item type name under which meta items are filtered.
pub const META_ITEM_TYPE: &str = "meta";

const ITEM_TYPES: &[&str] = &["feature", "tile", META_ITEM_TYPE];

/// A set of keys, or everything.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct KeySet {
    match_all: bool,
    keys: BTreeSet<ItemKey>,
}

impl KeySet {
    pub fn match_all() -> Self {
        Self {
            match_all: true,
            keys: BTreeSet::new(),
        }
    }

    pub fn is_match_all(&self) -> bool {
        self.match_all
    }

    /// Lets nothing through.
    pub fn is_empty(&self) -> bool {
        !self.match_all && self.keys.is_empty()
    }

    pub fn contains(&self, key: &ItemKey) -> bool {
        self.match_all || self.keys.contains(key)
    }

    fn add(&mut self, key: Option<ItemKey>) {
        match key {
            Some(key) if !self.match_all => {
                self.keys.insert(key);
            }
            Some(_) => {}
            None => {
                self.match_all = true;
                self.keys.clear();
            }
        }
    }

    fn union(&self, other: &KeySet) -> KeySet {
        if self.match_all || other.match_all {
            return KeySet::match_all();
        }
        KeySet {
            match_all: false,
            keys: self.keys.union(&other.keys).cloned().collect(),
        }
    }
}

/// The filter for one dataset.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DatasetKeyFilter {
    match_all: bool,
    /// Keys given without an item type.
    any_item: KeySet,
    item_types: BTreeMap<String, KeySet>,
}

impl DatasetKeyFilter {
    pub fn match_all() -> Self {
        Self {
            match_all: true,
            ..Self::default()
        }
    }

    /// A filter that lets nothing through.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_match_all(&self) -> bool {
        self.match_all
    }

    /// Keys of `item_type` that pass.
    pub fn item_keys(&self, item_type: &str) -> KeySet {
        if self.match_all {
            return KeySet::match_all();
        }
        let typed = self.item_types.get(item_type).cloned().unwrap_or_default();
        if item_type == META_ITEM_TYPE {
            typed
        } else {
            typed.union(&self.any_item)
        }
    }

    pub fn matches_item(&self, item_type: &str, key: &ItemKey) -> bool {
        self.match_all || self.item_keys(item_type).contains(key)
    }

    pub fn matches_meta(&self, name: &str) -> bool {
        self.match_all || self.matches_item(META_ITEM_TYPE, &ItemKey::Str(name.to_string()))
    }

    fn add(&mut self, item_type: Option<&str>, key: Option<ItemKey>) {
        if self.match_all {
            return;
        }
        match (item_type, key) {
            (None, None) => {
                self.match_all = true;
                self.any_item = KeySet::default();
                self.item_types.clear();
            }
            (None, Some(key)) => self.any_item.add(Some(key)),
            (Some(item_type), key) => self
                .item_types
                .entry(item_type.to_string())
                .or_default()
                .add(key),
        }
    }
}

/// The filter for a whole repository.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RepoKeyFilter {
    match_all: bool,
    datasets: BTreeMap<String, DatasetKeyFilter>,
}

impl RepoKeyFilter {
    pub fn match_all() -> Self {
        Self {
            match_all: true,
            datasets: BTreeMap::new(),
        }
    }

    /// Build from command-line patterns. No patterns means match everything.
    pub fn build_from_user_patterns<S: AsRef<str>>(patterns: &[S]) -> DiffResult<Self> {
        if patterns.is_empty() {
            return Ok(Self::match_all());
        }
        let mut filter = Self::default();
        for pattern in patterns {
            filter.add_pattern(pattern.as_ref())?;
        }
        Ok(filter)
    }

    fn add_pattern(&mut self, pattern: &str) -> DiffResult<()> {
        let invalid = |reason: &str| DiffError::InvalidFilter {
            pattern: pattern.to_string(),
            reason: reason.to_string(),
        };
        let mut parts = pattern.splitn(3, ':');
        let ds_path = parts.next().unwrap_or_default().trim_matches('/');
        if ds_path.is_empty() {
            return Err(invalid("no dataset path"));
        }
        let (item_type, key) = match (parts.next(), parts.next()) {
            (None, _) => (None, None),
            (Some(""), _) => return Err(invalid("empty item type or key")),
            (Some(second), None) if ITEM_TYPES.contains(&second) => (Some(second), None),
            (Some(second), None) => (None, Some(ItemKey::parse(second))),
            (Some(second), Some(third)) => {
                if !ITEM_TYPES.contains(&second) {
                    return Err(invalid(&format!("unknown item type {second:?}")));
                }
                if third.is_empty() {
                    return Err(invalid("empty key"));
                }
                let key = if second == META_ITEM_TYPE {
                    ItemKey::Str(third.to_string())
                } else {
                    ItemKey::parse(third)
                };
                (Some(second), Some(key))
            }
        };
        self.datasets
            .entry(ds_path.to_string())
            .or_default()
            .add(item_type, key);
        Ok(())
    }

    pub fn is_match_all(&self) -> bool {
        self.match_all
    }

    pub fn contains_dataset(&self, ds_path: &str) -> bool {
        self.match_all || self.datasets.contains_key(ds_path)
    }

    /// The filter for `ds_path`. Datasets not named by a restrictive filter
    /// get a filter that lets nothing through.
    pub fn dataset(&self, ds_path: &str) -> DatasetKeyFilter {
        if self.match_all {
            return DatasetKeyFilter::match_all();
        }
        self.datasets.get(ds_path).cloned().unwrap_or_default()
    }

    /// Dataset paths named by the patterns.
    pub fn explicit_paths(&self) -> impl Iterator<Item = &str> {
        self.datasets.keys().map(String::as_str)
    }

    /// Paths worth diffing: those present on either side that pass the
    /// filter, sorted and without duplicates.
    pub fn candidate_paths<'a>(
        &self,
        base: impl IntoIterator<Item = &'a str>,
        target: impl IntoIterator<Item = &'a str>,
    ) -> Vec<String> {
        base.into_iter()
            .chain(target)
            .filter(|p| self.contains_dataset(p))
            .map(String::from)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_patterns_matches_everything() {
        let f = RepoKeyFilter::build_from_user_patterns::<String>(&[]).unwrap();
        assert!(f.is_match_all());
        let ds = f.dataset("anything");
        assert!(ds.is_match_all());
        assert!(ds.matches_item("feature", &ItemKey::Int(1)));
        assert!(ds.matches_meta("schema.json"));
    }

    #[test]
    fn dataset_only_pattern() {
        let f = RepoKeyFilter::build_from_user_patterns(&["nz/parcels"]).unwrap();
        assert!(f.contains_dataset("nz/parcels"));
        assert!(!f.contains_dataset("nz/roads"));
        assert!(f.dataset("nz/parcels").is_match_all());
        assert!(!f.dataset("nz/roads").matches_item("feature", &ItemKey::Int(1)));
    }

    #[test]
    fn bare_key_applies_to_any_item_type_but_not_meta() {
        let f = RepoKeyFilter::build_from_user_patterns(&["parcels:42", "lidar:tile_a"]).unwrap();
        let parcels = f.dataset("parcels");
        assert!(parcels.matches_item("feature", &ItemKey::Int(42)));
        assert!(!parcels.matches_item("feature", &ItemKey::Int(43)));
        assert!(!parcels.matches_meta("schema.json"));
        assert!(f.dataset("lidar").matches_item("tile", &ItemKey::from("tile_a")));
    }

    #[test]
    fn typed_patterns() {
        let f = RepoKeyFilter::build_from_user_patterns(&[
            "parcels:meta:title",
            "parcels:feature:7",
            "roads:feature",
        ])
        .unwrap();
        let parcels = f.dataset("parcels");
        assert!(parcels.matches_meta("title"));
        assert!(!parcels.matches_meta("schema.json"));
        assert!(parcels.matches_item("feature", &ItemKey::Int(7)));
        let roads = f.dataset("roads");
        assert!(roads.matches_item("feature", &ItemKey::Int(1_000)));
        assert!(!roads.matches_meta("title"));
    }

    #[test]
    fn whole_dataset_pattern_wins() {
        let f = RepoKeyFilter::build_from_user_patterns(&["parcels:1", "parcels"]).unwrap();
        assert!(f.dataset("parcels").is_match_all());
    }

    #[test]
    fn invalid_patterns() {
        assert!(RepoKeyFilter::build_from_user_patterns(&[":1"]).is_err());
        assert!(RepoKeyFilter::build_from_user_patterns(&["parcels:"]).is_err());
        assert!(RepoKeyFilter::build_from_user_patterns(&["parcels:widget:1"]).is_err());
        assert!(RepoKeyFilter::build_from_user_patterns(&["parcels:feature:"]).is_err());
    }

    #[test]
    fn candidate_paths_are_sorted_union() {
        let all = RepoKeyFilter::match_all();
        assert_eq!(
            all.candidate_paths(["b", "a"], ["c", "a"]),
            vec!["a".to_string(), "b".into(), "c".into()]
        );
        let only_b = RepoKeyFilter::build_from_user_patterns(&["b", "zzz"]).unwrap();
        assert_eq!(only_b.candidate_paths(["b", "a"], ["c"]), vec!["b".to_string()]);
    }
}
