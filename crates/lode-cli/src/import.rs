//! `lode import`: datasets described as JSON, committed or applied to the
//! working copy.
//!
//! ```json
//! {
//!   "message": "Add parcels",
//!   "datasets": [{
//!     "path": "parcels",
//!     "type": "table",
//!     "meta": {"schema.json": [...], "crs/EPSG:4326.wkt": "GEOGCS[...]"},
//!     "items": [{"fid": 1, "geom": "POINT(1 1)"}],
//!     "delete": [7]
//!   }]
//! }
//! ```
//!
//! Items may be a list, keyed by the primary key column (or `name` for
//! tiles), or an object keyed by item key.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{anyhow, bail, Context};
use lode_dataset::Schema;
use lode_sdk::{Dataset, DatasetBuilder, DatasetType, ItemKey, ObjectId, Repository, RepoTreeBuilder};
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

const DEFAULT_AUTHOR: &str = "Lode <lode@localhost>";

#[derive(Debug, Deserialize)]
pub struct ImportFile {
    #[serde(default)]
    pub message: Option<String>,
    pub datasets: Vec<DatasetSpec>,
}

#[derive(Debug, Deserialize)]
pub struct DatasetSpec {
    pub path: String,
    #[serde(rename = "type", default = "default_type")]
    pub dataset_type: DatasetType,
    #[serde(default)]
    pub meta: BTreeMap<String, Value>,
    #[serde(default)]
    pub items: Items,
    /// Keys to remove. Only meaningful with `--working-copy`.
    #[serde(default)]
    pub delete: Vec<Value>,
}

fn default_type() -> DatasetType {
    DatasetType::Table
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum Items {
    List(Vec<Value>),
    Keyed(BTreeMap<String, Value>),
}

impl Default for Items {
    fn default() -> Self {
        Items::List(Vec::new())
    }
}

pub fn load(path: &Path) -> anyhow::Result<ImportFile> {
    let text = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))
}

impl DatasetSpec {
    /// The field that keys list items: the schema's primary key for
    /// tables, `name` for tiles.
    fn key_column(&self, existing: Option<&Dataset>) -> anyhow::Result<String> {
        if self.dataset_type == DatasetType::PointCloud {
            return Ok("name".to_string());
        }
        let schema = match self.meta.get("schema.json") {
            Some(value) => Some(Schema::from_json(value)?),
            None => match existing {
                Some(ds) => ds.schema()?,
                None => None,
            },
        };
        schema
            .as_ref()
            .and_then(Schema::pk_column)
            .map(|c| c.name.clone())
            .ok_or_else(|| {
                anyhow!(
                    "dataset {}: items are listed but there is no primary key column; \
                     give them as an object keyed by primary key",
                    self.path
                )
            })
    }

    fn keyed_items(&self, existing: Option<&Dataset>) -> anyhow::Result<Vec<(ItemKey, Value)>> {
        match &self.items {
            Items::Keyed(map) => Ok(map
                .iter()
                .map(|(k, v)| (ItemKey::parse(k), v.clone()))
                .collect()),
            Items::List(list) if list.is_empty() => Ok(Vec::new()),
            Items::List(list) => {
                let column = self.key_column(existing)?;
                list.iter()
                    .map(|item| {
                        let raw = item.get(&column).ok_or_else(|| {
                            anyhow!("dataset {}: item without {column}: {item}", self.path)
                        })?;
                        let key = ItemKey::from_json(raw)
                            .with_context(|| format!("dataset {}: bad key", self.path))?;
                        Ok((key, item.clone()))
                    })
                    .collect()
            }
        }
    }

    fn deleted_keys(&self) -> anyhow::Result<Vec<ItemKey>> {
        self.delete
            .iter()
            .map(|k| ItemKey::from_json(k).with_context(|| format!("dataset {}: bad key", self.path)))
            .collect()
    }

    fn builder(&self) -> anyhow::Result<DatasetBuilder> {
        let mut builder = DatasetBuilder::new(self.path.as_str(), self.dataset_type);
        for (name, value) in &self.meta {
            builder = builder.meta_json(name.as_str(), value.clone());
        }
        for (key, value) in self.keyed_items(None)? {
            builder = builder.item(key, value);
        }
        Ok(builder)
    }
}

/// Commit every dataset in `file` on top of `HEAD`, replacing datasets
/// at the same paths.
pub fn commit(repo: &mut Repository, file: &ImportFile, message: Option<String>) -> anyhow::Result<ObjectId> {
    let head = repo.structure("HEAD")?;
    let mut tree = RepoTreeBuilder::from_structure(&head)?;
    for spec in &file.datasets {
        if !spec.delete.is_empty() {
            bail!("dataset {}: \"delete\" needs --working-copy", spec.path);
        }
        tree.add(repo.store().as_ref(), &spec.builder()?)?;
        debug!(path = %spec.path, "imported dataset");
    }
    let tree = tree.write(repo.store().as_ref())?;
    let message = message
        .or_else(|| file.message.clone())
        .unwrap_or_else(|| format!("Import {} dataset(s)", file.datasets.len()));
    let author = std::env::var("LODE_AUTHOR").unwrap_or_else(|_| DEFAULT_AUTHOR.to_string());
    Ok(repo.commit_tree(tree, &message, &author)?)
}

/// Apply every dataset in `file` to the working copy as uncommitted edits.
/// Returns the number of items and meta items touched.
pub fn apply_to_working_copy(repo: &mut Repository, file: &ImportFile) -> anyhow::Result<usize> {
    let head_datasets = repo.structure("HEAD")?.datasets()?;
    let mut edits = Vec::new();
    for spec in &file.datasets {
        let existing = head_datasets.get(&spec.path);
        if existing.is_none() {
            bail!(
                "dataset {} is not in HEAD; only existing datasets can be edited in the working copy",
                spec.path
            );
        }
        edits.push((spec, spec.keyed_items(existing)?, spec.deleted_keys()?));
    }

    let mut touched = 0;
    let wc = repo.working_copy_mut();
    for (spec, items, deleted) in edits {
        for (name, value) in &spec.meta {
            wc.set_meta_item(&spec.path, name, Some(value.clone()));
            touched += 1;
        }
        for (key, value) in items {
            wc.upsert_item(&spec.path, key, value);
            touched += 1;
        }
        for key in deleted {
            wc.delete_item(&spec.path, key);
            touched += 1;
        }
    }
    repo.save_working_copy()?;
    Ok(touched)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parcels_file() -> ImportFile {
        serde_json::from_value(json!({
            "message": "Add parcels",
            "datasets": [{
                "path": "parcels",
                "meta": {
                    "schema.json": [
                        {"id": "c1", "name": "fid", "dataType": "integer", "primaryKeyIndex": 0},
                        {"id": "c2", "name": "geom", "dataType": "geometry"}
                    ],
                    "crs/EPSG:4326.wkt": "GEOGCS[\"WGS 84\",AUTHORITY[\"EPSG\",\"4326\"]]"
                },
                "items": [
                    {"fid": 1, "geom": "POINT(1 1)"},
                    {"fid": 2, "geom": "POINT(2 2)"}
                ]
            }]
        }))
        .unwrap()
    }

    #[test]
    fn parses_defaults() {
        let file: ImportFile =
            serde_json::from_value(json!({"datasets": [{"path": "a"}]})).unwrap();
        assert!(file.message.is_none());
        assert_eq!(file.datasets[0].dataset_type, DatasetType::Table);
        assert!(matches!(&file.datasets[0].items, Items::List(l) if l.is_empty()));

        let file: ImportFile = serde_json::from_value(
            json!({"datasets": [{"path": "lidar", "type": "point-cloud", "items": {"a.laz": {"name": "a.laz"}}}]}),
        )
        .unwrap();
        assert_eq!(file.datasets[0].dataset_type, DatasetType::PointCloud);
        assert!(matches!(&file.datasets[0].items, Items::Keyed(_)));
    }

    #[test]
    fn list_items_are_keyed_by_primary_key() {
        let file = parcels_file();
        let keys: Vec<ItemKey> = file.datasets[0]
            .keyed_items(None)
            .unwrap()
            .into_iter()
            .map(|(k, _)| k)
            .collect();
        assert_eq!(keys, vec![ItemKey::Int(1), ItemKey::Int(2)]);
    }

    #[test]
    fn listed_items_need_a_primary_key() {
        let file: ImportFile = serde_json::from_value(
            json!({"datasets": [{"path": "a", "items": [{"fid": 1}]}]}),
        )
        .unwrap();
        let err = file.datasets[0].keyed_items(None).unwrap_err();
        assert!(err.to_string().contains("no primary key column"));
    }

    #[test]
    fn tiles_are_keyed_by_name() {
        let file: ImportFile = serde_json::from_value(json!({"datasets": [{
            "path": "lidar", "type": "point-cloud",
            "items": [{"name": "a.laz", "points": 10}]
        }]}))
        .unwrap();
        let items = file.datasets[0].keyed_items(None).unwrap();
        assert_eq!(items[0].0, ItemKey::Str("a.laz".into()));
    }

    #[test]
    fn commit_then_edit_working_copy() {
        let dir = tempfile::tempdir().unwrap();
        let mut repo = Repository::init(dir.path()).unwrap();
        let id = commit(&mut repo, &parcels_file(), None).unwrap();
        assert_eq!(repo.head_commit().unwrap(), Some(id));

        let head = repo.structure("HEAD").unwrap();
        let commit_obj = head.read_commit().unwrap().unwrap();
        assert_eq!(commit_obj.message, "Add parcels");
        let datasets = head.datasets().unwrap();
        assert_eq!(datasets.get("parcels").unwrap().item_count().unwrap(), 2);

        let edits: ImportFile = serde_json::from_value(json!({"datasets": [{
            "path": "parcels",
            "items": [{"fid": 3, "geom": "POINT(3 3)"}],
            "delete": [1]
        }]}))
        .unwrap();
        assert_eq!(apply_to_working_copy(&mut repo, &edits).unwrap(), 2);
        assert!(repo.working_copy().is_dirty());

        let reopened = Repository::open(dir.path()).unwrap();
        assert!(reopened.working_copy().is_dirty());
    }

    #[test]
    fn working_copy_edits_need_an_existing_dataset() {
        let mut repo = Repository::in_memory().unwrap();
        let err = apply_to_working_copy(&mut repo, &parcels_file()).unwrap_err();
        assert!(err.to_string().contains("not in HEAD"));
    }

    #[test]
    fn deletes_are_rejected_when_committing() {
        let mut repo = Repository::in_memory().unwrap();
        let file: ImportFile =
            serde_json::from_value(json!({"datasets": [{"path": "a", "delete": [1]}]})).unwrap();
        assert!(commit(&mut repo, &file, Some("x".into())).is_err());
    }
}
