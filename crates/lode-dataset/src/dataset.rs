use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use lode_store::{ObjectStore, Tree};
use lode_types::{ItemKey, ObjectId};
use serde_json::Value;

use crate::error::{DatasetError, DatasetResult};
use crate::schema::Schema;
use crate::types::DatasetType;

const META_DIR: &str = "meta";

/// Decode a meta item blob: JSON for `*.json` names, text otherwise.
pub(crate) fn decode_meta_item(name: &str, data: &[u8]) -> DatasetResult<Value> {
    if name.ends_with(".json") {
        serde_json::from_slice(data)
            .map_err(|e| DatasetError::invalid(name, format!("meta item is not JSON: {e}")))
    } else {
        String::from_utf8(data.to_vec())
            .map(Value::String)
            .map_err(|e| DatasetError::invalid(name, format!("meta item is not UTF-8: {e}")))
    }
}

/// One dataset within a snapshot.
///
/// Reading a dataset only touches trees and meta item blobs, which are always
/// present locally. Item blobs (features, tile pointers) are never read here;
/// they are identified by id and dereferenced lazily by the diff.
#[derive(Clone)]
pub struct Dataset {
    path: String,
    dataset_type: DatasetType,
    tree_id: ObjectId,
    tree: Tree,
    store: Arc<dyn ObjectStore>,
}

impl Dataset {
    /// Open the dataset whose marker tree (`.table-dataset` etc.) is `tree_id`.
    pub fn open(
        store: Arc<dyn ObjectStore>,
        path: impl Into<String>,
        dataset_type: DatasetType,
        tree_id: ObjectId,
    ) -> DatasetResult<Self> {
        let tree = store.read_tree(&tree_id)?;
        Ok(Self {
            path: path.into(),
            dataset_type,
            tree_id,
            tree,
            store,
        })
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn dataset_type(&self) -> DatasetType {
        self.dataset_type
    }

    /// Id of the dataset's marker tree. Equal ids mean identical datasets.
    pub fn tree_id(&self) -> ObjectId {
        self.tree_id
    }

    pub fn item_type(&self) -> &'static str {
        self.dataset_type.item_type()
    }

    pub fn store(&self) -> &Arc<dyn ObjectStore> {
        &self.store
    }

    fn subtree_id(&self, name: &str) -> Option<ObjectId> {
        self.tree
            .get(name)
            .filter(|e| e.is_tree())
            .map(|e| e.object_id)
    }

    /// Id of the `meta/` subtree, if the dataset has any meta items.
    pub fn meta_tree_id(&self) -> Option<ObjectId> {
        self.subtree_id(META_DIR)
    }

    /// Id of the items subtree (`feature/` or `tile/`).
    pub fn item_tree_id(&self) -> Option<ObjectId> {
        self.subtree_id(self.item_type())
    }

    /// All meta items, keyed by their path below `meta/` (e.g.
    /// `crs/EPSG:4326.wkt`).
    pub fn meta_items(&self) -> DatasetResult<BTreeMap<String, Value>> {
        let mut items = BTreeMap::new();
        if let Some(meta_id) = self.meta_tree_id() {
            self.collect_meta(&meta_id, "", &mut items)?;
        }
        Ok(items)
    }

    fn collect_meta(
        &self,
        tree_id: &ObjectId,
        prefix: &str,
        out: &mut BTreeMap<String, Value>,
    ) -> DatasetResult<()> {
        let tree = self.store.read_tree(tree_id)?;
        for entry in &tree.entries {
            let name = format!("{prefix}{}", entry.name);
            if entry.is_tree() {
                self.collect_meta(&entry.object_id, &format!("{name}/"), out)?;
            } else {
                let blob = self.store.read_blob(&entry.object_id)?;
                out.insert(name.clone(), decode_meta_item(&name, &blob.data)?);
            }
        }
        Ok(())
    }

    /// A single meta item, or `None` if absent.
    pub fn get_meta_item(&self, name: &str) -> DatasetResult<Option<Value>> {
        let Some(mut tree_id) = self.meta_tree_id() else {
            return Ok(None);
        };
        let mut parts = name.split('/').peekable();
        while let Some(part) = parts.next() {
            let tree = self.store.read_tree(&tree_id)?;
            let Some(entry) = tree.get(part) else {
                return Ok(None);
            };
            match (parts.peek().is_some(), entry.is_tree()) {
                (true, true) => tree_id = entry.object_id,
                (false, false) => {
                    let blob = self.store.read_blob(&entry.object_id)?;
                    return decode_meta_item(name, &blob.data).map(Some);
                }
                _ => return Ok(None),
            }
        }
        Ok(None)
    }

    /// The table schema, if this dataset has one.
    pub fn schema(&self) -> DatasetResult<Option<Schema>> {
        self.get_meta_item("schema.json")?
            .map(|v| Schema::from_json(&v))
            .transpose()
    }

    /// CRS definitions stored in this dataset, keyed by meta item name
    /// (`crs/EPSG:2193.wkt` for tables, `crs.wkt` for point clouds).
    pub fn crs_definitions(&self) -> DatasetResult<BTreeMap<String, String>> {
        let defs = self
            .meta_items()?
            .into_iter()
            .filter(|(name, _)| is_crs_meta_item(name))
            .filter_map(|(name, value)| match value {
                Value::String(wkt) => Some((name, wkt)),
                _ => None,
            })
            .collect();
        Ok(defs)
    }

    /// Every item key with the id of its blob, in key order.
    pub fn item_entries(&self) -> DatasetResult<BTreeMap<ItemKey, ObjectId>> {
        let Some(items_id) = self.item_tree_id() else {
            return Ok(BTreeMap::new());
        };
        let tree = self.store.read_tree(&items_id)?;
        let mut entries = BTreeMap::new();
        for entry in &tree.entries {
            if entry.is_tree() {
                return Err(DatasetError::invalid(
                    &self.path,
                    format!("unexpected subtree {:?} among items", entry.name),
                ));
            }
            entries.insert(ItemKey::parse_entry_name(&entry.name)?, entry.object_id);
        }
        Ok(entries)
    }

    /// Number of items, without reading any item blob.
    pub fn item_count(&self) -> DatasetResult<usize> {
        match self.item_tree_id() {
            Some(id) => Ok(self.store.read_tree(&id)?.len()),
            None => Ok(0),
        }
    }
}

/// `crs.wkt` or anything under `crs/`.
pub fn is_crs_meta_item(name: &str) -> bool {
    name == "crs.wkt" || name.starts_with("crs/")
}

impl fmt::Debug for Dataset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dataset")
            .field("path", &self.path)
            .field("type", &self.dataset_type)
            .field("tree", &self.tree_id.short_hex())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::DatasetBuilder;
    use lode_store::InMemoryObjectStore;
    use serde_json::json;

    fn store() -> Arc<dyn ObjectStore> {
        Arc::new(InMemoryObjectStore::new())
    }

    fn parcels(store: &Arc<dyn ObjectStore>) -> Dataset {
        let tree_id = DatasetBuilder::table("parcels")
            .meta_json(
                "schema.json",
                json!([
                    {"id": "a", "name": "fid", "dataType": "integer", "primaryKeyIndex": 0},
                    {"id": "b", "name": "geom", "dataType": "geometry", "geometryCrs": "EPSG:4326"}
                ]),
            )
            .meta_text("title", "Parcels")
            .meta_text("crs/EPSG:4326.wkt", "GEOGCS[\"WGS 84\",AUTHORITY[\"EPSG\",\"4326\"]]")
            .item(1, json!({"fid": 1, "geom": "POINT(1 1)"}))
            .item(10, json!({"fid": 10, "geom": "POINT(10 10)"}))
            .item(2, json!({"fid": 2, "geom": "POINT(2 2)"}))
            .write(store.as_ref())
            .unwrap();
        Dataset::open(store.clone(), "parcels", DatasetType::Table, tree_id).unwrap()
    }

    #[test]
    fn meta_items_include_nested_crs() {
        let store = store();
        let ds = parcels(&store);
        let meta = ds.meta_items().unwrap();
        assert_eq!(
            meta.keys().collect::<Vec<_>>(),
            vec!["crs/EPSG:4326.wkt", "schema.json", "title"]
        );
        assert_eq!(meta["title"], json!("Parcels"));
        assert!(meta["schema.json"].is_array());
    }

    #[test]
    fn get_single_meta_item() {
        let store = store();
        let ds = parcels(&store);
        assert_eq!(ds.get_meta_item("title").unwrap(), Some(json!("Parcels")));
        assert!(ds.get_meta_item("crs/EPSG:4326.wkt").unwrap().is_some());
        assert_eq!(ds.get_meta_item("crs").unwrap(), None);
        assert_eq!(ds.get_meta_item("description").unwrap(), None);
    }

    #[test]
    fn schema_and_crs() {
        let store = store();
        let ds = parcels(&store);
        assert_eq!(ds.schema().unwrap().unwrap().geometry_column().unwrap().name, "geom");
        let crs = ds.crs_definitions().unwrap();
        assert_eq!(crs.len(), 1);
        assert!(crs.contains_key("crs/EPSG:4326.wkt"));
    }

    #[test]
    fn item_entries_in_numeric_order() {
        let store = store();
        let ds = parcels(&store);
        let keys: Vec<ItemKey> = ds.item_entries().unwrap().into_keys().collect();
        assert_eq!(keys, vec![ItemKey::Int(1), ItemKey::Int(2), ItemKey::Int(10)]);
        assert_eq!(ds.item_count().unwrap(), 3);
    }

    #[test]
    fn item_entries_do_not_read_item_blobs() {
        let mem = Arc::new(InMemoryObjectStore::new());
        let store: Arc<dyn ObjectStore> = mem.clone();
        let ds = parcels(&store);
        for id in ds.item_entries().unwrap().values() {
            mem.evict_to_promised(id);
        }
        assert_eq!(ds.item_entries().unwrap().len(), 3);
    }

    #[test]
    fn point_cloud_crs_is_single_item() {
        let store = store();
        let tree_id = DatasetBuilder::point_cloud("lidar")
            .meta_text("crs.wkt", "PROJCS[\"NZGD2000\",AUTHORITY[\"EPSG\",\"2193\"]]")
            .item("tile_a", json!({"name": "tile_a", "nativeExtent": "0,1,0,1"}))
            .write(store.as_ref())
            .unwrap();
        let ds = Dataset::open(store, "lidar", DatasetType::PointCloud, tree_id).unwrap();
        assert_eq!(ds.item_type(), "tile");
        assert_eq!(ds.crs_definitions().unwrap().keys().collect::<Vec<_>>(), vec!["crs.wkt"]);
        assert!(ds.schema().unwrap().is_none());
    }
}
