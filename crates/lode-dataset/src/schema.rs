//! Table schemas, stored as the `schema.json` meta item.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{DatasetError, DatasetResult};

/// One column of a table dataset.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnSchema {
    pub id: String,
    pub name: String,
    pub data_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_key_index: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub geometry_type: Option<String>,
    /// CRS identifier of a geometry column, e.g. `EPSG:2193`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub geometry_crs: Option<String>,
}

impl ColumnSchema {
    pub fn is_geometry(&self) -> bool {
        self.data_type == "geometry"
    }
}

/// Ordered column definitions of a table dataset.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Schema {
    pub columns: Vec<ColumnSchema>,
}

impl Schema {
    pub fn new(columns: Vec<ColumnSchema>) -> Self {
        Self { columns }
    }

    pub fn from_json(value: &Value) -> DatasetResult<Self> {
        serde_json::from_value(value.clone()).map_err(|e| DatasetError::Schema(e.to_string()))
    }

    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    /// The first geometry-typed column, if any.
    pub fn geometry_column(&self) -> Option<&ColumnSchema> {
        self.columns.iter().find(|c| c.is_geometry())
    }

    /// The primary key column (lowest `primaryKeyIndex`).
    pub fn pk_column(&self) -> Option<&ColumnSchema> {
        self.columns
            .iter()
            .filter(|c| c.primary_key_index.is_some())
            .min_by_key(|c| c.primary_key_index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parcels_schema() -> Value {
        json!([
            {"id": "c1", "name": "fid", "dataType": "integer", "primaryKeyIndex": 0},
            {"id": "c2", "name": "geom", "dataType": "geometry",
             "geometryType": "POLYGON", "geometryCrs": "EPSG:4326"},
            {"id": "c3", "name": "owner", "dataType": "text"}
        ])
    }

    #[test]
    fn finds_geometry_and_pk_columns() {
        let schema = Schema::from_json(&parcels_schema()).unwrap();
        assert_eq!(schema.geometry_column().unwrap().name, "geom");
        assert_eq!(
            schema.geometry_column().unwrap().geometry_crs.as_deref(),
            Some("EPSG:4326")
        );
        assert_eq!(schema.pk_column().unwrap().name, "fid");
    }

    #[test]
    fn camel_case_roundtrip() {
        let schema = Schema::from_json(&parcels_schema()).unwrap();
        assert_eq!(schema.to_json(), parcels_schema());
    }

    #[test]
    fn no_geometry_column() {
        let schema = Schema::from_json(&json!([
            {"id": "a", "name": "fid", "dataType": "integer", "primaryKeyIndex": 0}
        ]))
        .unwrap();
        assert!(schema.geometry_column().is_none());
    }

    #[test]
    fn malformed_schema() {
        assert!(matches!(
            Schema::from_json(&json!({"not": "a list"})),
            Err(DatasetError::Schema(_))
        ));
    }
}
