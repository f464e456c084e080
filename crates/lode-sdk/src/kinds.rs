//! What differs between dataset types when diffing.
//!
//! Each dataset type is handled by one [`DatasetKind`], chosen once per
//! dataset path with [`kind_for`].

use lode_dataset::{dataset::is_crs_meta_item, Dataset, DatasetType, Schema};
use lode_diff::{DatasetDiff, DeltaValue};
use lode_spatial::{make_crs, Crs, ResolvedSpatialFilter, SpatialError, SpatialFilter};
use serde_json::Value;

use crate::error::{SdkError, SdkResult};

/// How a dataset's deltas are made ready for output.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FetchPolicy {
    /// Blobs may be missing from a partial clone and are fetched on demand.
    Promissory,
    /// Blobs are always local. A promised blob is an integrity failure.
    Strict,
}

/// Old and new resolved spatial filters for one dataset.
pub type FilterPair = (ResolvedSpatialFilter, ResolvedSpatialFilter);

/// What the diff writer needs to know about one dataset type.
pub trait DatasetKind: Send + Sync {
    fn dataset_type(&self) -> DatasetType;

    /// What the dataset's items are called (`feature`, `tile`).
    fn item_type(&self) -> &'static str {
        self.dataset_type().item_type()
    }

    /// The CRS before and after `ds_diff`. `context` says what the CRS is
    /// needed for and appears in errors.
    fn old_and_new_crs(
        &self,
        ds: &Dataset,
        ds_diff: &DatasetDiff,
        context: &str,
    ) -> SdkResult<(Option<Crs>, Option<Crs>)>;

    /// `filter` resolved for the dataset before and after `ds_diff`.
    fn spatial_filters(
        &self,
        filter: &SpatialFilter,
        ds: &Dataset,
        ds_diff: &DatasetDiff,
    ) -> SdkResult<FilterPair>;

    fn fetch_policy(&self) -> FetchPolicy;

    /// Whether output geometries can be reprojected to a requested CRS.
    fn supports_reprojection(&self) -> bool;
}

/// Vector datasets: a schema names the geometry column, and the CRS lives
/// in `crs/<id>.wkt` meta items.
#[derive(Clone, Copy, Debug, Default)]
pub struct TableKind;

/// Point clouds: tiles carry their extent, and the CRS lives in `crs.wkt`.
#[derive(Clone, Copy, Debug, Default)]
pub struct PointCloudKind;

/// The handler for `dataset_type`.
pub fn kind_for(dataset_type: DatasetType) -> &'static dyn DatasetKind {
    match dataset_type {
        DatasetType::Table => &TableKind,
        DatasetType::PointCloud => &PointCloudKind,
    }
}

impl TableKind {
    /// The schema before and after `ds_diff`.
    pub fn old_and_new_schema(
        &self,
        ds: &Dataset,
        ds_diff: &DatasetDiff,
    ) -> SdkResult<(Option<Schema>, Option<Schema>)> {
        if let Some(delta) = ds_diff.get_meta_delta("schema.json") {
            let parse = |v: &Option<Value>| v.as_ref().map(Schema::from_json).transpose();
            return Ok((parse(&delta.old)?, parse(&delta.new)?));
        }
        let schema = ds.schema()?;
        Ok((schema.clone(), schema))
    }
}

impl DatasetKind for TableKind {
    fn dataset_type(&self) -> DatasetType {
        DatasetType::Table
    }

    fn old_and_new_crs(
        &self,
        ds: &Dataset,
        ds_diff: &DatasetDiff,
        context: &str,
    ) -> SdkResult<(Option<Crs>, Option<Crs>)> {
        let ds_path = ds.path();
        let crs_deltas: Vec<_> = ds_diff
            .meta()
            .filter(|(name, _)| is_crs_meta_item(name))
            .map(|(_, delta)| delta)
            .collect();
        let old_defs: Vec<&Value> = crs_deltas.iter().filter_map(|d| d.old.as_ref()).collect();
        let new_defs: Vec<&Value> = crs_deltas.iter().filter_map(|d| d.new.as_ref()).collect();
        if old_defs.len() > 1 || new_defs.len() > 1 {
            return Err(multi_crs_error(ds_path, context));
        }
        if !old_defs.is_empty() || !new_defs.is_empty() {
            let old = old_defs.first().map(|v| crs_from_value(v, ds_path)).transpose()?;
            let new = new_defs.first().map(|v| crs_from_value(v, ds_path)).transpose()?;
            return Ok((old, new));
        }

        let definitions = ds.crs_definitions()?;
        let mut stored = definitions.values();
        let crs = match (stored.next(), stored.next()) {
            (None, _) => None,
            (Some(def), None) => Some(make_crs(def, ds_path)?),
            (Some(_), Some(_)) => return Err(multi_crs_error(ds_path, context)),
        };
        Ok((crs.clone(), crs))
    }

    fn spatial_filters(
        &self,
        filter: &SpatialFilter,
        ds: &Dataset,
        ds_diff: &DatasetDiff,
    ) -> SdkResult<FilterPair> {
        let (old_schema, new_schema) = self.old_and_new_schema(ds, ds_diff)?;
        let (old_crs, new_crs) = self.old_and_new_crs(ds, ds_diff, "spatial filtering")?;
        let resolve = |schema: Option<Schema>, crs: Option<Crs>| -> SdkResult<ResolvedSpatialFilter> {
            match schema {
                Some(schema) => filter
                    .transform_for_table_schema_and_crs(
                        schema.geometry_column().map(|c| c.name.as_str()),
                        crs.as_ref(),
                        ds.path(),
                    )
                    .map_err(|e| spatial_filter_error(ds.path(), e)),
                None => Ok(ResolvedSpatialFilter::match_all()),
            }
        };
        Ok((resolve(old_schema, old_crs)?, resolve(new_schema, new_crs)?))
    }

    fn fetch_policy(&self) -> FetchPolicy {
        FetchPolicy::Promissory
    }

    fn supports_reprojection(&self) -> bool {
        true
    }
}

impl DatasetKind for PointCloudKind {
    fn dataset_type(&self) -> DatasetType {
        DatasetType::PointCloud
    }

    fn old_and_new_crs(
        &self,
        ds: &Dataset,
        ds_diff: &DatasetDiff,
        _context: &str,
    ) -> SdkResult<(Option<Crs>, Option<Crs>)> {
        let ds_path = ds.path();
        if let Some(delta) = ds_diff.get_meta_delta("crs.wkt") {
            let old = delta.old.as_ref().map(|v| crs_from_value(v, ds_path)).transpose()?;
            let new = delta.new.as_ref().map(|v| crs_from_value(v, ds_path)).transpose()?;
            return Ok((old, new));
        }
        let crs = ds
            .get_meta_item("crs.wkt")?
            .map(|v| crs_from_value(&v, ds_path))
            .transpose()?;
        Ok((crs.clone(), crs))
    }

    fn spatial_filters(
        &self,
        filter: &SpatialFilter,
        ds: &Dataset,
        ds_diff: &DatasetDiff,
    ) -> SdkResult<FilterPair> {
        let (old_crs, new_crs) = self.old_and_new_crs(ds, ds_diff, "spatial filtering")?;
        let resolve = |crs: Option<Crs>| -> SdkResult<ResolvedSpatialFilter> {
            match crs {
                Some(crs) => filter
                    .transform_for_point_cloud_crs(Some(&crs), ds.path())
                    .map_err(|e| spatial_filter_error(ds.path(), e)),
                None => Ok(ResolvedSpatialFilter::match_all()),
            }
        };
        Ok((resolve(old_crs)?, resolve(new_crs)?))
    }

    fn fetch_policy(&self) -> FetchPolicy {
        FetchPolicy::Strict
    }

    fn supports_reprojection(&self) -> bool {
        false
    }
}

/// Whether `value` matches `filter`. An absent value never matches, and
/// neither does one left out of a partial clone: partial clones omit exactly
/// the items outside the filter.
pub fn matches_delta_value(
    filter: &ResolvedSpatialFilter,
    value: Option<&DeltaValue>,
) -> SdkResult<bool> {
    let Some(value) = value else {
        return Ok(false);
    };
    if filter.is_match_all() {
        return Ok(true);
    }
    match value.value() {
        Ok(content) => Ok(filter.matches_value(content)),
        Err(e) if e.is_promised() => Ok(false),
        Err(e) => Err(e.into()),
    }
}

fn crs_from_value(value: &Value, ds_path: &str) -> SdkResult<Crs> {
    let definition = match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    Ok(make_crs(&definition, ds_path)?)
}

fn spatial_filter_error(ds_path: &str, e: SpatialError) -> SdkError {
    SdkError::Crs(format!(
        "Can't reproject spatial filter into CRS of dataset {ds_path:?} for spatial filtering: {e}"
    ))
}

fn multi_crs_error(ds_path: &str, context: &str) -> SdkError {
    let mut message = format!("Sorry, multiple CRS definitions at '{ds_path}' are not yet supported");
    if !context.is_empty() {
        message.push_str(" for ");
        message.push_str(context);
    }
    SdkError::Crs(message)
}
