//! The repository spatial filter and its per-dataset form.

use geo::Intersects;
use geo_types::Geometry;
use serde_json::Value;

use crate::crs::{make_crs, Crs};
use crate::error::SpatialResult;
use crate::geometry::{parse_wkt, Envelope};
use crate::transform::CoordinateTransform;

/// Tile pointer field holding the tile extent in the dataset's CRS.
pub const NATIVE_EXTENT: &str = "nativeExtent";

/// The region of interest configured for a repository.
#[derive(Clone, Debug, Default)]
pub struct SpatialFilter {
    region: Option<(Geometry<f64>, Option<Crs>)>,
}

impl SpatialFilter {
    /// The filter that matches everything.
    pub fn match_all() -> Self {
        Self::default()
    }

    /// A filter from a WKT geometry and the CRS it is expressed in.
    pub fn from_wkt(geometry: &str, crs: Option<&str>) -> SpatialResult<Self> {
        let geometry = parse_wkt(geometry)?;
        let crs = crs.map(|c| make_crs(c, "spatial filter")).transpose()?;
        Ok(Self {
            region: Some((geometry, crs)),
        })
    }

    pub fn is_match_all(&self) -> bool {
        self.region.is_none()
    }

    pub fn geometry(&self) -> Option<&Geometry<f64>> {
        self.region.as_ref().map(|(g, _)| g)
    }

    pub fn crs(&self) -> Option<&Crs> {
        self.region.as_ref().and_then(|(_, c)| c.as_ref())
    }

    /// The filter region in `target` CRS. When either CRS is unknown the
    /// region is used untransformed.
    fn region_in(&self, target: Option<&Crs>) -> SpatialResult<Option<(Geometry<f64>, Envelope)>> {
        let Some((geometry, source)) = &self.region else {
            return Ok(None);
        };
        let geometry = match (source, target) {
            (Some(source), Some(target)) => {
                CoordinateTransform::new(source, target)?.transform_geometry(geometry)
            }
            _ => geometry.clone(),
        };
        Ok(Envelope::from_geometry(&geometry).map(|env| (geometry, env)))
    }

    /// Resolve for a table dataset whose geometry lives in `geometry_column`
    /// and is expressed in `crs`. A table without a geometry column matches
    /// everything.
    pub fn transform_for_table_schema_and_crs(
        &self,
        geometry_column: Option<&str>,
        crs: Option<&Crs>,
        ds_path: &str,
    ) -> SpatialResult<ResolvedSpatialFilter> {
        let Some(column) = geometry_column else {
            return Ok(ResolvedSpatialFilter::match_all());
        };
        let resolved = match self.region_in(crs)? {
            Some((geometry, envelope)) => ResolvedSpatialFilter {
                target: Target::Features {
                    column: column.to_string(),
                    geometry,
                    envelope,
                },
            },
            None => ResolvedSpatialFilter::match_all(),
        };
        tracing::debug!(ds_path, match_all = resolved.is_match_all(), "resolved table spatial filter");
        Ok(resolved)
    }

    /// Resolve for a point-cloud dataset whose tiles are in `crs`.
    pub fn transform_for_point_cloud_crs(
        &self,
        crs: Option<&Crs>,
        ds_path: &str,
    ) -> SpatialResult<ResolvedSpatialFilter> {
        let resolved = match self.region_in(crs)? {
            Some((geometry, envelope)) => ResolvedSpatialFilter {
                target: Target::Tiles { geometry, envelope },
            },
            None => ResolvedSpatialFilter::match_all(),
        };
        tracing::debug!(ds_path, match_all = resolved.is_match_all(), "resolved tile spatial filter");
        Ok(resolved)
    }
}

#[derive(Clone, Debug)]
enum Target {
    MatchAll,
    Features {
        column: String,
        geometry: Geometry<f64>,
        envelope: Envelope,
    },
    Tiles {
        geometry: Geometry<f64>,
        envelope: Envelope,
    },
}

/// A spatial filter expressed in one dataset's CRS.
#[derive(Clone, Debug)]
pub struct ResolvedSpatialFilter {
    target: Target,
}

impl ResolvedSpatialFilter {
    pub fn match_all() -> Self {
        Self {
            target: Target::MatchAll,
        }
    }

    pub fn is_match_all(&self) -> bool {
        matches!(self.target, Target::MatchAll)
    }

    /// Whether a feature or tile pointer value lies within the region.
    ///
    /// A value without geometry (null column, no extent) never matches. A
    /// geometry that cannot be parsed is kept, so it is never hidden.
    pub fn matches_value(&self, value: &Value) -> bool {
        match &self.target {
            Target::MatchAll => true,
            Target::Features {
                column,
                geometry,
                envelope,
            } => match value.get(column) {
                Some(Value::String(wkt)) => match parse_wkt(wkt) {
                    Ok(feature_geom) => intersects(geometry, envelope, &feature_geom),
                    Err(e) => {
                        tracing::debug!(error = %e, "unparseable feature geometry kept by spatial filter");
                        true
                    }
                },
                _ => false,
            },
            Target::Tiles { geometry, envelope } => match value.get(NATIVE_EXTENT) {
                Some(Value::String(extent)) => match Envelope::from_native_extent(extent) {
                    Ok(tile_env) => {
                        tile_env.intersects(envelope) && geometry.intersects(&tile_env.to_geometry())
                    }
                    Err(e) => {
                        tracing::debug!(error = %e, "invalid tile extent kept by spatial filter");
                        true
                    }
                },
                _ => false,
            },
        }
    }
}

fn intersects(region: &Geometry<f64>, region_env: &Envelope, geom: &Geometry<f64>) -> bool {
    match Envelope::from_geometry(geom) {
        Some(env) => env.intersects(region_env) && region.intersects(geom),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn unit_square_filter() -> SpatialFilter {
        SpatialFilter::from_wkt("POLYGON((0 0, 10 0, 10 10, 0 10, 0 0))", Some("EPSG:4326")).unwrap()
    }

    #[test]
    fn match_all_everywhere() {
        let f = SpatialFilter::match_all();
        assert!(f.is_match_all());
        let r = f
            .transform_for_table_schema_and_crs(Some("geom"), Some(&Crs::epsg(4326)), "x")
            .unwrap();
        assert!(r.is_match_all());
        assert!(r.matches_value(&json!({"geom": "POINT(100 100)"})));
    }

    #[test]
    fn table_without_geometry_column_matches_all() {
        let r = unit_square_filter()
            .transform_for_table_schema_and_crs(None, Some(&Crs::epsg(4326)), "x")
            .unwrap();
        assert!(r.is_match_all());
    }

    #[test]
    fn features_inside_and_outside() {
        let r = unit_square_filter()
            .transform_for_table_schema_and_crs(Some("geom"), Some(&Crs::epsg(4326)), "parcels")
            .unwrap();
        assert!(!r.is_match_all());
        assert!(r.matches_value(&json!({"fid": 1, "geom": "POINT(5 5)"})));
        assert!(r.matches_value(&json!({"geom": "LINESTRING(-5 5, 5 5)"})));
        assert!(!r.matches_value(&json!({"geom": "POINT(50 50)"})));
        assert!(!r.matches_value(&json!({"geom": null})));
        assert!(!r.matches_value(&json!({"fid": 1})));
    }

    #[test]
    fn filter_is_reprojected_into_dataset_crs() {
        let r = unit_square_filter()
            .transform_for_table_schema_and_crs(Some("geom"), Some(&Crs::epsg(3857)), "web")
            .unwrap();
        // (5°, 5°) in web mercator
        assert!(r.matches_value(&json!({"geom": "POINT(556597.45 557305.26)"})));
        // (5, 5) in metres is right next to the origin, still inside
        assert!(r.matches_value(&json!({"geom": "POINT(5 5)"})));
        assert!(!r.matches_value(&json!({"geom": "POINT(5565974.5 5573052.6)"})));
    }

    #[test]
    fn unsupported_reprojection_is_an_error() {
        let err = unit_square_filter()
            .transform_for_table_schema_and_crs(Some("geom"), Some(&Crs::epsg(2193)), "nz")
            .unwrap_err();
        assert!(err.to_string().contains("Can't reproject"));
    }

    #[test]
    fn tiles_use_native_extent() {
        let r = unit_square_filter()
            .transform_for_point_cloud_crs(Some(&Crs::epsg(4326)), "lidar")
            .unwrap();
        assert!(r.matches_value(&json!({"name": "a", "nativeExtent": "8,12,8,12,0,100"})));
        assert!(!r.matches_value(&json!({"name": "b", "nativeExtent": "20,30,20,30"})));
        assert!(!r.matches_value(&json!({"name": "c"})));
    }
}
