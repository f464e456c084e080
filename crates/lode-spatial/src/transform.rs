use std::f64::consts::PI;

use geo::MapCoords;
use geo_types::{Coord, Geometry};
use wkt::ToWkt;

use crate::crs::Crs;
use crate::error::{SpatialError, SpatialResult};
use crate::geometry::parse_wkt;

const EARTH_RADIUS: f64 = 6_378_137.0;
const MAX_MERCATOR_LAT: f64 = 85.051_128_779_806_59;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Kind {
    Identity,
    GeographicToMercator,
    MercatorToGeographic,
}

fn is_wgs84(crs: &Crs) -> bool {
    crs.authority() == "EPSG" && crs.code() == 4326
}

fn is_web_mercator(crs: &Crs) -> bool {
    crs.authority() == "EPSG" && matches!(crs.code(), 3857 | 900913)
}

/// A transform from one CRS to another.
#[derive(Clone, Debug)]
pub struct CoordinateTransform {
    source: Crs,
    target: Crs,
    kind: Kind,
}

impl CoordinateTransform {
    pub fn new(source: &Crs, target: &Crs) -> SpatialResult<Self> {
        let kind = if source.is_equivalent(target) {
            Kind::Identity
        } else if is_wgs84(source) && is_web_mercator(target) {
            Kind::GeographicToMercator
        } else if is_web_mercator(source) && is_wgs84(target) {
            Kind::MercatorToGeographic
        } else {
            return Err(SpatialError::Reprojection {
                from: source.identifier(),
                to: target.identifier(),
            });
        };
        Ok(Self {
            source: source.clone(),
            target: target.clone(),
            kind,
        })
    }

    pub fn source(&self) -> &Crs {
        &self.source
    }

    pub fn target(&self) -> &Crs {
        &self.target
    }

    pub fn is_identity(&self) -> bool {
        self.kind == Kind::Identity
    }

    /// Transform one coordinate. Coordinates are `x = longitude/easting`,
    /// `y = latitude/northing`.
    pub fn transform_coord(&self, c: Coord<f64>) -> Coord<f64> {
        match self.kind {
            Kind::Identity => c,
            Kind::GeographicToMercator => {
                let lat = c.y.clamp(-MAX_MERCATOR_LAT, MAX_MERCATOR_LAT);
                Coord {
                    x: EARTH_RADIUS * c.x.to_radians(),
                    y: EARTH_RADIUS * (PI / 4.0 + lat.to_radians() / 2.0).tan().ln(),
                }
            }
            Kind::MercatorToGeographic => Coord {
                x: (c.x / EARTH_RADIUS).to_degrees(),
                y: (2.0 * (c.y / EARTH_RADIUS).exp().atan() - PI / 2.0).to_degrees(),
            },
        }
    }

    pub fn transform_geometry(&self, geometry: &Geometry<f64>) -> Geometry<f64> {
        if self.is_identity() {
            return geometry.clone();
        }
        geometry.map_coords(|c| self.transform_coord(c))
    }

    /// Reproject a WKT geometry, returning WKT.
    pub fn transform_wkt(&self, wkt: &str) -> SpatialResult<String> {
        if self.is_identity() {
            return Ok(wkt.to_string());
        }
        Ok(self.transform_geometry(&parse_wkt(wkt)?).wkt_string())
    }

    /// The inverse transform.
    pub fn inverse(&self) -> Self {
        let kind = match self.kind {
            Kind::Identity => Kind::Identity,
            Kind::GeographicToMercator => Kind::MercatorToGeographic,
            Kind::MercatorToGeographic => Kind::GeographicToMercator,
        };
        Self {
            source: self.target.clone(),
            target: self.source.clone(),
            kind,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo_types::point;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-6
    }

    #[test]
    fn identity_for_same_code() {
        let t = CoordinateTransform::new(&Crs::epsg(2193), &Crs::epsg(2193)).unwrap();
        assert!(t.is_identity());
        let c = Coord { x: 1.0, y: 2.0 };
        assert_eq!(t.transform_coord(c), c);
    }

    #[test]
    fn wgs84_to_mercator_and_back() {
        let t = CoordinateTransform::new(&Crs::epsg(4326), &Crs::epsg(3857)).unwrap();
        let m = t.transform_coord(Coord { x: 174.7633, y: -36.8485 });
        assert!((m.x - 19_454_561.565).abs() < 0.01, "{m:?}");
        let back = t.inverse().transform_coord(m);
        assert!(close(back.x, 174.7633) && close(back.y, -36.8485), "{back:?}");
    }

    #[test]
    fn origin_maps_to_origin() {
        let t = CoordinateTransform::new(&Crs::epsg(4326), &Crs::epsg(3857)).unwrap();
        let g = t.transform_geometry(&Geometry::Point(point!(x: 0.0, y: 0.0)));
        match g {
            Geometry::Point(p) => assert!(close(p.x(), 0.0) && close(p.y(), 0.0)),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn wkt_round_trips_through_mercator() {
        let t = CoordinateTransform::new(&Crs::epsg(4326), &Crs::epsg(3857)).unwrap();
        let projected = t.transform_wkt("POINT(0 0)").unwrap();
        assert!(projected.starts_with("POINT"));
        let back = parse_wkt(&t.inverse().transform_wkt(&projected).unwrap()).unwrap();
        match back {
            Geometry::Point(p) => assert!(close(p.x(), 0.0) && close(p.y(), 0.0)),
            other => panic!("unexpected geometry {other:?}"),
        }
        assert!(t.transform_wkt("POINT(").is_err());
    }

    #[test]
    fn unsupported_pair() {
        let err = CoordinateTransform::new(&Crs::epsg(2193), &Crs::epsg(4326)).unwrap_err();
        assert_eq!(
            err,
            SpatialError::Reprojection {
                from: "EPSG:2193".into(),
                to: "EPSG:4326".into()
            }
        );
    }
}
