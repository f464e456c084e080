//! Geometry parsing and envelopes.

use std::str::FromStr;

use geo::BoundingRect;
use geo_types::{coord, Geometry, Rect};

use crate::error::{SpatialError, SpatialResult};

/// Parse a WKT string into a geometry.
pub fn parse_wkt(wkt: &str) -> SpatialResult<Geometry<f64>> {
    wkt::Wkt::from_str(wkt)
        .map_err(|e| SpatialError::WktParse(format!("{:?}", e)))
        .and_then(|w| {
            w.try_into()
                .map_err(|e: wkt::conversion::Error| SpatialError::WktParse(format!("{:?}", e)))
        })
}

/// Axis-aligned 2D bounding box.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Envelope {
    pub min_x: f64,
    pub max_x: f64,
    pub min_y: f64,
    pub max_y: f64,
}

impl Envelope {
    pub fn new(min_x: f64, max_x: f64, min_y: f64, max_y: f64) -> Self {
        Self {
            min_x,
            max_x,
            min_y,
            max_y,
        }
    }

    /// Compute from a geometry. `None` for empty geometries.
    pub fn from_geometry(geom: &Geometry<f64>) -> Option<Self> {
        let rect = geom.bounding_rect()?;
        Some(Self::new(rect.min().x, rect.max().x, rect.min().y, rect.max().y))
    }

    /// Parse a tile extent `minx,maxx,miny,maxy[,minz,maxz]`. The z range
    /// is ignored.
    pub fn from_native_extent(extent: &str) -> SpatialResult<Self> {
        let values: Vec<f64> = extent
            .split(',')
            .map(|v| v.trim().parse::<f64>())
            .collect::<Result<_, _>>()
            .map_err(|_| SpatialError::InvalidExtent(extent.to_string()))?;
        match values.as_slice() {
            [min_x, max_x, min_y, max_y] | [min_x, max_x, min_y, max_y, _, _]
                if min_x <= max_x && min_y <= max_y =>
            {
                Ok(Self::new(*min_x, *max_x, *min_y, *max_y))
            }
            _ => Err(SpatialError::InvalidExtent(extent.to_string())),
        }
    }

    pub fn intersects(&self, other: &Envelope) -> bool {
        self.min_x <= other.max_x
            && self.max_x >= other.min_x
            && self.min_y <= other.max_y
            && self.max_y >= other.min_y
    }

    /// The envelope as a rectangle geometry.
    pub fn to_geometry(&self) -> Geometry<f64> {
        Geometry::Rect(Rect::new(
            coord! { x: self.min_x, y: self.min_y },
            coord! { x: self.max_x, y: self.max_y },
        ))
    }
}
