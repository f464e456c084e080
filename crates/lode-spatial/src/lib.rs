//! Spatial filtering for Lode.
//!
//! A repository may carry a spatial filter: a region of interest (WKT
//! geometry plus the CRS it is expressed in). Diffs restrict their output to
//! items whose geometry intersects that region. Because each dataset stores
//! geometry in its own CRS, the repository filter is *resolved* once per
//! dataset into a [`ResolvedSpatialFilter`] expressed in the dataset's CRS.
//!
//! Only identity and WGS 84 ⇄ Web Mercator transforms are supported; any
//! other pair of CRSs fails with [`SpatialError::Reprojection`].

pub mod crs;
pub mod error;
pub mod filter;
pub mod geometry;
pub mod transform;

pub use crs::{make_crs, Crs};
pub use error::{SpatialError, SpatialResult};
pub use filter::{ResolvedSpatialFilter, SpatialFilter};
pub use geometry::{parse_wkt, Envelope};
pub use transform::CoordinateTransform;
