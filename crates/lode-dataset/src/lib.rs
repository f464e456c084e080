//! Datasets inside Lode snapshots.
//!
//! A snapshot's root tree is an ordinary directory hierarchy. A directory that
//! contains a `.table-dataset` or `.point-cloud-dataset` subtree is a dataset,
//! and its path (e.g. `nz/parcels`) is the dataset path. Inside the marker
//! tree:
//!
//! ```text
//! .table-dataset/
//!     meta/schema.json          column definitions
//!     meta/title                plain text meta items
//!     meta/crs/EPSG:2193.wkt    one CRS definition per geometry CRS
//!     feature/<pk>              one JSON blob per feature
//! .point-cloud-dataset/
//!     meta/crs.wkt
//!     meta/format.json
//!     tile/<name>               one JSON tile pointer per tile
//! ```
//!
//! Meta items whose name ends in `.json` hold JSON; all others hold text.

pub mod builder;
pub mod dataset;
pub mod error;
pub mod schema;
pub mod structure;
pub mod types;

pub use builder::{DatasetBuilder, RepoTreeBuilder};
pub use dataset::Dataset;
pub use error::{DatasetError, DatasetResult};
pub use schema::{ColumnSchema, Schema};
pub use structure::{empty_tree_id, Datasets, RepoStructure};
pub use types::DatasetType;
