//! Foundation types for Lode, a version-control system for geospatial data.
//!
//! Every other Lode crate depends on `lode-types`.
//!
//! # Key Types
//!
//! - [`ObjectId`] -- Content-addressed identifier (BLAKE3 hash) of a stored object
//! - [`ItemKey`] -- Key of one item in a dataset: a feature's primary key or a tile name

pub mod error;
pub mod key;
pub mod object;

pub use error::TypeError;
pub use key::ItemKey;
pub use object::ObjectId;
