//! High-level SDK for Lode.
//!
//! Opens repositories, resolves commit specs into snapshots and drives
//! spatially filtered diffs. This is the entry point for the CLI and for
//! applications embedding Lode.

pub mod commit_spec;
pub mod config;
pub mod conflicts;
pub mod error;
pub mod fetcher;
pub mod filtered;
pub mod kinds;
pub mod repository;
pub mod sink;
pub mod writer;

pub use commit_spec::{parse_diff_commit_spec, resolve_revision};
pub use config::LodeConfig;
pub use conflicts::{ConflictLimits, SpatialFilterConflicts};
pub use error::{SdkError, SdkResult};
pub use fetcher::{DeltaFetcher, PromissoryFetcher, StrictFetcher};
pub use filtered::FilteredDeltas;
pub use kinds::{kind_for, DatasetKind, FetchPolicy, FilterPair};
pub use repository::{RepoState, Repository, LODE_DIR};
pub use sink::MessageSink;
pub use writer::{DiffOutput, DiffWriter};

// Re-export key types
pub use lode_dataset::{Dataset, DatasetBuilder, DatasetType, RepoStructure, RepoTreeBuilder};
pub use lode_diff::{DatasetDiff, Delta, DeltaValue, MetaDelta, RepoDiff};
pub use lode_spatial::{CoordinateTransform, Crs, SpatialFilter};
pub use lode_types::{ItemKey, ObjectId};
