//! Dataset diff engine for Lode.
//!
//! Computes structured, per-item diffs between two versions of a dataset,
//! and composes a committed diff with uncommitted working copy edits so the
//! result spans base to working copy directly.
//!
//! # Key Types
//!
//! - [`Delta`] / [`DeltaValue`] -- the change to one item, with lazily
//!   dereferenced content
//! - [`DeltaDiff`] / [`DatasetDiff`] / [`RepoDiff`] -- diffs per item type,
//!   per dataset and per repository
//! - [`RepoKeyFilter`] / [`DatasetKeyFilter`] -- user restrictions to
//!   datasets and keys
//! - [`WorkingCopy`] -- the uncommitted state a diff can extend into

pub mod delta;
pub mod diff_structs;
pub mod engine;
pub mod error;
pub mod key_filter;
pub mod meta_text;
pub mod working_copy;

pub use delta::{Delta, DeltaFlags, DeltaValue};
pub use diff_structs::{DatasetDiff, DeltaDiff, MetaDelta, RepoDiff};
pub use engine::{diff_dataset, get_dataset_diff, get_repo_diff};
pub use error::{DiffError, DiffResult};
pub use key_filter::{DatasetKeyFilter, KeySet, RepoKeyFilter, META_ITEM_TYPE};
pub use meta_text::{diff_meta_text, DiffLine, Hunk};
pub use working_copy::{InMemoryWorkingCopy, WorkingCopy};
