//! Reference management for Lode.
//!
//! References are the human-readable entry points into commit history.
//!
//! - **Branches** (`refs/heads/*`) move as commits are made.
//! - **Tags** (`refs/tags/*`) are immutable once created.
//! - **Remote-tracking refs** (`refs/remotes/<remote>/*`) mirror branches on
//!   the promisor remote.
//! - **HEAD** names the current branch, or is detached at a commit.
//!
//! [`RefStore::resolve_short_name`] implements the lookup order used when a
//! user types a bare name such as `main` or `origin/main`.

pub mod error;
pub mod file;
pub mod memory;
pub mod names;
pub mod traits;
pub mod types;

pub use error::{RefError, Result};
pub use file::FileRefStore;
pub use memory::InMemoryRefStore;
pub use names::{validate_branch_name, validate_remote_name, validate_tag_name};
pub use traits::RefStore;
pub use types::{Head, Ref};
