//! Content-addressed object storage for Lode.
//!
//! Every piece of repository data (feature and tile blobs, meta items,
//! dataset trees, commits) is an immutable object identified by its
//! domain-separated BLAKE3 hash.
//!
//! # Partial clones
//!
//! A repository cloned with a spatial filter deliberately omits the blobs of
//! features outside the filter. Those ids are recorded as *promised*: the
//! remote has them and they can be fetched on demand. [`ObjectStore::dereference`]
//! therefore distinguishes three outcomes: present, [`StoreError::Promised`],
//! and [`StoreError::NotFound`].
//!
//! # Backends
//!
//! - [`InMemoryObjectStore`] -- `HashMap`-based store for tests and embedding
//! - [`FsObjectStore`] -- loose objects on disk under `.lode/objects/`
//!
//! # Fetching
//!
//! [`FetchSession`] retrieves promised objects from an [`ObjectSource`] on a
//! background tokio runtime and joins them in one place.

pub mod error;
pub mod fetch;
pub mod fs;
pub mod memory;
pub mod object;
pub mod traits;

pub use error::{StoreError, StoreResult};
pub use fetch::{FetchOptions, FetchSession, ObjectSource, StoreSource};
pub use fs::FsObjectStore;
pub use memory::InMemoryObjectStore;
pub use object::{Blob, CommitObject, EntryMode, ObjectKind, StoredObject, Tree, TreeEntry};
pub use traits::ObjectStore;
