//! The [`RefStore`] trait defining the reference storage interface.

use lode_types::ObjectId;

use crate::error::Result;
use crate::types::{Head, Ref};

/// Storage backend for named references.
///
/// The namespace follows git's layout:
///
/// - `refs/heads/*` for branches
/// - `refs/tags/*` for tags
/// - `refs/remotes/{remote}/*` for remote-tracking refs
pub trait RefStore: Send + Sync {
    /// Read a ref by its canonical name (e.g. "refs/heads/main").
    ///
    /// Returns `Ok(None)` if the ref does not exist.
    fn read_ref(&self, name: &str) -> Result<Option<Ref>>;

    /// Create or update a ref at the given canonical name.
    ///
    /// Fails if a tag already exists at that name.
    fn write_ref(&self, name: &str, reference: &Ref) -> Result<()>;

    /// Delete a ref by canonical name. Returns whether it existed.
    fn delete_ref(&self, name: &str) -> Result<bool>;

    /// List all refs whose canonical name starts with `prefix`, sorted by name.
    fn list_refs(&self, prefix: &str) -> Result<Vec<(String, Ref)>>;

    /// Read the current HEAD state. `Ok(None)` if HEAD has never been set.
    fn head(&self) -> Result<Option<Head>>;

    /// Point HEAD at a branch (symbolic ref).
    fn set_head(&self, branch: &str) -> Result<()>;

    /// Detach HEAD at a commit.
    fn set_head_detached(&self, commit: ObjectId) -> Result<()>;

    /// The commit HEAD currently resolves to.
    ///
    /// `Ok(None)` when HEAD is unset or names a branch with no commits yet.
    fn head_commit(&self) -> Result<Option<ObjectId>> {
        match self.head()? {
            None => Ok(None),
            Some(Head::Detached(id)) => Ok(Some(id)),
            Some(Head::Symbolic(branch)) => Ok(self
                .read_ref(&format!("refs/heads/{branch}"))?
                .map(|r| r.target())),
        }
    }

    /// Resolve a user-typed name to a commit.
    ///
    /// Tried in order: the name as a full ref (`refs/...`), a branch, a tag,
    /// then a remote-tracking ref (`origin/main`).
    fn resolve_short_name(&self, name: &str) -> Result<Option<ObjectId>> {
        let candidates = [
            name.to_string(),
            format!("refs/heads/{name}"),
            format!("refs/tags/{name}"),
            format!("refs/remotes/{name}"),
        ];
        for candidate in candidates.iter().filter(|c| c.starts_with("refs/")) {
            if let Some(found) = self.read_ref(candidate)? {
                return Ok(Some(found.target()));
            }
        }
        Ok(None)
    }

    fn branches(&self) -> Result<Vec<(String, Ref)>> {
        self.list_refs("refs/heads/")
    }

    fn tags(&self) -> Result<Vec<(String, Ref)>> {
        self.list_refs("refs/tags/")
    }
}
