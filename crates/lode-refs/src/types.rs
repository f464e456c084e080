//! Core reference types.

use lode_types::ObjectId;
use serde::{Deserialize, Serialize};

/// A named pointer to a commit.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Ref {
    /// A mutable pointer to a branch tip.
    Branch { name: String, commit: ObjectId },

    /// An immutable pointer to a specific commit.
    Tag {
        name: String,
        commit: ObjectId,
        #[serde(default)]
        message: String,
    },

    /// Mirror of a branch on a remote. Only updated by fetch.
    Remote {
        remote: String,
        branch: String,
        commit: ObjectId,
    },
}

impl Ref {
    pub fn branch(name: impl Into<String>, commit: ObjectId) -> Self {
        Ref::Branch {
            name: name.into(),
            commit,
        }
    }

    pub fn tag(name: impl Into<String>, commit: ObjectId) -> Self {
        Ref::Tag {
            name: name.into(),
            commit,
            message: String::new(),
        }
    }

    pub fn remote(remote: impl Into<String>, branch: impl Into<String>, commit: ObjectId) -> Self {
        Ref::Remote {
            remote: remote.into(),
            branch: branch.into(),
            commit,
        }
    }

    /// Returns the canonical name for this ref (e.g. "refs/heads/main").
    pub fn canonical_name(&self) -> String {
        match self {
            Ref::Branch { name, .. } => format!("refs/heads/{name}"),
            Ref::Tag { name, .. } => format!("refs/tags/{name}"),
            Ref::Remote { remote, branch, .. } => format!("refs/remotes/{remote}/{branch}"),
        }
    }

    /// Returns the short name of this ref (e.g. "main", "v1", "origin/main").
    pub fn short_name(&self) -> String {
        match self {
            Ref::Branch { name, .. } | Ref::Tag { name, .. } => name.clone(),
            Ref::Remote { remote, branch, .. } => format!("{remote}/{branch}"),
        }
    }

    pub fn is_branch(&self) -> bool {
        matches!(self, Ref::Branch { .. })
    }

    pub fn is_tag(&self) -> bool {
        matches!(self, Ref::Tag { .. })
    }

    pub fn is_remote(&self) -> bool {
        matches!(self, Ref::Remote { .. })
    }

    /// The commit this ref points to.
    pub fn target(&self) -> ObjectId {
        match self {
            Ref::Branch { commit, .. } | Ref::Tag { commit, .. } | Ref::Remote { commit, .. } => {
                *commit
            }
        }
    }
}

/// The state of HEAD: either symbolic (naming a branch) or detached.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "target", rename_all = "snake_case")]
pub enum Head {
    /// HEAD names a branch, which may not exist yet (an unborn branch).
    Symbolic(String),
    /// HEAD points directly at a commit.
    Detached(ObjectId),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_and_short_names() {
        let id = ObjectId::from_bytes(b"c1");
        let remote = Ref::remote("origin", "main", id);
        assert_eq!(remote.canonical_name(), "refs/remotes/origin/main");
        assert_eq!(remote.short_name(), "origin/main");
        assert_eq!(Ref::tag("v1", id).canonical_name(), "refs/tags/v1");
        assert_eq!(Ref::branch("main", id).target(), id);
    }

    #[test]
    fn head_serde_roundtrip() {
        let head = Head::Symbolic("main".into());
        let json = serde_json::to_string(&head).unwrap();
        assert_eq!(serde_json::from_str::<Head>(&json).unwrap(), head);
    }
}
