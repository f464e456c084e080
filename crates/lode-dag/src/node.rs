use lode_store::CommitObject;
use lode_types::ObjectId;
use serde::{Deserialize, Serialize};

/// A commit as seen by the graph: its id, root tree and parents.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitNode {
    pub id: ObjectId,
    pub tree: ObjectId,
    pub parents: Vec<ObjectId>,
    pub timestamp_ms: u64,
}

impl CommitNode {
    pub fn from_commit(id: ObjectId, commit: &CommitObject) -> Self {
        Self {
            id,
            tree: commit.tree,
            parents: commit.parents.clone(),
            timestamp_ms: commit.timestamp_ms,
        }
    }

    pub fn is_root(&self) -> bool {
        self.parents.is_empty()
    }

    /// A commit with more than one parent.
    pub fn is_merge(&self) -> bool {
        self.parents.len() > 1
    }
}
