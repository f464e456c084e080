//! In-memory reference store, plus the ref table shared with the file store.

use std::collections::BTreeMap;
use std::sync::RwLock;

use lode_types::ObjectId;
use serde::{Deserialize, Serialize};

use crate::error::{RefError, Result};
use crate::names::{validate_branch_name, validate_remote_name, validate_tag_name};
use crate::traits::RefStore;
use crate::types::{Head, Ref};

/// All refs plus HEAD, with the update rules every backend enforces.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct RefTable {
    #[serde(default)]
    pub refs: BTreeMap<String, Ref>,
    #[serde(default)]
    pub head: Option<Head>,
}

impl RefTable {
    pub fn write(&mut self, name: &str, reference: &Ref) -> Result<()> {
        match reference {
            Ref::Branch { name, .. } => validate_branch_name(name)?,
            Ref::Tag { name, .. } => validate_tag_name(name)?,
            Ref::Remote { remote, branch, .. } => {
                validate_remote_name(remote)?;
                validate_branch_name(branch)?;
            }
        }
        if let Some(existing) = self.refs.get(name) {
            if existing.is_tag() && existing != reference {
                return Err(RefError::TagImmutable {
                    name: name.to_string(),
                });
            }
        }
        self.refs.insert(name.to_string(), reference.clone());
        Ok(())
    }

    pub fn delete(&mut self, name: &str) -> Result<bool> {
        if let Some(Head::Symbolic(current)) = &self.head {
            if name == format!("refs/heads/{current}") {
                return Err(RefError::DeleteCurrentBranch {
                    name: current.clone(),
                });
            }
        }
        Ok(self.refs.remove(name).is_some())
    }

    pub fn list(&self, prefix: &str) -> Vec<(String, Ref)> {
        self.refs
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    pub fn set_head(&mut self, branch: &str) -> Result<()> {
        validate_branch_name(branch)?;
        self.head = Some(Head::Symbolic(branch.to_string()));
        Ok(())
    }
}

/// An in-memory implementation of [`RefStore`]. Data is lost on drop.
#[derive(Debug, Default)]
pub struct InMemoryRefStore {
    table: RwLock<RefTable>,
}

impl InMemoryRefStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RefStore for InMemoryRefStore {
    fn read_ref(&self, name: &str) -> Result<Option<Ref>> {
        Ok(self.table.read().expect("lock poisoned").refs.get(name).cloned())
    }

    fn write_ref(&self, name: &str, reference: &Ref) -> Result<()> {
        self.table.write().expect("lock poisoned").write(name, reference)
    }

    fn delete_ref(&self, name: &str) -> Result<bool> {
        self.table.write().expect("lock poisoned").delete(name)
    }

    fn list_refs(&self, prefix: &str) -> Result<Vec<(String, Ref)>> {
        Ok(self.table.read().expect("lock poisoned").list(prefix))
    }

    fn head(&self) -> Result<Option<Head>> {
        Ok(self.table.read().expect("lock poisoned").head.clone())
    }

    fn set_head(&self, branch: &str) -> Result<()> {
        self.table.write().expect("lock poisoned").set_head(branch)
    }

    fn set_head_detached(&self, commit: ObjectId) -> Result<()> {
        self.table.write().expect("lock poisoned").head = Some(Head::Detached(commit));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(tag: &str) -> ObjectId {
        ObjectId::from_bytes(tag.as_bytes())
    }

    #[test]
    fn branch_moves_forward() {
        let store = InMemoryRefStore::new();
        store.write_ref("refs/heads/main", &Ref::branch("main", id("c1"))).unwrap();
        store.write_ref("refs/heads/main", &Ref::branch("main", id("c2"))).unwrap();
        let read = store.read_ref("refs/heads/main").unwrap().unwrap();
        assert_eq!(read.target(), id("c2"));
    }

    #[test]
    fn tags_cannot_move() {
        let store = InMemoryRefStore::new();
        store.write_ref("refs/tags/v1", &Ref::tag("v1", id("c1"))).unwrap();
        let err = store.write_ref("refs/tags/v1", &Ref::tag("v1", id("c2"))).unwrap_err();
        assert!(matches!(err, RefError::TagImmutable { .. }));
    }

    #[test]
    fn invalid_branch_name_rejected() {
        let store = InMemoryRefStore::new();
        assert!(store.write_ref("refs/heads/a..b", &Ref::branch("a..b", id("c"))).is_err());
    }

    #[test]
    fn cannot_delete_current_branch() {
        let store = InMemoryRefStore::new();
        store.write_ref("refs/heads/main", &Ref::branch("main", id("c1"))).unwrap();
        store.set_head("main").unwrap();
        assert!(matches!(
            store.delete_ref("refs/heads/main"),
            Err(RefError::DeleteCurrentBranch { .. })
        ));
    }

    #[test]
    fn head_commit_follows_branch() {
        let store = InMemoryRefStore::new();
        store.set_head("main").unwrap();
        assert_eq!(store.head_commit().unwrap(), None);

        store.write_ref("refs/heads/main", &Ref::branch("main", id("c1"))).unwrap();
        assert_eq!(store.head_commit().unwrap(), Some(id("c1")));

        store.set_head_detached(id("c0")).unwrap();
        assert_eq!(store.head_commit().unwrap(), Some(id("c0")));
    }

    #[test]
    fn short_name_resolution_order() {
        let store = InMemoryRefStore::new();
        store.write_ref("refs/heads/v1", &Ref::branch("v1", id("branch"))).unwrap();
        store.write_ref("refs/tags/v1", &Ref::tag("v1", id("tag"))).unwrap();
        store
            .write_ref("refs/remotes/origin/main", &Ref::remote("origin", "main", id("remote")))
            .unwrap();

        assert_eq!(store.resolve_short_name("v1").unwrap(), Some(id("branch")));
        assert_eq!(store.resolve_short_name("refs/tags/v1").unwrap(), Some(id("tag")));
        assert_eq!(store.resolve_short_name("origin/main").unwrap(), Some(id("remote")));
        assert_eq!(store.resolve_short_name("nope").unwrap(), None);
    }

    #[test]
    fn list_by_prefix() {
        let store = InMemoryRefStore::new();
        store.write_ref("refs/heads/b", &Ref::branch("b", id("1"))).unwrap();
        store.write_ref("refs/heads/a", &Ref::branch("a", id("2"))).unwrap();
        store.write_ref("refs/tags/t", &Ref::tag("t", id("3"))).unwrap();
        let branches = store.branches().unwrap();
        assert_eq!(branches.len(), 2);
        assert_eq!(branches[0].0, "refs/heads/a");
        assert_eq!(store.tags().unwrap().len(), 1);
    }
}
