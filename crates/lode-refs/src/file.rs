//! Ref store persisted as a single JSON document.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use lode_types::ObjectId;
use tempfile::NamedTempFile;

use crate::error::{RefError, Result};
use crate::memory::RefTable;
use crate::traits::RefStore;
use crate::types::{Head, Ref};

/// Refs and HEAD stored in `refs.json`, rewritten atomically on each update.
#[derive(Debug)]
pub struct FileRefStore {
    path: PathBuf,
    table: RwLock<RefTable>,
}

impl FileRefStore {
    /// Open the store at `path`, starting empty if the file does not exist.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let table = match fs::read(&path) {
            Ok(raw) => serde_json::from_slice(&raw)
                .map_err(|e| RefError::Serialization(format!("{}: {e}", path.display())))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => RefTable::default(),
            Err(e) => return Err(e.into()),
        };
        Ok(Self {
            path,
            table: RwLock::new(table),
        })
    }

    fn update<T>(&self, f: impl FnOnce(&mut RefTable) -> Result<T>) -> Result<T> {
        let mut table = self.table.write().expect("lock poisoned");
        let mut next = table.clone();
        let out = f(&mut next)?;
        if next != *table {
            self.save(&next)?;
            *table = next;
        }
        Ok(out)
    }

    fn save(&self, table: &RefTable) -> Result<()> {
        let raw = serde_json::to_vec_pretty(table)
            .map_err(|e| RefError::Serialization(e.to_string()))?;
        let dir = self.path.parent().unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(dir)?;
        let mut tmp = NamedTempFile::new_in(dir)?;
        tmp.write_all(&raw)?;
        tmp.persist(&self.path).map_err(|e| RefError::Io(e.error))?;
        tracing::trace!(path = %self.path.display(), refs = table.refs.len(), "saved refs");
        Ok(())
    }
}

impl RefStore for FileRefStore {
    fn read_ref(&self, name: &str) -> Result<Option<Ref>> {
        Ok(self.table.read().expect("lock poisoned").refs.get(name).cloned())
    }

    fn write_ref(&self, name: &str, reference: &Ref) -> Result<()> {
        self.update(|t| t.write(name, reference))
    }

    fn delete_ref(&self, name: &str) -> Result<bool> {
        self.update(|t| t.delete(name))
    }

    fn list_refs(&self, prefix: &str) -> Result<Vec<(String, Ref)>> {
        Ok(self.table.read().expect("lock poisoned").list(prefix))
    }

    fn head(&self) -> Result<Option<Head>> {
        Ok(self.table.read().expect("lock poisoned").head.clone())
    }

    fn set_head(&self, branch: &str) -> Result<()> {
        self.update(|t| t.set_head(branch))
    }

    fn set_head_detached(&self, commit: ObjectId) -> Result<()> {
        self.update(|t| {
            t.head = Some(Head::Detached(commit));
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn refs_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("refs.json");
        let commit = ObjectId::from_bytes(b"c1");
        {
            let store = FileRefStore::open(&path).unwrap();
            store.write_ref("refs/heads/main", &Ref::branch("main", commit)).unwrap();
            store.set_head("main").unwrap();
        }
        let store = FileRefStore::open(&path).unwrap();
        assert_eq!(store.head().unwrap(), Some(Head::Symbolic("main".into())));
        assert_eq!(store.head_commit().unwrap(), Some(commit));
    }

    #[test]
    fn failed_update_leaves_file_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("refs.json");
        let store = FileRefStore::open(&path).unwrap();
        store.write_ref("refs/tags/v1", &Ref::tag("v1", ObjectId::from_bytes(b"a"))).unwrap();
        let before = fs::read(&path).unwrap();
        assert!(store
            .write_ref("refs/tags/v1", &Ref::tag("v1", ObjectId::from_bytes(b"b")))
            .is_err());
        assert_eq!(fs::read(&path).unwrap(), before);
    }

    #[test]
    fn missing_file_is_empty_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileRefStore::open(dir.path().join("absent.json")).unwrap();
        assert!(store.head().unwrap().is_none());
        assert!(store.list_refs("").unwrap().is_empty());
    }
}
