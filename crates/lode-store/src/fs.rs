use std::collections::HashSet;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use lode_types::ObjectId;
use tempfile::NamedTempFile;

use crate::error::{StoreError, StoreResult};
use crate::object::{ObjectKind, StoredObject};
use crate::traits::ObjectStore;

const PROMISED_FILE: &str = "promised";

/// Loose-object store on the local filesystem.
///
/// Layout under the root directory:
///
/// ```text
/// objects/<first 2 hex chars>/<remaining 62 hex chars>   kind tag byte + data
/// promised                                              one hex id per line
/// ```
///
/// Object files are written to a temporary file and renamed into place, so a
/// reader never sees a partially written object.
pub struct FsObjectStore {
    root: PathBuf,
    promised: RwLock<HashSet<ObjectId>>,
}

impl FsObjectStore {
    /// Open (creating if needed) a store rooted at `root`.
    pub fn open(root: impl AsRef<Path>) -> StoreResult<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(root.join("objects"))?;
        let promised = load_promised(&root.join(PROMISED_FILE))?;
        tracing::debug!(root = %root.display(), promised = promised.len(), "opened object store");
        Ok(Self {
            root,
            promised: RwLock::new(promised),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Record ids that the remote holds but this store omits.
    pub fn mark_promised(&self, ids: impl IntoIterator<Item = ObjectId>) -> StoreResult<()> {
        let mut promised = self.promised.write().expect("lock poisoned");
        promised.extend(ids);
        self.save_promised(&promised)
    }

    fn object_path(&self, id: &ObjectId) -> PathBuf {
        let hex = id.to_hex();
        self.root.join("objects").join(&hex[..2]).join(&hex[2..])
    }

    fn save_promised(&self, promised: &HashSet<ObjectId>) -> StoreResult<()> {
        let mut lines: Vec<String> = promised.iter().map(ObjectId::to_hex).collect();
        lines.sort();
        let mut contents = lines.join("\n");
        if !contents.is_empty() {
            contents.push('\n');
        }
        write_atomic(&self.root.join(PROMISED_FILE), contents.as_bytes())
    }
}

fn load_promised(path: &Path) -> StoreResult<HashSet<ObjectId>> {
    let contents = match fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(HashSet::new()),
        Err(e) => return Err(e.into()),
    };
    contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| {
            ObjectId::from_hex(line)
                .map_err(|e| StoreError::Serialization(format!("bad promised id {line:?}: {e}")))
        })
        .collect()
}

/// Write `bytes` to `path` through a temp file in the same directory.
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> StoreResult<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(dir)?;
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.flush()?;
    tmp.persist(path).map_err(|e| StoreError::Io(e.error))?;
    Ok(())
}

impl ObjectStore for FsObjectStore {
    fn read(&self, id: &ObjectId) -> StoreResult<Option<StoredObject>> {
        let raw = match fs::read(self.object_path(id)) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let (tag, data) = raw.split_first().ok_or_else(|| StoreError::CorruptObject {
            id: *id,
            reason: "empty object file".into(),
        })?;
        let kind = ObjectKind::from_tag(*tag).ok_or_else(|| StoreError::CorruptObject {
            id: *id,
            reason: format!("unknown kind tag {tag:#04x}"),
        })?;
        let object = StoredObject::new(kind, data.to_vec());
        if object.compute_id() != *id {
            return Err(StoreError::CorruptObject {
                id: *id,
                reason: "content hash mismatch".into(),
            });
        }
        Ok(Some(object))
    }

    fn write(&self, object: &StoredObject) -> StoreResult<ObjectId> {
        let id = object.compute_id();
        if id.is_null() {
            return Err(StoreError::NullObjectId);
        }
        let path = self.object_path(&id);
        if !path.exists() {
            let mut raw = Vec::with_capacity(object.data.len() + 1);
            raw.push(object.kind.tag());
            raw.extend_from_slice(&object.data);
            write_atomic(&path, &raw)?;
        }

        let mut promised = self.promised.write().expect("lock poisoned");
        if promised.remove(&id) {
            self.save_promised(&promised)?;
        }
        Ok(id)
    }

    fn exists(&self, id: &ObjectId) -> StoreResult<bool> {
        Ok(self.object_path(id).is_file())
    }

    fn is_promised(&self, id: &ObjectId) -> StoreResult<bool> {
        Ok(self.promised.read().expect("lock poisoned").contains(id))
    }

    fn ids_with_prefix(&self, prefix: &str) -> StoreResult<Vec<ObjectId>> {
        if !prefix.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Ok(Vec::new());
        }
        let prefix = prefix.to_ascii_lowercase();
        let objects_dir = self.root.join("objects");
        let mut ids = Vec::new();
        for fanout in fs::read_dir(&objects_dir)? {
            let fanout = fanout?;
            let dir_name = fanout.file_name().to_string_lossy().to_string();
            let shared = prefix.len().min(2);
            if dir_name[..shared.min(dir_name.len())] != prefix[..shared] {
                continue;
            }
            for entry in fs::read_dir(fanout.path())? {
                let entry = entry?;
                let hex = format!("{dir_name}{}", entry.file_name().to_string_lossy());
                if !hex.starts_with(&prefix) {
                    continue;
                }
                if let Ok(id) = ObjectId::from_hex(&hex) {
                    ids.push(id);
                }
            }
        }
        ids.sort();
        Ok(ids)
    }
}

impl std::fmt::Debug for FsObjectStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FsObjectStore")
            .field("root", &self.root)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::Blob;
    use serde_json::json;

    #[test]
    fn write_read_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let id = {
            let store = FsObjectStore::open(dir.path()).unwrap();
            store.write_json_blob(&json!({"fid": 1, "name": "lot 1"})).unwrap()
        };
        let store = FsObjectStore::open(dir.path()).unwrap();
        let blob = store.read_blob(&id).unwrap();
        assert_eq!(blob.to_json().unwrap()["name"], "lot 1");
    }

    #[test]
    fn promised_ids_persist_until_written() {
        let dir = tempfile::tempdir().unwrap();
        let obj = Blob::new(b"far away".to_vec()).to_stored_object();
        let id = obj.compute_id();
        {
            let store = FsObjectStore::open(dir.path()).unwrap();
            store.mark_promised([id]).unwrap();
        }
        let store = FsObjectStore::open(dir.path()).unwrap();
        assert!(store.dereference(&id).unwrap_err().is_promised());

        store.write(&obj).unwrap();
        assert!(!store.is_promised(&id).unwrap());
        let reopened = FsObjectStore::open(dir.path()).unwrap();
        assert!(!reopened.is_promised(&id).unwrap());
        assert!(reopened.exists(&id).unwrap());
    }

    #[test]
    fn tampered_object_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsObjectStore::open(dir.path()).unwrap();
        let id = store.write(&Blob::new(b"original".to_vec()).to_stored_object()).unwrap();
        fs::write(store.object_path(&id), b"bchanged").unwrap();
        assert!(matches!(store.read(&id), Err(StoreError::CorruptObject { .. })));
    }

    #[test]
    fn prefix_lookup_scans_fanout() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsObjectStore::open(dir.path()).unwrap();
        let a = store.write(&Blob::new(b"a".to_vec()).to_stored_object()).unwrap();
        let b = store.write(&Blob::new(b"b".to_vec()).to_stored_object()).unwrap();
        assert_eq!(store.ids_with_prefix(&a.to_hex()[..8]).unwrap(), vec![a]);
        assert!(store.ids_with_prefix(&b.to_hex()[..1]).unwrap().contains(&b));
        assert_eq!(store.ids_with_prefix("").unwrap().len(), 2);
    }
}
