use serde::{Deserialize, Serialize};
use serde_json::Value;
use lode_crypto::ContentHasher;
use lode_types::ObjectId;

use crate::error::{StoreError, StoreResult};

/// The kind of object stored.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ObjectKind {
    /// Raw content: a feature, a tile pointer, a meta item.
    Blob,
    /// Directory listing: ordered entries mapping names to object references.
    Tree,
    /// A point in history: root tree plus parent commits.
    Commit,
}

impl ObjectKind {
    /// Single-byte tag used by the on-disk encoding.
    pub fn tag(&self) -> u8 {
        match self {
            Self::Blob => b'b',
            Self::Tree => b't',
            Self::Commit => b'c',
        }
    }

    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            b'b' => Some(Self::Blob),
            b't' => Some(Self::Tree),
            b'c' => Some(Self::Commit),
            _ => None,
        }
    }
}

impl std::fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Blob => write!(f, "blob"),
            Self::Tree => write!(f, "tree"),
            Self::Commit => write!(f, "commit"),
        }
    }
}

/// A stored object: kind tag + serialized data + cached size.
///
/// The store never interprets the data; it is keyed by content hash.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoredObject {
    pub kind: ObjectKind,
    pub data: Vec<u8>,
    pub size: u64,
}

impl StoredObject {
    pub fn new(kind: ObjectKind, data: Vec<u8>) -> Self {
        let size = data.len() as u64;
        Self { kind, data, size }
    }

    /// Compute the content-addressed ID for this object.
    pub fn compute_id(&self) -> ObjectId {
        let hasher = match self.kind {
            ObjectKind::Blob => &ContentHasher::BLOB,
            ObjectKind::Tree => &ContentHasher::TREE,
            ObjectKind::Commit => &ContentHasher::COMMIT,
        };
        hasher.hash(&self.data)
    }

    fn expect_kind(&self, kind: ObjectKind) -> StoreResult<()> {
        if self.kind != kind {
            return Err(StoreError::CorruptObject {
                id: self.compute_id(),
                reason: format!("expected {kind}, got {}", self.kind),
            });
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Blob
// ---------------------------------------------------------------------------

/// Raw content object.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Blob {
    pub data: Vec<u8>,
}

impl Blob {
    pub fn new(data: Vec<u8>) -> Self {
        Self { data }
    }

    /// Encode a JSON value (feature, tile pointer, JSON meta item).
    ///
    /// The encoding is canonical (sorted object keys), so equal values always
    /// produce equal blob ids.
    pub fn from_json(value: &Value) -> StoreResult<Self> {
        let data =
            serde_json::to_vec(value).map_err(|e| StoreError::Serialization(e.to_string()))?;
        Ok(Self { data })
    }

    /// Decode the blob as JSON.
    pub fn to_json(&self) -> StoreResult<Value> {
        serde_json::from_slice(&self.data).map_err(|e| StoreError::Serialization(e.to_string()))
    }

    /// Decode the blob as UTF-8 text.
    pub fn to_text(&self) -> StoreResult<String> {
        String::from_utf8(self.data.clone()).map_err(|e| StoreError::Serialization(e.to_string()))
    }

    pub fn to_stored_object(&self) -> StoredObject {
        StoredObject::new(ObjectKind::Blob, self.data.clone())
    }

    pub fn from_stored_object(obj: &StoredObject) -> StoreResult<Self> {
        obj.expect_kind(ObjectKind::Blob)?;
        Ok(Self {
            data: obj.data.clone(),
        })
    }
}

// ---------------------------------------------------------------------------
// Tree
// ---------------------------------------------------------------------------

/// Mode of a tree entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntryMode {
    /// Blob entry.
    Regular,
    /// Subtree entry.
    Directory,
}

/// A single entry in a tree object.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeEntry {
    pub mode: EntryMode,
    pub name: String,
    pub object_id: ObjectId,
}

impl TreeEntry {
    pub fn new(mode: EntryMode, name: impl Into<String>, object_id: ObjectId) -> Self {
        Self {
            mode,
            name: name.into(),
            object_id,
        }
    }

    pub fn blob(name: impl Into<String>, object_id: ObjectId) -> Self {
        Self::new(EntryMode::Regular, name, object_id)
    }

    pub fn tree(name: impl Into<String>, object_id: ObjectId) -> Self {
        Self::new(EntryMode::Directory, name, object_id)
    }

    pub fn is_tree(&self) -> bool {
        self.mode == EntryMode::Directory
    }
}

impl PartialOrd for TreeEntry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TreeEntry {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.name.cmp(&other.name)
    }
}

/// Directory listing object.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tree {
    /// Entries sorted by name.
    pub entries: Vec<TreeEntry>,
}

impl Tree {
    /// Entries are sorted by name for deterministic hashing.
    pub fn new(mut entries: Vec<TreeEntry>) -> Self {
        entries.sort();
        Self { entries }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn to_stored_object(&self) -> StoreResult<StoredObject> {
        let data =
            serde_json::to_vec(self).map_err(|e| StoreError::Serialization(e.to_string()))?;
        Ok(StoredObject::new(ObjectKind::Tree, data))
    }

    pub fn from_stored_object(obj: &StoredObject) -> StoreResult<Self> {
        obj.expect_kind(ObjectKind::Tree)?;
        serde_json::from_slice(&obj.data).map_err(|e| StoreError::Serialization(e.to_string()))
    }

    /// Look up an entry by name.
    pub fn get(&self, name: &str) -> Option<&TreeEntry> {
        self.entries
            .binary_search_by(|e| e.name.as_str().cmp(name))
            .ok()
            .map(|i| &self.entries[i])
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Commit
// ---------------------------------------------------------------------------

/// A commit: the root tree of a snapshot and its parent commits.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitObject {
    pub tree: ObjectId,
    pub parents: Vec<ObjectId>,
    pub message: String,
    pub author: String,
    /// Milliseconds since the Unix epoch.
    pub timestamp_ms: u64,
}

impl CommitObject {
    pub fn to_stored_object(&self) -> StoreResult<StoredObject> {
        let data =
            serde_json::to_vec(self).map_err(|e| StoreError::Serialization(e.to_string()))?;
        Ok(StoredObject::new(ObjectKind::Commit, data))
    }

    pub fn from_stored_object(obj: &StoredObject) -> StoreResult<Self> {
        obj.expect_kind(ObjectKind::Commit)?;
        serde_json::from_slice(&obj.data).map_err(|e| StoreError::Serialization(e.to_string()))
    }

    /// First line of the message.
    pub fn summary(&self) -> &str {
        self.message.lines().next().unwrap_or("")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn blob_kind_mismatch() {
        let stored = StoredObject::new(ObjectKind::Tree, b"not a blob".to_vec());
        let err = Blob::from_stored_object(&stored).unwrap_err();
        assert!(matches!(err, StoreError::CorruptObject { .. }));
    }

    #[test]
    fn json_blob_encoding_is_canonical() {
        let a = Blob::from_json(&json!({"b": 1, "a": 2})).unwrap();
        let b = Blob::from_json(&json!({"a": 2, "b": 1})).unwrap();
        assert_eq!(a.to_stored_object().compute_id(), b.to_stored_object().compute_id());
        assert_eq!(a.to_json().unwrap(), json!({"a": 2, "b": 1}));
    }

    #[test]
    fn tree_entries_sorted_and_searchable() {
        let tree = Tree::new(vec![
            TreeEntry::blob("zebra", ObjectId::null()),
            TreeEntry::blob("alpha", ObjectId::null()),
            TreeEntry::tree("middle", ObjectId::from_bytes(b"m")),
        ]);
        assert_eq!(tree.entries[0].name, "alpha");
        assert_eq!(tree.entries[2].name, "zebra");
        assert!(tree.get("middle").unwrap().is_tree());
        assert!(tree.get("missing").is_none());
    }

    #[test]
    fn tree_roundtrip() {
        let tree = Tree::new(vec![TreeEntry::blob("1", ObjectId::from_bytes(b"f1"))]);
        let stored = tree.to_stored_object().unwrap();
        assert_eq!(Tree::from_stored_object(&stored).unwrap(), tree);
    }

    #[test]
    fn commit_roundtrip_and_summary() {
        let commit = CommitObject {
            tree: ObjectId::from_bytes(b"root"),
            parents: vec![ObjectId::from_bytes(b"parent")],
            message: "Import parcels\n\nFrom the 2024 survey".into(),
            author: "surveyor".into(),
            timestamp_ms: 1_700_000_000_000,
        };
        let stored = commit.to_stored_object().unwrap();
        assert_eq!(stored.kind, ObjectKind::Commit);
        let decoded = CommitObject::from_stored_object(&stored).unwrap();
        assert_eq!(decoded, commit);
        assert_eq!(decoded.summary(), "Import parcels");
    }

    #[test]
    fn kind_tags_roundtrip() {
        for kind in [ObjectKind::Blob, ObjectKind::Tree, ObjectKind::Commit] {
            assert_eq!(ObjectKind::from_tag(kind.tag()), Some(kind));
        }
        assert_eq!(ObjectKind::from_tag(b'x'), None);
    }
}
