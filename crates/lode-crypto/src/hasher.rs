use lode_types::ObjectId;

/// Domain-separated BLAKE3 content hasher.
///
/// The domain tag (e.g. `"lode-blob-v1"`) is prepended to every hash
/// computation.
pub struct ContentHasher {
    domain: &'static str,
}

impl ContentHasher {
    /// Feature and tile content, meta items.
    pub const BLOB: Self = Self {
        domain: "lode-blob-v1",
    };
    pub const TREE: Self = Self {
        domain: "lode-tree-v1",
    };
    pub const COMMIT: Self = Self {
        domain: "lode-commit-v1",
    };

    pub fn hash(&self, data: &[u8]) -> ObjectId {
        let mut hasher = blake3::Hasher::new();
        hasher.update(self.domain.as_bytes());
        hasher.update(b":");
        hasher.update(data);
        ObjectId::from_hash(*hasher.finalize().as_bytes())
    }
}
