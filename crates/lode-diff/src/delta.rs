//! Deltas: the change to one item, with lazily dereferenced values.

use std::fmt;
use std::ops::BitOr;
use std::sync::{Arc, OnceLock};

use lode_crypto::ContentHasher;
use lode_store::ObjectStore;
use lode_types::{ItemKey, ObjectId};
use serde_json::Value;

use crate::error::DiffResult;

/// Where a delta value comes from.
#[derive(Clone)]
enum ValueSource {
    /// A blob in the object store, read on first use.
    Stored {
        id: ObjectId,
        store: Arc<dyn ObjectStore>,
        cache: OnceLock<Value>,
    },
    /// Content held by the working copy.
    Inline { id: ObjectId, value: Value },
}

/// One side of a [`Delta`]: an item key and a reference to its content.
#[derive(Clone)]
pub struct DeltaValue {
    key: ItemKey,
    source: ValueSource,
}

impl DeltaValue {
    /// A value stored as blob `id`. Nothing is read until it is needed.
    pub fn stored(key: ItemKey, id: ObjectId, store: Arc<dyn ObjectStore>) -> Self {
        Self {
            key,
            source: ValueSource::Stored {
                id,
                store,
                cache: OnceLock::new(),
            },
        }
    }

    /// A value already in memory.
    pub fn inline(key: ItemKey, value: Value) -> Self {
        // Serializing a Value cannot fail.
        let data = serde_json::to_vec(&value).unwrap_or_default();
        let id = ContentHasher::BLOB.hash(&data);
        Self {
            key,
            source: ValueSource::Inline { id, value },
        }
    }

    pub fn key(&self) -> &ItemKey {
        &self.key
    }

    /// Id of the content. Stored and inline values with equal content have
    /// equal ids.
    pub fn content_id(&self) -> ObjectId {
        match &self.source {
            ValueSource::Stored { id, .. } | ValueSource::Inline { id, .. } => *id,
        }
    }

    pub fn is_inline(&self) -> bool {
        matches!(self.source, ValueSource::Inline { .. })
    }

    /// The content, reading and caching it on first use.
    ///
    /// Fails with the store's promised error when the blob was left out of a
    /// partial clone.
    pub fn value(&self) -> DiffResult<&Value> {
        match &self.source {
            ValueSource::Inline { value, .. } => Ok(value),
            ValueSource::Stored { id, store, cache } => {
                if let Some(v) = cache.get() {
                    return Ok(v);
                }
                let value = store.read_blob(id)?.to_json()?;
                Ok(cache.get_or_init(|| value))
            }
        }
    }

    /// Whether the content can be read without fetching. Ordinary not-found
    /// failures propagate.
    pub fn is_ready(&self) -> DiffResult<bool> {
        match self.value() {
            Ok(_) => Ok(true),
            Err(e) if e.is_promised() => Ok(false),
            Err(e) => Err(e),
        }
    }
}

impl PartialEq for DeltaValue {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key && self.content_id() == other.content_id()
    }
}

impl fmt::Debug for DeltaValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = if self.is_inline() { "inline" } else { "stored" };
        write!(f, "{}@{}({kind})", self.key, self.content_id().short_hex())
    }
}

/// Flags carried by a delta.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct DeltaFlags(u8);

impl DeltaFlags {
    pub const NONE: Self = Self(0);
    /// The delta comes from uncommitted working copy edits.
    pub const WORKING_COPY_EDIT: Self = Self(1);

    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for DeltaFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// The change to one item. At least one of `old` and `new` is present.
#[derive(Clone, Debug, PartialEq)]
pub struct Delta {
    old: Option<DeltaValue>,
    new: Option<DeltaValue>,
    flags: DeltaFlags,
}

impl Delta {
    pub fn insert(new: DeltaValue) -> Self {
        Self {
            old: None,
            new: Some(new),
            flags: DeltaFlags::NONE,
        }
    }

    pub fn delete(old: DeltaValue) -> Self {
        Self {
            old: Some(old),
            new: None,
            flags: DeltaFlags::NONE,
        }
    }

    pub fn update(old: DeltaValue, new: DeltaValue) -> Self {
        Self {
            old: Some(old),
            new: Some(new),
            flags: DeltaFlags::NONE,
        }
    }

    /// Build from optional sides. `None` when neither side exists or both
    /// sides hold the same content.
    pub fn from_sides(old: Option<DeltaValue>, new: Option<DeltaValue>) -> Option<Self> {
        match (&old, &new) {
            (None, None) => None,
            (Some(o), Some(n)) if o == n => None,
            _ => Some(Self {
                old,
                new,
                flags: DeltaFlags::NONE,
            }),
        }
    }

    pub fn with_flags(mut self, flags: DeltaFlags) -> Self {
        self.flags = self.flags | flags;
        self
    }

    pub fn old(&self) -> Option<&DeltaValue> {
        self.old.as_ref()
    }

    pub fn new_value(&self) -> Option<&DeltaValue> {
        self.new.as_ref()
    }

    pub fn flags(&self) -> DeltaFlags {
        self.flags
    }

    pub fn is_working_copy_edit(&self) -> bool {
        self.flags.contains(DeltaFlags::WORKING_COPY_EDIT)
    }

    /// The item key: the new key, or the old one for deletions.
    pub fn key(&self) -> &ItemKey {
        match (&self.new, &self.old) {
            (Some(v), _) | (None, Some(v)) => v.key(),
            (None, None) => unreachable!("a delta always has at least one side"),
        }
    }

    /// `"insert"`, `"update"` or `"delete"`.
    pub fn type_name(&self) -> &'static str {
        match (&self.old, &self.new) {
            (None, _) => "insert",
            (Some(_), Some(_)) => "update",
            (Some(_), None) => "delete",
        }
    }

    /// Collapse `self` (A→B) followed by `next` (B→C) into A→C.
    ///
    /// Returns `None` when the two halves cancel out: an insert followed by
    /// a delete, or an update that is reverted. The result is flagged with
    /// the union of both halves' flags.
    pub fn compose(self, next: Delta) -> Option<Delta> {
        let flags = self.flags | next.flags;
        Delta::from_sides(self.old, next.new).map(|d| d.with_flags(flags))
    }
}
