//! Dataset item keys.
//!
//! Features are keyed by their primary key value, which is usually an integer
//! but may be text. Tiles are keyed by name. Integer keys order numerically
//! and sort before text keys, so `2` comes before `10`.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Key of a single item (feature or tile) within a dataset.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ItemKey {
    Int(i64),
    Str(String),
}

impl ItemKey {
    /// Parse a key as written by a user or stored as a tree entry name.
    ///
    /// Anything that parses as an `i64` becomes an integer key.
    pub fn parse(s: &str) -> Self {
        match s.parse::<i64>() {
            Ok(i) => ItemKey::Int(i),
            Err(_) => ItemKey::Str(s.to_string()),
        }
    }

    /// Like [`ItemKey::parse`], but rejects names that cannot be used as a
    /// tree entry.
    pub fn parse_entry_name(s: &str) -> Result<Self, TypeError> {
        if s.is_empty() || s.contains('/') {
            return Err(TypeError::InvalidKey(s.to_string()));
        }
        Ok(Self::parse(s))
    }

    /// The tree entry name this key is stored under.
    pub fn entry_name(&self) -> String {
        self.to_string()
    }

    /// Convert a JSON value (as found in a feature's primary key column).
    pub fn from_json(value: &serde_json::Value) -> Result<Self, TypeError> {
        match value {
            serde_json::Value::Number(n) => n
                .as_i64()
                .map(ItemKey::Int)
                .ok_or_else(|| TypeError::InvalidKey(n.to_string())),
            serde_json::Value::String(s) => Self::parse_entry_name(s),
            other => Err(TypeError::InvalidKey(other.to_string())),
        }
    }
}

impl fmt::Display for ItemKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ItemKey::Int(i) => write!(f, "{i}"),
            ItemKey::Str(s) => write!(f, "{s}"),
        }
    }
}

impl From<i64> for ItemKey {
    fn from(i: i64) -> Self {
        ItemKey::Int(i)
    }
}

impl From<i32> for ItemKey {
    fn from(i: i32) -> Self {
        ItemKey::Int(i64::from(i))
    }
}

impl From<&str> for ItemKey {
    fn from(s: &str) -> Self {
        ItemKey::parse(s)
    }
}

impl From<String> for ItemKey {
    fn from(s: String) -> Self {
        ItemKey::parse(&s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn integer_keys_sort_numerically() {
        let mut keys = vec![ItemKey::from(10), ItemKey::from(2), ItemKey::from(-1)];
        keys.sort();
        assert_eq!(keys, vec![ItemKey::Int(-1), ItemKey::Int(2), ItemKey::Int(10)]);
    }

    #[test]
    fn integers_sort_before_text() {
        let mut keys = vec![ItemKey::from("tile_a"), ItemKey::from(7)];
        keys.sort();
        assert_eq!(keys[0], ItemKey::Int(7));
    }

    #[test]
    fn parse_distinguishes_ints_and_text() {
        assert_eq!(ItemKey::parse("42"), ItemKey::Int(42));
        assert_eq!(ItemKey::parse("auto_0001.laz"), ItemKey::Str("auto_0001.laz".into()));
        assert_eq!(ItemKey::parse("42").entry_name(), "42");
    }

    #[test]
    fn entry_names_reject_slashes() {
        assert!(ItemKey::parse_entry_name("a/b").is_err());
        assert!(ItemKey::parse_entry_name("").is_err());
    }

    #[test]
    fn from_json_pk_values() {
        assert_eq!(ItemKey::from_json(&json!(5)).unwrap(), ItemKey::Int(5));
        assert_eq!(ItemKey::from_json(&json!("abc")).unwrap(), ItemKey::Str("abc".into()));
        assert!(ItemKey::from_json(&json!(1.5)).is_err());
        assert!(ItemKey::from_json(&json!(null)).is_err());
    }
}
