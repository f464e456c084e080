use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::DatasetError;

/// The kind of a dataset. Determines its tree layout and item type.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DatasetType {
    /// Vector features with a schema, keyed by primary key.
    Table,
    /// Point-cloud tiles, keyed by tile name.
    PointCloud,
}

impl DatasetType {
    pub const ALL: [DatasetType; 2] = [DatasetType::Table, DatasetType::PointCloud];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Table => "table",
            Self::PointCloud => "point-cloud",
        }
    }

    /// Name of the marker subtree that identifies a dataset of this type.
    pub fn dirname(&self) -> &'static str {
        match self {
            Self::Table => ".table-dataset",
            Self::PointCloud => ".point-cloud-dataset",
        }
    }

    pub fn from_dirname(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.dirname() == name)
    }

    /// What the dataset's items are called.
    pub fn item_type(&self) -> &'static str {
        match self {
            Self::Table => "feature",
            Self::PointCloud => "tile",
        }
    }
}

impl fmt::Display for DatasetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DatasetType {
    type Err = DatasetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| DatasetError::UnknownType(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_roundtrip() {
        for t in DatasetType::ALL {
            assert_eq!(t.as_str().parse::<DatasetType>().unwrap(), t);
            assert_eq!(DatasetType::from_dirname(t.dirname()), Some(t));
        }
        assert!("raster".parse::<DatasetType>().is_err());
    }

    #[test]
    fn item_types() {
        assert_eq!(DatasetType::Table.item_type(), "feature");
        assert_eq!(DatasetType::PointCloud.item_type(), "tile");
    }
}
