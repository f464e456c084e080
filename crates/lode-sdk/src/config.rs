//! Repository configuration, read from `.lode/config.toml`.

use std::path::{Path, PathBuf};

use lode_spatial::SpatialFilter;
use lode_store::FetchOptions;
use serde::{Deserialize, Serialize};

use crate::error::{SdkError, SdkResult};

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LodeConfig {
    pub spatial_filter: SpatialFilterConfig,
    pub remote: RemoteConfig,
    pub fetch: FetchConfig,
    pub diff: DiffConfig,
}

/// The repository's region of interest. No geometry means no filtering.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpatialFilterConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub geometry: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub crs: Option<String>,
}

impl SpatialFilterConfig {
    pub fn build(&self) -> SdkResult<SpatialFilter> {
        match &self.geometry {
            Some(wkt) => Ok(SpatialFilter::from_wkt(wkt, self.crs.as_deref())?),
            None => Ok(SpatialFilter::match_all()),
        }
    }
}

/// The promisor remote that omitted blobs are fetched from.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    pub name: String,
    /// Directory of another lode repository.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            name: "origin".into(),
            path: None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    pub batch_size: usize,
    pub worker_threads: usize,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            batch_size: 64,
            worker_threads: 2,
        }
    }
}

impl FetchConfig {
    pub fn options(&self) -> FetchOptions {
        FetchOptions {
            batch_size: self.batch_size,
            worker_threads: self.worker_threads,
        }
    }
}

/// Limits for the spatial filter conflict warning.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiffConfig {
    /// Keys listed when the list is truncated.
    pub conflict_inline_limit: usize,
    /// Longest list printed in full.
    pub conflict_full_limit: usize,
}

impl Default for DiffConfig {
    fn default() -> Self {
        Self {
            conflict_inline_limit: 50,
            conflict_full_limit: 100,
        }
    }
}

impl LodeConfig {
    /// Load from `path`. A missing file gives the defaults.
    pub fn load(path: &Path) -> SdkResult<Self> {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => return Err(e.into()),
        };
        Self::from_toml(&text).map_err(|e| SdkError::Config(format!("{}: {e}", path.display())))
    }

    pub fn from_toml(text: &str) -> SdkResult<Self> {
        toml::from_str(text).map_err(|e| SdkError::Config(e.to_string()))
    }

    pub fn to_toml(&self) -> SdkResult<String> {
        toml::to_string_pretty(self).map_err(|e| SdkError::Config(e.to_string()))
    }

    pub fn save(&self, path: &Path) -> SdkResult<()> {
        std::fs::write(path, self.to_toml()?)?;
        Ok(())
    }
}
