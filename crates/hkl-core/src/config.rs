use std::path::Path;

use hkl_store::StorageOptions;
use serde::{Deserialize, Serialize};

use crate::error::{HklError, HklResult};

/// Options for a single dump.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DumpOptions {
    /// Group inside the store that receives the dump. Created if missing;
    /// must be empty if it exists.
    pub path: String,
    /// Filters forwarded to every dataset a loader creates.
    pub storage: StorageOptions,
    /// Allow opt-in ("custom") loaders.
    pub enable_custom_loaders: bool,
    /// Record a `CREATED` timestamp on the root. Off for reproducible files.
    pub track_times: bool,
}

impl Default for DumpOptions {
    fn default() -> Self {
        Self {
            path: "/".to_string(),
            storage: StorageOptions::default(),
            enable_custom_loaders: false,
            track_times: false,
        }
    }
}

impl DumpOptions {
    pub fn at(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    pub fn with_storage(mut self, storage: StorageOptions) -> Self {
        self.storage = storage;
        self
    }

    pub fn with_custom_loaders(mut self, enabled: bool) -> Self {
        self.enable_custom_loaders = enabled;
        self
    }

    pub fn with_track_times(mut self, enabled: bool) -> Self {
        self.track_times = enabled;
        self
    }
}

/// Options for a single load.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoadOptions {
    /// Group inside the store holding the dump.
    pub path: String,
    /// Allow opt-in loaders even if the file did not record them.
    pub enable_custom_loaders: bool,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            path: "/".to_string(),
            enable_custom_loaders: false,
        }
    }
}

impl LoadOptions {
    pub fn at(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    pub fn with_custom_loaders(mut self, enabled: bool) -> Self {
        self.enable_custom_loaders = enabled;
        self
    }
}

/// File-based configuration: default dump and load options.
///
/// ```toml
/// [dump]
/// path = "/"
/// track_times = true
///
/// [dump.storage]
/// checksum = true
/// compression = { kind = "zstd", level = 9 }
///
/// [load]
/// enable_custom_loaders = true
/// ```
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HklConfig {
    pub dump: DumpOptions,
    pub load: LoadOptions,
}

impl HklConfig {
    /// Parse a TOML document.
    pub fn from_toml_str(raw: &str) -> HklResult<Self> {
        toml::from_str(raw).map_err(|e| HklError::Configuration(e.to_string()))
    }

    /// Read and parse a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> HklResult<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            HklError::Configuration(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&raw)
    }

    /// Render as TOML.
    pub fn to_toml_string(&self) -> HklResult<String> {
        toml::to_string(self).map_err(|e| HklError::Configuration(e.to_string()))
    }
}
