//! Store settings, loadable from a JSON file.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, StoreError};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct StoreConfig {
    /// Directory holding one region file per region.
    pub root: PathBuf,
    /// Gzip region files on save.
    pub deflate: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("lights"),
            deflate: true,
        }
    }
}

impl StoreConfig {
    /// Read a config file. Missing keys keep their defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config = serde_json::from_str(&contents).map_err(|source| StoreError::Config {
            path: path.to_path_buf(),
            source,
        })?;
        tracing::info!("Loaded config from {}", path.display());
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let serialized = serde_json::to_string_pretty(self).map_err(|source| StoreError::Config {
            path: path.to_path_buf(),
            source,
        })?;
        fs::write(path, serialized)?;
        Ok(())
    }
}
