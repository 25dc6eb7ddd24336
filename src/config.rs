//! Dataset configuration
//!
//! Stored as JSON in `<dataset>/.data/config.json`. Every field has a
//! default, so a missing file is a valid (default) configuration.
//! Environment variables override the file:
//!
//! - `DATADEX_URL`: remote store URL
//! - `DATADEX_STORE`: local store directory

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default datadex service URL
pub const DEFAULT_REMOTE_URL: &str = "http://datadex.io/blobs";

/// Per-dataset working directory, ignored by manifest scans
pub const DATA_DIR: &str = ".data";

const CONFIG_FILE: &str = "config.json";

/// Which blob store a [`crate::DatasetIndex`] binds
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// Filesystem store on this machine
    Local,
    /// HTTP store at [`Config::remote_url`]
    Remote,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Base URL of the remote blob store
    #[serde(default = "default_remote_url")]
    pub remote_url: String,
    /// Per-request timeout for the remote store; unset means no timeout
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    /// Local store directory; relative paths resolve against the dataset
    #[serde(default)]
    pub local_store: Option<PathBuf>,
    /// Use one store in the user cache dir shared by all datasets
    #[serde(default)]
    pub shared_cache: bool,
    /// Reuse file hashes across runs while size and mtime are unchanged
    #[serde(default)]
    pub hash_cache: bool,
}

fn default_remote_url() -> String {
    DEFAULT_REMOTE_URL.to_string()
}

impl Default for Config {
    fn default() -> Self {
        Config {
            remote_url: default_remote_url(),
            timeout_secs: None,
            local_store: None,
            shared_cache: false,
            hash_cache: false,
        }
    }
}

impl Config {
    /// Load the dataset's config file (or defaults) and apply environment
    /// overrides
    pub fn load(dataset_dir: &Path) -> Result<Self> {
        let mut config = Self::load_file(dataset_dir)?;
        config.apply_overrides(|name| std::env::var(name).ok());
        Ok(config)
    }

    /// Load only the config file, ignoring the environment
    pub fn load_file(dataset_dir: &Path) -> Result<Self> {
        let path = Self::config_path(dataset_dir);
        if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            serde_json::from_str(&content)
                .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self, dataset_dir: &Path) -> Result<()> {
        let path = Self::config_path(dataset_dir);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Apply overrides from a variable lookup (the process environment in
    /// [`Config::load`])
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("DATADEX_URL").filter(|v| !v.is_empty()) {
            self.remote_url = url;
        }
        if let Some(dir) = lookup("DATADEX_STORE").filter(|v| !v.is_empty()) {
            self.local_store = Some(PathBuf::from(dir));
        }
    }

    pub fn config_path(dataset_dir: &Path) -> PathBuf {
        dataset_dir.join(DATA_DIR).join(CONFIG_FILE)
    }

    /// Directory backing the local blob store for a dataset
    pub fn local_store_path(&self, dataset_dir: &Path) -> Result<PathBuf> {
        if let Some(dir) = &self.local_store {
            return Ok(dataset_dir.join(dir));
        }
        if self.shared_cache {
            let cache = dirs::cache_dir()
                .ok_or_else(|| Error::Config("Could not find cache directory".into()))?;
            return Ok(cache.join("datadex").join("blobs"));
        }
        Ok(dataset_dir.join(DATA_DIR).join("blobs"))
    }

    #[cfg(feature = "remote")]
    pub fn remote_store_config(&self) -> crate::store::RemoteStoreConfig {
        crate::store::RemoteStoreConfig {
            url: self.remote_url.clone(),
            timeout_secs: self.timeout_secs,
        }
    }
}
