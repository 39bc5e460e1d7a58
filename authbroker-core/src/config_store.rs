//! Persistence of derived client configurations.
//!
//! The platform reads a customized configuration back from a file, so the
//! derived document is written before the client is created.
//!
//! # Storage Location
//!
//! [`FileConfigStore::load`] writes to `client_config.json` in the platform
//! data directory (`~/.local/share/authbroker` on Linux).

use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::config::ClientConfiguration;

/// File name of the persisted configuration.
pub const CONFIG_FILE_NAME: &str = "client_config.json";

/// Error type for configuration persistence.
#[derive(Debug, Error)]
pub enum ConfigStoreError {
    /// I/O error writing the document.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Data directory not available.
    #[error("data directory not available")]
    DataDirUnavailable,
}

/// Destination for derived configurations.
pub trait ConfigStore: Send + Sync {
    /// Write `config` and return the location the platform should read.
    fn persist(&self, config: &ClientConfiguration) -> Result<PathBuf, ConfigStoreError>;

    /// Where the configuration is (or will be) stored.
    fn location(&self) -> &Path;
}

/// Stores the configuration as a JSON file.
#[derive(Debug, Clone)]
pub struct FileConfigStore {
    path: PathBuf,
}

impl FileConfigStore {
    /// Default location of the configuration file.
    pub fn default_path() -> Result<PathBuf, ConfigStoreError> {
        let dirs = directories::ProjectDirs::from("com", "raibid-labs", "authbroker")
            .ok_or(ConfigStoreError::DataDirUnavailable)?;
        Ok(dirs.data_dir().join(CONFIG_FILE_NAME))
    }

    /// Store at the default location.
    pub fn load() -> Result<Self, ConfigStoreError> {
        Ok(Self::at(Self::default_path()?))
    }

    /// Store at `path`.
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store `client_config.json` inside `dir`.
    pub fn in_dir(dir: &Path) -> Self {
        Self::at(dir.join(CONFIG_FILE_NAME))
    }
}

impl ConfigStore for FileConfigStore {
    fn persist(&self, config: &ClientConfiguration) -> Result<PathBuf, ConfigStoreError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let contents = serde_json::to_string_pretty(config)?;
        fs::write(&self.path, contents)?;

        Ok(self.path.clone())
    }

    fn location(&self) -> &Path {
        &self.path
    }
}
