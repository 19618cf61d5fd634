//! Store configuration.
//!
//! Settings come from an optional TOML file at `$REVIEWDB_CONFIG` or
//! `~/.config/reviewdb/config.toml` (or XDG equivalent). Every key is
//! optional; a missing file means defaults.
//!
//! ```toml
//! data_dir = "/var/lib/reviewdb"
//! database = "291db"
//! collection = "reviews"
//! batch_size = 5000
//! ```
//!
//! The data directory resolves as: `--data-dir` flag (or `REVIEWDB_DATA_DIR`)
//! > `data_dir` from the file > the platform data dir joined with `reviewdb`.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::loader::DEFAULT_BATCH_SIZE;

pub const CONFIG_ENV: &str = "REVIEWDB_CONFIG";
pub const DATA_DIR_ENV: &str = "REVIEWDB_DATA_DIR";
pub const DEFAULT_DATABASE: &str = "291db";
pub const DEFAULT_COLLECTION: &str = "reviews";

/// Errors that can occur when loading configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Could not determine a data directory; pass --data-dir")]
    NoDataDir,

    #[error("Validation error: {0}")]
    Validation(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Root directory holding one store per port.
    pub data_dir: Option<PathBuf>,
    /// Database name; becomes the store file name.
    pub database: String,
    /// Collection the loader writes and the queries read.
    pub collection: String,
    /// Documents per bulk insert.
    pub batch_size: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            data_dir: None,
            database: DEFAULT_DATABASE.to_string(),
            collection: DEFAULT_COLLECTION.to_string(),
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

impl StoreConfig {
    /// Path of the config file, if one can be determined.
    pub fn config_path() -> Option<PathBuf> {
        if let Ok(p) = std::env::var(CONFIG_ENV)
            && !p.is_empty()
        {
            return Some(PathBuf::from(p));
        }
        dirs::config_dir().map(|d| d.join("reviewdb").join("config.toml"))
    }

    /// Load from the default location; defaults when the file is absent.
    pub fn load() -> Result<Self, ConfigError> {
        match Self::config_path() {
            Some(path) if path.exists() => Self::load_from(&path),
            _ => Ok(Self::default()),
        }
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for (what, name) in [("database", &self.database), ("collection", &self.collection)] {
            if name.is_empty() {
                return Err(ConfigError::Validation(format!("{what} name cannot be empty")));
            }
            if !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
                return Err(ConfigError::Validation(format!(
                    "{what} name '{name}' may only contain letters, digits and underscores"
                )));
            }
        }
        if self.batch_size == 0 {
            return Err(ConfigError::Validation("batch_size must be at least 1".into()));
        }
        Ok(())
    }

    /// Resolve the data directory; `flag` already carries the env fallback.
    pub fn resolve_data_dir(&self, flag: Option<&Path>) -> Result<PathBuf, ConfigError> {
        if let Some(dir) = flag {
            return Ok(dir.to_path_buf());
        }
        if let Some(dir) = &self.data_dir {
            return Ok(dir.clone());
        }
        dirs::data_dir()
            .map(|d| d.join("reviewdb"))
            .ok_or(ConfigError::NoDataDir)
    }

    /// Store file for the instance listening on `port`.
    pub fn store_path(&self, data_dir: &Path, port: u16) -> PathBuf {
        data_dir
            .join(format!("port-{port}"))
            .join(format!("{}.db", self.database))
    }
}
