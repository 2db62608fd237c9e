//! Loader configuration

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::constants::STORE_FILE_NAME;
use crate::{Error, Result};

/// Records inserted per persistent-store transaction
pub const DEFAULT_BATCH_SIZE: usize = 5000;

/// Version tag of the dataset this build expects
pub const DEFAULT_DATASET_VERSION: &str = "1";

/// Where the loaded dataset lives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageMode {
    /// Whole dataset in a hash map, rebuilt every run
    Memory,
    /// Batched import into an embedded database, reused across runs
    #[default]
    Persistent,
}

impl fmt::Display for StorageMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageMode::Memory => write!(f, "memory"),
            StorageMode::Persistent => write!(f, "persistent"),
        }
    }
}

impl FromStr for StorageMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "memory" => Ok(StorageMode::Memory),
            "persistent" => Ok(StorageMode::Persistent),
            other => Err(Error::InvalidConfig(format!(
                "unknown storage mode '{}', expected 'memory' or 'persistent'",
                other
            ))),
        }
    }
}

/// Runtime configuration for the load coordinator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LookupConfig {
    pub mode: StorageMode,
    /// HTTP(S) URL or local path of the dataset blob
    pub dataset_url: String,
    /// Directory holding the persistent store
    pub data_dir: PathBuf,
    /// Tag compared against the persisted copy to detect staleness
    pub dataset_version: String,
    pub batch_size: usize,
}

impl Default for LookupConfig {
    fn default() -> Self {
        Self {
            mode: StorageMode::default(),
            dataset_url: String::new(),
            data_dir: PathBuf::from("data"),
            dataset_version: DEFAULT_DATASET_VERSION.to_string(),
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

impl LookupConfig {
    pub fn new(mode: StorageMode, dataset_url: impl Into<String>) -> Self {
        Self {
            mode,
            dataset_url: dataset_url.into(),
            ..Self::default()
        }
    }

    /// Load from a JSON file; missing fields take their defaults
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read(path)?;
        let config: Self = serde_json::from_slice(&data)?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.dataset_url.trim().is_empty() {
            return Err(Error::InvalidConfig("dataset_url is empty".to_string()));
        }
        if self.batch_size == 0 {
            return Err(Error::InvalidConfig("batch_size must be > 0".to_string()));
        }
        if self.dataset_version.is_empty() {
            return Err(Error::InvalidConfig("dataset_version is empty".to_string()));
        }
        Ok(())
    }

    /// Path of the persistent store file
    pub fn store_path(&self) -> PathBuf {
        self.data_dir.join(STORE_FILE_NAME)
    }

    /// Whether the dataset location is a remote URL rather than a file
    pub fn is_remote(&self) -> bool {
        self.dataset_url.starts_with("http://") || self.dataset_url.starts_with("https://")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = LookupConfig::default();
        assert_eq!(config.mode, StorageMode::Persistent);
        assert_eq!(config.batch_size, 5000);
        assert_eq!(config.dataset_version, "1");
        assert_eq!(config.store_path(), PathBuf::from("data/balances.redb"));
    }

    #[test]
    fn test_mode_parse() {
        assert_eq!("memory".parse::<StorageMode>().unwrap(), StorageMode::Memory);
        assert_eq!("Persistent".parse::<StorageMode>().unwrap(), StorageMode::Persistent);
        assert!("disk".parse::<StorageMode>().is_err());
        assert_eq!(StorageMode::Memory.to_string(), "memory");
    }

    #[test]
    fn test_validate() {
        let mut config = LookupConfig::new(StorageMode::Memory, "https://example.com/airdrop.json");
        assert!(config.validate().is_ok());
        assert!(config.is_remote());

        config.batch_size = 0;
        assert!(config.validate().is_err());

        let empty = LookupConfig::default();
        assert!(empty.validate().is_err());
    }

    #[test]
    fn test_load_partial_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"mode": "memory", "dataset_url": "airdrop.json", "batch_size": 250}}"#
        )
        .unwrap();

        let config = LookupConfig::load(file.path()).unwrap();
        assert_eq!(config.mode, StorageMode::Memory);
        assert_eq!(config.batch_size, 250);
        assert_eq!(config.dataset_version, DEFAULT_DATASET_VERSION);
        assert!(!config.is_remote());
    }
}
