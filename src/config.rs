//! Configuration
//!
//! One JSON file holds everything: the data directory, the logical table,
//! migration chunking, retry bounds, and the HTTP surface. Missing fields
//! fall back to defaults so a minimal config is just a data_dir.

use crate::http_server::HttpServerConfig;
use crate::schema::{ColumnDef, LogicalTable};
use crate::sync::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Result type for configuration loading
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Configuration file errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// File could not be read or written
    #[error("config io at {path}: {reason}")]
    Io {
        /// The file path
        path: String,
        /// The io failure
        reason: String,
    },

    /// File is not valid JSON or fails validation
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// The logical table keyspan fronts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableConfig {
    /// Logical table name
    #[serde(default = "default_table_name")]
    pub name: String,
    /// Partition key column
    #[serde(default = "default_key_column")]
    pub key_column: String,
    /// Column definitions
    #[serde(default = "default_columns")]
    pub columns: Vec<ColumnDef>,
}

fn default_table_name() -> String {
    "events".to_string()
}

fn default_key_column() -> String {
    "id".to_string()
}

fn default_columns() -> Vec<ColumnDef> {
    vec![ColumnDef::string("id"), ColumnDef::string("title")]
}

impl Default for TableConfig {
    fn default() -> Self {
        Self {
            name: default_table_name(),
            key_column: default_key_column(),
            columns: default_columns(),
        }
    }
}

impl TableConfig {
    /// The logical table at schema version 1.
    pub fn logical_table(&self) -> LogicalTable {
        LogicalTable::new(&self.name, &self.key_column, self.columns.clone())
    }
}

/// Top-level keyspan configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyspanConfig {
    /// Data directory (checkpoints live here)
    pub data_dir: PathBuf,

    /// Rows per migration chunk (default 500)
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Retry budget for remote operations
    #[serde(default)]
    pub retry: RetryPolicy,

    /// HTTP surface
    #[serde(default)]
    pub http: HttpServerConfig,

    /// The fronted logical table
    #[serde(default)]
    pub table: TableConfig,
}

fn default_chunk_size() -> usize {
    500
}

impl Default for KeyspanConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./keyspan-data"),
            chunk_size: default_chunk_size(),
            retry: RetryPolicy::default(),
            http: HttpServerConfig::default(),
            table: TableConfig::default(),
        }
    }
}

impl KeyspanConfig {
    /// Load and validate a configuration file.
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let content = fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        let config: KeyspanConfig =
            serde_json::from_str(&content).map_err(|e| ConfigError::Invalid(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Write the configuration to a file.
    pub fn save(&self, path: &Path) -> ConfigResult<()> {
        let body = serde_json::to_string_pretty(self)
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;
        fs::write(path, body).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            reason: e.to_string(),
        })
    }

    /// Validate field constraints.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.chunk_size == 0 {
            return Err(ConfigError::Invalid("chunk_size must be > 0".into()));
        }
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::Invalid("retry.max_attempts must be > 0".into()));
        }
        self.table
            .logical_table()
            .validate_structure()
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;
        Ok(())
    }

    /// Directory where migration checkpoints are persisted.
    pub fn checkpoint_dir(&self) -> PathBuf {
        self.data_dir.join("checkpoints")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        assert!(KeyspanConfig::default().validate().is_ok());
    }

    #[test]
    fn test_save_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("keyspan.json");
        let config = KeyspanConfig::default();
        config.save(&path).unwrap();
        let loaded = KeyspanConfig::load(&path).unwrap();
        assert_eq!(loaded.chunk_size, config.chunk_size);
        assert_eq!(loaded.table.name, "events");
    }

    #[test]
    fn test_minimal_config_gets_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("keyspan.json");
        fs::write(&path, r#"{"data_dir": "/tmp/ks"}"#).unwrap();
        let config = KeyspanConfig::load(&path).unwrap();
        assert_eq!(config.chunk_size, 500);
        assert_eq!(config.table.key_column, "id");
    }

    #[test]
    fn test_zero_chunk_size_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("keyspan.json");
        fs::write(&path, r#"{"data_dir": "/tmp/ks", "chunk_size": 0}"#).unwrap();
        assert!(KeyspanConfig::load(&path).is_err());
    }

    #[test]
    fn test_bad_table_rejected() {
        let mut config = KeyspanConfig::default();
        config.table.key_column = "missing".into();
        assert!(config.validate().is_err());
    }
}
