//! Run configuration loading for tp-core.
//!
//! This module handles:
//! - Resolving the configuration path (CLI > env > XDG > system)
//! - Reading and parsing the JSON file
//! - Semantic validation
//! - Config snapshot generation for run logs

pub use tp_config::validate::ValidationError;
pub use tp_config::{
    ConfigLocation, ConfigSnapshot, ConfigSource, ModePreset, RunConfiguration, TableConfiguration,
    CONFIG_SCHEMA_VERSION,
};

use std::path::{Path, PathBuf};
use thiserror::Error;
use tp_config::{resolve_config, validate_run_config};

/// Errors that can occur during config loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("no run configuration found (pass --config or set TP_CONFIG)")]
    NotFound,

    #[error("config file not found: {path}")]
    Missing { path: PathBuf },

    #[error("I/O error reading {path}: {source}")]
    IoError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid JSON in config file {path}: {source}")]
    ParseError {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("semantic validation failed: {0}")]
    ValidationError(#[from] ValidationError),
}

impl ConfigError {
    /// Whether the file was found but its content is unusable.
    pub fn is_invalid_content(&self) -> bool {
        matches!(
            self,
            ConfigError::ParseError { .. } | ConfigError::ValidationError(_)
        )
    }
}

impl From<ConfigError> for tp_common::Error {
    fn from(err: ConfigError) -> Self {
        if err.is_invalid_content() {
            tp_common::Error::InvalidConfig(err.to_string())
        } else {
            tp_common::Error::Config(err.to_string())
        }
    }
}

/// A validated configuration with provenance.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config: RunConfiguration,
    pub location: ConfigLocation,
    pub snapshot: ConfigSnapshot,
}

impl LoadedConfig {
    /// Path the configuration came from.
    pub fn path(&self) -> Option<&Path> {
        self.location.path.as_deref()
    }
}

/// Resolve, read, parse and validate the run configuration.
pub fn load_run_config(cli_path: Option<&Path>) -> Result<LoadedConfig, ConfigError> {
    load_from_location(resolve_config(cli_path))
}

/// Read, parse and validate the configuration at an already resolved location.
pub fn load_from_location(location: ConfigLocation) -> Result<LoadedConfig, ConfigError> {
    let path = location.path.clone().ok_or(ConfigError::NotFound)?;
    if !path.exists() {
        return Err(ConfigError::Missing { path });
    }

    let raw = std::fs::read_to_string(&path).map_err(|source| ConfigError::IoError {
        path: path.clone(),
        source,
    })?;
    let config: RunConfiguration =
        serde_json::from_str(&raw).map_err(|source| ConfigError::ParseError {
            path: path.clone(),
            source,
        })?;
    validate_run_config(&config)?;

    let snapshot = ConfigSnapshot::new(&config, &location, &raw);
    Ok(LoadedConfig {
        config,
        location,
        snapshot,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    const VALID: &str = r#"{
        "connection": { "server": "srv", "database": "db" },
        "tables": [{
            "name": "Sales",
            "partitioning": [{
                "source_table": "dbo.Sales", "source_column": "DateKey",
                "granularity": "monthly", "max_date": "2024-03-31",
                "partitions_full": 12, "partitions_incremental": 3
            }]
        }]
    }"#;

    #[test]
    fn test_load_valid_config() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("run.json");
        fs::write(&path, VALID).unwrap();

        let loaded = load_run_config(Some(&path)).unwrap();
        assert_eq!(loaded.config.tables.len(), 1);
        assert_eq!(loaded.location.source, ConfigSource::CliArgument);
        assert_eq!(loaded.path(), Some(path.as_path()));
        assert_eq!(loaded.snapshot.summary.partitioning_count, 1);
    }

    #[test]
    fn test_missing_cli_path() {
        let dir = tempdir().unwrap();
        let err = load_run_config(Some(&dir.path().join("absent.json"))).unwrap_err();
        assert!(matches!(err, ConfigError::Missing { .. }));
        assert_eq!(tp_common::Error::from(err).code(), 10);
    }

    #[test]
    fn test_nothing_resolved() {
        let err = load_from_location(ConfigLocation::default()).unwrap_err();
        assert!(matches!(err, ConfigError::NotFound));
    }

    #[test]
    fn test_invalid_json_is_invalid_config() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("run.json");
        fs::write(&path, "{ nope").unwrap();

        let err = load_run_config(Some(&path)).unwrap_err();
        assert!(err.is_invalid_content());
        assert_eq!(tp_common::Error::from(err).code(), 11);
    }

    #[test]
    fn test_semantic_failure_is_invalid_config() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("run.json");
        fs::write(&path, VALID.replace("\"partitions_full\": 12", "\"partitions_full\": 0")).unwrap();

        let err = load_run_config(Some(&path)).unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));
    }
}
