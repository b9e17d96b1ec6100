//! Configuration snapshots for run logs and reproducibility.
//!
//! A snapshot captures the exact configuration at the start of a run so a
//! run's log can be tied back to the file that drove it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::resolve::ConfigLocation;
use crate::RunConfiguration;

/// A frozen snapshot of configuration state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigSnapshot {
    /// When this snapshot was taken.
    pub timestamp: DateTime<Utc>,

    /// Schema version of the configuration.
    pub schema_version: String,

    /// Path the configuration was loaded from.
    #[serde(default)]
    pub path: Option<String>,

    /// How the path was discovered.
    pub source: String,

    /// SHA-256 hash of the raw configuration content.
    pub hash: String,

    /// Key configuration values for quick reference.
    pub summary: ConfigSummary,
}

/// Summary of key configuration values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigSummary {
    pub server: String,
    pub database: String,
    pub initial_setup: bool,
    pub incremental_online: bool,
    pub incremental_parallel_tables: bool,
    pub table_count: usize,
    pub partitioned_table_count: usize,
    pub partitioning_count: usize,
}

impl ConfigSnapshot {
    /// Create a new snapshot from a loaded configuration and its raw text.
    pub fn new(config: &RunConfiguration, location: &ConfigLocation, raw_json: &str) -> Self {
        ConfigSnapshot {
            timestamp: Utc::now(),
            schema_version: config.schema_version.clone(),
            path: location.path.as_ref().map(|p| p.display().to_string()),
            source: location.source.to_string(),
            hash: hash_content(raw_json),
            summary: ConfigSummary::from(config),
        }
    }

    /// Serialize snapshot to JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Check if this snapshot was taken from the same content as another.
    pub fn matches(&self, other: &ConfigSnapshot) -> bool {
        self.hash == other.hash
    }

    /// Get a short identifier for this snapshot (first 12 chars of hash).
    pub fn short_id(&self) -> &str {
        &self.hash[..12.min(self.hash.len())]
    }
}

impl From<&RunConfiguration> for ConfigSummary {
    fn from(config: &RunConfiguration) -> Self {
        ConfigSummary {
            server: config.connection.server.clone(),
            database: config.connection.database.clone(),
            initial_setup: config.initial_setup,
            incremental_online: config.incremental_online,
            incremental_parallel_tables: config.incremental_parallel_tables,
            table_count: config.tables.len(),
            partitioned_table_count: config.tables.iter().filter(|t| t.is_partitioned()).count(),
            partitioning_count: config.partitioning_count(),
        }
    }
}

/// Compute SHA-256 hash of content.
pub fn hash_content(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    hex::encode(hasher.finalize())
}
