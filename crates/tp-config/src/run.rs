//! Run configuration schema.
//!
//! A run configuration names the analytical model to connect to, the
//! processing flags for this run, and per table the rolling windows that
//! govern its period partitions.

use chrono::NaiveDate;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tp_common::Granularity;

use crate::validate::ValidationError;

/// Root of a run configuration file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct RunConfiguration {
    /// Schema version for compatibility checking.
    #[serde(default = "default_schema_version")]
    pub schema_version: String,

    /// Where the tabular model lives.
    pub connection: ConnectionInfo,

    /// Bulk historical backfill: every partition of the full window is
    /// processed one at a time with a commit after each.
    #[serde(default)]
    pub initial_setup: bool,

    /// Incremental refreshes are Full (model stays queryable) rather than
    /// DataOnly followed by a model-wide recalculation.
    #[serde(default = "default_true")]
    pub incremental_online: bool,

    /// Queue every table before a single commit instead of committing
    /// table by table.
    #[serde(default)]
    pub incremental_parallel_tables: bool,

    /// Tables to process, in order.
    pub tables: Vec<TableConfiguration>,
}

/// Connection identifiers for the analytical engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ConnectionInfo {
    /// Server name or address.
    pub server: String,

    /// Database (model) name on the server.
    pub database: String,

    /// Upper bound on partitions the engine may refresh concurrently.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_parallelism: Option<u32>,
}

/// One table of the model.
///
/// A table without partitioning configurations is refreshed as a whole.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct TableConfiguration {
    /// Table name; also the name of its template partition.
    pub name: String,

    /// Rolling windows applied to this table, in order.
    #[serde(default)]
    pub partitioning: Vec<PartitioningConfiguration>,
}

impl TableConfiguration {
    /// Whether the table is managed as rolling-window partitions.
    pub fn is_partitioned(&self) -> bool {
        !self.partitioning.is_empty()
    }
}

/// Rolling window of period partitions for one table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct PartitioningConfiguration {
    /// Source-system table queried by each partition.
    pub source_table: String,

    /// Integer `yyyymmdd` column used to filter the source table.
    pub source_column: String,

    /// Period size of one partition.
    pub granularity: Granularity,

    /// Last (inclusive) date covered by the window.
    pub max_date: NaiveDate,

    /// Number of partitions retained in the window.
    pub partitions_full: u32,

    /// Number of most recent partitions refreshed by an incremental run.
    pub partitions_incremental: u32,
}

fn default_schema_version() -> String {
    crate::CONFIG_SCHEMA_VERSION.to_string()
}

fn default_true() -> bool {
    true
}

impl RunConfiguration {
    /// Load a run configuration from a JSON file.
    pub fn from_file(path: &std::path::Path) -> Result<Self, ValidationError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ValidationError::IoError(format!("Failed to read {}: {}", path.display(), e))
        })?;

        Self::from_str(&content)
    }

    /// Parse a run configuration from a JSON string.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(json: &str) -> Result<Self, ValidationError> {
        serde_json::from_str(json)
            .map_err(|e| ValidationError::ParseError(format!("Invalid JSON: {}", e)))
    }

    /// Total number of partitioning configurations across all tables.
    pub fn partitioning_count(&self) -> usize {
        self.tables.iter().map(|t| t.partitioning.len()).sum()
    }

    /// Look up a table by name.
    pub fn table(&self, name: &str) -> Option<&TableConfiguration> {
        self.tables.iter().find(|t| t.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "connection": { "server": "localhost", "database": "AdventureWorks" },
        "tables": [
            {
                "name": "Internet Sales",
                "partitioning": [{
                    "source_table": "[dbo].[FactInternetSales]",
                    "source_column": "OrderDateKey",
                    "granularity": "monthly",
                    "max_date": "2024-03-31",
                    "partitions_full": 12,
                    "partitions_incremental": 3
                }]
            },
            { "name": "Currency" }
        ]
    }"#;

    #[test]
    fn test_parse_applies_defaults() {
        let config = RunConfiguration::from_str(SAMPLE).unwrap();
        assert_eq!(config.schema_version, crate::CONFIG_SCHEMA_VERSION);
        assert!(!config.initial_setup);
        assert!(config.incremental_online);
        assert!(!config.incremental_parallel_tables);
        assert_eq!(config.connection.max_parallelism, None);
        assert_eq!(config.tables.len(), 2);
        assert_eq!(config.partitioning_count(), 1);
    }

    #[test]
    fn test_table_lookup_and_partitioned_flag() {
        let config = RunConfiguration::from_str(SAMPLE).unwrap();
        let sales = config.table("Internet Sales").unwrap();
        assert!(sales.is_partitioned());
        assert_eq!(sales.partitioning[0].granularity, Granularity::Monthly);
        assert_eq!(
            sales.partitioning[0].max_date,
            NaiveDate::from_ymd_opt(2024, 3, 31).unwrap()
        );
        assert!(!config.table("Currency").unwrap().is_partitioned());
        assert!(config.table("Missing").is_none());
    }

    #[test]
    fn test_parse_error_is_reported() {
        let err = RunConfiguration::from_str("{ not json").unwrap_err();
        assert!(matches!(err, ValidationError::ParseError(_)));
    }
}
