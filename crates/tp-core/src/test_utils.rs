//! Test utilities for tp-core.
//!
//! Builders for run configurations and seeded stores shared by unit tests
//! and, with the `test-utils` feature, by downstream integration tests.

use chrono::NaiveDate;
use tp_common::{Granularity, RunId};
use tp_config::{ConnectionInfo, PartitioningConfiguration, RunConfiguration, TableConfiguration};

use crate::logging::LogContext;
use crate::processor::RunContext;
use crate::store::{InMemoryStore, ModelSnapshot};

pub const SERVER: &str = "sql-test-01";
pub const DATABASE: &str = "AdventureWorks";
pub const SOURCE_TABLE: &str = "[dbo].[FactInternetSales]";
pub const SOURCE_COLUMN: &str = "OrderDateKey";

/// Parse `yyyy-mm-dd`; panics on malformed input.
pub fn date(text: &str) -> NaiveDate {
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .unwrap_or_else(|e| panic!("bad test date {text}: {e}"))
}

pub fn partitioning(
    granularity: Granularity,
    max_date: &str,
    partitions_full: u32,
    partitions_incremental: u32,
) -> PartitioningConfiguration {
    PartitioningConfiguration {
        source_table: SOURCE_TABLE.to_string(),
        source_column: SOURCE_COLUMN.to_string(),
        granularity,
        max_date: date(max_date),
        partitions_full,
        partitions_incremental,
    }
}

pub fn partitioned_table(name: &str, partitioning: PartitioningConfiguration) -> TableConfiguration {
    TableConfiguration {
        name: name.to_string(),
        partitioning: vec![partitioning],
    }
}

pub fn whole_table(name: &str) -> TableConfiguration {
    TableConfiguration {
        name: name.to_string(),
        partitioning: Vec::new(),
    }
}

/// Incremental online configuration against the test model.
pub fn run_config(tables: Vec<TableConfiguration>) -> RunConfiguration {
    RunConfiguration {
        schema_version: tp_config::CONFIG_SCHEMA_VERSION.to_string(),
        connection: ConnectionInfo {
            server: SERVER.to_string(),
            database: DATABASE.to_string(),
            max_parallelism: None,
        },
        initial_setup: false,
        incremental_online: true,
        incremental_parallel_tables: false,
        tables,
    }
}

pub fn model() -> ModelSnapshot {
    ModelSnapshot::new(SERVER, DATABASE)
}

pub fn store(model: ModelSnapshot) -> InMemoryStore {
    InMemoryStore::new(model)
}

pub fn run_context(config: RunConfiguration) -> RunContext {
    let run_id = RunId::new();
    let log = LogContext::new(run_id.as_str(), "host-test").with_model(SERVER, DATABASE);
    RunContext {
        run_id,
        config,
        log,
    }
}
