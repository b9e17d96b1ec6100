//! Rolling window plans.
//!
//! A plan says, for one partitioning configuration, which partitions exist,
//! which fall out of the window, and which keys will be processed. The
//! processor executes plans one at a time; `tp-core plan` prints them for a
//! whole run without touching the store.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tp_common::{Granularity, Result, StoreError};
use tp_config::{PartitioningConfiguration, RunConfiguration};

use crate::diff::{classify_existing, diff_window, WindowDiff};
use crate::granularity::{format_range, generate_period_sequence};
use crate::key::PartitionKey;
use crate::store::{PartitionStore, RefreshMode};

/// Processing flags of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RunMode {
    pub initial_setup: bool,
    pub incremental_online: bool,
    pub parallel_tables: bool,
}

impl RunMode {
    pub fn from_config(config: &RunConfiguration) -> Self {
        RunMode {
            initial_setup: config.initial_setup,
            incremental_online: config.incremental_online,
            parallel_tables: config.incremental_parallel_tables,
        }
    }

    /// Refresh used for whole tables and incremental partitions.
    pub fn refresh_mode(&self) -> RefreshMode {
        if self.incremental_online {
            RefreshMode::Full
        } else {
            RefreshMode::DataOnly
        }
    }

    /// Whether the run ends with a model-wide recalculation.
    pub fn needs_recalculation(&self) -> bool {
        self.initial_setup || !self.incremental_online
    }

    /// How many of the newest keys of a window get processed.
    pub fn processing_count(&self, partitioning: &PartitioningConfiguration) -> u32 {
        if self.initial_setup {
            partitioning.partitions_full
        } else {
            partitioning.partitions_incremental
        }
    }
}

/// One key scheduled for processing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlannedPartition {
    pub key: PartitionKey,
    /// The partition already exists and only needs a refresh.
    pub exists: bool,
}

/// Plan for one partitioning configuration of one table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConfigurationPlan {
    pub table: String,
    pub source_table: String,
    pub granularity: Granularity,
    /// Full rolling window, ascending.
    pub target: Vec<PartitionKey>,
    /// Existing keys of this granularity, ascending.
    pub existing: Vec<PartitionKey>,
    pub diff: WindowDiff,
    /// Newest keys to process, ascending.
    pub processing: Vec<PlannedPartition>,
}

impl ConfigurationPlan {
    pub fn removals(&self) -> &[PartitionKey] {
        &self.diff.removals
    }

    pub fn creation_count(&self) -> usize {
        self.processing.iter().filter(|p| !p.exists).count()
    }

    pub fn processing_keys(&self) -> Vec<PartitionKey> {
        self.processing.iter().map(|p| p.key).collect()
    }

    /// `yyyy-mm to yyyy-mm` of the full window.
    pub fn window_range(&self) -> Result<Option<String>> {
        Ok(format_range(&self.target)?)
    }

    /// `yyyy-mm to yyyy-mm` of the processed keys.
    pub fn processing_range(&self) -> Result<Option<String>> {
        Ok(format_range(&self.processing_keys())?)
    }
}

/// Plan one partitioning configuration against the table's partition names.
pub fn plan_configuration<S: AsRef<str>>(
    table: &str,
    partitioning: &PartitioningConfiguration,
    existing_names: &[S],
    mode: &RunMode,
) -> Result<ConfigurationPlan> {
    let granularity = partitioning.granularity;
    let target = generate_period_sequence(
        granularity,
        partitioning.max_date,
        partitioning.partitions_full,
    )?;
    let existing = classify_existing(existing_names, granularity);
    let diff = diff_window(&existing, &target);

    let processing = generate_period_sequence(
        granularity,
        partitioning.max_date,
        mode.processing_count(partitioning),
    )?
    .into_iter()
    .map(|key| PlannedPartition {
        exists: existing.binary_search(&key).is_ok(),
        key,
    })
    .collect();

    Ok(ConfigurationPlan {
        table: table.to_string(),
        source_table: partitioning.source_table.clone(),
        granularity,
        target,
        existing,
        diff,
        processing,
    })
}

/// Plan for one table of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TablePlan {
    pub table: String,
    pub partition_count: usize,
    /// Whole-table refresh for tables without partitioning.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub table_refresh: Option<RefreshMode>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub configurations: Vec<ConfigurationPlan>,
}

/// Totals across a run plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct PlanTotals {
    pub tables: usize,
    pub removals: usize,
    pub creations: usize,
    pub partition_refreshes: usize,
    pub table_refreshes: usize,
    pub beyond_window: usize,
}

/// Dry-run plan of a whole run.
#[derive(Debug, Clone, Serialize)]
pub struct RunPlan {
    pub generated_at: DateTime<Utc>,
    pub server: String,
    pub database: String,
    pub mode: RunMode,
    pub tables: Vec<TablePlan>,
    pub totals: PlanTotals,
}

impl RunPlan {
    /// Whether running the plan would change any partition.
    pub fn has_changes(&self) -> bool {
        self.totals.removals > 0
            || self.totals.creations > 0
            || self.totals.partition_refreshes > 0
            || self.totals.table_refreshes > 0
    }
}

/// Plan every table of `config` against a connected store.
///
/// Read-only: only lookups are issued.
pub fn build_run_plan<S: PartitionStore + ?Sized>(
    store: &S,
    config: &RunConfiguration,
) -> Result<RunPlan> {
    let mode = RunMode::from_config(config);
    let mut tables = Vec::with_capacity(config.tables.len());
    let mut totals = PlanTotals::default();

    for table_config in &config.tables {
        let table = store.find_table(&table_config.name)?;
        let names = store.list_partition_names(&table)?;
        totals.tables += 1;

        if !table_config.is_partitioned() {
            totals.table_refreshes += 1;
            tables.push(TablePlan {
                table: table_config.name.clone(),
                partition_count: names.len(),
                table_refresh: Some(mode.refresh_mode()),
                configurations: Vec::new(),
            });
            continue;
        }

        if store.find_partition(&table, table.template_name())?.is_none() {
            return Err(StoreError::TemplateNotFound {
                table: table.name().to_string(),
            }
            .into());
        }

        let mut configurations = Vec::with_capacity(table_config.partitioning.len());
        for partitioning in &table_config.partitioning {
            let plan = plan_configuration(&table_config.name, partitioning, &names, &mode)?;
            totals.removals += plan.removals().len();
            totals.creations += plan.creation_count();
            totals.partition_refreshes += plan.processing.len();
            totals.beyond_window += plan.diff.beyond_window.len();
            configurations.push(plan);
        }
        tables.push(TablePlan {
            table: table_config.name.clone(),
            partition_count: names.len(),
            table_refresh: None,
            configurations,
        });
    }

    Ok(RunPlan {
        generated_at: Utc::now(),
        server: config.connection.server.clone(),
        database: config.connection.database.clone(),
        mode,
        tables,
        totals,
    })
}
