//! Run summaries.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::plan::RunMode;
use crate::store::RefreshMode;

/// What happened to one table during a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableOutcome {
    pub table: String,
    pub partitioned: bool,
    pub initial_partition_count: usize,
    /// Absent when the run stopped before the table finished.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub final_partition_count: Option<usize>,
    /// Whole-table refresh queued for tables without partitioning.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub table_refresh: Option<RefreshMode>,
    pub removed: Vec<String>,
    pub created: Vec<String>,
    pub refreshed: Vec<String>,
    /// Partitions left alone because they were already processed.
    pub skipped: Vec<String>,
    pub template_sanitized: bool,
}

impl TableOutcome {
    pub fn new(table: impl Into<String>, partitioned: bool, initial_partition_count: usize) -> Self {
        TableOutcome {
            table: table.into(),
            partitioned,
            initial_partition_count,
            final_partition_count: None,
            table_refresh: None,
            removed: Vec::new(),
            created: Vec::new(),
            refreshed: Vec::new(),
            skipped: Vec::new(),
            template_sanitized: false,
        }
    }
}

/// Counters and per-table outcomes of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub run_id: String,
    pub server: String,
    pub database: String,
    pub mode: RunMode,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    pub duration_ms: u64,
    pub tables: Vec<TableOutcome>,
    pub partitions_removed: usize,
    pub partitions_created: usize,
    /// Partition and table refreshes queued (model recalculation excluded).
    pub refreshes_queued: usize,
    pub partitions_skipped: usize,
    pub templates_sanitized: usize,
    /// Barriers issued, synchronous ones included.
    pub commits: usize,
    /// Barriers issued right after a single partition during initial setup.
    pub synchronous_commits: usize,
    /// Refresh rounds across all barriers, bounded by `max_parallelism`.
    pub refresh_waves: usize,
    pub recalculated: bool,
    pub completed: bool,
}

impl RunSummary {
    pub fn new(run_id: impl Into<String>, server: &str, database: &str, mode: RunMode) -> Self {
        RunSummary {
            run_id: run_id.into(),
            server: server.to_string(),
            database: database.to_string(),
            mode,
            started_at: Utc::now(),
            finished_at: None,
            duration_ms: 0,
            tables: Vec::new(),
            partitions_removed: 0,
            partitions_created: 0,
            refreshes_queued: 0,
            partitions_skipped: 0,
            templates_sanitized: 0,
            commits: 0,
            synchronous_commits: 0,
            refresh_waves: 0,
            recalculated: false,
            completed: false,
        }
    }

    /// Whether the run changed anything in the model.
    pub fn has_changes(&self) -> bool {
        self.partitions_removed > 0 || self.partitions_created > 0 || self.refreshes_queued > 0
    }

    /// One-line human summary.
    pub fn headline(&self) -> String {
        format!(
            "{} table(s): {} removed, {} created, {} refreshed, {} skipped, {} commit(s){}",
            self.tables.len(),
            self.partitions_removed,
            self.partitions_created,
            self.refreshes_queued,
            self.partitions_skipped,
            self.commits,
            if self.recalculated {
                ", model recalculated"
            } else {
                ""
            }
        )
    }
}
