//! Partition store abstraction.
//!
//! A store is the analytical engine that owns the tables and partitions. The
//! processor talks to it through [`PartitionStore`] only, so the rolling
//! window logic runs the same against a live server or [`InMemoryStore`].
//!
//! # Staging and barriers
//!
//! Structural changes (add, remove, source updates) and queued refreshes are
//! staged inside the session. [`PartitionStore::barrier`] executes the queue
//! in submission order and makes everything staged durable. If any queued
//! refresh fails, the whole batch is rolled back and the barrier reports
//! [`StoreError::CommitFailed`].

pub mod memory;
pub mod snapshot;

pub use memory::{FaultPlan, InMemoryStore, StoreStats};
pub use snapshot::{ModelSnapshot, PartitionSnapshot, TableSnapshot};

use serde::{Deserialize, Serialize};
use std::fmt;
use tp_common::StoreError;
use tp_config::ConnectionInfo;

use crate::granularity::SourcePredicate;

/// Handle to a table obtained from [`PartitionStore::find_table`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TableRef {
    name: String,
}

impl TableRef {
    pub fn new(name: impl Into<String>) -> Self {
        TableRef { name: name.into() }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Name of the table's template partition.
    pub fn template_name(&self) -> &str {
        &self.name
    }
}

/// Processing state of a partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PartitionState {
    /// Never loaded.
    NoData,
    /// Data loaded, dependent structures not yet recalculated.
    CalculationNeeded,
    /// Fully processed.
    Ready,
}

impl PartitionState {
    pub fn is_ready(self) -> bool {
        self == PartitionState::Ready
    }
}

impl fmt::Display for PartitionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PartitionState::NoData => write!(f, "no_data"),
            PartitionState::CalculationNeeded => write!(f, "calculation_needed"),
            PartitionState::Ready => write!(f, "ready"),
        }
    }
}

/// A partition as seen by the processor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionInfo {
    pub name: String,
    pub state: PartitionState,
    pub source: Option<SourcePredicate>,
}

/// Definition of a partition that is not yet part of a table.
///
/// Produced by copying an existing partition; everything except the name and
/// source is inherited from the copy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionDefinition {
    pub name: String,
    pub source: Option<SourcePredicate>,
}

impl PartitionDefinition {
    pub fn with_source(mut self, source: SourcePredicate) -> Self {
        self.source = Some(source);
        self
    }
}

/// Refresh semantics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefreshMode {
    /// Load data and recalculate dependent structures.
    Full,
    /// Load data only; the target is left needing calculation.
    DataOnly,
    /// Recalculate dependent structures without loading data.
    Calculate,
}

impl fmt::Display for RefreshMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RefreshMode::Full => write!(f, "Full"),
            RefreshMode::DataOnly => write!(f, "DataOnly"),
            RefreshMode::Calculate => write!(f, "Calculate"),
        }
    }
}

/// What a refresh applies to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RefreshTarget {
    Model,
    Table { table: String },
    Partition { table: String, partition: String },
}

impl RefreshTarget {
    pub fn table(table: &TableRef) -> Self {
        RefreshTarget::Table {
            table: table.name().to_string(),
        }
    }

    pub fn partition(table: &TableRef, partition: impl Into<String>) -> Self {
        RefreshTarget::Partition {
            table: table.name().to_string(),
            partition: partition.into(),
        }
    }
}

impl fmt::Display for RefreshTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RefreshTarget::Model => write!(f, "model"),
            RefreshTarget::Table { table } => write!(f, "table {}", table),
            RefreshTarget::Partition { table, partition } => {
                write!(f, "partition {}/{}", table, partition)
            }
        }
    }
}

/// A queued refresh awaiting the next barrier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PendingRefresh {
    /// Submission order within the session.
    pub sequence: u64,
    pub target: RefreshTarget,
    pub mode: RefreshMode,
}

/// Result of a successful barrier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct BarrierReport {
    /// Queued refreshes executed by this barrier.
    pub refreshes: usize,
    /// Structural changes made durable by this barrier.
    pub structural_changes: usize,
    /// Rounds the refreshes ran in; each round holds at most
    /// `max_parallelism` refreshes.
    pub waves: usize,
    /// Concurrency cap of the session, `None` when unbounded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_parallelism: Option<u32>,
}

/// Session against an analytical engine holding partitioned tables.
///
/// Lookups see staged state: a partition added in this session is visible to
/// `find_partition` before the next barrier.
pub trait PartitionStore {
    /// Open a session. Must precede every other call.
    fn connect(&mut self, info: &ConnectionInfo) -> Result<(), StoreError>;

    fn find_table(&self, name: &str) -> Result<TableRef, StoreError>;

    fn find_partition(
        &self,
        table: &TableRef,
        name: &str,
    ) -> Result<Option<PartitionInfo>, StoreError>;

    /// Names of every partition of `table`, template included.
    fn list_partition_names(&self, table: &TableRef) -> Result<Vec<String>, StoreError>;

    /// Copy an existing partition's definition under a new name.
    ///
    /// The copy is detached: it is not part of the table until
    /// [`add_partition`](Self::add_partition).
    fn copy_partition_definition(
        &self,
        table: &TableRef,
        source_partition: &str,
        new_name: &str,
    ) -> Result<PartitionDefinition, StoreError>;

    fn add_partition(
        &mut self,
        table: &TableRef,
        definition: PartitionDefinition,
    ) -> Result<(), StoreError>;

    fn remove_partition(&mut self, table: &TableRef, name: &str) -> Result<(), StoreError>;

    fn set_partition_source(
        &mut self,
        table: &TableRef,
        name: &str,
        predicate: &SourcePredicate,
    ) -> Result<(), StoreError>;

    /// Queue a refresh for the next barrier.
    fn enqueue_refresh(
        &mut self,
        target: RefreshTarget,
        mode: RefreshMode,
    ) -> Result<PendingRefresh, StoreError>;

    /// Execute the queue and make staged changes durable.
    ///
    /// Refreshes run in queue order, no more than the session's
    /// `max_parallelism` at a time. A failure anywhere rolls back the whole
    /// barrier.
    fn barrier(&mut self) -> Result<BarrierReport, StoreError>;

    /// Close the session. Staged changes not yet committed are discarded.
    fn disconnect(&mut self) -> Result<(), StoreError>;
}
