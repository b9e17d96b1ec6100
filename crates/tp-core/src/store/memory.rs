//! In-memory partition store.
//!
//! Keeps a committed model and a working copy. Structural changes and queued
//! refreshes touch only the working copy; a successful barrier promotes it to
//! committed, a failed one restores it from committed. Faults can be injected
//! to exercise the processor's error paths.

use serde::Serialize;
use std::collections::BTreeSet;
use tp_common::StoreError;
use tp_config::ConnectionInfo;

use super::snapshot::{ModelSnapshot, PartitionSnapshot};
use super::{
    BarrierReport, PartitionDefinition, PartitionInfo, PartitionState, PartitionStore,
    PendingRefresh, RefreshMode, RefreshTarget, TableRef,
};
use crate::granularity::SourcePredicate;

/// Faults to inject into an [`InMemoryStore`].
#[derive(Debug, Clone, Default)]
pub struct FaultPlan {
    /// Refuse `connect` with this reason.
    pub refuse_connect: Option<String>,
    /// Partition or table names whose refresh fails at the barrier.
    /// `"model"` makes model-wide refreshes fail.
    pub fail_refresh_of: BTreeSet<String>,
    /// Report an error from `disconnect`.
    pub fail_disconnect: bool,
}

impl FaultPlan {
    pub fn refuse_connect(reason: impl Into<String>) -> Self {
        FaultPlan {
            refuse_connect: Some(reason.into()),
            ..Default::default()
        }
    }

    pub fn fail_refresh_of(names: &[&str]) -> Self {
        FaultPlan {
            fail_refresh_of: names.iter().map(|n| n.to_string()).collect(),
            ..Default::default()
        }
    }

    pub fn with_failing_disconnect(mut self) -> Self {
        self.fail_disconnect = true;
        self
    }

    fn fails(&self, target: &RefreshTarget) -> bool {
        match target {
            RefreshTarget::Model => self.fail_refresh_of.contains("model"),
            RefreshTarget::Table { table } => self.fail_refresh_of.contains(table),
            RefreshTarget::Partition { partition, .. } => {
                self.fail_refresh_of.contains(partition)
            }
        }
    }
}

/// Counters over the lifetime of a store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StoreStats {
    pub connects: usize,
    pub barriers: usize,
    pub rollbacks: usize,
    pub refreshes_enqueued: usize,
    pub refreshes_executed: usize,
    pub refresh_waves: usize,
    pub partitions_added: usize,
    pub partitions_removed: usize,
    pub sources_updated: usize,
}

/// Reference [`PartitionStore`] backed by a [`ModelSnapshot`].
#[derive(Debug, Clone)]
pub struct InMemoryStore {
    committed: ModelSnapshot,
    working: ModelSnapshot,
    queue: Vec<PendingRefresh>,
    staged_changes: usize,
    executed: Vec<PendingRefresh>,
    connected: bool,
    max_parallelism: Option<u32>,
    next_sequence: u64,
    faults: FaultPlan,
    stats: StoreStats,
}

impl InMemoryStore {
    pub fn new(model: ModelSnapshot) -> Self {
        InMemoryStore {
            working: model.clone(),
            committed: model,
            queue: Vec::new(),
            staged_changes: 0,
            executed: Vec::new(),
            connected: false,
            max_parallelism: None,
            next_sequence: 0,
            faults: FaultPlan::default(),
            stats: StoreStats::default(),
        }
    }

    pub fn with_faults(mut self, faults: FaultPlan) -> Self {
        self.faults = faults;
        self
    }

    /// Model state as of the last successful barrier.
    pub fn committed(&self) -> &ModelSnapshot {
        &self.committed
    }

    /// Model state including staged changes.
    pub fn working(&self) -> &ModelSnapshot {
        &self.working
    }

    pub fn into_committed(self) -> ModelSnapshot {
        self.committed
    }

    pub fn stats(&self) -> StoreStats {
        self.stats
    }

    /// Refreshes executed by successful barriers, in execution order.
    pub fn executed_refreshes(&self) -> &[PendingRefresh] {
        &self.executed
    }

    pub fn pending_refreshes(&self) -> &[PendingRefresh] {
        &self.queue
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// Concurrency cap taken from the last `connect`.
    pub fn max_parallelism(&self) -> Option<u32> {
        self.max_parallelism
    }

    fn ensure_connected(&self) -> Result<(), StoreError> {
        if self.connected {
            Ok(())
        } else {
            Err(StoreError::NotConnected)
        }
    }

    fn discard_staged(&mut self) {
        self.working = self.committed.clone();
        self.queue.clear();
        self.staged_changes = 0;
    }

    fn table_snapshot(&self, table: &str) -> Result<&super::TableSnapshot, StoreError> {
        self.working
            .table(table)
            .ok_or_else(|| StoreError::TableNotFound {
                table: table.to_string(),
            })
    }

    fn partition_mut(
        &mut self,
        table: &str,
        partition: &str,
    ) -> Result<&mut PartitionSnapshot, StoreError> {
        let snapshot = self
            .working
            .table_mut(table)
            .ok_or_else(|| StoreError::TableNotFound {
                table: table.to_string(),
            })?;
        snapshot
            .partition_mut(partition)
            .ok_or_else(|| StoreError::PartitionNotFound {
                table: table.to_string(),
                partition: partition.to_string(),
            })
    }

    fn apply_refresh(&mut self, refresh: &PendingRefresh) -> Result<(), StoreError> {
        let missing = |reason: &str| StoreError::RefreshFailed {
            target: refresh.target.to_string(),
            reason: reason.to_string(),
        };
        match &refresh.target {
            RefreshTarget::Model => {
                for table in &mut self.working.tables {
                    for partition in &mut table.partitions {
                        partition.state = next_state(partition.state, refresh.mode);
                    }
                }
            }
            RefreshTarget::Table { table } => {
                let snapshot = self
                    .working
                    .table_mut(table)
                    .ok_or_else(|| missing("table no longer exists"))?;
                for partition in &mut snapshot.partitions {
                    partition.state = next_state(partition.state, refresh.mode);
                }
            }
            RefreshTarget::Partition { table, partition } => {
                let snapshot = self
                    .partition_mut(table, partition)
                    .map_err(|_| missing("partition no longer exists"))?;
                snapshot.state = next_state(snapshot.state, refresh.mode);
            }
        }
        Ok(())
    }
}

fn next_state(current: PartitionState, mode: RefreshMode) -> PartitionState {
    match mode {
        RefreshMode::Full => PartitionState::Ready,
        RefreshMode::DataOnly => PartitionState::CalculationNeeded,
        RefreshMode::Calculate => match current {
            PartitionState::CalculationNeeded => PartitionState::Ready,
            other => other,
        },
    }
}

impl PartitionStore for InMemoryStore {
    fn connect(&mut self, info: &ConnectionInfo) -> Result<(), StoreError> {
        if let Some(reason) = &self.faults.refuse_connect {
            return Err(StoreError::ServerUnavailable {
                server: info.server.clone(),
                reason: reason.clone(),
            });
        }
        if !info.server.eq_ignore_ascii_case(&self.committed.server) {
            return Err(StoreError::ServerUnavailable {
                server: info.server.clone(),
                reason: "no such server".to_string(),
            });
        }
        if !info.database.eq_ignore_ascii_case(&self.committed.database) {
            return Err(StoreError::DatabaseNotFound {
                database: info.database.clone(),
            });
        }
        self.discard_staged();
        self.connected = true;
        self.max_parallelism = info.max_parallelism;
        self.stats.connects += 1;
        Ok(())
    }

    fn find_table(&self, name: &str) -> Result<TableRef, StoreError> {
        self.ensure_connected()?;
        self.table_snapshot(name).map(|t| TableRef::new(&t.name))
    }

    fn find_partition(
        &self,
        table: &TableRef,
        name: &str,
    ) -> Result<Option<PartitionInfo>, StoreError> {
        self.ensure_connected()?;
        let snapshot = self.table_snapshot(table.name())?;
        Ok(snapshot.partition(name).map(|p| PartitionInfo {
            name: p.name.clone(),
            state: p.state,
            source: p.source.clone(),
        }))
    }

    fn list_partition_names(&self, table: &TableRef) -> Result<Vec<String>, StoreError> {
        self.ensure_connected()?;
        Ok(self.table_snapshot(table.name())?.partition_names())
    }

    fn copy_partition_definition(
        &self,
        table: &TableRef,
        source_partition: &str,
        new_name: &str,
    ) -> Result<PartitionDefinition, StoreError> {
        self.ensure_connected()?;
        let snapshot = self.table_snapshot(table.name())?;
        let source = snapshot.partition(source_partition).ok_or_else(|| {
            if source_partition == table.template_name() {
                StoreError::TemplateNotFound {
                    table: table.name().to_string(),
                }
            } else {
                StoreError::PartitionNotFound {
                    table: table.name().to_string(),
                    partition: source_partition.to_string(),
                }
            }
        })?;
        Ok(PartitionDefinition {
            name: new_name.to_string(),
            source: source.source.clone(),
        })
    }

    fn add_partition(
        &mut self,
        table: &TableRef,
        definition: PartitionDefinition,
    ) -> Result<(), StoreError> {
        self.ensure_connected()?;
        let snapshot =
            self.working
                .table_mut(table.name())
                .ok_or_else(|| StoreError::TableNotFound {
                    table: table.name().to_string(),
                })?;
        if snapshot.partition(&definition.name).is_some() {
            return Err(StoreError::DuplicatePartition {
                table: table.name().to_string(),
                partition: definition.name,
            });
        }
        snapshot.partitions.push(PartitionSnapshot {
            name: definition.name,
            state: PartitionState::NoData,
            source: definition.source,
        });
        self.staged_changes += 1;
        self.stats.partitions_added += 1;
        Ok(())
    }

    fn remove_partition(&mut self, table: &TableRef, name: &str) -> Result<(), StoreError> {
        self.ensure_connected()?;
        let snapshot =
            self.working
                .table_mut(table.name())
                .ok_or_else(|| StoreError::TableNotFound {
                    table: table.name().to_string(),
                })?;
        let before = snapshot.partitions.len();
        snapshot.partitions.retain(|p| p.name != name);
        if snapshot.partitions.len() == before {
            return Err(StoreError::PartitionNotFound {
                table: table.name().to_string(),
                partition: name.to_string(),
            });
        }
        self.staged_changes += 1;
        self.stats.partitions_removed += 1;
        Ok(())
    }

    fn set_partition_source(
        &mut self,
        table: &TableRef,
        name: &str,
        predicate: &SourcePredicate,
    ) -> Result<(), StoreError> {
        self.ensure_connected()?;
        let partition = self.partition_mut(table.name(), name)?;
        partition.source = Some(predicate.clone());
        self.staged_changes += 1;
        self.stats.sources_updated += 1;
        Ok(())
    }

    fn enqueue_refresh(
        &mut self,
        target: RefreshTarget,
        mode: RefreshMode,
    ) -> Result<PendingRefresh, StoreError> {
        self.ensure_connected()?;
        match &target {
            RefreshTarget::Model => {}
            RefreshTarget::Table { table } => {
                self.table_snapshot(table)?;
            }
            RefreshTarget::Partition { table, partition } => {
                if self.table_snapshot(table)?.partition(partition).is_none() {
                    return Err(StoreError::PartitionNotFound {
                        table: table.clone(),
                        partition: partition.clone(),
                    });
                }
            }
        }
        let pending = PendingRefresh {
            sequence: self.next_sequence,
            target,
            mode,
        };
        self.next_sequence += 1;
        self.queue.push(pending.clone());
        self.stats.refreshes_enqueued += 1;
        Ok(pending)
    }

    fn barrier(&mut self) -> Result<BarrierReport, StoreError> {
        self.ensure_connected()?;
        self.stats.barriers += 1;
        let queue = std::mem::take(&mut self.queue);
        let pending = queue.len();
        let wave_size = match self.max_parallelism {
            Some(cap) => usize::try_from(cap).unwrap_or(usize::MAX).max(1),
            None => pending.max(1),
        };

        let mut waves = 0;
        for wave in queue.chunks(wave_size) {
            waves += 1;
            for refresh in wave {
                let outcome = if self.faults.fails(&refresh.target) {
                    Err(StoreError::RefreshFailed {
                        target: refresh.target.to_string(),
                        reason: "source query failed".to_string(),
                    })
                } else {
                    self.apply_refresh(refresh)
                };
                if let Err(cause) = outcome {
                    self.discard_staged();
                    self.stats.rollbacks += 1;
                    return Err(StoreError::CommitFailed {
                        pending,
                        cause: Box::new(cause),
                    });
                }
            }
        }

        let report = BarrierReport {
            refreshes: pending,
            structural_changes: self.staged_changes,
            waves,
            max_parallelism: self.max_parallelism,
        };
        self.stats.refreshes_executed += pending;
        self.stats.refresh_waves += waves;
        self.executed.extend(queue);
        self.committed = self.working.clone();
        self.staged_changes = 0;
        Ok(report)
    }

    fn disconnect(&mut self) -> Result<(), StoreError> {
        let was_connected = self.connected;
        self.connected = false;
        self.discard_staged();
        if self.faults.fail_disconnect && was_connected {
            return Err(StoreError::ServerUnavailable {
                server: self.committed.server.clone(),
                reason: "session dropped during disconnect".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::granularity::empty_source_predicate;

    fn info() -> ConnectionInfo {
        ConnectionInfo {
            server: "srv".to_string(),
            database: "db".to_string(),
            max_parallelism: None,
        }
    }

    fn connected(model: ModelSnapshot) -> InMemoryStore {
        let mut store = InMemoryStore::new(model);
        store.connect(&info()).unwrap();
        store
    }

    fn model() -> ModelSnapshot {
        ModelSnapshot::new("srv", "db").with_partitioned_table("Sales", ["202401"])
    }

    #[test]
    fn test_connect_checks_server_and_database() {
        let mut store = InMemoryStore::new(model());
        let mut wrong = info();
        wrong.database = "other".to_string();
        assert!(matches!(
            store.connect(&wrong),
            Err(StoreError::DatabaseNotFound { .. })
        ));
        wrong.server = "elsewhere".to_string();
        assert!(matches!(
            store.connect(&wrong),
            Err(StoreError::ServerUnavailable { .. })
        ));
        assert!(store.connect(&info()).is_ok());
    }

    #[test]
    fn test_calls_before_connect_fail() {
        let store = InMemoryStore::new(model());
        assert_eq!(store.find_table("Sales"), Err(StoreError::NotConnected));
    }

    #[test]
    fn test_refused_connection() {
        let mut store =
            InMemoryStore::new(model()).with_faults(FaultPlan::refuse_connect("timeout"));
        let err = store.connect(&info()).unwrap_err();
        assert!(err.is_connection());
    }

    #[test]
    fn test_staged_changes_visible_before_barrier() {
        let mut store = connected(model());
        let table = store.find_table("Sales").unwrap();
        let def = store
            .copy_partition_definition(&table, "Sales", "202402")
            .unwrap();
        store.add_partition(&table, def).unwrap();

        let added = store.find_partition(&table, "202402").unwrap().unwrap();
        assert_eq!(added.state, PartitionState::NoData);
        assert!(store.committed().table("Sales").unwrap().partition("202402").is_none());

        let report = store.barrier().unwrap();
        assert_eq!(report.structural_changes, 1);
        assert!(store.committed().table("Sales").unwrap().partition("202402").is_some());
    }

    #[test]
    fn test_copy_of_missing_template_reports_template() {
        let store = connected(ModelSnapshot::new("srv", "db").with_bare_table("Sales"));
        let table = store.find_table("Sales").unwrap();
        assert_eq!(
            store.copy_partition_definition(&table, "Sales", "2024"),
            Err(StoreError::TemplateNotFound {
                table: "Sales".to_string()
            })
        );
    }

    #[test]
    fn test_duplicate_and_missing_partitions() {
        let mut store = connected(model());
        let table = store.find_table("Sales").unwrap();
        let def = store
            .copy_partition_definition(&table, "Sales", "202401")
            .unwrap();
        assert!(matches!(
            store.add_partition(&table, def),
            Err(StoreError::DuplicatePartition { .. })
        ));
        assert!(matches!(
            store.remove_partition(&table, "209901"),
            Err(StoreError::PartitionNotFound { .. })
        ));
        assert!(matches!(
            store.enqueue_refresh(RefreshTarget::partition(&table, "209901"), RefreshMode::Full),
            Err(StoreError::PartitionNotFound { .. })
        ));
    }

    #[test]
    fn test_barrier_applies_refresh_semantics_in_order() {
        let mut store = connected(model());
        let table = store.find_table("Sales").unwrap();
        store
            .enqueue_refresh(RefreshTarget::partition(&table, "202401"), RefreshMode::DataOnly)
            .unwrap();
        store.barrier().unwrap();
        let state = |s: &InMemoryStore| {
            s.committed()
                .table("Sales")
                .unwrap()
                .partition("202401")
                .unwrap()
                .state
        };
        assert_eq!(state(&store), PartitionState::CalculationNeeded);

        store
            .enqueue_refresh(RefreshTarget::Model, RefreshMode::Calculate)
            .unwrap();
        store.barrier().unwrap();
        assert_eq!(state(&store), PartitionState::Ready);

        let sequences: Vec<u64> = store.executed_refreshes().iter().map(|r| r.sequence).collect();
        assert_eq!(sequences, vec![0, 1]);
        assert_eq!(store.stats().barriers, 2);
    }

    fn queue_months(store: &mut InMemoryStore, names: &[&str]) {
        let table = store.find_table("Sales").unwrap();
        for name in names {
            store
                .enqueue_refresh(RefreshTarget::partition(&table, *name), RefreshMode::Full)
                .unwrap();
        }
    }

    #[test]
    fn test_barrier_runs_refreshes_in_waves_of_max_parallelism() {
        let months = ["202401", "202402", "202403", "202404", "202405"];
        let mut store = InMemoryStore::new(
            ModelSnapshot::new("srv", "db").with_partitioned_table("Sales", months),
        );
        store
            .connect(&ConnectionInfo {
                max_parallelism: Some(2),
                ..info()
            })
            .unwrap();
        assert_eq!(store.max_parallelism(), Some(2));

        queue_months(&mut store, &months);
        let report = store.barrier().unwrap();
        assert_eq!(report.refreshes, 5);
        assert_eq!(report.waves, 3);
        assert_eq!(report.max_parallelism, Some(2));
        assert_eq!(store.executed_refreshes().len(), 5);

        let empty = store.barrier().unwrap();
        assert_eq!(empty.waves, 0);
        assert_eq!(store.stats().refresh_waves, 3);
    }

    #[test]
    fn test_unbounded_barrier_is_a_single_wave() {
        let mut store = connected(
            ModelSnapshot::new("srv", "db").with_partitioned_table("Sales", ["202401", "202402"]),
        );
        queue_months(&mut store, &["202401", "202402"]);
        let report = store.barrier().unwrap();
        assert_eq!(report.waves, 1);
        assert_eq!(report.max_parallelism, None);
        assert!(!serde_json::to_string(&report).unwrap().contains("max_parallelism"));
    }

    #[test]
    fn test_calculate_leaves_unloaded_partitions_alone() {
        assert_eq!(
            next_state(PartitionState::NoData, RefreshMode::Calculate),
            PartitionState::NoData
        );
        assert_eq!(
            next_state(PartitionState::Ready, RefreshMode::DataOnly),
            PartitionState::CalculationNeeded
        );
    }

    #[test]
    fn test_failed_barrier_rolls_back_everything_staged() {
        let mut store = connected(model()).with_faults(FaultPlan::fail_refresh_of(&["202402"]));
        let table = store.find_table("Sales").unwrap();
        store.remove_partition(&table, "202401").unwrap();
        let def = store
            .copy_partition_definition(&table, "Sales", "202402")
            .unwrap();
        store.add_partition(&table, def).unwrap();
        store
            .enqueue_refresh(RefreshTarget::partition(&table, "202402"), RefreshMode::Full)
            .unwrap();

        let err = store.barrier().unwrap_err();
        match err {
            StoreError::CommitFailed { pending, cause } => {
                assert_eq!(pending, 1);
                assert!(matches!(*cause, StoreError::RefreshFailed { .. }));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(store.working(), store.committed());
        assert!(store.pending_refreshes().is_empty());
        assert_eq!(store.stats().rollbacks, 1);
        assert_eq!(
            store.committed().table("Sales").unwrap().partition_names(),
            vec!["Sales", "202401"]
        );
    }

    #[test]
    fn test_disconnect_discards_uncommitted_work() {
        let mut store = connected(model());
        let table = store.find_table("Sales").unwrap();
        store
            .set_partition_source(&table, "Sales", &empty_source_predicate("dbo.Sales"))
            .unwrap();
        store.disconnect().unwrap();
        assert!(!store.is_connected());
        assert!(store
            .committed()
            .table("Sales")
            .unwrap()
            .partition("Sales")
            .unwrap()
            .source
            .is_none());
    }

    #[test]
    fn test_failing_disconnect() {
        let mut store =
            connected(model()).with_faults(FaultPlan::default().with_failing_disconnect());
        assert!(store.disconnect().is_err());
        assert!(!store.is_connected());
    }
}
