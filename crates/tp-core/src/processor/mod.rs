//! Partition processing orchestrator.
//!
//! Drives one run over a [`PartitionStore`]:
//!
//! 1. Connect.
//! 2. For each configured table, in order:
//!    - without partitioning: queue a whole-table refresh;
//!    - with partitioning: for each configuration, remove partitions older
//!      than the rolling window, then create or refresh the newest keys;
//!    - during initial setup, reset the template to an empty source query;
//!    - commit, unless tables are processed in parallel.
//! 3. Commit once if tables are processed in parallel.
//! 4. Recalculate the model if this was an initial setup or an offline
//!    incremental run.
//!
//! During initial setup every partition that is not already processed is
//! loaded DataOnly and committed on its own, which bounds the engine's peak
//! memory to one partition's load. DataOnly leaves partitions needing
//! calculation until the final recalculation, so a backfill interrupted
//! before that point reprocesses every partition when rerun.
//!
//! All output goes through a [`LogSink`]; all run state travels in an
//! explicit [`RunContext`].

pub mod summary;

pub use summary::{RunSummary, TableOutcome};

use std::time::Instant;

use chrono::Utc;
use tp_common::{cause_chain, Error, Result, RunId, StoreError, StructuredError};
use tp_config::{PartitioningConfiguration, RunConfiguration, TableConfiguration};

use crate::events::LogSink;
use crate::granularity::{build_source_predicate, empty_source_predicate, format_for_display};
use crate::logging::{event_names, LogContext, LogEvent, Stage};
use crate::plan::{plan_configuration, PlannedPartition, RunMode};
use crate::store::{PartitionStore, RefreshMode, RefreshTarget, TableRef};

/// Everything a run needs besides the store and the sink.
#[derive(Debug, Clone)]
pub struct RunContext {
    pub run_id: RunId,
    pub config: RunConfiguration,
    pub log: LogContext,
}

impl RunContext {
    pub fn new(config: RunConfiguration, host_id: impl Into<String>) -> Self {
        let run_id = RunId::new();
        let log = LogContext::new(run_id.as_str(), host_id)
            .with_model(&config.connection.server, &config.connection.database);
        RunContext {
            run_id,
            config,
            log,
        }
    }
}

/// Why a barrier was issued.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CommitScope {
    /// A single partition during initial setup.
    Partition,
    Table,
    /// All tables at once in parallel mode.
    Run,
    Recalculation,
}

/// Executes one run against a store.
pub struct PartitionProcessor<'a, S: PartitionStore + ?Sized> {
    store: &'a mut S,
    ctx: &'a RunContext,
    sink: &'a dyn LogSink,
    mode: RunMode,
    summary: RunSummary,
}

impl<'a, S: PartitionStore + ?Sized> PartitionProcessor<'a, S> {
    pub fn new(store: &'a mut S, ctx: &'a RunContext, sink: &'a dyn LogSink) -> Self {
        let mode = RunMode::from_config(&ctx.config);
        let summary = RunSummary::new(
            ctx.run_id.as_str(),
            &ctx.config.connection.server,
            &ctx.config.connection.database,
            mode,
        );
        PartitionProcessor {
            store,
            ctx,
            sink,
            mode,
            summary,
        }
    }

    pub fn summary(&self) -> &RunSummary {
        &self.summary
    }

    pub fn into_summary(self) -> RunSummary {
        self.summary
    }

    /// Run every step up to, not including, disconnecting.
    pub fn run(&mut self) -> Result<()> {
        let ctx = self.ctx;
        let connection = &ctx.config.connection;

        self.emit(
            ctx.log
                .at(Stage::Init)
                .info(
                    event_names::RUN_STARTED,
                    format!(
                        "Processing {} table(s) on {}/{}",
                        ctx.config.tables.len(),
                        connection.server,
                        connection.database
                    ),
                )
                .field("mode", self.mode),
        );

        self.store.connect(connection)?;
        self.emit(
            ctx.log
                .at(Stage::Connect)
                .debug(
                    event_names::STORE_CONNECTED,
                    format!("Connected to {}", connection.server),
                )
                .field("max_parallelism", connection.max_parallelism),
        );

        for table in &ctx.config.tables {
            self.process_table(table)?;
        }

        if self.mode.parallel_tables {
            self.commit(CommitScope::Run)?;
        }

        if self.mode.needs_recalculation() {
            self.recalculate()?;
        }

        self.summary.completed = true;
        self.emit(
            ctx.log
                .at(Stage::Commit)
                .info(event_names::RUN_FINISHED, "Processing finished")
                .field("headline", self.summary.headline()),
        );
        Ok(())
    }

    fn process_table(&mut self, table_config: &TableConfiguration) -> Result<()> {
        let ctx = self.ctx;
        let table = self.store.find_table(&table_config.name)?;
        let initial_count = self.store.list_partition_names(&table)?.len();
        let plan_log = ctx.log.at(Stage::Plan);

        self.emit(
            plan_log
                .info(event_names::TABLE_STARTED, format!("Table: {}", table.name()))
                .field("table", table.name()),
        );
        self.emit(
            plan_log
                .info(
                    event_names::TABLE_PARTITION_COUNT,
                    format!("Partition count before processing: {}", initial_count),
                )
                .indented()
                .field("count", initial_count),
        );
        self.summary.tables.push(TableOutcome::new(
            table.name(),
            table_config.is_partitioned(),
            initial_count,
        ));

        match table_config.partitioning.first() {
            None => {
                let mode = self.mode.refresh_mode();
                self.store
                    .enqueue_refresh(RefreshTarget::table(&table), mode)?;
                self.summary.refreshes_queued += 1;
                self.record(|t| t.table_refresh = Some(mode));
                self.emit(
                    ctx.log
                        .at(Stage::Refresh)
                        .info(
                            event_names::PARTITION_REFRESH_QUEUED,
                            format!("Queued {} refresh of the whole table", mode),
                        )
                        .indented()
                        .field("table", table.name())
                        .field("refresh", mode),
                );
            }
            Some(first) => {
                if self
                    .store
                    .find_partition(&table, table.template_name())?
                    .is_none()
                {
                    return Err(StoreError::TemplateNotFound {
                        table: table.name().to_string(),
                    }
                    .into());
                }
                for partitioning in &table_config.partitioning {
                    self.process_configuration(&table, partitioning)?;
                }
                if self.mode.initial_setup {
                    self.sanitize_template(&table, first)?;
                }
            }
        }

        if !self.mode.parallel_tables {
            self.commit(CommitScope::Table)?;
        }

        let final_count = self.store.list_partition_names(&table)?.len();
        self.record(|t| t.final_partition_count = Some(final_count));
        self.emit(
            ctx.log
                .at(Stage::Commit)
                .info(
                    event_names::TABLE_FINISHED,
                    format!("Partition count after processing: {}", final_count),
                )
                .indented()
                .field("table", table.name())
                .field("count", final_count),
        );
        Ok(())
    }

    fn process_configuration(
        &mut self,
        table: &TableRef,
        partitioning: &PartitioningConfiguration,
    ) -> Result<()> {
        let ctx = self.ctx;
        let names = self.store.list_partition_names(table)?;
        let plan = plan_configuration(table.name(), partitioning, &names, &self.mode)?;
        let granularity = plan.granularity;
        let plan_log = ctx.log.at(Stage::Plan);

        self.emit(
            plan_log
                .info(
                    event_names::WINDOW_PLANNED,
                    format!(
                        "Rolling window ({}): {} ({} partitions)",
                        granularity,
                        plan.window_range()?.unwrap_or_else(|| "empty".to_string()),
                        plan.target.len()
                    ),
                )
                .indented()
                .field("table", table.name())
                .field("granularity", granularity)
                .field("removals", plan.removals().len())
                .field("creations", plan.creation_count()),
        );

        if !plan.diff.beyond_window.is_empty() {
            let newer: Vec<String> = plan
                .diff
                .beyond_window
                .iter()
                .map(|k| k.canonical())
                .collect();
            self.emit(
                plan_log
                    .warn(
                        event_names::WINDOW_BEYOND,
                        format!(
                            "Keeping {} partition(s) newer than the window: {}",
                            newer.len(),
                            newer.join(", ")
                        ),
                    )
                    .indented()
                    .field("table", table.name())
                    .field("partitions", &newer),
            );
        }

        for key in plan.removals() {
            let name = key.canonical();
            self.store.remove_partition(table, &name)?;
            self.summary.partitions_removed += 1;
            self.record(|t| t.removed.push(name.clone()));
            self.emit(
                ctx.log
                    .at(Stage::Remove)
                    .info(
                        event_names::PARTITION_REMOVED,
                        format!("Removed partition {}", format_for_display(&name, granularity)?),
                    )
                    .indented()
                    .field("table", table.name())
                    .field("partition", &name),
            );
        }

        if let Some(range) = plan.processing_range()? {
            self.emit(
                plan_log
                    .info(event_names::WINDOW_PLANNED, format!("Processing range: {}", range))
                    .indented()
                    .field("table", table.name())
                    .field("count", plan.processing.len()),
            );
        }

        for planned in &plan.processing {
            self.process_key(table, partitioning, planned)?;
        }
        Ok(())
    }

    fn process_key(
        &mut self,
        table: &TableRef,
        partitioning: &PartitioningConfiguration,
        planned: &PlannedPartition,
    ) -> Result<()> {
        let ctx = self.ctx;
        let name = planned.key.canonical();
        let display = format_for_display(&name, planned.key.granularity())?;

        if !planned.exists {
            let predicate = build_source_predicate(
                &partitioning.source_table,
                &partitioning.source_column,
                &planned.key,
            );
            let definition = self
                .store
                .copy_partition_definition(table, table.template_name(), &name)?
                .with_source(predicate.clone());
            self.store.add_partition(table, definition)?;
            self.summary.partitions_created += 1;
            self.record(|t| t.created.push(name.clone()));
            self.emit(
                ctx.log
                    .at(Stage::Create)
                    .info(event_names::PARTITION_CREATED, format!("Created partition {}", display))
                    .indented()
                    .field("table", table.name())
                    .field("partition", &name)
                    .field("query", predicate.query_text()),
            );
        }

        if !self.mode.initial_setup {
            let mode = self.mode.refresh_mode();
            return self.queue_partition_refresh(table, &name, &display, mode);
        }

        let info = self
            .store
            .find_partition(table, &name)?
            .ok_or_else(|| StoreError::PartitionNotFound {
                table: table.name().to_string(),
                partition: name.clone(),
            })?;
        if info.state.is_ready() {
            self.summary.partitions_skipped += 1;
            self.record(|t| t.skipped.push(name.clone()));
            self.emit(
                ctx.log
                    .at(Stage::Refresh)
                    .info(
                        event_names::PARTITION_SKIPPED,
                        format!("Partition {} already processed", display),
                    )
                    .indented()
                    .field("table", table.name())
                    .field("partition", &name),
            );
            return Ok(());
        }

        self.queue_partition_refresh(table, &name, &display, RefreshMode::DataOnly)?;
        self.commit(CommitScope::Partition)
    }

    fn queue_partition_refresh(
        &mut self,
        table: &TableRef,
        name: &str,
        display: &str,
        mode: RefreshMode,
    ) -> Result<()> {
        let ctx = self.ctx;
        self.store
            .enqueue_refresh(RefreshTarget::partition(table, name), mode)?;
        self.summary.refreshes_queued += 1;
        self.record(|t| t.refreshed.push(name.to_string()));
        self.emit(
            ctx.log
                .at(Stage::Refresh)
                .info(
                    event_names::PARTITION_REFRESH_QUEUED,
                    format!("Queued {} refresh of partition {}", mode, display),
                )
                .indented()
                .field("table", table.name())
                .field("partition", name)
                .field("refresh", mode),
        );
        Ok(())
    }

    /// Point the template at an always-false query and reload it, leaving it
    /// empty. The first configuration's source table is used.
    fn sanitize_template(
        &mut self,
        table: &TableRef,
        partitioning: &PartitioningConfiguration,
    ) -> Result<()> {
        let ctx = self.ctx;
        let template = table.template_name();
        let predicate = empty_source_predicate(&partitioning.source_table);
        self.store
            .set_partition_source(table, template, &predicate)?;
        self.store.enqueue_refresh(
            RefreshTarget::partition(table, template),
            RefreshMode::DataOnly,
        )?;
        self.summary.templates_sanitized += 1;
        self.record(|t| t.template_sanitized = true);
        self.emit(
            ctx.log
                .at(Stage::Refresh)
                .info(
                    event_names::TEMPLATE_SANITIZED,
                    "Template partition reset to an empty source query",
                )
                .indented()
                .field("table", table.name())
                .field("query", predicate.query_text()),
        );
        Ok(())
    }

    fn recalculate(&mut self) -> Result<()> {
        let ctx = self.ctx;
        self.emit(
            ctx.log
                .at(Stage::Recalculate)
                .info(event_names::RECALC_STARTED, "Recalculating model"),
        );
        self.store
            .enqueue_refresh(RefreshTarget::Model, RefreshMode::Calculate)?;
        self.commit(CommitScope::Recalculation)?;
        self.summary.recalculated = true;
        Ok(())
    }

    fn commit(&mut self, scope: CommitScope) -> Result<()> {
        let ctx = self.ctx;
        let report = self.store.barrier()?;
        self.summary.commits += 1;
        self.summary.refresh_waves += report.waves;
        if scope == CommitScope::Partition {
            self.summary.synchronous_commits += 1;
        }
        let mut event = ctx
            .log
            .at(Stage::Commit)
            .debug(
                event_names::COMMIT_FINISHED,
                format!(
                    "Committed {} refresh(es) in {} wave(s) and {} structural change(s)",
                    report.refreshes, report.waves, report.structural_changes
                ),
            )
            .field("refreshes", report.refreshes)
            .field("waves", report.waves)
            .field("structural_changes", report.structural_changes);
        if matches!(scope, CommitScope::Partition | CommitScope::Table) {
            event = event.indented();
        }
        self.emit(event);
        Ok(())
    }

    fn record(&mut self, update: impl FnOnce(&mut TableOutcome)) {
        if let Some(outcome) = self.summary.tables.last_mut() {
            update(outcome);
        }
    }

    fn emit(&self, event: LogEvent) {
        self.sink.log(&event);
    }

    fn log_failure(&self, err: &Error) {
        let failure_log = self.ctx.log.at(Stage::Commit);
        self.emit(
            failure_log
                .error(event_names::RUN_FAILED, err.to_string())
                .field("code", err.code()),
        );
        for cause in cause_chain(err) {
            self.emit(failure_log.error(event_names::RUN_FAILED, cause).indented());
        }
    }

    /// Close the session; a failure here is logged and otherwise ignored.
    fn disconnect_quietly(&mut self) {
        let disconnect_log = self.ctx.log.at(Stage::Disconnect);
        match self.store.disconnect() {
            Ok(()) => {
                self.emit(disconnect_log.debug(event_names::STORE_DISCONNECTED, "Disconnected"))
            }
            Err(err) => self.emit(disconnect_log.warn(
                event_names::STORE_DISCONNECT_FAILED,
                format!("Disconnect failed: {}", err),
            )),
        }
    }
}

/// Result of [`run_partition_processing`].
#[derive(Debug)]
pub struct RunOutcome {
    pub summary: RunSummary,
    pub error: Option<Error>,
}

impl RunOutcome {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    pub fn structured_error(&self) -> Option<StructuredError> {
        self.error.as_ref().map(StructuredError::from)
    }
}

/// Run partition processing end to end.
///
/// Never panics on store failures: the first error stops the run, is logged
/// with its cause chain, and is returned in the outcome. The store is always
/// disconnected afterwards.
pub fn run_partition_processing<S: PartitionStore + ?Sized>(
    store: &mut S,
    ctx: &RunContext,
    sink: &dyn LogSink,
) -> RunOutcome {
    let started = Instant::now();
    let mut processor = PartitionProcessor::new(store, ctx, sink);
    let result = processor.run();
    if let Err(err) = &result {
        processor.log_failure(err);
    }
    processor.disconnect_quietly();

    let mut summary = processor.into_summary();
    summary.finished_at = Some(Utc::now());
    summary.duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
    RunOutcome {
        summary,
        error: result.err(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::MemorySink;
    use crate::store::{FaultPlan, InMemoryStore, ModelSnapshot, PartitionState};
    use crate::test_utils::{
        model, partitioned_table, partitioning, run_config, run_context, whole_table,
    };
    use tp_common::Granularity;

    fn partition_names(store: &InMemoryStore, table: &str) -> Vec<String> {
        store.committed().table(table).unwrap().partition_names()
    }

    fn monthly_sales() -> (InMemoryStore, RunContext) {
        let store = InMemoryStore::new(
            model().with_partitioned_table("Sales", ["202311", "202312", "202401", "202402"]),
        );
        let config = run_config(vec![partitioned_table(
            "Sales",
            partitioning(Granularity::Monthly, "2024-03-15", 3, 1),
        )]);
        (store, run_context(config))
    }

    #[test]
    fn test_incremental_online_rolls_window() {
        let (mut store, ctx) = monthly_sales();
        let sink = MemorySink::new();
        let outcome = run_partition_processing(&mut store, &ctx, &sink);

        assert!(outcome.is_success(), "{:?}", outcome.error);
        assert_eq!(
            partition_names(&store, "Sales"),
            vec!["Sales", "202401", "202402", "202403"]
        );
        let created = store
            .committed()
            .table("Sales")
            .unwrap()
            .partition("202403")
            .unwrap()
            .clone();
        assert_eq!(created.state, PartitionState::Ready);
        assert_eq!(
            created.source.unwrap().filter,
            "FLOOR(OrderDateKey / 100) = 202403"
        );

        let summary = &outcome.summary;
        assert_eq!(summary.partitions_removed, 2);
        assert_eq!(summary.partitions_created, 1);
        assert_eq!(summary.refreshes_queued, 1);
        assert_eq!(summary.commits, 1);
        assert!(!summary.recalculated);
        assert!(summary.completed);
        assert_eq!(summary.tables[0].initial_partition_count, 5);
        assert_eq!(summary.tables[0].final_partition_count, Some(4));
        assert!(!store.is_connected());
    }

    #[test]
    fn test_log_lines_include_range_and_counts() {
        let (mut store, ctx) = monthly_sales();
        let sink = MemorySink::new();
        run_partition_processing(&mut store, &ctx, &sink);

        let lines = sink.lines();
        assert!(lines.contains(&"Table: Sales".to_string()));
        assert!(lines.contains(&"  Partition count before processing: 5".to_string()));
        assert!(lines.contains(&"  Rolling window (monthly): 2024-01 to 2024-03 (3 partitions)".to_string()));
        assert!(lines.contains(&"  Removed partition 2023-11".to_string()));
        assert!(lines.contains(&"  Processing range: 2024-03".to_string()));
        assert!(lines.contains(&"  Created partition 2024-03".to_string()));
        assert!(lines.contains(&"  Partition count after processing: 4".to_string()));
    }

    #[test]
    fn test_incremental_offline_recalculates() {
        let (mut store, mut ctx) = monthly_sales();
        ctx.config.incremental_online = false;
        let outcome = run_partition_processing(&mut store, &ctx, &MemorySink::new());

        assert!(outcome.summary.recalculated);
        assert_eq!(outcome.summary.commits, 2);
        let last = store.executed_refreshes().last().unwrap();
        assert_eq!(last.target, RefreshTarget::Model);
        assert_eq!(last.mode, RefreshMode::Calculate);
        let refreshed = store
            .executed_refreshes()
            .iter()
            .find(|r| matches!(&r.target, RefreshTarget::Partition { partition, .. } if partition == "202403"))
            .unwrap();
        assert_eq!(refreshed.mode, RefreshMode::DataOnly);
    }

    #[test]
    fn test_whole_table_refresh() {
        let mut store = InMemoryStore::new(model().with_table("Currency"));
        let ctx = run_context(run_config(vec![whole_table("Currency")]));
        let outcome = run_partition_processing(&mut store, &ctx, &MemorySink::new());

        assert!(outcome.is_success());
        assert_eq!(outcome.summary.tables[0].table_refresh, Some(RefreshMode::Full));
        assert_eq!(
            store.executed_refreshes()[0].target,
            RefreshTarget::Table {
                table: "Currency".to_string()
            }
        );
    }

    #[test]
    fn test_initial_setup_commits_each_unprocessed_partition() {
        let mut store = InMemoryStore::new(model().with_partitioned_table("Sales", ["2023"]));
        let mut config = run_config(vec![partitioned_table(
            "Sales",
            partitioning(Granularity::Yearly, "2024-06-30", 3, 1),
        )]);
        config.initial_setup = true;
        let ctx = run_context(config);
        let outcome = run_partition_processing(&mut store, &ctx, &MemorySink::new());

        assert!(outcome.is_success(), "{:?}", outcome.error);
        let summary = &outcome.summary;
        assert_eq!(summary.partitions_created, 2);
        assert_eq!(summary.partitions_skipped, 1);
        assert_eq!(summary.synchronous_commits, 2);
        // two partitions, one per table, one recalculation
        assert_eq!(summary.commits, 4);
        assert!(summary.recalculated);
        assert_eq!(summary.templates_sanitized, 1);

        let sales = store.committed().table("Sales").unwrap();
        let template = sales.partition("Sales").unwrap();
        assert!(template.source.as_ref().unwrap().is_always_false());
        for name in ["2022", "2023", "2024"] {
            assert_eq!(sales.partition(name).unwrap().state, PartitionState::Ready);
        }
    }

    #[test]
    fn test_initial_setup_reprocesses_partially_loaded_partition() {
        let mut model = model().with_partitioned_table("Sales", ["2023"]);
        model.tables[0].partitions[1].state = PartitionState::CalculationNeeded;
        let mut store = InMemoryStore::new(model);
        let mut config = run_config(vec![partitioned_table(
            "Sales",
            partitioning(Granularity::Yearly, "2023-12-31", 1, 1),
        )]);
        config.initial_setup = true;
        let outcome =
            run_partition_processing(&mut store, &run_context(config), &MemorySink::new());

        assert_eq!(outcome.summary.partitions_skipped, 0);
        assert_eq!(outcome.summary.synchronous_commits, 1);
        assert_eq!(outcome.summary.tables[0].refreshed, vec!["2023"]);
    }

    #[test]
    fn test_interrupted_backfill_reprocesses_every_partition() {
        let mut config = run_config(vec![partitioned_table(
            "Sales",
            partitioning(Granularity::Yearly, "2024-06-30", 3, 1),
        )]);
        config.initial_setup = true;
        let ctx = run_context(config);
        let mut store = InMemoryStore::new(model().with_table("Sales"))
            .with_faults(FaultPlan::fail_refresh_of(&["2024"]));

        let first = run_partition_processing(&mut store, &ctx, &MemorySink::new());
        assert!(first.error.is_some());
        assert_eq!(first.summary.synchronous_commits, 2);
        let sales = store.committed().table("Sales").unwrap();
        assert_eq!(
            sales.partition("2022").unwrap().state,
            PartitionState::CalculationNeeded
        );
        assert!(sales.partition("2024").is_none());

        let mut store = store.with_faults(FaultPlan::default());
        let rerun = run_partition_processing(&mut store, &ctx, &MemorySink::new());
        assert!(rerun.is_success(), "{:?}", rerun.error);
        assert_eq!(rerun.summary.partitions_skipped, 0);
        assert_eq!(rerun.summary.synchronous_commits, 3);
        assert_eq!(rerun.summary.tables[0].refreshed, vec!["2022", "2023", "2024"]);
    }

    #[test]
    fn test_max_parallelism_bounds_refresh_waves() {
        let mut store = InMemoryStore::new(model().with_partitioned_table("Sales", ["202401"]));
        let mut config = run_config(vec![partitioned_table(
            "Sales",
            partitioning(Granularity::Monthly, "2024-03-15", 3, 3),
        )]);
        config.connection.max_parallelism = Some(2);
        let sink = MemorySink::new();
        let outcome = run_partition_processing(&mut store, &run_context(config), &sink);

        assert!(outcome.is_success(), "{:?}", outcome.error);
        assert_eq!(outcome.summary.refreshes_queued, 3);
        assert_eq!(outcome.summary.commits, 1);
        assert_eq!(outcome.summary.refresh_waves, 2);
        assert_eq!(store.max_parallelism(), Some(2));

        let commits = sink.named(event_names::COMMIT_FINISHED);
        assert_eq!(commits[0].fields["waves"], 2);
        assert_eq!(commits[0].fields["refreshes"], 3);
    }

    #[test]
    fn test_parallel_tables_commit_once() {
        let mut store = InMemoryStore::new(
            model()
                .with_table("Currency")
                .with_partitioned_table("Sales", ["202402"]),
        );
        let mut config = run_config(vec![
            whole_table("Currency"),
            partitioned_table("Sales", partitioning(Granularity::Monthly, "2024-03-01", 2, 2)),
        ]);
        config.incremental_parallel_tables = true;
        let outcome =
            run_partition_processing(&mut store, &run_context(config), &MemorySink::new());

        assert!(outcome.is_success());
        assert_eq!(outcome.summary.commits, 1);
        assert_eq!(store.stats().barriers, 1);
        assert_eq!(store.executed_refreshes().len(), 3);
    }

    #[test]
    fn test_missing_template_is_connection_error() {
        let mut store = InMemoryStore::new(model().with_bare_table("Sales"));
        let ctx = run_context(run_config(vec![partitioned_table(
            "Sales",
            partitioning(Granularity::Daily, "2024-01-02", 2, 1),
        )]));
        let outcome = run_partition_processing(&mut store, &ctx, &MemorySink::new());

        let err = outcome.error.as_ref().unwrap();
        assert!(matches!(
            err,
            Error::Connection(StoreError::TemplateNotFound { .. })
        ));
        assert!(!outcome.summary.completed);
    }

    #[test]
    fn test_missing_table_stops_before_later_tables() {
        let mut store = InMemoryStore::new(model().with_table("Currency"));
        let ctx = run_context(run_config(vec![whole_table("Ghost"), whole_table("Currency")]));
        let outcome = run_partition_processing(&mut store, &ctx, &MemorySink::new());

        assert_eq!(outcome.error.as_ref().unwrap().code(), 22);
        assert!(outcome.summary.tables.is_empty());
        assert!(store.executed_refreshes().is_empty());
    }

    #[test]
    fn test_refresh_failure_logs_cause_chain_and_rolls_back() {
        let (store, ctx) = monthly_sales();
        let mut store = store.with_faults(FaultPlan::fail_refresh_of(&["202403"]));
        let sink = MemorySink::new();
        let outcome = run_partition_processing(&mut store, &ctx, &sink);

        let structured = outcome.structured_error().unwrap();
        assert_eq!(structured.code, 41);
        assert_eq!(structured.causes.len(), 2);

        let failures = sink.named(event_names::RUN_FAILED);
        assert_eq!(failures.len(), 3);
        assert!(failures[1].indented);
        assert!(failures[2].message.contains("source query failed"));

        assert_eq!(
            partition_names(&store, "Sales"),
            vec!["Sales", "202311", "202312", "202401", "202402"]
        );
        assert!(outcome.summary.tables[0].final_partition_count.is_none());
    }

    #[test]
    fn test_disconnect_failure_is_swallowed() {
        let (store, ctx) = monthly_sales();
        let mut store = store.with_faults(FaultPlan::default().with_failing_disconnect());
        let sink = MemorySink::new();
        let outcome = run_partition_processing(&mut store, &ctx, &sink);

        assert!(outcome.is_success());
        assert_eq!(sink.named(event_names::STORE_DISCONNECT_FAILED).len(), 1);
    }

    #[test]
    fn test_rerun_is_idempotent() {
        let (mut store, ctx) = monthly_sales();
        run_partition_processing(&mut store, &ctx, &MemorySink::new());
        let after_first = store.committed().clone();

        let outcome = run_partition_processing(&mut store, &ctx, &MemorySink::new());
        assert!(outcome.is_success());
        assert_eq!(outcome.summary.partitions_created, 0);
        assert_eq!(outcome.summary.partitions_removed, 0);
        assert_eq!(
            store.committed().table("Sales").unwrap().partition_names(),
            after_first.table("Sales").unwrap().partition_names()
        );
    }

    #[test]
    fn test_unrelated_partitions_survive() {
        let mut store = InMemoryStore::new(
            ModelSnapshot::new(crate::test_utils::SERVER, crate::test_utils::DATABASE)
                .with_partitioned_table("Sales", ["Archive", "2019", "201901"]),
        );
        let ctx = run_context(run_config(vec![partitioned_table(
            "Sales",
            partitioning(Granularity::Yearly, "2024-01-01", 2, 1),
        )]));
        let outcome = run_partition_processing(&mut store, &ctx, &MemorySink::new());

        assert!(outcome.is_success());
        assert_eq!(
            partition_names(&store, "Sales"),
            vec!["Sales", "Archive", "201901", "2024"]
        );
    }
}
