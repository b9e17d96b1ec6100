//! Run log lines.
//!
//! A processing run talks in lines: a headline per table followed by
//! indented detail lines. Each line is a [`LogEvent`] stamped with the
//! run's correlation ids, so the same stream reads well on a console and
//! can be shipped as JSONL.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};

/// How important a run line is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Debug,
    Info,
    Warn,
    Error,
}

/// Step of a partition processing run a line belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Init,
    Connect,
    /// Window and diff computation for one partitioning configuration.
    Plan,
    Remove,
    Create,
    Refresh,
    /// Barrier over the pending refresh queue.
    Commit,
    Recalculate,
    Disconnect,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Init => "init",
            Stage::Connect => "connect",
            Stage::Plan => "plan",
            Stage::Remove => "remove",
            Stage::Create => "create",
            Stage::Refresh => "refresh",
            Stage::Commit => "commit",
            Stage::Recalculate => "recalculate",
            Stage::Disconnect => "disconnect",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stable event names, `<subject>.<what happened>`.
pub mod event_names {
    pub const RUN_STARTED: &str = "run.started";
    pub const RUN_FINISHED: &str = "run.finished";
    pub const RUN_FAILED: &str = "run.failed";

    pub const STORE_CONNECTED: &str = "store.connected";
    pub const STORE_DISCONNECTED: &str = "store.disconnected";
    pub const STORE_DISCONNECT_FAILED: &str = "store.disconnect_failed";

    pub const TABLE_STARTED: &str = "table.started";
    pub const TABLE_PARTITION_COUNT: &str = "table.partition_count";
    pub const TABLE_FINISHED: &str = "table.finished";

    pub const WINDOW_PLANNED: &str = "window.planned";
    pub const WINDOW_BEYOND: &str = "window.beyond";

    pub const PARTITION_REMOVED: &str = "partition.removed";
    pub const PARTITION_CREATED: &str = "partition.created";
    pub const PARTITION_REFRESH_QUEUED: &str = "partition.refresh_queued";
    pub const PARTITION_SKIPPED: &str = "partition.skipped";
    pub const TEMPLATE_SANITIZED: &str = "template.sanitized";

    pub const COMMIT_FINISHED: &str = "commit.finished";
    pub const RECALC_STARTED: &str = "recalc.started";

    pub const CONFIG_LOADED: &str = "config.loaded";
}

/// Correlation ids shared by every line of one run.
#[derive(Debug, Clone, Serialize)]
pub struct LogContext {
    pub run_id: String,
    /// `server/database` once the target model is known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    pub host_id: String,
}

impl LogContext {
    pub fn new(run_id: impl Into<String>, host_id: impl Into<String>) -> Self {
        LogContext {
            run_id: run_id.into(),
            model: None,
            host_id: host_id.into(),
        }
    }

    pub fn with_model(mut self, server: &str, database: &str) -> Self {
        self.model = Some(format!("{}/{}", server, database));
        self
    }

    /// Line factory for one stage of the run.
    pub fn at(&self, stage: Stage) -> StageLog<'_> {
        StageLog { ctx: self, stage }
    }
}

/// Builds lines for a single [`Stage`] of a run.
#[derive(Debug, Clone, Copy)]
pub struct StageLog<'a> {
    ctx: &'a LogContext,
    stage: Stage,
}

impl StageLog<'_> {
    pub fn line(
        self,
        severity: Severity,
        event: &'static str,
        message: impl Into<String>,
    ) -> LogEvent {
        LogEvent {
            ts: Utc::now(),
            severity,
            event,
            stage: self.stage,
            context: self.ctx.clone(),
            message: message.into(),
            indented: false,
            fields: Map::new(),
        }
    }

    pub fn debug(self, event: &'static str, message: impl Into<String>) -> LogEvent {
        self.line(Severity::Debug, event, message)
    }

    pub fn info(self, event: &'static str, message: impl Into<String>) -> LogEvent {
        self.line(Severity::Info, event, message)
    }

    pub fn warn(self, event: &'static str, message: impl Into<String>) -> LogEvent {
        self.line(Severity::Warn, event, message)
    }

    pub fn error(self, event: &'static str, message: impl Into<String>) -> LogEvent {
        self.line(Severity::Error, event, message)
    }
}

/// One line of run output.
#[derive(Debug, Clone, Serialize)]
pub struct LogEvent {
    pub ts: DateTime<Utc>,
    #[serde(rename = "level")]
    pub severity: Severity,
    pub event: &'static str,
    pub stage: Stage,
    #[serde(flatten)]
    pub context: LogContext,
    pub message: String,
    /// Detail line under the preceding headline.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub indented: bool,
    #[serde(skip_serializing_if = "Map::is_empty")]
    pub fields: Map<String, Value>,
}

impl LogEvent {
    pub fn indented(mut self) -> Self {
        self.indented = true;
        self
    }

    /// Attach a structured field; values that fail to serialize are dropped.
    pub fn field(mut self, key: &str, value: impl Serialize) -> Self {
        if let Ok(value) = serde_json::to_value(value) {
            self.fields.insert(key.to_string(), value);
        }
        self
    }

    /// The line as a console shows it.
    pub fn console_text(&self) -> String {
        if self.indented {
            format!("  {}", self.message)
        } else {
            self.message.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> LogContext {
        LogContext::new("tp-20240315-020000-a7xq", "host-abc")
    }

    #[test]
    fn test_line_serializes_flat_with_context() {
        let line = ctx()
            .with_model("sql01", "AdventureWorks")
            .at(Stage::Create)
            .info(event_names::PARTITION_CREATED, "Created partition 2024-03")
            .indented()
            .field("table", "Internet Sales");

        let json = serde_json::to_value(&line).unwrap();
        assert_eq!(json["event"], "partition.created");
        assert_eq!(json["level"], "info");
        assert_eq!(json["stage"], "create");
        assert_eq!(json["run_id"], "tp-20240315-020000-a7xq");
        assert_eq!(json["model"], "sql01/AdventureWorks");
        assert_eq!(json["indented"], true);
        assert_eq!(json["fields"]["table"], "Internet Sales");
    }

    #[test]
    fn test_headline_omits_optional_keys() {
        let line = ctx().at(Stage::Init).info(event_names::RUN_STARTED, "start");
        let json = serde_json::to_value(&line).unwrap();
        assert!(json.get("indented").is_none());
        assert!(json.get("model").is_none());
        assert!(json.get("fields").is_none());
        assert_eq!(line.console_text(), "start");
        assert_eq!(line.indented().console_text(), "  start");
    }

    #[test]
    fn test_stage_log_sets_severity() {
        let log = ctx();
        let plan = log.at(Stage::Plan);
        assert_eq!(plan.warn(event_names::WINDOW_BEYOND, "ahead").severity, Severity::Warn);
        assert_eq!(plan.debug(event_names::WINDOW_PLANNED, "window").severity, Severity::Debug);
        assert_eq!(plan.error(event_names::RUN_FAILED, "boom").stage, Stage::Plan);
        assert!(Severity::Debug < Severity::Error);
    }

    #[test]
    fn test_stage_display_matches_serde() {
        for stage in [Stage::Init, Stage::Commit, Stage::Recalculate, Stage::Disconnect] {
            let json = serde_json::to_string(&stage).unwrap();
            assert_eq!(json, format!("\"{}\"", stage));
        }
    }
}
