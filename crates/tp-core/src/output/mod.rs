//! Command output rendering.
//!
//! stdout carries exactly one payload per command. Machine formats wrap the
//! payload in an envelope with the schema version, command name and run ID;
//! the summary format is a short plain-text report.

use chrono::Utc;
use serde::Serialize;
use serde_json::{json, Value};
use tp_common::{format_error_human, Error, OutputFormat, Result, StructuredError, SCHEMA_VERSION};

use crate::plan::RunPlan;
use crate::processor::RunSummary;

/// Outcome reported in the envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Ok,
    Error,
}

/// Wrap a payload in the standard envelope.
pub fn envelope(command: &str, run_id: &str, status: Status, payload: Value) -> Value {
    json!({
        "schema_version": SCHEMA_VERSION,
        "command": command,
        "run_id": run_id,
        "generated_at": Utc::now().to_rfc3339(),
        "status": status,
        "result": payload,
    })
}

/// Render an envelope for a machine format.
pub fn render_machine(format: OutputFormat, value: &Value) -> Result<String> {
    Ok(match format {
        OutputFormat::Jsonl => serde_json::to_string(value)?,
        _ => serde_json::to_string_pretty(value)?,
    })
}

/// Render the result of `tp-core run`.
pub fn render_run(format: OutputFormat, summary: &RunSummary, error: Option<&Error>) -> Result<String> {
    if !format.is_machine() {
        let mut text = render_run_text(summary);
        if let Some(err) = error {
            text.push('\n');
            text.push_str(&format_error_human(err, false));
        }
        return Ok(text);
    }

    let mut payload = serde_json::to_value(summary)?;
    let status = match error {
        Some(err) => {
            if let Value::Object(map) = &mut payload {
                map.insert(
                    "error".to_string(),
                    serde_json::to_value(StructuredError::from(err))?,
                );
            }
            Status::Error
        }
        None => Status::Ok,
    };
    render_machine(format, &envelope("run", &summary.run_id, status, payload))
}

/// Plain-text run report.
pub fn render_run_text(summary: &RunSummary) -> String {
    let mut lines = vec![format!(
        "[{}] {}/{}: {}",
        summary.run_id,
        summary.server,
        summary.database,
        summary.headline()
    )];
    for table in &summary.tables {
        let after = table
            .final_partition_count
            .map(|n| n.to_string())
            .unwrap_or_else(|| "?".to_string());
        let detail = match table.table_refresh {
            Some(mode) => format!("{} refresh", mode),
            None => format!(
                "-{} +{} ~{} ={}",
                table.removed.len(),
                table.created.len(),
                table.refreshed.len(),
                table.skipped.len()
            ),
        };
        lines.push(format!(
            "  {}: {} -> {} partitions ({})",
            table.table, table.initial_partition_count, after, detail
        ));
    }
    if !summary.completed {
        lines.push("  run stopped early; committed work is kept, staged work was discarded".to_string());
    }
    lines.join("\n")
}

/// Render the result of `tp-core plan`.
pub fn render_plan(format: OutputFormat, run_id: &str, plan: &RunPlan) -> Result<String> {
    if format.is_machine() {
        let payload = serde_json::to_value(plan)?;
        return render_machine(format, &envelope("plan", run_id, Status::Ok, payload));
    }
    render_plan_text(plan)
}

/// Plain-text plan report.
pub fn render_plan_text(plan: &RunPlan) -> Result<String> {
    let mut lines = vec![format!(
        "Plan for {}/{}: {} removal(s), {} creation(s), {} partition refresh(es), {} table refresh(es)",
        plan.server,
        plan.database,
        plan.totals.removals,
        plan.totals.creations,
        plan.totals.partition_refreshes,
        plan.totals.table_refreshes
    )];
    for table in &plan.tables {
        if let Some(mode) = table.table_refresh {
            lines.push(format!("  {}: {} refresh", table.table, mode));
            continue;
        }
        for config in &table.configurations {
            let keys = |list: &[crate::key::PartitionKey]| {
                list.iter().map(|k| k.canonical()).collect::<Vec<_>>().join(", ")
            };
            lines.push(format!(
                "  {} ({}): window {}",
                table.table,
                config.granularity,
                config.window_range()?.unwrap_or_else(|| "empty".to_string())
            ));
            if !config.removals().is_empty() {
                lines.push(format!("    remove: {}", keys(config.removals())));
            }
            let (create, refresh): (Vec<_>, Vec<_>) =
                config.processing.iter().partition(|p| !p.exists);
            if !create.is_empty() {
                let create: Vec<_> = create.iter().map(|p| p.key).collect();
                lines.push(format!("    create: {}", keys(&create)));
            }
            if !refresh.is_empty() {
                let refresh: Vec<_> = refresh.iter().map(|p| p.key).collect();
                lines.push(format!("    refresh: {}", keys(&refresh)));
            }
            if !config.diff.beyond_window.is_empty() {
                lines.push(format!("    keep (newer than window): {}", keys(&config.diff.beyond_window)));
            }
        }
    }
    Ok(lines.join("\n"))
}

/// Render a failure that happened before a run could start.
pub fn render_error(format: OutputFormat, command: &str, run_id: &str, err: &Error) -> String {
    if !format.is_machine() {
        return format_error_human(err, false);
    }
    let structured = StructuredError::from(err);
    let payload = serde_json::to_value(&structured).unwrap_or(Value::Null);
    let value = envelope(command, run_id, Status::Error, json!({ "error": payload }));
    render_machine(format, &value).unwrap_or_else(|_| structured.to_json())
}
