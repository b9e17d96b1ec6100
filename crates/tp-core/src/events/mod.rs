//! Log sinks for run output.
//!
//! The processor never prints. Every line it produces is a [`LogEvent`]
//! handed to a [`LogSink`], so callers decide whether lines end up in
//! `tracing`, a JSONL stream, or a buffer inspected by tests.

use std::io::Write;
use std::sync::{Arc, Mutex};

use crate::logging::{LogEvent, Severity};

/// Destination for run log lines.
pub trait LogSink: Send + Sync {
    fn log(&self, event: &LogEvent);
}

/// Forwards events to the global `tracing` subscriber.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl LogSink for TracingSink {
    fn log(&self, event: &LogEvent) {
        let text = event.console_text();
        let fields = serde_json::Value::Object(event.fields.clone());
        let ctx = &event.context;
        match event.severity {
            Severity::Debug => tracing::debug!(
                event = event.event, run_id = %ctx.run_id, stage = event.stage.as_str(),
                model = ?ctx.model, fields = %fields, "{}", text
            ),
            Severity::Info => tracing::info!(
                event = event.event, run_id = %ctx.run_id, stage = event.stage.as_str(),
                model = ?ctx.model, fields = %fields, "{}", text
            ),
            Severity::Warn => tracing::warn!(
                event = event.event, run_id = %ctx.run_id, stage = event.stage.as_str(),
                model = ?ctx.model, fields = %fields, "{}", text
            ),
            Severity::Error => tracing::error!(
                event = event.event, run_id = %ctx.run_id, stage = event.stage.as_str(),
                model = ?ctx.model, fields = %fields, "{}", text
            ),
        }
    }
}

/// Writes one JSON object per event.
pub struct JsonlSink<W: Write + Send> {
    writer: Mutex<W>,
}

impl<W: Write + Send> JsonlSink<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    pub fn into_inner(self) -> W {
        match self.writer.into_inner() {
            Ok(writer) => writer,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl<W: Write + Send> LogSink for JsonlSink<W> {
    fn log(&self, event: &LogEvent) {
        if let Ok(mut writer) = self.writer.lock() {
            if serde_json::to_writer(&mut *writer, event).is_ok() {
                let _ = writeln!(writer);
            }
        }
    }
}

/// Keeps every event in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    events: Mutex<Vec<LogEvent>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<LogEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    /// Console rendering of every line.
    pub fn lines(&self) -> Vec<String> {
        self.events().iter().map(LogEvent::console_text).collect()
    }

    /// Events with the given name.
    pub fn named(&self, name: &str) -> Vec<LogEvent> {
        self.events()
            .into_iter()
            .filter(|e| e.event == name)
            .collect()
    }
}

impl LogSink for MemorySink {
    fn log(&self, event: &LogEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event.clone());
        }
    }
}

/// Forwards events to several sinks.
pub struct FanoutSink {
    sinks: Vec<Arc<dyn LogSink>>,
}

impl FanoutSink {
    pub fn new(sinks: Vec<Arc<dyn LogSink>>) -> Self {
        Self { sinks }
    }
}

impl LogSink for FanoutSink {
    fn log(&self, event: &LogEvent) {
        for sink in &self.sinks {
            sink.log(event);
        }
    }
}
