//! Error types for tabular partition management.
//!
//! Three leaf error families are shared across the workspace:
//! - [`StoreError`]: failures reported by a partition store (the remote
//!   analytical engine or an in-memory stand-in)
//! - [`FormatError`]: partition keys that do not fit their granularity
//! - configuration failures, reported as strings by `tp-config`
//!
//! They are folded into the unified [`Error`], which carries a stable code,
//! a category, a headline and a remediation hint.
//!
//! # Human-Facing Output
//!
//! ```text
//! ✗ Processing Failed
//!   Reason: processing error: commit failed with 3 queued operation(s)
//!   Fix: Inspect the underlying cause in the log, fix the source data or query, then rerun.
//! ```

use crate::granularity::Granularity;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// Result type alias for partition management operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error categories for grouping related errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Run configuration loading and validation.
    Config,
    /// Server, database, table or template partition could not be reached.
    Connection,
    /// Partition key does not match its granularity.
    Format,
    /// A refresh or commit was rejected by the store.
    Processing,
    /// File I/O and serialization errors.
    Io,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorCategory::Config => write!(f, "config"),
            ErrorCategory::Connection => write!(f, "connection"),
            ErrorCategory::Format => write!(f, "format"),
            ErrorCategory::Processing => write!(f, "processing"),
            ErrorCategory::Io => write!(f, "io"),
        }
    }
}

/// Failures reported by a partition store.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("server {server} unavailable: {reason}")]
    ServerUnavailable { server: String, reason: String },

    #[error("database {database} not found")]
    DatabaseNotFound { database: String },

    #[error("store is not connected")]
    NotConnected,

    #[error("table {table} not found")]
    TableNotFound { table: String },

    #[error("template partition {table} not found in table {table}")]
    TemplateNotFound { table: String },

    #[error("partition {partition} not found in table {table}")]
    PartitionNotFound { table: String, partition: String },

    #[error("partition {partition} already exists in table {table}")]
    DuplicatePartition { table: String, partition: String },

    #[error("refresh of {target} failed: {reason}")]
    RefreshFailed { target: String, reason: String },

    #[error("commit failed with {pending} queued operation(s)")]
    CommitFailed {
        pending: usize,
        #[source]
        cause: Box<StoreError>,
    },
}

impl StoreError {
    /// Whether this failure means the run could not locate what it needs
    /// (server, database, table, template), as opposed to a processing
    /// failure on something it found.
    pub fn is_connection(&self) -> bool {
        matches!(
            self,
            StoreError::ServerUnavailable { .. }
                | StoreError::DatabaseNotFound { .. }
                | StoreError::NotConnected
                | StoreError::TableNotFound { .. }
                | StoreError::TemplateNotFound { .. }
        )
    }
}

/// Partition key formatting failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FormatError {
    #[error("partition key {key:?} has {actual} characters, {granularity} keys need {expected}")]
    WidthMismatch {
        key: String,
        granularity: Granularity,
        expected: usize,
        actual: usize,
    },

    #[error("stepping back {steps} {unit}(s) from {anchor} leaves the supported calendar range")]
    OutOfRange {
        anchor: String,
        steps: u32,
        unit: &'static str,
    },
}

/// Unified error type.
#[derive(Error, Debug)]
pub enum Error {
    // Configuration errors (10-19)
    #[error("configuration error: {0}")]
    Config(String),

    #[error("invalid run configuration: {0}")]
    InvalidConfig(String),

    // Connection errors (20-29)
    #[error("connection error: {0}")]
    Connection(#[source] StoreError),

    // Format errors (30-39)
    #[error("format error: {0}")]
    Format(#[from] FormatError),

    // Processing errors (40-49)
    #[error("processing error: {0}")]
    Processing(#[source] StoreError),

    // I/O errors (60-69)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<StoreError> for Error {
    fn from(err: StoreError) -> Self {
        if err.is_connection() {
            Error::Connection(err)
        } else {
            Error::Processing(err)
        }
    }
}

impl Error {
    /// Returns the error code for this error type.
    ///
    /// Error codes are stable and grouped by category:
    /// - 10-19: Configuration errors
    /// - 20-29: Connection errors
    /// - 30-39: Format errors
    /// - 40-49: Processing errors
    /// - 60-69: I/O errors
    pub fn code(&self) -> u32 {
        match self {
            Error::Config(_) => 10,
            Error::InvalidConfig(_) => 11,
            Error::Connection(StoreError::ServerUnavailable { .. }) => 20,
            Error::Connection(StoreError::DatabaseNotFound { .. }) => 21,
            Error::Connection(StoreError::TableNotFound { .. }) => 22,
            Error::Connection(StoreError::TemplateNotFound { .. }) => 23,
            Error::Connection(_) => 29,
            Error::Format(FormatError::WidthMismatch { .. }) => 30,
            Error::Format(FormatError::OutOfRange { .. }) => 31,
            Error::Processing(StoreError::RefreshFailed { .. }) => 40,
            Error::Processing(StoreError::CommitFailed { .. }) => 41,
            Error::Processing(_) => 49,
            Error::Io(_) => 60,
            Error::Json(_) => 61,
        }
    }

    /// Returns the error category for grouping and filtering.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::Config(_) | Error::InvalidConfig(_) => ErrorCategory::Config,
            Error::Connection(_) => ErrorCategory::Connection,
            Error::Format(_) => ErrorCategory::Format,
            Error::Processing(_) => ErrorCategory::Processing,
            Error::Io(_) | Error::Json(_) => ErrorCategory::Io,
        }
    }

    /// Returns a human-readable remediation hint.
    pub fn remediation(&self) -> &'static str {
        match self {
            Error::Config(_) => {
                "Pass --config or set TP_CONFIG to a readable run configuration file."
            }
            Error::InvalidConfig(_) => {
                "Run 'tp-core config validate' and fix the reported fields."
            }
            Error::Connection(_) => {
                "Check server and database names, and that every configured table has a template partition named after it."
            }
            Error::Format(_) => {
                "Partition keys must be zero-padded to the granularity width (yyyy, yyyymm, yyyymmdd)."
            }
            Error::Processing(_) => {
                "Inspect the underlying cause in the log, fix the source data or query, then rerun."
            }
            Error::Io(_) => "Check that the file exists and is readable, then retry.",
            Error::Json(_) => "Invalid JSON in file. Check syntax with 'jq .' or restore from backup.",
        }
    }

    /// Returns a short headline for human-readable output.
    pub fn headline(&self) -> &'static str {
        match self {
            Error::Config(_) => "Configuration Error",
            Error::InvalidConfig(_) => "Invalid Run Configuration",
            Error::Connection(_) => "Connection Failed",
            Error::Format(_) => "Partition Key Format Error",
            Error::Processing(_) => "Processing Failed",
            Error::Io(_) => "I/O Error",
            Error::Json(_) => "JSON Parse Error",
        }
    }
}

/// Messages of every error below `err` in its `source()` chain, outermost first.
pub fn cause_chain(err: &dyn std::error::Error) -> Vec<String> {
    let mut causes = Vec::new();
    let mut current = err.source();
    while let Some(cause) = current {
        causes.push(cause.to_string());
        current = cause.source();
    }
    causes
}

/// Structured error response for JSON output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructuredError {
    /// Stable error code.
    pub code: u32,

    /// Error category for grouping.
    pub category: ErrorCategory,

    /// Human-readable error message.
    pub message: String,

    /// Underlying causes, outermost first.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub causes: Vec<String>,

    /// Additional structured context (e.g., table, partition).
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub context: HashMap<String, serde_json::Value>,
}

impl From<&Error> for StructuredError {
    fn from(err: &Error) -> Self {
        let mut context = HashMap::new();

        match err {
            Error::Connection(StoreError::TableNotFound { table })
            | Error::Connection(StoreError::TemplateNotFound { table }) => {
                context.insert("table".to_string(), serde_json::json!(table));
            }
            Error::Connection(StoreError::DatabaseNotFound { database }) => {
                context.insert("database".to_string(), serde_json::json!(database));
            }
            Error::Format(FormatError::WidthMismatch {
                key, granularity, ..
            }) => {
                context.insert("key".to_string(), serde_json::json!(key));
                context.insert("granularity".to_string(), serde_json::json!(granularity));
            }
            _ => {}
        }

        StructuredError {
            code: err.code(),
            category: err.category(),
            message: err.to_string(),
            causes: cause_chain(err),
            context,
        }
    }
}

impl StructuredError {
    /// Serialize to JSON string.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| {
            format!(r#"{{"code":{},"error":"serialization_failed"}}"#, self.code)
        })
    }
}

/// Format an error for human-readable stderr output.
///
/// Output format:
/// ```text
/// ✗ [Headline]
///   Reason: [Error message]
///   Fix: [Remediation hint]
/// ```
pub fn format_error_human(err: &Error, use_color: bool) -> String {
    let (red, cyan, reset) = if use_color {
        ("\x1b[31m", "\x1b[36m", "\x1b[0m")
    } else {
        ("", "", "")
    };

    format!(
        "{red}✗{reset} {headline}\n  Reason: {message}\n  {cyan}Fix:{reset} {remediation}",
        red = red,
        cyan = cyan,
        reset = reset,
        headline = err.headline(),
        message = err,
        remediation = err.remediation()
    )
}
