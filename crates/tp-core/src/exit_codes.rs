//! Exit codes for the tp-core CLI.
//!
//! Exit codes communicate the outcome without requiring output parsing.
//!
//! Exit code ranges:
//! - 0-2: Success outcomes
//! - 10-19: Configuration, environment and processing errors
//! - 20-29: Internal errors

use tp_common::{Error, ErrorCategory};

/// Exit codes for tp-core operations.
///
/// These codes are a stable contract for schedulers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    /// Success: nothing to do / clean run
    Clean = 0,

    /// Dry-run plan has pending changes
    PlanReady = 1,

    /// Run finished and changed the model
    RunOk = 2,

    /// Invalid arguments
    ArgsError = 10,

    /// Run configuration missing or invalid
    ConfigError = 11,

    /// Server, database, table or template partition not found
    ConnectionError = 12,

    /// Partition key does not fit its granularity
    FormatError = 13,

    /// A refresh or commit failed; staged work was rolled back
    ProcessingError = 14,

    /// Internal error (bug - please report)
    InternalError = 20,

    /// I/O error
    IoError = 21,
}

impl ExitCode {
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    /// Check if this exit code indicates success (codes 0-2).
    pub fn is_success(self) -> bool {
        matches!(self, ExitCode::Clean | ExitCode::PlanReady | ExitCode::RunOk)
    }

    /// Check if this exit code is a user/environment error (codes 10-19).
    pub fn is_user_error(self) -> bool {
        (10..20).contains(&(self as i32))
    }

    /// Check if this exit code is an internal error (codes 20-29).
    pub fn is_internal_error(self) -> bool {
        (self as i32) >= 20
    }

    /// Get the error code name as a string constant (for JSON output).
    pub fn code_name(&self) -> &'static str {
        match self {
            ExitCode::Clean => "OK_CLEAN",
            ExitCode::PlanReady => "OK_PLAN_READY",
            ExitCode::RunOk => "OK_PROCESSED",
            ExitCode::ArgsError => "ERR_ARGS",
            ExitCode::ConfigError => "ERR_CONFIG",
            ExitCode::ConnectionError => "ERR_CONNECTION",
            ExitCode::FormatError => "ERR_FORMAT",
            ExitCode::ProcessingError => "ERR_PROCESSING",
            ExitCode::InternalError => "ERR_INTERNAL",
            ExitCode::IoError => "ERR_IO",
        }
    }

    /// Exit code for a failed operation.
    pub fn for_error(err: &Error) -> Self {
        match err.category() {
            ErrorCategory::Config => ExitCode::ConfigError,
            ErrorCategory::Connection => ExitCode::ConnectionError,
            ErrorCategory::Format => ExitCode::FormatError,
            ErrorCategory::Processing => ExitCode::ProcessingError,
            ErrorCategory::Io => ExitCode::IoError,
        }
    }
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> Self {
        code as i32
    }
}

impl std::fmt::Display for ExitCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.code_name(), self.as_i32())
    }
}
