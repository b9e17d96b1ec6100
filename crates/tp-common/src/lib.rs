//! Tabular partitions common types, IDs, and errors.
//!
//! This crate provides foundational types shared across the workspace:
//! - Partition granularity
//! - Run identity
//! - Store, format and unified error types
//! - Output format specifications

pub mod error;
pub mod granularity;
pub mod id;
pub mod output;

pub use error::{
    cause_chain, format_error_human, Error, ErrorCategory, FormatError, Result, StoreError,
    StructuredError,
};
pub use granularity::Granularity;
pub use id::RunId;
pub use output::OutputFormat;

/// Schema version of machine-readable command output.
pub const SCHEMA_VERSION: &str = "1.0.0";
