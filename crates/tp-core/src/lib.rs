//! Tabular partitions core library.
//!
//! Rolling-window partition management for tables of an analytical model:
//! - Partition keys and period arithmetic per granularity
//! - Diffing existing partitions against the target window
//! - Plans and the processing orchestrator
//! - The partition store seam and an in-memory reference store
//! - Structured run logging, output rendering and exit codes
//!
//! The binary entry point is in `main.rs`.

pub mod config;
pub mod diff;
pub mod events;
pub mod exit_codes;
pub mod granularity;
pub mod key;
pub mod logging;
pub mod output;
pub mod plan;
pub mod processor;
pub mod store;

// Re-export test utilities for integration tests
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
