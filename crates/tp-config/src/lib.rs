//! Tabular partitions run configuration.
//!
//! This crate provides:
//! - Typed Rust structs for the run configuration file (tables and their
//!   rolling-window partitioning)
//! - Config path resolution (CLI → env → XDG → system)
//! - Semantic validation
//! - Mode presets overriding the processing flags
//! - Config snapshots for run logs

pub mod preset;
pub mod resolve;
pub mod run;
pub mod snapshot;
pub mod validate;

pub use preset::ModePreset;
pub use resolve::{resolve_config, ConfigLocation, ConfigSource};
pub use run::{ConnectionInfo, PartitioningConfiguration, RunConfiguration, TableConfiguration};
pub use snapshot::ConfigSnapshot;
pub use tp_common::Granularity;
pub use validate::{validate_run_config, ValidationError, ValidationResult};

/// Schema version for configuration files.
pub const CONFIG_SCHEMA_VERSION: &str = "1.0.0";
