//! Configuration validation errors and semantic validation.

use chrono::{Datelike, Days, Months, NaiveDate};
use std::collections::HashSet;
use thiserror::Error;
use tp_common::Granularity;

use crate::run::{PartitioningConfiguration, RunConfiguration};

/// Validation result type.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Configuration validation errors.
#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("I/O error: {0}")]
    IoError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Semantic validation failed: {0}")]
    SemanticError(String),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },

    #[error("Version mismatch: expected {expected}, got {actual}")]
    VersionMismatch { expected: String, actual: String },
}

impl ValidationError {
    /// Error code for structured error reporting.
    pub fn code(&self) -> u32 {
        match self {
            ValidationError::IoError(_) => 60,
            ValidationError::ParseError(_) => 61,
            ValidationError::SemanticError(_) => 63,
            ValidationError::MissingField(_) => 64,
            ValidationError::InvalidValue { .. } => 65,
            ValidationError::VersionMismatch { .. } => 66,
        }
    }
}

/// Validate a run configuration semantically.
pub fn validate_run_config(config: &RunConfiguration) -> ValidationResult<()> {
    if config.schema_version != crate::CONFIG_SCHEMA_VERSION {
        return Err(ValidationError::VersionMismatch {
            expected: crate::CONFIG_SCHEMA_VERSION.to_string(),
            actual: config.schema_version.clone(),
        });
    }

    if config.connection.server.trim().is_empty() {
        return Err(ValidationError::MissingField("connection.server".to_string()));
    }
    if config.connection.database.trim().is_empty() {
        return Err(ValidationError::MissingField(
            "connection.database".to_string(),
        ));
    }
    if config.connection.max_parallelism == Some(0) {
        return Err(ValidationError::InvalidValue {
            field: "connection.max_parallelism".to_string(),
            message: "must be at least 1 when set".to_string(),
        });
    }

    if config.tables.is_empty() {
        return Err(ValidationError::SemanticError(
            "at least one table must be configured".to_string(),
        ));
    }

    let mut seen = HashSet::new();
    for (t, table) in config.tables.iter().enumerate() {
        if table.name.trim().is_empty() {
            return Err(ValidationError::MissingField(format!("tables[{}].name", t)));
        }
        if !seen.insert(table.name.as_str()) {
            return Err(ValidationError::SemanticError(format!(
                "table {:?} is configured more than once",
                table.name
            )));
        }
        for (p, partitioning) in table.partitioning.iter().enumerate() {
            validate_partitioning(&format!("tables[{}].partitioning[{}]", t, p), partitioning)?;
        }
    }

    Ok(())
}

fn validate_partitioning(field: &str, config: &PartitioningConfiguration) -> ValidationResult<()> {
    if config.source_table.trim().is_empty() {
        return Err(ValidationError::MissingField(format!("{}.source_table", field)));
    }
    if config.source_column.trim().is_empty() {
        return Err(ValidationError::MissingField(format!("{}.source_column", field)));
    }
    if config.partitions_full == 0 {
        return Err(ValidationError::InvalidValue {
            field: format!("{}.partitions_full", field),
            message: "window must hold at least one partition".to_string(),
        });
    }
    if config.partitions_incremental > config.partitions_full {
        return Err(ValidationError::InvalidValue {
            field: format!("{}.partitions_incremental", field),
            message: format!(
                "{} exceeds partitions_full ({})",
                config.partitions_incremental, config.partitions_full
            ),
        });
    }
    if config.max_date.year() < 1 || config.max_date.year() > 9999 {
        return Err(ValidationError::InvalidValue {
            field: format!("{}.max_date", field),
            message: "year must be between 1 and 9999".to_string(),
        });
    }

    let first = window_start(config.granularity, config.max_date, config.partitions_full - 1);
    if first.map(|d| d.year() < 1).unwrap_or(true) {
        return Err(ValidationError::InvalidValue {
            field: format!("{}.partitions_full", field),
            message: format!(
                "window of {} {} partitions ending {} starts before year 1",
                config.partitions_full, config.granularity, config.max_date
            ),
        });
    }

    Ok(())
}

fn window_start(granularity: Granularity, max_date: NaiveDate, steps: u32) -> Option<NaiveDate> {
    match granularity {
        Granularity::Daily => max_date.checked_sub_days(Days::new(u64::from(steps))),
        Granularity::Monthly => max_date.checked_sub_months(Months::new(steps)),
        Granularity::Yearly => max_date.checked_sub_months(Months::new(steps.checked_mul(12)?)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::run::{ConnectionInfo, TableConfiguration};

    fn partitioning(full: u32, incremental: u32) -> PartitioningConfiguration {
        PartitioningConfiguration {
            source_table: "[dbo].[FactSales]".to_string(),
            source_column: "OrderDateKey".to_string(),
            granularity: Granularity::Monthly,
            max_date: NaiveDate::from_ymd_opt(2024, 3, 31).unwrap(),
            partitions_full: full,
            partitions_incremental: incremental,
        }
    }

    fn config(partitioning: Vec<PartitioningConfiguration>) -> RunConfiguration {
        RunConfiguration {
            schema_version: crate::CONFIG_SCHEMA_VERSION.to_string(),
            connection: ConnectionInfo {
                server: "localhost".to_string(),
                database: "Sales".to_string(),
                max_parallelism: None,
            },
            initial_setup: false,
            incremental_online: true,
            incremental_parallel_tables: false,
            tables: vec![TableConfiguration {
                name: "Sales".to_string(),
                partitioning,
            }],
        }
    }

    #[test]
    fn test_valid_config_passes() {
        assert!(validate_run_config(&config(vec![partitioning(12, 3)])).is_ok());
        assert!(validate_run_config(&config(vec![])).is_ok());
    }

    #[test]
    fn test_incremental_may_equal_full_or_zero() {
        assert!(validate_run_config(&config(vec![partitioning(3, 3)])).is_ok());
        assert!(validate_run_config(&config(vec![partitioning(3, 0)])).is_ok());
    }

    #[test]
    fn test_incremental_exceeding_full_rejected() {
        let err = validate_run_config(&config(vec![partitioning(3, 4)])).unwrap_err();
        match err {
            ValidationError::InvalidValue { field, .. } => {
                assert_eq!(field, "tables[0].partitioning[0].partitions_incremental");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_empty_window_rejected() {
        let err = validate_run_config(&config(vec![partitioning(0, 0)])).unwrap_err();
        assert!(matches!(err, ValidationError::InvalidValue { .. }));
    }

    #[test]
    fn test_window_before_year_one_rejected() {
        let mut p = partitioning(3, 1);
        p.granularity = Granularity::Yearly;
        p.max_date = NaiveDate::from_ymd_opt(2, 6, 1).unwrap();
        assert!(validate_run_config(&config(vec![p.clone()])).is_err());

        p.partitions_full = 2;
        assert!(validate_run_config(&config(vec![p])).is_ok());
    }

    #[test]
    fn test_duplicate_table_rejected() {
        let mut cfg = config(vec![]);
        cfg.tables.push(cfg.tables[0].clone());
        let err = validate_run_config(&cfg).unwrap_err();
        assert!(matches!(err, ValidationError::SemanticError(_)));
    }

    #[test]
    fn test_missing_connection_fields_rejected() {
        let mut cfg = config(vec![]);
        cfg.connection.database = "  ".to_string();
        let err = validate_run_config(&cfg).unwrap_err();
        assert!(matches!(err, ValidationError::MissingField(f) if f == "connection.database"));
    }

    #[test]
    fn test_no_tables_rejected() {
        let mut cfg = config(vec![]);
        cfg.tables.clear();
        assert!(validate_run_config(&cfg).is_err());
    }

    #[test]
    fn test_version_mismatch_rejected() {
        let mut cfg = config(vec![]);
        cfg.schema_version = "0.9.0".to_string();
        let err = validate_run_config(&cfg).unwrap_err();
        assert_eq!(err.code(), 66);
    }
}
