//! Granularity policy: period sequences, display formatting and source
//! predicates.
//!
//! Everything here is pure and deterministic; calling it twice with the same
//! arguments yields the same result, so a failed run can simply be restarted.

use chrono::{Days, Months, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;
use tp_common::{FormatError, Granularity};

use crate::key::PartitionKey;

/// Step `date` back by `steps` calendar units of `granularity`.
///
/// Month and year steps clamp the day of month (Mar 31 minus one month is
/// the last day of February). Returns `None` if the result leaves chrono's
/// representable range.
pub fn step_back(date: NaiveDate, granularity: Granularity, steps: u32) -> Option<NaiveDate> {
    match granularity {
        Granularity::Daily => date.checked_sub_days(Days::new(u64::from(steps))),
        Granularity::Monthly => date.checked_sub_months(Months::new(steps)),
        Granularity::Yearly => date.checked_sub_months(Months::new(steps.checked_mul(12)?)),
    }
}

/// Generate the ascending rolling window of `count` keys ending at `max_date`.
///
/// Key `i` is the period of `max_date` minus `count - 1 - i` steps, so the
/// last key is `max_date` truncated to the granularity. `count == 0` yields
/// an empty window.
pub fn generate_period_sequence(
    granularity: Granularity,
    max_date: NaiveDate,
    count: u32,
) -> Result<Vec<PartitionKey>, FormatError> {
    (0..count)
        .map(|i| {
            let steps = count - 1 - i;
            let date = step_back(max_date, granularity, steps).ok_or_else(|| {
                FormatError::OutOfRange {
                    anchor: max_date.to_string(),
                    steps,
                    unit: granularity.step_unit(),
                }
            })?;
            PartitionKey::from_date(date, granularity).map_err(|_| FormatError::OutOfRange {
                anchor: max_date.to_string(),
                steps,
                unit: granularity.step_unit(),
            })
        })
        .collect()
}

/// Format a key for people: `yyyy-mm-dd`, `yyyy-mm` or `yyyy`.
///
/// This is plain substring splitting. The key must have exactly the width of
/// `granularity`; its digits are not checked against the calendar, so
/// `"20241399"` formats as `"2024-13-99"`.
pub fn format_for_display(key: &str, granularity: Granularity) -> Result<String, FormatError> {
    let expected = granularity.key_width();
    if key.len() != expected || !key.is_ascii() {
        return Err(FormatError::WidthMismatch {
            key: key.to_string(),
            granularity,
            expected,
            actual: key.chars().count(),
        });
    }
    Ok(match granularity {
        Granularity::Yearly => key.to_string(),
        Granularity::Monthly => format!("{}-{}", &key[0..4], &key[4..6]),
        Granularity::Daily => format!("{}-{}-{}", &key[0..4], &key[4..6], &key[6..8]),
    })
}

/// Display form of a window, e.g. `2024-01 to 2024-03`.
pub fn format_range(keys: &[PartitionKey]) -> Result<Option<String>, FormatError> {
    let (Some(first), Some(last)) = (keys.first(), keys.last()) else {
        return Ok(None);
    };
    let first_text = format_for_display(&first.canonical(), first.granularity())?;
    if first == last {
        return Ok(Some(first_text));
    }
    let last_text = format_for_display(&last.canonical(), last.granularity())?;
    Ok(Some(format!("{} to {}", first_text, last_text)))
}

/// Filter handed to the source connector for one partition.
///
/// The core never executes it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourcePredicate {
    /// Source-system table.
    pub table: String,
    /// Boolean filter over the source table's columns.
    pub filter: String,
}

/// Filter that selects nothing.
pub const ALWAYS_FALSE_FILTER: &str = "0 = 1";

impl SourcePredicate {
    /// Full query text for the source connector.
    pub fn query_text(&self) -> String {
        format!("SELECT * FROM {} WHERE {}", self.table, self.filter)
    }

    /// Whether this predicate can never select a row.
    pub fn is_always_false(&self) -> bool {
        self.filter == ALWAYS_FALSE_FILTER
    }
}

impl fmt::Display for SourcePredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.query_text())
    }
}

/// Build the source filter selecting exactly the rows of `key`'s period.
///
/// `column` holds `yyyymmdd` integers; the key's own granularity decides the
/// truncation:
/// - Daily: `column = key`
/// - Monthly: `FLOOR(column / 100) = key`
/// - Yearly: `FLOOR(column / 10000) = key`
pub fn build_source_predicate(table: &str, column: &str, key: &PartitionKey) -> SourcePredicate {
    let filter = match key.granularity() {
        Granularity::Daily => format!("{} = {}", column, key.value()),
        granularity => format!(
            "FLOOR({} / {}) = {}",
            column,
            granularity.column_divisor(),
            key.value()
        ),
    };
    SourcePredicate {
        table: table.to_string(),
        filter,
    }
}

/// Predicate that leaves a partition empty; used for the template.
pub fn empty_source_predicate(table: &str) -> SourcePredicate {
    SourcePredicate {
        table: table.to_string(),
        filter: ALWAYS_FALSE_FILTER.to_string(),
    }
}
