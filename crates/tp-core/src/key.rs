//! Partition keys and the partition naming convention.
//!
//! A period partition is named by its canonical key: the period's calendar
//! value written as a zero-padded integer of the granularity's width
//! (`yyyy`, `yyyymm`, `yyyymmdd`). Because the width is fixed, numeric and
//! lexical ordering of canonical keys agree.
//!
//! [`parse_key`] is the single place that decides whether a store partition
//! name follows the convention.

use chrono::{Datelike, NaiveDate};
use serde::{Serialize, Serializer};
use std::fmt;
use tp_common::{FormatError, Granularity};

/// Integer-valued period identifier of a given granularity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PartitionKey {
    granularity: Granularity,
    value: u32,
}

impl PartitionKey {
    /// Key of the period containing `date`.
    ///
    /// Fails for years outside `1..=9999`, which have no fixed-width key.
    pub fn from_date(date: NaiveDate, granularity: Granularity) -> Result<Self, FormatError> {
        let year = date.year();
        if !(1..=9999).contains(&year) {
            return Err(FormatError::OutOfRange {
                anchor: date.to_string(),
                steps: 0,
                unit: granularity.step_unit(),
            });
        }
        let year = year as u32;
        let value = match granularity {
            Granularity::Yearly => year,
            Granularity::Monthly => year * 100 + date.month(),
            Granularity::Daily => year * 10_000 + date.month() * 100 + date.day(),
        };
        Ok(PartitionKey { granularity, value })
    }

    pub fn granularity(&self) -> Granularity {
        self.granularity
    }

    /// Integer value of the key, e.g. `202403`.
    pub fn value(&self) -> u32 {
        self.value
    }

    /// Canonical partition name, zero-padded to the granularity width.
    pub fn canonical(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for PartitionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:0width$}",
            self.value,
            width = self.granularity.key_width()
        )
    }
}

impl Serialize for PartitionKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Outcome of matching a store partition name against the naming convention.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyMatch {
    /// The name is a canonical key of the requested granularity.
    Matched(PartitionKey),
    /// The name belongs to something else (template, other granularity,
    /// hand-made partition) and must be left alone.
    Ignored,
}

impl KeyMatch {
    pub fn key(self) -> Option<PartitionKey> {
        match self {
            KeyMatch::Matched(key) => Some(key),
            KeyMatch::Ignored => None,
        }
    }
}

/// Match a partition name against the naming convention of `granularity`.
///
/// A name matches when it has exactly the granularity's width and consists
/// of ASCII digits only. Calendar validity is not checked: `"202413"` is a
/// well-formed monthly key as far as the convention goes. Names shorter than
/// the width are ignored rather than padded.
pub fn parse_key(name: &str, granularity: Granularity) -> KeyMatch {
    if name.len() != granularity.key_width() || !name.bytes().all(|b| b.is_ascii_digit()) {
        return KeyMatch::Ignored;
    }
    match name.parse::<u32>() {
        Ok(value) => KeyMatch::Matched(PartitionKey { granularity, value }),
        Err(_) => KeyMatch::Ignored,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_from_date_per_granularity() {
        let d = date(2024, 3, 7);
        assert_eq!(
            PartitionKey::from_date(d, Granularity::Yearly).unwrap().canonical(),
            "2024"
        );
        assert_eq!(
            PartitionKey::from_date(d, Granularity::Monthly).unwrap().canonical(),
            "202403"
        );
        assert_eq!(
            PartitionKey::from_date(d, Granularity::Daily).unwrap().canonical(),
            "20240307"
        );
    }

    #[test]
    fn test_early_years_are_zero_padded() {
        let key = PartitionKey::from_date(date(987, 1, 2), Granularity::Daily).unwrap();
        assert_eq!(key.canonical(), "09870102");
        assert_eq!(parse_key("09870102", Granularity::Daily), KeyMatch::Matched(key));
    }

    #[test]
    fn test_year_zero_rejected() {
        let err = PartitionKey::from_date(date(0, 12, 31), Granularity::Yearly).unwrap_err();
        assert!(matches!(err, FormatError::OutOfRange { .. }));
    }

    #[test]
    fn test_parse_key_matches_convention() {
        let key = parse_key("202401", Granularity::Monthly).key().unwrap();
        assert_eq!(key.value(), 202401);
        assert_eq!(key.granularity(), Granularity::Monthly);
    }

    #[test]
    fn test_parse_key_ignores_other_names() {
        assert_eq!(parse_key("Internet Sales", Granularity::Monthly), KeyMatch::Ignored);
        assert_eq!(parse_key("2024", Granularity::Monthly), KeyMatch::Ignored);
        assert_eq!(parse_key("20240101", Granularity::Monthly), KeyMatch::Ignored);
        assert_eq!(parse_key("2024-1", Granularity::Monthly), KeyMatch::Ignored);
        assert_eq!(parse_key("+20401", Granularity::Monthly), KeyMatch::Ignored);
        assert_eq!(parse_key(" 2024", Granularity::Yearly), KeyMatch::Ignored);
        assert_eq!(parse_key("", Granularity::Yearly), KeyMatch::Ignored);
    }

    #[test]
    fn test_parse_key_does_not_check_calendar() {
        assert!(parse_key("202413", Granularity::Monthly).key().is_some());
    }

    #[test]
    fn test_ordering_matches_lexical_order() {
        let mut keys: Vec<PartitionKey> = ["20240201", "20231231", "20240115"]
            .iter()
            .filter_map(|n| parse_key(n, Granularity::Daily).key())
            .collect();
        keys.sort();
        let names: Vec<String> = keys.iter().map(|k| k.canonical()).collect();
        let mut lexical = names.clone();
        lexical.sort();
        assert_eq!(names, lexical);
    }

    #[test]
    fn test_serializes_as_canonical_string() {
        let key = parse_key("0999", Granularity::Yearly).key().unwrap();
        assert_eq!(serde_json::to_string(&key).unwrap(), "\"0999\"");
    }
}
