//! Partition set differ.
//!
//! Compares the partitions a table currently has against the rolling window
//! and decides which ones fall out of it. Only names that follow the naming
//! convention take part; everything else on the table is invisible here.

use serde::Serialize;
use tp_common::Granularity;

use crate::key::{parse_key, PartitionKey};

/// Keys of the partition names that follow the convention of `granularity`,
/// ascending and without duplicates.
pub fn classify_existing<I, S>(names: I, granularity: Granularity) -> Vec<PartitionKey>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut keys: Vec<PartitionKey> = names
        .into_iter()
        .filter_map(|name| parse_key(name.as_ref(), granularity).key())
        .collect();
    keys.sort();
    keys.dedup();
    keys
}

/// Existing keys strictly older than the oldest target key, ascending.
///
/// An empty target removes nothing. Keys newer than the window are kept.
pub fn compute_removals(existing: &[PartitionKey], target: &[PartitionKey]) -> Vec<PartitionKey> {
    let Some(oldest) = target.iter().min() else {
        return Vec::new();
    };
    let mut removals: Vec<PartitionKey> = existing.iter().filter(|k| *k < oldest).copied().collect();
    removals.sort();
    removals.dedup();
    removals
}

/// Full comparison of existing keys against a target window.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct WindowDiff {
    /// Existing keys older than the window.
    pub removals: Vec<PartitionKey>,
    /// Target keys with no partition yet.
    pub missing: Vec<PartitionKey>,
    /// Target keys that already have a partition.
    pub retained: Vec<PartitionKey>,
    /// Existing keys newer than the window. Left in place.
    pub beyond_window: Vec<PartitionKey>,
}

/// Diff `existing` against `target`; every output list is ascending.
pub fn diff_window(existing: &[PartitionKey], target: &[PartitionKey]) -> WindowDiff {
    let removals = compute_removals(existing, target);
    let newest = target.iter().max();

    let mut sorted_target = target.to_vec();
    sorted_target.sort();
    sorted_target.dedup();

    let (retained, missing): (Vec<PartitionKey>, Vec<PartitionKey>) = sorted_target
        .into_iter()
        .partition(|key| existing.contains(key));

    let mut beyond_window: Vec<PartitionKey> = match newest {
        Some(newest) => existing.iter().filter(|k| *k > newest).copied().collect(),
        None => Vec::new(),
    };
    beyond_window.sort();
    beyond_window.dedup();

    WindowDiff {
        removals,
        missing,
        retained,
        beyond_window,
    }
}
