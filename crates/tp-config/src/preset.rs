//! Processing mode presets.
//!
//! A preset overrides the processing flags of a run configuration so the same
//! file can drive a one-off backfill and the scheduled incremental runs.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::RunConfiguration;

/// Available mode presets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ModePreset {
    /// Bulk historical backfill, one partition per commit.
    Initial,
    /// Incremental window with Full refreshes; model stays queryable.
    IncrementalOnline,
    /// Incremental window with DataOnly refreshes and a final recalculation.
    IncrementalOffline,
}

impl ModePreset {
    /// All available presets.
    pub const ALL: &'static [ModePreset] = &[
        ModePreset::Initial,
        ModePreset::IncrementalOnline,
        ModePreset::IncrementalOffline,
    ];

    /// Get preset name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            ModePreset::Initial => "initial",
            ModePreset::IncrementalOnline => "incremental-online",
            ModePreset::IncrementalOffline => "incremental-offline",
        }
    }

    /// Parse preset name from string.
    pub fn parse(s: &str) -> Option<ModePreset> {
        match s.to_lowercase().as_str() {
            "initial" | "initial-setup" | "backfill" => Some(ModePreset::Initial),
            "incremental-online" | "online" | "incremental" => Some(ModePreset::IncrementalOnline),
            "incremental-offline" | "offline" => Some(ModePreset::IncrementalOffline),
            _ => None,
        }
    }

    /// Get a description of the preset.
    pub fn description(&self) -> &'static str {
        match self {
            ModePreset::Initial => {
                "Create and load every partition of the full window, committing each one"
            }
            ModePreset::IncrementalOnline => {
                "Roll the window and fully refresh the most recent partitions"
            }
            ModePreset::IncrementalOffline => {
                "Roll the window, load data only, then recalculate the model once"
            }
        }
    }

    /// Override the processing flags of `config`.
    ///
    /// `incremental_parallel_tables` is left as configured.
    pub fn apply(&self, config: &mut RunConfiguration) {
        match self {
            ModePreset::Initial => {
                config.initial_setup = true;
            }
            ModePreset::IncrementalOnline => {
                config.initial_setup = false;
                config.incremental_online = true;
            }
            ModePreset::IncrementalOffline => {
                config.initial_setup = false;
                config.incremental_online = false;
            }
        }
    }
}

impl fmt::Display for ModePreset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for ModePreset {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ModePreset::parse(s).ok_or_else(|| {
            format!(
                "unknown mode preset: {} (expected one of: initial, incremental-online, incremental-offline)",
                s
            )
        })
    }
}
