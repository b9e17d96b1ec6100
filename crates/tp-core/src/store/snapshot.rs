//! Serializable model state.
//!
//! The CLI persists the reference store as a JSON model file so that
//! consecutive runs operate on the same tables.

use serde::{Deserialize, Serialize};
use std::path::Path;
use tp_common::Result;

use super::PartitionState;
use crate::granularity::SourcePredicate;

/// Model schema version written by this build.
pub const MODEL_SCHEMA_VERSION: &str = "1.0.0";

fn default_model_version() -> String {
    MODEL_SCHEMA_VERSION.to_string()
}

/// A whole model: server, database and its tables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelSnapshot {
    #[serde(default = "default_model_version")]
    pub schema_version: String,
    pub server: String,
    pub database: String,
    #[serde(default)]
    pub tables: Vec<TableSnapshot>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSnapshot {
    pub name: String,
    #[serde(default)]
    pub partitions: Vec<PartitionSnapshot>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionSnapshot {
    pub name: String,
    #[serde(default = "default_state")]
    pub state: PartitionState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<SourcePredicate>,
}

fn default_state() -> PartitionState {
    PartitionState::NoData
}

impl ModelSnapshot {
    pub fn new(server: impl Into<String>, database: impl Into<String>) -> Self {
        ModelSnapshot {
            schema_version: default_model_version(),
            server: server.into(),
            database: database.into(),
            tables: Vec::new(),
        }
    }

    /// Add a table holding only its template partition.
    pub fn with_table(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        self.tables.push(TableSnapshot {
            partitions: vec![PartitionSnapshot::new(name.clone(), PartitionState::Ready)],
            name,
        });
        self
    }

    /// Add a table with its template and the given partitions, all ready.
    pub fn with_partitioned_table<I, S>(mut self, name: impl Into<String>, partitions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let name = name.into();
        let mut table = TableSnapshot {
            partitions: vec![PartitionSnapshot::new(name.clone(), PartitionState::Ready)],
            name,
        };
        table.partitions.extend(
            partitions
                .into_iter()
                .map(|p| PartitionSnapshot::new(p, PartitionState::Ready)),
        );
        self.tables.push(table);
        self
    }

    /// Add a table with no partitions at all, not even a template.
    pub fn with_bare_table(mut self, name: impl Into<String>) -> Self {
        self.tables.push(TableSnapshot {
            name: name.into(),
            partitions: Vec::new(),
        });
        self
    }

    pub fn table(&self, name: &str) -> Option<&TableSnapshot> {
        self.tables.iter().find(|t| t.name == name)
    }

    pub(crate) fn table_mut(&mut self, name: &str) -> Option<&mut TableSnapshot> {
        self.tables.iter_mut().find(|t| t.name == name)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    pub fn from_json(content: &str) -> Result<Self> {
        Ok(serde_json::from_str(content)?)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Write the snapshot, replacing the file atomically.
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = self.to_json()?;
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, path)?;
        Ok(())
    }
}

impl TableSnapshot {
    pub fn partition(&self, name: &str) -> Option<&PartitionSnapshot> {
        self.partitions.iter().find(|p| p.name == name)
    }

    pub(crate) fn partition_mut(&mut self, name: &str) -> Option<&mut PartitionSnapshot> {
        self.partitions.iter_mut().find(|p| p.name == name)
    }

    pub fn partition_names(&self) -> Vec<String> {
        self.partitions.iter().map(|p| p.name.clone()).collect()
    }
}

impl PartitionSnapshot {
    pub fn new(name: impl Into<String>, state: PartitionState) -> Self {
        PartitionSnapshot {
            name: name.into(),
            state,
            source: None,
        }
    }
}
