// manifest.rs — The model manifest: layer list plus changeset history.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// What happened to a changeset recorded in the history.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum HistoryAction {
    Applied,
}

/// One entry of the append-only `changeset_history`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChangesetHistoryEntry {
    /// Changeset name (not id) at the time it was applied.
    pub name: String,
    pub applied_at: DateTime<Utc>,
    pub action: HistoryAction,
}

impl ChangesetHistoryEntry {
    pub fn applied(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            applied_at: Utc::now(),
            action: HistoryAction::Applied,
        }
    }
}

/// Contents of `manifest.yaml`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModelManifest {
    pub name: String,

    #[serde(default)]
    pub version: String,

    /// Layer names in display order.
    #[serde(default)]
    pub layers: Vec<String>,

    /// Append-only record of committed changesets.
    #[serde(default)]
    pub changeset_history: Vec<ChangesetHistoryEntry>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ModelManifest {
    pub fn new(name: impl Into<String>, layers: Vec<String>) -> Self {
        Self {
            name: name.into(),
            version: "1.0.0".to_string(),
            layers,
            changeset_history: Vec::new(),
            extra: Map::new(),
        }
    }

    pub fn record_applied(&mut self, changeset_name: impl Into<String>) {
        self.changeset_history
            .push(ChangesetHistoryEntry::applied(changeset_name));
    }
}
