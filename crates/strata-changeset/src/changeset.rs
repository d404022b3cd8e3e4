// changeset.rs — A named, ordered batch of staged model edits.
//
// Lifecycle:
//   staged ──commit──▶ committed   (terminal)
//     │
//     └──discard──▶ discarded      (terminal, changes cleared)
//
// Only `staged` changesets accept stage/unstage. Sequence numbers are kept
// dense (0..N-1) in stage order; removing changes reindexes the rest.

use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ChangesetError;

/// The kind of edit a staged change performs.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ChangeType {
    Add,
    Update,
    Delete,
}

impl fmt::Display for ChangeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChangeType::Add => write!(f, "add"),
            ChangeType::Update => write!(f, "update"),
            ChangeType::Delete => write!(f, "delete"),
        }
    }
}

/// Lifecycle status of a changeset.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ChangesetStatus {
    #[default]
    Staged,
    Committed,
    Discarded,
}

impl fmt::Display for ChangesetStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChangesetStatus::Staged => write!(f, "staged"),
            ChangesetStatus::Committed => write!(f, "committed"),
            ChangesetStatus::Discarded => write!(f, "discarded"),
        }
    }
}

/// One add/update/delete captured inside a changeset.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StagedChange {
    /// Position in stage order. Dense 0..N-1 within the owning changeset.
    pub sequence_number: usize,

    #[serde(rename = "type")]
    pub change_type: ChangeType,

    pub element_id: String,

    pub layer_name: String,

    /// Element fields before the change (absent for adds).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub before: Option<Map<String, Value>>,

    /// Element fields after the change (absent for deletes). For updates,
    /// only the fields being overridden need to be present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub after: Option<Map<String, Value>>,

    pub timestamp: DateTime<Utc>,
}

impl StagedChange {
    fn new(
        change_type: ChangeType,
        layer_name: impl Into<String>,
        element_id: impl Into<String>,
        before: Option<Map<String, Value>>,
        after: Option<Map<String, Value>>,
    ) -> Self {
        Self {
            sequence_number: 0,
            change_type,
            element_id: element_id.into(),
            layer_name: layer_name.into(),
            before,
            after,
            timestamp: Utc::now(),
        }
    }

    /// Stage a brand-new element. `after` holds its full field map.
    pub fn add(
        layer_name: impl Into<String>,
        element_id: impl Into<String>,
        after: Map<String, Value>,
    ) -> Self {
        Self::new(ChangeType::Add, layer_name, element_id, None, Some(after))
    }

    /// Stage a field-level update of an existing element.
    pub fn update(
        layer_name: impl Into<String>,
        element_id: impl Into<String>,
        before: Option<Map<String, Value>>,
        after: Map<String, Value>,
    ) -> Self {
        Self::new(ChangeType::Update, layer_name, element_id, before, Some(after))
    }

    /// Stage removal of an element.
    pub fn delete(
        layer_name: impl Into<String>,
        element_id: impl Into<String>,
        before: Option<Map<String, Value>>,
    ) -> Self {
        Self::new(ChangeType::Delete, layer_name, element_id, before, None)
    }
}

/// Derived counts of a changeset's changes by type.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct ChangesetStats {
    pub additions: usize,
    pub modifications: usize,
    pub deletions: usize,
}

impl ChangesetStats {
    pub fn from_changes(changes: &[StagedChange]) -> Self {
        let mut stats = Self::default();
        for change in changes {
            match change.change_type {
                ChangeType::Add => stats.additions += 1,
                ChangeType::Update => stats.modifications += 1,
                ChangeType::Delete => stats.deletions += 1,
            }
        }
        stats
    }

    pub fn total(&self) -> usize {
        self.additions + self.modifications + self.deletions
    }
}

/// A named batch of proposed edits against the base model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Changeset {
    /// Normalized id; also the store key.
    pub id: String,

    pub name: String,

    #[serde(default)]
    pub description: String,

    pub status: ChangesetStatus,

    /// Snapshot id of the base model when this changeset was created.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_snapshot: Option<String>,

    /// Staged changes in sequence order.
    #[serde(default)]
    pub changes: Vec<StagedChange>,

    #[serde(default)]
    pub stats: ChangesetStats,

    pub created_at: DateTime<Utc>,

    pub modified_at: DateTime<Utc>,
}

impl Changeset {
    /// Create a new, empty changeset in `staged` status.
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            name: name.into(),
            description: description.into(),
            status: ChangesetStatus::Staged,
            base_snapshot: None,
            changes: Vec::new(),
            stats: ChangesetStats::default(),
            created_at: now,
            modified_at: now,
        }
    }

    /// Set the base snapshot and return self (builder pattern).
    pub fn with_base_snapshot(mut self, snapshot: impl Into<String>) -> Self {
        self.base_snapshot = Some(snapshot.into());
        self
    }

    pub fn is_staged(&self) -> bool {
        self.status == ChangesetStatus::Staged
    }

    /// Fail unless the changeset is still `staged`.
    pub fn ensure_staged(&self, operation: &str) -> Result<(), ChangesetError> {
        if self.is_staged() {
            Ok(())
        } else {
            Err(ChangesetError::NotStaged {
                id: self.id.clone(),
                status: self.status,
                operation: operation.to_string(),
            })
        }
    }

    /// Append a change, assigning it the next sequence number.
    /// Returns a copy of the change as stored.
    pub fn push_change(&mut self, mut change: StagedChange) -> Result<StagedChange, ChangesetError> {
        self.ensure_staged("stage")?;
        change.sequence_number = self.changes.len();
        self.changes.push(change.clone());
        self.touch();
        Ok(change)
    }

    /// Remove every change that references `element_id` and reindex the rest
    /// to a dense 0..N-1 sequence. Returns the removed changes.
    pub fn remove_element(&mut self, element_id: &str) -> Result<Vec<StagedChange>, ChangesetError> {
        self.ensure_staged("unstage")?;
        let (removed, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut self.changes)
            .into_iter()
            .partition(|c| c.element_id == element_id);
        self.changes = kept;
        self.reindex();
        self.touch();
        Ok(removed)
    }

    /// Clear all changes and move to the terminal `discarded` status.
    pub fn discard(&mut self) {
        self.changes.clear();
        self.status = ChangesetStatus::Discarded;
        self.touch();
    }

    /// Move to the terminal `committed` status.
    pub fn mark_committed(&mut self) {
        self.status = ChangesetStatus::Committed;
        self.touch();
    }

    /// Force the changeset back to `staged` so it can intercept edits again.
    pub fn reopen(&mut self) {
        self.status = ChangesetStatus::Staged;
        self.touch();
    }

    /// Changes sorted by sequence number.
    pub fn ordered_changes(&self) -> Vec<&StagedChange> {
        let mut changes: Vec<&StagedChange> = self.changes.iter().collect();
        changes.sort_by_key(|c| c.sequence_number);
        changes
    }

    /// Changes touching one element, in stage order.
    pub fn changes_for_element(&self, element_id: &str) -> Vec<&StagedChange> {
        self.ordered_changes()
            .into_iter()
            .filter(|c| c.element_id == element_id)
            .collect()
    }

    /// Changes targeting one layer, in stage order.
    pub fn changes_for_layer(&self, layer_name: &str) -> Vec<&StagedChange> {
        self.ordered_changes()
            .into_iter()
            .filter(|c| c.layer_name == layer_name)
            .collect()
    }

    /// Layers that hold at least one change for `element_id`.
    pub fn layers_for_element(&self, element_id: &str) -> BTreeSet<String> {
        self.changes
            .iter()
            .filter(|c| c.element_id == element_id)
            .map(|c| c.layer_name.clone())
            .collect()
    }

    /// Every layer this changeset touches.
    pub fn touched_layers(&self) -> BTreeSet<String> {
        self.changes.iter().map(|c| c.layer_name.clone()).collect()
    }

    fn reindex(&mut self) {
        self.changes.sort_by_key(|c| c.sequence_number);
        for (i, change) in self.changes.iter_mut().enumerate() {
            change.sequence_number = i;
        }
    }

    fn touch(&mut self) {
        self.stats = ChangesetStats::from_changes(&self.changes);
        self.modified_at = Utc::now();
    }
}
