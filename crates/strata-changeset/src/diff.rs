// diff.rs — Classify a changeset's raw change list for display.
//
// Classification looks only at the stored before/after snapshots of each
// change. No element is compared against the live model.

use serde::{Deserialize, Serialize};

use crate::changeset::{ChangeType, Changeset, StagedChange};

/// A changeset's changes bucketed into additions, modifications, deletions.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ChangesetDiff {
    pub changeset_id: String,
    pub additions: Vec<StagedChange>,
    pub modifications: Vec<StagedChange>,
    pub deletions: Vec<StagedChange>,
}

impl ChangesetDiff {
    /// Bucket every change of `changeset`, in sequence order.
    ///
    /// `after` only ⇒ addition, `before` only ⇒ deletion, both ⇒
    /// modification. A change with neither snapshot falls back to its
    /// declared type.
    pub fn classify(changeset: &Changeset) -> Self {
        let mut diff = Self {
            changeset_id: changeset.id.clone(),
            ..Self::default()
        };

        for change in changeset.ordered_changes() {
            let bucket = match (&change.before, &change.after) {
                (None, Some(_)) => ChangeType::Add,
                (Some(_), None) => ChangeType::Delete,
                (Some(_), Some(_)) => ChangeType::Update,
                (None, None) => change.change_type,
            };
            let target = match bucket {
                ChangeType::Add => &mut diff.additions,
                ChangeType::Update => &mut diff.modifications,
                ChangeType::Delete => &mut diff.deletions,
            };
            target.push(change.clone());
        }

        diff
    }

    pub fn is_empty(&self) -> bool {
        self.additions.is_empty() && self.modifications.is_empty() && self.deletions.is_empty()
    }
}
