// drift.rs — Base-model drift between a changeset and the live model.
//
// When a changeset is created we record the model's snapshot id. Before
// committing, the current snapshot is recomputed and compared. Any
// difference means someone changed the base model underneath the
// changeset, and the staged before-snapshots may no longer be accurate.

use serde::{Deserialize, Serialize};

/// Result of comparing a stored base snapshot against the current model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DriftReport {
    pub is_drifted: bool,

    /// Snapshot id stored on the changeset, if one was captured.
    pub base_snapshot_id: Option<String>,

    /// Snapshot id of the model right now.
    pub current_snapshot_id: String,

    /// Human-readable notes (e.g., why drift could not be evaluated).
    pub warnings: Vec<String>,
}

impl DriftReport {
    /// Compare a stored base snapshot against the current one.
    ///
    /// A missing base snapshot is not an error: the report says "not
    /// drifted" and carries a warning explaining why.
    pub fn compare(base_snapshot_id: Option<&str>, current_snapshot_id: String) -> Self {
        match base_snapshot_id {
            None => Self {
                is_drifted: false,
                base_snapshot_id: None,
                current_snapshot_id,
                warnings: vec![
                    "No base snapshot recorded for this changeset; drift cannot be detected"
                        .to_string(),
                ],
            },
            Some(base) => {
                let is_drifted = base != current_snapshot_id;
                let mut warnings = Vec::new();
                if is_drifted {
                    warnings.push(format!(
                        "Base model has changed since the changeset was created \
                         (snapshot {} -> {})",
                        short(base),
                        short(&current_snapshot_id)
                    ));
                }
                Self {
                    is_drifted,
                    base_snapshot_id: Some(base.to_string()),
                    current_snapshot_id,
                    warnings,
                }
            }
        }
    }
}

fn short(hash: &str) -> &str {
    hash.get(..12).unwrap_or(hash)
}
