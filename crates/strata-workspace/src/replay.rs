// replay.rs — Apply one staged change to a layer.
//
// Shared by the commit apply phase (against the live model) and the
// projection engine (against a cloned layer), so both see identical
// add/update/delete semantics.

use serde_json::Value;
use strata_changeset::{ChangeType, StagedChange};
use strata_model::{Element, Layer, ModelError};
use thiserror::Error;

/// Why a staged change could not be replayed.
#[derive(Debug, Error)]
pub enum ReplayError {
    #[error("layer '{0}' does not exist")]
    LayerNotFound(String),

    #[error("change for '{0}' carries no element fields")]
    MissingAfter(String),

    #[error("element '{0}' not found in layer")]
    TargetMissing(String),

    #[error(transparent)]
    InvalidElement(#[from] ModelError),
}

/// What a replayed change did to the layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplayOutcome {
    Added,
    Updated,
    Deleted,
    /// Nothing changed: an add of an existing id, or a delete of a missing one.
    Skipped,
}

impl ReplayOutcome {
    pub fn changed_layer(self) -> bool {
        !matches!(self, ReplayOutcome::Skipped)
    }
}

/// Replay `change` against `layer`.
///
/// - add: skipped if the id is already present, otherwise the element is
///   built from `after` (the change's element id wins over any `id` field)
/// - update: `after` is merged onto the live element, properties key by key
/// - delete: removes the element if present
pub fn replay_change(layer: &mut Layer, change: &StagedChange) -> Result<ReplayOutcome, ReplayError> {
    let id = &change.element_id;
    match change.change_type {
        ChangeType::Add => {
            if layer.contains(id) {
                tracing::debug!("add of '{}' skipped: already present in '{}'", id, layer.name);
                return Ok(ReplayOutcome::Skipped);
            }
            let mut fields = change
                .after
                .clone()
                .ok_or_else(|| ReplayError::MissingAfter(id.clone()))?;
            fields.insert("id".to_string(), Value::String(id.clone()));
            let element = Element::from_fields(fields)?;
            layer.add_element(element);
            Ok(ReplayOutcome::Added)
        }
        ChangeType::Update => {
            let after = change
                .after
                .as_ref()
                .ok_or_else(|| ReplayError::MissingAfter(id.clone()))?;
            let current = layer
                .element(id)
                .ok_or_else(|| ReplayError::TargetMissing(id.clone()))?;
            let merged = current.merge_fields(after)?;
            layer.replace_element(merged);
            Ok(ReplayOutcome::Updated)
        }
        ChangeType::Delete => Ok(match layer.remove_element(id) {
            Some(_) => ReplayOutcome::Deleted,
            None => ReplayOutcome::Skipped,
        }),
    }
}
