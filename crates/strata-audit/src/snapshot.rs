// snapshot.rs — Whole-model content hashing.
//
// A snapshot id is the SHA-256 of a canonical JSON rendering of the model:
// the manifest (minus its changeset history, which is an audit trail rather
// than model content) plus every layer in manifest order. serde_json's
// default map is sorted, so the rendering is deterministic.
//
// Resolution is whole-model only: two snapshots either match or they don't.
// Nothing here can say which element changed.

use serde_json::{json, Value};
use strata_model::Model;

use crate::error::AuditError;
use crate::hasher;

/// Computes a content hash of an entire model.
///
/// A trait so the staging engine can be handed a different hashing strategy
/// at construction time.
pub trait SnapshotHasher {
    fn capture_snapshot(&self, model: &dyn Model) -> Result<String, AuditError>;
}

/// Default hasher: SHA-256 over the canonical JSON form of the model.
#[derive(Debug, Clone, Copy, Default)]
pub struct ModelHasher;

impl SnapshotHasher for ModelHasher {
    fn capture_snapshot(&self, model: &dyn Model) -> Result<String, AuditError> {
        let mut manifest = serde_json::to_value(model.manifest())?;
        if let Value::Object(map) = &mut manifest {
            map.remove("changeset_history");
        }

        let layers = model
            .layers()
            .into_iter()
            .map(serde_json::to_value)
            .collect::<Result<Vec<Value>, _>>()?;

        let canonical = json!({ "manifest": manifest, "layers": layers });
        Ok(hasher::hash_bytes(&serde_json::to_vec(&canonical)?))
    }
}
