// projection.rs — Virtual "base model + changeset" views.
//
// A projection is what the model would look like if a changeset were
// committed right now. It is computed by cloning base layers and replaying
// the changeset's staged changes with the same semantics the commit apply
// phase uses. Projections are never persisted.
//
// Projected layers are cached per (changeset id, layer name). An entry is
// served only while it is younger than the TTL; expired entries are swept
// opportunistically, at most once per sweep interval. Callers must
// invalidate on stage, unstage, discard, commit, and rollback.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use strata_changeset::{ChangeType, Changeset, ChangesetDiff};
use strata_model::{Element, Layer, Model, ModelError};

use crate::config::CacheConfig;
use crate::replay::replay_change;

/// Hit/miss counters for the projection cache.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
}

struct CacheEntry {
    layer: Arc<Layer>,
    computed_at: Instant,
}

/// A computed model view for one changeset. Never persistable.
#[derive(Debug, Clone)]
pub struct ProjectedModel {
    pub changeset_id: String,
    layers: BTreeMap<String, Arc<Layer>>,
    order: Vec<String>,
}

impl ProjectedModel {
    /// Layer names: base layers in model order, then layers only the
    /// changeset mentions.
    pub fn layer_names(&self) -> &[String] {
        &self.order
    }

    pub fn layer(&self, name: &str) -> Option<&Layer> {
        self.layers.get(name).map(|l| l.as_ref())
    }

    /// Layers in `layer_names()` order.
    pub fn layers(&self) -> impl Iterator<Item = &Layer> {
        self.order
            .iter()
            .filter_map(move |name| self.layers.get(name).map(|l| l.as_ref()))
    }

    pub fn element_by_id(&self, id: &str) -> Option<(&Layer, &Element)> {
        self.layers()
            .find_map(|layer| layer.element(id).map(|element| (layer, element)))
    }

    pub fn is_persistable(&self) -> bool {
        false
    }
}

/// Computes and caches projections.
pub struct ProjectionEngine {
    ttl: Duration,
    sweep_interval: Duration,
    cache: HashMap<(String, String), CacheEntry>,
    last_sweep: Instant,
    hits: u64,
    misses: u64,
}

impl ProjectionEngine {
    pub fn new(config: &CacheConfig) -> Self {
        Self::with_ttl(config.ttl(), config.sweep_interval())
    }

    pub fn with_ttl(ttl: Duration, sweep_interval: Duration) -> Self {
        Self {
            ttl,
            sweep_interval,
            cache: HashMap::new(),
            last_sweep: Instant::now(),
            hits: 0,
            misses: 0,
        }
    }

    /// Project one layer of the model through `changeset`.
    ///
    /// A layer the base model does not have starts out empty, so adds into
    /// it still show up. Changes that cannot be replayed are skipped.
    pub fn project_layer(&mut self, model: &dyn Model, changeset: &Changeset, layer_name: &str) -> Arc<Layer> {
        self.maybe_sweep();

        let key = (changeset.id.clone(), layer_name.to_string());
        if let Some(entry) = self.cache.get(&key) {
            if entry.computed_at.elapsed() < self.ttl {
                self.hits += 1;
                return Arc::clone(&entry.layer);
            }
        }
        self.misses += 1;

        let mut layer = match model.layer(layer_name) {
            Some(base) => base.clean_clone(),
            None => Layer::new(layer_name),
        };
        for change in changeset.changes_for_layer(layer_name) {
            if let Err(e) = replay_change(&mut layer, change) {
                tracing::debug!(
                    "projection of '{}' skips change #{} for '{}': {}",
                    changeset.id,
                    change.sequence_number,
                    change.element_id,
                    e
                );
            }
        }
        layer.mark_clean();

        let layer = Arc::new(layer);
        self.cache.insert(
            key,
            CacheEntry {
                layer: Arc::clone(&layer),
                computed_at: Instant::now(),
            },
        );
        layer
    }

    /// Project a single element through `changeset`.
    ///
    /// Only the last staged change for the element counts: a delete yields
    /// `None`, an add or update merges its `after` fields onto the base
    /// element (properties key by key), or builds the element from `after`
    /// when there is no base. With no staged changes the base element
    /// passes through unchanged.
    pub fn project_element(
        &self,
        model: &dyn Model,
        changeset: &Changeset,
        element_id: &str,
    ) -> Result<Option<Element>, ModelError> {
        let base = model.element_by_id(element_id).map(|(_, e)| e.clone());
        let Some(last) = changeset.changes_for_element(element_id).into_iter().last() else {
            return Ok(base);
        };

        match (last.change_type, &last.after, base) {
            (ChangeType::Delete, _, _) => Ok(None),
            (_, None, base) => Ok(base),
            (_, Some(after), Some(base)) => Ok(Some(base.merge_fields(after)?)),
            (_, Some(after), None) => {
                let mut fields = after.clone();
                fields.insert(
                    "id".to_string(),
                    serde_json::Value::String(element_id.to_string()),
                );
                Ok(Some(Element::from_fields(fields)?))
            }
        }
    }

    /// Project every layer: all base layers plus any layer the changeset
    /// touches that the base model lacks.
    pub fn project_model(&mut self, model: &dyn Model, changeset: &Changeset) -> ProjectedModel {
        let mut order = model.layer_names();
        for name in changeset.touched_layers() {
            if !order.contains(&name) {
                order.push(name);
            }
        }

        let layers = order
            .iter()
            .map(|name| (name.clone(), self.project_layer(model, changeset, name)))
            .collect();

        ProjectedModel {
            changeset_id: changeset.id.clone(),
            layers,
            order,
        }
    }

    /// Bucket the changeset's changes by their stored snapshots.
    pub fn compute_diff(&self, changeset: &Changeset) -> ChangesetDiff {
        ChangesetDiff::classify(changeset)
    }

    /// Drop one layer's entry, or every entry of the changeset when `layer`
    /// is `None`.
    pub fn invalidate(&mut self, changeset_id: &str, layer: Option<&str>) {
        match layer {
            Some(layer) => {
                self.cache
                    .remove(&(changeset_id.to_string(), layer.to_string()));
            }
            None => self.invalidate_changeset(changeset_id),
        }
    }

    pub fn invalidate_layers<I, S>(&mut self, changeset_id: &str, layers: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for layer in layers {
            self.invalidate(changeset_id, Some(layer.as_ref()));
        }
    }

    pub fn invalidate_changeset(&mut self, changeset_id: &str) {
        self.cache.retain(|(id, _), _| id != changeset_id);
    }

    /// Drop everything. Used after the base model itself changes.
    pub fn invalidate_all(&mut self) {
        self.cache.clear();
    }

    /// Invalidate the layers that held changes for `element_id`.
    ///
    /// `changeset` is the record as it was before the element was unstaged.
    /// When it could not be loaded there is nothing to go on, and nothing
    /// is invalidated.
    pub fn on_unstage(&mut self, changeset: Option<&Changeset>, element_id: &str) {
        let Some(changeset) = changeset else {
            tracing::debug!("unstage of '{}': changeset unreadable, cache left as is", element_id);
            return;
        };
        let layers = changeset.layers_for_element(element_id);
        self.invalidate_layers(&changeset.id, &layers);
    }

    pub fn cache_stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits,
            misses: self.misses,
            entries: self.cache.len(),
        }
    }

    fn maybe_sweep(&mut self) {
        if self.last_sweep.elapsed() < self.sweep_interval {
            return;
        }
        let ttl = self.ttl;
        let before = self.cache.len();
        self.cache.retain(|_, entry| entry.computed_at.elapsed() < ttl);
        self.last_sweep = Instant::now();
        let swept = before - self.cache.len();
        if swept > 0 {
            tracing::debug!("swept {} expired projection(s)", swept);
        }
    }
}
