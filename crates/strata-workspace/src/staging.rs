// staging.rs — The staging area: changeset lifecycle over one model.
//
// `StagingArea` ties the pieces together: the changeset store and active
// marker, snapshot hashing for drift detection, the projection engine, and
// the backup manager the commit protocol relies on (see commit.rs and
// rollback.rs). Collaborators are injected at construction; nothing is
// looked up lazily.

use std::path::Path;
use std::sync::Arc;

use strata_audit::{DriftReport, ModelHasher, SnapshotHasher};
use strata_changeset::{normalize_id, validate_id, Changeset, ChangesetDiff, ChangesetStatus, StagedChange};
use strata_model::{Element, Layer, Model};
use uuid::Uuid;

use crate::backup::{BackupManager, IntegrityReport};
use crate::config::StagingConfig;
use crate::error::StagingError;
use crate::observer::{CommitObserver, NoopObserver};
use crate::projection::{ProjectedModel, ProjectionEngine};
use crate::store::ChangesetStore;
use crate::validator::{StructuralValidator, Validator};

/// Manages changesets staged against a single model.
pub struct StagingArea<M: Model> {
    pub(crate) model: M,
    pub(crate) config: StagingConfig,
    pub(crate) store: ChangesetStore,
    pub(crate) backups: BackupManager,
    pub(crate) projection: ProjectionEngine,
    pub(crate) hasher: Box<dyn SnapshotHasher>,
    pub(crate) validator: Box<dyn Validator>,
    pub(crate) observer: Box<dyn CommitObserver>,
}

impl<M: Model> StagingArea<M> {
    /// Create a staging area with the given configuration.
    pub fn new(model: M, config: StagingConfig) -> Result<Self, StagingError> {
        let store = ChangesetStore::new(&config.changesets_dir)?;
        let backups = BackupManager::new(&config.backups_dir);
        let projection = ProjectionEngine::new(&config.cache);
        Ok(Self {
            model,
            config,
            store,
            backups,
            projection,
            hasher: Box::new(ModelHasher),
            validator: Box::new(StructuralValidator),
            observer: Box::new(NoopObserver),
        })
    }

    /// Create a staging area using `<root>/.strata/config.toml` if present.
    pub fn open(model: M) -> Result<Self, StagingError> {
        let config = StagingConfig::load_or_default(model.root_path());
        Self::new(model, config)
    }

    pub fn with_validator(mut self, validator: impl Validator + 'static) -> Self {
        self.validator = Box::new(validator);
        self
    }

    pub fn with_hasher(mut self, hasher: impl SnapshotHasher + 'static) -> Self {
        self.hasher = Box::new(hasher);
        self
    }

    pub fn with_observer(mut self, observer: impl CommitObserver + 'static) -> Self {
        self.observer = Box::new(observer);
        self
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    /// Direct access to the base model. Edits made here are not staged;
    /// they show up as drift for existing changesets.
    pub fn model_mut(&mut self) -> &mut M {
        self.projection.invalidate_all();
        &mut self.model
    }

    pub fn into_model(self) -> M {
        self.model
    }

    pub fn config(&self) -> &StagingConfig {
        &self.config
    }

    pub fn store(&self) -> &ChangesetStore {
        &self.store
    }

    pub fn backups(&self) -> &BackupManager {
        &self.backups
    }

    pub fn projection(&self) -> &ProjectionEngine {
        &self.projection
    }

    // ── Changeset store ────────────────────────────────────────

    /// Create a new `staged` changeset with the current model as its base.
    ///
    /// The id is derived from the name; if it is already taken, a short
    /// random suffix is appended.
    pub fn create(&mut self, name: &str, description: &str) -> Result<Changeset, StagingError> {
        let mut id = normalize_id(name);
        if id.is_empty() {
            id = "changeset".to_string();
        }
        if self.store.exists(&id)? {
            let suffix = Uuid::new_v4().simple().to_string();
            id = format!("{}-{}", id, &suffix[..8]);
        }
        validate_id(&id)?;

        let snapshot = self.hasher.capture_snapshot(&self.model)?;
        let changeset = Changeset::new(id, name, description).with_base_snapshot(snapshot);
        self.store.save(&changeset)?;

        tracing::info!("created changeset '{}' ({})", changeset.id, changeset.name);
        Ok(changeset)
    }

    /// Load by id, falling back to a search by name.
    pub fn load(&self, name_or_id: &str) -> Result<Changeset, StagingError> {
        if validate_id(name_or_id).is_ok() {
            if let Some(changeset) = self.store.get(name_or_id)? {
                return Ok(changeset);
            }
        }
        self.store
            .find_by_name(name_or_id)?
            .ok_or_else(|| StagingError::NotFound(name_or_id.to_string()))
    }

    /// All changesets, newest first.
    pub fn list(&self) -> Result<Vec<Changeset>, StagingError> {
        self.store.list()
    }

    /// Delete a changeset, clearing the active marker first if it points here.
    pub fn delete(&mut self, id: &str) -> Result<(), StagingError> {
        self.get_existing(id)?;
        if self.store.active_id()?.as_deref() == Some(id) {
            self.store.clear_active_id()?;
            tracing::info!("cleared active marker for deleted changeset '{}'", id);
        }
        self.store.remove(id)?;
        self.projection.invalidate_changeset(id);
        tracing::info!("deleted changeset '{}'", id);
        Ok(())
    }

    // ── Staging ────────────────────────────────────────────────

    /// Append a change to a `staged` changeset. Returns the change as stored,
    /// with its sequence number assigned.
    pub fn stage(&mut self, id: &str, change: StagedChange) -> Result<StagedChange, StagingError> {
        let mut changeset = self.get_existing(id)?;
        let stored = changeset.push_change(change)?;
        self.store.save(&changeset)?;
        self.projection.invalidate(id, Some(&stored.layer_name));

        tracing::debug!(
            "staged #{} {} '{}' in '{}' on changeset '{}'",
            stored.sequence_number,
            stored.change_type,
            stored.element_id,
            stored.layer_name,
            id
        );
        Ok(stored)
    }

    /// Remove every change for `element_id`. Remaining changes are
    /// renumbered densely. Returns the removed changes.
    pub fn unstage(&mut self, id: &str, element_id: &str) -> Result<Vec<StagedChange>, StagingError> {
        let mut changeset = self.get_existing(id)?;
        let previous = changeset.clone();
        let removed = changeset.remove_element(element_id)?;
        self.store.save(&changeset)?;
        self.projection.on_unstage(Some(&previous), element_id);

        tracing::debug!(
            "unstaged {} change(s) for '{}' from changeset '{}'",
            removed.len(),
            element_id,
            id
        );
        Ok(removed)
    }

    /// Drop every change and mark the changeset `discarded`. Irreversible.
    /// A committed changeset cannot be discarded.
    pub fn discard(&mut self, id: &str) -> Result<Changeset, StagingError> {
        let mut changeset = self.get_existing(id)?;
        if changeset.status == ChangesetStatus::Committed {
            return Err(StagingError::InvalidState {
                id: id.to_string(),
                status: changeset.status,
                operation: "discard".to_string(),
            });
        }
        changeset.discard();
        self.store.save(&changeset)?;
        self.projection.invalidate_changeset(id);

        tracing::info!("discarded changeset '{}'", id);
        Ok(changeset)
    }

    /// Alias of [`discard`](Self::discard).
    pub fn revert(&mut self, id: &str) -> Result<Changeset, StagingError> {
        self.discard(id)
    }

    // ── Active marker ──────────────────────────────────────────

    /// Mark a changeset active. A committed or discarded changeset is moved
    /// back to `staged` so it can intercept edits again.
    pub fn set_active(&mut self, id: &str) -> Result<Changeset, StagingError> {
        let mut changeset = self.get_existing(id)?;
        if !changeset.is_staged() {
            tracing::warn!(
                "reopening {} changeset '{}' as staged to make it active",
                changeset.status,
                id
            );
            changeset.reopen();
            self.store.save(&changeset)?;
        }
        self.store.set_active_id(id)?;
        tracing::info!("active changeset is now '{}'", id);
        Ok(changeset)
    }

    pub fn clear_active(&mut self) -> Result<(), StagingError> {
        self.store.clear_active_id()
    }

    /// The active changeset, if the marker is set and its record exists.
    pub fn get_active(&self) -> Result<Option<Changeset>, StagingError> {
        let Some(id) = self.store.active_id()? else {
            return Ok(None);
        };
        let changeset = self.store.get(&id)?;
        if changeset.is_none() {
            tracing::warn!("active marker points at missing changeset '{}'", id);
        }
        Ok(changeset)
    }

    pub fn get_active_id(&self) -> Result<Option<String>, StagingError> {
        self.store.active_id()
    }

    // ── Drift ──────────────────────────────────────────────────

    /// Compare the changeset's base snapshot against the current model.
    pub fn detect_drift(&self, id: &str) -> Result<DriftReport, StagingError> {
        let changeset = self.get_existing(id)?;
        let current = self.hasher.capture_snapshot(&self.model)?;
        Ok(DriftReport::compare(changeset.base_snapshot.as_deref(), current))
    }

    /// Record the current model as the changeset's base. Returns the hash.
    pub fn capture_base_snapshot(&mut self, id: &str) -> Result<String, StagingError> {
        let mut changeset = self.get_existing(id)?;
        let snapshot = self.hasher.capture_snapshot(&self.model)?;
        changeset.base_snapshot = Some(snapshot.clone());
        self.store.save(&changeset)?;
        tracing::info!("captured base snapshot for '{}': {}", id, snapshot);
        Ok(snapshot)
    }

    // ── Backups ────────────────────────────────────────────────

    pub fn validate_backup_integrity(&self, backup_dir: impl AsRef<Path>) -> Result<IntegrityReport, StagingError> {
        Ok(self.backups.verify(backup_dir.as_ref())?)
    }

    // ── Projection ─────────────────────────────────────────────

    pub fn preview_model(&mut self, id: &str) -> Result<ProjectedModel, StagingError> {
        let changeset = self.get_existing(id)?;
        Ok(self.projection.project_model(&self.model, &changeset))
    }

    pub fn preview_layer(&mut self, id: &str, layer: &str) -> Result<Arc<Layer>, StagingError> {
        let changeset = self.get_existing(id)?;
        Ok(self.projection.project_layer(&self.model, &changeset, layer))
    }

    pub fn preview_element(&self, id: &str, element_id: &str) -> Result<Option<Element>, StagingError> {
        let changeset = self.get_existing(id)?;
        Ok(self.projection.project_element(&self.model, &changeset, element_id)?)
    }

    pub fn diff(&self, id: &str) -> Result<ChangesetDiff, StagingError> {
        let changeset = self.get_existing(id)?;
        Ok(self.projection.compute_diff(&changeset))
    }

    /// Load by strict id: validated first, `NotFound` if absent.
    pub(crate) fn get_existing(&self, id: &str) -> Result<Changeset, StagingError> {
        validate_id(id)?;
        self.store
            .get(id)?
            .ok_or_else(|| StagingError::NotFound(id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Map, Value};
    use strata_model::FileModel;
    use tempfile::{tempdir, TempDir};

    fn fields(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    fn area() -> (TempDir, StagingArea<FileModel>) {
        let dir = tempdir().unwrap();
        let mut model = FileModel::init(dir.path(), "demo", &["business", "application"]).unwrap();
        model
            .layer_mut("business")
            .unwrap()
            .add_element(Element::new("customer", "actor", "Customer"));
        model.save_layer("business").unwrap();
        let config = StagingConfig::for_model(dir.path());
        let area = StagingArea::new(model, config).unwrap();
        (dir, area)
    }

    fn add(layer: &str, id: &str) -> StagedChange {
        StagedChange::add(layer, id, fields(json!({ "type": "service", "name": id })))
    }

    #[test]
    fn create_normalizes_and_deduplicates_ids() {
        let (_dir, mut area) = area();
        let first = area.create("Add Payments", "").unwrap();
        assert_eq!(first.id, "add-payments");
        assert!(first.base_snapshot.is_some());
        assert_eq!(first.status, ChangesetStatus::Staged);

        let second = area.create("Add Payments", "again").unwrap();
        assert_ne!(second.id, first.id);
        assert!(second.id.starts_with("add-payments-"));
        assert_eq!(second.id.len(), "add-payments-".len() + 8);

        let fallback = area.create("!!!", "").unwrap();
        assert_eq!(fallback.id, "changeset");
    }

    #[test]
    fn load_by_id_or_name() {
        let (_dir, mut area) = area();
        let cs = area.create("Add Payments", "").unwrap();

        assert_eq!(area.load("add-payments").unwrap().id, cs.id);
        assert_eq!(area.load("Add Payments").unwrap().id, cs.id);
        assert!(matches!(area.load("missing"), Err(StagingError::NotFound(_))));
    }

    #[test]
    fn invalid_ids_are_rejected() {
        let (_dir, mut area) = area();
        assert!(matches!(
            area.stage("../etc", add("business", "x")),
            Err(StagingError::InvalidId { .. })
        ));
        assert!(matches!(area.delete("a|b"), Err(StagingError::InvalidId { .. })));
        assert!(matches!(area.detect_drift(""), Err(StagingError::InvalidId { .. })));
    }

    #[test]
    fn stage_assigns_sequence_numbers() {
        let (_dir, mut area) = area();
        let cs = area.create("cs1", "").unwrap();

        let a = area.stage(&cs.id, add("business", "a")).unwrap();
        let b = area.stage(&cs.id, add("application", "b")).unwrap();
        assert_eq!(a.sequence_number, 0);
        assert_eq!(b.sequence_number, 1);

        let stored = area.load(&cs.id).unwrap();
        assert_eq!(stored.changes.len(), 2);
        assert_eq!(stored.stats.additions, 2);
    }

    #[test]
    fn unstage_reindexes_densely() {
        let (_dir, mut area) = area();
        let cs = area.create("cs1", "").unwrap();
        for id in ["a", "b", "c", "b"] {
            area.stage(&cs.id, add("business", id)).unwrap();
        }

        let removed = area.unstage(&cs.id, "b").unwrap();
        assert_eq!(removed.len(), 2);

        let stored = area.load(&cs.id).unwrap();
        let seqs: Vec<usize> = stored.changes.iter().map(|c| c.sequence_number).collect();
        assert_eq!(seqs, vec![0, 1]);
        assert_eq!(stored.changes[1].element_id, "c");
    }

    #[test]
    fn discard_is_terminal() {
        let (_dir, mut area) = area();
        let cs = area.create("cs1", "").unwrap();
        area.stage(&cs.id, add("business", "a")).unwrap();

        let discarded = area.discard(&cs.id).unwrap();
        assert!(discarded.changes.is_empty());
        assert_eq!(discarded.stats.total(), 0);
        assert_eq!(discarded.status, ChangesetStatus::Discarded);

        assert!(matches!(
            area.stage(&cs.id, add("business", "b")),
            Err(StagingError::InvalidState { .. })
        ));
        assert!(matches!(
            area.unstage(&cs.id, "a"),
            Err(StagingError::InvalidState { .. })
        ));
    }

    #[test]
    fn active_marker_lifecycle() {
        let (_dir, mut area) = area();
        let cs = area.create("cs1", "").unwrap();
        assert!(area.get_active().unwrap().is_none());

        area.discard(&cs.id).unwrap();
        let active = area.set_active(&cs.id).unwrap();
        assert_eq!(active.status, ChangesetStatus::Staged);
        assert_eq!(area.get_active_id().unwrap().as_deref(), Some("cs1"));
        assert_eq!(area.get_active().unwrap().unwrap().id, "cs1");

        area.delete(&cs.id).unwrap();
        assert!(area.get_active_id().unwrap().is_none());
        assert!(matches!(area.load("cs1"), Err(StagingError::NotFound(_))));
    }

    #[test]
    fn clear_active_empties_marker() {
        let (_dir, mut area) = area();
        let cs = area.create("cs1", "").unwrap();
        area.set_active(&cs.id).unwrap();
        area.clear_active().unwrap();
        assert!(area.get_active().unwrap().is_none());
    }

    #[test]
    fn drift_follows_base_model_edits() {
        let (_dir, mut area) = area();
        let cs = area.create("cs1", "").unwrap();
        assert!(!area.detect_drift(&cs.id).unwrap().is_drifted);

        area.model_mut()
            .layer_mut("business")
            .unwrap()
            .add_element(Element::new("supplier", "actor", "Supplier"));
        area.model_mut().save_layer("business").unwrap();
        let report = area.detect_drift(&cs.id).unwrap();
        assert!(report.is_drifted);
        assert_ne!(report.base_snapshot_id.as_deref(), Some(report.current_snapshot_id.as_str()));

        area.capture_base_snapshot(&cs.id).unwrap();
        assert!(!area.detect_drift(&cs.id).unwrap().is_drifted);
    }

    #[test]
    fn drift_without_snapshot_warns() {
        let (_dir, mut area) = area();
        let mut cs = area.create("cs1", "").unwrap();
        cs.base_snapshot = None;
        area.store().save(&cs).unwrap();

        let report = area.detect_drift(&cs.id).unwrap();
        assert!(!report.is_drifted);
        assert_eq!(report.warnings.len(), 1);
    }

    #[test]
    fn previews_reflect_staged_changes() {
        let (_dir, mut area) = area();
        let cs = area.create("cs1", "").unwrap();
        area.stage(&cs.id, add("business", "order")).unwrap();

        let layer = area.preview_layer(&cs.id, "business").unwrap();
        assert!(layer.contains("order"));
        assert!(area.preview_element(&cs.id, "order").unwrap().is_some());
        assert!(area.preview_model(&cs.id).unwrap().element_by_id("customer").is_some());
        assert_eq!(area.diff(&cs.id).unwrap().additions.len(), 1);

        assert!(!area.model().layer("business").unwrap().contains("order"));
    }
}
