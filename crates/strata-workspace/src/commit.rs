// commit.rs — The atomic commit protocol.
//
// Phases run strictly in order:
//
//   load → drift check → validate → dry run → backup
//        → apply → persist → finalize → cleanup
//
// Everything before backup aborts without touching the model. A failure in
// apply, persist, or finalize hands over to rollback (rollback.rs), which
// restores the model from the backup taken just before.

use std::collections::BTreeSet;
use std::path::PathBuf;

use serde::Serialize;
use strata_audit::DriftReport;
use strata_changeset::Changeset;
use strata_model::Model;

use crate::backup::Backup;
use crate::error::{BackupError, CommitPhaseError, StagingError};
use crate::observer::CommitPhase;
use crate::replay::{replay_change, ReplayError};
use crate::staging::StagingArea;

/// Knobs for a single commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommitOptions {
    /// Commit even if the base model has drifted. Never overrides validation.
    pub force: bool,
    /// Run the validator against the projected model.
    pub validate: bool,
    /// Report what would be applied and stop before the backup.
    pub dry_run: bool,
}

impl Default for CommitOptions {
    fn default() -> Self {
        Self {
            force: false,
            validate: true,
            dry_run: false,
        }
    }
}

/// What a commit did (or, for a dry run, would do).
#[derive(Debug, Clone, Serialize)]
pub struct CommitResult {
    pub changeset_id: String,
    /// Changes that modified the model. For a dry run, changes that would be replayed.
    pub applied: usize,
    pub layers_saved: Vec<String>,
    pub dry_run: bool,
    pub warnings: Vec<String>,
    /// Set when the backup was kept (`keep_backups`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backup_path: Option<PathBuf>,
}

impl<M: Model> StagingArea<M> {
    /// Commit a staged changeset to the base model.
    pub fn commit(&mut self, id: &str, options: CommitOptions) -> Result<CommitResult, StagingError> {
        tracing::info!(
            "committing changeset '{}' (force={}, validate={}, dry_run={})",
            id,
            options.force,
            options.validate,
            options.dry_run
        );
        let mut warnings = Vec::new();

        self.observer.on_phase_start(id, CommitPhase::Load);
        let loaded = self
            .get_existing(id)
            .and_then(|cs| cs.ensure_staged("commit").map(|_| cs).map_err(StagingError::from));
        let mut changeset = self.end_phase(id, CommitPhase::Load, loaded)?;

        self.observer.on_phase_start(id, CommitPhase::DriftCheck);
        let drift = self.check_drift(&changeset, options.force, &mut warnings);
        self.end_phase(id, CommitPhase::DriftCheck, drift)?;

        if options.validate {
            self.observer.on_phase_start(id, CommitPhase::Validate);
            let validated = self.run_validation(&changeset, &mut warnings);
            self.end_phase(id, CommitPhase::Validate, validated)?;
        } else {
            tracing::warn!("validation disabled for commit of '{}'", id);
        }

        if options.dry_run {
            self.observer.on_phase_start(id, CommitPhase::DryRun);
            let result = CommitResult {
                changeset_id: changeset.id.clone(),
                applied: changeset.changes.len(),
                layers_saved: Vec::new(),
                dry_run: true,
                warnings,
                backup_path: None,
            };
            self.observer.on_phase_end(id, CommitPhase::DryRun, true);
            tracing::info!("dry run of '{}': {} change(s) would apply", id, result.applied);
            return Ok(result);
        }

        self.observer.on_phase_start(id, CommitPhase::Backup);
        let created = self.backups.create(&self.model).map_err(|e| match e {
            BackupError::Orphaned { .. } => StagingError::OrphanedBackup(e),
            other => StagingError::BackupCreationFailed(other),
        });
        let backup = self.end_phase(id, CommitPhase::Backup, created)?;

        // From here on, failures are rolled back.
        let original = changeset.clone();
        let (applied, layers_saved) = match self.mutate(&mut changeset) {
            Ok(done) => done,
            Err((phase, cause)) => return Err(self.roll_back(&original, backup, phase, cause)),
        };

        self.projection.invalidate_all();
        match self.store.active_id() {
            Ok(active) if active.as_deref() == Some(id) => {
                if let Err(e) = self.store.clear_active_id() {
                    tracing::warn!("could not clear active marker after committing '{}': {}", id, e);
                    warnings.push(format!("active marker still points at committed changeset '{}'", id));
                }
            }
            Ok(_) => {}
            Err(e) => {
                tracing::warn!("could not read active marker after committing '{}': {}", id, e);
                warnings.push(format!(
                    "active marker could not be read ({}); check that it does not point at committed changeset '{}'",
                    e, id
                ));
            }
        }

        self.observer.on_phase_start(id, CommitPhase::Cleanup);
        let backup_path = self.clean_up(&backup, &mut warnings);
        self.observer.on_phase_end(id, CommitPhase::Cleanup, true);

        tracing::info!(
            "committed changeset '{}': {} change(s) applied, {} layer(s) saved",
            id,
            applied,
            layers_saved.len()
        );
        Ok(CommitResult {
            changeset_id: changeset.id,
            applied,
            layers_saved,
            dry_run: false,
            warnings,
            backup_path,
        })
    }

    /// Alias of [`commit`](Self::commit).
    pub fn apply(&mut self, id: &str, options: CommitOptions) -> Result<CommitResult, StagingError> {
        self.commit(id, options)
    }

    fn end_phase<T, E>(&self, id: &str, phase: CommitPhase, result: Result<T, E>) -> Result<T, E> {
        self.observer.on_phase_end(id, phase, result.is_ok());
        result
    }

    fn check_drift(&self, changeset: &Changeset, force: bool, warnings: &mut Vec<String>) -> Result<(), StagingError> {
        let current = self.hasher.capture_snapshot(&self.model)?;
        let mut report = DriftReport::compare(changeset.base_snapshot.as_deref(), current);
        warnings.append(&mut report.warnings);

        if !report.is_drifted {
            return Ok(());
        }
        if !force {
            return Err(StagingError::DriftBlocked {
                changeset_id: changeset.id.clone(),
                report,
            });
        }
        tracing::warn!("base model drifted under '{}'; committing anyway (forced)", changeset.id);
        warnings.push(format!(
            "base model drifted since changeset '{}' was created; committed with force",
            changeset.id
        ));
        Ok(())
    }

    fn run_validation(&mut self, changeset: &Changeset, warnings: &mut Vec<String>) -> Result<(), StagingError> {
        let projected = self.projection.project_model(&self.model, changeset);
        let mut report = self.validator.validate(&self.model, changeset, &projected);
        warnings.append(&mut report.warnings);

        if report.is_valid() {
            Ok(())
        } else {
            tracing::warn!(
                "validation of '{}' found {} error(s)",
                changeset.id,
                report.errors.len()
            );
            Err(StagingError::ValidationFailed {
                changeset_id: changeset.id.clone(),
                errors: report.errors,
            })
        }
    }

    /// Apply, persist, and finalize. Any error carries the phase it came from.
    fn mutate(&mut self, changeset: &mut Changeset) -> Result<(usize, Vec<String>), (CommitPhase, CommitPhaseError)> {
        let id = changeset.id.clone();

        self.observer.on_phase_start(&id, CommitPhase::Apply);
        let applied = self.apply_changes(changeset);
        let (applied, touched) = self
            .end_phase(&id, CommitPhase::Apply, applied)
            .map_err(|e| (CommitPhase::Apply, e))?;

        self.observer.on_phase_start(&id, CommitPhase::Persist);
        let persisted = self.persist_layers(&touched);
        self.end_phase(&id, CommitPhase::Persist, persisted)
            .map_err(|e| (CommitPhase::Persist, e))?;

        self.observer.on_phase_start(&id, CommitPhase::Finalize);
        let finalized = self.finalize(changeset);
        self.end_phase(&id, CommitPhase::Finalize, finalized)
            .map_err(|e| (CommitPhase::Finalize, e))?;

        Ok((applied, touched.into_iter().collect()))
    }

    /// Replay every change in sequence order against the live model.
    /// Stops at the first failure.
    fn apply_changes(&mut self, changeset: &Changeset) -> Result<(usize, BTreeSet<String>), CommitPhaseError> {
        let mut applied = 0;
        let mut touched = BTreeSet::new();

        for change in changeset.ordered_changes() {
            let fail = |source: ReplayError| CommitPhaseError::Apply {
                sequence: change.sequence_number,
                change_type: change.change_type,
                element_id: change.element_id.clone(),
                layer: change.layer_name.clone(),
                source,
            };
            let layer = self
                .model
                .layer_mut(&change.layer_name)
                .ok_or_else(|| fail(ReplayError::LayerNotFound(change.layer_name.clone())))?;
            let outcome = replay_change(layer, change).map_err(fail)?;
            if outcome.changed_layer() {
                applied += 1;
                touched.insert(change.layer_name.clone());
            }
        }

        Ok((applied, touched))
    }

    fn persist_layers(&mut self, touched: &BTreeSet<String>) -> Result<(), CommitPhaseError> {
        for layer in touched {
            self.model
                .save_layer(layer)
                .map_err(|source| CommitPhaseError::Persist {
                    layer: layer.clone(),
                    source,
                })?;
        }
        Ok(())
    }

    fn finalize(&mut self, changeset: &mut Changeset) -> Result<(), CommitPhaseError> {
        changeset.mark_committed();
        self.store
            .save(changeset)
            .map_err(|e| CommitPhaseError::Finalize {
                step: "record changeset as committed",
                source: Box::new(e),
            })?;

        self.model.manifest_mut().record_applied(changeset.name.clone());
        self.model
            .save_manifest()
            .map_err(|e| CommitPhaseError::Finalize {
                step: "append changeset history to manifest",
                source: Box::new(e),
            })
    }

    /// Delete the backup unless configured to keep it. Returns the path of a
    /// kept backup. Failures become warnings.
    fn clean_up(&self, backup: &Backup, warnings: &mut Vec<String>) -> Option<PathBuf> {
        if self.config.keep_backups {
            tracing::info!("keeping backup at {}", backup.path.display());
            return Some(backup.path.clone());
        }
        match self.backups.remove(backup) {
            Ok(()) => None,
            Err(e) => {
                tracing::warn!(
                    "orphaned backup at {} could not be removed: {}",
                    backup.path.display(),
                    e
                );
                warnings.push(format!(
                    "backup at {} could not be removed ({}); delete it manually to reclaim disk space",
                    backup.path.display(),
                    e
                ));
                Some(backup.path.clone())
            }
        }
    }
}
