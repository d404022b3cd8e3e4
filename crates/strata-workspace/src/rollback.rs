// rollback.rs — Restoring the model after a failed commit.
//
// Rollback puts the pre-commit backup back in place. If that works, the
// in-memory model is reloaded, the changeset record is reset to `staged`,
// and the backup is removed. If it does not (a double fault), the backup is
// kept and re-verified on the spot: an intact backup comes with manual
// recovery steps, a damaged one with instructions not to use it.

use std::path::Path;

use strata_changeset::Changeset;
use strata_model::Model;

use crate::backup::Backup;
use crate::error::{BackupHealth, CommitFailure, CommitPhaseError, StagingError};
use crate::observer::CommitPhase;
use crate::staging::StagingArea;

impl<M: Model> StagingArea<M> {
    /// Roll back a commit that failed during `phase`. Always returns the
    /// error the commit should raise.
    pub(crate) fn roll_back(
        &mut self,
        original: &Changeset,
        backup: Backup,
        phase: CommitPhase,
        cause: CommitPhaseError,
    ) -> StagingError {
        let id = original.id.as_str();
        tracing::error!(
            "commit of '{}' failed during {}: {}; rolling back from {}",
            id,
            phase,
            cause,
            backup.path.display()
        );
        self.observer.on_phase_start(id, CommitPhase::Rollback);

        let mut failure = CommitFailure {
            changeset_id: id.to_string(),
            phase,
            cause,
            rollback_error: None,
            backup_path: None,
            backup_health: None,
            recovery_steps: Vec::new(),
        };

        let restored = self.backups.restore(&backup, &self.model);
        self.projection.invalidate_all();

        match restored {
            Ok(summary) => {
                tracing::info!(
                    "rollback of '{}' restored {} file(s)",
                    id,
                    summary.files_restored
                );
                failure
                    .recovery_steps
                    .push("The model was restored to its pre-commit state; fix the cause above and commit again".to_string());

                if let Err(e) = self.model.reload() {
                    tracing::warn!("could not reload model after rollback: {}", e);
                    failure.recovery_steps.push(format!(
                        "Reopen the model at {}: the in-memory copy could not be reloaded ({})",
                        self.model.root_path().display(),
                        e
                    ));
                }
                self.reset_record(original, &mut failure);

                if let Err(e) = self.backups.remove(&backup) {
                    tracing::warn!(
                        "orphaned backup at {} could not be removed: {}",
                        backup.path.display(),
                        e
                    );
                    failure.recovery_steps.push(format!(
                        "Delete the leftover backup at {} to reclaim disk space",
                        backup.path.display()
                    ));
                    failure.backup_path = Some(backup.path.clone());
                }

                self.observer.on_phase_end(id, CommitPhase::Rollback, true);
                StagingError::RolledBack(Box::new(failure))
            }
            Err(rollback_error) => {
                tracing::error!(
                    "CRITICAL: rollback of '{}' FAILED: {}; backup kept at {}",
                    id,
                    rollback_error,
                    backup.path.display()
                );

                let health = match self.backups.verify(&backup.path) {
                    Ok(report) if report.is_valid => BackupHealth::Intact(report),
                    Ok(report) => BackupHealth::Damaged(report),
                    Err(e) => BackupHealth::Unverifiable(e.to_string()),
                };
                failure.recovery_steps = recovery_steps(self.model.root_path(), &backup, &health);
                self.reset_record(original, &mut failure);

                failure.rollback_error = Some(rollback_error);
                failure.backup_path = Some(backup.path.clone());
                failure.backup_health = Some(health);

                self.observer.on_phase_end(id, CommitPhase::Rollback, false);
                StagingError::RollbackFailed(Box::new(failure))
            }
        }
    }

    /// Put the pre-commit changeset record back, so it is `staged` again.
    fn reset_record(&self, original: &Changeset, failure: &mut CommitFailure) {
        if let Err(e) = self.store.save(original) {
            tracing::error!("could not reset changeset '{}' to staged: {}", original.id, e);
            failure.recovery_steps.push(format!(
                "Changeset '{}' could not be reset to staged ({}); mark it active again before retrying",
                original.id, e
            ));
        }
    }
}

/// Manual recovery guidance after a failed rollback.
fn recovery_steps(model_root: &Path, backup: &Backup, health: &BackupHealth) -> Vec<String> {
    let backup_dir = backup.path.display();
    let root = model_root.display();

    if health.is_intact() {
        vec![
            format!("Stop all writes to the model at {}", root),
            format!(
                "Copy {}/{} over {}/{}",
                backup_dir, backup.manifest.manifest_file, root, backup.manifest.manifest_file
            ),
            format!(
                "Replace each directory under {}/layers/ with its copy from {}/layers/",
                root, backup_dir
            ),
            format!("Verify the backup again with `strata verify-backup {}`", backup_dir),
            "Reopen the model and retry the commit".to_string(),
        ]
    } else {
        vec![
            format!(
                "Do NOT use the backup at {} for recovery: it failed integrity verification",
                backup_dir
            ),
            format!(
                "Escalate: restore the model at {} from version control or another external copy",
                root
            ),
            format!("Keep {} untouched for investigation", backup_dir),
        ]
    }
}
