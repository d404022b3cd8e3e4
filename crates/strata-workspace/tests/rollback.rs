// rollback.rs — Fault injection across the commit protocol.
//
// Each test wraps the model in `FlakyModel` so that one persist step fails,
// then checks what the caller gets back and what is left on disk:
//   - single fault → model byte-identical to before, backup removed
//   - double fault, backup intact → manual recovery steps, backup kept
//   - double fault, backup damaged → told not to use it, escalate
//   - backup cannot be taken → nothing touched; orphaned partial backup is critical
//   - backup cannot be removed after success → warning only

mod common;

use std::fs;
use std::path::Path;

use strata_changeset::ChangesetStatus;
use strata_model::Model;
use strata_model::ModelError;
use strata_workspace::{
    BackupError, BackupHealth, CommitOptions, CommitPhase, CommitPhaseError, StagingArea,
    StagingConfig, StagingError,
};

use common::{add, backup_dirs, flaky_area, model_checksums, seeded_model};

#[test]
fn persist_failure_restores_every_file() {
    let (dir, mut area) = flaky_area();
    let before = model_checksums(dir.path());

    let cs = area.create("cs1", "").unwrap();
    area.stage(&cs.id, add("application", "billing")).unwrap();
    area.stage(&cs.id, add("business", "X")).unwrap();
    // "application" is saved first, then "business" fails.
    area.model_mut().fail_save_layer = Some("business".to_string());

    let err = area.commit(&cs.id, CommitOptions::default()).unwrap_err();
    let failure = match &err {
        StagingError::RolledBack(failure) => failure,
        other => panic!("expected rollback, got {other}"),
    };
    assert_eq!(failure.phase, CommitPhase::Persist);
    assert!(matches!(failure.cause, CommitPhaseError::Persist { ref layer, .. } if layer == "business"));
    assert!(failure.rolled_back());
    assert!(failure.backup_health.is_none());
    assert!(!failure.recovery_steps.is_empty());

    assert_eq!(model_checksums(dir.path()), before);
    assert!(!area.model().layer("application").unwrap().contains("billing"));
    assert!(backup_dirs(dir.path()).is_empty());
    assert_eq!(area.load("cs1").unwrap().status, ChangesetStatus::Staged);
}

#[test]
fn manifest_failure_during_finalize_is_rolled_back() {
    let (dir, mut area) = flaky_area();
    let before = model_checksums(dir.path());

    let cs = area.create("cs1", "").unwrap();
    area.stage(&cs.id, add("business", "X")).unwrap();
    area.model_mut().fail_save_manifest = true;

    let err = area.commit(&cs.id, CommitOptions::default()).unwrap_err();
    let failure = err.commit_failure().unwrap();
    assert_eq!(failure.phase, CommitPhase::Finalize);
    assert!(failure.rolled_back());
    assert!(matches!(failure.cause, CommitPhaseError::Finalize { step, .. } if step.contains("manifest")));
    let source = std::error::Error::source(&failure.cause).unwrap();
    assert!(source.downcast_ref::<ModelError>().is_some());

    assert_eq!(model_checksums(dir.path()), before);
    assert!(area.model().manifest().changeset_history.is_empty());
    // The record was briefly marked committed; rollback put it back.
    assert_eq!(area.load("cs1").unwrap().status, ChangesetStatus::Staged);

    // Once the fault clears, the same changeset commits cleanly.
    area.model_mut().fail_save_manifest = false;
    area.commit(&cs.id, CommitOptions::default()).unwrap();
    assert_eq!(area.model().manifest().changeset_history.len(), 1);
}

#[test]
fn double_fault_with_intact_backup_gives_manual_steps() {
    let (dir, mut area) = flaky_area();

    let cs = area.create("cs1", "").unwrap();
    area.stage(&cs.id, add("application", "billing")).unwrap();
    area.stage(&cs.id, add("business", "X")).unwrap();
    {
        let model = area.model_mut();
        model.fail_save_layer = Some("business".to_string());
        // Make the application layer's destination unusable for restore.
        model.on_fail = Some(Box::new(|root: &Path| {
            let layer_dir = root.join("layers/application");
            fs::remove_dir_all(&layer_dir).unwrap();
            fs::write(&layer_dir, "not a directory").unwrap();
        }));
    }

    let err = area.commit(&cs.id, CommitOptions::default()).unwrap_err();
    let failure = match &err {
        StagingError::RollbackFailed(failure) => failure,
        other => panic!("expected double fault, got {other}"),
    };
    assert!(!failure.rolled_back());
    assert!(matches!(
        failure.rollback_error,
        Some(BackupError::RestorationFailed { ref failures }) if failures.iter().any(|f| f.contains("application"))
    ));

    let backup_path = failure.backup_path.clone().unwrap();
    assert!(backup_path.exists());
    assert!(matches!(failure.backup_health, Some(BackupHealth::Intact(_))));
    assert!(failure.recovery_steps.iter().any(|s| s.contains(&backup_path.display().to_string())));
    assert!(!failure.recovery_steps.iter().any(|s| s.contains("Do NOT")));
    assert!(failure.report().contains("Backup integrity: intact"));

    assert!(area.validate_backup_integrity(&backup_path).unwrap().is_valid);
    assert_eq!(backup_dirs(dir.path()), vec![backup_path]);
}

#[test]
fn double_fault_with_damaged_backup_says_escalate() {
    let (dir, mut area) = flaky_area();

    let cs = area.create("cs1", "").unwrap();
    area.stage(&cs.id, add("business", "X")).unwrap();
    {
        let model = area.model_mut();
        model.fail_save_layer = Some("business".to_string());
        // Lose the backup copy of the layer being restored.
        model.on_fail = Some(Box::new(|root: &Path| {
            for backup in common::backup_dirs(root) {
                fs::remove_file(backup.join("layers/business/elements.yaml")).unwrap();
            }
        }));
    }

    let err = area.commit(&cs.id, CommitOptions::default()).unwrap_err();
    let failure = match &err {
        StagingError::RollbackFailed(failure) => failure,
        other => panic!("expected double fault, got {other}"),
    };

    match &failure.backup_health {
        Some(BackupHealth::Damaged(report)) => {
            assert!(!report.is_valid);
            assert!(report.errors.iter().any(|e| e.contains("layers/business/elements.yaml")));
        }
        other => panic!("expected damaged backup, got {other:?}"),
    }
    assert!(failure.recovery_steps[0].starts_with("Do NOT use the backup"));
    assert!(failure.recovery_steps.iter().any(|s| s.starts_with("Escalate")));
    assert!(failure.to_string().contains("rollback FAILED"));
    assert_eq!(backup_dirs(dir.path()).len(), 1);
}

#[test]
fn backup_integrity_detects_deleted_file() {
    let (dir, area) = common::file_area();
    let backup = area.backups().create(area.model()).unwrap();

    let fresh = area.validate_backup_integrity(&backup.path).unwrap();
    assert!(fresh.is_valid);
    assert!(fresh.errors.is_empty());

    fs::remove_file(backup.path.join("layers/application/elements.yaml")).unwrap();
    let damaged = area.validate_backup_integrity(&backup.path).unwrap();
    assert!(!damaged.is_valid);
    assert_eq!(damaged.errors.len(), 1);
    assert!(damaged.errors[0].contains("layers/application/elements.yaml"));

    assert!(matches!(
        area.validate_backup_integrity(dir.path().join(".backups/backup-nope")),
        Err(StagingError::Backup(BackupError::MissingBackup(_)))
    ));
}

#[test]
fn backup_creation_failure_leaves_model_untouched() {
    let dir = tempfile::TempDir::new().unwrap();
    let model = seeded_model(dir.path());
    // A regular file where a directory is needed.
    fs::write(dir.path().join("blocker"), "").unwrap();
    let mut config = StagingConfig::for_model(dir.path());
    config.backups_dir = dir.path().join("blocker/sub");
    let mut area = StagingArea::new(model, config).unwrap();
    let before = model_checksums(dir.path());

    let cs = area.create("cs1", "").unwrap();
    area.stage(&cs.id, add("business", "X")).unwrap();

    let err = area.commit(&cs.id, CommitOptions::default()).unwrap_err();
    assert!(matches!(err, StagingError::BackupCreationFailed(_)), "got {err}");
    assert!(err.commit_failure().is_none());

    assert_eq!(model_checksums(dir.path()), before);
    assert!(!area.model().layer("business").unwrap().contains("X"));
    assert_eq!(area.load("cs1").unwrap().status, ChangesetStatus::Staged);
}

#[test]
fn partial_backup_that_cannot_be_removed_is_critical() {
    let (dir, mut area) = flaky_area();
    let before = model_checksums(dir.path());

    let cs = area.create("cs1", "").unwrap();
    area.stage(&cs.id, add("business", "X")).unwrap();
    // The partial backup disappears mid-copy, so removing it fails too.
    area.model_mut().break_layer_dirs = Some(Box::new(|root: &Path| {
        for backup in backup_dirs(root) {
            fs::remove_dir_all(backup).unwrap();
        }
    }));

    let err = area.commit(&cs.id, CommitOptions::default()).unwrap_err();
    match &err {
        StagingError::OrphanedBackup(BackupError::Orphaned { cause, .. }) => {
            assert!(matches!(**cause, BackupError::IoError { .. }));
        }
        other => panic!("expected orphaned backup, got {other}"),
    }
    assert!(err.to_string().starts_with("CRITICAL"));

    assert_eq!(model_checksums(dir.path()), before);
    assert_eq!(area.load("cs1").unwrap().status, ChangesetStatus::Staged);
}

#[test]
fn cleanup_failure_is_a_warning_not_an_error() {
    let (dir, mut area) = flaky_area();

    let cs = area.create("cs1", "").unwrap();
    area.stage(&cs.id, add("business", "X")).unwrap();
    // Remove the backup out from under the cleanup step.
    area.model_mut().after_save_layer = Some(Box::new(|root: &Path| {
        for backup in backup_dirs(root) {
            fs::remove_dir_all(backup).unwrap();
        }
    }));

    let result = area.commit(&cs.id, CommitOptions::default()).unwrap();
    assert_eq!(result.applied, 1);
    assert!(result.backup_path.is_some());
    assert!(result
        .warnings
        .iter()
        .any(|w| w.contains("could not be removed")));

    assert!(area.model().layer("business").unwrap().contains("X"));
    assert_eq!(area.load("cs1").unwrap().status, ChangesetStatus::Committed);
    assert_eq!(area.model().manifest().changeset_history.len(), 1);
}
