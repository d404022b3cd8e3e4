// error.rs — Error types for the staging, backup, and commit subsystems.
//
// Pre-mutation failures (bad id, missing changeset, validation, drift,
// backup creation) surface directly. Anything that goes wrong after the
// model starts changing is wrapped into a `CommitFailure`, which records
// the failing phase, the original cause, what rollback did, and what an
// operator should do next.

use std::fmt;
use std::path::PathBuf;

use strata_audit::{AuditError, DriftReport};
use strata_changeset::{ChangeType, ChangesetError, ChangesetStatus};
use strata_model::ModelError;
use thiserror::Error;

use crate::backup::IntegrityReport;
use crate::observer::CommitPhase;
use crate::replay::ReplayError;

/// Errors raised by the staging area.
#[derive(Debug, Error)]
pub enum StagingError {
    /// The id is malformed. Rejected before any I/O.
    #[error("invalid changeset id '{id}': {reason}")]
    InvalidId { id: String, reason: String },

    /// No changeset with this id (or name).
    #[error("changeset not found: '{0}'")]
    NotFound(String),

    /// The operation needs a `staged` changeset.
    #[error("cannot {operation} changeset '{id}': status is {status}, expected staged")]
    InvalidState {
        id: String,
        status: ChangesetStatus,
        operation: String,
    },

    /// The hypothetical post-commit model failed validation. Never overridable.
    #[error("validation failed for changeset '{changeset_id}':\n{}", .errors.join("\n"))]
    ValidationFailed {
        changeset_id: String,
        errors: Vec<String>,
    },

    /// The base model changed since the changeset was created.
    #[error(
        "base model has drifted since changeset '{changeset_id}' was created; \
         commit with force to override"
    )]
    DriftBlocked {
        changeset_id: String,
        report: DriftReport,
    },

    /// The pre-commit backup could not be created. Nothing was mutated.
    #[error("backup creation failed, model not modified: {0}")]
    BackupCreationFailed(#[source] BackupError),

    /// Backup creation failed and the partial backup could not be removed.
    #[error("CRITICAL: {0}")]
    OrphanedBackup(#[source] BackupError),

    /// A mid-commit failure was rolled back successfully.
    #[error("{0}")]
    RolledBack(Box<CommitFailure>),

    /// A mid-commit failure could not be rolled back (double fault).
    #[error("{0}")]
    RollbackFailed(Box<CommitFailure>),

    #[error("model error: {0}")]
    Model(#[from] ModelError),

    #[error("snapshot error: {0}")]
    Snapshot(#[from] AuditError),

    #[error("backup error: {0}")]
    Backup(#[from] BackupError),

    /// A file I/O operation failed.
    #[error("I/O error at {path}: {source}")]
    IoError {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Failed to serialize/deserialize changeset data.
    #[error("serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// The staging config file could not be parsed.
    #[error("invalid config at {path}: {reason}")]
    ConfigError { path: PathBuf, reason: String },
}

impl From<ChangesetError> for StagingError {
    fn from(err: ChangesetError) -> Self {
        match err {
            ChangesetError::InvalidId { id, reason } => StagingError::InvalidId { id, reason },
            ChangesetError::NotStaged {
                id,
                status,
                operation,
            } => StagingError::InvalidState {
                id,
                status,
                operation,
            },
        }
    }
}

impl StagingError {
    /// The structured commit failure, for `RolledBack` / `RollbackFailed`.
    pub fn commit_failure(&self) -> Option<&CommitFailure> {
        match self {
            StagingError::RolledBack(f) | StagingError::RollbackFailed(f) => Some(f),
            _ => None,
        }
    }
}

/// Errors raised while creating, verifying, or restoring backups.
#[derive(Debug, Error)]
pub enum BackupError {
    #[error("I/O error at {path}: {source}")]
    IoError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("hash error: {0}")]
    Hash(#[from] AuditError),

    #[error("serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// The backup directory does not exist.
    #[error("backup directory not found: {0}")]
    MissingBackup(PathBuf),

    /// `.backup-manifest.json` is missing, unreadable, or malformed.
    #[error("unreadable backup manifest at {path}: {reason}")]
    MalformedManifest { path: PathBuf, reason: String },

    /// A freshly written backup did not verify against its own manifest.
    #[error("backup at {path} failed self-verification:\n{}", .errors.join("\n"))]
    VerificationFailed { path: PathBuf, errors: Vec<String> },

    /// Creation failed and the partial backup directory could not be removed.
    #[error(
        "backup creation failed ({cause}) and cleanup of partial backup at {path} \
         also failed ({cleanup}); orphaned backup left on disk"
    )]
    Orphaned {
        path: PathBuf,
        cause: Box<BackupError>,
        cleanup: std::io::Error,
    },

    /// The model manifest could not be restored. Layers were not attempted.
    #[error("manifest restoration FAILED from {path}: {reason}; layer restoration not attempted")]
    ManifestRestoreFailed { path: PathBuf, reason: String },

    /// One or more layer files could not be restored.
    #[error("layer restoration FAILED for {} item(s):\n{}", .failures.len(), .failures.join("\n"))]
    RestorationFailed { failures: Vec<String> },
}

/// The reason a commit failed after mutation began.
#[derive(Debug, Error)]
pub enum CommitPhaseError {
    /// Replaying a staged change against the in-memory model failed.
    #[error("change #{sequence} ({change_type} '{element_id}' in layer '{layer}') failed: {source}")]
    Apply {
        sequence: usize,
        change_type: ChangeType,
        element_id: String,
        layer: String,
        source: ReplayError,
    },

    /// Saving a touched layer failed.
    #[error("failed to save layer '{layer}': {source}")]
    Persist { layer: String, source: ModelError },

    /// Marking the changeset committed or recording history failed.
    #[error("failed to {step}: {source}")]
    Finalize {
        step: &'static str,
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

/// What a live re-verification of the backup found after a failed rollback.
#[derive(Debug, Clone)]
pub enum BackupHealth {
    /// Every file matches its recorded checksum and size.
    Intact(IntegrityReport),
    /// The backup's content is damaged.
    Damaged(IntegrityReport),
    /// The verification itself could not run (backup infrastructure broken).
    Unverifiable(String),
}

impl BackupHealth {
    pub fn is_intact(&self) -> bool {
        matches!(self, BackupHealth::Intact(_))
    }
}

/// A structured, mid-commit failure.
///
/// Carries everything needed to report or act on the failure; formatting a
/// full human-readable report is left to the caller (see [`report`]).
///
/// [`report`]: CommitFailure::report
#[derive(Debug)]
pub struct CommitFailure {
    pub changeset_id: String,
    pub phase: CommitPhase,
    pub cause: CommitPhaseError,
    /// Present only when rollback itself failed.
    pub rollback_error: Option<BackupError>,
    /// Set while the backup still exists on disk.
    pub backup_path: Option<PathBuf>,
    /// Live integrity verdict, taken only on double fault.
    pub backup_health: Option<BackupHealth>,
    pub recovery_steps: Vec<String>,
}

impl CommitFailure {
    pub fn rolled_back(&self) -> bool {
        self.rollback_error.is_none()
    }

    /// Multi-line report suitable for printing to a terminal.
    pub fn report(&self) -> String {
        let mut out = format!("{}\n", self);
        if let Some(health) = &self.backup_health {
            match health {
                BackupHealth::Intact(r) => out.push_str(&format!(
                    "Backup integrity: intact ({} file(s) verified)\n",
                    r.files_checked
                )),
                BackupHealth::Damaged(r) => {
                    out.push_str(&format!(
                        "Backup integrity: DAMAGED ({} problem(s) in {} file(s))\n",
                        r.errors.len(),
                        r.files_checked
                    ));
                    for e in &r.errors {
                        out.push_str(&format!("  - {}\n", e));
                    }
                }
                BackupHealth::Unverifiable(reason) => {
                    out.push_str(&format!("Backup integrity: could not verify ({})\n", reason))
                }
            }
        }
        if !self.recovery_steps.is_empty() {
            out.push_str("Recovery steps:\n");
            for (i, step) in self.recovery_steps.iter().enumerate() {
                out.push_str(&format!("  {}. {}\n", i + 1, step));
            }
        }
        out
    }
}

impl fmt::Display for CommitFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "commit of changeset '{}' failed during {}: {}",
            self.changeset_id, self.phase, self.cause
        )?;
        match &self.rollback_error {
            None => write!(f, "; model restored from backup"),
            Some(rb) => {
                write!(f, "; rollback FAILED: {}", rb)?;
                if let Some(path) = &self.backup_path {
                    write!(f, "; backup kept at {}", path.display())?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for CommitFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.cause)
    }
}
