//! # strata-workspace
//!
//! Changeset staging, projection, and atomic commit/rollback for Strata
//! models.
//!
//! A [`StagingArea`] owns one model and manages the changesets staged
//! against it. Changesets are stored as JSON under `.strata/changesets/`.
//! Before a commit touches the model, a checksummed backup is written under
//! `.backups/`; if anything fails mid-commit, the backup is restored.
//!
//! ## Key components
//!
//! - [`StagingArea`] — create/load/list/delete, stage/unstage/discard,
//!   the active marker, drift detection, previews, and [`commit`].
//! - [`ChangesetStore`] — one JSON file per changeset plus `.active`.
//! - [`BackupManager`] — create, verify, and restore model backups.
//! - [`ProjectionEngine`] — TTL-cached "model + changeset" views.
//! - [`Validator`] / [`CommitObserver`] — injectable seams.
//!
//! [`commit`]: StagingArea::commit
//!
//! ## Quick Example
//!
//! ```rust,no_run
//! use serde_json::json;
//! use strata_changeset::StagedChange;
//! use strata_model::FileModel;
//! use strata_workspace::{CommitOptions, StagingArea};
//!
//! let model = FileModel::open("/path/to/model").unwrap();
//! let mut area = StagingArea::open(model).unwrap();
//!
//! let cs = area.create("Add billing", "new billing service").unwrap();
//! let fields = json!({ "type": "service", "name": "Billing" });
//! let fields = fields.as_object().unwrap().clone();
//! area.stage(&cs.id, StagedChange::add("application", "billing", fields)).unwrap();
//!
//! let result = area.commit(&cs.id, CommitOptions::default()).unwrap();
//! println!("applied {} change(s)", result.applied);
//! ```

pub mod backup;
pub mod commit;
pub mod config;
pub mod error;
pub mod observer;
pub mod projection;
pub mod replay;
mod rollback;
pub mod staging;
pub mod store;
pub mod validator;

pub use backup::{Backup, BackupManager, BackupManifest, IntegrityReport};
pub use commit::{CommitOptions, CommitResult};
pub use config::{CacheConfig, StagingConfig};
pub use error::{BackupError, BackupHealth, CommitFailure, CommitPhaseError, StagingError};
pub use observer::{CommitObserver, CommitPhase, NoopObserver, TracingObserver};
pub use projection::{CacheStats, ProjectedModel, ProjectionEngine};
pub use staging::StagingArea;
pub use store::ChangesetStore;
pub use validator::{StructuralValidator, ValidationReport, Validator};
