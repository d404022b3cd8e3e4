//! # strata-audit
//!
//! Content hashing and drift detection for Strata.
//!
//! Every checksum in Strata is SHA-256, hex-encoded. The same primitive
//! backs three things: backup manifests (per-file checksums), model
//! snapshots (one hash for the whole model), and drift detection
//! (comparing a changeset's base snapshot against the current model).
//!
//! ## Quick Example
//!
//! ```rust,no_run
//! use strata_audit::{ModelHasher, SnapshotHasher};
//! use strata_model::FileModel;
//!
//! let model = FileModel::open("/path/to/model").unwrap();
//! let hash = ModelHasher.capture_snapshot(&model).unwrap();
//! println!("model snapshot: {}", hash);
//! ```

pub mod drift;
pub mod error;
pub mod hasher;
pub mod snapshot;

pub use drift::DriftReport;
pub use error::AuditError;
pub use snapshot::{ModelHasher, SnapshotHasher};
