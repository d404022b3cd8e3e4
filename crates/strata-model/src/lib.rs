//! # strata-model
//!
//! The layered architecture model that Strata changesets are staged against.
//!
//! A model is a directory holding a `manifest.yaml` and one directory per
//! layer (`layers/<name>/elements.yaml`). Each layer is an ordered list of
//! [`Element`]s.
//!
//! ## Key components
//!
//! - [`Model`] — trait the staging engine consumes. Lets tests and callers
//!   swap in their own persistence without touching the engine.
//! - [`FileModel`] — YAML-on-disk implementation.
//! - [`Element`] / [`Layer`] / [`ModelManifest`] — the value objects.

pub mod element;
pub mod error;
pub mod fsio;
pub mod layer;
pub mod manifest;
pub mod model;

pub use element::{Element, Relationship};
pub use error::ModelError;
pub use fsio::write_atomic;
pub use layer::Layer;
pub use manifest::{ChangesetHistoryEntry, HistoryAction, ModelManifest};
pub use model::{FileModel, Model, LAYERS_DIR, LAYER_FILE, MANIFEST_FILE};
