//! # strata-changeset
//!
//! The staged-edit data model for Strata.
//!
//! A [`Changeset`] is a named, ordered batch of [`StagedChange`]s proposed
//! against a layered model. It lives independently of the model until it is
//! committed. This crate holds only the data model and its invariants
//! (dense sequence numbers, status gating); persistence and the commit
//! protocol live in `strata-workspace`.

pub mod changeset;
pub mod diff;
pub mod error;
pub mod id;

pub use changeset::{ChangeType, Changeset, ChangesetStats, ChangesetStatus, StagedChange};
pub use diff::ChangesetDiff;
pub use error::ChangesetError;
pub use id::{normalize_id, validate_id};
