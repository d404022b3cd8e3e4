// error.rs — Error types for the changeset data model.

use thiserror::Error;

use crate::changeset::ChangesetStatus;

/// Errors that can occur during changeset operations.
#[derive(Debug, Error)]
pub enum ChangesetError {
    /// The id is empty, tries to traverse paths, or holds reserved characters.
    #[error("invalid changeset id '{id}': {reason}")]
    InvalidId { id: String, reason: String },

    /// The changeset is not in `staged` status, so it cannot be edited.
    #[error("cannot {operation} changeset '{id}': status is {status}, expected staged")]
    NotStaged {
        id: String,
        status: ChangesetStatus,
        operation: String,
    },
}
