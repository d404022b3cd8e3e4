// id.rs — Changeset id normalization and validation.
//
// Ids double as file names in the changeset store, so validation is a hard
// precondition checked before any I/O.

use crate::error::ChangesetError;

/// Characters that are never allowed in an id.
const RESERVED_CHARS: &[char] = &['<', '>', ':', '"', '|', '?', '*'];

/// Derive an id from a human-readable name.
///
/// Lowercases, turns whitespace runs into single hyphens, and strips every
/// character that is not ASCII alphanumeric or a hyphen.
/// `"Add Payment Service!"` becomes `"add-payment-service"`.
pub fn normalize_id(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut pending_hyphen = false;
    for c in name.trim().chars() {
        if c.is_whitespace() {
            pending_hyphen = true;
            continue;
        }
        let c = c.to_ascii_lowercase();
        if c.is_ascii_alphanumeric() || c == '-' {
            if pending_hyphen && !out.is_empty() {
                out.push('-');
            }
            pending_hyphen = false;
            out.push(c);
        }
    }
    out
}

/// Reject ids that are empty, contain path traversal sequences, or contain
/// reserved characters.
pub fn validate_id(id: &str) -> Result<(), ChangesetError> {
    let invalid = |reason: &str| ChangesetError::InvalidId {
        id: id.to_string(),
        reason: reason.to_string(),
    };

    if id.trim().is_empty() {
        return Err(invalid("id must not be empty"));
    }
    if id.contains("..") || id.contains('/') || id.contains('\\') {
        return Err(invalid("path traversal sequences are not allowed"));
    }
    if let Some(c) = id.chars().find(|c| RESERVED_CHARS.contains(c)) {
        return Err(invalid(&format!("reserved character '{}'", c)));
    }
    if id.chars().any(char::is_control) {
        return Err(invalid("control characters are not allowed"));
    }
    Ok(())
}
