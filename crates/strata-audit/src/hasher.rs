// hasher.rs — SHA-256 hashing utilities.
//
// SHA-256 produces a 32-byte (256-bit) digest. We encode it as a 64-character
// lowercase hex string for readability and JSON compatibility.

use sha2::{Digest, Sha256};
use std::path::Path;

use crate::error::AuditError;

/// Hash arbitrary bytes, returning a lowercase hex-encoded SHA-256 string.
pub fn hash_bytes(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}

/// Hash a UTF-8 string.
pub fn hash_str(s: &str) -> String {
    hash_bytes(s.as_bytes())
}

/// Hash the contents of a file on disk, returning `(checksum, size_in_bytes)`.
///
/// Reads the entire file into memory; model and layer files are small.
pub fn hash_file(path: &Path) -> Result<(String, u64), AuditError> {
    let data = std::fs::read(path).map_err(|source| AuditError::HashFileFailed {
        path: path.to_path_buf(),
        source,
    })?;
    Ok((hash_bytes(&data), data.len() as u64))
}
