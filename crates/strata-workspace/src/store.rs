// store.rs — Durable changeset records and the active-changeset marker.
//
// Each changeset is stored as a JSON file: `<store_dir>/<changeset_id>.json`.
// The active marker is `<store_dir>/.active`, holding a single id or nothing.
// At most one changeset is active at a time.
//
// Every id-keyed method validates the id before touching the filesystem,
// since ids become file names.

use std::fs;
use std::path::{Path, PathBuf};

use strata_changeset::{validate_id, Changeset};
use strata_model::write_atomic;

use crate::error::StagingError;

/// File name of the active-changeset marker.
pub const ACTIVE_MARKER: &str = ".active";

/// Persistent store for changeset records.
pub struct ChangesetStore {
    store_dir: PathBuf,
}

impl ChangesetStore {
    /// Create a new store backed by the given directory.
    /// Creates the directory if it doesn't exist.
    pub fn new(store_dir: impl AsRef<Path>) -> Result<Self, StagingError> {
        let store_dir = store_dir.as_ref().to_path_buf();
        fs::create_dir_all(&store_dir).map_err(|source| StagingError::IoError {
            path: store_dir.clone(),
            source,
        })?;
        Ok(Self { store_dir })
    }

    pub fn store_dir(&self) -> &Path {
        &self.store_dir
    }

    /// Save a changeset (creates or overwrites).
    pub fn save(&self, changeset: &Changeset) -> Result<(), StagingError> {
        validate_id(&changeset.id)?;
        let path = self.changeset_file(&changeset.id);
        let json = serde_json::to_string_pretty(changeset)?;
        write_atomic(&path, json.as_bytes()).map_err(|source| StagingError::IoError { path, source })
    }

    /// Get a changeset by id.
    pub fn get(&self, id: &str) -> Result<Option<Changeset>, StagingError> {
        validate_id(id)?;
        let path = self.changeset_file(id);
        if !path.exists() {
            return Ok(None);
        }
        let json = fs::read_to_string(&path).map_err(|source| StagingError::IoError {
            path: path.clone(),
            source,
        })?;
        Ok(Some(serde_json::from_str(&json)?))
    }

    pub fn exists(&self, id: &str) -> Result<bool, StagingError> {
        validate_id(id)?;
        Ok(self.changeset_file(id).exists())
    }

    /// List all changesets, newest first. Unparseable files are skipped.
    pub fn list(&self) -> Result<Vec<Changeset>, StagingError> {
        let mut changesets = Vec::new();

        let entries = fs::read_dir(&self.store_dir).map_err(|source| StagingError::IoError {
            path: self.store_dir.clone(),
            source,
        })?;

        for entry in entries {
            let entry = entry.map_err(|source| StagingError::IoError {
                path: self.store_dir.clone(),
                source,
            })?;
            let path = entry.path();

            if path.extension().is_some_and(|ext| ext == "json") {
                let json = fs::read_to_string(&path).map_err(|source| StagingError::IoError {
                    path: path.clone(),
                    source,
                })?;
                match serde_json::from_str::<Changeset>(&json) {
                    Ok(cs) => changesets.push(cs),
                    Err(e) => tracing::warn!("skipping unreadable changeset {}: {}", path.display(), e),
                }
            }
        }

        changesets.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(changesets)
    }

    /// Linear search by display name.
    pub fn find_by_name(&self, name: &str) -> Result<Option<Changeset>, StagingError> {
        Ok(self.list()?.into_iter().find(|cs| cs.name == name))
    }

    /// Delete a changeset record. Returns false if it did not exist.
    pub fn remove(&self, id: &str) -> Result<bool, StagingError> {
        validate_id(id)?;
        let path = self.changeset_file(id);
        if !path.exists() {
            return Ok(false);
        }
        fs::remove_file(&path).map_err(|source| StagingError::IoError { path, source })?;
        Ok(true)
    }

    /// Id held by the active marker, if any.
    pub fn active_id(&self) -> Result<Option<String>, StagingError> {
        let path = self.marker_file();
        if !path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(&path).map_err(|source| StagingError::IoError {
            path: path.clone(),
            source,
        })?;
        let id = content.trim();
        Ok(if id.is_empty() {
            None
        } else {
            Some(id.to_string())
        })
    }

    /// Point the active marker at `id`, replacing any previous value.
    pub fn set_active_id(&self, id: &str) -> Result<(), StagingError> {
        validate_id(id)?;
        let path = self.marker_file();
        write_atomic(&path, id.as_bytes()).map_err(|source| StagingError::IoError { path, source })
    }

    /// Empty the active marker.
    pub fn clear_active_id(&self) -> Result<(), StagingError> {
        let path = self.marker_file();
        write_atomic(&path, b"").map_err(|source| StagingError::IoError { path, source })
    }

    fn changeset_file(&self, id: &str) -> PathBuf {
        self.store_dir.join(format!("{}.json", id))
    }

    fn marker_file(&self) -> PathBuf {
        self.store_dir.join(ACTIVE_MARKER)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn save_and_get_round_trip() {
        let dir = tempdir().unwrap();
        let store = ChangesetStore::new(dir.path().join("changesets")).unwrap();

        let cs = Changeset::new("cs1", "cs1", "first");
        store.save(&cs).unwrap();

        let loaded = store.get("cs1").unwrap().unwrap();
        assert_eq!(loaded, cs);
        assert!(store.exists("cs1").unwrap());
    }

    #[test]
    fn get_missing_returns_none() {
        let dir = tempdir().unwrap();
        let store = ChangesetStore::new(dir.path()).unwrap();
        assert!(store.get("nope").unwrap().is_none());
    }

    #[test]
    fn invalid_ids_rejected_before_io() {
        let dir = tempdir().unwrap();
        let store = ChangesetStore::new(dir.path()).unwrap();

        for id in ["", "../escape", "a/b", "a*b"] {
            assert!(matches!(store.get(id), Err(StagingError::InvalidId { .. })));
            assert!(matches!(store.remove(id), Err(StagingError::InvalidId { .. })));
            assert!(matches!(store.set_active_id(id), Err(StagingError::InvalidId { .. })));
        }
        assert!(!dir.path().join("escape.json").exists());
    }

    #[test]
    fn list_is_newest_first_and_skips_marker() {
        let dir = tempdir().unwrap();
        let store = ChangesetStore::new(dir.path()).unwrap();

        let mut older = Changeset::new("older", "older", "");
        older.created_at -= chrono::Duration::seconds(60);
        let newer = Changeset::new("newer", "newer", "");
        store.save(&older).unwrap();
        store.save(&newer).unwrap();
        store.set_active_id("older").unwrap();

        let listed = store.list().unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].id, "newer");
        assert_eq!(listed[1].id, "older");
    }

    #[test]
    fn find_by_name_searches_records() {
        let dir = tempdir().unwrap();
        let store = ChangesetStore::new(dir.path()).unwrap();
        store
            .save(&Changeset::new("add-payments", "Add Payments", ""))
            .unwrap();

        let found = store.find_by_name("Add Payments").unwrap().unwrap();
        assert_eq!(found.id, "add-payments");
        assert!(store.find_by_name("Other").unwrap().is_none());
    }

    #[test]
    fn remove_changeset() {
        let dir = tempdir().unwrap();
        let store = ChangesetStore::new(dir.path()).unwrap();
        store.save(&Changeset::new("cs1", "cs1", "")).unwrap();

        assert!(store.remove("cs1").unwrap());
        assert!(!store.remove("cs1").unwrap());
        assert!(store.get("cs1").unwrap().is_none());
    }

    #[test]
    fn active_marker_set_and_clear() {
        let dir = tempdir().unwrap();
        let store = ChangesetStore::new(dir.path()).unwrap();
        assert!(store.active_id().unwrap().is_none());

        store.set_active_id("cs1").unwrap();
        assert_eq!(store.active_id().unwrap().as_deref(), Some("cs1"));

        store.set_active_id("cs2").unwrap();
        assert_eq!(store.active_id().unwrap().as_deref(), Some("cs2"));

        store.clear_active_id().unwrap();
        assert!(store.active_id().unwrap().is_none());
        assert!(dir.path().join(ACTIVE_MARKER).exists());
    }

    #[test]
    fn store_survives_reopen() {
        let dir = tempdir().unwrap();
        {
            let store = ChangesetStore::new(dir.path()).unwrap();
            store.save(&Changeset::new("cs1", "cs1", "")).unwrap();
            store.set_active_id("cs1").unwrap();
        }
        let store = ChangesetStore::new(dir.path()).unwrap();
        assert!(store.get("cs1").unwrap().is_some());
        assert_eq!(store.active_id().unwrap().as_deref(), Some("cs1"));
    }
}
