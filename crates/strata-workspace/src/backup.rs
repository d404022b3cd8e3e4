// backup.rs — Checksummed, self-verifying backups of a model's files.
//
// Before a commit touches any file, the model manifest and every layer
// directory are copied into a fresh backup directory:
//
//   <backups_dir>/backup-<timestamp>/
//     manifest.yaml
//     layers/<layer>/elements.yaml
//     .backup-manifest.json        ← {path, checksum, size} per file
//
// The backup is re-verified against its own manifest immediately after it
// is written. Verification accumulates every discrepancy instead of
// stopping at the first one. Restoration puts the manifest back first and
// refuses to continue if that fails; layer failures are collected and
// reported together.

use std::collections::{BTreeSet, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strata_audit::hasher::{hash_bytes, hash_file};
use strata_model::{write_atomic, Model, LAYERS_DIR};

use crate::error::BackupError;

/// File name of the per-backup checksum manifest.
pub const BACKUP_MANIFEST_FILE: &str = ".backup-manifest.json";

/// Prefix of every backup directory name.
pub const BACKUP_DIR_PREFIX: &str = "backup-";

/// One backed-up file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BackupEntry {
    /// Path relative to the backup directory, `/`-separated.
    pub path: String,
    /// SHA-256 of the file content (hex).
    pub checksum: String,
    /// File size in bytes.
    pub size: u64,
}

/// Contents of `.backup-manifest.json`. Written once, never mutated.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BackupManifest {
    pub created_at: DateTime<Utc>,
    /// File name of the model manifest copy inside the backup.
    pub manifest_file: String,
    /// Every layer present in the model when the backup was taken,
    /// including layers that had no files.
    pub layers: Vec<String>,
    pub files: Vec<BackupEntry>,
}

/// Outcome of verifying a backup against its manifest.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IntegrityReport {
    pub is_valid: bool,
    pub files_checked: usize,
    pub errors: Vec<String>,
}

/// A backup on disk together with its manifest.
#[derive(Debug, Clone)]
pub struct Backup {
    pub path: PathBuf,
    pub manifest: BackupManifest,
}

impl Backup {
    /// Load an existing backup directory.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, BackupError> {
        let path = path.as_ref().to_path_buf();
        if !path.is_dir() {
            return Err(BackupError::MissingBackup(path));
        }
        let manifest = read_backup_manifest(&path)?;
        Ok(Self { path, manifest })
    }
}

/// What a successful restore put back.
#[derive(Debug, Clone, Default)]
pub struct RestoreSummary {
    pub files_restored: usize,
    pub layers_restored: Vec<String>,
}

/// Creates, verifies, restores, and removes model backups.
pub struct BackupManager {
    backups_dir: PathBuf,
}

impl BackupManager {
    pub fn new(backups_dir: impl AsRef<Path>) -> Self {
        Self {
            backups_dir: backups_dir.as_ref().to_path_buf(),
        }
    }

    pub fn backups_dir(&self) -> &Path {
        &self.backups_dir
    }

    /// Back up the model's persisted files into a new directory and verify it.
    ///
    /// On failure the partial directory is removed. If that removal also
    /// fails, `BackupError::Orphaned` is returned so the caller can escalate.
    pub fn create(&self, model: &dyn Model) -> Result<Backup, BackupError> {
        let dir = self.allocate_dir()?;
        match populate(&dir, model) {
            Ok(manifest) => {
                tracing::info!(
                    "created backup at {} ({} file(s))",
                    dir.display(),
                    manifest.files.len()
                );
                Ok(Backup {
                    path: dir,
                    manifest,
                })
            }
            Err(cause) => match fs::remove_dir_all(&dir) {
                Ok(()) => Err(cause),
                Err(cleanup) => {
                    tracing::error!(
                        "CRITICAL: partial backup at {} could not be removed: {}",
                        dir.display(),
                        cleanup
                    );
                    Err(BackupError::Orphaned {
                        path: dir,
                        cause: Box::new(cause),
                        cleanup,
                    })
                }
            },
        }
    }

    /// Verify a backup directory against its `.backup-manifest.json`.
    ///
    /// `Ok` with `is_valid == false` means the content is damaged (missing or
    /// mismatched files). `Err` means verification could not run at all:
    /// the directory is gone or the manifest is unreadable.
    pub fn verify(&self, backup_dir: &Path) -> Result<IntegrityReport, BackupError> {
        verify_backup(backup_dir)
    }

    /// Restore the model's files from a backup.
    ///
    /// The model manifest goes first; if it cannot be restored, nothing else
    /// is attempted. Then every layer is restored. A layer missing from the
    /// backup, a destination that cannot be created, or any file that fails
    /// is collected and reported together.
    pub fn restore(&self, backup: &Backup, model: &dyn Model) -> Result<RestoreSummary, BackupError> {
        let mut summary = RestoreSummary::default();

        let source = backup.path.join(&backup.manifest.manifest_file);
        let data = fs::read(&source).map_err(|e| BackupError::ManifestRestoreFailed {
            path: source.clone(),
            reason: format!("cannot read backup copy: {}", e),
        })?;
        if let Some(entry) = backup
            .manifest
            .files
            .iter()
            .find(|e| e.path == backup.manifest.manifest_file)
        {
            if hash_bytes(&data) != entry.checksum {
                return Err(BackupError::ManifestRestoreFailed {
                    path: source,
                    reason: "backup copy does not match its recorded checksum".to_string(),
                });
            }
        }
        let dest = model.manifest_path();
        write_atomic(&dest, &data).map_err(|e| BackupError::ManifestRestoreFailed {
            path: dest.clone(),
            reason: e.to_string(),
        })?;
        summary.files_restored += 1;

        let mut failures = Vec::new();
        let mut layer_names: Vec<String> = backup.manifest.layers.clone();
        let known: BTreeSet<String> = layer_names.iter().cloned().collect();
        for name in model.layer_names() {
            if !known.contains(&name) {
                layer_names.push(name);
            }
        }

        for name in layer_names {
            if !known.contains(&name) {
                failures.push(format!("layer '{}': absent from backup", name));
                continue;
            }
            match restore_layer(backup, model, &name) {
                Ok(count) => {
                    summary.files_restored += count;
                    summary.layers_restored.push(name);
                }
                Err(mut errs) => failures.append(&mut errs),
            }
        }

        if !failures.is_empty() {
            tracing::error!("layer restoration FAILED: {} problem(s)", failures.len());
            return Err(BackupError::RestorationFailed { failures });
        }

        tracing::info!(
            "restored {} file(s) from backup {}",
            summary.files_restored,
            backup.path.display()
        );
        Ok(summary)
    }

    /// Delete a backup directory.
    pub fn remove(&self, backup: &Backup) -> Result<(), BackupError> {
        fs::remove_dir_all(&backup.path).map_err(|source| BackupError::IoError {
            path: backup.path.clone(),
            source,
        })
    }

    /// All backup directories currently on disk, oldest first.
    pub fn list_backups(&self) -> Result<Vec<PathBuf>, BackupError> {
        if !self.backups_dir.exists() {
            return Ok(Vec::new());
        }
        let entries = fs::read_dir(&self.backups_dir).map_err(|source| BackupError::IoError {
            path: self.backups_dir.clone(),
            source,
        })?;
        let mut dirs: Vec<PathBuf> = entries
            .flatten()
            .map(|e| e.path())
            .filter(|p| {
                p.is_dir()
                    && p.file_name()
                        .and_then(|n| n.to_str())
                        .is_some_and(|n| n.starts_with(BACKUP_DIR_PREFIX))
            })
            .collect();
        dirs.sort();
        Ok(dirs)
    }

    /// Create a fresh, uniquely named backup directory.
    fn allocate_dir(&self) -> Result<PathBuf, BackupError> {
        fs::create_dir_all(&self.backups_dir).map_err(|source| BackupError::IoError {
            path: self.backups_dir.clone(),
            source,
        })?;

        let stamp = Utc::now().format("%Y%m%dT%H%M%S%3fZ").to_string();
        let mut attempt = 0u32;
        loop {
            let name = if attempt == 0 {
                format!("{}{}", BACKUP_DIR_PREFIX, stamp)
            } else {
                format!("{}{}-{}", BACKUP_DIR_PREFIX, stamp, attempt)
            };
            let dir = self.backups_dir.join(name);
            match fs::create_dir(&dir) {
                Ok(()) => return Ok(dir),
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => attempt += 1,
                Err(source) => return Err(BackupError::IoError { path: dir, source }),
            }
        }
    }
}

/// Verify a backup directory. See [`BackupManager::verify`].
pub fn verify_backup(backup_dir: &Path) -> Result<IntegrityReport, BackupError> {
    if !backup_dir.is_dir() {
        return Err(BackupError::MissingBackup(backup_dir.to_path_buf()));
    }
    let manifest = read_backup_manifest(backup_dir)?;

    let mut errors = Vec::new();
    for entry in &manifest.files {
        let path = backup_dir.join(&entry.path);
        if !path.exists() {
            errors.push(format!("missing file: {}", entry.path));
            continue;
        }
        match hash_file(&path) {
            Ok((checksum, size)) => {
                if checksum != entry.checksum {
                    errors.push(format!(
                        "checksum mismatch: {} (expected {}, found {})",
                        entry.path, entry.checksum, checksum
                    ));
                }
                if size != entry.size {
                    errors.push(format!(
                        "size mismatch: {} (expected {} bytes, found {})",
                        entry.path, entry.size, size
                    ));
                }
            }
            Err(e) => errors.push(format!("unreadable file: {} ({})", entry.path, e)),
        }
    }

    Ok(IntegrityReport {
        is_valid: errors.is_empty(),
        files_checked: manifest.files.len(),
        errors,
    })
}

fn read_backup_manifest(backup_dir: &Path) -> Result<BackupManifest, BackupError> {
    let path = backup_dir.join(BACKUP_MANIFEST_FILE);
    let json = fs::read_to_string(&path).map_err(|e| BackupError::MalformedManifest {
        path: path.clone(),
        reason: e.to_string(),
    })?;
    serde_json::from_str(&json).map_err(|e| BackupError::MalformedManifest {
        path,
        reason: e.to_string(),
    })
}

/// Copy the model's files into `dir`, write the manifest, and self-verify.
fn populate(dir: &Path, model: &dyn Model) -> Result<BackupManifest, BackupError> {
    let mut files = Vec::new();

    let manifest_src = model.manifest_path();
    let manifest_file = manifest_src
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| strata_model::MANIFEST_FILE.to_string());
    files.push(copy_file(&manifest_src, dir, &manifest_file)?);

    let mut layers = Vec::new();
    for name in model.layer_names() {
        let src_dir = model.layer_dir(&name);
        let mut rel_files = Vec::new();
        walk_files(&src_dir, &src_dir, &mut rel_files)?;
        for rel in rel_files {
            let backup_rel = format!("{}/{}/{}", LAYERS_DIR, name, rel);
            files.push(copy_file(&src_dir.join(&rel), dir, &backup_rel)?);
        }
        layers.push(name);
    }

    let manifest = BackupManifest {
        created_at: Utc::now(),
        manifest_file,
        layers,
        files,
    };
    let json = serde_json::to_string_pretty(&manifest)?;
    let manifest_path = dir.join(BACKUP_MANIFEST_FILE);
    fs::write(&manifest_path, json).map_err(|source| BackupError::IoError {
        path: manifest_path,
        source,
    })?;

    let report = verify_backup(dir)?;
    if !report.is_valid {
        return Err(BackupError::VerificationFailed {
            path: dir.to_path_buf(),
            errors: report.errors,
        });
    }
    Ok(manifest)
}

/// Copy one file into the backup and record its checksum and size.
fn copy_file(src: &Path, backup_dir: &Path, rel: &str) -> Result<BackupEntry, BackupError> {
    let data = fs::read(src).map_err(|source| BackupError::IoError {
        path: src.to_path_buf(),
        source,
    })?;
    let dest = backup_dir.join(rel);
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent).map_err(|source| BackupError::IoError {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    fs::write(&dest, &data).map_err(|source| BackupError::IoError {
        path: dest.clone(),
        source,
    })?;
    Ok(BackupEntry {
        path: rel.to_string(),
        checksum: hash_bytes(&data),
        size: data.len() as u64,
    })
}

/// Restore one layer. Returns the number of files written, or every
/// problem encountered for this layer.
fn restore_layer(backup: &Backup, model: &dyn Model, name: &str) -> Result<usize, Vec<String>> {
    let dest_dir = model.layer_dir(name);
    if let Err(e) = fs::create_dir_all(&dest_dir) {
        return Err(vec![format!(
            "layer '{}': cannot resolve destination {} ({})",
            name,
            dest_dir.display(),
            e
        )]);
    }

    let prefix = format!("{}/{}/", LAYERS_DIR, name);
    let mut failures = Vec::new();
    let mut restored = 0;
    let mut expected = HashSet::new();

    for entry in backup.manifest.files.iter().filter(|e| e.path.starts_with(&prefix)) {
        let rel = &entry.path[prefix.len()..];
        expected.insert(rel.to_string());
        let src = backup.path.join(&entry.path);
        let data = match fs::read(&src) {
            Ok(data) => data,
            Err(e) => {
                failures.push(format!(
                    "layer '{}': cannot read backup file {} ({})",
                    name, entry.path, e
                ));
                continue;
            }
        };
        if hash_bytes(&data) != entry.checksum {
            failures.push(format!(
                "layer '{}': backup file {} does not match its recorded checksum",
                name, entry.path
            ));
            continue;
        }
        let dest = dest_dir.join(rel);
        match write_atomic(&dest, &data) {
            Ok(()) => restored += 1,
            Err(e) => failures.push(format!(
                "layer '{}': cannot write {} ({})",
                name,
                dest.display(),
                e
            )),
        }
    }

    // Files created after the backup was taken do not belong to the layer.
    let mut current = Vec::new();
    match walk_files(&dest_dir, &dest_dir, &mut current) {
        Ok(()) => {
            for rel in current.into_iter().filter(|r| !expected.contains(r)) {
                let path = dest_dir.join(&rel);
                if let Err(e) = fs::remove_file(&path) {
                    failures.push(format!(
                        "layer '{}': cannot remove stray file {} ({})",
                        name,
                        path.display(),
                        e
                    ));
                }
            }
        }
        Err(e) => failures.push(format!("layer '{}': cannot list destination ({})", name, e)),
    }

    if failures.is_empty() {
        Ok(restored)
    } else {
        Err(failures)
    }
}

/// Recursively collect `/`-separated file paths under `dir`, relative to `root`.
/// A missing directory yields nothing.
fn walk_files(dir: &Path, root: &Path, files: &mut Vec<String>) -> Result<(), BackupError> {
    if !dir.exists() {
        return Ok(());
    }
    let entries = fs::read_dir(dir).map_err(|source| BackupError::IoError {
        path: dir.to_path_buf(),
        source,
    })?;
    for entry in entries {
        let entry = entry.map_err(|source| BackupError::IoError {
            path: dir.to_path_buf(),
            source,
        })?;
        let path = entry.path();
        if path.is_dir() {
            walk_files(&path, root, files)?;
        } else if let Ok(rel) = path.strip_prefix(root) {
            let rel = rel
                .components()
                .map(|c| c.as_os_str().to_string_lossy().to_string())
                .collect::<Vec<_>>()
                .join("/");
            files.push(rel);
        }
    }
    files.sort();
    Ok(())
}
