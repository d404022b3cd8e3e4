// config.rs — Staging area configuration.
//
// `StagingConfig::for_model()` produces the standard layout under the model
// root. An optional `.strata/config.toml` can override any of it; relative
// paths in the file are resolved against the model root.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::StagingError;

/// Directory (relative to the model root) holding Strata's own state.
pub const STATE_DIR: &str = ".strata";

/// Directory (relative to the model root) holding commit backups.
pub const BACKUPS_DIR: &str = ".backups";

/// Resolved configuration for a staging area.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StagingConfig {
    /// One JSON file per changeset, plus the `.active` marker.
    pub changesets_dir: PathBuf,

    /// One `backup-<timestamp>/` directory per in-flight commit.
    pub backups_dir: PathBuf,

    pub cache: CacheConfig,

    /// Keep the backup after a successful commit instead of deleting it.
    pub keep_backups: bool,
}

/// Projection cache tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Entries older than this are never served.
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,

    /// Minimum interval between sweeps of expired entries.
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_ttl_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

// Serde default functions
fn default_ttl_secs() -> u64 {
    300
}

fn default_sweep_interval_secs() -> u64 {
    60
}

/// On-disk shape of `.strata/config.toml`. Every field is optional.
#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
    changesets_dir: Option<PathBuf>,
    backups_dir: Option<PathBuf>,
    #[serde(default)]
    cache: CacheConfig,
    #[serde(default)]
    keep_backups: bool,
}

impl StagingConfig {
    /// Standard layout for a model rooted at `model_root`.
    pub fn for_model(model_root: impl AsRef<Path>) -> Self {
        let root = model_root.as_ref();
        Self {
            changesets_dir: root.join(STATE_DIR).join("changesets"),
            backups_dir: root.join(BACKUPS_DIR),
            cache: CacheConfig::default(),
            keep_backups: false,
        }
    }

    /// Path of the optional config file for a model.
    pub fn config_path(model_root: impl AsRef<Path>) -> PathBuf {
        model_root.as_ref().join(STATE_DIR).join("config.toml")
    }

    /// Load `.strata/config.toml`, layering it over the defaults.
    pub fn load(model_root: impl AsRef<Path>) -> Result<Self, StagingError> {
        let root = model_root.as_ref();
        let path = Self::config_path(root);
        let content = std::fs::read_to_string(&path).map_err(|source| StagingError::IoError {
            path: path.clone(),
            source,
        })?;
        let file: ConfigFile = toml::from_str(&content).map_err(|e| StagingError::ConfigError {
            path: path.clone(),
            reason: e.to_string(),
        })?;

        let defaults = Self::for_model(root);
        Ok(Self {
            changesets_dir: file
                .changesets_dir
                .map(|p| root.join(p))
                .unwrap_or(defaults.changesets_dir),
            backups_dir: file
                .backups_dir
                .map(|p| root.join(p))
                .unwrap_or(defaults.backups_dir),
            cache: file.cache,
            keep_backups: file.keep_backups,
        })
    }

    /// Load the config file if present; fall back to defaults otherwise.
    /// A malformed file is logged and ignored.
    pub fn load_or_default(model_root: impl AsRef<Path>) -> Self {
        let root = model_root.as_ref();
        if !Self::config_path(root).exists() {
            return Self::for_model(root);
        }
        Self::load(root).unwrap_or_else(|e| {
            tracing::warn!("ignoring staging config: {}", e);
            Self::for_model(root)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn defaults_follow_standard_layout() {
        let config = StagingConfig::for_model("/models/demo");
        assert_eq!(
            config.changesets_dir,
            PathBuf::from("/models/demo/.strata/changesets")
        );
        assert_eq!(config.backups_dir, PathBuf::from("/models/demo/.backups"));
        assert_eq!(config.cache.ttl(), Duration::from_secs(300));
        assert_eq!(config.cache.sweep_interval(), Duration::from_secs(60));
        assert!(!config.keep_backups);
    }

    #[test]
    fn file_overrides_are_resolved_against_root() {
        let dir = tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join(STATE_DIR)).unwrap();
        std::fs::write(
            StagingConfig::config_path(dir.path()),
            "backups_dir = \"safety/backups\"\nkeep_backups = true\n\n[cache]\nttl_secs = 30\n",
        )
        .unwrap();

        let config = StagingConfig::load(dir.path()).unwrap();
        assert_eq!(config.backups_dir, dir.path().join("safety/backups"));
        assert_eq!(config.changesets_dir, dir.path().join(".strata/changesets"));
        assert_eq!(config.cache.ttl_secs, 30);
        assert_eq!(config.cache.sweep_interval_secs, 60);
        assert!(config.keep_backups);
    }

    #[test]
    fn malformed_file_falls_back_to_defaults() {
        let dir = tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join(STATE_DIR)).unwrap();
        std::fs::write(StagingConfig::config_path(dir.path()), "keep_backups = [").unwrap();

        assert!(matches!(
            StagingConfig::load(dir.path()),
            Err(StagingError::ConfigError { .. })
        ));
        let config = StagingConfig::load_or_default(dir.path());
        assert_eq!(config.backups_dir, dir.path().join(BACKUPS_DIR));
    }

    #[test]
    fn missing_file_uses_defaults() {
        let dir = tempdir().unwrap();
        let config = StagingConfig::load_or_default(dir.path());
        assert_eq!(config.changesets_dir, dir.path().join(".strata/changesets"));
    }
}
