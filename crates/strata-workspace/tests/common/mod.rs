// Shared fixtures for the strata-workspace integration tests.
//
// `FlakyModel` wraps a `FileModel` and can be told to fail a specific
// `save_layer` call or the `save_manifest` call, optionally running a hook
// first (used to sabotage the backup or the destination for double-fault
// scenarios). It can also run a hook after each successful layer save, or
// point layer directories somewhere unreadable so backups cannot be taken.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde_json::{json, Map, Value};
use strata_audit::hasher::hash_file;
use strata_changeset::StagedChange;
use strata_model::{Element, FileModel, Layer, Model, ModelError, ModelManifest};
use strata_workspace::{StagingArea, StagingConfig};
use tempfile::TempDir;

pub type Hook = Box<dyn FnMut(&Path) + Send>;

pub struct FlakyModel {
    inner: FileModel,
    pub fail_save_layer: Option<String>,
    pub fail_save_manifest: bool,
    pub on_fail: Option<Hook>,
    pub after_save_layer: Option<Hook>,
    /// When set, layer directories resolve to the manifest file, so copying
    /// them into a backup fails. The hook runs first with the model root.
    pub break_layer_dirs: Option<Box<dyn Fn(&Path) + Send>>,
}

impl FlakyModel {
    pub fn new(inner: FileModel) -> Self {
        Self {
            inner,
            fail_save_layer: None,
            fail_save_manifest: false,
            on_fail: None,
            after_save_layer: None,
            break_layer_dirs: None,
        }
    }

    fn injected(&mut self, what: &str) -> ModelError {
        if let Some(hook) = self.on_fail.as_mut() {
            hook(self.inner.root_path());
        }
        let path = self.inner.root_path().join(what);
        ModelError::IoError {
            path,
            source: std::io::Error::other("injected failure"),
        }
    }
}

impl Model for FlakyModel {
    fn root_path(&self) -> &Path {
        self.inner.root_path()
    }

    fn manifest(&self) -> &ModelManifest {
        self.inner.manifest()
    }

    fn manifest_mut(&mut self) -> &mut ModelManifest {
        self.inner.manifest_mut()
    }

    fn layer_names(&self) -> Vec<String> {
        self.inner.layer_names()
    }

    fn layer(&self, name: &str) -> Option<&Layer> {
        self.inner.layer(name)
    }

    fn layer_mut(&mut self, name: &str) -> Option<&mut Layer> {
        self.inner.layer_mut(name)
    }

    fn save_layer(&mut self, name: &str) -> Result<(), ModelError> {
        if self.fail_save_layer.as_deref() == Some(name) {
            return Err(self.injected(name));
        }
        self.inner.save_layer(name)?;
        if let Some(hook) = self.after_save_layer.as_mut() {
            hook(self.inner.root_path());
        }
        Ok(())
    }

    fn save_manifest(&mut self) -> Result<(), ModelError> {
        if self.fail_save_manifest {
            return Err(self.injected("manifest.yaml"));
        }
        self.inner.save_manifest()
    }

    fn reload(&mut self) -> Result<(), ModelError> {
        self.inner.reload()
    }

    fn layer_dir(&self, name: &str) -> PathBuf {
        match &self.break_layer_dirs {
            Some(hook) => {
                hook(self.inner.root_path());
                self.inner.manifest_path()
            }
            None => self.inner.layer_dir(name),
        }
    }
}

pub fn fields(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => panic!("expected object"),
    }
}

pub fn add(layer: &str, id: &str) -> StagedChange {
    StagedChange::add(layer, id, fields(json!({ "type": "service", "name": id })))
}

/// A model with `business` (holding `customer`) and `application` (holding `portal`).
pub fn seeded_model(root: &Path) -> FileModel {
    let mut model = FileModel::init(root, "demo", &["business", "application"]).unwrap();
    model
        .layer_mut("business")
        .unwrap()
        .add_element(Element::new("customer", "actor", "Customer").with_property("tier", "basic"));
    model
        .layer_mut("application")
        .unwrap()
        .add_element(Element::new("portal", "component", "Portal").with_relationship("customer", "serves"));
    model.save_layer("business").unwrap();
    model.save_layer("application").unwrap();
    model
}

pub fn file_area() -> (TempDir, StagingArea<FileModel>) {
    let dir = TempDir::new().unwrap();
    let model = seeded_model(dir.path());
    let area = StagingArea::new(model, StagingConfig::for_model(dir.path())).unwrap();
    (dir, area)
}

pub fn flaky_area() -> (TempDir, StagingArea<FlakyModel>) {
    let dir = TempDir::new().unwrap();
    let model = FlakyModel::new(seeded_model(dir.path()));
    let area = StagingArea::new(model, StagingConfig::for_model(dir.path())).unwrap();
    (dir, area)
}

/// sha256 of the manifest and every file under `layers/`, keyed by relative path.
pub fn model_checksums(root: &Path) -> BTreeMap<String, String> {
    let mut sums = BTreeMap::new();
    let manifest = root.join("manifest.yaml");
    sums.insert("manifest.yaml".to_string(), hash_file(&manifest).unwrap().0);
    let mut files = Vec::new();
    collect(&root.join("layers"), &mut files);
    for path in files {
        let rel = path.strip_prefix(root).unwrap().to_string_lossy().to_string();
        sums.insert(rel, hash_file(&path).unwrap().0);
    }
    sums
}

fn collect(dir: &Path, files: &mut Vec<PathBuf>) {
    if !dir.is_dir() {
        return;
    }
    for entry in fs::read_dir(dir).unwrap() {
        let path = entry.unwrap().path();
        if path.is_dir() {
            collect(&path, files);
        } else {
            files.push(path);
        }
    }
}

/// Every backup directory under `<root>/.backups`.
pub fn backup_dirs(root: &Path) -> Vec<PathBuf> {
    let dir = root.join(".backups");
    if !dir.is_dir() {
        return Vec::new();
    }
    let mut dirs: Vec<PathBuf> = fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().path())
        .filter(|p| p.is_dir())
        .collect();
    dirs.sort();
    dirs
}
