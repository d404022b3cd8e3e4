// model.rs — The Model trait and its YAML-on-disk implementation.
//
// The staging engine only ever talks to a `dyn Model`, so persistence can be
// swapped (or wrapped, for fault injection in tests) without touching the
// commit protocol.
//
// On-disk layout of a FileModel:
//
//   <root>/manifest.yaml
//   <root>/layers/<layer-name>/elements.yaml

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::element::Element;
use crate::error::ModelError;
use crate::fsio::write_atomic;
use crate::layer::Layer;
use crate::manifest::ModelManifest;

/// File name of the model manifest, relative to the model root.
pub const MANIFEST_FILE: &str = "manifest.yaml";

/// Directory holding one subdirectory per layer, relative to the model root.
pub const LAYERS_DIR: &str = "layers";

/// File name of a layer's element list inside its layer directory.
pub const LAYER_FILE: &str = "elements.yaml";

/// A layered architecture model.
///
/// Implementations keep the model in memory and persist it on demand via
/// `save_layer` / `save_manifest`. `reload` discards in-memory state and
/// re-reads everything from disk.
pub trait Model {
    /// Directory the model is persisted under.
    fn root_path(&self) -> &Path;

    fn manifest(&self) -> &ModelManifest;

    fn manifest_mut(&mut self) -> &mut ModelManifest;

    /// Layer names in manifest order.
    fn layer_names(&self) -> Vec<String>;

    fn layer(&self, name: &str) -> Option<&Layer>;

    fn layer_mut(&mut self, name: &str) -> Option<&mut Layer>;

    /// Persist one layer.
    fn save_layer(&mut self, name: &str) -> Result<(), ModelError>;

    /// Persist the manifest.
    fn save_manifest(&mut self) -> Result<(), ModelError>;

    /// Re-read the whole model from disk.
    fn reload(&mut self) -> Result<(), ModelError>;

    /// Path of the persisted manifest file.
    fn manifest_path(&self) -> PathBuf {
        self.root_path().join(MANIFEST_FILE)
    }

    /// Directory holding the persisted files of one layer.
    fn layer_dir(&self, name: &str) -> PathBuf {
        self.root_path().join(LAYERS_DIR).join(name)
    }

    /// All layers, in manifest order.
    fn layers(&self) -> Vec<&Layer> {
        self.layer_names()
            .iter()
            .filter_map(|name| self.layer(name))
            .collect()
    }

    /// Find an element anywhere in the model, with the layer that holds it.
    fn element_by_id(&self, id: &str) -> Option<(&Layer, &Element)> {
        self.layers()
            .into_iter()
            .find_map(|layer| layer.element(id).map(|el| (layer, el)))
    }
}

/// A model persisted as YAML files under a root directory.
#[derive(Debug)]
pub struct FileModel {
    root: PathBuf,
    manifest: ModelManifest,
    layers: BTreeMap<String, Layer>,
}

impl FileModel {
    /// Create a new, empty model on disk with the given layers.
    pub fn init(
        root: impl AsRef<Path>,
        name: impl Into<String>,
        layer_names: &[&str],
    ) -> Result<Self, ModelError> {
        let root = root.as_ref().to_path_buf();
        let manifest = ModelManifest::new(
            name,
            layer_names.iter().map(|s| s.to_string()).collect(),
        );
        let layers = layer_names
            .iter()
            .map(|n| (n.to_string(), Layer::new(*n)))
            .collect();

        let mut model = Self {
            root,
            manifest,
            layers,
        };
        model.save_manifest()?;
        for name in model.layer_names() {
            model.save_layer(&name)?;
        }
        tracing::debug!("initialized model at {}", model.root.display());
        Ok(model)
    }

    /// Open an existing model from disk.
    pub fn open(root: impl AsRef<Path>) -> Result<Self, ModelError> {
        let root = root.as_ref().to_path_buf();
        let manifest: ModelManifest = read_yaml(&root.join(MANIFEST_FILE))?;
        let layers = load_layers(&root, &manifest)?;
        Ok(Self {
            root,
            manifest,
            layers,
        })
    }

    /// Add a new (empty) layer to the model in memory and the manifest.
    /// Call `save_manifest` and `save_layer` to persist it.
    pub fn add_layer(&mut self, name: impl Into<String>) -> &mut Layer {
        let name = name.into();
        if !self.manifest.layers.contains(&name) {
            self.manifest.layers.push(name.clone());
        }
        self.layers
            .entry(name.clone())
            .or_insert_with(|| Layer::new(name))
    }
}

impl Model for FileModel {
    fn root_path(&self) -> &Path {
        &self.root
    }

    fn manifest(&self) -> &ModelManifest {
        &self.manifest
    }

    fn manifest_mut(&mut self) -> &mut ModelManifest {
        &mut self.manifest
    }

    fn layer_names(&self) -> Vec<String> {
        self.manifest.layers.clone()
    }

    fn layer(&self, name: &str) -> Option<&Layer> {
        self.layers.get(name)
    }

    fn layer_mut(&mut self, name: &str) -> Option<&mut Layer> {
        self.layers.get_mut(name)
    }

    fn save_layer(&mut self, name: &str) -> Result<(), ModelError> {
        let path = self.layer_dir(name).join(LAYER_FILE);
        let layer = self
            .layers
            .get_mut(name)
            .ok_or_else(|| ModelError::LayerNotFound(name.to_string()))?;
        write_yaml(&path, layer)?;
        layer.mark_clean();
        Ok(())
    }

    fn save_manifest(&mut self) -> Result<(), ModelError> {
        let path = self.manifest_path();
        write_yaml(&path, &self.manifest)
    }

    fn reload(&mut self) -> Result<(), ModelError> {
        let manifest: ModelManifest = read_yaml(&self.manifest_path())?;
        let layers = load_layers(&self.root, &manifest)?;
        self.manifest = manifest;
        self.layers = layers;
        Ok(())
    }
}

/// Load every layer named in the manifest. A layer without a file on disk
/// is treated as empty.
fn load_layers(
    root: &Path,
    manifest: &ModelManifest,
) -> Result<BTreeMap<String, Layer>, ModelError> {
    let mut layers = BTreeMap::new();
    for name in &manifest.layers {
        let path = root.join(LAYERS_DIR).join(name).join(LAYER_FILE);
        let layer = if path.exists() {
            let mut layer: Layer = read_yaml(&path)?;
            layer.name = name.clone();
            layer
        } else {
            Layer::new(name.clone())
        };
        layers.insert(name.clone(), layer);
    }
    Ok(layers)
}

fn read_yaml<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, ModelError> {
    let content = fs::read_to_string(path).map_err(|source| ModelError::IoError {
        path: path.to_path_buf(),
        source,
    })?;
    serde_yaml::from_str(&content).map_err(|source| ModelError::YamlError {
        path: path.to_path_buf(),
        source,
    })
}

fn write_yaml<T: serde::Serialize>(path: &Path, value: &T) -> Result<(), ModelError> {
    let yaml = serde_yaml::to_string(value).map_err(|source| ModelError::YamlError {
        path: path.to_path_buf(),
        source,
    })?;
    write_atomic(path, yaml.as_bytes()).map_err(|source| ModelError::IoError {
        path: path.to_path_buf(),
        source,
    })
}
