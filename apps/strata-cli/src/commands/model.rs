// model.rs — Model subcommands: init.

use std::path::Path;

use strata_model::{FileModel, MANIFEST_FILE};

pub fn init(root: &Path, name: &str, layers: &[String]) -> anyhow::Result<()> {
    if root.join(MANIFEST_FILE).exists() {
        anyhow::bail!("a model already exists at {}", root.display());
    }
    let layer_refs: Vec<&str> = layers.iter().map(|s| s.as_str()).collect();
    FileModel::init(root, name, &layer_refs)?;

    println!("Initialized model '{}' at {}", name, root.display());
    println!("  Layers: {}", layers.join(", "));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_model::Model;
    use tempfile::TempDir;

    #[test]
    fn init_creates_model_once() {
        let dir = TempDir::new().unwrap();
        init(dir.path(), "demo", &["business".to_string(), "technology".to_string()]).unwrap();

        let model = FileModel::open(dir.path()).unwrap();
        assert_eq!(model.layer_names(), vec!["business", "technology"]);
        assert!(init(dir.path(), "demo", &[]).is_err());
    }
}
