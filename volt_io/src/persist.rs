//! JSON persistence of fitted pipeline state.

use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::Serialize;
use volt_core::{Normalizer, PostProcessor};

use crate::error::{Result, VoltIoError};

/// Write any serializable value as pretty JSON, creating parent directories.
pub fn save_json<T: Serialize>(value: &T, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| VoltIoError::io(parent, e))?;
    }
    let file = File::create(path).map_err(|e| VoltIoError::io(path, e))?;
    serde_json::to_writer_pretty(BufWriter::new(file), value).map_err(|e| VoltIoError::json(path, e))
}

/// Read a JSON document.
pub fn load_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let file = File::open(path).map_err(|e| VoltIoError::io(path, e))?;
    serde_json::from_reader(BufReader::new(file)).map_err(|e| VoltIoError::json(path, e))
}

/// Save fitted normalization statistics.
pub fn save_normalizer(normalizer: &Normalizer, path: &Path) -> Result<()> {
    save_json(normalizer, path)
}

/// Load normalization statistics.
pub fn load_normalizer(path: &Path) -> Result<Normalizer> {
    load_json(path)
}

/// Save post-processing chains.
pub fn save_postprocessor(post: &PostProcessor, path: &Path) -> Result<()> {
    save_json(post, path)
}

/// Load post-processing chains.
pub fn load_postprocessor(path: &Path) -> Result<PostProcessor> {
    load_json(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use volt_core::{FeatureNames, NormalizerConfig, PooledValues, TransformSpec};

    #[test]
    fn test_normalizer_survives_disk() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("stats").join("normalizer.json");

        let mut pooled = PooledValues::new();
        pooled
            .entry("load".into())
            .or_default()
            .insert("p_mw".into(), vec![1.0, 2.0, 6.0]);
        let names = FeatureNames::new().with_class("load", ["p_mw"]);
        let normalizer = Normalizer::fit(&pooled, &names, &NormalizerConfig::default());

        save_normalizer(&normalizer, &path).unwrap();
        assert_eq!(load_normalizer(&path).unwrap(), normalizer);
    }

    #[test]
    fn test_postprocessor_survives_disk() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("post.json");
        let post = PostProcessor::identity().with_chain(
            "bus",
            "res_vm_pu",
            vec![TransformSpec::affine(1.0, 0.05)],
        );
        save_postprocessor(&post, &path).unwrap();
        assert_eq!(load_postprocessor(&path).unwrap(), post);
    }

    #[test]
    fn test_missing_file() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(
            load_normalizer(&dir.path().join("absent.json")),
            Err(VoltIoError::Io { .. })
        ));
    }
}
