//! Dataset directory listing.
//!
//! A dataset is a directory of per-sample grid files, split into `train/` and
//! `test/` subdirectories.

use std::fs;
use std::path::{Path, PathBuf};

use volt_core::select_sample;

use crate::error::{Result, VoltIoError};

/// Sorted files of `dir` whose extension is one of `extensions`, optionally
/// shuffled (seeded) and truncated to `n_samples`.
///
/// Errors when no valid file remains.
pub fn list_valid_files(
    dir: &Path,
    extensions: &[&str],
    shuffle: bool,
    n_samples: Option<usize>,
    seed: u64,
) -> Result<Vec<PathBuf>> {
    let entries = fs::read_dir(dir).map_err(|e| VoltIoError::io(dir, e))?;
    let mut files = Vec::new();
    for entry in entries {
        let path = entry.map_err(|e| VoltIoError::io(dir, e))?.path();
        let valid = path.is_file()
            && path
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|ext| extensions.iter().any(|v| v.eq_ignore_ascii_case(ext)));
        if valid {
            files.push(path);
        }
    }
    files.sort();

    let amount = n_samples.unwrap_or(files.len());
    let files = select_sample(&files, amount, shuffle, seed);
    if files.is_empty() {
        return Err(VoltIoError::NoValidFiles {
            dir: dir.to_path_buf(),
            extensions: extensions.iter().map(|e| e.to_string()).collect(),
        });
    }
    log::debug!("Found {} valid files in {:?}", files.len(), dir);
    Ok(files)
}

/// Train and test file lists of a dataset root.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DatasetSplit {
    /// Files of `train/`.
    pub train: Vec<PathBuf>,
    /// Files of `test/` (empty when the directory is absent).
    pub test: Vec<PathBuf>,
}

impl DatasetSplit {
    /// Name of the training subdirectory.
    pub const TRAIN_DIR: &'static str = "train";
    /// Name of the test subdirectory.
    pub const TEST_DIR: &'static str = "test";

    /// List `root/train` (required) and `root/test` (optional).
    pub fn open(root: &Path, extensions: &[&str]) -> Result<Self> {
        let train = list_valid_files(&root.join(Self::TRAIN_DIR), extensions, false, None, 0)?;
        let test_dir = root.join(Self::TEST_DIR);
        let test = if test_dir.is_dir() {
            list_valid_files(&test_dir, extensions, false, None, 0)?
        } else {
            Vec::new()
        };
        Ok(Self { train, test })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn touch(dir: &Path, name: &str) {
        fs::write(dir.join(name), "{}").unwrap();
    }

    #[test]
    fn test_list_filters_and_sorts() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "b.json");
        touch(dir.path(), "a.json");
        touch(dir.path(), "readme.md");
        fs::create_dir(dir.path().join("nested.json")).unwrap();

        let files = list_valid_files(dir.path(), &["json"], false, None, 0).unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_str().unwrap().to_string())
            .collect();
        assert_eq!(names, vec!["a.json", "b.json"]);

        let one = list_valid_files(dir.path(), &["json"], true, Some(1), 3).unwrap();
        assert_eq!(one.len(), 1);
    }

    #[test]
    fn test_empty_directory_is_an_error() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "notes.txt");
        assert!(matches!(
            list_valid_files(dir.path(), &["json"], false, None, 0),
            Err(VoltIoError::NoValidFiles { .. })
        ));
    }

    #[test]
    fn test_split_without_test_dir() {
        let root = TempDir::new().unwrap();
        let train = root.path().join("train");
        fs::create_dir(&train).unwrap();
        touch(&train, "s0.json");

        let split = DatasetSplit::open(root.path(), &["json"]).unwrap();
        assert_eq!(split.train.len(), 1);
        assert!(split.test.is_empty());
    }
}
