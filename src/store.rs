use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use camino::{Utf8Path, Utf8PathBuf};

use crate::config::Config;
use crate::domain::DatasetName;
use crate::error::VgdError;

/// Layout of the local datasets cache: one folder per dataset directly under
/// the datasets root.
#[derive(Debug, Clone)]
pub struct Store {
    datasets_root: Utf8PathBuf,
}

impl Store {
    pub fn new(datasets_root: Utf8PathBuf) -> Self {
        Self { datasets_root }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.datasets_path().to_path_buf())
    }

    pub fn datasets_root(&self) -> &Utf8Path {
        &self.datasets_root
    }

    pub fn dataset_dir(&self, name: &DatasetName) -> Utf8PathBuf {
        self.datasets_root.join(name.as_str())
    }

    pub fn exists(&self, name: &DatasetName) -> bool {
        self.dataset_dir(name).as_std_path().exists()
    }

    /// Names of all dataset folders currently in the cache, sorted.
    pub fn list_local(&self) -> Result<Vec<String>, VgdError> {
        if !self.datasets_root.as_std_path().exists() {
            return Ok(Vec::new());
        }
        let entries = fs::read_dir(self.datasets_root.as_std_path())
            .map_err(|err| VgdError::Filesystem(err.to_string()))?;
        let mut names = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|err| VgdError::Filesystem(err.to_string()))?;
            let name = entry.file_name().to_string_lossy().to_string();
            if entry.path().is_dir() && !name.starts_with('.') {
                names.push(name);
            }
        }
        names.sort();
        Ok(names)
    }

    /// Path of a cached dataset, or a not-found error naming the closest
    /// cached dataset.
    pub fn resolve_dataset(&self, name: &DatasetName) -> Result<Utf8PathBuf, VgdError> {
        let path = self.dataset_dir(name);
        if path.as_std_path().exists() {
            return Ok(path);
        }
        let suggestion = self
            .list_local()?
            .into_iter()
            .map(|candidate| (similarity(name.as_str(), &candidate), candidate))
            .filter(|(score, _)| *score > 0.0)
            .max_by(|a, b| a.0.total_cmp(&b.0))
            .map(|(_, candidate)| candidate);
        Err(VgdError::DatasetNotFoundLocal {
            name: name.to_string(),
            suggestion,
        })
    }

    pub fn remove(&self, name: &DatasetName) -> Result<bool, VgdError> {
        let path = self.dataset_dir(name);
        if !path.as_std_path().exists() {
            return Ok(false);
        }
        fs::remove_dir_all(path.as_std_path())
            .map_err(|err| VgdError::Filesystem(err.to_string()))?;
        Ok(true)
    }

    pub fn copy_dir_recursive(source: &Path, dest: &Path) -> Result<(), VgdError> {
        fs::create_dir_all(dest).map_err(|err| VgdError::Filesystem(err.to_string()))?;
        for entry in walk_dir(source)? {
            let relative = entry
                .strip_prefix(source)
                .map_err(|err| VgdError::Filesystem(err.to_string()))?;
            let target = dest.join(relative);
            if entry.is_dir() {
                fs::create_dir_all(&target)
                    .map_err(|err| VgdError::Filesystem(err.to_string()))?;
            } else {
                if let Some(parent) = target.parent() {
                    fs::create_dir_all(parent)
                        .map_err(|err| VgdError::Filesystem(err.to_string()))?;
                }
                fs::copy(&entry, &target).map_err(|err| VgdError::Filesystem(err.to_string()))?;
            }
        }
        Ok(())
    }
}

/// Every file and folder below `root`, sorted. Symlinks are listed but not
/// followed.
pub fn walk_dir(root: &Path) -> Result<Vec<PathBuf>, VgdError> {
    let mut items = Vec::new();
    let mut pending = vec![root.to_path_buf()];
    while let Some(dir) = pending.pop() {
        let entries = fs::read_dir(&dir)
            .map_err(|err| VgdError::Filesystem(format!("{}: {err}", dir.display())))?;
        for entry in entries {
            let entry = entry.map_err(|err| VgdError::Filesystem(err.to_string()))?;
            let file_type = entry
                .file_type()
                .map_err(|err| VgdError::Filesystem(err.to_string()))?;
            if file_type.is_dir() {
                pending.push(entry.path());
            }
            items.push(entry.path());
        }
    }
    items.sort();
    Ok(items)
}

pub fn dir_size(root: &Path) -> Result<u64, VgdError> {
    let mut total = 0;
    for path in walk_dir(root)? {
        let metadata =
            fs::symlink_metadata(&path).map_err(|err| VgdError::Filesystem(err.to_string()))?;
        if metadata.is_file() {
            total += metadata.len();
        }
    }
    Ok(total)
}

/// Moves the folder `from` to `to`, replacing an existing `to`. The old folder
/// is parked beside `to` first and put back if the move fails, so `to` is
/// never left missing or half written.
pub fn atomic_rename_dir(from: &Path, to: &Path) -> io::Result<()> {
    if !to.exists() {
        return fs::rename(from, to);
    }
    let parked = parked_path(to)?;
    fs::rename(to, &parked)?;
    if let Err(err) = fs::rename(from, to) {
        fs::rename(&parked, to)?;
        return Err(err);
    }
    fs::remove_dir_all(&parked)
}

fn parked_path(to: &Path) -> io::Result<PathBuf> {
    let name = to
        .file_name()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "destination has no name"))?;
    Ok(to.with_file_name(format!(
        ".{}.replaced-{}",
        name.to_string_lossy(),
        std::process::id()
    )))
}

/// Normalized edit-distance similarity in `[0, 1]`.
fn similarity(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let longest = a.len().max(b.len());
    if longest == 0 {
        return 1.0;
    }
    let mut previous: Vec<usize> = (0..=b.len()).collect();
    let mut current = vec![0; b.len() + 1];
    for (i, ca) in a.iter().enumerate() {
        current[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != cb);
            current[j + 1] = (previous[j] + cost)
                .min(previous[j + 1] + 1)
                .min(current[j] + 1);
        }
        std::mem::swap(&mut previous, &mut current);
    }
    1.0 - previous[b.len()] as f64 / longest as f64
}
