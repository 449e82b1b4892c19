//! Reads a local dataset folder into an index-addressable collection of
//! [`GraphRecord`]s.
//!
//! Every element `i` is a pair of files `<i>.<metadata ext>` and
//! `<i>.<image ext>` in the same folder. An optional `.meta.json` carries
//! folder level information about the bundle.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::VgdError;
use crate::graph::GraphRecord;

pub const BUNDLE_METADATA_FILE: &str = ".meta.json";

pub type GraphIndexMap = HashMap<usize, GraphRecord>;
pub type BundleMetadata = Map<String, Value>;

#[derive(Debug, Clone)]
pub struct LoadOptions {
    pub metadata_extensions: Vec<String>,
    pub image_extensions: Vec<String>,
    /// Emit a progress log line every this many elements. 0 disables it.
    pub log_step: usize,
    /// Skip structurally invalid elements instead of failing the load.
    pub skip_malformed: bool,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            metadata_extensions: vec!["json".to_string()],
            image_extensions: vec!["png".to_string()],
            log_step: 100,
            skip_malformed: false,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SkippedElement {
    pub index: usize,
    pub reason: String,
}

#[derive(Debug, Clone)]
pub struct LoadedDataset {
    pub name: String,
    pub path: PathBuf,
    pub bundle_metadata: BundleMetadata,
    pub index_map: GraphIndexMap,
    /// Only filled when `skip_malformed` is set.
    pub skipped: Vec<SkippedElement>,
}

impl LoadedDataset {
    pub fn len(&self) -> usize {
        self.index_map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index_map.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&GraphRecord> {
        self.index_map.get(&index)
    }

    pub fn indices(&self) -> Vec<usize> {
        let mut indices: Vec<usize> = self.index_map.keys().copied().collect();
        indices.sort_unstable();
        indices
    }

    pub fn into_parts(self) -> (BundleMetadata, GraphIndexMap) {
        (self.bundle_metadata, self.index_map)
    }
}

#[derive(Debug, Default)]
struct ElementFiles {
    metadata: Vec<PathBuf>,
    images: Vec<PathBuf>,
}

impl ElementFiles {
    fn pair(&self, index: usize) -> Result<(&Path, &Path), VgdError> {
        let metadata = single(&self.metadata, index, "metadata")?;
        let image = single(&self.images, index, "image")?;
        Ok((metadata, image))
    }
}

fn single<'a>(
    paths: &'a [PathBuf],
    index: usize,
    role: &'static str,
) -> Result<&'a Path, VgdError> {
    match paths {
        [] => Err(VgdError::MissingPair {
            index,
            missing: role,
        }),
        [path] => Ok(path),
        [_, extra, ..] => Err(VgdError::DuplicateElement {
            index,
            path: extra.clone(),
        }),
    }
}

pub fn load_visual_graph_dataset(
    path: &Path,
    options: &LoadOptions,
) -> Result<LoadedDataset, VgdError> {
    let root = fs::canonicalize(path)
        .map_err(|err| VgdError::Filesystem(format!("{}: {err}", path.display())))?;
    let name = root
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_default();
    let start = Instant::now();

    let (bundle_metadata, elements) = scan_folder(&root, options)?;
    tracing::debug!(dataset = %name, elements = elements.len(), "scanned dataset folder");

    let total = elements.len();
    let mut index_map = HashMap::with_capacity(total);
    let mut skipped = Vec::new();
    for (position, (index, files)) in elements.into_iter().enumerate() {
        match load_element(index, &files) {
            Ok(record) => {
                index_map.insert(index, record);
            }
            Err(err) if options.skip_malformed && err.is_structural() => {
                tracing::warn!(dataset = %name, index, error = %err, "skipping malformed element");
                skipped.push(SkippedElement {
                    index,
                    reason: err.to_string(),
                });
            }
            Err(err) => return Err(err),
        }
        if options.log_step > 0 && (position + 1) % options.log_step == 0 {
            tracing::info!(dataset = %name, loaded = position + 1, total, "loading elements");
        }
    }

    tracing::info!(
        dataset = %name,
        elements = index_map.len(),
        skipped = skipped.len(),
        elapsed_ms = start.elapsed().as_millis() as u64,
        "loaded dataset"
    );
    Ok(LoadedDataset {
        name,
        path: root,
        bundle_metadata,
        index_map,
        skipped,
    })
}

fn scan_folder(
    root: &Path,
    options: &LoadOptions,
) -> Result<(BundleMetadata, BTreeMap<usize, ElementFiles>), VgdError> {
    let mut bundle_metadata = BundleMetadata::new();
    let mut elements: BTreeMap<usize, ElementFiles> = BTreeMap::new();

    let entries = fs::read_dir(root)
        .map_err(|err| VgdError::Filesystem(format!("{}: {err}", root.display())))?;
    for entry in entries {
        let entry = entry.map_err(|err| VgdError::Filesystem(err.to_string()))?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let file_name = entry.file_name().to_string_lossy().to_string();
        if file_name == BUNDLE_METADATA_FILE {
            bundle_metadata = read_bundle_metadata(&path)?;
            continue;
        }
        if file_name.starts_with('.') {
            continue;
        }
        let (Some(stem), Some(extension)) = (
            path.file_stem().and_then(|s| s.to_str()),
            path.extension().and_then(|s| s.to_str()),
        ) else {
            continue;
        };
        let Ok(index) = stem.parse::<usize>() else {
            tracing::trace!(file = %file_name, "ignoring file without numeric index");
            continue;
        };
        let extension = extension.to_ascii_lowercase();
        if matches_extension(&options.metadata_extensions, &extension) {
            elements.entry(index).or_default().metadata.push(path);
        } else if matches_extension(&options.image_extensions, &extension) {
            elements.entry(index).or_default().images.push(path);
        }
    }
    Ok((bundle_metadata, elements))
}

fn matches_extension(extensions: &[String], extension: &str) -> bool {
    extensions
        .iter()
        .any(|candidate| candidate.trim_start_matches('.').eq_ignore_ascii_case(extension))
}

fn read_bundle_metadata(path: &Path) -> Result<BundleMetadata, VgdError> {
    let content = fs::read(path).map_err(|err| VgdError::Filesystem(err.to_string()))?;
    match serde_json::from_slice(&content) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(VgdError::InvalidMetadata {
            path: path.to_path_buf(),
            message: "bundle metadata is not an object".to_string(),
        }),
        Err(err) => Err(VgdError::InvalidMetadata {
            path: path.to_path_buf(),
            message: err.to_string(),
        }),
    }
}

fn load_element(index: usize, files: &ElementFiles) -> Result<GraphRecord, VgdError> {
    let (metadata_path, image_path) = files.pair(index)?;
    let content = fs::read(metadata_path)
        .map_err(|err| VgdError::Filesystem(format!("{}: {err}", metadata_path.display())))?;
    GraphRecord::parse(
        &content,
        index,
        metadata_path.to_path_buf(),
        image_path.to_path_buf(),
    )
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use serde_json::json;

    use super::*;

    fn element(index: i64) -> String {
        json!({
            "index": index,
            "target": [1.0],
            "graph": {
                "node_indices": [0, 1],
                "node_attributes": [[0.0], [1.0]],
                "edge_indices": [[0, 1]],
                "edge_attributes": [[1.0]],
                "node_positions": [[0, 0], [5, 5]]
            }
        })
        .to_string()
    }

    #[test]
    fn ignores_unrelated_files() {
        let temp = tempfile::tempdir().unwrap();
        fs::write(temp.path().join("0.json"), element(0)).unwrap();
        fs::write(temp.path().join("0.png"), b"png").unwrap();
        fs::write(temp.path().join("README"), b"text").unwrap();
        fs::write(temp.path().join("notes.json"), b"{}").unwrap();
        fs::write(temp.path().join("1.txt"), b"text").unwrap();
        fs::write(temp.path().join(".hidden.json"), b"garbage").unwrap();

        let dataset = load_visual_graph_dataset(temp.path(), &LoadOptions::default()).unwrap();
        assert_eq!(dataset.indices(), vec![0]);
        assert!(dataset.bundle_metadata.is_empty());
    }

    #[test]
    fn reads_bundle_metadata() {
        let temp = tempfile::tempdir().unwrap();
        fs::write(
            temp.path().join(BUNDLE_METADATA_FILE),
            br#"{"version": "0.2", "description": "mock"}"#,
        )
        .unwrap();
        fs::write(temp.path().join("0.json"), element(0)).unwrap();
        fs::write(temp.path().join("0.png"), b"png").unwrap();

        let (metadata, index_map) = load_visual_graph_dataset(temp.path(), &LoadOptions::default())
            .unwrap()
            .into_parts();
        assert_eq!(metadata.get("version"), Some(&json!("0.2")));
        assert_eq!(index_map.len(), 1);
    }

    #[test]
    fn missing_image_is_structural() {
        let temp = tempfile::tempdir().unwrap();
        fs::write(temp.path().join("4.json"), element(4)).unwrap();

        let err = load_visual_graph_dataset(temp.path(), &LoadOptions::default()).unwrap_err();
        assert_matches!(err, VgdError::MissingPair { index: 4, missing: "image" });
    }

    #[test]
    fn two_images_for_one_index() {
        let temp = tempfile::tempdir().unwrap();
        fs::write(temp.path().join("2.json"), element(2)).unwrap();
        fs::write(temp.path().join("2.png"), b"png").unwrap();
        fs::write(temp.path().join("2.PNG"), b"png").unwrap();

        let err = load_visual_graph_dataset(temp.path(), &LoadOptions::default()).unwrap_err();
        assert_matches!(err, VgdError::DuplicateElement { index: 2, .. });
    }

    #[test]
    fn custom_extensions() {
        let temp = tempfile::tempdir().unwrap();
        fs::write(temp.path().join("0.json"), element(0)).unwrap();
        fs::write(temp.path().join("0.jpg"), b"jpg").unwrap();

        let options = LoadOptions {
            image_extensions: vec![".jpg".to_string()],
            ..LoadOptions::default()
        };
        let dataset = load_visual_graph_dataset(temp.path(), &options).unwrap();
        assert!(dataset.get(0).unwrap().image_path.ends_with("0.jpg"));
    }

    #[test]
    fn missing_folder_is_filesystem_error() {
        let temp = tempfile::tempdir().unwrap();
        let err = load_visual_graph_dataset(&temp.path().join("absent"), &LoadOptions::default())
            .unwrap_err();
        assert_matches!(err, VgdError::Filesystem(_));
    }
}
