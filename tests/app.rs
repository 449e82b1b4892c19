use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::io::Write;
use std::path::Path;
use std::sync::{Arc, Mutex};

use assert_matches::assert_matches;
use camino::{Utf8Path, Utf8PathBuf};
use serde_json::json;
use zip::write::SimpleFileOptions;

use visual_graph_datasets::app::{DatasetManager, EnsureAction, EnsureOptions, ensure_dataset};
use visual_graph_datasets::config::{Config, ProviderDescriptor};
use visual_graph_datasets::domain::DatasetName;
use visual_graph_datasets::error::VgdError;
use visual_graph_datasets::loader::LoadOptions;
use visual_graph_datasets::output::JsonOutput;
use visual_graph_datasets::providers::{DatasetInfo, FileShare, ProviderRegistry};

#[derive(Debug, Default)]
struct Calls {
    resolved: usize,
    listed: usize,
    fetched: usize,
}

#[derive(Debug)]
struct StubShare {
    datasets: Vec<String>,
    calls: Arc<Mutex<Calls>>,
    fail_fetch: bool,
}

impl fmt::Display for StubShare {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StubShare")
    }
}

impl FileShare for StubShare {
    fn list_datasets(&self) -> Result<Vec<(String, DatasetInfo)>, VgdError> {
        self.calls.lock().unwrap().listed += 1;
        Ok(self
            .datasets
            .iter()
            .map(|name| {
                let info = DatasetInfo {
                    size: Some(10),
                    ..DatasetInfo::default()
                };
                (name.clone(), info)
            })
            .collect())
    }

    fn fetch_dataset(&self, _name: &DatasetName, destination: &Utf8Path) -> Result<(), VgdError> {
        self.calls.lock().unwrap().fetched += 1;
        if self.fail_fetch {
            return Err(VgdError::Http("connection reset".to_string()));
        }
        fs::create_dir_all(destination).unwrap();
        fs::write(destination.join("0.json"), element(0)).unwrap();
        fs::write(destination.join("0.png"), b"png").unwrap();
        Ok(())
    }
}

struct Fixture {
    _temp: tempfile::TempDir,
    config: Config,
    calls: Arc<Mutex<Calls>>,
}

impl Fixture {
    fn new() -> Self {
        let temp = tempfile::tempdir().unwrap();
        let datasets_path = Utf8PathBuf::from_path_buf(temp.path().join("datasets")).unwrap();
        let mut providers = BTreeMap::new();
        providers.insert("stub".to_string(), ProviderDescriptor::new("stub", &[]));
        Self {
            _temp: temp,
            config: Config::new(datasets_path, "stub", providers),
            calls: Arc::new(Mutex::new(Calls::default())),
        }
    }

    fn manager(&self, fail_fetch: bool) -> DatasetManager<'_> {
        let calls = Arc::clone(&self.calls);
        let mut registry = ProviderRegistry::empty();
        registry.register("stub", move |_, _| {
            calls.lock().unwrap().resolved += 1;
            Ok(Box::new(StubShare {
                datasets: vec!["toy_graphs".to_string()],
                calls: Arc::clone(&calls),
                fail_fetch,
            }))
        });
        DatasetManager::with_registry(&self.config, registry)
    }

    fn dataset_dir(&self, name: &str) -> Utf8PathBuf {
        self.config.datasets_path().join(name)
    }
}

fn element(index: i64) -> String {
    json!({
        "index": index,
        "target": [0.0, 1.0],
        "graph": {
            "node_indices": [0, 1, 2],
            "node_attributes": [[1.0], [0.0], [0.5]],
            "edge_indices": [[0, 1], [1, 2]],
            "edge_attributes": [[1.0], [1.0]],
            "node_positions": [[10, 10], [20, 20], [30, 30]],
            "node_importances_2_gnnexplainer": [[0.1, 0.9], [0.0, 1.0], [0.5, 0.5]]
        }
    })
    .to_string()
}

fn name(value: &str) -> DatasetName {
    value.parse().unwrap()
}

#[test]
fn missing_remote_dataset_creates_no_directory() {
    let fixture = Fixture::new();
    let manager = fixture.manager(false);

    let err = manager
        .ensure_dataset(&name("nonexistent"), None, EnsureOptions::default(), &JsonOutput)
        .unwrap_err();
    assert_matches!(err, VgdError::DatasetNotFoundRemote { name, .. } if name == "nonexistent");
    assert!(!fixture.dataset_dir("nonexistent").exists());
    assert_eq!(fixture.calls.lock().unwrap().fetched, 0);
}

#[test]
fn local_dataset_needs_no_provider() {
    let fixture = Fixture::new();
    fs::create_dir_all(fixture.dataset_dir("toy_graphs")).unwrap();
    let manager = fixture.manager(true);

    let result = manager
        .ensure_dataset(&name("toy_graphs"), None, EnsureOptions::default(), &JsonOutput)
        .unwrap();
    assert_eq!(result.action, EnsureAction::Cached);
    assert_eq!(result.path, fixture.dataset_dir("toy_graphs"));
    assert_eq!(result.provider, None);

    let calls = fixture.calls.lock().unwrap();
    assert_eq!(calls.resolved, 0);
    assert_eq!(calls.listed, 0);
    assert_eq!(calls.fetched, 0);
}

#[test]
fn second_ensure_is_a_cache_hit() {
    let fixture = Fixture::new();
    let manager = fixture.manager(false);

    let first = manager
        .ensure_dataset(&name("toy_graphs"), None, EnsureOptions::default(), &JsonOutput)
        .unwrap();
    let second = manager
        .ensure_dataset(&name("toy_graphs"), None, EnsureOptions::default(), &JsonOutput)
        .unwrap();

    assert_eq!(first.action, EnsureAction::Downloaded);
    assert_eq!(first.provider.as_deref(), Some("stub"));
    assert_eq!(second.action, EnsureAction::Cached);
    assert_eq!(first.path, second.path);
    assert_eq!(fixture.calls.lock().unwrap().fetched, 1);
}

#[test]
fn force_fetches_again() {
    let fixture = Fixture::new();
    fs::create_dir_all(fixture.dataset_dir("toy_graphs")).unwrap();
    let manager = fixture.manager(false);

    let result = manager
        .ensure_dataset(&name("toy_graphs"), None, EnsureOptions { force: true }, &JsonOutput)
        .unwrap();
    assert_eq!(result.action, EnsureAction::Downloaded);
    assert_eq!(fixture.calls.lock().unwrap().fetched, 1);
    assert!(fixture.dataset_dir("toy_graphs").join("0.json").exists());
}

#[test]
fn fetch_failure_is_propagated() {
    let fixture = Fixture::new();
    let manager = fixture.manager(true);

    let err = manager
        .ensure_dataset(&name("toy_graphs"), None, EnsureOptions::default(), &JsonOutput)
        .unwrap_err();
    assert_matches!(err, VgdError::Http(_));
    assert_eq!(fixture.calls.lock().unwrap().fetched, 1);
}

#[test]
fn unknown_provider_name_is_rejected_before_any_request() {
    let fixture = Fixture::new();
    let manager = fixture.manager(false);

    let err = manager
        .ensure_dataset(
            &name("toy_graphs"),
            Some("backup"),
            EnsureOptions::default(),
            &JsonOutput,
        )
        .unwrap_err();
    assert_matches!(err, VgdError::ProviderNotFound { name, .. } if name == "backup");
    let calls = fixture.calls.lock().unwrap();
    assert_eq!(calls.resolved, 0);
    assert_eq!(calls.listed, 0);
}

#[test]
fn check_remote_uses_listing() {
    let fixture = Fixture::new();
    let manager = fixture.manager(false);

    assert!(manager.check_remote(&name("toy_graphs"), None).unwrap());
    assert!(!manager.check_remote(&name("nonexistent"), None).unwrap());

    let listing = manager.list_remote(None, &JsonOutput).unwrap();
    assert_eq!(listing.provider, "stub");
    assert_eq!(listing.datasets.len(), 1);
    assert_eq!(listing.datasets[0].name, "toy_graphs");
    assert_eq!(listing.datasets[0].info.size, Some(10));
}

#[test]
fn local_listing_info_and_remove() {
    let fixture = Fixture::new();
    let manager = fixture.manager(false);
    manager
        .ensure_dataset(&name("toy_graphs"), None, EnsureOptions::default(), &JsonOutput)
        .unwrap();

    assert_eq!(manager.list_local().unwrap().datasets, vec!["toy_graphs"]);
    let info = manager.info(&name("toy_graphs")).unwrap();
    assert!(info.size > 0);

    let err = manager.info(&name("toy_graph")).unwrap_err();
    assert_matches!(
        err,
        VgdError::DatasetNotFoundLocal { suggestion: Some(suggestion), .. }
            if suggestion == "toy_graphs"
    );

    assert!(manager.remove(&name("toy_graphs"), &JsonOutput).unwrap().removed);
    assert!(!manager.remove(&name("toy_graphs"), &JsonOutput).unwrap().removed);
    assert!(manager.list_local().unwrap().datasets.is_empty());
}

fn write_bundle(path: &Path, folder: &str, indices: &[i64]) {
    let file = fs::File::create(path).unwrap();
    let mut writer = zip::ZipWriter::new(file);
    for index in indices {
        writer
            .start_file(format!("{folder}/{index}.json"), SimpleFileOptions::default())
            .unwrap();
        writer.write_all(element(*index).as_bytes()).unwrap();
        writer
            .start_file(format!("{folder}/{index}.png"), SimpleFileOptions::default())
            .unwrap();
        writer.write_all(b"png").unwrap();
    }
    writer.finish().unwrap();
}

#[test]
fn local_mirror_end_to_end() {
    let temp = tempfile::tempdir().unwrap();
    let mirror = temp.path().join("mirror");
    fs::create_dir_all(&mirror).unwrap();
    fs::write(
        mirror.join("metadata.json"),
        br#"{"datasets": {"toy_graphs": {"size": 10, "description": "toy"}}}"#,
    )
    .unwrap();
    write_bundle(&mirror.join("toy_graphs.zip"), "toy_graphs", &[0, 1, 2]);

    let mut providers = BTreeMap::new();
    providers.insert(
        "mirror".to_string(),
        ProviderDescriptor::new("local", &[("path", mirror.to_str().unwrap())]),
    );
    let datasets_path = Utf8PathBuf::from_path_buf(temp.path().join("datasets")).unwrap();
    let config = Config::new(datasets_path.clone(), "mirror", providers);

    let path = ensure_dataset("toy_graphs", &config, None, false).unwrap();
    assert_eq!(path, datasets_path.join("toy_graphs"));

    let dataset = DatasetManager::new(&config)
        .load(&name("toy_graphs"), &LoadOptions::default())
        .unwrap();
    assert_eq!(dataset.indices(), vec![0, 1, 2]);
    let record = dataset.get(1).unwrap();
    assert!(record.image_path.is_absolute());
    assert!(record.graph.importance_by_name("node_importances_2_gnnexplainer").is_some());

    let err = ensure_dataset("missing", &config, None, false).unwrap_err();
    assert_matches!(err, VgdError::DatasetNotFoundRemote { .. });
    assert!(!datasets_path.join("missing").exists());
}

#[test]
fn invalid_name_is_rejected() {
    let fixture = Fixture::new();
    let err = ensure_dataset("../etc", &fixture.config, None, false).unwrap_err();
    assert_matches!(err, VgdError::InvalidDatasetName(_));
}

#[test]
fn failed_forced_fetch_keeps_cached_folder() {
    let temp = tempfile::tempdir().unwrap();
    let mirror = temp.path().join("mirror");
    fs::create_dir_all(&mirror).unwrap();
    fs::write(
        mirror.join("metadata.json"),
        br#"{"datasets": {"toy_graphs": {"size": 10}}}"#,
    )
    .unwrap();
    fs::write(mirror.join("toy_graphs.zip"), b"truncated download").unwrap();

    let mut providers = BTreeMap::new();
    providers.insert(
        "mirror".to_string(),
        ProviderDescriptor::new("local", &[("path", mirror.to_str().unwrap())]),
    );
    let datasets_path = Utf8PathBuf::from_path_buf(temp.path().join("datasets")).unwrap();
    let cached = datasets_path.join("toy_graphs");
    fs::create_dir_all(&cached).unwrap();
    fs::write(cached.join("0.json"), element(0)).unwrap();
    let config = Config::new(datasets_path.clone(), "mirror", providers);

    let err = DatasetManager::new(&config)
        .ensure_dataset(&name("toy_graphs"), None, EnsureOptions { force: true }, &JsonOutput)
        .unwrap_err();
    assert_matches!(err, VgdError::Filesystem(_));

    assert_eq!(fs::read_to_string(cached.join("0.json")).unwrap(), element(0));
    let leftovers: Vec<String> = fs::read_dir(&datasets_path)
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().to_string())
        .collect();
    assert_eq!(leftovers, vec!["toy_graphs"]);
}
