use std::time::{Duration, Instant};

use camino::Utf8PathBuf;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::config::Config;
use crate::domain::DatasetName;
use crate::error::VgdError;
use crate::loader::{LoadOptions, LoadedDataset, SkippedElement, load_visual_graph_dataset};
use crate::providers::{DatasetInfo, ProviderRegistry};
use crate::store::{Store, dir_size};

#[derive(Debug, Clone, Copy, Default)]
pub struct EnsureOptions {
    /// Fetch again even when the dataset folder already exists. Cached
    /// folders are never compared against the remote otherwise.
    pub force: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EnsureAction {
    Cached,
    Downloaded,
}

#[derive(Debug, Clone, Serialize)]
pub struct EnsureResult {
    pub name: String,
    pub path: Utf8PathBuf,
    pub action: EnsureAction,
    /// Provider that served the download. `None` for cache hits.
    pub provider: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RemoteListResult {
    pub provider: String,
    pub datasets: Vec<RemoteEntry>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RemoteEntry {
    pub name: String,
    #[serde(flatten)]
    pub info: DatasetInfo,
}

#[derive(Debug, Clone, Serialize)]
pub struct LocalListResult {
    pub datasets_path: Utf8PathBuf,
    pub datasets: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct InfoResult {
    pub name: String,
    pub path: Utf8PathBuf,
    pub size: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct RemoveResult {
    pub name: String,
    pub removed: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct LoadSummary {
    pub name: String,
    pub path: String,
    pub elements: usize,
    pub nodes_min: Option<usize>,
    pub nodes_max: Option<usize>,
    pub importances: Vec<String>,
    pub bundle_metadata: Map<String, Value>,
    pub skipped: Vec<SkippedElement>,
}

impl From<&LoadedDataset> for LoadSummary {
    fn from(dataset: &LoadedDataset) -> Self {
        let node_counts = dataset
            .index_map
            .values()
            .map(|record| record.graph.num_nodes());
        let mut importances: Vec<String> = dataset
            .index_map
            .values()
            .flat_map(|record| record.graph.importance_names())
            .collect();
        importances.sort();
        importances.dedup();
        Self {
            name: dataset.name.clone(),
            path: dataset.path.display().to_string(),
            elements: dataset.len(),
            nodes_min: node_counts.clone().min(),
            nodes_max: node_counts.max(),
            importances,
            bundle_metadata: dataset.bundle_metadata.clone(),
            skipped: dataset.skipped.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub message: String,
    pub elapsed: Option<Duration>,
}

pub trait ProgressSink {
    fn event(&self, event: ProgressEvent);
}

pub struct NoopSink;

impl ProgressSink for NoopSink {
    fn event(&self, _event: ProgressEvent) {}
}

/// Acquisition and lookup of datasets for one loaded [`Config`].
pub struct DatasetManager<'a> {
    config: &'a Config,
    registry: ProviderRegistry,
    store: Store,
}

impl<'a> DatasetManager<'a> {
    pub fn new(config: &'a Config) -> Self {
        Self::with_registry(config, ProviderRegistry::default())
    }

    pub fn with_registry(config: &'a Config, registry: ProviderRegistry) -> Self {
        Self {
            config,
            registry,
            store: Store::from_config(config),
        }
    }

    /// Makes sure `<datasets_path>/<name>` exists locally, downloading it from
    /// the provider when it is absent or when `force` is set. An existing
    /// folder is returned without contacting any provider.
    pub fn ensure_dataset(
        &self,
        name: &DatasetName,
        provider: Option<&str>,
        options: EnsureOptions,
        sink: &dyn ProgressSink,
    ) -> Result<EnsureResult, VgdError> {
        self.config.get_datasets_path()?;
        let local_path = self.store.dataset_dir(name);

        if self.store.exists(name) && !options.force {
            sink.event(ProgressEvent {
                message: format!("phase=Store; {name} already present"),
                elapsed: None,
            });
            tracing::debug!(dataset = %name, path = %local_path, "dataset found locally");
            return Ok(EnsureResult {
                name: name.to_string(),
                path: local_path,
                action: EnsureAction::Cached,
                provider: None,
            });
        }

        let provider_name = provider.unwrap_or(self.config.default_provider());
        sink.event(ProgressEvent {
            message: format!("phase=Resolve; provider {provider_name}"),
            elapsed: None,
        });
        let share = self.registry.resolve(Some(provider_name), self.config)?;

        sink.event(ProgressEvent {
            message: format!("phase=Check; looking up {name} on {share}"),
            elapsed: None,
        });
        if !share.check_dataset(name)? {
            return Err(VgdError::DatasetNotFoundRemote {
                name: name.to_string(),
                provider: share.to_string(),
            });
        }

        tracing::info!(
            dataset = %name,
            provider = provider_name,
            force = options.force,
            "fetching dataset"
        );
        sink.event(ProgressEvent {
            message: format!("phase=Download; fetching {name}"),
            elapsed: None,
        });
        let start = Instant::now();
        share.fetch_dataset(name, &local_path)?;
        let elapsed = start.elapsed();
        sink.event(ProgressEvent {
            message: format!("phase=Store; {name} written to {local_path}"),
            elapsed: Some(elapsed),
        });

        Ok(EnsureResult {
            name: name.to_string(),
            path: local_path,
            action: EnsureAction::Downloaded,
            provider: Some(provider_name.to_string()),
        })
    }

    pub fn list_remote(
        &self,
        provider: Option<&str>,
        sink: &dyn ProgressSink,
    ) -> Result<RemoteListResult, VgdError> {
        let provider_name = provider.unwrap_or(self.config.default_provider());
        let share = self.registry.resolve(Some(provider_name), self.config)?;
        sink.event(ProgressEvent {
            message: format!("phase=Resolve; listing {share}"),
            elapsed: None,
        });
        let datasets = share
            .list_datasets()?
            .into_iter()
            .map(|(name, info)| RemoteEntry { name, info })
            .collect();
        Ok(RemoteListResult {
            provider: provider_name.to_string(),
            datasets,
        })
    }

    pub fn check_remote(
        &self,
        name: &DatasetName,
        provider: Option<&str>,
    ) -> Result<bool, VgdError> {
        self.registry.resolve(provider, self.config)?.check_dataset(name)
    }

    pub fn list_local(&self) -> Result<LocalListResult, VgdError> {
        Ok(LocalListResult {
            datasets_path: self.store.datasets_root().to_path_buf(),
            datasets: self.store.list_local()?,
        })
    }

    pub fn info(&self, name: &DatasetName) -> Result<InfoResult, VgdError> {
        let path = self.store.resolve_dataset(name)?;
        let size = dir_size(path.as_std_path())?;
        Ok(InfoResult {
            name: name.to_string(),
            path,
            size,
        })
    }

    pub fn remove(
        &self,
        name: &DatasetName,
        sink: &dyn ProgressSink,
    ) -> Result<RemoveResult, VgdError> {
        sink.event(ProgressEvent {
            message: format!("phase=Store; removing {name}"),
            elapsed: None,
        });
        Ok(RemoveResult {
            name: name.to_string(),
            removed: self.store.remove(name)?,
        })
    }

    /// Loads an already downloaded dataset. Does not download.
    pub fn load(
        &self,
        name: &DatasetName,
        options: &LoadOptions,
    ) -> Result<LoadedDataset, VgdError> {
        let path = self.store.resolve_dataset(name)?;
        load_visual_graph_dataset(path.as_std_path(), options)
    }
}

/// Returns the local folder of `name`, downloading it first when needed.
pub fn ensure_dataset(
    name: &str,
    config: &Config,
    provider: Option<&str>,
    force: bool,
) -> Result<Utf8PathBuf, VgdError> {
    let name: DatasetName = name.parse()?;
    let result = DatasetManager::new(config).ensure_dataset(
        &name,
        provider,
        EnsureOptions { force },
        &NoopSink,
    )?;
    Ok(result.path)
}
