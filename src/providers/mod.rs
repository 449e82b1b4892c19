//! Remote file shares that host dataset bundles.
//!
//! Every share exposes the same layout: a `metadata.json` listing all bundles
//! and one `<name>.zip` archive per bundle. Variants only differ in how the
//! files are transported.

use std::collections::BTreeMap;
use std::fmt;

use camino::Utf8Path;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::config::{Config, ProviderDescriptor};
use crate::domain::DatasetName;
use crate::error::VgdError;

pub mod local;
pub mod nextcloud;

pub use local::LocalFileShare;
pub use nextcloud::NextcloudFileShare;

pub const METADATA_FILE: &str = "metadata.json";

/// Lightweight description of a remote bundle.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DatasetInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RemoteMetadata {
    #[serde(default)]
    pub datasets: BTreeMap<String, DatasetInfo>,
}

impl RemoteMetadata {
    pub fn parse(content: &[u8]) -> Result<Self, VgdError> {
        serde_json::from_slice(content).map_err(|err| VgdError::RemoteMetadata(err.to_string()))
    }

    pub fn into_listing(self) -> Vec<(String, DatasetInfo)> {
        self.datasets.into_iter().collect()
    }
}

pub trait FileShare: fmt::Debug + fmt::Display + Send + Sync {
    /// All bundles on the share with their metadata. Never downloads content.
    fn list_datasets(&self) -> Result<Vec<(String, DatasetInfo)>, VgdError>;

    fn check_dataset(&self, name: &DatasetName) -> Result<bool, VgdError> {
        Ok(self
            .list_datasets()?
            .iter()
            .any(|(candidate, _)| candidate == name.as_str()))
    }

    /// Downloads the bundle's files into `destination`, creating or replacing
    /// it. Nothing is retried.
    fn fetch_dataset(&self, name: &DatasetName, destination: &Utf8Path) -> Result<(), VgdError>;
}

pub type FileShareConstructor =
    Box<dyn Fn(&str, &ProviderDescriptor) -> Result<Box<dyn FileShare>, VgdError> + Send + Sync>;

/// Maps a provider type tag (the descriptor's `type`) to a constructor.
pub struct ProviderRegistry {
    constructors: BTreeMap<String, FileShareConstructor>,
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register(nextcloud::KIND, |name, descriptor| {
            Ok(Box::new(NextcloudFileShare::from_descriptor(
                name, descriptor,
            )?))
        });
        registry.register(local::KIND, |name, descriptor| {
            Ok(Box::new(LocalFileShare::from_descriptor(name, descriptor)?))
        });
        registry
    }
}

impl ProviderRegistry {
    pub fn empty() -> Self {
        Self {
            constructors: BTreeMap::new(),
        }
    }

    pub fn register<F>(&mut self, kind: &str, constructor: F)
    where
        F: Fn(&str, &ProviderDescriptor) -> Result<Box<dyn FileShare>, VgdError>
            + Send
            + Sync
            + 'static,
    {
        self.constructors
            .insert(kind.to_string(), Box::new(constructor));
    }

    pub fn kinds(&self) -> Vec<&str> {
        self.constructors.keys().map(String::as_str).collect()
    }

    /// Builds a fresh share for the named provider (default when `None`).
    pub fn resolve(
        &self,
        provider: Option<&str>,
        config: &Config,
    ) -> Result<Box<dyn FileShare>, VgdError> {
        let name = provider.unwrap_or(config.default_provider());
        let descriptor = config.get_provider(Some(name))?;
        let constructor = self.constructors.get(&descriptor.kind).ok_or_else(|| {
            VgdError::UnknownProviderType {
                name: name.to_string(),
                kind: descriptor.kind.clone(),
            }
        })?;
        tracing::debug!(provider = name, kind = %descriptor.kind, "resolved file share");
        constructor(name, descriptor)
    }
}

pub fn get_file_share(
    provider: Option<&str>,
    config: &Config,
) -> Result<Box<dyn FileShare>, VgdError> {
    ProviderRegistry::default().resolve(provider, config)
}
