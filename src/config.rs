use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use camino::{Utf8Path, Utf8PathBuf};
use directories::BaseDirs;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::VgdError;

pub const CONFIG_ENV: &str = "VGD_CONFIG";
pub const CONFIG_FILE_NAME: &str = "config.json";
pub const DEFAULT_PROVIDER: &str = "main";
/// Share URL of the built-in `main` provider. Placeholder taken from the
/// public dataset share of the upstream project and not verified; override
/// `providers.main.url` in the config file to point at a share you trust.
pub const DEFAULT_SHARE_URL: &str = "https://bwsyncandshare.kit.edu/s/E3MynrfQsLAHzJC";

/// On-disk shape of the config file. Every key is optional.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ConfigFile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub datasets_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_provider: Option<String>,
    #[serde(default)]
    pub providers: BTreeMap<String, ProviderDescriptor>,
}

/// Connection parameters of one named provider. `kind` selects the
/// implementation in the provider registry, everything else is passed through.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ProviderDescriptor {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(flatten)]
    pub params: Map<String, Value>,
}

impl ProviderDescriptor {
    pub fn new(kind: &str, params: &[(&str, &str)]) -> Self {
        let params = params
            .iter()
            .map(|(key, value)| (key.to_string(), Value::String(value.to_string())))
            .collect();
        Self {
            kind: kind.to_string(),
            params,
        }
    }

    pub fn optional_str(&self, key: &str) -> Option<&str> {
        self.params.get(key).and_then(Value::as_str)
    }

    pub fn require_str(&self, provider: &str, key: &str) -> Result<&str, VgdError> {
        self.optional_str(key)
            .filter(|value| !value.trim().is_empty())
            .ok_or_else(|| VgdError::InvalidProviderParams {
                name: provider.to_string(),
                message: format!("missing string parameter \"{key}\""),
            })
    }

    pub fn optional_u64(&self, provider: &str, key: &str) -> Result<Option<u64>, VgdError> {
        match self.params.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(value) => value.as_u64().map(Some).ok_or_else(|| {
                VgdError::InvalidProviderParams {
                    name: provider.to_string(),
                    message: format!("parameter \"{key}\" must be a non-negative integer"),
                }
            }),
        }
    }
}

/// Resolved settings for one process. Built once at startup and passed by
/// reference; never mutated afterwards.
#[derive(Debug, Clone)]
pub struct Config {
    path: Option<PathBuf>,
    datasets_path: Utf8PathBuf,
    default_provider: String,
    providers: BTreeMap<String, ProviderDescriptor>,
}

impl Config {
    pub fn new(
        datasets_path: Utf8PathBuf,
        default_provider: impl Into<String>,
        providers: BTreeMap<String, ProviderDescriptor>,
    ) -> Self {
        Self {
            path: None,
            datasets_path,
            default_provider: default_provider.into(),
            providers,
        }
    }

    /// Path of the file this config was read from, if one existed.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn datasets_path(&self) -> &Utf8Path {
        &self.datasets_path
    }

    /// Returns the datasets root, creating it if needed.
    pub fn get_datasets_path(&self) -> Result<Utf8PathBuf, VgdError> {
        fs::create_dir_all(self.datasets_path.as_std_path())
            .map_err(|err| VgdError::Filesystem(format!("{}: {err}", self.datasets_path)))?;
        Ok(self.datasets_path.clone())
    }

    pub fn default_provider(&self) -> &str {
        &self.default_provider
    }

    pub fn provider_names(&self) -> Vec<&str> {
        self.providers.keys().map(String::as_str).collect()
    }

    /// Looks up a provider by name, falling back to the default provider.
    pub fn get_provider(&self, name: Option<&str>) -> Result<&ProviderDescriptor, VgdError> {
        let name = name.unwrap_or(self.default_provider.as_str());
        self.providers
            .get(name)
            .ok_or_else(|| VgdError::ProviderNotFound {
                name: name.to_string(),
                available: self.provider_names().join(", "),
            })
    }

    pub fn to_file(&self) -> ConfigFile {
        ConfigFile {
            datasets_path: Some(self.datasets_path.to_string()),
            default_provider: Some(self.default_provider.clone()),
            providers: self.providers.clone(),
        }
    }
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// `$VGD_CONFIG` if set, otherwise `~/.visual_graph_datasets/config.json`.
    pub fn default_path() -> Result<PathBuf, VgdError> {
        if let Ok(path) = std::env::var(CONFIG_ENV) {
            if !path.trim().is_empty() {
                return Ok(PathBuf::from(path.trim()));
            }
        }
        Ok(vgd_home()?.join(CONFIG_FILE_NAME))
    }

    /// Reads the config file at `path` (or the default location). A missing
    /// file is not an error: the built-in defaults are returned instead.
    pub fn load(path: Option<&Path>) -> Result<Config, VgdError> {
        let config_path = match path {
            Some(path) => path.to_path_buf(),
            None => Self::default_path()?,
        };

        if !config_path.exists() {
            tracing::debug!(path = %config_path.display(), "no config file, using defaults");
            return Self::resolve_config(ConfigFile::default(), None);
        }

        let content = fs::read_to_string(&config_path)
            .map_err(|_| VgdError::ConfigRead(config_path.clone()))?;
        let file: ConfigFile =
            serde_json::from_str(&content).map_err(|err| VgdError::ConfigParse(err.to_string()))?;

        let mut config = Self::resolve_config(file, config_path.parent())?;
        config.path = Some(config_path);
        Ok(config)
    }

    /// Merges a parsed file over the built-in defaults. Relative dataset paths
    /// are taken relative to `base_dir` (the config file's folder).
    pub fn resolve_config(file: ConfigFile, base_dir: Option<&Path>) -> Result<Config, VgdError> {
        let datasets_path = match file.datasets_path {
            Some(value) => resolve_path(&value, base_dir)?,
            None => default_datasets_path()?,
        };
        let datasets_path = Utf8PathBuf::from_path_buf(datasets_path)
            .map_err(|_| VgdError::ConfigParse("datasets_path is not valid UTF-8".to_string()))?;

        let mut providers = builtin_providers();
        providers.extend(file.providers);

        let default_provider = file
            .default_provider
            .unwrap_or_else(|| DEFAULT_PROVIDER.to_string());

        let config = Config::new(datasets_path, default_provider, providers);
        config.get_provider(None)?;
        Ok(config)
    }

    /// Writes the default config to `path` unless a file is already there.
    /// Returns whether a file was written.
    pub fn write_template(path: &Path) -> Result<bool, VgdError> {
        if path.exists() {
            return Ok(false);
        }
        let config = Self::resolve_config(ConfigFile::default(), None)?;
        let content = serde_json::to_vec_pretty(&config.to_file())
            .map_err(|err| VgdError::ConfigWrite(err.to_string()))?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|err| VgdError::ConfigWrite(err.to_string()))?;
        }
        fs::write(path, content).map_err(|err| VgdError::ConfigWrite(err.to_string()))?;
        Ok(true)
    }
}

pub fn builtin_providers() -> BTreeMap<String, ProviderDescriptor> {
    let mut providers = BTreeMap::new();
    providers.insert(
        DEFAULT_PROVIDER.to_string(),
        ProviderDescriptor::new("nextcloud", &[("url", DEFAULT_SHARE_URL)]),
    );
    providers
}

fn vgd_home() -> Result<PathBuf, VgdError> {
    BaseDirs::new()
        .map(|dirs| dirs.home_dir().join(".visual_graph_datasets"))
        .ok_or_else(|| VgdError::Filesystem("unable to resolve home directory".to_string()))
}

fn default_datasets_path() -> Result<PathBuf, VgdError> {
    Ok(vgd_home()?.join("datasets"))
}

fn resolve_path(value: &str, base_dir: Option<&Path>) -> Result<PathBuf, VgdError> {
    let path = match value.strip_prefix("~/") {
        Some(rest) => BaseDirs::new()
            .map(|dirs| dirs.home_dir().join(rest))
            .ok_or_else(|| VgdError::Filesystem("unable to resolve home directory".to_string()))?,
        None => PathBuf::from(value),
    };
    if path.is_absolute() {
        return Ok(path);
    }
    // A config path given relative to the working directory has a relative
    // (possibly empty) parent.
    let cwd = std::env::current_dir().map_err(|err| VgdError::Filesystem(err.to_string()))?;
    let base = match base_dir {
        Some(dir) if dir.is_absolute() => dir.to_path_buf(),
        Some(dir) => cwd.join(dir),
        None => cwd,
    };
    Ok(base.join(path))
}
