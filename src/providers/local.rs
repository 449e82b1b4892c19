use std::fmt;
use std::fs;
use std::path::PathBuf;

use camino::Utf8Path;

use crate::config::ProviderDescriptor;
use crate::domain::DatasetName;
use crate::error::VgdError;
use crate::fs_util;
use crate::providers::{DatasetInfo, FileShare, METADATA_FILE, RemoteMetadata};
use crate::store::dir_size;

pub const KIND: &str = "local";

/// A share mirrored on a locally mounted path: same `metadata.json` plus
/// `<name>.zip` layout as a remote share. Unpacked `<name>/` folders are
/// accepted as bundles too.
#[derive(Debug, Clone)]
pub struct LocalFileShare {
    root: PathBuf,
}

impl LocalFileShare {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn from_descriptor(name: &str, descriptor: &ProviderDescriptor) -> Result<Self, VgdError> {
        Ok(Self::new(descriptor.require_str(name, "path")?))
    }

    pub fn root(&self) -> &std::path::Path {
        &self.root
    }

    fn scan(&self) -> Result<Vec<(String, DatasetInfo)>, VgdError> {
        let entries = fs::read_dir(&self.root)
            .map_err(|err| VgdError::Filesystem(format!("{}: {err}", self.root.display())))?;
        let mut listing = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|err| VgdError::Filesystem(err.to_string()))?;
            let path = entry.path();
            let file_name = entry.file_name().to_string_lossy().to_string();
            if file_name.starts_with('.') {
                continue;
            }
            if path.is_dir() {
                let info = DatasetInfo {
                    size: Some(dir_size(&path)?),
                    ..DatasetInfo::default()
                };
                listing.push((file_name, info));
            } else if let Some(stem) = file_name.strip_suffix(".zip") {
                let size = entry
                    .metadata()
                    .map_err(|err| VgdError::Filesystem(err.to_string()))?
                    .len();
                let info = DatasetInfo {
                    size: Some(size),
                    ..DatasetInfo::default()
                };
                listing.push((stem.to_string(), info));
            }
        }
        listing.sort_by(|a, b| a.0.cmp(&b.0));
        listing.dedup_by(|a, b| a.0 == b.0);
        Ok(listing)
    }
}

impl FileShare for LocalFileShare {
    fn list_datasets(&self) -> Result<Vec<(String, DatasetInfo)>, VgdError> {
        let metadata_path = self.root.join(METADATA_FILE);
        if metadata_path.exists() {
            let content =
                fs::read(&metadata_path).map_err(|err| VgdError::Filesystem(err.to_string()))?;
            return Ok(RemoteMetadata::parse(&content)?.into_listing());
        }
        self.scan()
    }

    fn fetch_dataset(&self, name: &DatasetName, destination: &Utf8Path) -> Result<(), VgdError> {
        let archive = self.root.join(name.archive_file_name());
        let folder = self.root.join(name.as_str());
        if archive.is_file() {
            tracing::debug!(archive = %archive.display(), "installing bundle from local mirror");
            fs_util::install_archive(&archive, destination.as_std_path())
        } else if folder.is_dir() {
            tracing::debug!(folder = %folder.display(), "copying bundle from local mirror");
            fs_util::install_dir(&folder, destination.as_std_path())
        } else {
            Err(VgdError::DatasetNotFoundRemote {
                name: name.to_string(),
                provider: self.to_string(),
            })
        }
    }
}

impl fmt::Display for LocalFileShare {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LocalFileShare(path=\"{}\")", self.root.display())
    }
}
