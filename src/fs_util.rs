use std::ffi::OsStr;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tempfile::TempDir;
use zip::ZipArchive;

use crate::error::VgdError;
use crate::store::{Store, atomic_rename_dir};

const STAGING_PREFIX: &str = ".vgd-staging";

const MACOS_METADATA_DIR: &str = "__MACOSX";

/// Unpacks a bundle archive into `target_dir` and returns the number of files
/// written. Entries escaping `target_dir` fail the whole extraction; macOS
/// resource fork entries are dropped.
pub fn extract_zip(zip_path: &Path, target_dir: &Path) -> Result<usize, VgdError> {
    let file = fs::File::open(zip_path)
        .map_err(|err| VgdError::Filesystem(format!("open zip {}: {err}", zip_path.display())))?;
    let mut archive = ZipArchive::new(file)
        .map_err(|err| VgdError::Filesystem(format!("read zip {}: {err}", zip_path.display())))?;

    fs::create_dir_all(target_dir).map_err(|err| VgdError::Filesystem(err.to_string()))?;
    let mut written = 0;
    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .map_err(|err| VgdError::Filesystem(err.to_string()))?;
        let Some(relative) = entry.enclosed_name() else {
            return Err(VgdError::Filesystem(format!(
                "zip entry {} escapes the bundle folder",
                entry.name()
            )));
        };
        if is_macos_metadata(&relative) {
            continue;
        }
        let entry_path = target_dir.join(relative);

        if entry.is_dir() {
            fs::create_dir_all(&entry_path)
                .map_err(|err| VgdError::Filesystem(err.to_string()))?;
            continue;
        }
        if let Some(parent) = entry_path.parent() {
            fs::create_dir_all(parent).map_err(|err| VgdError::Filesystem(err.to_string()))?;
        }
        let mut outfile =
            fs::File::create(&entry_path).map_err(|err| VgdError::Filesystem(err.to_string()))?;
        io::copy(&mut entry, &mut outfile).map_err(|err| VgdError::Filesystem(err.to_string()))?;
        written += 1;
    }
    tracing::debug!(archive = %zip_path.display(), files = written, "extracted bundle archive");
    Ok(written)
}

fn is_macos_metadata(relative: &Path) -> bool {
    let first = relative.components().next().map(|c| c.as_os_str());
    first == Some(OsStr::new(MACOS_METADATA_DIR))
        || relative
            .file_name()
            .is_some_and(|name| name.to_string_lossy().starts_with("._"))
}

/// Creates a hidden staging folder next to `destination`, so the final move
/// stays on one filesystem.
pub fn staging_dir(destination: &Path) -> Result<TempDir, VgdError> {
    let parent = destination
        .parent()
        .ok_or_else(|| VgdError::Filesystem("invalid destination path".to_string()))?;
    fs::create_dir_all(parent).map_err(|err| VgdError::Filesystem(err.to_string()))?;
    tempfile::Builder::new()
        .prefix(STAGING_PREFIX)
        .tempdir_in(parent)
        .map_err(|err| VgdError::Filesystem(err.to_string()))
}

/// Unpacks a bundle archive and moves its element files into `destination`,
/// replacing whatever was there. Archives may hold the files flat or under a
/// single top-level folder.
pub fn install_archive(archive_path: &Path, destination: &Path) -> Result<(), VgdError> {
    let staging = staging_dir(destination)?;
    let extracted = staging.path().join("extracted");
    extract_zip(archive_path, &extracted)?;
    let root = bundle_root(&extracted)?;
    tracing::debug!(from = %root.display(), to = %destination.display(), "installing bundle");
    atomic_rename_dir(&root, destination).map_err(|err| VgdError::Filesystem(err.to_string()))
}

/// Copies an unpacked bundle folder into `destination` through a staging copy.
pub fn install_dir(source: &Path, destination: &Path) -> Result<(), VgdError> {
    let staging = staging_dir(destination)?;
    let copied = staging.path().join("copied");
    Store::copy_dir_recursive(source, &copied)?;
    atomic_rename_dir(&copied, destination).map_err(|err| VgdError::Filesystem(err.to_string()))
}

fn bundle_root(extracted: &Path) -> Result<PathBuf, VgdError> {
    let mut entries = Vec::new();
    for entry in fs::read_dir(extracted).map_err(|err| VgdError::Filesystem(err.to_string()))? {
        let entry = entry.map_err(|err| VgdError::Filesystem(err.to_string()))?;
        entries.push(entry.path());
    }
    match entries.as_slice() {
        [single] if single.is_dir() => Ok(single.clone()),
        _ => Ok(extracted.to_path_buf()),
    }
}
