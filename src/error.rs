use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum VgdError {
    #[error("invalid dataset name: {0}")]
    InvalidDatasetName(String),

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("failed to write config file: {0}")]
    ConfigWrite(String),

    #[error("provider \"{name}\" is not specified in the config (available: {available})")]
    ProviderNotFound { name: String, available: String },

    #[error("provider \"{name}\" declares unknown provider type \"{kind}\"")]
    UnknownProviderType { name: String, kind: String },

    #[error("provider \"{name}\" is misconfigured: {message}")]
    InvalidProviderParams { name: String, message: String },

    #[error("no visual graph dataset named \"{name}\" exists on {provider}")]
    DatasetNotFoundRemote { name: String, provider: String },

    #[error("file share request failed: {0}")]
    Http(String),

    #[error("file share returned status {status}: {message}")]
    HttpStatus { status: u16, message: String },

    #[error("invalid remote metadata: {0}")]
    RemoteMetadata(String),

    #[error("dataset not found locally: {name}{hint}", hint = did_you_mean(.suggestion))]
    DatasetNotFoundLocal {
        name: String,
        suggestion: Option<String>,
    },

    #[error("filesystem error: {0}")]
    Filesystem(String),

    #[error("element {index} has no {missing} file")]
    MissingPair { index: usize, missing: &'static str },

    #[error("element {index} has more than one file of the same role: {path}")]
    DuplicateElement { index: usize, path: PathBuf },

    #[error(
        "index mismatch in {path}: file name says {file_index}, metadata says {metadata_index}"
    )]
    IndexMismatch {
        path: PathBuf,
        file_index: usize,
        metadata_index: i64,
    },

    #[error("malformed importance field \"{key}\" in {path}")]
    InvalidImportanceKey { path: PathBuf, key: String },

    #[error("importance field \"{key}\" in {path} declares {declared} channels but has {actual}")]
    ImportanceChannelMismatch {
        path: PathBuf,
        key: String,
        declared: usize,
        actual: usize,
    },

    #[error("duplicate {kind} importance suffix \"{suffix}\" in {path}")]
    DuplicateImportance {
        path: PathBuf,
        kind: String,
        suffix: String,
    },

    #[error("invalid shape for \"{field}\" in {path}: {message}")]
    InvalidShape {
        path: PathBuf,
        field: String,
        message: String,
    },

    #[error("invalid metadata in {path}: {message}")]
    InvalidMetadata { path: PathBuf, message: String },
}

impl VgdError {
    /// True for per-element problems found while parsing a dataset folder.
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            VgdError::MissingPair { .. }
                | VgdError::DuplicateElement { .. }
                | VgdError::IndexMismatch { .. }
                | VgdError::InvalidImportanceKey { .. }
                | VgdError::ImportanceChannelMismatch { .. }
                | VgdError::DuplicateImportance { .. }
                | VgdError::InvalidShape { .. }
                | VgdError::InvalidMetadata { .. }
        )
    }
}

fn did_you_mean(suggestion: &Option<String>) -> String {
    match suggestion {
        Some(name) => format!(" (did you mean \"{name}\"?)"),
        None => String::new(),
    }
}
