pub mod app;
pub mod config;
pub mod domain;
pub mod error;
pub mod fs_util;
pub mod graph;
pub mod loader;
pub mod output;
pub mod providers;
pub mod store;

pub use app::{DatasetManager, EnsureOptions, ensure_dataset};
pub use config::{Config, ConfigLoader};
pub use error::VgdError;
pub use graph::{Graph, GraphRecord};
pub use loader::{LoadOptions, LoadedDataset, load_visual_graph_dataset};
pub use providers::{FileShare, ProviderRegistry, get_file_share};
