//! In-memory form of one dataset element, parsed from its JSON metadata file.
//!
//! A metadata file looks like
//!
//! ```json
//! {
//!   "index": 3,
//!   "target": [0.0, 1.0],
//!   "graph": {
//!     "node_indices": [0, 1, 2],
//!     "node_attributes": [[1.0], [0.5], [0.2]],
//!     "edge_indices": [[0, 1], [1, 2]],
//!     "edge_attributes": [[1.0], [1.0]],
//!     "node_positions": [[10, 20], [30, 40], [50, 60]],
//!     "node_importances_2_gnnexplainer": [[0.1, 0.9], [0.0, 1.0], [0.5, 0.5]]
//!   }
//! }
//! ```
//!
//! Importance arrays are named `<node|edge>_importances_<K>_<suffix>` where
//! `K` is the number of channels (columns).

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Map, Value};

use crate::error::VgdError;

static IMPORTANCE_KEY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(node|edge)_importances_([1-9][0-9]*)(?:_(.+))?$").unwrap()
});

const LEGACY_NODE_POSITIONS: &str = "image_node_positions";

/// Dense row-major 2-D array.
#[derive(Debug, Clone, PartialEq)]
pub struct Matrix {
    rows: usize,
    cols: usize,
    data: Vec<f64>,
}

impl Matrix {
    /// Builds a matrix from a JSON array of equally long numeric arrays.
    /// `[]` is a 0x0 matrix.
    pub fn from_value(value: &Value) -> Result<Self, String> {
        let rows = value
            .as_array()
            .ok_or_else(|| "expected an array of rows".to_string())?;
        let mut cols = None;
        let mut data = Vec::new();
        for (i, row) in rows.iter().enumerate() {
            let row = row
                .as_array()
                .ok_or_else(|| format!("row {i} is not an array (expected a 2-D array)"))?;
            match cols {
                None => cols = Some(row.len()),
                Some(expected) if expected != row.len() => {
                    return Err(format!(
                        "row {i} has {} columns, expected {expected}",
                        row.len()
                    ));
                }
                Some(_) => {}
            }
            for (j, cell) in row.iter().enumerate() {
                let number = cell
                    .as_f64()
                    .ok_or_else(|| format!("entry ({i}, {j}) is not a number"))?;
                data.push(number);
            }
        }
        Ok(Self {
            rows: rows.len(),
            cols: cols.unwrap_or(0),
            data,
        })
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    pub fn get(&self, row: usize, col: usize) -> Option<f64> {
        (row < self.rows && col < self.cols).then(|| self.data[row * self.cols + col])
    }

    pub fn row(&self, row: usize) -> Option<&[f64]> {
        (row < self.rows).then(|| &self.data[row * self.cols..(row + 1) * self.cols])
    }

    pub fn column(&self, col: usize) -> Option<Vec<f64>> {
        (col < self.cols).then(|| {
            (0..self.rows)
                .map(|row| self.data[row * self.cols + col])
                .collect()
        })
    }

    pub fn values(&self) -> &[f64] {
        &self.data
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ImportanceKind {
    Node,
    Edge,
}

impl fmt::Display for ImportanceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImportanceKind::Node => write!(f, "node"),
            ImportanceKind::Edge => write!(f, "edge"),
        }
    }
}

/// Parsed `<kind>_importances_<K>_<suffix>` field name. The suffix is empty
/// for the bare `<kind>_importances_<K>` form.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ImportanceKey {
    pub kind: ImportanceKind,
    pub channels: usize,
    pub suffix: String,
}

impl ImportanceKey {
    /// `None` when `name` does not follow the importance naming grammar.
    pub fn parse(name: &str) -> Option<Self> {
        let captures = IMPORTANCE_KEY.captures(name)?;
        let kind = match &captures[1] {
            "node" => ImportanceKind::Node,
            _ => ImportanceKind::Edge,
        };
        let channels = captures[2].parse().ok()?;
        let suffix = captures
            .get(3)
            .map(|m| m.as_str().to_string())
            .unwrap_or_default();
        Some(Self {
            kind,
            channels,
            suffix,
        })
    }

    fn is_candidate(name: &str) -> bool {
        name.starts_with("node_importances") || name.starts_with("edge_importances")
    }
}

impl fmt::Display for ImportanceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_importances_{}", self.kind, self.channels)?;
        if !self.suffix.is_empty() {
            write!(f, "_{}", self.suffix)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Importance {
    pub key: ImportanceKey,
    pub values: Matrix,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Graph {
    pub node_indices: Vec<usize>,
    pub node_attributes: Matrix,
    pub edge_indices: Vec<[usize; 2]>,
    pub edge_attributes: Matrix,
    pub node_positions: Matrix,
    /// Keyed by `(kind, suffix)`; at most one channel count per suffix.
    pub importances: BTreeMap<(ImportanceKind, String), Importance>,
    /// Graph fields without a dedicated slot, kept as parsed.
    pub extra: Map<String, Value>,
}

impl Graph {
    pub fn num_nodes(&self) -> usize {
        self.node_indices.len()
    }

    pub fn num_edges(&self) -> usize {
        self.edge_indices.len()
    }

    pub fn importance(&self, kind: ImportanceKind, suffix: &str) -> Option<&Importance> {
        self.importances.get(&(kind, suffix.to_string()))
    }

    /// Looks up an importance array by its exact field name.
    pub fn importance_by_name(&self, name: &str) -> Option<&Importance> {
        let key = ImportanceKey::parse(name)?;
        self.importance(key.kind, &key.suffix)
            .filter(|importance| importance.key.channels == key.channels)
    }

    pub fn importance_names(&self) -> Vec<String> {
        self.importances
            .values()
            .map(|importance| importance.key.to_string())
            .collect()
    }

    pub fn from_value(value: &Value, path: &Path) -> Result<Self, VgdError> {
        let object = value.as_object().ok_or_else(|| VgdError::InvalidMetadata {
            path: path.to_path_buf(),
            message: "\"graph\" is not an object".to_string(),
        })?;

        let node_indices = parse_indices(object, "node_indices", path)?;
        let num_nodes = node_indices.len();
        let known_nodes: HashSet<usize> = node_indices.iter().copied().collect();

        let edge_rows = required_matrix(object, "edge_indices", path)?;
        if edge_rows.rows() > 0 && edge_rows.cols() != 2 {
            return Err(shape_error(
                path,
                "edge_indices",
                format!("expected shape (E, 2), got {:?}", edge_rows.shape()),
            ));
        }
        let mut edge_indices = Vec::with_capacity(edge_rows.rows());
        for i in 0..edge_rows.rows() {
            let mut edge = [0usize; 2];
            for (slot, value) in edge.iter_mut().zip(edge_rows.row(i).unwrap_or_default()) {
                let node = as_index(*value).filter(|node| known_nodes.contains(node));
                *slot = node.ok_or_else(|| {
                    shape_error(
                        path,
                        "edge_indices",
                        format!("edge {i} references unknown node {value}"),
                    )
                })?;
            }
            edge_indices.push(edge);
        }
        let num_edges = edge_indices.len();

        let node_attributes = required_matrix(object, "node_attributes", path)?;
        expect_rows(&node_attributes, num_nodes, "node_attributes", path)?;

        let edge_attributes = required_matrix(object, "edge_attributes", path)?;
        expect_rows(&edge_attributes, num_edges, "edge_attributes", path)?;

        let positions_key = if object.contains_key("node_positions") {
            "node_positions"
        } else {
            LEGACY_NODE_POSITIONS
        };
        let node_positions = required_matrix(object, positions_key, path)?;
        expect_rows(&node_positions, num_nodes, positions_key, path)?;
        if num_nodes > 0 && node_positions.cols() != 2 {
            return Err(shape_error(
                path,
                positions_key,
                format!("expected shape (V, 2), got {:?}", node_positions.shape()),
            ));
        }

        let mut importances = BTreeMap::new();
        let mut extra = Map::new();
        for (name, value) in object {
            if ImportanceKey::is_candidate(name) {
                let importance = parse_importance(name, value, num_nodes, num_edges, path)?;
                let slot = (importance.key.kind, importance.key.suffix.clone());
                if importances.contains_key(&slot) {
                    return Err(VgdError::DuplicateImportance {
                        path: path.to_path_buf(),
                        kind: importance.key.kind.to_string(),
                        suffix: importance.key.suffix,
                    });
                }
                importances.insert(slot, importance);
            } else if !is_core_field(name) {
                extra.insert(name.clone(), value.clone());
            }
        }

        Ok(Self {
            node_indices,
            node_attributes,
            edge_indices,
            edge_attributes,
            node_positions,
            importances,
            extra,
        })
    }
}

/// One dataset element: metadata, parsed graph and the paths of both files.
#[derive(Debug, Clone, PartialEq)]
pub struct GraphRecord {
    pub index: usize,
    pub target: Vec<f64>,
    pub graph: Graph,
    pub image_path: PathBuf,
    pub metadata_path: PathBuf,
    /// Top-level metadata fields other than `index`, `target` and `graph`.
    pub extra: Map<String, Value>,
}

impl GraphRecord {
    /// Parses the content of a metadata file. `file_index` is the index taken
    /// from the file name and must agree with the `index` field.
    pub fn parse(
        content: &[u8],
        file_index: usize,
        metadata_path: PathBuf,
        image_path: PathBuf,
    ) -> Result<Self, VgdError> {
        let path = metadata_path.as_path();
        let value: Value =
            serde_json::from_slice(content).map_err(|err| VgdError::InvalidMetadata {
                path: path.to_path_buf(),
                message: err.to_string(),
            })?;
        let Value::Object(mut object) = value else {
            return Err(VgdError::InvalidMetadata {
                path: path.to_path_buf(),
                message: "top level is not an object".to_string(),
            });
        };

        let index = match object.remove("index") {
            Some(value) => value.as_i64().ok_or_else(|| VgdError::InvalidMetadata {
                path: path.to_path_buf(),
                message: "\"index\" is not an integer".to_string(),
            })?,
            None => {
                return Err(VgdError::InvalidMetadata {
                    path: path.to_path_buf(),
                    message: "missing \"index\"".to_string(),
                });
            }
        };
        if usize::try_from(index).ok() != Some(file_index) {
            return Err(VgdError::IndexMismatch {
                path: path.to_path_buf(),
                file_index,
                metadata_index: index,
            });
        }

        let target = match object.remove("target") {
            Some(value) => parse_target(&value).ok_or_else(|| VgdError::InvalidMetadata {
                path: path.to_path_buf(),
                message: "\"target\" is not a number or an array of numbers".to_string(),
            })?,
            None => {
                return Err(VgdError::InvalidMetadata {
                    path: path.to_path_buf(),
                    message: "missing \"target\"".to_string(),
                });
            }
        };

        let graph_value = object.remove("graph").ok_or_else(|| VgdError::InvalidMetadata {
            path: path.to_path_buf(),
            message: "missing \"graph\"".to_string(),
        })?;
        let graph = Graph::from_value(&graph_value, path)?;

        Ok(Self {
            index: file_index,
            target,
            graph,
            image_path,
            metadata_path,
            extra: object,
        })
    }
}

fn is_core_field(name: &str) -> bool {
    matches!(
        name,
        "node_indices"
            | "node_attributes"
            | "edge_indices"
            | "edge_attributes"
            | "node_positions"
            | LEGACY_NODE_POSITIONS
    )
}

fn parse_target(value: &Value) -> Option<Vec<f64>> {
    match value {
        Value::Number(number) => number.as_f64().map(|n| vec![n]),
        Value::Array(items) => items.iter().map(Value::as_f64).collect(),
        _ => None,
    }
}

fn as_index(value: f64) -> Option<usize> {
    (value >= 0.0 && value.fract() == 0.0 && value <= usize::MAX as f64).then_some(value as usize)
}

fn parse_indices(
    object: &Map<String, Value>,
    field: &str,
    path: &Path,
) -> Result<Vec<usize>, VgdError> {
    let items = object
        .get(field)
        .ok_or_else(|| missing_field(path, field))?
        .as_array()
        .ok_or_else(|| shape_error(path, field, "expected a 1-D array".to_string()))?;
    items
        .iter()
        .enumerate()
        .map(|(i, item)| {
            item.as_f64().and_then(as_index).ok_or_else(|| {
                shape_error(path, field, format!("entry {i} is not a non-negative integer"))
            })
        })
        .collect()
}

fn required_matrix(
    object: &Map<String, Value>,
    field: &str,
    path: &Path,
) -> Result<Matrix, VgdError> {
    let value = object.get(field).ok_or_else(|| missing_field(path, field))?;
    Matrix::from_value(value).map_err(|message| shape_error(path, field, message))
}

fn expect_rows(matrix: &Matrix, expected: usize, field: &str, path: &Path) -> Result<(), VgdError> {
    if matrix.rows() != expected {
        return Err(shape_error(
            path,
            field,
            format!("expected {expected} rows, got {}", matrix.rows()),
        ));
    }
    Ok(())
}

fn parse_importance(
    name: &str,
    value: &Value,
    num_nodes: usize,
    num_edges: usize,
    path: &Path,
) -> Result<Importance, VgdError> {
    let key = ImportanceKey::parse(name).ok_or_else(|| VgdError::InvalidImportanceKey {
        path: path.to_path_buf(),
        key: name.to_string(),
    })?;
    let values = Matrix::from_value(value).map_err(|message| shape_error(path, name, message))?;
    let expected_rows = match key.kind {
        ImportanceKind::Node => num_nodes,
        ImportanceKind::Edge => num_edges,
    };
    expect_rows(&values, expected_rows, name, path)?;
    if values.rows() > 0 && values.cols() != key.channels {
        return Err(VgdError::ImportanceChannelMismatch {
            path: path.to_path_buf(),
            key: name.to_string(),
            declared: key.channels,
            actual: values.cols(),
        });
    }
    if let Some(bad) = values.values().iter().find(|v| !(0.0..=1.0).contains(*v)) {
        return Err(shape_error(
            path,
            name,
            format!("value {bad} is outside [0, 1]"),
        ));
    }
    Ok(Importance { key, values })
}

fn missing_field(path: &Path, field: &str) -> VgdError {
    VgdError::InvalidMetadata {
        path: path.to_path_buf(),
        message: format!("graph is missing \"{field}\""),
    }
}

fn shape_error(path: &Path, field: &str, message: String) -> VgdError {
    VgdError::InvalidShape {
        path: path.to_path_buf(),
        field: field.to_string(),
        message,
    }
}
