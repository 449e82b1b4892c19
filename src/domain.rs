use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::VgdError;

/// Unique name of a dataset bundle within a provider namespace.
///
/// The name doubles as the folder name under the datasets root, so anything
/// that could escape that root is rejected.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DatasetName(String);

impl DatasetName {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn archive_file_name(&self) -> String {
        format!("{}.zip", self.0)
    }
}

impl fmt::Display for DatasetName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for DatasetName {
    type Err = VgdError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        let is_valid = !trimmed.is_empty()
            && !trimmed.starts_with('.')
            && !trimmed.contains(['/', '\\'])
            && !trimmed.chars().any(|ch| ch.is_control());
        if !is_valid {
            return Err(VgdError::InvalidDatasetName(value.to_string()));
        }
        Ok(Self(trimmed.to_string()))
    }
}
