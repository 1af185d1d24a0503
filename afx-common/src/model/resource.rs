// afx-common/src/model/resource.rs
use std::path::Path;

use serde::{Deserialize, Serialize};

/// Persisted record of an installed package.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    pub id: String,
    pub name: String,
    pub home: String,
    #[serde(rename = "type")]
    pub resource_type: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub paths: Vec<String>,
}

impl Resource {
    /// Returns the recorded paths that no longer exist.
    pub fn missing_paths(&self) -> Vec<&str> {
        self.paths
            .iter()
            .filter(|p| std::fs::symlink_metadata(Path::new(p)).is_err())
            .map(String::as_str)
            .collect()
    }

    pub fn is_intact(&self) -> bool {
        self.missing_paths().is_empty()
    }

    pub fn is_local(&self) -> bool {
        self.resource_type == "Local"
    }
}
