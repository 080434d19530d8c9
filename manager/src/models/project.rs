//! Project metadata supplied by the project store

use serde::{Deserialize, Serialize};

/// Integration project
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub project_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default = "default_runtime")]
    pub runtime: String,
    #[serde(default)]
    pub last_commit: Option<String>,
}

pub fn default_runtime() -> String {
    "camel-main".to_string()
}
