//! Runtime manager API models

use serde::{Deserialize, Serialize};

/// Health response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
    pub backend: String,
}

/// Version response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionResponse {
    pub version: String,
    pub git_hash: String,
    pub build_time: String,
}

/// Body of a container command request
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandRequest {
    /// One of deploy, run, stop, pause, delete
    pub command: String,

    /// Pull policy: never, if-missing or always
    #[serde(default)]
    pub pull_image: Option<String>,
}

/// Body of a build (pipeline run) request
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildRequest {
    pub project_id: String,
}

/// Query for image listing
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ImageListQuery {
    #[serde(default)]
    pub prefix: Option<String>,
}

/// Query for image deletion
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageDeleteQuery {
    pub name: String,
}

/// Query for deployment listing
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeploymentListQuery {
    #[serde(default)]
    pub env: Option<String>,
}

/// Names of namespaced cluster resources
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceNamesResponse {
    pub namespace: String,
    pub names: Vec<String>,
}
