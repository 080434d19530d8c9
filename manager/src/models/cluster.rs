//! Cluster resource models

use serde::{Deserialize, Serialize};

/// Summary of a cluster deployment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentInfo {
    pub project_id: String,
    pub namespace: String,
    pub env: String,
    pub replicas: i32,
    pub ready_replicas: i32,
    pub unavailable_replicas: i32,
}

/// State of a build pipeline run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineRunInfo {
    pub name: String,
    pub namespace: String,
    pub project_id: Option<String>,
    /// Reason of the `Succeeded` condition (Running, Succeeded, Failed, Cancelled, ...)
    pub status: Option<String>,
    pub start_time: Option<String>,
    pub completion_time: Option<String>,
}
