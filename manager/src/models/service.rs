//! Engine-neutral service specification

use serde::{Deserialize, Serialize};

/// Port mapping between the host and a container
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortMapping {
    pub host_port: Option<u16>,
    pub container_port: u16,
}

/// Everything needed to create one container
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceSpec {
    pub container_name: String,
    pub image: String,
    pub ports: Vec<PortMapping>,
    /// `KEY=VALUE` entries
    pub environment: Vec<String>,
    pub command: Option<Vec<String>>,
    pub restart: Option<String>,
}
