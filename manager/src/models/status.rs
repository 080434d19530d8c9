//! Container status models

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::models::command::ContainerCommand;

/// Label carrying the container type
pub const LABEL_TYPE: &str = "type";
/// Label carrying the integration runtime
pub const LABEL_RUNTIME: &str = "runtime";
/// Label carrying the owning project id
pub const LABEL_PROJECT_ID: &str = "projectId";

/// Kind of managed container, fixed at creation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerType {
    /// Supporting service (database, broker, ...) from the dev-service template
    Service,
    /// Project runtime built from the project compose service
    Project,
    /// Project running in developer mode
    DevMode,
    /// Image builder
    Builder,
}

impl ContainerType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContainerType::Service => "service",
            ContainerType::Project => "project",
            ContainerType::DevMode => "devmode",
            ContainerType::Builder => "builder",
        }
    }

    /// Commands that may be issued against a container of this type.
    pub fn commands(&self) -> &'static [ContainerCommand] {
        match self {
            ContainerType::Service | ContainerType::Project => &[
                ContainerCommand::Deploy,
                ContainerCommand::Run,
                ContainerCommand::Pause,
                ContainerCommand::Stop,
                ContainerCommand::Delete,
            ],
            ContainerType::DevMode => &[
                ContainerCommand::Run,
                ContainerCommand::Pause,
                ContainerCommand::Stop,
                ContainerCommand::Delete,
            ],
            ContainerType::Builder => &[ContainerCommand::Delete],
        }
    }

    pub fn supports(&self, command: ContainerCommand) -> bool {
        self.commands().contains(&command)
    }
}

impl fmt::Display for ContainerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContainerType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "service" | "devservice" => Ok(ContainerType::Service),
            "project" => Ok(ContainerType::Project),
            "devmode" => Ok(ContainerType::DevMode),
            "builder" | "build" => Ok(ContainerType::Builder),
            _ => Err(format!("Invalid container type: {}", s)),
        }
    }
}

/// Lifecycle state reported by the backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerState {
    Created,
    Running,
    Restarting,
    Paused,
    Exited,
    Dead,
}

impl ContainerState {
    /// Map an engine state string or a pod phase onto a state.
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_lowercase().as_str() {
            "created" | "pending" => Some(ContainerState::Created),
            "running" => Some(ContainerState::Running),
            "restarting" => Some(ContainerState::Restarting),
            "paused" => Some(ContainerState::Paused),
            "exited" | "succeeded" => Some(ContainerState::Exited),
            "dead" | "failed" => Some(ContainerState::Dead),
            _ => None,
        }
    }
}

/// Port published by a container
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerPort {
    pub private_port: u16,
    pub public_port: Option<u16>,
    pub protocol: Option<String>,
}

/// Unique identity of a status record
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StatusKey {
    pub project_id: String,
    pub env: String,
    pub container_name: String,
}

impl StatusKey {
    pub fn new(
        project_id: impl Into<String>,
        env: impl Into<String>,
        container_name: impl Into<String>,
    ) -> Self {
        Self {
            project_id: project_id.into(),
            env: env.into(),
            container_name: container_name.into(),
        }
    }
}

impl fmt::Display for StatusKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.project_id, self.env, self.container_name)
    }
}

/// Latest known status of one container
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerStatus {
    pub project_id: String,
    pub container_name: String,
    pub env: String,
    #[serde(rename = "type")]
    pub container_type: ContainerType,
    pub container_id: Option<String>,
    pub state: Option<ContainerState>,
    pub commands: Vec<ContainerCommand>,
    pub in_transit: bool,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    #[serde(rename = "podIP")]
    pub pod_ip: Option<String>,
    pub image: Option<String>,
    #[serde(default)]
    pub ports: Vec<ContainerPort>,
    pub commit: Option<String>,
    pub camel_runtime: Option<String>,
    pub init_date: Option<String>,
}

impl ContainerStatus {
    /// Create a status whose state has not been observed yet
    pub fn new(
        project_id: impl Into<String>,
        env: impl Into<String>,
        container_name: impl Into<String>,
        container_type: ContainerType,
    ) -> Self {
        Self {
            project_id: project_id.into(),
            container_name: container_name.into(),
            env: env.into(),
            container_type,
            container_id: None,
            state: None,
            commands: container_type.commands().to_vec(),
            in_transit: false,
            labels: BTreeMap::new(),
            pod_ip: None,
            image: None,
            ports: Vec::new(),
            commit: None,
            camel_runtime: None,
            init_date: None,
        }
    }

    pub fn key(&self) -> StatusKey {
        StatusKey::new(&self.project_id, &self.env, &self.container_name)
    }

    /// Merge a freshly observed status into this record.
    ///
    /// The type stays as created and fields the backend does not report are
    /// carried forward. The in-transit flag is cleared.
    pub fn reconcile(&self, observed: &ContainerStatus) -> ContainerStatus {
        ContainerStatus {
            project_id: self.project_id.clone(),
            container_name: self.container_name.clone(),
            env: self.env.clone(),
            container_type: self.container_type,
            container_id: observed.container_id.clone().or_else(|| self.container_id.clone()),
            state: observed.state,
            commands: self.container_type.commands().to_vec(),
            in_transit: false,
            labels: if observed.labels.is_empty() {
                self.labels.clone()
            } else {
                observed.labels.clone()
            },
            pod_ip: observed.pod_ip.clone().or_else(|| self.pod_ip.clone()),
            image: observed.image.clone().or_else(|| self.image.clone()),
            ports: observed.ports.clone(),
            commit: observed.commit.clone().or_else(|| self.commit.clone()),
            camel_runtime: observed
                .camel_runtime
                .clone()
                .or_else(|| self.camel_runtime.clone()),
            init_date: self.init_date.clone().or_else(|| observed.init_date.clone()),
        }
    }
}

/// Filter used when listing statuses
#[derive(Debug, Clone, Default)]
pub struct StatusFilter {
    pub project_id: Option<String>,
    pub env: Option<String>,
    pub container_type: Option<ContainerType>,
}

impl StatusFilter {
    pub fn matches(&self, status: &ContainerStatus) -> bool {
        self.project_id
            .as_deref()
            .is_none_or(|p| p == status.project_id)
            && self.env.as_deref().is_none_or(|e| e == status.env)
            && self
                .container_type
                .is_none_or(|t| t == status.container_type)
    }
}
