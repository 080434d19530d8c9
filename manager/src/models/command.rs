//! Command envelope models

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::models::status::ContainerType;

/// Action requested against a container
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerCommand {
    Deploy,
    Run,
    Stop,
    Pause,
    Delete,
}

impl ContainerCommand {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContainerCommand::Deploy => "deploy",
            ContainerCommand::Run => "run",
            ContainerCommand::Stop => "stop",
            ContainerCommand::Pause => "pause",
            ContainerCommand::Delete => "delete",
        }
    }
}

impl fmt::Display for ContainerCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContainerCommand {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "deploy" => Ok(ContainerCommand::Deploy),
            "run" => Ok(ContainerCommand::Run),
            "stop" => Ok(ContainerCommand::Stop),
            "pause" => Ok(ContainerCommand::Pause),
            "delete" => Ok(ContainerCommand::Delete),
            _ => Err(format!("Invalid command: {}", s)),
        }
    }
}

/// When to fetch an image before creating a container
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PullPolicy {
    Never,
    #[default]
    IfMissing,
    Always,
}

impl FromStr for PullPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "never" => Ok(PullPolicy::Never),
            "if-missing" | "ifnotpresent" | "if_missing" => Ok(PullPolicy::IfMissing),
            "always" => Ok(PullPolicy::Always),
            _ => Err(format!("Invalid pull policy: {}", s)),
        }
    }
}

/// A command addressed to one container
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandEnvelope {
    pub project_id: String,
    pub target_type: ContainerType,
    pub target_name: String,
    pub action: ContainerCommand,
    pub pull_policy: PullPolicy,
}

impl CommandEnvelope {
    pub fn new(
        project_id: impl Into<String>,
        target_type: ContainerType,
        target_name: impl Into<String>,
        action: ContainerCommand,
    ) -> Self {
        Self {
            project_id: project_id.into(),
            target_type,
            target_name: target_name.into(),
            action,
            pull_policy: PullPolicy::default(),
        }
    }

    pub fn with_pull_policy(mut self, pull_policy: PullPolicy) -> Self {
        self.pull_policy = pull_policy;
        self
    }
}
