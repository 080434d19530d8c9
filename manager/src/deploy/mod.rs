//! Container backends and command dispatch

pub mod cluster;
pub mod compose;
pub mod dispatcher;
pub mod engine;

use std::collections::BTreeMap;
use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;

use crate::errors::RuntimeError;
use crate::models::command::PullPolicy;
use crate::models::service::ServiceSpec;
use crate::models::status::ContainerStatus;
use crate::probe::BackendKind;

/// Raw log lines from a backend; dropping the stream releases the backend handle.
pub type LogStream = Pin<Box<dyn Stream<Item = Result<String, RuntimeError>> + Send>>;

/// Operations every container backend offers
///
/// One implementation is chosen at startup and shared by every component.
#[async_trait]
pub trait RuntimeBackend: Send + Sync {
    /// Which backend this is
    fn kind(&self) -> BackendKind;

    /// Whether `deploy` builds containers from project templates. Backends
    /// that return false roll out through their own deployments and ignore
    /// deploy commands.
    fn deploys_from_templates(&self) -> bool {
        true
    }

    /// Create a container from a spec and start it
    async fn deploy(
        &self,
        spec: &ServiceSpec,
        labels: &BTreeMap<String, String>,
        pull_policy: PullPolicy,
    ) -> Result<(), RuntimeError>;

    /// Start (or resume) a container
    async fn run(&self, name: &str) -> Result<(), RuntimeError>;

    /// Stop a container
    async fn stop(&self, name: &str) -> Result<(), RuntimeError>;

    /// Pause a container
    async fn pause(&self, name: &str) -> Result<(), RuntimeError>;

    /// Delete a container; deleting a missing container succeeds
    async fn delete(&self, name: &str) -> Result<(), RuntimeError>;

    /// Observe every managed container in an environment
    async fn statuses(&self, env: &str) -> Result<Vec<ContainerStatus>, RuntimeError>;

    /// Follow the log of a container
    async fn log_lines(&self, name: &str) -> Result<LogStream, RuntimeError>;
}
