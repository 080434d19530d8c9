//! Command dispatch to the active backend

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{debug, error, info};

use crate::cache::status::StatusStore;
use crate::deploy::compose::service_from_compose;
use crate::deploy::RuntimeBackend;
use crate::errors::RuntimeError;
use crate::models::command::{CommandEnvelope, ContainerCommand};
use crate::models::project::default_runtime;
use crate::models::service::ServiceSpec;
use crate::models::status::{
    ContainerStatus, ContainerType, StatusKey, LABEL_PROJECT_ID, LABEL_RUNTIME, LABEL_TYPE,
};
use crate::storage::projects::ProjectStore;

/// Result of a dispatched command
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchOutcome {
    /// The backend accepted the command; carries the in-transit status
    Applied(ContainerStatus),
    /// Deploy without a template, nothing to do
    Skipped,
    /// The action is not valid for the target type
    NotModified,
}

/// Routes container commands to the active backend
pub struct CommandDispatcher {
    backend: Arc<dyn RuntimeBackend>,
    store: Arc<StatusStore>,
    projects: Arc<dyn ProjectStore>,
    environment: String,
}

impl CommandDispatcher {
    pub fn new(
        backend: Arc<dyn RuntimeBackend>,
        store: Arc<StatusStore>,
        projects: Arc<dyn ProjectStore>,
        environment: impl Into<String>,
    ) -> Self {
        Self {
            backend,
            store,
            projects,
            environment: environment.into(),
        }
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }

    /// Validate a command, mark its target in transit and execute it.
    ///
    /// The status is published once, before the backend call. A failed
    /// backend call leaves the in-transit flag set for the reconciler to clear.
    pub async fn dispatch(&self, envelope: CommandEnvelope) -> Result<DispatchOutcome, RuntimeError> {
        if !envelope.target_type.supports(envelope.action) {
            debug!(
                "Command {} not valid for {} {}",
                envelope.action, envelope.target_type, envelope.target_name
            );
            return Ok(DispatchOutcome::NotModified);
        }

        let key = StatusKey::new(
            &envelope.project_id,
            &self.environment,
            &envelope.target_name,
        );
        let mut status = self.store.get(&key).unwrap_or_else(|| {
            ContainerStatus::new(
                &envelope.project_id,
                &self.environment,
                &envelope.target_name,
                envelope.target_type,
            )
        });
        status.in_transit = true;
        self.store.publish(status.clone());

        info!(
            "Executing {} on {} {} ({})",
            envelope.action,
            envelope.target_type,
            envelope.target_name,
            self.backend.kind()
        );

        match self.execute(&envelope).await {
            Ok(true) => {
                if envelope.action == ContainerCommand::Delete {
                    self.store.remove(&key);
                }
                Ok(DispatchOutcome::Applied(status))
            }
            Ok(false) => Ok(DispatchOutcome::Skipped),
            Err(e) => {
                let err = RuntimeError::command(envelope.action, &envelope.target_name, &e);
                error!("{}", err);
                Err(err)
            }
        }
    }

    /// Returns `false` when a deploy had no template to work from
    async fn execute(&self, envelope: &CommandEnvelope) -> Result<bool, RuntimeError> {
        let name = envelope.target_name.as_str();
        match envelope.action {
            ContainerCommand::Deploy => self.deploy(envelope).await,
            ContainerCommand::Run => self.backend.run(name).await.map(|_| true),
            ContainerCommand::Stop => self.backend.stop(name).await.map(|_| true),
            ContainerCommand::Pause => self.backend.pause(name).await.map(|_| true),
            ContainerCommand::Delete => self.backend.delete(name).await.map(|_| true),
        }
    }

    async fn deploy(&self, envelope: &CommandEnvelope) -> Result<bool, RuntimeError> {
        if !self.backend.deploys_from_templates() {
            debug!(
                "Deploy of {} left to {} deployments",
                envelope.target_name,
                self.backend.kind()
            );
            return Ok(true);
        }

        let Some(mut spec) = self.resolve_spec(envelope).await? else {
            info!(
                "No template for {} {}, nothing to deploy",
                envelope.target_type, envelope.target_name
            );
            return Ok(false);
        };

        // the status record and later commands address the target name
        if spec.container_name != envelope.target_name {
            debug!(
                "Template container {} deployed as {}",
                spec.container_name, envelope.target_name
            );
            spec.container_name = envelope.target_name.clone();
        }

        let labels = self.labels(envelope).await?;
        self.backend
            .deploy(&spec, &labels, envelope.pull_policy)
            .await?;
        Ok(true)
    }

    async fn resolve_spec(
        &self,
        envelope: &CommandEnvelope,
    ) -> Result<Option<ServiceSpec>, RuntimeError> {
        match envelope.target_type {
            ContainerType::Service => {
                match self.projects.dev_service_template(&envelope.project_id).await? {
                    Some(code) => service_from_compose(&code, &envelope.target_name),
                    None => Ok(None),
                }
            }
            ContainerType::Project => {
                self.projects
                    .project_compose_service(&envelope.project_id)
                    .await
            }
            ContainerType::DevMode | ContainerType::Builder => Ok(None),
        }
    }

    async fn labels(
        &self,
        envelope: &CommandEnvelope,
    ) -> Result<BTreeMap<String, String>, RuntimeError> {
        let runtime = self
            .projects
            .project(&envelope.project_id)
            .await?
            .map(|project| project.runtime)
            .unwrap_or_else(default_runtime);
        Ok(BTreeMap::from([
            (LABEL_TYPE.to_string(), envelope.target_type.as_str().to_string()),
            (LABEL_RUNTIME.to_string(), runtime),
            (LABEL_PROJECT_ID.to_string(), envelope.project_id.clone()),
        ]))
    }
}
