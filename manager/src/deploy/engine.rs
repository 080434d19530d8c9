//! Docker engine executor

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use bollard::errors::Error as BollardError;
use bollard::models::{
    ContainerCreateBody, ContainerStateStatusEnum, ContainerSummary, HostConfig, PortBinding,
    RestartPolicy, RestartPolicyNameEnum,
};
use bollard::query_parameters::{
    CreateContainerOptionsBuilder, CreateImageOptionsBuilder, InspectContainerOptions,
    ListContainersOptionsBuilder, ListImagesOptionsBuilder, LogsOptionsBuilder,
    RemoveContainerOptionsBuilder, RemoveImageOptionsBuilder, StartContainerOptions,
    StopContainerOptionsBuilder,
};
use bollard::Docker;
use chrono::{TimeZone, Utc};
use futures::{StreamExt, TryStreamExt};
use tracing::{debug, info};

use crate::deploy::{LogStream, RuntimeBackend};
use crate::errors::RuntimeError;
use crate::models::command::PullPolicy;
use crate::models::image::ImageInfo;
use crate::models::service::ServiceSpec;
use crate::models::status::{
    ContainerPort, ContainerState, ContainerStatus, ContainerType, LABEL_PROJECT_ID,
    LABEL_RUNTIME, LABEL_TYPE,
};
use crate::probe::BackendKind;

/// Lines replayed before following a container log
pub const LOG_TAIL_LINES: &str = "100";

/// Engine executor settings
#[derive(Debug, Clone)]
pub struct EngineOptions {
    /// Network new containers join
    pub network: Option<String>,

    /// Seconds a stop waits before killing
    pub stop_timeout_secs: i32,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            network: None,
            stop_timeout_secs: 10,
        }
    }
}

/// Executes container operations against the local Docker engine
pub struct EngineExecutor {
    docker: Docker,
    options: EngineOptions,
}

impl EngineExecutor {
    /// Connect to the local engine and verify it answers
    pub async fn connect(options: EngineOptions) -> Result<Self, RuntimeError> {
        let docker = Docker::connect_with_local_defaults()?;
        let version = docker.ping().await?;
        info!("Connected to container engine ({})", version);
        Ok(Self { docker, options })
    }

    /// Create a container from a spec unless one with the same name exists
    pub async fn create_from_spec(
        &self,
        spec: &ServiceSpec,
        labels: &BTreeMap<String, String>,
        pull_policy: PullPolicy,
    ) -> Result<(), RuntimeError> {
        match self
            .docker
            .inspect_container(&spec.container_name, None::<InspectContainerOptions>)
            .await
        {
            Ok(_) => {
                debug!("Container {} already exists", spec.container_name);
                return Ok(());
            }
            Err(e) if is_not_found(&e) => {}
            Err(e) => return Err(e.into()),
        }

        self.pull_image(&spec.image, pull_policy).await?;

        let body = container_body(spec, labels, self.options.network.as_deref());
        self.docker
            .create_container(
                Some(
                    CreateContainerOptionsBuilder::new()
                        .name(&spec.container_name)
                        .build(),
                ),
                body,
            )
            .await?;

        info!("Created container {} from {}", spec.container_name, spec.image);
        Ok(())
    }

    async fn pull_image(&self, image: &str, pull_policy: PullPolicy) -> Result<(), RuntimeError> {
        let pull = match pull_policy {
            PullPolicy::Never => false,
            PullPolicy::Always => true,
            PullPolicy::IfMissing => self.docker.inspect_image(image).await.is_err(),
        };
        if !pull {
            return Ok(());
        }

        let (from_image, tag) = split_image_reference(image);
        info!("Pulling image {}:{}", from_image, tag);
        self.docker
            .create_image(
                Some(
                    CreateImageOptionsBuilder::new()
                        .from_image(from_image)
                        .tag(tag)
                        .build(),
                ),
                None,
                None,
            )
            .try_collect::<Vec<_>>()
            .await?;
        Ok(())
    }

    /// Start a container, resuming it when paused
    pub async fn run(&self, name: &str) -> Result<(), RuntimeError> {
        let inspect = self
            .docker
            .inspect_container(name, None::<InspectContainerOptions>)
            .await?;
        let status = inspect.state.and_then(|state| state.status);

        match status {
            Some(ContainerStateStatusEnum::PAUSED) => {
                self.docker.unpause_container(name).await?;
                info!("Resumed container {}", name);
            }
            Some(ContainerStateStatusEnum::RUNNING) => {
                debug!("Container {} already running", name);
            }
            _ => {
                match self
                    .docker
                    .start_container(name, None::<StartContainerOptions>)
                    .await
                {
                    Ok(()) => {}
                    Err(e) if is_not_modified(&e) => {}
                    Err(e) => return Err(e.into()),
                }
                info!("Started container {}", name);
            }
        }
        Ok(())
    }

    pub async fn stop(&self, name: &str) -> Result<(), RuntimeError> {
        let options = StopContainerOptionsBuilder::new()
            .t(self.options.stop_timeout_secs)
            .build();
        match self.docker.stop_container(name, Some(options)).await {
            Ok(()) => info!("Stopped container {}", name),
            Err(e) if is_not_modified(&e) => debug!("Container {} already stopped", name),
            Err(e) => return Err(e.into()),
        }
        Ok(())
    }

    pub async fn pause(&self, name: &str) -> Result<(), RuntimeError> {
        self.docker.pause_container(name).await?;
        info!("Paused container {}", name);
        Ok(())
    }

    /// Remove a container; a missing container counts as removed
    pub async fn delete(&self, name: &str) -> Result<(), RuntimeError> {
        let options = RemoveContainerOptionsBuilder::new()
            .force(true)
            .v(true)
            .build();
        match self.docker.remove_container(name, Some(options)).await {
            Ok(()) => info!("Deleted container {}", name),
            Err(e) if is_not_found(&e) => debug!("Container {} already absent", name),
            Err(e) => return Err(e.into()),
        }
        Ok(())
    }

    /// List local images whose tag starts with `prefix`
    pub async fn list_images(&self, prefix: &str) -> Result<Vec<ImageInfo>, RuntimeError> {
        let images = self
            .docker
            .list_images(Some(ListImagesOptionsBuilder::new().all(false).build()))
            .await?;

        let mut result: Vec<ImageInfo> = images
            .into_iter()
            .flat_map(|image| {
                let id = image.id.clone();
                let created = image.created;
                let size = image.size;
                image
                    .repo_tags
                    .into_iter()
                    .filter(|tag| tag.starts_with(prefix))
                    .map(move |tag| ImageInfo {
                        id: id.clone(),
                        tag,
                        created,
                        size,
                    })
            })
            .collect();
        result.sort_by(|a, b| b.created.cmp(&a.created));
        Ok(result)
    }

    /// Remove an image; a missing image counts as removed
    pub async fn delete_image(&self, name: &str) -> Result<(), RuntimeError> {
        let options = RemoveImageOptionsBuilder::new().force(true).build();
        match self.docker.remove_image(name, Some(options), None).await {
            Ok(_) => info!("Deleted image {}", name),
            Err(e) if is_not_found(&e) => debug!("Image {} already absent", name),
            Err(e) => return Err(e.into()),
        }
        Ok(())
    }

    /// Observe every container carrying a type label
    pub async fn list_statuses(&self, env: &str) -> Result<Vec<ContainerStatus>, RuntimeError> {
        let filters: HashMap<&str, Vec<&str>> = HashMap::from([("label", vec![LABEL_TYPE])]);
        let containers = self
            .docker
            .list_containers(Some(
                ListContainersOptionsBuilder::new()
                    .all(true)
                    .filters(&filters)
                    .build(),
            ))
            .await?;

        Ok(containers
            .iter()
            .filter_map(|summary| summary_to_status(summary, env))
            .collect())
    }

    /// Follow a container log: last lines of stdout and stderr, then new output
    pub fn log_lines(&self, name: &str) -> LogStream {
        let options = LogsOptionsBuilder::new()
            .follow(true)
            .stdout(true)
            .stderr(true)
            .tail(LOG_TAIL_LINES)
            .build();
        let stream = self
            .docker
            .logs(name, Some(options))
            .map(|chunk| chunk.map(|output| output.to_string()).map_err(RuntimeError::from));
        Box::pin(stream)
    }
}

#[async_trait]
impl RuntimeBackend for EngineExecutor {
    fn kind(&self) -> BackendKind {
        BackendKind::Engine
    }

    async fn deploy(
        &self,
        spec: &ServiceSpec,
        labels: &BTreeMap<String, String>,
        pull_policy: PullPolicy,
    ) -> Result<(), RuntimeError> {
        self.create_from_spec(spec, labels, pull_policy).await?;
        EngineExecutor::run(self, &spec.container_name).await
    }

    async fn run(&self, name: &str) -> Result<(), RuntimeError> {
        EngineExecutor::run(self, name).await
    }

    async fn stop(&self, name: &str) -> Result<(), RuntimeError> {
        EngineExecutor::stop(self, name).await
    }

    async fn pause(&self, name: &str) -> Result<(), RuntimeError> {
        EngineExecutor::pause(self, name).await
    }

    async fn delete(&self, name: &str) -> Result<(), RuntimeError> {
        EngineExecutor::delete(self, name).await
    }

    async fn statuses(&self, env: &str) -> Result<Vec<ContainerStatus>, RuntimeError> {
        self.list_statuses(env).await
    }

    async fn log_lines(&self, name: &str) -> Result<LogStream, RuntimeError> {
        Ok(EngineExecutor::log_lines(self, name))
    }
}

/// Engine create request for a spec with the given labels
pub fn container_body(
    spec: &ServiceSpec,
    labels: &BTreeMap<String, String>,
    network: Option<&str>,
) -> ContainerCreateBody {
    let port_bindings: HashMap<String, Option<Vec<PortBinding>>> = spec
        .ports
        .iter()
        .map(|port| {
            let binding = PortBinding {
                host_ip: None,
                host_port: port.host_port.map(|p| p.to_string()),
            };
            (format!("{}/tcp", port.container_port), Some(vec![binding]))
        })
        .collect();

    let restart_policy = spec.restart.as_deref().map(|restart| RestartPolicy {
        name: Some(match restart {
            "always" => RestartPolicyNameEnum::ALWAYS,
            "unless-stopped" => RestartPolicyNameEnum::UNLESS_STOPPED,
            "on-failure" => RestartPolicyNameEnum::ON_FAILURE,
            _ => RestartPolicyNameEnum::NO,
        }),
        maximum_retry_count: None,
    });

    ContainerCreateBody {
        image: Some(spec.image.clone()),
        hostname: Some(spec.container_name.clone()),
        labels: Some(labels.clone().into_iter().collect()),
        env: if spec.environment.is_empty() {
            None
        } else {
            Some(spec.environment.clone())
        },
        cmd: spec.command.clone(),
        host_config: Some(HostConfig {
            port_bindings: Some(port_bindings),
            network_mode: network.map(str::to_string),
            restart_policy,
            ..HostConfig::default()
        }),
        ..ContainerCreateBody::default()
    }
}

/// Status of a listed container, `None` when it is not managed here
pub fn summary_to_status(summary: &ContainerSummary, env: &str) -> Option<ContainerStatus> {
    let labels: BTreeMap<String, String> = summary
        .labels
        .clone()
        .unwrap_or_default()
        .into_iter()
        .collect();
    let container_type: ContainerType = labels.get(LABEL_TYPE)?.parse().ok()?;
    let name = summary
        .names
        .as_ref()
        .and_then(|names| names.first())
        .map(|name| name.trim_start_matches('/').to_string())?;
    let project_id = labels
        .get(LABEL_PROJECT_ID)
        .cloned()
        .unwrap_or_else(|| name.clone());

    let mut status = ContainerStatus::new(project_id, env, name, container_type);
    status.container_id = summary.id.clone();
    status.image = summary.image.clone();
    status.state = summary
        .state
        .as_ref()
        .and_then(|state| ContainerState::parse(&state.to_string()));
    status.ports = summary
        .ports
        .iter()
        .flatten()
        .map(|port| ContainerPort {
            private_port: port.private_port,
            public_port: port.public_port,
            protocol: port.typ.as_ref().map(|typ| typ.to_string()),
        })
        .collect();
    status.pod_ip = summary
        .network_settings
        .as_ref()
        .and_then(|settings| settings.networks.as_ref())
        .and_then(|networks| networks.values().find_map(|n| n.ip_address.clone()))
        .filter(|ip| !ip.is_empty());
    status.camel_runtime = labels.get(LABEL_RUNTIME).cloned();
    status.init_date = summary
        .created
        .and_then(|created| Utc.timestamp_opt(created, 0).single())
        .map(|created| created.to_rfc3339());
    status.labels = labels;
    Some(status)
}

/// Split `registry/name:tag` into name and tag, defaulting the tag to `latest`
pub fn split_image_reference(image: &str) -> (&str, &str) {
    match image.rsplit_once(':') {
        Some((name, tag)) if !tag.contains('/') => (name, tag),
        _ => (image, "latest"),
    }
}

pub fn is_not_found(error: &BollardError) -> bool {
    matches!(
        error,
        BollardError::DockerResponseServerError { status_code, .. } if *status_code == 404
    )
}

fn is_not_modified(error: &BollardError) -> bool {
    matches!(
        error,
        BollardError::DockerResponseServerError { status_code, .. } if *status_code == 304
    )
}
