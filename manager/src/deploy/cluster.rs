//! Kubernetes cluster executor

use std::collections::BTreeMap;
use std::path::Path;

use async_trait::async_trait;
use chrono::Utc;
use futures::{AsyncBufReadExt, StreamExt};
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{ConfigMap, Pod, Secret};
use kube::api::{DeleteParams, ListParams, LogParams, Patch, PatchParams, PostParams};
use kube::core::{ApiResource, DynamicObject, GroupVersionKind};
use kube::{Api, Client, ResourceExt};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::deploy::{LogStream, RuntimeBackend};
use crate::errors::RuntimeError;
use crate::models::cluster::{DeploymentInfo, PipelineRunInfo};
use crate::models::command::PullPolicy;
use crate::models::project::Project;
use crate::models::service::ServiceSpec;
use crate::models::status::{
    ContainerPort, ContainerState, ContainerStatus, ContainerType, LABEL_PROJECT_ID,
    LABEL_RUNTIME, LABEL_TYPE,
};
use crate::probe::BackendKind;

/// Namespace of the service account the process runs as
pub const SERVICE_ACCOUNT_NAMESPACE: &str =
    "/var/run/secrets/kubernetes.io/serviceaccount/namespace";

/// Label linking pipeline pods to their run
const PIPELINE_RUN_LABEL: &str = "tekton.dev/pipelineRun";

/// Lines replayed before following a pod log
const LOG_TAIL_LINES: i64 = 100;

/// Cluster executor settings
#[derive(Debug, Clone)]
pub struct ClusterOptions {
    /// Namespace used when the service-account namespace cannot be read
    pub default_namespace: String,

    /// Pipeline referenced by build runs
    pub build_pipeline: String,

    /// Environment reported for listed deployments
    pub environment: String,
}

impl Default for ClusterOptions {
    fn default() -> Self {
        Self {
            default_namespace: "default".to_string(),
            build_pipeline: "camel-main".to_string(),
            environment: "dev".to_string(),
        }
    }
}

/// Executes operations against the cluster API in one namespace
pub struct ClusterExecutor {
    client: Client,
    namespace: String,
    options: ClusterOptions,
}

impl ClusterExecutor {
    /// Connect with the in-cluster (or kubeconfig) configuration
    pub async fn connect(options: ClusterOptions) -> Result<Self, RuntimeError> {
        let client = Client::try_default().await?;
        let namespace =
            resolve_namespace(Path::new(SERVICE_ACCOUNT_NAMESPACE), &options.default_namespace);
        info!("Connected to cluster, namespace {}", namespace);
        Ok(Self {
            client,
            namespace,
            options,
        })
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    fn pods(&self) -> Api<Pod> {
        Api::namespaced(self.client.clone(), &self.namespace)
    }

    fn pipeline_runs(&self, namespace: &str) -> Api<DynamicObject> {
        Api::namespaced_with(self.client.clone(), namespace, &pipeline_run_resource())
    }

    /// Delete a pod; a missing pod counts as deleted
    pub async fn delete_pod(&self, name: &str) -> Result<(), RuntimeError> {
        match self.pods().delete(name, &DeleteParams::default()).await {
            Ok(_) => info!("Deleted pod {} in {}", name, self.namespace),
            Err(e) if is_not_found(&e) => debug!("Pod {} already absent", name),
            Err(e) => return Err(e.into()),
        }
        Ok(())
    }

    pub async fn list_deployments(
        &self,
        env: Option<&str>,
    ) -> Result<Vec<DeploymentInfo>, RuntimeError> {
        let api: Api<Deployment> = Api::namespaced(self.client.clone(), &self.namespace);
        let env = env.unwrap_or(&self.options.environment);
        let list = api.list(&ListParams::default()).await?;
        Ok(list
            .items
            .iter()
            .map(|deployment| deployment_info(deployment, &self.namespace, env))
            .collect())
    }

    /// Restart every pod of a deployment
    pub async fn rollout_deployment(&self, name: &str, namespace: &str) -> Result<(), RuntimeError> {
        let api: Api<Deployment> = Api::namespaced(self.client.clone(), namespace);
        let patch = serde_json::json!({
            "spec": {
                "template": {
                    "metadata": {
                        "annotations": {
                            "kubectl.kubernetes.io/restartedAt": Utc::now().to_rfc3339()
                        }
                    }
                }
            }
        });
        api.patch(name, &PatchParams::default(), &Patch::Merge(&patch))
            .await?;
        info!("Rollout restart of deployment {} in {}", name, namespace);
        Ok(())
    }

    /// Delete a deployment; a missing deployment counts as deleted
    pub async fn delete_deployment(&self, name: &str, namespace: &str) -> Result<(), RuntimeError> {
        let api: Api<Deployment> = Api::namespaced(self.client.clone(), namespace);
        match api.delete(name, &DeleteParams::default()).await {
            Ok(_) => info!("Deleted deployment {} in {}", name, namespace),
            Err(e) if is_not_found(&e) => debug!("Deployment {} already absent", name),
            Err(e) => return Err(e.into()),
        }
        Ok(())
    }

    pub async fn list_config_maps(&self) -> Result<Vec<String>, RuntimeError> {
        let api: Api<ConfigMap> = Api::namespaced(self.client.clone(), &self.namespace);
        let list = api.list(&ListParams::default()).await?;
        Ok(sorted_names(list.items.iter().map(|item| item.name_any())))
    }

    pub async fn list_secrets(&self) -> Result<Vec<String>, RuntimeError> {
        let api: Api<Secret> = Api::namespaced(self.client.clone(), &self.namespace);
        let list = api.list(&ListParams::default()).await?;
        Ok(sorted_names(list.items.iter().map(|item| item.name_any())))
    }

    /// Start a build pipeline run for a project
    pub async fn create_pipeline_run(
        &self,
        project: &Project,
    ) -> Result<PipelineRunInfo, RuntimeError> {
        let run = pipeline_run(project, &self.options.build_pipeline);
        let created = self
            .pipeline_runs(&self.namespace)
            .create(&PostParams::default(), &run)
            .await?;
        let info = pipeline_run_info(&created, &self.namespace);
        info!("Started pipeline run {} for {}", info.name, project.project_id);
        Ok(info)
    }

    pub async fn get_pipeline_run(
        &self,
        name: &str,
        namespace: &str,
    ) -> Result<PipelineRunInfo, RuntimeError> {
        match self.pipeline_runs(namespace).get_opt(name).await? {
            Some(run) => Ok(pipeline_run_info(&run, namespace)),
            None => Err(RuntimeError::NotFound(format!("Pipeline run {}", name))),
        }
    }

    /// Logs of every container of every pod of a pipeline run
    pub async fn get_pipeline_log(&self, name: &str, namespace: &str) -> Result<String, RuntimeError> {
        let pods: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        let selector = format!("{}={}", PIPELINE_RUN_LABEL, name);
        let list = pods.list(&ListParams::default().labels(&selector)).await?;

        let mut log = String::new();
        for pod in &list.items {
            let pod_name = pod.name_any();
            let containers = pod
                .spec
                .as_ref()
                .map(|spec| spec.containers.iter().map(|c| c.name.clone()).collect())
                .unwrap_or_else(Vec::new);
            for container in containers {
                let params = LogParams {
                    container: Some(container),
                    ..LogParams::default()
                };
                log.push_str(&pods.logs(&pod_name, &params).await?);
            }
        }
        Ok(log)
    }

    /// Cancel a running pipeline run
    pub async fn stop_pipeline_run(&self, name: &str, namespace: &str) -> Result<(), RuntimeError> {
        let patch = serde_json::json!({ "spec": { "status": "Cancelled" } });
        self.pipeline_runs(namespace)
            .patch(name, &PatchParams::default(), &Patch::Merge(&patch))
            .await?;
        info!("Cancelled pipeline run {} in {}", name, namespace);
        Ok(())
    }

    /// Observe every pod carrying a project label
    pub async fn list_statuses(&self, env: &str) -> Result<Vec<ContainerStatus>, RuntimeError> {
        let list = self
            .pods()
            .list(&ListParams::default().labels(LABEL_PROJECT_ID))
            .await?;
        Ok(list
            .items
            .iter()
            .filter_map(|pod| pod_to_status(pod, env))
            .collect())
    }

    /// Follow a pod log: last lines, then new output
    pub async fn log_lines(&self, name: &str) -> Result<LogStream, RuntimeError> {
        let params = LogParams {
            follow: true,
            tail_lines: Some(LOG_TAIL_LINES),
            ..LogParams::default()
        };
        let reader = self.pods().log_stream(name, &params).await?;
        let lines = reader
            .lines()
            .map(|line| line.map_err(|e| RuntimeError::StreamError(e.to_string())));
        Ok(Box::pin(lines))
    }
}

#[async_trait]
impl RuntimeBackend for ClusterExecutor {
    fn kind(&self) -> BackendKind {
        BackendKind::Cluster
    }

    fn deploys_from_templates(&self) -> bool {
        false
    }

    async fn deploy(
        &self,
        spec: &ServiceSpec,
        _labels: &BTreeMap<String, String>,
        _pull_policy: PullPolicy,
    ) -> Result<(), RuntimeError> {
        debug!("Deploy of {} is handled by cluster deployments", spec.container_name);
        Ok(())
    }

    async fn run(&self, name: &str) -> Result<(), RuntimeError> {
        debug!("Run of {} is handled by cluster deployments", name);
        Ok(())
    }

    async fn stop(&self, name: &str) -> Result<(), RuntimeError> {
        debug!("Stop of {} is handled by cluster deployments", name);
        Ok(())
    }

    async fn pause(&self, name: &str) -> Result<(), RuntimeError> {
        debug!("Pause of {} is handled by cluster deployments", name);
        Ok(())
    }

    async fn delete(&self, name: &str) -> Result<(), RuntimeError> {
        self.delete_pod(name).await
    }

    async fn statuses(&self, env: &str) -> Result<Vec<ContainerStatus>, RuntimeError> {
        self.list_statuses(env).await
    }

    async fn log_lines(&self, name: &str) -> Result<LogStream, RuntimeError> {
        ClusterExecutor::log_lines(self, name).await
    }
}

/// Namespace from the service-account file, or `default` with a warning
pub fn resolve_namespace(path: &Path, default: &str) -> String {
    match std::fs::read_to_string(path) {
        Ok(namespace) if !namespace.trim().is_empty() => namespace.trim().to_string(),
        Ok(_) => {
            warn!("Namespace file {} is empty, using {}", path.display(), default);
            default.to_string()
        }
        Err(e) => {
            warn!(
                "Cannot read namespace from {}: {}, using {}",
                path.display(),
                e,
                default
            );
            default.to_string()
        }
    }
}

fn pipeline_run_resource() -> ApiResource {
    let gvk = GroupVersionKind::gvk("tekton.dev", "v1", "PipelineRun");
    ApiResource::from_gvk_with_plural(&gvk, "pipelineruns")
}

/// Pipeline run object for a project build
pub fn pipeline_run(project: &Project, pipeline: &str) -> DynamicObject {
    let mut run = DynamicObject::new("", &pipeline_run_resource());
    run.metadata.name = None;
    run.metadata.generate_name = Some(format!("{}-", project.project_id));
    run.metadata.labels = Some(BTreeMap::from([
        (LABEL_PROJECT_ID.to_string(), project.project_id.clone()),
        (LABEL_RUNTIME.to_string(), project.runtime.clone()),
    ]));
    run.data = serde_json::json!({
        "spec": {
            "pipelineRef": { "name": pipeline },
            "params": [
                { "name": "PROJECT_ID", "value": project.project_id }
            ]
        }
    });
    run
}

pub fn pipeline_run_info(run: &DynamicObject, namespace: &str) -> PipelineRunInfo {
    let status = &run.data["status"];
    let text = |value: &serde_json::Value| value.as_str().map(str::to_string);
    PipelineRunInfo {
        name: run.name_any(),
        namespace: run
            .metadata
            .namespace
            .clone()
            .unwrap_or_else(|| namespace.to_string()),
        project_id: run.labels().get(LABEL_PROJECT_ID).cloned(),
        status: status["conditions"]
            .as_array()
            .and_then(|conditions| conditions.first())
            .and_then(|condition| text(&condition["reason"])),
        start_time: text(&status["startTime"]),
        completion_time: text(&status["completionTime"]),
    }
}

fn deployment_info(deployment: &Deployment, namespace: &str, env: &str) -> DeploymentInfo {
    let status = deployment.status.as_ref();
    DeploymentInfo {
        project_id: deployment.name_any(),
        namespace: deployment
            .metadata
            .namespace
            .clone()
            .unwrap_or_else(|| namespace.to_string()),
        env: env.to_string(),
        replicas: status.and_then(|s| s.replicas).unwrap_or(0),
        ready_replicas: status.and_then(|s| s.ready_replicas).unwrap_or(0),
        unavailable_replicas: status.and_then(|s| s.unavailable_replicas).unwrap_or(0),
    }
}

/// Status of a listed pod, `None` when it is not managed here
pub fn pod_to_status(pod: &Pod, env: &str) -> Option<ContainerStatus> {
    let labels = pod.labels().clone();
    let project_id = labels.get(LABEL_PROJECT_ID)?.clone();
    let container_type = labels
        .get(LABEL_TYPE)
        .and_then(|t| t.parse().ok())
        .unwrap_or(ContainerType::Project);

    let mut status = ContainerStatus::new(project_id, env, pod.name_any(), container_type);
    status.container_id = pod.metadata.uid.clone();

    if let Some(pod_status) = &pod.status {
        status.state = pod_status.phase.as_deref().and_then(ContainerState::parse);
        status.pod_ip = pod_status.pod_ip.clone();
        status.init_date = pod_status.start_time.as_ref().and_then(json_text);
    }

    if let Some(container) = pod.spec.as_ref().and_then(|spec| spec.containers.first()) {
        status.image = container.image.clone();
        status.ports = container
            .ports
            .iter()
            .flatten()
            .filter_map(|port| {
                Some(ContainerPort {
                    private_port: u16::try_from(port.container_port).ok()?,
                    public_port: None,
                    protocol: port.protocol.clone(),
                })
            })
            .collect();
    }

    status.camel_runtime = labels.get(LABEL_RUNTIME).cloned();
    status.labels = labels;
    Some(status)
}

pub fn is_not_found(error: &kube::Error) -> bool {
    matches!(error, kube::Error::Api(status) if status.code == 404)
}

fn json_text<T: Serialize>(value: &T) -> Option<String> {
    serde_json::to_value(value)
        .ok()
        .and_then(|value| value.as_str().map(str::to_string))
}

fn sorted_names(names: impl Iterator<Item = String>) -> Vec<String> {
    let mut names: Vec<String> = names.collect();
    names.sort();
    names
}
