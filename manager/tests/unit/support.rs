//! Fakes shared by the integration tests

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};

use runtime_manager::cache::status::StatusStore;
use runtime_manager::deploy::{LogStream, RuntimeBackend};
use runtime_manager::errors::RuntimeError;
use runtime_manager::models::command::PullPolicy;
use runtime_manager::models::project::Project;
use runtime_manager::models::service::ServiceSpec;
use runtime_manager::models::status::{ContainerStatus, StatusFilter};
use runtime_manager::probe::BackendKind;
use runtime_manager::storage::projects::ProjectStore;

/// One backend call and the in-transit flag its target had at that moment
#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    pub action: String,
    pub name: String,
    pub in_transit: Option<bool>,
}

struct OpenHandle(Arc<AtomicUsize>);

impl Drop for OpenHandle {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Scripted backend recording every call
pub struct FakeBackend {
    kind: BackendKind,
    store: Mutex<Option<Arc<StatusStore>>>,
    calls: Mutex<Vec<Call>>,
    deployed: Mutex<Vec<(ServiceSpec, BTreeMap<String, String>, PullPolicy)>>,
    failure: Mutex<Option<String>>,
    logs: Mutex<HashMap<String, Vec<String>>>,
    log_failure: Mutex<Option<String>>,
    observed: Mutex<Vec<ContainerStatus>>,
    open_logs: Arc<AtomicUsize>,
}

impl FakeBackend {
    pub fn new(kind: BackendKind) -> Self {
        Self {
            kind,
            store: Mutex::new(None),
            calls: Mutex::new(Vec::new()),
            deployed: Mutex::new(Vec::new()),
            failure: Mutex::new(None),
            logs: Mutex::new(HashMap::new()),
            log_failure: Mutex::new(None),
            observed: Mutex::new(Vec::new()),
            open_logs: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn engine() -> Self {
        Self::new(BackendKind::Engine)
    }

    pub fn cluster() -> Self {
        Self::new(BackendKind::Cluster)
    }

    /// Record the in-transit flag of targets in this store on every call
    pub fn observe(&self, store: Arc<StatusStore>) {
        *self.store.lock().unwrap() = Some(store);
    }

    /// Make every container operation fail with this message
    pub fn fail_with(&self, message: &str) {
        *self.failure.lock().unwrap() = Some(message.to_string());
    }

    pub fn fail_logs_with(&self, message: &str) {
        *self.log_failure.lock().unwrap() = Some(message.to_string());
    }

    /// Lines replayed by `log_lines`; the stream then stays open like a followed log
    pub fn script_logs(&self, name: &str, lines: &[&str]) {
        self.logs.lock().unwrap().insert(
            name.to_string(),
            lines.iter().map(|line| line.to_string()).collect(),
        );
    }

    pub fn set_observed(&self, statuses: Vec<ContainerStatus>) {
        *self.observed.lock().unwrap() = statuses;
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn deployed(&self) -> Vec<(ServiceSpec, BTreeMap<String, String>, PullPolicy)> {
        self.deployed.lock().unwrap().clone()
    }

    /// Log streams handed out and not yet dropped
    pub fn open_logs(&self) -> usize {
        self.open_logs.load(Ordering::SeqCst)
    }

    fn record(&self, action: &str, name: &str) -> Result<(), RuntimeError> {
        let in_transit = self.store.lock().unwrap().as_ref().and_then(|store| {
            store
                .list(&StatusFilter::default())
                .into_iter()
                .find(|status| status.container_name == name)
                .map(|status| status.in_transit)
        });
        self.calls.lock().unwrap().push(Call {
            action: action.to_string(),
            name: name.to_string(),
            in_transit,
        });
        match self.failure.lock().unwrap().as_ref() {
            Some(message) => Err(RuntimeError::from(std::io::Error::other(message.clone()))),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl RuntimeBackend for FakeBackend {
    fn kind(&self) -> BackendKind {
        self.kind
    }

    fn deploys_from_templates(&self) -> bool {
        self.kind == BackendKind::Engine
    }

    async fn deploy(
        &self,
        spec: &ServiceSpec,
        labels: &BTreeMap<String, String>,
        pull_policy: PullPolicy,
    ) -> Result<(), RuntimeError> {
        self.record("deploy", &spec.container_name)?;
        self.deployed
            .lock()
            .unwrap()
            .push((spec.clone(), labels.clone(), pull_policy));
        Ok(())
    }

    async fn run(&self, name: &str) -> Result<(), RuntimeError> {
        self.record("run", name)
    }

    async fn stop(&self, name: &str) -> Result<(), RuntimeError> {
        self.record("stop", name)
    }

    async fn pause(&self, name: &str) -> Result<(), RuntimeError> {
        self.record("pause", name)
    }

    async fn delete(&self, name: &str) -> Result<(), RuntimeError> {
        self.record("delete", name)
    }

    async fn statuses(&self, _env: &str) -> Result<Vec<ContainerStatus>, RuntimeError> {
        Ok(self.observed.lock().unwrap().clone())
    }

    async fn log_lines(&self, name: &str) -> Result<LogStream, RuntimeError> {
        if let Some(message) = self.log_failure.lock().unwrap().as_ref() {
            return Err(RuntimeError::StreamError(message.clone()));
        }
        let lines = self
            .logs
            .lock()
            .unwrap()
            .get(name)
            .cloned()
            .unwrap_or_default();

        self.open_logs.fetch_add(1, Ordering::SeqCst);
        let handle = OpenHandle(self.open_logs.clone());
        let stream = stream::iter(lines.into_iter().map(Ok::<String, RuntimeError>))
            .chain(stream::pending())
            .map(move |line| {
                let _ = &handle;
                line
            });
        Ok(Box::pin(stream))
    }
}

/// Project store held in memory
#[derive(Default)]
pub struct MemoryProjectStore {
    templates: Mutex<HashMap<String, String>>,
    services: Mutex<HashMap<String, ServiceSpec>>,
    projects: Mutex<HashMap<String, Project>>,
}

impl MemoryProjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_template(self, project_id: &str, code: &str) -> Self {
        self.templates
            .lock()
            .unwrap()
            .insert(project_id.to_string(), code.to_string());
        self
    }

    pub fn with_service(self, project_id: &str, spec: ServiceSpec) -> Self {
        self.services
            .lock()
            .unwrap()
            .insert(project_id.to_string(), spec);
        self
    }

    pub fn with_project(self, project: Project) -> Self {
        self.projects
            .lock()
            .unwrap()
            .insert(project.project_id.clone(), project);
        self
    }
}

#[async_trait]
impl ProjectStore for MemoryProjectStore {
    async fn dev_service_template(&self, project_id: &str) -> Result<Option<String>, RuntimeError> {
        Ok(self.templates.lock().unwrap().get(project_id).cloned())
    }

    async fn project_compose_service(
        &self,
        project_id: &str,
    ) -> Result<Option<ServiceSpec>, RuntimeError> {
        Ok(self.services.lock().unwrap().get(project_id).cloned())
    }

    async fn project(&self, project_id: &str) -> Result<Option<Project>, RuntimeError> {
        Ok(self.projects.lock().unwrap().get(project_id).cloned())
    }
}

pub fn service_spec(name: &str, image: &str) -> ServiceSpec {
    ServiceSpec {
        container_name: name.to_string(),
        image: image.to_string(),
        ports: Vec::new(),
        environment: Vec::new(),
        command: None,
        restart: None,
    }
}

/// Poll `condition` until it holds or a second has passed
pub async fn eventually<F>(mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    for _ in 0..100 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}
