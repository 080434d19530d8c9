//! Project templates and metadata

use async_trait::async_trait;
use tracing::debug;

use crate::deploy::compose::{first_service, service_from_compose};
use crate::errors::RuntimeError;
use crate::filesys::dir::Dir;
use crate::models::project::{default_runtime, Project};
use crate::models::service::ServiceSpec;

/// Compose template of the supporting services of a project
pub const DEV_SERVICES_FILE: &str = "devservices.docker-compose.yaml";
/// Compose file describing the project runtime
pub const PROJECT_COMPOSE_FILE: &str = "docker-compose.yaml";
/// Project metadata
pub const PROJECT_FILE: &str = "project.json";

/// Source of project templates, labels and metadata
#[async_trait]
pub trait ProjectStore: Send + Sync {
    /// Raw dev-service compose template, `None` when the project has none
    async fn dev_service_template(&self, project_id: &str) -> Result<Option<String>, RuntimeError>;

    /// Service spec of the project runtime, `None` when the project has no compose file
    async fn project_compose_service(
        &self,
        project_id: &str,
    ) -> Result<Option<ServiceSpec>, RuntimeError>;

    async fn project(&self, project_id: &str) -> Result<Option<Project>, RuntimeError>;
}

/// Project store backed by one directory per project
///
/// ```text
/// <root>/<projectId>/project.json
/// <root>/<projectId>/docker-compose.yaml
/// <root>/<projectId>/devservices.docker-compose.yaml
/// ```
#[derive(Debug, Clone)]
pub struct FileProjectStore {
    root: Dir,
}

impl FileProjectStore {
    pub fn new(root: Dir) -> Self {
        Self { root }
    }

    fn project_dir(&self, project_id: &str) -> Result<Dir, RuntimeError> {
        validate_project_id(project_id)?;
        Ok(self.root.subdir(project_id))
    }

    /// Ids of every project with a directory under the root
    pub async fn project_ids(&self) -> Result<Vec<String>, RuntimeError> {
        if !self.root.exists().await {
            return Ok(Vec::new());
        }
        self.root.list_dir_names().await
    }
}

#[async_trait]
impl ProjectStore for FileProjectStore {
    async fn dev_service_template(&self, project_id: &str) -> Result<Option<String>, RuntimeError> {
        let file = self.project_dir(project_id)?.file(DEV_SERVICES_FILE);
        file.read_optional().await
    }

    async fn project_compose_service(
        &self,
        project_id: &str,
    ) -> Result<Option<ServiceSpec>, RuntimeError> {
        let file = self.project_dir(project_id)?.file(PROJECT_COMPOSE_FILE);
        let Some(code) = file.read_optional().await? else {
            debug!("Project {} has no compose file", project_id);
            return Ok(None);
        };
        match service_from_compose(&code, project_id)? {
            Some(spec) => Ok(Some(spec)),
            None => first_service(&code),
        }
    }

    async fn project(&self, project_id: &str) -> Result<Option<Project>, RuntimeError> {
        let dir = self.project_dir(project_id)?;
        let file = dir.file(PROJECT_FILE);
        if file.exists().await {
            let mut project: Project = file.read_json().await?;
            project.project_id = project_id.to_string();
            return Ok(Some(project));
        }
        if dir.exists().await {
            return Ok(Some(Project {
                project_id: project_id.to_string(),
                name: project_id.to_string(),
                runtime: default_runtime(),
                last_commit: None,
            }));
        }
        Ok(None)
    }
}

/// Project ids name a single directory
pub fn validate_project_id(project_id: &str) -> Result<(), RuntimeError> {
    let valid = !project_id.is_empty()
        && project_id != "."
        && project_id != ".."
        && !project_id.contains(['/', '\\']);
    if valid {
        Ok(())
    } else {
        Err(RuntimeError::ValidationError(format!(
            "Invalid project id: {}",
            project_id
        )))
    }
}
