//! Identity v3 project
//!
//! All calls are synchronous. A freshly created project may still answer
//! 404 for a while, so creation polls until the project becomes visible.

use crate::client::ServiceClient;
use async_trait::async_trait;
use otc_cloud::{
    Clock, Observation, Resource, ResourceData, ResourceStatus, Result, Transition, WaitConfig,
    wait_for_state,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

const VISIBILITY_CHECKS: u32 = 10;
const VISIBILITY_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProjectConfig {
    pub name: String,
    pub description: String,
    pub domain_id: Option<String>,
    pub parent_id: Option<String>,

    // Computed
    pub enabled: bool,
    pub is_domain: bool,
}

impl ProjectConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }
}

/// Visibility of a project right after creation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Visibility {
    Missing,
    Present,
    Deleted,
}

impl fmt::Display for Visibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Visibility::Missing => write!(f, "missing"),
            Visibility::Present => write!(f, "present"),
            Visibility::Deleted => write!(f, "deleted"),
        }
    }
}

impl ResourceStatus for Visibility {
    fn deleted() -> Self {
        Visibility::Deleted
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CreateProjectRequest {
    pub name: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub domain_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct UpdateProjectRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Project {
    pub id: String,
    pub name: String,
    pub description: String,
    pub domain_id: String,
    pub parent_id: String,
    pub enabled: bool,
    pub is_domain: bool,
}

#[async_trait]
pub trait IdentityApi: Send + Sync {
    async fn create_project(&self, request: &CreateProjectRequest) -> Result<Project>;

    async fn get_project(&self, id: &str) -> Result<Project>;

    async fn update_project(&self, id: &str, request: &UpdateProjectRequest) -> Result<()>;

    async fn delete_project(&self, id: &str) -> Result<()>;
}

#[derive(Deserialize)]
struct ProjectEnvelope {
    project: Project,
}

#[async_trait]
impl IdentityApi for ServiceClient {
    async fn create_project(&self, request: &CreateProjectRequest) -> Result<Project> {
        let url = self.url("v3/projects");
        let envelope: ProjectEnvelope = self
            .rest()
            .post(&url, &serde_json::json!({ "project": request }))
            .await?;
        Ok(envelope.project)
    }

    async fn get_project(&self, id: &str) -> Result<Project> {
        let url = self.url(&format!("v3/projects/{}", id));
        let envelope: ProjectEnvelope = self.rest().get(&url).await?;
        Ok(envelope.project)
    }

    async fn update_project(&self, id: &str, request: &UpdateProjectRequest) -> Result<()> {
        let url = self.url(&format!("v3/projects/{}", id));
        self.rest()
            .patch_action(&url, &serde_json::json!({ "project": request }))
            .await
    }

    async fn delete_project(&self, id: &str) -> Result<()> {
        let url = self.url(&format!("v3/projects/{}", id));
        self.rest().delete(&url).await
    }
}

pub struct IdentityProject {
    clock: Arc<dyn Clock>,
}

impl IdentityProject {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }
}

async fn observe_visibility(
    api: &dyn IdentityApi,
    id: &str,
) -> Result<Observation<Project, Visibility>> {
    match api.get_project(id).await {
        Ok(project) => Ok(Observation::new(project, Visibility::Present)),
        Err(e) if e.is_not_found() => Ok(Observation::gone(Visibility::Missing)),
        Err(e) => Err(e),
    }
}

fn non_empty(s: String) -> Option<String> {
    if s.is_empty() { None } else { Some(s) }
}

#[async_trait]
impl Resource for IdentityProject {
    type Config = ProjectConfig;
    type Api = dyn IdentityApi;

    fn type_name(&self) -> &'static str {
        "identity_project_v3"
    }

    fn has_changes(&self, data: &ResourceData<ProjectConfig>) -> bool {
        data.has_change(|c| &c.name) || data.has_change(|c| &c.description)
    }

    fn requires_replacement(&self, data: &ResourceData<ProjectConfig>) -> bool {
        data.has_set_change(|c| &c.domain_id) || data.has_set_change(|c| &c.parent_id)
    }

    async fn create(&self, api: &Self::Api, data: &mut ResourceData<ProjectConfig>) -> Result<()> {
        let desired = data.desired();
        let request = CreateProjectRequest {
            name: desired.name.clone(),
            description: desired.description.clone(),
            domain_id: desired.domain_id.clone(),
            parent_id: desired.parent_id.clone(),
        };

        tracing::debug!("Create project with options: {:?}", request);
        let project = api
            .create_project(&request)
            .await
            .map_err(|e| e.context("error creating project"))?;
        data.set_id(project.id.clone());

        let budget = VISIBILITY_INTERVAL * (VISIBILITY_CHECKS - 1);
        let config = WaitConfig::new(Transition::new([Visibility::Missing], [Visibility::Present]))
            .timeout(budget)
            .min_interval(VISIBILITY_INTERVAL)
            .max_interval(VISIBILITY_INTERVAL);
        wait_for_state(self.clock.as_ref(), &config, || {
            observe_visibility(api, &project.id)
        })
        .await
        .map_err(|e| e.context(format!("project {} did not become visible", project.id)))?;

        self.read(api, data).await
    }

    async fn read(&self, api: &Self::Api, data: &mut ResourceData<ProjectConfig>) -> Result<()> {
        let id = data.require_id()?.to_string();
        let result = api.get_project(&id).await;
        let Some(project) = data.check_deleted(result, "project")? else {
            return Ok(());
        };
        tracing::debug!("Retrieved project: {:?}", project);

        let mut observed = data.observed_base();
        observed.name = project.name;
        observed.description = project.description;
        observed.domain_id = non_empty(project.domain_id);
        observed.parent_id = non_empty(project.parent_id);
        observed.enabled = project.enabled;
        observed.is_domain = project.is_domain;

        data.commit(observed);
        Ok(())
    }

    async fn update(&self, api: &Self::Api, data: &mut ResourceData<ProjectConfig>) -> Result<()> {
        let id = data.require_id()?.to_string();
        let desired = data.desired();

        let mut request = UpdateProjectRequest::default();
        if data.has_change(|c| &c.name) {
            request.name = Some(desired.name.clone());
        }
        if data.has_change(|c| &c.description) {
            request.description = Some(desired.description.clone());
        }

        if request != UpdateProjectRequest::default() {
            api.update_project(&id, &request)
                .await
                .map_err(|e| e.context("error updating project"))?;
        }

        self.read(api, data).await
    }

    async fn delete(&self, api: &Self::Api, data: &mut ResourceData<ProjectConfig>) -> Result<()> {
        let id = data.require_id()?.to_string();
        let result = api.delete_project(&id).await;
        if data.check_deleted(result, "project")?.is_some() {
            data.clear_id();
        }
        Ok(())
    }
}
