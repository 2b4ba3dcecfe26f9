//! Backend member of a classic (v1.0) ELB listener
//!
//! Members are added and removed through asynchronous jobs; the member id is
//! only known from the entities of the finished job. Every field replaces
//! the member when changed.

use crate::client::ServiceClient;
use async_trait::async_trait;
use otc_cloud::{
    Clock, CloudError, Observation, Resource, ResourceData, ResourceStatus, Result, Timeouts,
    Transition, WaitConfig, wait_for_state,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BackendMemberConfig {
    pub listener_id: String,
    pub server_id: String,
    /// Private address of the server
    pub address: String,
}

impl BackendMemberConfig {
    pub fn new(
        listener_id: impl Into<String>,
        server_id: impl Into<String>,
        address: impl Into<String>,
    ) -> Self {
        Self {
            listener_id: listener_id.into(),
            server_id: server_id.into(),
            address: address.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ElbJobStatus {
    Init,
    Running,
    Success,
    Fail,
    Deleted,
    Other(String),
}

impl From<&str> for ElbJobStatus {
    fn from(s: &str) -> Self {
        match s {
            "INIT" => ElbJobStatus::Init,
            "RUNNING" => ElbJobStatus::Running,
            "SUCCESS" => ElbJobStatus::Success,
            "FAIL" => ElbJobStatus::Fail,
            other => ElbJobStatus::Other(other.to_string()),
        }
    }
}

impl fmt::Display for ElbJobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ElbJobStatus::Init => write!(f, "INIT"),
            ElbJobStatus::Running => write!(f, "RUNNING"),
            ElbJobStatus::Success => write!(f, "SUCCESS"),
            ElbJobStatus::Fail => write!(f, "FAIL"),
            ElbJobStatus::Deleted => write!(f, "DELETED"),
            ElbJobStatus::Other(s) => write!(f, "{}", s),
        }
    }
}

impl ResourceStatus for ElbJobStatus {
    fn deleted() -> Self {
        ElbJobStatus::Deleted
    }
}

// ============ API Types ============

#[derive(Debug, Clone, Serialize)]
pub struct AddMember {
    pub server_id: String,
    pub address: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ElbJobRef {
    pub job_id: String,
    #[serde(default)]
    pub uri: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct JobMember {
    pub id: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct JobEntities {
    pub members: Vec<JobMember>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ElbJob {
    pub job_id: String,
    pub status: String,
    #[serde(default)]
    pub entities: JobEntities,
    pub fail_reason: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct BackendMember {
    pub id: String,
    pub server_id: String,
    pub server_address: String,
    pub address: String,
    pub status: String,
}

#[async_trait]
pub trait ElbApi: Send + Sync {
    async fn add_member(&self, listener_id: &str, member: &AddMember) -> Result<ElbJobRef>;

    async fn remove_member(&self, listener_id: &str, member_id: &str) -> Result<ElbJobRef>;

    /// Not found when the listener has no member with this id
    async fn get_member(&self, listener_id: &str, member_id: &str) -> Result<BackendMember>;

    async fn get_job(&self, job_id: &str) -> Result<ElbJob>;
}

#[async_trait]
impl ElbApi for ServiceClient {
    async fn add_member(&self, listener_id: &str, member: &AddMember) -> Result<ElbJobRef> {
        let url = self.url(&format!(
            "v1.0/{}/elbaas/listeners/{}/members",
            self.project_id(),
            listener_id
        ));
        self.rest().post(&url, &[member]).await
    }

    async fn remove_member(&self, listener_id: &str, member_id: &str) -> Result<ElbJobRef> {
        let url = self.url(&format!(
            "v1.0/{}/elbaas/listeners/{}/members/action",
            self.project_id(),
            listener_id
        ));
        let body = serde_json::json!({ "removeMember": [{ "id": member_id }] });
        self.rest().post(&url, &body).await
    }

    async fn get_member(&self, listener_id: &str, member_id: &str) -> Result<BackendMember> {
        let url = self.url(&format!(
            "v1.0/{}/elbaas/listeners/{}/members?id={}",
            self.project_id(),
            listener_id,
            member_id
        ));
        let members: Vec<BackendMember> = self.rest().get(&url).await?;
        members
            .into_iter()
            .next()
            .ok_or_else(|| CloudError::NotFound(format!("backend member {}", member_id)))
    }

    async fn get_job(&self, job_id: &str) -> Result<ElbJob> {
        let url = self.url(&format!("v1.0/{}/jobs/{}", self.project_id(), job_id));
        self.rest().get(&url).await
    }
}

// ============ Resource ============

pub struct ElbBackendMember {
    clock: Arc<dyn Clock>,
    timeouts: Timeouts,
}

impl ElbBackendMember {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            timeouts: Timeouts::new(
                Duration::from_secs(10 * 60),
                Duration::from_secs(10 * 60),
                Duration::from_secs(10 * 60),
            ),
        }
    }

    pub fn with_timeouts(mut self, timeouts: Timeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    async fn wait_for_job(&self, api: &dyn ElbApi, job_id: &str, timeout: Duration) -> Result<ElbJob> {
        let config = WaitConfig::new(Transition::new(
            [ElbJobStatus::Init, ElbJobStatus::Running],
            [ElbJobStatus::Success],
        ))
        .timeout(timeout)
        .min_interval(Duration::from_secs(1))
        .max_interval(Duration::from_secs(10));

        wait_for_state(self.clock.as_ref(), &config, || observe_job(api, job_id))
            .await?
            .ok_or_else(|| CloudError::NotFound(format!("ELB job {}", job_id)))
    }
}

async fn observe_job(api: &dyn ElbApi, job_id: &str) -> Result<Observation<ElbJob, ElbJobStatus>> {
    let job = api.get_job(job_id).await?;
    let status = ElbJobStatus::from(job.status.as_str());
    if status == ElbJobStatus::Fail {
        return Err(CloudError::JobFailed {
            job_id: job_id.to_string(),
            reason: job.fail_reason.unwrap_or_else(|| "unknown reason".to_string()),
        });
    }
    Ok(Observation::new(job, status))
}

#[async_trait]
impl Resource for ElbBackendMember {
    type Config = BackendMemberConfig;
    type Api = dyn ElbApi;

    fn type_name(&self) -> &'static str {
        "elb_backend"
    }

    fn has_changes(&self, _data: &ResourceData<BackendMemberConfig>) -> bool {
        false
    }

    fn requires_replacement(&self, data: &ResourceData<BackendMemberConfig>) -> bool {
        data.has_change(|c| &c.listener_id)
            || data.has_change(|c| &c.server_id)
            || data.has_change(|c| &c.address)
    }

    async fn create(&self, api: &Self::Api, data: &mut ResourceData<BackendMemberConfig>) -> Result<()> {
        let desired = data.desired();
        let listener_id = desired.listener_id.clone();
        let member = AddMember {
            server_id: desired.server_id.clone(),
            address: desired.address.clone(),
        };
        tracing::debug!("Create backend member: {:?}", member);

        let job = api
            .add_member(&listener_id, &member)
            .await
            .map_err(|e| e.context("error adding backend member"))?;

        tracing::debug!("Waiting for backend member job {} ({})", job.job_id, job.uri);
        let finished = self
            .wait_for_job(api, &job.job_id, self.timeouts.create)
            .await
            .map_err(|e| e.context("error waiting for backend member creation"))?;

        let id = finished
            .entities
            .members
            .into_iter()
            .map(|m| m.id)
            .find(|id| !id.is_empty())
            .ok_or_else(|| CloudError::JobFailed {
                job_id: job.job_id.clone(),
                reason: "job finished without a member entity".to_string(),
            })?;

        tracing::info!("Backend member {} added to listener {}", id, listener_id);
        data.set_id(id);
        self.read(api, data).await
    }

    async fn read(&self, api: &Self::Api, data: &mut ResourceData<BackendMemberConfig>) -> Result<()> {
        let id = data.require_id()?.to_string();
        let listener_id = data.observed_base().listener_id;

        let result = api.get_member(&listener_id, &id).await;
        let Some(member) = data.check_deleted(result, "backend member")? else {
            return Ok(());
        };
        tracing::debug!("Retrieved backend member {}: {:?}", id, member);

        let mut observed = data.observed_base();
        observed.server_id = member.server_id;
        observed.address = member.server_address;
        data.commit(observed);
        Ok(())
    }

    async fn update(&self, api: &Self::Api, data: &mut ResourceData<BackendMemberConfig>) -> Result<()> {
        self.read(api, data).await
    }

    async fn delete(&self, api: &Self::Api, data: &mut ResourceData<BackendMemberConfig>) -> Result<()> {
        let id = data.require_id()?.to_string();
        let listener_id = data.observed_base().listener_id;
        tracing::debug!("Deleting backend member {}", id);

        let result = api.remove_member(&listener_id, &id).await;
        let Some(job) = data.check_deleted(result, "backend member")? else {
            return Ok(());
        };

        self.wait_for_job(api, &job.job_id, self.timeouts.delete)
            .await
            .map_err(|e| e.context(format!("error waiting for backend member {} to delete", id)))?;

        tracing::info!("Successfully deleted backend member {}", id);
        data.clear_id();
        Ok(())
    }
}
