//! RDS v3 database instance
//!
//! Creation, volume enlargement and deletion are asynchronous jobs; flavor
//! resizes are tracked through the instance status. Node tags live on the
//! master node and are applied best effort after creation, as is the
//! public IP, which is bound through the VPC service.

use crate::client::ServiceClient;
use crate::config::ProviderConfig;
use crate::network::{NetworkApi, assign_public_ip, release_public_ip};
use async_trait::async_trait;
use otc_cloud::{
    Clock, CloudError, Observation, Resource, ResourceData, ResourceStatus, Result, Tags,
    Timeouts, Transition, WaitConfig, diff, wait_for_state,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

const BACKUP_PERIOD: &str = "1,2,3,4,5,6,7";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Datastore {
    #[serde(rename = "type")]
    pub kind: String,
    pub version: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Volume {
    #[serde(rename = "type")]
    pub kind: String,
    /// Size in GB
    pub size: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupStrategy {
    /// "hh:mm-HH:MM" window
    pub start_time: String,
    pub keep_days: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    pub id: String,
    pub name: String,
    pub role: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub availability_zone: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RdsConfig {
    pub name: String,
    pub region: String,
    pub datastore: Datastore,
    /// Flavor spec code, e.g. "rds.pg.c2.medium"
    pub flavor: String,
    pub volume: Volume,
    pub availability_zones: Vec<String>,
    pub vpc_id: String,
    pub subnet_id: String,
    pub security_group_id: String,
    pub port: Option<u16>,
    #[serde(skip_serializing)]
    pub password: Option<String>,
    pub param_group_id: Option<String>,
    pub ha_replication_mode: Option<String>,
    pub disk_encryption_id: Option<String>,
    pub backup_strategy: Option<BackupStrategy>,
    /// Tags of the master node
    #[serde(default)]
    pub tags: Tags,
    /// Elastic IP bound to the instance; at most one
    #[serde(default)]
    pub public_ips: Vec<String>,

    // Computed
    #[serde(default)]
    pub nodes: Vec<Node>,
    #[serde(default)]
    pub private_ips: Vec<String>,
    pub created: Option<String>,
}

impl RdsConfig {
    pub fn master_node_id(&self) -> Option<&str> {
        self.nodes
            .iter()
            .rev()
            .find(|n| n.role == "master")
            .map(|n| n.id.as_str())
    }
}

/// Instance status
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RdsStatus {
    Build,
    Active,
    Failed,
    Modifying,
    ModifyingInstanceType,
    BackingUp,
    Rebooting,
    Deleted,
    Other(String),
}

impl From<&str> for RdsStatus {
    fn from(s: &str) -> Self {
        match s {
            "BUILD" => RdsStatus::Build,
            "ACTIVE" => RdsStatus::Active,
            "FAILED" => RdsStatus::Failed,
            "MODIFYING" => RdsStatus::Modifying,
            "MODIFYING INSTANCE TYPE" => RdsStatus::ModifyingInstanceType,
            "BACKING UP" => RdsStatus::BackingUp,
            "REBOOTING" => RdsStatus::Rebooting,
            other => RdsStatus::Other(other.to_string()),
        }
    }
}

impl fmt::Display for RdsStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RdsStatus::Build => write!(f, "BUILD"),
            RdsStatus::Active => write!(f, "ACTIVE"),
            RdsStatus::Failed => write!(f, "FAILED"),
            RdsStatus::Modifying => write!(f, "MODIFYING"),
            RdsStatus::ModifyingInstanceType => write!(f, "MODIFYING INSTANCE TYPE"),
            RdsStatus::BackingUp => write!(f, "BACKING UP"),
            RdsStatus::Rebooting => write!(f, "REBOOTING"),
            RdsStatus::Deleted => write!(f, "DELETED"),
            RdsStatus::Other(s) => write!(f, "{}", s),
        }
    }
}

impl ResourceStatus for RdsStatus {
    fn deleted() -> Self {
        RdsStatus::Deleted
    }
}

impl RdsStatus {
    fn busy() -> [RdsStatus; 5] {
        [
            RdsStatus::Build,
            RdsStatus::Modifying,
            RdsStatus::ModifyingInstanceType,
            RdsStatus::BackingUp,
            RdsStatus::Rebooting,
        ]
    }

    /// Wait until the instance accepts modifications again
    pub fn becoming_available() -> Transition<Self> {
        Transition::new(Self::busy(), [RdsStatus::Active])
    }

    pub fn deleting() -> Transition<Self> {
        Transition::to_deleted(
            Self::busy()
                .into_iter()
                .chain([RdsStatus::Active, RdsStatus::Failed]),
        )
    }
}

/// Asynchronous job status
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobStatus {
    Running,
    Completed,
    Failed,
    Deleted,
    Other(String),
}

impl From<&str> for JobStatus {
    fn from(s: &str) -> Self {
        match s {
            "Running" => JobStatus::Running,
            "Completed" => JobStatus::Completed,
            "Failed" => JobStatus::Failed,
            other => JobStatus::Other(other.to_string()),
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobStatus::Running => write!(f, "Running"),
            JobStatus::Completed => write!(f, "Completed"),
            JobStatus::Failed => write!(f, "Failed"),
            JobStatus::Deleted => write!(f, "Deleted"),
            JobStatus::Other(s) => write!(f, "{}", s),
        }
    }
}

impl ResourceStatus for JobStatus {
    fn deleted() -> Self {
        JobStatus::Deleted
    }
}

// ============ API Types ============

#[derive(Debug, Clone, Serialize)]
pub struct CreateRdsRequest {
    pub name: String,
    pub datastore: Datastore,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ha: Option<Ha>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub configuration_id: Option<String>,
    /// Port as a string; empty means engine default
    #[serde(skip_serializing_if = "String::is_empty")]
    pub port: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backup_strategy: Option<BackupStrategy>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disk_encryption_id: Option<String>,
    pub flavor_ref: String,
    pub volume: Volume,
    pub region: String,
    /// Comma-separated list of zones
    pub availability_zone: String,
    pub vpc_id: String,
    pub subnet_id: String,
    pub security_group_id: String,
    pub charge_info: ChargeInfo,
}

#[derive(Debug, Clone, Serialize)]
pub struct Ha {
    pub mode: String,
    pub replication_mode: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChargeInfo {
    pub charge_mode: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreatedRds {
    pub instance: InstanceRef,
    pub job_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InstanceRef {
    pub id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JobResponse {
    pub job_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Job {
    pub id: String,
    pub status: String,
    #[serde(default)]
    pub fail_reason: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct HaInfo {
    pub replication_mode: String,
}

/// Instance as returned by the list API
#[derive(Debug, Clone, Deserialize)]
pub struct RdsInstanceInfo {
    pub id: String,
    pub name: String,
    pub status: String,
    pub flavor_ref: String,
    pub port: u16,
    pub volume: Volume,
    pub datastore: Datastore,
    pub vpc_id: String,
    pub subnet_id: String,
    pub security_group_id: String,
    #[serde(default)]
    pub private_ips: Vec<String>,
    #[serde(default)]
    pub nodes: Vec<Node>,
    #[serde(default)]
    pub backup_strategy: Option<BackupStrategy>,
    #[serde(default)]
    pub ha: Option<HaInfo>,
    #[serde(default)]
    pub disk_encryption_id: Option<String>,
    #[serde(default)]
    pub created: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeTag {
    pub key: String,
    pub value: String,
}

#[async_trait]
pub trait RdsApi: Send + Sync {
    async fn create_instance(&self, request: &CreateRdsRequest) -> Result<CreatedRds>;

    /// Instance by id; `None` when no instance matches
    async fn find_instance(&self, id: &str) -> Result<Option<RdsInstanceInfo>>;

    async fn get_job(&self, job_id: &str) -> Result<Job>;

    async fn update_backup_policy(&self, id: &str, strategy: &BackupStrategy) -> Result<()>;

    async fn list_node_tags(&self, node_id: &str) -> Result<Vec<NodeTag>>;

    async fn create_node_tag(&self, node_id: &str, tag: &NodeTag) -> Result<()>;

    async fn delete_node_tag(&self, node_id: &str, key: &str) -> Result<()>;

    async fn resize_flavor(&self, id: &str, spec_code: &str) -> Result<()>;

    async fn enlarge_volume(&self, id: &str, size: u32) -> Result<JobResponse>;

    async fn delete_instance(&self, id: &str) -> Result<JobResponse>;

    /// Apply a parameter group to the instance
    async fn apply_configuration(&self, configuration_id: &str, id: &str) -> Result<()>;

    /// VPC API used to bind public IPs
    fn network(&self) -> &dyn NetworkApi;
}

/// RDS endpoint together with the VPC endpoint used for public IPs
#[derive(Debug, Clone)]
pub struct RdsClient {
    rds: ServiceClient,
    network: ServiceClient,
}

impl RdsClient {
    pub fn new(rds: ServiceClient, network: ServiceClient) -> Self {
        Self { rds, network }
    }

    pub fn from_config(config: &ProviderConfig) -> crate::error::Result<Self> {
        Ok(Self::new(
            config.service_client("rds")?,
            config.service_client("vpc")?,
        ))
    }
}

#[derive(Deserialize)]
struct InstanceList {
    #[serde(default)]
    instances: Vec<RdsInstanceInfo>,
}

#[derive(Deserialize)]
struct JobEnvelope {
    job: Job,
}

#[derive(Deserialize)]
struct TagList {
    #[serde(default)]
    tags: Vec<NodeTag>,
}

#[async_trait]
impl RdsApi for RdsClient {
    async fn create_instance(&self, request: &CreateRdsRequest) -> Result<CreatedRds> {
        let url = self.rds.url(&format!("v3/{}/instances", self.rds.project_id()));
        self.rds.rest().post(&url, request).await
    }

    async fn find_instance(&self, id: &str) -> Result<Option<RdsInstanceInfo>> {
        let url = self.rds.url(&format!("v3/{}/instances?id={}", self.rds.project_id(), id));
        let list: InstanceList = self.rds.rest().get(&url).await?;
        Ok(list.instances.into_iter().next())
    }

    async fn get_job(&self, job_id: &str) -> Result<Job> {
        let url = self.rds.url(&format!("v3/{}/jobs?id={}", self.rds.project_id(), job_id));
        let envelope: JobEnvelope = self.rds.rest().get(&url).await?;
        Ok(envelope.job)
    }

    async fn update_backup_policy(&self, id: &str, strategy: &BackupStrategy) -> Result<()> {
        let url = self.rds.url(&format!(
            "v3/{}/instances/{}/backups/policy",
            self.rds.project_id(),
            id
        ));
        let body = serde_json::json!({
            "backup_policy": {
                "keep_days": strategy.keep_days,
                "start_time": strategy.start_time,
                "period": BACKUP_PERIOD,
            }
        });
        self.rds.rest().put_action(&url, &body).await
    }

    async fn list_node_tags(&self, node_id: &str) -> Result<Vec<NodeTag>> {
        let url = self.rds.url(&format!("v1/{}/rds/{}/tags", self.rds.project_id(), node_id));
        let list: TagList = self.rds.rest().get(&url).await?;
        Ok(list.tags)
    }

    async fn create_node_tag(&self, node_id: &str, tag: &NodeTag) -> Result<()> {
        let url = self.rds.url(&format!("v1/{}/rds/{}/tags", self.rds.project_id(), node_id));
        self.rds.rest()
            .post_action(&url, &serde_json::json!({ "tag": tag }))
            .await
    }

    async fn delete_node_tag(&self, node_id: &str, key: &str) -> Result<()> {
        let url = self.rds.url(&format!(
            "v1/{}/rds/{}/tags/{}",
            self.rds.project_id(),
            node_id,
            key
        ));
        self.rds.rest().delete(&url).await
    }

    async fn resize_flavor(&self, id: &str, spec_code: &str) -> Result<()> {
        let url = self.rds.url(&format!("v3/{}/instances/{}/action", self.rds.project_id(), id));
        let body = serde_json::json!({ "resize_flavor": { "spec_code": spec_code } });
        self.rds.rest().post_action(&url, &body).await
    }

    async fn enlarge_volume(&self, id: &str, size: u32) -> Result<JobResponse> {
        let url = self.rds.url(&format!("v3/{}/instances/{}/action", self.rds.project_id(), id));
        let body = serde_json::json!({ "enlarge_volume": { "size": size } });
        self.rds.rest().post(&url, &body).await
    }

    async fn delete_instance(&self, id: &str) -> Result<JobResponse> {
        let url = self.rds.url(&format!("v3/{}/instances/{}", self.rds.project_id(), id));
        self.rds.rest().delete_with_body(&url).await
    }

    async fn apply_configuration(&self, configuration_id: &str, id: &str) -> Result<()> {
        let url = self.rds.url(&format!(
            "v3/{}/configurations/{}/apply",
            self.rds.project_id(),
            configuration_id
        ));
        let body = serde_json::json!({ "instance_ids": [id] });
        self.rds.rest().put_action(&url, &body).await
    }

    fn network(&self) -> &dyn NetworkApi {
        &self.network
    }
}

// ============ Resource ============

pub struct RdsInstance {
    clock: Arc<dyn Clock>,
    timeouts: Timeouts,
}

impl RdsInstance {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            timeouts: Timeouts::new(
                Duration::from_secs(30 * 60),
                Duration::from_secs(60 * 60),
                Duration::from_secs(30 * 60),
            ),
        }
    }

    pub fn with_timeouts(mut self, timeouts: Timeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    async fn wait_for_job(&self, api: &dyn RdsApi, job_id: &str, timeout: Duration) -> Result<()> {
        let config = WaitConfig::new(Transition::new([JobStatus::Running], [JobStatus::Completed]))
            .timeout(timeout)
            .delay(Duration::from_secs(5))
            .min_interval(Duration::from_secs(5))
            .max_interval(Duration::from_secs(30));
        wait_for_state(self.clock.as_ref(), &config, || observe_job(api, job_id)).await?;
        Ok(())
    }

    async fn wait_for_available(&self, api: &dyn RdsApi, id: &str) -> Result<()> {
        let config = WaitConfig::new(RdsStatus::becoming_available())
            .timeout(self.timeouts.update)
            .min_interval(Duration::from_secs(5))
            .max_interval(Duration::from_secs(30));
        wait_for_state(self.clock.as_ref(), &config, || observe_instance(api, id)).await?;
        Ok(())
    }

    async fn bind_public_ip(
        &self,
        api: &dyn RdsApi,
        data: &ResourceData<RdsConfig>,
        public_ip: &str,
    ) -> Result<()> {
        let private_ip = data
            .state()
            .and_then(|s| s.private_ips.first())
            .ok_or_else(|| CloudError::Precondition("RDS instance has no private IP".to_string()))?;
        assign_public_ip(api.network(), public_ip, private_ip, &data.desired().subnet_id).await
    }

    /// Tag the master node, logging instead of failing
    async fn apply_initial_tags(&self, api: &dyn RdsApi, id: &str, tags: &Tags) {
        let master = match api.find_instance(id).await {
            Ok(Some(instance)) => instance
                .nodes
                .into_iter()
                .rev()
                .find(|n| n.role == "master")
                .map(|n| n.id),
            Ok(None) => None,
            Err(e) => {
                tracing::warn!("Error fetching RDS instance {} for tagging: {}", id, e);
                return;
            }
        };
        let Some(node_id) = master else {
            tracing::warn!("Error setting tags of RDS instance {}: no master node", id);
            return;
        };

        tracing::debug!("Setting tags of RDS node {}: {:?}", node_id, tags);
        for (key, value) in tags {
            let tag = NodeTag {
                key: key.clone(),
                value: value.clone(),
            };
            if let Err(e) = api.create_node_tag(&node_id, &tag).await {
                tracing::warn!("Error setting tag {} of RDS instance {}: {}", key, id, e);
            }
        }
    }
}

/// Record a change the read API does not report back
fn record_applied(data: &mut ResourceData<RdsConfig>, apply: impl FnOnce(&mut RdsConfig)) {
    let mut state = data.observed_base();
    apply(&mut state);
    data.commit(state);
}

async fn observe_job(api: &dyn RdsApi, job_id: &str) -> Result<Observation<Job, JobStatus>> {
    let job = api.get_job(job_id).await?;
    let status = JobStatus::from(job.status.as_str());
    if status == JobStatus::Failed {
        return Err(CloudError::JobFailed {
            job_id: job_id.to_string(),
            reason: job.fail_reason.unwrap_or_else(|| "unknown reason".to_string()),
        });
    }
    Ok(Observation::new(job, status))
}

async fn observe_instance(
    api: &dyn RdsApi,
    id: &str,
) -> Result<Observation<RdsInstanceInfo, RdsStatus>> {
    match api.find_instance(id).await? {
        Some(instance) => {
            let status = RdsStatus::from(instance.status.as_str());
            Ok(Observation::new(instance, status))
        }
        None => Err(CloudError::NotFound(format!("RDS instance {}", id))),
    }
}

#[async_trait]
impl Resource for RdsInstance {
    type Config = RdsConfig;
    type Api = dyn RdsApi;

    fn type_name(&self) -> &'static str {
        "rds_instance"
    }

    fn has_changes(&self, data: &ResourceData<RdsConfig>) -> bool {
        data.has_change(|c| &c.backup_strategy)
            || data.has_change(|c| &c.tags)
            || data.has_change(|c| &c.flavor)
            || data.has_change(|c| &c.volume.size)
            || data.has_change(|c| &c.public_ips)
            || data.has_change(|c| &c.param_group_id)
    }

    fn requires_replacement(&self, data: &ResourceData<RdsConfig>) -> bool {
        data.has_change(|c| &c.name)
            || data.has_change(|c| &c.region)
            || data.has_change(|c| &c.datastore)
            || data.has_change(|c| &c.volume.kind)
            || data.has_change(|c| &c.availability_zones)
            || data.has_change(|c| &c.vpc_id)
            || data.has_change(|c| &c.subnet_id)
            || data.has_change(|c| &c.security_group_id)
            || data.has_set_change(|c| &c.port)
            || data.has_set_change(|c| &c.ha_replication_mode)
            || data.has_set_change(|c| &c.disk_encryption_id)
    }

    async fn create(&self, api: &Self::Api, data: &mut ResourceData<RdsConfig>) -> Result<()> {
        let desired = data.desired();
        let request = CreateRdsRequest {
            name: desired.name.clone(),
            datastore: desired.datastore.clone(),
            ha: desired.ha_replication_mode.clone().map(|replication_mode| Ha {
                mode: "Ha".to_string(),
                replication_mode,
            }),
            configuration_id: desired.param_group_id.clone(),
            port: desired.port.map(|p| p.to_string()).unwrap_or_default(),
            password: desired.password.clone(),
            backup_strategy: desired.backup_strategy.clone(),
            disk_encryption_id: desired.disk_encryption_id.clone(),
            flavor_ref: desired.flavor.clone(),
            volume: desired.volume.clone(),
            region: desired.region.clone(),
            availability_zone: desired.availability_zones.join(","),
            vpc_id: desired.vpc_id.clone(),
            subnet_id: desired.subnet_id.clone(),
            security_group_id: desired.security_group_id.clone(),
            charge_info: ChargeInfo {
                charge_mode: "postPaid".to_string(),
            },
        };

        let created = api
            .create_instance(&request)
            .await
            .map_err(|e| e.context("error creating RDSv3 instance"))?;
        let id = created.instance.id;

        self.wait_for_job(api, &created.job_id, self.timeouts.create)
            .await
            .map_err(|e| e.context(format!("error waiting for RDSv3 instance ({}) creation", id)))?;

        tracing::info!("RDSv3 instance {} created", id);
        data.set_id(id.clone());

        let tags = data.desired().tags.clone();
        if !tags.is_empty() {
            self.apply_initial_tags(api, &id, &tags).await;
        }

        if let Some(public_ip) = data.desired().public_ips.first().cloned() {
            self.read(api, data).await?;
            if let Err(e) = self.bind_public_ip(api, data, &public_ip).await {
                tracing::warn!("Failed to assign public IP {} to RDS instance {}: {}", public_ip, id, e);
                record_applied(data, |c| c.public_ips.clear());
            }
        }

        self.read(api, data).await
    }

    async fn read(&self, api: &Self::Api, data: &mut ResourceData<RdsConfig>) -> Result<()> {
        let id = data.require_id()?.to_string();
        let instance = api
            .find_instance(&id)
            .await
            .map_err(|e| e.context("error fetching RDS instance"))?;
        let Some(instance) = instance else {
            tracing::warn!("RDS instance {} not found, removing from state", id);
            data.clear_id();
            return Ok(());
        };

        let mut observed = data.observed_base();
        observed.name = instance.name;
        observed.flavor = instance.flavor_ref;
        observed.security_group_id = instance.security_group_id;
        observed.subnet_id = instance.subnet_id;
        observed.vpc_id = instance.vpc_id;
        observed.created = instance.created;
        observed.ha_replication_mode = instance
            .ha
            .map(|ha| ha.replication_mode)
            .filter(|m| !m.is_empty());
        observed.volume = instance.volume;
        observed.disk_encryption_id = instance.disk_encryption_id.filter(|k| !k.is_empty());
        observed.datastore = instance.datastore;
        observed.port = Some(instance.port);
        observed.private_ips = instance.private_ips;
        observed.nodes = instance.nodes;
        if instance.backup_strategy.is_some() {
            observed.backup_strategy = instance.backup_strategy;
        }

        if let Some(node_id) = observed.master_node_id() {
            let tags = api
                .list_node_tags(node_id)
                .await
                .map_err(|e| e.context("error fetching RDS instance tags"))?;
            observed.tags = tags.into_iter().map(|t| (t.key, t.value)).collect();
        } else {
            tracing::warn!("Error fetching master node of RDS instance {}", id);
        }

        data.commit(observed);
        Ok(())
    }

    async fn update(&self, api: &Self::Api, data: &mut ResourceData<RdsConfig>) -> Result<()> {
        let id = data.require_id()?.to_string();

        let (old_size, new_size) = data.get_change(|c| &c.volume.size);
        if old_size.is_some_and(|old| old > new_size) {
            return Err(CloudError::Precondition(
                "shrinking RDS volume size is not supported".to_string(),
            ));
        }
        if data.desired().public_ips.len() > 1 {
            return Err(CloudError::Precondition(
                "RDS instance can't have more than one public IP".to_string(),
            ));
        }
        if data.has_change(|c| &c.param_group_id) && data.desired().param_group_id.is_none() {
            return Err(CloudError::Precondition(
                "param_group_id can't be removed without recreation".to_string(),
            ));
        }

        if data.has_change(|c| &c.backup_strategy) {
            match &data.desired().backup_strategy {
                Some(strategy) => {
                    tracing::debug!("Update backup policy of {}: {:?}", id, strategy);
                    api.update_backup_policy(&id, strategy)
                        .await
                        .map_err(|e| e.context("error updating RDSv3 backup policy"))?;
                }
                None => tracing::warn!("Backup policy of RDS instance {} cannot be removed", id),
            }
        }

        if data.has_change(|c| &c.tags) {
            let node_id = data
                .state()
                .and_then(|s| s.master_node_id())
                .map(str::to_string)
                .ok_or_else(|| {
                    CloudError::Precondition(format!("RDS instance {} has no master node", id))
                })?;
            let empty = Tags::new();
            let old = data.state().map(|s| &s.tags).unwrap_or(&empty);
            let delta = diff(old, &data.desired().tags);

            for (key, _) in &delta.to_remove {
                api.delete_node_tag(&node_id, key)
                    .await
                    .map_err(|e| e.context(format!("error deleting tag {} of RDS instance", key)))?;
            }
            for (key, value) in &delta.to_create {
                let tag = NodeTag {
                    key: key.clone(),
                    value: value.clone(),
                };
                api.create_node_tag(&node_id, &tag)
                    .await
                    .map_err(|e| e.context(format!("error setting tag {} of RDS instance", key)))?;
            }
        }

        if data.has_change(|c| &c.flavor) {
            let flavor = data.desired().flavor.clone();
            self.wait_for_available(api, &id)
                .await
                .map_err(|e| e.context("RDS instance not available for flavor update"))?;

            tracing::debug!("Update flavor of {}: {}", id, flavor);
            api.resize_flavor(&id, &flavor)
                .await
                .map_err(|e| e.context("error updating instance flavor"))?;

            self.wait_for_available(api, &id)
                .await
                .map_err(|e| e.context("error waiting for RDS instance flavor update"))?;
            tracing::info!("Updated RDS instance {} flavor: {}", id, flavor);
        }

        if data.has_change(|c| &c.volume.size) {
            let size = data.desired().volume.size;
            self.wait_for_available(api, &id)
                .await
                .map_err(|e| e.context("RDS instance not available for volume update"))?;

            let job = api
                .enlarge_volume(&id, size)
                .await
                .map_err(|e| e.context("error updating instance volume"))?;
            self.wait_for_job(api, &job.job_id, self.timeouts.update)
                .await
                .map_err(|e| e.context("error waiting for RDS volume enlargement"))?;
            tracing::info!("Updated RDS instance {} volume: {} GB", id, size);
        }

        if data.has_change(|c| &c.public_ips) {
            let (old, new) = data.get_change(|c| &c.public_ips);
            let old_ip = old.and_then(|ips| ips.first()).cloned();
            let new_ip = new.first().cloned();

            if let Some(old_ip) = old_ip {
                release_public_ip(api.network(), &old_ip)
                    .await
                    .map_err(|e| e.context(format!("error releasing public IP {}", old_ip)))?;
                record_applied(data, |c| c.public_ips.clear());
            }
            if let Some(new_ip) = new_ip {
                self.bind_public_ip(api, data, &new_ip)
                    .await
                    .map_err(|e| e.context(format!("error assigning public IP {}", new_ip)))?;
                record_applied(data, |c| c.public_ips = vec![new_ip]);
            }
        }

        if data.has_change(|c| &c.param_group_id) {
            if let Some(group) = data.desired().param_group_id.clone() {
                tracing::debug!("Applying parameter group {} to {}", group, id);
                api.apply_configuration(&group, &id)
                    .await
                    .map_err(|e| e.context("error during apply new configuration"))?;
                record_applied(data, |c| c.param_group_id = Some(group));
            }
        }

        self.read(api, data).await
    }

    async fn delete(&self, api: &Self::Api, data: &mut ResourceData<RdsConfig>) -> Result<()> {
        let id = data.require_id()?.to_string();
        tracing::debug!("Deleting RDS instance {}", id);

        let result = api.delete_instance(&id).await;
        if data.check_deleted(result, "RDS instance")?.is_none() {
            return Ok(());
        }

        let config = WaitConfig::new(RdsStatus::deleting())
            .timeout(self.timeouts.delete)
            .delay(Duration::from_secs(5))
            .min_interval(Duration::from_secs(5))
            .max_interval(Duration::from_secs(30));
        wait_for_state(self.clock.as_ref(), &config, || observe_instance(api, &id))
            .await
            .map_err(|e| e.context("error deleting RDSv3 instance"))?;

        data.clear_id();
        Ok(())
    }
}
