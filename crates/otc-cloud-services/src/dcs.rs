//! DCS (distributed cache) instance

use crate::client::ServiceClient;
use async_trait::async_trait;
use otc_cloud::{
    Clock, Observation, Resource, ResourceData, ResourceStatus, Result, Timeouts, Transition,
    WaitConfig, wait_for_state,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Periodic backup schedule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupPolicy {
    pub save_days: u32,
    pub backup_type: String,
    pub periodical_backup_plan: BackupPlan,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupPlan {
    pub begin_at: String,
    pub period_type: String,
    pub backup_at: Vec<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DcsConfig {
    pub name: String,
    pub description: String,
    pub engine: String,
    pub engine_version: String,
    /// Cache size in GB
    pub capacity: u32,
    pub access_user: Option<String>,
    #[serde(skip_serializing)]
    pub password: Option<String>,
    pub vpc_id: String,
    pub security_group_id: String,
    pub subnet_id: String,
    pub available_zones: Vec<String>,
    pub product_id: String,
    pub maintain_begin: String,
    pub maintain_end: String,
    pub backup_policy: Option<BackupPolicy>,

    // Computed
    pub ip: Option<String>,
    pub port: Option<u16>,
    pub max_memory: Option<u64>,
    pub used_memory: Option<u64>,
}

impl DcsConfig {
    pub fn new(name: impl Into<String>, capacity: u32, product_id: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            engine: "Redis".to_string(),
            engine_version: "3.0".to_string(),
            capacity,
            access_user: None,
            password: None,
            vpc_id: String::new(),
            security_group_id: String::new(),
            subnet_id: String::new(),
            available_zones: Vec::new(),
            product_id: product_id.into(),
            maintain_begin: String::new(),
            maintain_end: String::new(),
            backup_policy: None,
            ip: None,
            port: None,
            max_memory: None,
            used_memory: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DcsStatus {
    Creating,
    Running,
    Deleting,
    Deleted,
    Error,
    Other(String),
}

impl From<&str> for DcsStatus {
    fn from(s: &str) -> Self {
        match s {
            "CREATING" => DcsStatus::Creating,
            "RUNNING" => DcsStatus::Running,
            "DELETING" => DcsStatus::Deleting,
            "DELETED" => DcsStatus::Deleted,
            "ERROR" => DcsStatus::Error,
            other => DcsStatus::Other(other.to_string()),
        }
    }
}

impl fmt::Display for DcsStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DcsStatus::Creating => write!(f, "CREATING"),
            DcsStatus::Running => write!(f, "RUNNING"),
            DcsStatus::Deleting => write!(f, "DELETING"),
            DcsStatus::Deleted => write!(f, "DELETED"),
            DcsStatus::Error => write!(f, "ERROR"),
            DcsStatus::Other(s) => write!(f, "{}", s),
        }
    }
}

impl ResourceStatus for DcsStatus {
    fn deleted() -> Self {
        DcsStatus::Deleted
    }
}

// ============ API Types ============

#[derive(Debug, Clone, Serialize)]
pub struct CreateInstanceRequest {
    pub name: String,
    pub description: String,
    pub engine: String,
    pub engine_version: String,
    pub capacity: u32,
    /// "true" when neither user nor password is set
    pub no_password_access: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_user: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    pub vpc_id: String,
    pub security_group_id: String,
    pub subnet_id: String,
    pub available_zones: Vec<String>,
    pub product_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instance_backup_policy: Option<BackupPolicy>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub maintain_begin: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub maintain_end: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreatedInstance {
    pub instance_id: String,
}

/// Only the fields that changed are sent
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct UpdateInstanceRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub maintain_begin: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub maintain_end: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub security_group_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instance_backup_policy: Option<BackupPolicy>,
}

impl UpdateInstanceRequest {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Instance {
    pub instance_id: String,
    pub name: String,
    pub description: String,
    pub engine: String,
    pub engine_version: String,
    pub capacity: u32,
    pub status: String,
    pub ip: String,
    pub port: u16,
    pub vpc_id: String,
    pub security_group_id: String,
    pub subnet_id: String,
    pub product_id: String,
    pub maintain_begin: String,
    pub maintain_end: String,
    pub access_user: String,
    pub max_memory: u64,
    pub used_memory: u64,
}

#[async_trait]
pub trait DcsApi: Send + Sync {
    async fn create_instance(&self, request: &CreateInstanceRequest) -> Result<CreatedInstance>;

    async fn get_instance(&self, id: &str) -> Result<Instance>;

    async fn update_instance(&self, id: &str, request: &UpdateInstanceRequest) -> Result<()>;

    async fn delete_instance(&self, id: &str) -> Result<()>;
}

#[async_trait]
impl DcsApi for ServiceClient {
    async fn create_instance(&self, request: &CreateInstanceRequest) -> Result<CreatedInstance> {
        let url = self.url(&format!("v1.0/{}/instances", self.project_id()));
        self.rest().post(&url, request).await
    }

    async fn get_instance(&self, id: &str) -> Result<Instance> {
        let url = self.url(&format!("v1.0/{}/instances/{}", self.project_id(), id));
        self.rest().get(&url).await
    }

    async fn update_instance(&self, id: &str, request: &UpdateInstanceRequest) -> Result<()> {
        let url = self.url(&format!("v1.0/{}/instances/{}", self.project_id(), id));
        self.rest().put_action(&url, request).await
    }

    async fn delete_instance(&self, id: &str) -> Result<()> {
        let url = self.url(&format!("v1.0/{}/instances/{}", self.project_id(), id));
        self.rest().delete(&url).await
    }
}

// ============ Resource ============

pub struct DcsInstance {
    clock: Arc<dyn Clock>,
    timeouts: Timeouts,
}

impl DcsInstance {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            timeouts: Timeouts::uniform(Duration::from_secs(15 * 60)),
        }
    }

    pub fn with_timeouts(mut self, timeouts: Timeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    fn update_request(data: &ResourceData<DcsConfig>) -> UpdateInstanceRequest {
        let desired = data.desired();
        let mut request = UpdateInstanceRequest::default();
        if data.has_change(|c| &c.name) {
            request.name = Some(desired.name.clone());
        }
        if data.has_change(|c| &c.description) {
            request.description = Some(desired.description.clone());
        }
        if data.has_change(|c| &c.maintain_begin) {
            request.maintain_begin = Some(desired.maintain_begin.clone());
        }
        if data.has_change(|c| &c.maintain_end) {
            request.maintain_end = Some(desired.maintain_end.clone());
        }
        if data.has_change(|c| &c.security_group_id) {
            request.security_group_id = Some(desired.security_group_id.clone());
        }
        if data.has_change(|c| &c.backup_policy) {
            request.instance_backup_policy = desired.backup_policy.clone();
        }
        request
    }
}

async fn observe(api: &dyn DcsApi, id: &str) -> Result<Observation<Instance, DcsStatus>> {
    let instance = api.get_instance(id).await?;
    let status = DcsStatus::from(instance.status.as_str());
    Ok(Observation::new(instance, status))
}

fn non_empty(s: String) -> Option<String> {
    if s.is_empty() { None } else { Some(s) }
}

#[async_trait]
impl Resource for DcsInstance {
    type Config = DcsConfig;
    type Api = dyn DcsApi;

    fn type_name(&self) -> &'static str {
        "dcs_instance"
    }

    fn has_changes(&self, data: &ResourceData<DcsConfig>) -> bool {
        !Self::update_request(data).is_empty()
    }

    fn requires_replacement(&self, data: &ResourceData<DcsConfig>) -> bool {
        data.has_change(|c| &c.engine)
            || data.has_change(|c| &c.engine_version)
            || data.has_change(|c| &c.capacity)
            || data.has_change(|c| &c.product_id)
            || data.has_change(|c| &c.vpc_id)
            || data.has_change(|c| &c.subnet_id)
            || data.has_change(|c| &c.available_zones)
            || data.has_set_change(|c| &c.access_user)
    }

    async fn create(&self, api: &Self::Api, data: &mut ResourceData<DcsConfig>) -> Result<()> {
        let desired = data.desired();
        let no_password_access = desired.access_user.is_none() && desired.password.is_none();
        let request = CreateInstanceRequest {
            name: desired.name.clone(),
            description: desired.description.clone(),
            engine: desired.engine.clone(),
            engine_version: desired.engine_version.clone(),
            capacity: desired.capacity,
            no_password_access: no_password_access.to_string(),
            access_user: desired.access_user.clone(),
            password: desired.password.clone(),
            vpc_id: desired.vpc_id.clone(),
            security_group_id: desired.security_group_id.clone(),
            subnet_id: desired.subnet_id.clone(),
            available_zones: desired.available_zones.clone(),
            product_id: desired.product_id.clone(),
            instance_backup_policy: desired.backup_policy.clone(),
            maintain_begin: desired.maintain_begin.clone(),
            maintain_end: desired.maintain_end.clone(),
        };

        tracing::debug!("Create DCS instance {}", request.name);
        let created = api
            .create_instance(&request)
            .await
            .map_err(|e| e.context("error creating DCS instance"))?;
        tracing::info!("DCS instance ID: {}", created.instance_id);

        let config = WaitConfig::new(Transition::new([DcsStatus::Creating], [DcsStatus::Running]))
            .timeout(self.timeouts.create)
            .delay(Duration::from_secs(10))
            .min_interval(Duration::from_secs(3));
        wait_for_state(self.clock.as_ref(), &config, || {
            observe(api, &created.instance_id)
        })
        .await
        .map_err(|e| {
            e.context(format!(
                "error waiting for DCS instance ({}) to become ready",
                created.instance_id
            ))
        })?;

        data.set_id(created.instance_id);
        self.read(api, data).await
    }

    async fn read(&self, api: &Self::Api, data: &mut ResourceData<DcsConfig>) -> Result<()> {
        let id = data.require_id()?.to_string();
        let result = api.get_instance(&id).await;
        let Some(instance) = data.check_deleted(result, "DCS instance")? else {
            return Ok(());
        };
        tracing::debug!("DCS instance {}: {:?}", id, instance);

        let mut observed = data.observed_base();
        observed.name = instance.name;
        observed.description = instance.description;
        observed.engine = instance.engine;
        if !instance.engine_version.is_empty() {
            observed.engine_version = instance.engine_version;
        }
        observed.capacity = instance.capacity;
        observed.vpc_id = instance.vpc_id;
        observed.security_group_id = instance.security_group_id;
        observed.subnet_id = instance.subnet_id;
        observed.product_id = instance.product_id;
        observed.maintain_begin = instance.maintain_begin;
        observed.maintain_end = instance.maintain_end;
        observed.access_user = non_empty(instance.access_user);
        observed.ip = non_empty(instance.ip);
        observed.port = Some(instance.port);
        observed.max_memory = Some(instance.max_memory);
        observed.used_memory = Some(instance.used_memory);

        data.commit(observed);
        Ok(())
    }

    async fn update(&self, api: &Self::Api, data: &mut ResourceData<DcsConfig>) -> Result<()> {
        let id = data.require_id()?.to_string();
        let request = Self::update_request(data);
        if !request.is_empty() {
            api.update_instance(&id, &request)
                .await
                .map_err(|e| e.context("error updating DCS instance"))?;
        }
        self.read(api, data).await
    }

    async fn delete(&self, api: &Self::Api, data: &mut ResourceData<DcsConfig>) -> Result<()> {
        let id = data.require_id()?.to_string();
        let result = api.get_instance(&id).await;
        if data.check_deleted(result, "DCS instance")?.is_none() {
            return Ok(());
        }

        api.delete_instance(&id)
            .await
            .map_err(|e| e.context("error deleting DCS instance"))?;

        tracing::debug!("Waiting for DCS instance ({}) to delete", id);
        let config = WaitConfig::new(Transition::new(
            [DcsStatus::Deleting, DcsStatus::Running],
            [DcsStatus::Deleted],
        ))
        .timeout(self.timeouts.delete)
        .delay(Duration::from_secs(10))
        .min_interval(Duration::from_secs(3));
        wait_for_state(self.clock.as_ref(), &config, || observe(api, &id))
            .await
            .map_err(|e| e.context(format!("error waiting for DCS instance ({}) to delete", id)))?;

        tracing::debug!("DCS instance {} deactivated", id);
        data.clear_id();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use otc_cloud::{CloudError, ManualClock};
    use std::collections::{HashMap, VecDeque};
    use std::sync::Mutex;

    #[derive(Default)]
    struct FakeDcs {
        instances: Mutex<HashMap<String, Instance>>,
        /// Statuses returned by successive gets; the last one sticks
        statuses: Mutex<VecDeque<&'static str>>,
        updates: Mutex<Vec<UpdateInstanceRequest>>,
        deletes: Mutex<usize>,
    }

    impl FakeDcs {
        fn queue(&self, statuses: &[&'static str]) {
            *self.statuses.lock().unwrap() = statuses.iter().copied().collect();
        }
    }

    #[async_trait]
    impl DcsApi for FakeDcs {
        async fn create_instance(&self, request: &CreateInstanceRequest) -> Result<CreatedInstance> {
            let instance = Instance {
                instance_id: "dcs-1".to_string(),
                name: request.name.clone(),
                capacity: request.capacity,
                product_id: request.product_id.clone(),
                engine: request.engine.clone(),
                ip: "192.168.0.20".to_string(),
                port: 6379,
                ..Default::default()
            };
            self.instances
                .lock()
                .unwrap()
                .insert(instance.instance_id.clone(), instance);
            self.queue(&["CREATING", "RUNNING"]);
            Ok(CreatedInstance {
                instance_id: "dcs-1".to_string(),
            })
        }

        async fn get_instance(&self, id: &str) -> Result<Instance> {
            let status = {
                let mut statuses = self.statuses.lock().unwrap();
                if statuses.len() > 1 {
                    statuses.pop_front()
                } else {
                    statuses.front().copied()
                }
            };
            let mut instances = self.instances.lock().unwrap();
            if status == Some("gone") {
                instances.remove(id);
            }
            let instance = instances
                .get_mut(id)
                .ok_or_else(|| CloudError::NotFound(format!("instance {}", id)))?;
            instance.status = status.unwrap_or("RUNNING").to_string();
            Ok(instance.clone())
        }

        async fn update_instance(&self, id: &str, request: &UpdateInstanceRequest) -> Result<()> {
            let mut instances = self.instances.lock().unwrap();
            let instance = instances
                .get_mut(id)
                .ok_or_else(|| CloudError::NotFound(id.to_string()))?;
            if let Some(name) = &request.name {
                instance.name = name.clone();
            }
            if let Some(description) = &request.description {
                instance.description = description.clone();
            }
            if let Some(sg) = &request.security_group_id {
                instance.security_group_id = sg.clone();
            }
            self.updates.lock().unwrap().push(request.clone());
            Ok(())
        }

        async fn delete_instance(&self, _id: &str) -> Result<()> {
            *self.deletes.lock().unwrap() += 1;
            self.queue(&["DELETING", "gone"]);
            Ok(())
        }
    }

    fn config() -> DcsConfig {
        DcsConfig::new("cache", 2, "dcs.master_standby-h")
    }

    async fn created(api: &FakeDcs, res: &DcsInstance) -> ResourceData<DcsConfig> {
        let mut data = ResourceData::new(config());
        res.create(api, &mut data).await.unwrap();
        data
    }

    #[tokio::test]
    async fn test_create_waits_for_running() {
        let clock = Arc::new(ManualClock::new());
        let res = DcsInstance::new(clock.clone());
        let api = FakeDcs::default();

        let data = created(&api, &res).await;

        assert_eq!(data.id(), Some("dcs-1"));
        let state = data.state().unwrap();
        assert_eq!(state.port, Some(6379));
        assert_eq!(state.ip.as_deref(), Some("192.168.0.20"));
        assert_eq!(
            clock.sleeps(),
            vec![Duration::from_secs(10), Duration::from_secs(3)]
        );
    }

    #[tokio::test]
    async fn test_update_sends_only_changed_fields() {
        let clock = Arc::new(ManualClock::new());
        let res = DcsInstance::new(clock.clone());
        let api = FakeDcs::default();
        let mut data = created(&api, &res).await;

        let mut desired = config();
        desired.description = "session cache".to_string();
        data.set_desired(desired);
        assert!(res.has_changes(&data));
        res.update(&api, &mut data).await.unwrap();

        let updates = api.updates.lock().unwrap().clone();
        assert_eq!(updates.len(), 1);
        assert_eq!(
            updates[0],
            UpdateInstanceRequest {
                description: Some("session cache".to_string()),
                ..Default::default()
            }
        );
        assert_eq!(data.state().unwrap().description, "session cache");
    }

    #[tokio::test]
    async fn test_update_without_changes_makes_no_call() {
        let clock = Arc::new(ManualClock::new());
        let res = DcsInstance::new(clock.clone());
        let api = FakeDcs::default();
        let mut data = created(&api, &res).await;

        assert!(!res.has_changes(&data));
        res.update(&api, &mut data).await.unwrap();

        assert!(api.updates.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_capacity_change_requires_replacement() {
        let clock = Arc::new(ManualClock::new());
        let res = DcsInstance::new(clock);
        let api = FakeDcs::default();
        let mut data = created(&api, &res).await;
        assert!(!res.requires_replacement(&data));

        let mut desired = config();
        desired.capacity = 4;
        data.set_desired(desired);

        assert!(res.requires_replacement(&data));
        assert!(!res.has_changes(&data));
    }

    #[tokio::test]
    async fn test_delete_waits_until_gone() {
        let clock = Arc::new(ManualClock::new());
        let res = DcsInstance::new(clock.clone());
        let api = FakeDcs::default();
        let mut data = created(&api, &res).await;

        res.delete(&api, &mut data).await.unwrap();

        assert!(data.id().is_none());
        assert!(api.instances.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_of_missing_instance_skips_call() {
        let clock = Arc::new(ManualClock::new());
        let res = DcsInstance::new(clock);
        let api = FakeDcs::default();
        let mut data = ResourceData::existing("dcs-404", config());

        res.delete(&api, &mut data).await.unwrap();

        assert!(data.id().is_none());
        assert_eq!(*api.deletes.lock().unwrap(), 0);
    }

    #[test]
    fn test_update_request_omits_unchanged_fields() {
        let request = UpdateInstanceRequest {
            name: Some("cache-2".to_string()),
            ..Default::default()
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json, serde_json::json!({ "name": "cache-2" }));
    }
}
