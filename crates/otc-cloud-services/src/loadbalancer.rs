//! Load balancer (LBaaS v2)
//!
//! Every mutation is gated on the balancer being `ACTIVE`; while another
//! change is in flight the API answers 409, which the retry wrapper rides out.

use crate::client::ServiceClient;
use async_trait::async_trait;
use otc_cloud::{
    Clock, Observation, Resource, ResourceData, ResourceStatus, Result, RetryConfig, Timeouts,
    Transition, WaitConfig, retry_transient, wait_for_state,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadBalancerConfig {
    pub name: String,
    pub description: String,
    pub vip_subnet_id: String,
    pub vip_address: Option<String>,
    pub admin_state_up: bool,
    pub provider: Option<String>,
    /// Security groups of the VIP port
    #[serde(default)]
    pub security_group_ids: Vec<String>,
    /// Owning project; filled in by the cloud when unset
    pub tenant_id: Option<String>,

    // Computed
    pub vip_port_id: Option<String>,
}

impl LoadBalancerConfig {
    pub fn new(name: impl Into<String>, vip_subnet_id: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            vip_subnet_id: vip_subnet_id.into(),
            vip_address: None,
            admin_state_up: true,
            provider: None,
            security_group_ids: Vec::new(),
            vip_port_id: None,
            tenant_id: None,
        }
    }
}

/// Provisioning status
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LbStatus {
    Active,
    PendingCreate,
    PendingUpdate,
    PendingDelete,
    Error,
    Deleted,
    Other(String),
}

impl From<&str> for LbStatus {
    fn from(s: &str) -> Self {
        match s {
            "ACTIVE" => LbStatus::Active,
            "PENDING_CREATE" => LbStatus::PendingCreate,
            "PENDING_UPDATE" => LbStatus::PendingUpdate,
            "PENDING_DELETE" => LbStatus::PendingDelete,
            "ERROR" => LbStatus::Error,
            "DELETED" => LbStatus::Deleted,
            other => LbStatus::Other(other.to_string()),
        }
    }
}

impl fmt::Display for LbStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LbStatus::Active => write!(f, "ACTIVE"),
            LbStatus::PendingCreate => write!(f, "PENDING_CREATE"),
            LbStatus::PendingUpdate => write!(f, "PENDING_UPDATE"),
            LbStatus::PendingDelete => write!(f, "PENDING_DELETE"),
            LbStatus::Error => write!(f, "ERROR"),
            LbStatus::Deleted => write!(f, "DELETED"),
            LbStatus::Other(s) => write!(f, "{}", s),
        }
    }
}

impl ResourceStatus for LbStatus {
    fn deleted() -> Self {
        LbStatus::Deleted
    }
}

impl LbStatus {
    pub fn becoming_active() -> Transition<Self> {
        Transition::new(
            [LbStatus::PendingCreate, LbStatus::PendingUpdate],
            [LbStatus::Active],
        )
    }

    pub fn deleting() -> Transition<Self> {
        Transition::to_deleted([
            LbStatus::PendingUpdate,
            LbStatus::PendingDelete,
            LbStatus::Active,
        ])
    }
}

// ============ API Types ============

#[derive(Debug, Clone, Serialize)]
pub struct CreateLoadBalancerRequest {
    pub name: String,
    pub description: String,
    pub vip_subnet_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vip_address: Option<String>,
    pub admin_state_up: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct UpdateLoadBalancerRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub admin_state_up: Option<bool>,
}

impl UpdateLoadBalancerRequest {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LoadBalancer {
    pub id: String,
    pub name: String,
    pub description: String,
    pub vip_subnet_id: String,
    pub vip_address: String,
    pub vip_port_id: String,
    pub tenant_id: String,
    pub admin_state_up: bool,
    pub provider: String,
    pub provisioning_status: String,
}

#[async_trait]
pub trait LoadBalancerApi: Send + Sync {
    async fn create_load_balancer(&self, request: &CreateLoadBalancerRequest)
    -> Result<LoadBalancer>;

    async fn get_load_balancer(&self, id: &str) -> Result<LoadBalancer>;

    async fn update_load_balancer(&self, id: &str, request: &UpdateLoadBalancerRequest)
    -> Result<()>;

    async fn delete_load_balancer(&self, id: &str) -> Result<()>;

    async fn port_security_groups(&self, port_id: &str) -> Result<Vec<String>>;

    async fn set_port_security_groups(&self, port_id: &str, groups: &[String]) -> Result<()>;
}

#[derive(Deserialize)]
struct LoadBalancerEnvelope {
    loadbalancer: LoadBalancer,
}

#[derive(Deserialize)]
struct PortEnvelope {
    port: Port,
}

#[derive(Deserialize)]
struct Port {
    #[serde(default)]
    security_groups: Vec<String>,
}

#[async_trait]
impl LoadBalancerApi for ServiceClient {
    async fn create_load_balancer(
        &self,
        request: &CreateLoadBalancerRequest,
    ) -> Result<LoadBalancer> {
        let url = self.url("v2.0/lbaas/loadbalancers");
        let envelope: LoadBalancerEnvelope = self
            .rest()
            .post(&url, &serde_json::json!({ "loadbalancer": request }))
            .await?;
        Ok(envelope.loadbalancer)
    }

    async fn get_load_balancer(&self, id: &str) -> Result<LoadBalancer> {
        let url = self.url(&format!("v2.0/lbaas/loadbalancers/{}", id));
        let envelope: LoadBalancerEnvelope = self.rest().get(&url).await?;
        Ok(envelope.loadbalancer)
    }

    async fn update_load_balancer(
        &self,
        id: &str,
        request: &UpdateLoadBalancerRequest,
    ) -> Result<()> {
        let url = self.url(&format!("v2.0/lbaas/loadbalancers/{}", id));
        self.rest()
            .put_action(&url, &serde_json::json!({ "loadbalancer": request }))
            .await
    }

    async fn delete_load_balancer(&self, id: &str) -> Result<()> {
        let url = self.url(&format!("v2.0/lbaas/loadbalancers/{}", id));
        self.rest().delete(&url).await
    }

    async fn port_security_groups(&self, port_id: &str) -> Result<Vec<String>> {
        let url = self.url(&format!("v2.0/ports/{}", port_id));
        let envelope: PortEnvelope = self.rest().get(&url).await?;
        Ok(envelope.port.security_groups)
    }

    async fn set_port_security_groups(&self, port_id: &str, groups: &[String]) -> Result<()> {
        let url = self.url(&format!("v2.0/ports/{}", port_id));
        let body = serde_json::json!({ "port": { "security_groups": groups } });
        self.rest().put_action(&url, &body).await
    }
}

// ============ Resource ============

pub struct LoadBalancerV2 {
    clock: Arc<dyn Clock>,
    timeouts: Timeouts,
    retry: RetryConfig,
}

impl LoadBalancerV2 {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            timeouts: Timeouts::new(
                Duration::from_secs(10 * 60),
                Duration::from_secs(10 * 60),
                Duration::from_secs(5 * 60),
            ),
            retry: RetryConfig::default(),
        }
    }

    pub fn with_timeouts(mut self, timeouts: Timeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    async fn wait_for_active(
        &self,
        api: &dyn LoadBalancerApi,
        id: &str,
        timeout: Duration,
    ) -> Result<()> {
        let config = WaitConfig::new(LbStatus::becoming_active())
            .timeout(timeout)
            .min_interval(Duration::from_secs(1));
        wait_for_state(self.clock.as_ref(), &config, || observe(api, id)).await?;
        Ok(())
    }

    fn update_request(data: &ResourceData<LoadBalancerConfig>) -> UpdateLoadBalancerRequest {
        let desired = data.desired();
        let mut request = UpdateLoadBalancerRequest::default();
        if data.has_change(|c| &c.name) {
            request.name = Some(desired.name.clone());
        }
        if data.has_change(|c| &c.description) {
            request.description = Some(desired.description.clone());
        }
        if data.has_change(|c| &c.admin_state_up) {
            request.admin_state_up = Some(desired.admin_state_up);
        }
        request
    }
}

async fn observe(
    api: &dyn LoadBalancerApi,
    id: &str,
) -> Result<Observation<LoadBalancer, LbStatus>> {
    let lb = api.get_load_balancer(id).await?;
    let status = LbStatus::from(lb.provisioning_status.as_str());
    Ok(Observation::new(lb, status))
}

fn non_empty(s: String) -> Option<String> {
    if s.is_empty() { None } else { Some(s) }
}

#[async_trait]
impl Resource for LoadBalancerV2 {
    type Config = LoadBalancerConfig;
    type Api = dyn LoadBalancerApi;

    fn type_name(&self) -> &'static str {
        "lb_loadbalancer_v2"
    }

    fn has_changes(&self, data: &ResourceData<LoadBalancerConfig>) -> bool {
        !Self::update_request(data).is_empty() || data.has_change(|c| &c.security_group_ids)
    }

    fn requires_replacement(&self, data: &ResourceData<LoadBalancerConfig>) -> bool {
        data.has_change(|c| &c.vip_subnet_id)
            || data.has_set_change(|c| &c.vip_address)
            || data.has_set_change(|c| &c.tenant_id)
            || data.has_set_change(|c| &c.provider)
    }

    async fn create(
        &self,
        api: &Self::Api,
        data: &mut ResourceData<LoadBalancerConfig>,
    ) -> Result<()> {
        let desired = data.desired();
        let request = CreateLoadBalancerRequest {
            name: desired.name.clone(),
            description: desired.description.clone(),
            vip_subnet_id: desired.vip_subnet_id.clone(),
            tenant_id: desired.tenant_id.clone(),
            vip_address: desired.vip_address.clone(),
            admin_state_up: desired.admin_state_up,
            provider: desired.provider.clone(),
        };

        tracing::debug!("Create load balancer with options: {:?}", request);
        let lb = api
            .create_load_balancer(&request)
            .await
            .map_err(|e| e.context("error creating load balancer"))?;

        self.wait_for_active(api, &lb.id, self.timeouts.create)
            .await
            .map_err(|e| e.context(format!("error waiting for load balancer ({}) to become active", lb.id)))?;

        let groups = &data.desired().security_group_ids;
        if !lb.vip_port_id.is_empty() && !groups.is_empty() {
            tracing::debug!("Adding security groups to VIP port {}: {:?}", lb.vip_port_id, groups);
            api.set_port_security_groups(&lb.vip_port_id, groups)
                .await
                .map_err(|e| e.context("error setting load balancer security groups"))?;
        }

        data.set_id(lb.id);
        self.read(api, data).await
    }

    async fn read(
        &self,
        api: &Self::Api,
        data: &mut ResourceData<LoadBalancerConfig>,
    ) -> Result<()> {
        let id = data.require_id()?.to_string();
        let result = api.get_load_balancer(&id).await;
        let Some(lb) = data.check_deleted(result, "load balancer")? else {
            return Ok(());
        };

        let mut observed = data.observed_base();
        observed.name = lb.name;
        observed.description = lb.description;
        observed.vip_subnet_id = lb.vip_subnet_id;
        observed.vip_address = non_empty(lb.vip_address);
        observed.admin_state_up = lb.admin_state_up;
        observed.provider = non_empty(lb.provider);
        observed.tenant_id = non_empty(lb.tenant_id);
        observed.vip_port_id = non_empty(lb.vip_port_id);

        if let Some(port_id) = &observed.vip_port_id {
            observed.security_group_ids = api
                .port_security_groups(port_id)
                .await
                .map_err(|e| e.context("error reading VIP port security groups"))?;
        }

        data.commit(observed);
        Ok(())
    }

    async fn update(
        &self,
        api: &Self::Api,
        data: &mut ResourceData<LoadBalancerConfig>,
    ) -> Result<()> {
        let id = data.require_id()?.to_string();
        let timeout = self.timeouts.update;

        let request = Self::update_request(data);
        self.wait_for_active(api, &id, timeout).await?;

        if !request.is_empty() {
            tracing::debug!("Updating load balancer {} with options: {:?}", id, request);
            retry_transient(self.clock.as_ref(), timeout, &self.retry, || {
                api.update_load_balancer(&id, &request)
            })
            .await
            .map_err(|e| e.context(format!("unable to update load balancer {}", id)))?;

            self.wait_for_active(api, &id, timeout).await?;
        }

        if data.has_change(|c| &c.security_group_ids) {
            let port_id = data.state().and_then(|s| s.vip_port_id.clone());
            if let Some(port_id) = port_id {
                api.set_port_security_groups(&port_id, &data.desired().security_group_ids)
                    .await
                    .map_err(|e| e.context("error updating load balancer security groups"))?;
            }
        }

        self.read(api, data).await
    }

    async fn delete(
        &self,
        api: &Self::Api,
        data: &mut ResourceData<LoadBalancerConfig>,
    ) -> Result<()> {
        let id = data.require_id()?.to_string();
        let timeout = self.timeouts.delete;

        tracing::debug!("Deleting load balancer {}", id);
        let result = retry_transient(self.clock.as_ref(), timeout, &self.retry, || {
            api.delete_load_balancer(&id)
        })
        .await;
        if data.check_deleted(result, "load balancer")?.is_none() {
            return Ok(());
        }

        let config = WaitConfig::new(LbStatus::deleting()).timeout(timeout);
        wait_for_state(self.clock.as_ref(), &config, || observe(api, &id))
            .await
            .map_err(|e| e.context(format!("unable to delete load balancer {}", id)))?;

        data.clear_id();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use otc_cloud::{CloudError, ManualClock};
    use std::collections::VecDeque;
    use std::sync::Mutex;

    #[derive(Default)]
    struct FakeLb {
        lb: Mutex<Option<LoadBalancer>>,
        statuses: Mutex<VecDeque<&'static str>>,
        port_groups: Mutex<Vec<String>>,
        /// Number of 409 answers before a mutation goes through
        conflicts: Mutex<u32>,
        updates: Mutex<Vec<UpdateLoadBalancerRequest>>,
        port_updates: Mutex<usize>,
        /// Balancer status at the time of each port update
        port_update_statuses: Mutex<Vec<String>>,
        delete_attempts: Mutex<usize>,
    }

    impl FakeLb {
        fn statuses(&self, steps: &[&'static str]) {
            *self.statuses.lock().unwrap() = steps.iter().copied().collect();
        }

        fn conflict(&self) -> Result<()> {
            let mut conflicts = self.conflicts.lock().unwrap();
            if *conflicts > 0 {
                *conflicts -= 1;
                return Err(CloudError::api(409, "Invalid state PENDING_UPDATE"));
            }
            Ok(())
        }
    }

    #[async_trait]
    impl LoadBalancerApi for FakeLb {
        async fn create_load_balancer(
            &self,
            request: &CreateLoadBalancerRequest,
        ) -> Result<LoadBalancer> {
            let lb = LoadBalancer {
                id: "lb-1".to_string(),
                name: request.name.clone(),
                description: request.description.clone(),
                vip_subnet_id: request.vip_subnet_id.clone(),
                vip_address: "10.0.0.10".to_string(),
                vip_port_id: "port-1".to_string(),
                tenant_id: "tenant-1".to_string(),
                admin_state_up: request.admin_state_up,
                provider: "vlb".to_string(),
                provisioning_status: "PENDING_CREATE".to_string(),
            };
            *self.lb.lock().unwrap() = Some(lb.clone());
            self.statuses(&["PENDING_CREATE", "ACTIVE"]);
            Ok(lb)
        }

        async fn get_load_balancer(&self, id: &str) -> Result<LoadBalancer> {
            let status = {
                let mut statuses = self.statuses.lock().unwrap();
                if statuses.len() > 1 {
                    statuses.pop_front()
                } else {
                    statuses.front().copied()
                }
            };
            let mut lb = self.lb.lock().unwrap();
            if status == Some("gone") {
                *lb = None;
            }
            let lb = lb
                .as_mut()
                .ok_or_else(|| CloudError::NotFound(format!("loadbalancer {}", id)))?;
            if let Some(status) = status {
                lb.provisioning_status = status.to_string();
            }
            Ok(lb.clone())
        }

        async fn update_load_balancer(
            &self,
            _id: &str,
            request: &UpdateLoadBalancerRequest,
        ) -> Result<()> {
            self.conflict()?;
            if let Some(lb) = self.lb.lock().unwrap().as_mut() {
                if let Some(name) = &request.name {
                    lb.name = name.clone();
                }
                if let Some(admin_state_up) = request.admin_state_up {
                    lb.admin_state_up = admin_state_up;
                }
            }
            self.updates.lock().unwrap().push(request.clone());
            self.statuses(&["PENDING_UPDATE", "ACTIVE"]);
            Ok(())
        }

        async fn delete_load_balancer(&self, id: &str) -> Result<()> {
            *self.delete_attempts.lock().unwrap() += 1;
            self.conflict()?;
            if self.lb.lock().unwrap().is_none() {
                return Err(CloudError::NotFound(format!("loadbalancer {}", id)));
            }
            self.statuses(&["PENDING_DELETE", "gone"]);
            Ok(())
        }

        async fn port_security_groups(&self, _port_id: &str) -> Result<Vec<String>> {
            Ok(self.port_groups.lock().unwrap().clone())
        }

        async fn set_port_security_groups(&self, _port_id: &str, groups: &[String]) -> Result<()> {
            *self.port_updates.lock().unwrap() += 1;
            let status = self
                .lb
                .lock()
                .unwrap()
                .as_ref()
                .map(|lb| lb.provisioning_status.clone())
                .unwrap_or_default();
            self.port_update_statuses.lock().unwrap().push(status);
            *self.port_groups.lock().unwrap() = groups.to_vec();
            Ok(())
        }
    }

    fn config() -> LoadBalancerConfig {
        let mut c = LoadBalancerConfig::new("web", "subnet-1");
        c.security_group_ids = vec!["sg-1".to_string()];
        c
    }

    async fn created(api: &FakeLb, res: &LoadBalancerV2) -> ResourceData<LoadBalancerConfig> {
        let mut data = ResourceData::new(config());
        res.create(api, &mut data).await.unwrap();
        data
    }

    #[tokio::test]
    async fn test_create_waits_and_secures_vip_port() {
        let clock = Arc::new(ManualClock::new());
        let res = LoadBalancerV2::new(clock);
        let api = FakeLb::default();

        let data = created(&api, &res).await;

        assert_eq!(data.id(), Some("lb-1"));
        let state = data.state().unwrap();
        assert_eq!(state.vip_port_id.as_deref(), Some("port-1"));
        assert_eq!(state.security_group_ids, vec!["sg-1".to_string()]);
        assert!(!res.has_changes(&data));
    }

    #[tokio::test]
    async fn test_update_retries_conflicts() {
        let clock = Arc::new(ManualClock::new());
        let res = LoadBalancerV2::new(clock.clone());
        let api = FakeLb::default();
        let mut data = created(&api, &res).await;
        *api.conflicts.lock().unwrap() = 2;

        let mut desired = config();
        desired.name = "web-2".to_string();
        data.set_desired(desired);
        res.update(&api, &mut data).await.unwrap();

        let updates = api.updates.lock().unwrap().clone();
        assert_eq!(
            updates,
            vec![UpdateLoadBalancerRequest {
                name: Some("web-2".to_string()),
                ..Default::default()
            }]
        );
        assert_eq!(*api.port_updates.lock().unwrap(), 1);
        assert_eq!(data.state().unwrap().name, "web-2");
    }

    #[tokio::test]
    async fn test_update_security_groups_only() {
        let clock = Arc::new(ManualClock::new());
        let res = LoadBalancerV2::new(clock);
        let api = FakeLb::default();
        let mut data = created(&api, &res).await;

        let mut desired = config();
        desired.security_group_ids = vec!["sg-1".to_string(), "sg-2".to_string()];
        data.set_desired(desired);
        res.update(&api, &mut data).await.unwrap();

        assert!(api.updates.lock().unwrap().is_empty());
        assert_eq!(*api.port_updates.lock().unwrap(), 2);
        assert_eq!(data.state().unwrap().security_group_ids.len(), 2);
    }

    #[tokio::test]
    async fn test_security_group_change_waits_for_active() {
        let clock = Arc::new(ManualClock::new());
        let res = LoadBalancerV2::new(clock);
        let api = FakeLb::default();
        let mut data = created(&api, &res).await;

        if let Some(lb) = api.lb.lock().unwrap().as_mut() {
            lb.provisioning_status = "PENDING_UPDATE".to_string();
        }
        api.statuses(&["PENDING_UPDATE", "PENDING_UPDATE", "ACTIVE"]);

        let mut desired = config();
        desired.security_group_ids = vec!["sg-2".to_string()];
        data.set_desired(desired);
        res.update(&api, &mut data).await.unwrap();

        let statuses = api.port_update_statuses.lock().unwrap().clone();
        assert_eq!(statuses.last().map(String::as_str), Some("ACTIVE"));
        assert!(api.updates.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_create_passes_tenant_and_subnet_change_replaces() {
        let clock = Arc::new(ManualClock::new());
        let res = LoadBalancerV2::new(clock);
        let api = FakeLb::default();
        let mut desired = config();
        desired.tenant_id = Some("tenant-1".to_string());
        let mut data = ResourceData::new(desired.clone());
        res.create(&api, &mut data).await.unwrap();

        assert_eq!(data.state().unwrap().tenant_id.as_deref(), Some("tenant-1"));
        assert!(!res.requires_replacement(&data));

        desired.vip_subnet_id = "subnet-2".to_string();
        data.set_desired(desired);
        assert!(res.requires_replacement(&data));
    }

    #[test]
    fn test_create_request_carries_tenant() {
        let request = CreateLoadBalancerRequest {
            name: "web".to_string(),
            description: String::new(),
            vip_subnet_id: "subnet-1".to_string(),
            tenant_id: Some("tenant-1".to_string()),
            vip_address: None,
            admin_state_up: true,
            provider: None,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["tenant_id"], "tenant-1");
        assert!(json.get("vip_address").is_none());
    }

    #[tokio::test]
    async fn test_update_gives_up_on_fatal_error() {
        let clock = Arc::new(ManualClock::new());
        let res = LoadBalancerV2::new(clock);
        let api = FakeLb::default();
        let mut data = created(&api, &res).await;

        struct Rejecting(FakeLb);

        #[async_trait]
        impl LoadBalancerApi for Rejecting {
            async fn create_load_balancer(
                &self,
                r: &CreateLoadBalancerRequest,
            ) -> Result<LoadBalancer> {
                self.0.create_load_balancer(r).await
            }
            async fn get_load_balancer(&self, id: &str) -> Result<LoadBalancer> {
                self.0.get_load_balancer(id).await
            }
            async fn update_load_balancer(
                &self,
                _id: &str,
                _r: &UpdateLoadBalancerRequest,
            ) -> Result<()> {
                Err(CloudError::api(400, "name too long"))
            }
            async fn delete_load_balancer(&self, id: &str) -> Result<()> {
                self.0.delete_load_balancer(id).await
            }
            async fn port_security_groups(&self, p: &str) -> Result<Vec<String>> {
                self.0.port_security_groups(p).await
            }
            async fn set_port_security_groups(&self, p: &str, g: &[String]) -> Result<()> {
                self.0.set_port_security_groups(p, g).await
            }
        }

        let mut desired = config();
        desired.name = "x".repeat(300);
        data.set_desired(desired);
        let err = res.update(&Rejecting(api), &mut data).await.unwrap_err();

        assert!(matches!(err.root(), CloudError::Api { status: 400, .. }));
    }

    #[tokio::test]
    async fn test_delete_retries_and_waits() {
        let clock = Arc::new(ManualClock::new());
        let res = LoadBalancerV2::new(clock);
        let api = FakeLb::default();
        let mut data = created(&api, &res).await;
        *api.conflicts.lock().unwrap() = 1;

        res.delete(&api, &mut data).await.unwrap();

        assert!(data.id().is_none());
        assert_eq!(*api.delete_attempts.lock().unwrap(), 2);

        let mut again = ResourceData::existing("lb-1", config());
        res.delete(&api, &mut again).await.unwrap();
        assert!(again.id().is_none());
    }

    #[test]
    fn test_error_status_fails_wait() {
        let transition = LbStatus::becoming_active();
        assert_eq!(
            transition.classify(&LbStatus::from("ERROR")),
            otc_cloud::StatusClass::Failure
        );
        assert!(LbStatus::deleting().expects_deletion());
    }
}
