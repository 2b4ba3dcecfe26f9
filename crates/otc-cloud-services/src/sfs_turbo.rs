//! SFS Turbo file share
//!
//! Creation and deletion are tracked through the share status code;
//! expansion and security group changes through the sub-status code.

use crate::client::ServiceClient;
use async_trait::async_trait;
use otc_cloud::{
    Clock, CloudError, Observation, Projection, Resource, ResourceData, ResourceStatus, Result,
    Timeouts, Transition, WaitConfig, wait_for_state,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

const MIN_SIZE_GB: u32 = 500;

/// Desired and observed configuration of a share
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SfsTurboConfig {
    pub name: String,
    /// Capacity in GB
    pub size: u32,
    pub share_proto: String,
    pub share_type: String,
    pub availability_zone: String,
    pub vpc_id: String,
    pub subnet_id: String,
    pub security_group_id: String,
    pub crypt_key_id: Option<String>,

    // Computed
    pub version: Option<String>,
    pub export_location: Option<String>,
    pub available_capacity: Option<String>,
}

impl SfsTurboConfig {
    pub fn new(
        name: impl Into<String>,
        size: u32,
        availability_zone: impl Into<String>,
        vpc_id: impl Into<String>,
        subnet_id: impl Into<String>,
        security_group_id: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            size,
            share_proto: "NFS".to_string(),
            share_type: "STANDARD".to_string(),
            availability_zone: availability_zone.into(),
            vpc_id: vpc_id.into(),
            subnet_id: subnet_id.into(),
            security_group_id: security_group_id.into(),
            crypt_key_id: None,
            version: None,
            export_location: None,
            available_capacity: None,
        }
    }
}

/// Share status code
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShareStatus {
    /// 100
    Creating,
    /// 200
    Available,
    /// 303
    CreateFailed,
    Deleted,
    Other(String),
}

impl From<&str> for ShareStatus {
    fn from(code: &str) -> Self {
        match code {
            "100" => ShareStatus::Creating,
            "200" => ShareStatus::Available,
            "303" => ShareStatus::CreateFailed,
            other => ShareStatus::Other(other.to_string()),
        }
    }
}

impl fmt::Display for ShareStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShareStatus::Creating => write!(f, "100"),
            ShareStatus::Available => write!(f, "200"),
            ShareStatus::CreateFailed => write!(f, "303"),
            ShareStatus::Deleted => write!(f, "deleted"),
            ShareStatus::Other(code) => write!(f, "{}", code),
        }
    }
}

impl ResourceStatus for ShareStatus {
    fn deleted() -> Self {
        ShareStatus::Deleted
    }
}

impl ShareStatus {
    pub fn creating() -> Transition<Self> {
        Transition::new([ShareStatus::Creating], [ShareStatus::Available])
    }

    pub fn deleting() -> Transition<Self> {
        Transition::to_deleted([ShareStatus::Creating, ShareStatus::Available])
    }
}

/// Share sub-status code, set by asynchronous share actions
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShareSubStatus {
    /// 121
    Expanding,
    /// 221
    Expanded,
    /// 232
    SecurityGroupChanged,
    Deleted,
    Other(String),
}

impl From<&str> for ShareSubStatus {
    fn from(code: &str) -> Self {
        match code {
            "121" => ShareSubStatus::Expanding,
            "221" => ShareSubStatus::Expanded,
            "232" => ShareSubStatus::SecurityGroupChanged,
            other => ShareSubStatus::Other(other.to_string()),
        }
    }
}

impl fmt::Display for ShareSubStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShareSubStatus::Expanding => write!(f, "121"),
            ShareSubStatus::Expanded => write!(f, "221"),
            ShareSubStatus::SecurityGroupChanged => write!(f, "232"),
            ShareSubStatus::Deleted => write!(f, "deleted"),
            ShareSubStatus::Other(code) => write!(f, "{}", code),
        }
    }
}

impl ResourceStatus for ShareSubStatus {
    fn deleted() -> Self {
        ShareSubStatus::Deleted
    }
}

impl ShareSubStatus {
    /// Expansion and security group changes share the same completion codes
    pub fn modifying() -> Transition<Self> {
        Transition::new(
            [ShareSubStatus::Expanding],
            [ShareSubStatus::Expanded, ShareSubStatus::SecurityGroupChanged],
        )
    }
}

// ============ API Types ============

#[derive(Debug, Clone, Serialize)]
pub struct CreateShareRequest {
    pub name: String,
    pub size: u32,
    pub share_proto: String,
    pub share_type: String,
    pub vpc_id: String,
    pub subnet_id: String,
    pub security_group_id: String,
    pub availability_zone: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<ShareMetadata>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ShareMetadata {
    pub crypt_key_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreatedShare {
    pub id: String,
    #[serde(default)]
    pub name: String,
}

/// Share as returned by the API
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Share {
    pub id: String,
    pub name: String,
    pub status: String,
    #[serde(default)]
    pub sub_status: String,
    /// Capacity as a float string, e.g. "500.00"
    pub size: String,
    pub share_proto: String,
    pub share_type: String,
    pub vpc_id: String,
    pub subnet_id: String,
    pub security_group_id: String,
    pub availability_zone: String,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub export_location: Option<String>,
    #[serde(default)]
    pub avail_capacity: Option<String>,
    #[serde(default)]
    pub crypt_key_id: Option<String>,
}

/// SFS Turbo API surface
#[async_trait]
pub trait SfsTurboApi: Send + Sync {
    async fn create_share(&self, request: &CreateShareRequest) -> Result<CreatedShare>;

    async fn get_share(&self, id: &str) -> Result<Share>;

    async fn expand_share(&self, id: &str, new_size: u32) -> Result<()>;

    async fn change_security_group(&self, id: &str, security_group_id: &str) -> Result<()>;

    async fn delete_share(&self, id: &str) -> Result<()>;
}

#[async_trait]
impl SfsTurboApi for ServiceClient {
    async fn create_share(&self, request: &CreateShareRequest) -> Result<CreatedShare> {
        let url = self.url(&format!("v1/{}/sfs-turbo/shares", self.project_id()));
        self.rest()
            .post(&url, &serde_json::json!({ "share": request }))
            .await
    }

    async fn get_share(&self, id: &str) -> Result<Share> {
        let url = self.url(&format!("v1/{}/sfs-turbo/shares/{}", self.project_id(), id));
        self.rest().get(&url).await
    }

    async fn expand_share(&self, id: &str, new_size: u32) -> Result<()> {
        let url = self.url(&format!(
            "v1/{}/sfs-turbo/shares/{}/action",
            self.project_id(),
            id
        ));
        self.rest()
            .post_action(&url, &serde_json::json!({ "extend": { "new_size": new_size } }))
            .await
    }

    async fn change_security_group(&self, id: &str, security_group_id: &str) -> Result<()> {
        let url = self.url(&format!(
            "v1/{}/sfs-turbo/shares/{}/action",
            self.project_id(),
            id
        ));
        let body = serde_json::json!({
            "change_security_group": { "security_group_id": security_group_id }
        });
        self.rest().post_action(&url, &body).await
    }

    async fn delete_share(&self, id: &str) -> Result<()> {
        let url = self.url(&format!("v1/{}/sfs-turbo/shares/{}", self.project_id(), id));
        self.rest().delete(&url).await
    }
}

// ============ Resource ============

/// SFS Turbo share lifecycle
pub struct SfsTurboShare {
    clock: Arc<dyn Clock>,
    timeouts: Timeouts,
}

impl SfsTurboShare {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            timeouts: Timeouts::uniform(Duration::from_secs(10 * 60)),
        }
    }

    pub fn with_timeouts(mut self, timeouts: Timeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// Wait until an expand or security group change has been applied
    async fn wait_for_modification(&self, api: &dyn SfsTurboApi, id: &str) -> Result<()> {
        let config = WaitConfig::new(ShareSubStatus::modifying())
            .timeout(self.timeouts.update)
            .delay(Duration::from_secs(10))
            .min_interval(Duration::from_secs(5));
        wait_for_state(self.clock.as_ref(), &config, || observe_sub_status(api, id)).await?;
        Ok(())
    }
}

async fn observe_status(api: &dyn SfsTurboApi, id: &str) -> Result<Observation<Share, ShareStatus>> {
    let share = api.get_share(id).await?;
    let status = ShareStatus::from(share.status.as_str());
    Ok(Observation::new(share, status))
}

async fn observe_sub_status(
    api: &dyn SfsTurboApi,
    id: &str,
) -> Result<Observation<Share, ShareSubStatus>> {
    let share = api.get_share(id).await?;
    let status = ShareSubStatus::from(share.sub_status.as_str());
    Ok(Observation::new(share, status))
}

/// Size is reported as a float string; keep the integral part
fn parse_size(size: &str) -> std::result::Result<u32, String> {
    size.trim()
        .parse::<f64>()
        .map(|s| s as u32)
        .map_err(|e| format!("invalid size '{}': {}", size, e))
}

#[async_trait]
impl Resource for SfsTurboShare {
    type Config = SfsTurboConfig;
    type Api = dyn SfsTurboApi;

    fn type_name(&self) -> &'static str {
        "sfs_turbo_share"
    }

    fn has_changes(&self, data: &ResourceData<SfsTurboConfig>) -> bool {
        data.has_change(|c| &c.size) || data.has_change(|c| &c.security_group_id)
    }

    fn requires_replacement(&self, data: &ResourceData<SfsTurboConfig>) -> bool {
        data.has_change(|c| &c.name)
            || data.has_change(|c| &c.share_type)
            || data.has_change(|c| &c.availability_zone)
            || data.has_change(|c| &c.vpc_id)
            || data.has_change(|c| &c.subnet_id)
            || data.has_set_change(|c| &c.crypt_key_id)
    }

    async fn create(
        &self,
        api: &Self::Api,
        data: &mut ResourceData<SfsTurboConfig>,
    ) -> Result<()> {
        let desired = data.desired();
        if desired.size < MIN_SIZE_GB {
            return Err(CloudError::Precondition(format!(
                "SFS Turbo size must be at least {} GB, got {}",
                MIN_SIZE_GB, desired.size
            )));
        }

        let request = CreateShareRequest {
            name: desired.name.clone(),
            size: desired.size,
            share_proto: desired.share_proto.clone(),
            share_type: desired.share_type.clone(),
            vpc_id: desired.vpc_id.clone(),
            subnet_id: desired.subnet_id.clone(),
            security_group_id: desired.security_group_id.clone(),
            availability_zone: desired.availability_zone.clone(),
            metadata: desired.crypt_key_id.clone().map(|crypt_key_id| ShareMetadata { crypt_key_id }),
        };

        tracing::debug!("Create SFS Turbo with options: {:?}", request);
        let created = api
            .create_share(&request)
            .await
            .map_err(|e| e.context("error creating SFS Turbo"))?;

        let config = WaitConfig::new(ShareStatus::creating())
            .timeout(self.timeouts.create)
            .delay(Duration::from_secs(20))
            .min_interval(Duration::from_secs(3));
        wait_for_state(self.clock.as_ref(), &config, || observe_status(api, &created.id))
            .await
            .map_err(|e| {
                e.context(format!(
                    "error waiting for SFS Turbo ({}) to become ready",
                    created.id
                ))
            })?;

        tracing::info!("SFS Turbo {} created", created.id);
        data.set_id(created.id);
        self.read(api, data).await
    }

    async fn read(
        &self,
        api: &Self::Api,
        data: &mut ResourceData<SfsTurboConfig>,
    ) -> Result<()> {
        let id = data.require_id()?.to_string();
        let result = api.get_share(&id).await;
        let Some(share) = data.check_deleted(result, "SFS Turbo")? else {
            return Ok(());
        };

        let mut observed = data.observed_base();
        observed.name = share.name;
        observed.share_proto = share.share_proto;
        observed.share_type = share.share_type;
        observed.vpc_id = share.vpc_id;
        observed.subnet_id = share.subnet_id;
        observed.security_group_id = share.security_group_id;
        observed.availability_zone = share.availability_zone;
        observed.version = share.version;
        observed.export_location = share.export_location;
        observed.available_capacity = share.avail_capacity;
        observed.crypt_key_id = share.crypt_key_id.filter(|k| !k.is_empty());

        let mut projection = Projection::new();
        projection.set("size", &mut observed.size, parse_size(&share.size));

        data.commit(observed);
        projection.finish()
    }

    async fn update(
        &self,
        api: &Self::Api,
        data: &mut ResourceData<SfsTurboConfig>,
    ) -> Result<()> {
        let id = data.require_id()?.to_string();

        if data.has_change(|c| &c.size) {
            let (old_size, new_size) = data.get_change(|c| &c.size);
            let new_size = *new_size;
            if old_size.is_some_and(|old| *old > new_size) {
                return Err(CloudError::Precondition(
                    "shrinking SFS Turbo size is not supported".to_string(),
                ));
            }

            api.expand_share(&id, new_size)
                .await
                .map_err(|e| e.context("error expanding SFS Turbo size"))?;
            self.wait_for_modification(api, &id)
                .await
                .map_err(|e| e.context("error updating SFS Turbo"))?;
            tracing::info!("SFS Turbo {} expanded to {} GB", id, new_size);
        }

        if data.has_change(|c| &c.security_group_id) {
            let security_group_id = data.desired().security_group_id.clone();
            api.change_security_group(&id, &security_group_id)
                .await
                .map_err(|e| e.context("error changing SFS Turbo security group"))?;
            self.wait_for_modification(api, &id)
                .await
                .map_err(|e| e.context("error updating SFS Turbo"))?;
        }

        self.read(api, data).await
    }

    async fn delete(
        &self,
        api: &Self::Api,
        data: &mut ResourceData<SfsTurboConfig>,
    ) -> Result<()> {
        let id = data.require_id()?.to_string();
        let result = api.delete_share(&id).await;
        if data.check_deleted(result, "SFS Turbo")?.is_none() {
            return Ok(());
        }

        let config = WaitConfig::new(ShareStatus::deleting())
            .timeout(self.timeouts.delete)
            .delay(Duration::from_secs(5))
            .min_interval(Duration::from_secs(3));
        wait_for_state(self.clock.as_ref(), &config, || observe_status(api, &id))
            .await
            .map_err(|e| e.context("error deleting SFS Turbo"))?;

        tracing::info!("SFS Turbo {} deleted", id);
        data.clear_id();
        Ok(())
    }
}
