//! DMS consumer group of a queue
//!
//! Groups cannot be modified; a new name or queue replaces the group.

use crate::client::ServiceClient;
use async_trait::async_trait;
use otc_cloud::{CloudError, Resource, ResourceData, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DmsGroupConfig {
    pub queue_id: String,
    pub name: String,

    // Computed
    pub consumed_messages: u64,
    pub available_messages: u64,
    pub produced_messages: u64,
    pub produced_deadletters: u64,
    pub available_deadletters: u64,
}

impl DmsGroupConfig {
    pub fn new(queue_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            queue_id: queue_id.into(),
            name: name.into(),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Group {
    pub id: String,
    pub name: String,
    pub consumed_messages: u64,
    pub available_messages: u64,
    pub produced_messages: u64,
    pub produced_deadletters: u64,
    pub available_deadletters: u64,
}

#[async_trait]
pub trait DmsApi: Send + Sync {
    /// Create groups in a queue, returning them in request order
    async fn create_groups(&self, queue_id: &str, names: &[String]) -> Result<Vec<Group>>;

    async fn list_groups(&self, queue_id: &str) -> Result<Vec<Group>>;

    async fn delete_group(&self, queue_id: &str, group_id: &str) -> Result<()>;
}

#[derive(Deserialize)]
struct GroupList {
    #[serde(default)]
    groups: Vec<Group>,
}

#[async_trait]
impl DmsApi for ServiceClient {
    async fn create_groups(&self, queue_id: &str, names: &[String]) -> Result<Vec<Group>> {
        let url = self.url(&format!(
            "v1.0/{}/queues/{}/groups",
            self.project_id(),
            queue_id
        ));
        let groups: Vec<_> = names
            .iter()
            .map(|name| serde_json::json!({ "name": name }))
            .collect();
        let list: GroupList = self
            .rest()
            .post(&url, &serde_json::json!({ "groups": groups }))
            .await?;
        Ok(list.groups)
    }

    async fn list_groups(&self, queue_id: &str) -> Result<Vec<Group>> {
        let url = self.url(&format!(
            "v1.0/{}/queues/{}/groups",
            self.project_id(),
            queue_id
        ));
        let list: GroupList = self.rest().get(&url).await?;
        Ok(list.groups)
    }

    async fn delete_group(&self, queue_id: &str, group_id: &str) -> Result<()> {
        let url = self.url(&format!(
            "v1.0/{}/queues/{}/groups/{}",
            self.project_id(),
            queue_id,
            group_id
        ));
        self.rest().delete(&url).await
    }
}

#[derive(Debug, Default)]
pub struct DmsGroup;

impl DmsGroup {
    pub fn new() -> Self {
        Self
    }

    /// Queue the group lives in: the one observed by the last read, or the
    /// desired one before the group has been read
    fn queue_of(data: &ResourceData<DmsGroupConfig>) -> String {
        data.state()
            .unwrap_or_else(|| data.desired())
            .queue_id
            .clone()
    }
}

#[async_trait]
impl Resource for DmsGroup {
    type Config = DmsGroupConfig;
    type Api = dyn DmsApi;

    fn type_name(&self) -> &'static str {
        "dms_group"
    }

    fn has_changes(&self, _data: &ResourceData<DmsGroupConfig>) -> bool {
        false
    }

    fn requires_replacement(&self, data: &ResourceData<DmsGroupConfig>) -> bool {
        data.has_change(|c| &c.queue_id) || data.has_change(|c| &c.name)
    }

    async fn create(&self, api: &Self::Api, data: &mut ResourceData<DmsGroupConfig>) -> Result<()> {
        let desired = data.desired();
        let queue_id = desired.queue_id.clone();
        let names = [desired.name.clone()];

        tracing::debug!("Create DMS group {} in queue {}", names[0], queue_id);
        let created = api
            .create_groups(&queue_id, &names)
            .await
            .map_err(|e| e.context("error creating DMS group"))?;
        let group = created.into_iter().next().ok_or_else(|| {
            CloudError::InvalidConfig("DMS group creation returned no group".to_string())
        })?;

        tracing::info!("DMS group name: {}", group.name);
        data.set_id(group.id);
        self.read(api, data).await
    }

    async fn read(&self, api: &Self::Api, data: &mut ResourceData<DmsGroupConfig>) -> Result<()> {
        let id = data.require_id()?.to_string();
        let queue_id = Self::queue_of(data);

        let result = api.list_groups(&queue_id).await;
        let Some(groups) = data.check_deleted(result, "DMS queue")? else {
            return Ok(());
        };
        let Some(group) = groups.into_iter().find(|g| g.id == id) else {
            tracing::warn!("DMS group {} not found in queue {}, removing from state", id, queue_id);
            data.clear_id();
            return Ok(());
        };
        tracing::debug!("DMS group {}: {:?}", id, group);

        let mut observed = data.observed_base();
        observed.queue_id = queue_id;
        observed.name = group.name;
        observed.consumed_messages = group.consumed_messages;
        observed.available_messages = group.available_messages;
        observed.produced_messages = group.produced_messages;
        observed.produced_deadletters = group.produced_deadletters;
        observed.available_deadletters = group.available_deadletters;

        data.commit(observed);
        Ok(())
    }

    async fn update(&self, api: &Self::Api, data: &mut ResourceData<DmsGroupConfig>) -> Result<()> {
        self.read(api, data).await
    }

    async fn delete(&self, api: &Self::Api, data: &mut ResourceData<DmsGroupConfig>) -> Result<()> {
        let id = data.require_id()?.to_string();
        let queue_id = Self::queue_of(data);

        let result = api.delete_group(&queue_id, &id).await;
        if data.check_deleted(result, "DMS group")?.is_some() {
            tracing::debug!("DMS group {} deactivated", id);
            data.clear_id();
        }
        Ok(())
    }
}
