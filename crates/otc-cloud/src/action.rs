//! Planning and applying lifecycle actions

use crate::data::ResourceData;
use crate::error::Result;
use crate::resource::Resource;
use serde::{Deserialize, Serialize};

/// Type of action to perform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    /// Create a new resource
    Create,
    /// Update an existing resource
    Update,
    /// Delete a resource
    Delete,
    /// Delete and create again, for changes that cannot be made in place
    Replace,
    /// No changes needed
    NoOp,
}

impl std::fmt::Display for ActionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ActionType::Create => write!(f, "create"),
            ActionType::Update => write!(f, "update"),
            ActionType::Delete => write!(f, "delete"),
            ActionType::Replace => write!(f, "replace"),
            ActionType::NoOp => write!(f, "no-op"),
        }
    }
}

/// Result of applying actions
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApplyResult {
    /// Successfully applied actions
    pub succeeded: Vec<ActionResult>,

    /// Failed actions
    pub failed: Vec<ActionResult>,

    /// Total execution time in milliseconds
    pub duration_ms: u64,
}

impl ApplyResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn add_success(&mut self, action_id: String, action_type: ActionType) {
        self.succeeded.push(ActionResult {
            action_id,
            action_type,
            error: None,
        });
    }

    pub fn add_failure(&mut self, action_id: String, action_type: ActionType, error: String) {
        self.failed.push(ActionResult {
            action_id,
            action_type,
            error: Some(error),
        });
    }
}

/// Result of a single action
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionResult {
    /// e.g. "create-sfs_turbo_share-0"
    pub action_id: String,

    pub action_type: ActionType,

    /// Error message if failed
    pub error: Option<String>,
}

/// Drives one resource type through plan and apply against one client
pub struct Lifecycle<'a, R: Resource> {
    resource: &'a R,
    api: &'a R::Api,
}

impl<'a, R: Resource> Lifecycle<'a, R> {
    pub fn new(resource: &'a R, api: &'a R::Api) -> Self {
        Self { resource, api }
    }

    /// Decide what apply would do for this record
    pub fn plan(&self, data: &ResourceData<R::Config>) -> ActionType {
        match (data.id(), data.is_marked_destroy()) {
            (None, true) => ActionType::NoOp,
            (Some(_), true) => ActionType::Delete,
            (None, false) => ActionType::Create,
            (Some(_), false) if data.state().is_some() && self.resource.requires_replacement(data) => {
                ActionType::Replace
            }
            (Some(_), false) if self.resource.has_changes(data) => ActionType::Update,
            (Some(_), false) => ActionType::NoOp,
        }
    }

    /// Read the resource if it has an identity
    pub async fn refresh(&self, data: &mut ResourceData<R::Config>) -> Result<()> {
        if data.id().is_none() {
            return Ok(());
        }
        self.resource.read(self.api, data).await?;
        if data.id().is_none() {
            tracing::warn!(
                "{} no longer exists, removing it from state",
                self.resource.type_name()
            );
        }
        Ok(())
    }

    /// Adopt an existing resource by id and read it
    pub async fn import(&self, id: &str, data: &mut ResourceData<R::Config>) -> Result<()> {
        data.set_id(id);
        self.resource.read(self.api, data).await
    }

    /// Refresh, then perform the planned action
    pub async fn apply(&self, data: &mut ResourceData<R::Config>) -> Result<ActionType> {
        self.refresh(data).await?;

        let action = self.plan(data);
        tracing::info!("{}: {}", self.resource.type_name(), action);

        match action {
            ActionType::Create => self.resource.create(self.api, data).await?,
            ActionType::Update => self.resource.update(self.api, data).await?,
            ActionType::Delete => {
                self.resource.delete(self.api, data).await?;
                data.clear_id();
            }
            ActionType::Replace => {
                self.resource.delete(self.api, data).await?;
                data.clear_id();
                self.resource.create(self.api, data).await?;
            }
            ActionType::NoOp => {}
        }
        Ok(action)
    }

    /// Apply every record in order, collecting failures instead of stopping
    pub async fn apply_all(&self, records: &mut [ResourceData<R::Config>]) -> ApplyResult {
        let mut result = ApplyResult::new();
        let start = std::time::Instant::now();

        for (index, data) in records.iter_mut().enumerate() {
            let planned = self.plan(data);
            let action_id = format!("{}-{}-{}", planned, self.resource.type_name(), index);
            match self.apply(data).await {
                Ok(action) => result.add_success(action_id, action),
                Err(e) => {
                    tracing::warn!("{} failed: {}", action_id, e);
                    result.add_failure(action_id, planned, e.to_string());
                }
            }
        }

        result.duration_ms = start.elapsed().as_millis() as u64;
        result
    }
}
