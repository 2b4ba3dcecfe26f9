//! Resource lifecycle trait definition

use crate::data::ResourceData;
use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// CRUD lifecycle of one resource type
///
/// Every operation receives the API client it talks to; implementations
/// hold only their clock and timeouts, never a shared client.
#[async_trait]
pub trait Resource: Send + Sync {
    /// Typed configuration of this resource kind
    type Config: Clone + Send + Sync;

    /// API surface used by this resource
    type Api: ?Sized + Send + Sync;

    /// Resource type name (e.g. "sfs_turbo_share")
    fn type_name(&self) -> &'static str;

    /// Whether any updatable field group differs from the last read
    fn has_changes(&self, data: &ResourceData<Self::Config>) -> bool;

    /// Whether a field that cannot be changed in place differs from the
    /// last read. Such a resource is deleted and created again.
    fn requires_replacement(&self, _data: &ResourceData<Self::Config>) -> bool {
        false
    }

    /// Create the resource, wait until it is usable and read it back
    async fn create(&self, api: &Self::Api, data: &mut ResourceData<Self::Config>) -> Result<()>;

    /// Refresh the observed state; clears the id if the resource is gone
    async fn read(&self, api: &Self::Api, data: &mut ResourceData<Self::Config>) -> Result<()>;

    /// Apply changed field groups one after another
    async fn update(&self, api: &Self::Api, data: &mut ResourceData<Self::Config>) -> Result<()>;

    /// Delete the resource and wait until it is gone
    async fn delete(&self, api: &Self::Api, data: &mut ResourceData<Self::Config>) -> Result<()>;
}

/// Timeout budgets per lifecycle phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timeouts {
    #[serde(with = "secs")]
    pub create: Duration,
    #[serde(with = "secs")]
    pub update: Duration,
    #[serde(with = "secs")]
    pub delete: Duration,
}

impl Timeouts {
    pub const fn new(create: Duration, update: Duration, delete: Duration) -> Self {
        Self {
            create,
            update,
            delete,
        }
    }

    pub const fn uniform(timeout: Duration) -> Self {
        Self::new(timeout, timeout, timeout)
    }
}

impl Default for Timeouts {
    fn default() -> Self {
        Self::uniform(Duration::from_secs(10 * 60))
    }
}

mod secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_secs)
    }
}
