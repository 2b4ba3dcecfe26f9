//! Configuration representation of one managed resource
//!
//! Holds the desired configuration, the state observed by the last read,
//! and the resource identity. Change detection compares individual fields
//! of the desired configuration against the last observed state.

use crate::error::{CloudError, FieldErrors, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Desired and observed configuration of a single resource
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceData<T> {
    /// Provider-side identifier, absent until created
    id: Option<String>,

    /// Configuration requested by the user
    desired: T,

    /// Configuration as of the last read
    state: Option<T>,

    /// Resource is to be destroyed
    #[serde(default)]
    destroy: bool,
}

impl<T: Clone> ResourceData<T> {
    pub fn new(desired: T) -> Self {
        Self {
            id: None,
            desired,
            state: None,
            destroy: false,
        }
    }

    /// Record for an existing resource, as used by import
    pub fn existing(id: impl Into<String>, desired: T) -> Self {
        Self {
            id: Some(id.into()),
            ..Self::new(desired)
        }
    }

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub fn require_id(&self) -> Result<&str> {
        self.id()
            .ok_or_else(|| CloudError::InvalidConfig("resource has no id".to_string()))
    }

    pub fn set_id(&mut self, id: impl Into<String>) {
        self.id = Some(id.into());
    }

    /// Forget the resource; the next plan will create it again
    pub fn clear_id(&mut self) {
        self.id = None;
        self.state = None;
    }

    pub fn desired(&self) -> &T {
        &self.desired
    }

    pub fn set_desired(&mut self, desired: T) {
        self.desired = desired;
    }

    pub fn state(&self) -> Option<&T> {
        self.state.as_ref()
    }

    pub fn mark_destroy(&mut self) {
        self.destroy = true;
    }

    pub fn is_marked_destroy(&self) -> bool {
        self.destroy
    }

    /// Whether one field differs between the desired and the observed state.
    /// Every field counts as changed before the first read.
    pub fn has_change<F: PartialEq + ?Sized>(&self, field: impl Fn(&T) -> &F) -> bool {
        match &self.state {
            Some(state) => field(state) != field(&self.desired),
            None => true,
        }
    }

    /// `has_change` for optional fields the cloud fills in when left unset:
    /// an absent desired value never counts as a change.
    pub fn has_set_change<F: PartialEq>(&self, field: impl Fn(&T) -> &Option<F>) -> bool {
        field(&self.desired).is_some() && self.has_change(&field)
    }

    /// Observed and desired value of one field
    pub fn get_change<'a, F: ?Sized>(&'a self, field: impl Fn(&'a T) -> &'a F) -> (Option<&'a F>, &'a F) {
        (self.state.as_ref().map(&field), field(&self.desired))
    }

    /// Starting point for a read: the previous observation, or the desired
    /// configuration when nothing has been read yet
    pub fn observed_base(&self) -> T {
        self.state.clone().unwrap_or_else(|| self.desired.clone())
    }

    /// Store the result of a read
    pub fn commit(&mut self, observed: T) {
        self.state = Some(observed);
    }

    /// Turn a not-found result into a cleared identity.
    ///
    /// Returns `Ok(None)` when the object is gone, so reads and deletes
    /// converge instead of failing on resources removed outside the provider.
    pub fn check_deleted<V>(&mut self, result: Result<V>, what: &str) -> Result<Option<V>> {
        match result {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.is_not_found() => {
                tracing::warn!(
                    "{} {} not found, removing from state",
                    what,
                    self.id().unwrap_or("<unknown>")
                );
                self.clear_id();
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }
}

/// Collects per-field failures while projecting an API object
#[derive(Debug, Default)]
pub struct Projection {
    errors: FieldErrors,
}

impl Projection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `value` into `slot`, or record the failure and keep the slot
    pub fn set<V, E: fmt::Display>(
        &mut self,
        field: &'static str,
        slot: &mut V,
        value: std::result::Result<V, E>,
    ) {
        match value {
            Ok(v) => *slot = v,
            Err(e) => self.errors.push(field, e.to_string()),
        }
    }

    pub fn fail(&mut self, field: &'static str, message: impl Into<String>) {
        self.errors.push(field, message);
    }

    pub fn finish(self) -> Result<()> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(CloudError::Projection(self.errors))
        }
    }
}
