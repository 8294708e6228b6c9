//! Backend abstractions the scheduler depends on: the resource document
//! store, the distributed lock and the draft merge adapter.
//!
//! In-memory implementations live in `infra`.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Map, Value};

use super::{Resource, ResourceType, SchedulerError, StructuredFilter};

/// Field updates keyed by dotted path. A `null` value removes the field.
pub type Patch = Map<String, Value>;

/// Abstraction for resource document stores.
#[async_trait]
pub trait ResourceStore: Send + Sync {
    /// Load one resource. `Ok(None)` when it does not exist.
    async fn fetch(&self, resource_type: ResourceType, id: &str) -> Result<Option<Resource>, SchedulerError>;

    /// Ids of at most `limit` resources whose document matches `filter`.
    async fn find_candidates(
        &self,
        resource_type: ResourceType,
        filter: &StructuredFilter,
        limit: usize,
    ) -> Result<Vec<String>, SchedulerError>;

    /// Apply `patch` and return the updated resource, `Ok(None)` when it
    /// does not exist.
    async fn apply_patch(
        &self,
        resource_type: ResourceType,
        id: &str,
        patch: &Patch,
    ) -> Result<Option<Resource>, SchedulerError>;
}

/// Advisory lock keyed by `"<type>:<id>"`.
#[async_trait]
pub trait DistributedLock: Send + Sync {
    /// Single non-blocking attempt. `Ok(false)` when another owner holds it.
    async fn acquire(&self, key: &str, owner: &str) -> Result<bool, SchedulerError>;

    /// Push the expiry of `key` one TTL ahead. `Ok(false)` when `owner` no
    /// longer holds it.
    async fn prolong(&self, key: &str, owner: &str) -> Result<bool, SchedulerError>;

    /// Release `key` if `owner` holds it. Releasing a free key, or one held
    /// by someone else, is not an error and leaves it as is.
    async fn release(&self, key: &str, owner: &str) -> Result<(), SchedulerError>;

    /// True when some owner currently holds `key`.
    async fn is_locked(&self, key: &str) -> Result<bool, SchedulerError>;

    /// Lifetime of an entry that is not prolonged.
    fn ttl(&self) -> Duration;
}

/// Overlays a resource's draft onto its main view.
#[async_trait]
pub trait DraftMergeAdapter: Send + Sync {
    /// The draft view of `resource`.
    async fn merge_draft(&self, resource: Resource) -> Result<Resource, SchedulerError>;
}
