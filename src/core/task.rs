//! Task descriptors: the declarative binding of a pipeline condition to a
//! named processing step and the pool that runs it.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Resource, ResourceType, StructuredFilter};

/// Builds the store-level filter selecting resources that need a task.
/// Evaluated on every query so time-based clauses use the current instant.
pub type StatePredicate = Arc<dyn Fn(DateTime<Utc>) -> StructuredFilter + Send + Sync>;

/// Stricter in-memory check applied to one loaded resource.
pub type BusinessPredicate = Arc<dyn Fn(&Resource, DateTime<Utc>) -> bool + Send + Sync>;

/// Immutable description of one processing step.
#[derive(Clone)]
pub struct TaskDescriptor {
    name: String,
    pool: String,
    events_prefix: Option<String>,
    state_predicate: StatePredicate,
    business_predicate: BusinessPredicate,
}

impl TaskDescriptor {
    /// Describe a task running on `pool`.
    pub fn new<S, B>(name: impl Into<String>, pool: impl Into<String>, state: S, business: B) -> Self
    where
        S: Fn(DateTime<Utc>) -> StructuredFilter + Send + Sync + 'static,
        B: Fn(&Resource, DateTime<Utc>) -> bool + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            pool: pool.into(),
            events_prefix: None,
            state_predicate: Arc::new(state),
            business_predicate: Arc::new(business),
        }
    }

    /// Emit `<prefix>-start` / `<prefix>-end` audit events around the task.
    #[must_use]
    pub fn with_events_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.events_prefix = Some(prefix.into());
        self
    }

    /// Task name, passed to the pool's handler.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Pool the task is statically assigned to.
    #[must_use]
    pub fn pool(&self) -> &str {
        &self.pool
    }

    /// Audit events prefix, if any.
    #[must_use]
    pub fn events_prefix(&self) -> Option<&str> {
        self.events_prefix.as_deref()
    }

    /// Store-level filter at instant `now`.
    #[must_use]
    pub fn state_predicate(&self, now: DateTime<Utc>) -> StructuredFilter {
        (self.state_predicate)(now)
    }

    /// In-memory check of one resource at instant `now`.
    #[must_use]
    pub fn matches(&self, resource: &Resource, now: DateTime<Utc>) -> bool {
        (self.business_predicate)(resource, now)
    }
}

impl fmt::Debug for TaskDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskDescriptor")
            .field("name", &self.name)
            .field("pool", &self.pool)
            .field("events_prefix", &self.events_prefix)
            .finish_non_exhaustive()
    }
}

/// What a handler learns about the invocation besides the resource itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskContext {
    /// Task name from the descriptor.
    pub name: String,
    /// Type of the processed resource.
    pub resource_type: ResourceType,
    /// Pool running the task.
    pub pool: String,
    /// Lock owner of the scheduler that dispatched the task.
    pub owner: String,
    /// The resource is the draft overlay.
    pub draft: bool,
}

impl TaskContext {
    /// Context for running `name` of `resource` on `pool`.
    pub fn new(name: impl Into<String>, resource: &Resource, pool: impl Into<String>, owner: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            resource_type: resource.resource_type(),
            pool: pool.into(),
            owner: owner.into(),
            draft: resource.is_draft_view(),
        }
    }
}
