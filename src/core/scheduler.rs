//! Resource scheduler: finds resources with pending work and drives one
//! resource through its pipeline under an exclusive lock.
//!
//! # Algorithm
//!
//! `process_resource` takes the `"<type>:<id>"` lock in a single non-blocking
//! attempt, then loops:
//!
//! 1. reload the resource (stop when it is gone)
//! 2. overlay its draft when one is active
//! 3. pick the first free descriptor whose business predicate holds (stop
//!    when none does)
//! 4. await the task on its pool (stop and report when it fails)
//!
//! A task picked again right after it ran made no progress the predicates
//! can see, so the loop stops there too.
//!
//! The lock is prolonged every third of its TTL while the loop runs and
//! released whatever happened, before any error is returned.
//!
//! The lock is advisory: writers that do not take it (an API handler
//! patching a schema, say) can race with a running task.

use std::future::Future;
use std::pin::pin;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use rand::seq::SliceRandom;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::util::clock::now;

use super::{
    build_audit_event, AuditSink, DistributedLock, DraftMergeAdapter, ErrorRetryPolicy, Resource, ResourceKey,
    ResourceStore, ResourceType, SchedulerError, StructuredFilter, TaskContext, TaskDescriptor, WorkerPoolManager,
};

/// Default number of candidates sampled by `query_next_resource`.
pub const DEFAULT_SAMPLE_SIZE: usize = 100;

/// Drives resources through their pipelines.
pub struct ResourceScheduler {
    store: Arc<dyn ResourceStore>,
    locks: Arc<dyn DistributedLock>,
    manager: Arc<WorkerPoolManager>,
    drafts: Arc<dyn DraftMergeAdapter>,
    audit: Option<Arc<Mutex<dyn AuditSink>>>,
    retry: ErrorRetryPolicy,
    owner: String,
    sample_size: usize,
}

impl ResourceScheduler {
    /// Scheduler with a random lock owner. Active drafts are overlaid with
    /// `drafts` before matching.
    pub fn new(
        store: Arc<dyn ResourceStore>,
        locks: Arc<dyn DistributedLock>,
        drafts: Arc<dyn DraftMergeAdapter>,
        manager: Arc<WorkerPoolManager>,
    ) -> Self {
        Self {
            store,
            locks,
            manager,
            drafts,
            audit: None,
            retry: ErrorRetryPolicy::default(),
            owner: format!("worker-{}", uuid::Uuid::new_v4()),
            sample_size: DEFAULT_SAMPLE_SIZE,
        }
    }

    /// Record task start/end events in `audit`.
    #[must_use]
    pub fn with_audit(mut self, audit: Arc<Mutex<dyn AuditSink>>) -> Self {
        self.audit = Some(audit);
        self
    }

    /// Retry policy handed to task handlers through [`Self::retry_policy`].
    #[must_use]
    pub const fn with_retry_policy(mut self, retry: ErrorRetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Lock owner name.
    #[must_use]
    pub fn with_owner(mut self, owner: impl Into<String>) -> Self {
        self.owner = owner.into();
        self
    }

    /// Candidates sampled per query (at least 1).
    #[must_use]
    pub fn with_sample_size(mut self, sample_size: usize) -> Self {
        self.sample_size = sample_size.max(1);
        self
    }

    /// Lock owner used by this scheduler.
    #[must_use]
    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// Candidates sampled per query.
    #[must_use]
    pub const fn sample_size(&self) -> usize {
        self.sample_size
    }

    /// Policy task handlers use to record failures and schedule retries.
    #[must_use]
    pub const fn retry_policy(&self) -> ErrorRetryPolicy {
        self.retry
    }

    /// The pool manager.
    #[must_use]
    pub fn manager(&self) -> &Arc<WorkerPoolManager> {
        &self.manager
    }

    /// Store filter selecting resources of `resource_type` that some free
    /// task would pick up. `None` when every pool of the type is draining.
    #[must_use]
    pub fn pending_filter(&self, resource_type: ResourceType) -> Option<StructuredFilter> {
        let at = now();
        let clauses: Vec<_> = self
            .manager
            .free_tasks(resource_type)
            .into_iter()
            .map(|d| d.state_predicate(at))
            .collect();
        (!clauses.is_empty()).then(|| StructuredFilter::or(clauses))
    }

    /// Id of one unlocked resource of `resource_type` with pending work.
    ///
    /// Candidates are sampled from the store and shuffled, so a resource
    /// that keeps failing does not starve the others.
    ///
    /// # Errors
    ///
    /// Store or lock backend failures.
    pub async fn query_next_resource(&self, resource_type: ResourceType) -> Result<Option<String>, SchedulerError> {
        let Some(filter) = self.pending_filter(resource_type) else {
            return Ok(None);
        };
        let mut ids = self
            .store
            .find_candidates(resource_type, &filter, self.sample_size)
            .await?;
        ids.shuffle(&mut rand::rng());

        for id in ids {
            let key = ResourceKey::new(resource_type, id.as_str()).to_string();
            if !self.locks.is_locked(&key).await? {
                debug!(resource = %key, "candidate found");
                return Ok(Some(id));
            }
        }
        Ok(None)
    }

    /// Run every task that applies to resource `id`, one after the other.
    ///
    /// Returns `Ok(false)` when the lock is held elsewhere, the resource is
    /// missing or no task matched; `Ok(true)` once a task was attempted.
    ///
    /// # Errors
    ///
    /// The first task failure, or a store failure. The lock is released
    /// before returning. The resource itself is left as the task left it.
    pub async fn process_resource(&self, resource_type: ResourceType, id: &str) -> Result<bool, SchedulerError> {
        let key = ResourceKey::new(resource_type, id).to_string();
        if !self.locks.acquire(&key, &self.owner).await? {
            debug!(resource = %key, "resource locked by another owner");
            return Ok(false);
        }

        let outcome = self.hold_lock_while(&key, self.process_locked(resource_type, id, &key)).await;

        if let Err(e) = self.locks.release(&key, &self.owner).await {
            error!(resource = %key, error = %e, "failed to release resource lock");
        }
        outcome
    }

    /// Drive `work` to completion, prolonging the lock on `key` meanwhile.
    async fn hold_lock_while<T>(&self, key: &str, work: impl Future<Output = T>) -> T {
        let period = (self.locks.ttl() / 3).max(Duration::from_millis(1));
        let mut heartbeat = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut work = pin!(work);

        loop {
            tokio::select! {
                outcome = &mut work => return outcome,
                _ = heartbeat.tick() => match self.locks.prolong(key, &self.owner).await {
                    Ok(true) => {}
                    Ok(false) => warn!(resource = %key, "resource lock lost while processing"),
                    Err(e) => error!(resource = %key, error = %e, "failed to prolong resource lock"),
                },
            }
        }
    }

    async fn process_locked(&self, resource_type: ResourceType, id: &str, key: &str) -> Result<bool, SchedulerError> {
        let mut attempted = false;
        let mut last_run: Option<&str> = None;

        loop {
            let Some(resource) = self.store.fetch(resource_type, id).await? else {
                debug!(resource = %key, "resource not found");
                break;
            };
            let resource = self.merge_draft(resource, key).await;

            let at = now();
            let Some(descriptor) = self
                .manager
                .free_tasks(resource_type)
                .into_iter()
                .find(|d| d.matches(&resource, at))
            else {
                debug!(resource = %key, "no task applies");
                break;
            };

            let name = descriptor.name();
            if last_run == Some(name) {
                warn!(resource = %key, task = name, "task still applies after running, stopping");
                break;
            }
            last_run = Some(name);

            attempted = true;
            info!(resource = %key, task = name, pool = descriptor.pool(), draft = resource.is_draft_view(), "running task");
            self.run_task(descriptor, resource, key).await?;
        }

        Ok(attempted)
    }

    async fn merge_draft(&self, resource: Resource, key: &str) -> Resource {
        if !resource.has_active_draft() {
            return resource;
        }
        match self.drafts.merge_draft(resource.clone()).await {
            Ok(merged) => merged,
            Err(e) => {
                warn!(resource = %key, error = %e, "draft merge failed, matching on the main view");
                resource
            }
        }
    }

    async fn run_task(&self, descriptor: &TaskDescriptor, resource: Resource, key: &str) -> Result<(), SchedulerError> {
        let ctx = TaskContext::new(descriptor.name(), &resource, descriptor.pool(), &self.owner);
        self.record(descriptor, key, "start", None);

        let result = self.manager.run(descriptor.pool(), resource, ctx).await;

        match &result {
            Ok(()) => self.record(descriptor, key, "end", None),
            Err(e) => {
                warn!(resource = %key, task = descriptor.name(), error = %e, "task failed");
                self.record(descriptor, key, "end", Some(e.to_string()));
            }
        }
        result
    }

    fn record(&self, descriptor: &TaskDescriptor, key: &str, phase: &str, payload: Option<String>) {
        let (Some(audit), Some(prefix)) = (&self.audit, descriptor.events_prefix()) else {
            return;
        };
        audit.lock().record(build_audit_event(
            key,
            descriptor.name(),
            descriptor.pool(),
            &self.owner,
            format!("{prefix}-{phase}"),
            payload,
        ));
    }
}
