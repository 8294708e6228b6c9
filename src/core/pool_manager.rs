//! Worker pool manager: the table of named pools plus the pending-task
//! bookkeeping read by shutdown and observability.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::util::clock::now;

use super::{ExecutionPool, PoolStats, Resource, ResourceType, SchedulerError, TaskContext, TaskDescriptor, TaskRegistry};

/// A task currently running on some pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingTask {
    /// Resource type.
    #[serde(rename = "type")]
    pub resource_type: ResourceType,
    /// Resource id.
    pub id: String,
    /// Task name.
    pub task: String,
    /// Lock owner that dispatched the task.
    pub owner: String,
    /// When the task was handed to the pool.
    pub started_at: DateTime<Utc>,
}

type PendingMap = HashMap<String, HashMap<String, PendingTask>>;

/// Owns the execution pools and answers which tasks may currently run.
pub struct WorkerPoolManager {
    registry: Arc<TaskRegistry>,
    pools: HashMap<String, Arc<dyn ExecutionPool>>,
    pending: Mutex<PendingMap>,
}

impl WorkerPoolManager {
    /// Manager over `pools` for the descriptors of `registry`.
    ///
    /// # Errors
    ///
    /// `SchedulerError::UnknownPool` when a descriptor targets a pool that is
    /// not provided.
    pub fn new(
        registry: Arc<TaskRegistry>,
        pools: impl IntoIterator<Item = Arc<dyn ExecutionPool>>,
    ) -> Result<Self, SchedulerError> {
        let pools: HashMap<String, Arc<dyn ExecutionPool>> =
            pools.into_iter().map(|p| (p.id().to_owned(), p)).collect();
        if let Some(missing) = registry.pool_ids().into_iter().find(|id| !pools.contains_key(*id)) {
            return Err(SchedulerError::UnknownPool(missing.to_owned()));
        }
        info!(pools = pools.len(), tasks = registry.len(), "worker pool manager ready");
        Ok(Self {
            registry,
            pools,
            pending: Mutex::new(HashMap::new()),
        })
    }

    /// The task registry.
    #[must_use]
    pub fn registry(&self) -> &TaskRegistry {
        &self.registry
    }

    /// Pool `pool_id`, if configured.
    #[must_use]
    pub fn pool(&self, pool_id: &str) -> Option<&Arc<dyn ExecutionPool>> {
        self.pools.get(pool_id)
    }

    /// False iff the pool is draining. Unknown pools are never available.
    #[must_use]
    pub fn is_available(&self, pool_id: &str) -> bool {
        self.pools.get(pool_id).is_some_and(|p| p.is_available())
    }

    /// Descriptors of `resource_type` whose pool is available, in
    /// registration order.
    #[must_use]
    pub fn free_tasks(&self, resource_type: ResourceType) -> Vec<&TaskDescriptor> {
        self.registry
            .list_tasks(resource_type)
            .iter()
            .filter(|d| self.is_available(d.pool()))
            .collect()
    }

    /// Run `ctx.name` on `resource` in pool `pool_id`.
    ///
    /// # Errors
    ///
    /// `SchedulerError::UnknownPool` for an unconfigured pool,
    /// `SchedulerError::Task` with whatever the pool or task body raised.
    pub async fn run(&self, pool_id: &str, resource: Resource, ctx: TaskContext) -> Result<(), SchedulerError> {
        let pool = self
            .pools
            .get(pool_id)
            .ok_or_else(|| SchedulerError::UnknownPool(pool_id.to_owned()))?;

        let key = resource.key();
        let task = ctx.name.clone();
        let _pending = PendingEntry::insert(
            &self.pending,
            pool_id,
            key.to_string(),
            PendingTask {
                resource_type: key.resource_type,
                id: key.id.clone(),
                task: task.clone(),
                owner: ctx.owner.clone(),
                started_at: now(),
            },
        );

        debug!(pool = pool_id, task = %task, resource = %key, "dispatching task");
        pool.run(resource, ctx).await.map_err(|source| SchedulerError::Task {
            task,
            resource: key.to_string(),
            source,
        })
    }

    /// Stop admission on `pool_id` and wait for its in-flight work.
    ///
    /// Returns `true` when the pool emptied within its close timeout.
    ///
    /// # Errors
    ///
    /// `SchedulerError::UnknownPool` for an unconfigured pool.
    pub async fn drain(&self, pool_id: &str) -> Result<bool, SchedulerError> {
        let pool = self
            .pools
            .get(pool_id)
            .ok_or_else(|| SchedulerError::UnknownPool(pool_id.to_owned()))?;
        Ok(pool.drain().await)
    }

    /// Drain every pool concurrently. Returns `true` when all emptied in time.
    pub async fn drain_all(&self) -> bool {
        let results = join_all(self.pools.values().map(|pool| async move {
            let finished = pool.drain().await;
            if !finished {
                warn!(pool = pool.id(), "pool still busy after close timeout");
            }
            finished
        }))
        .await;
        results.into_iter().all(|finished| finished)
    }

    /// Counters of every pool, by id.
    #[must_use]
    pub fn stats(&self) -> BTreeMap<String, PoolStats> {
        self.pools.iter().map(|(id, pool)| (id.clone(), pool.stats())).collect()
    }

    /// Running tasks by pool id, oldest first.
    #[must_use]
    pub fn pending_tasks(&self) -> BTreeMap<String, Vec<PendingTask>> {
        let pending = self.pending.lock();
        pending
            .iter()
            .filter(|(_, tasks)| !tasks.is_empty())
            .map(|(pool, tasks)| {
                let mut tasks: Vec<_> = tasks.values().cloned().collect();
                tasks.sort_by_key(|t| t.started_at);
                (pool.clone(), tasks)
            })
            .collect()
    }
}

/// Removes its pending entry when the run finishes, fails or is cancelled.
struct PendingEntry<'a> {
    pending: &'a Mutex<PendingMap>,
    pool: String,
    key: String,
}

impl<'a> PendingEntry<'a> {
    fn insert(pending: &'a Mutex<PendingMap>, pool: &str, key: String, task: PendingTask) -> Self {
        pending.lock().entry(pool.to_owned()).or_default().insert(key.clone(), task);
        Self {
            pending,
            pool: pool.to_owned(),
            key,
        }
    }
}

impl Drop for PendingEntry<'_> {
    fn drop(&mut self) {
        if let Some(tasks) = self.pending.lock().get_mut(&self.pool) {
            tasks.remove(&self.key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PoolConfig;
    use crate::core::{StructuredFilter, TaskRouter, ThreadPool};
    use serde_json::json;
    use std::time::Duration;

    fn descriptor(name: &str, pool: &str) -> TaskDescriptor {
        TaskDescriptor::new(name, pool, |_| StructuredFilter::and(vec![]), |_, _| true)
    }

    fn manager(handler: TaskRouter) -> WorkerPoolManager {
        let registry = TaskRegistry::builder()
            .register(ResourceType::Datasets, descriptor("a", "p"))
            .register(ResourceType::Datasets, descriptor("b", "q"))
            .register(ResourceType::Applications, descriptor("c", "p"))
            .build();
        let handler = Arc::new(handler);
        let pools: Vec<Arc<dyn ExecutionPool>> = vec![
            Arc::new(ThreadPool::new("p", PoolConfig::threads(1, 2).with_close_timeout_ms(500), handler.clone()).unwrap()),
            Arc::new(ThreadPool::new("q", PoolConfig::threads(1, 1).with_close_timeout_ms(500), handler).unwrap()),
        ];
        WorkerPoolManager::new(Arc::new(registry), pools).unwrap()
    }

    #[test]
    fn rejects_descriptors_on_unknown_pools() {
        let registry = TaskRegistry::builder()
            .register(ResourceType::Catalogs, descriptor("harvest", "nowhere"))
            .build();
        let err = WorkerPoolManager::new(Arc::new(registry), Vec::new()).err().unwrap();
        assert!(matches!(err, SchedulerError::UnknownPool(id) if id == "nowhere"));
    }

    #[tokio::test]
    async fn drain_removes_tasks_for_every_type() {
        let m = manager(TaskRouter::new());
        assert_eq!(m.free_tasks(ResourceType::Datasets).len(), 2);
        assert_eq!(m.free_tasks(ResourceType::Applications).len(), 1);

        assert!(m.drain("p").await.unwrap());
        let names: Vec<_> = m.free_tasks(ResourceType::Datasets).iter().map(|d| d.name()).collect();
        assert_eq!(names, ["b"]);
        assert!(m.free_tasks(ResourceType::Applications).is_empty());
        assert!(!m.is_available("p"));
        assert!(m.is_available("q"));
    }

    #[tokio::test]
    async fn pending_tasks_track_running_work() {
        let router = TaskRouter::new().route("a", |_, _| async {
            tokio::time::sleep(Duration::from_millis(100)).await;
            Ok(())
        });
        let m = Arc::new(manager(router));
        let r = Resource::new(ResourceType::Datasets, json!({"id": "d1"})).unwrap();
        let ctx = TaskContext::new("a", &r, "p", "worker-1");

        let running = {
            let m = Arc::clone(&m);
            tokio::spawn(async move { m.run("p", r, ctx).await })
        };
        tokio::time::sleep(Duration::from_millis(30)).await;

        let pending = m.pending_tasks();
        let tasks = &pending["p"];
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].id, "d1");
        assert_eq!(tasks[0].owner, "worker-1");

        running.await.unwrap().unwrap();
        assert!(m.pending_tasks().is_empty());
        assert_eq!(m.stats()["p"].completed_tasks, 1);
    }

    #[tokio::test]
    async fn run_wraps_failures_with_context() {
        let m = manager(TaskRouter::new());
        let r = Resource::new(ResourceType::Datasets, json!({"id": "d1"})).unwrap();
        let ctx = TaskContext::new("a", &r, "p", "worker-1");
        let err = m.run("p", r.clone(), ctx.clone()).await.unwrap_err();
        assert!(matches!(err, SchedulerError::Task { ref resource, .. } if resource == "datasets:d1"));

        assert!(matches!(m.run("zzz", r, ctx).await, Err(SchedulerError::UnknownPool(_))));
        assert!(m.drain_all().await);
    }
}
