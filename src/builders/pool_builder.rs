//! Builders to construct pools and the scheduler from configuration.

use std::sync::Arc;

use crate::config::{PoolConfig, PoolExecution, SchedulerConfig};
use crate::core::{
    DistributedLock, ErrorRetryPolicy, ExecutionPool, PoolError, ProcessPool, ResourceScheduler, ResourceStore,
    SchedulerError, TaskHandler, TaskRegistry, ThreadPool, WorkerPoolManager,
};
use crate::infra::DraftOverlay;

/// Build one pool from its configuration.
///
/// Thread pools ask `handler_factory` for the handler running their task
/// bodies; process pools run `cfg.worker.isolation` instead.
///
/// # Errors
///
/// `SchedulerError::InvalidConfig` when the pool cannot be created.
pub fn build_pool<FH>(
    cfg: &SchedulerConfig,
    id: &str,
    pool_cfg: &PoolConfig,
    handler_factory: &mut FH,
) -> Result<Arc<dyn ExecutionPool>, SchedulerError>
where
    FH: FnMut(&str, &PoolConfig) -> Result<Arc<dyn TaskHandler>, SchedulerError>,
{
    let invalid = |e: PoolError| SchedulerError::InvalidConfig(format!("pool `{id}`: {e}"));
    let pool: Arc<dyn ExecutionPool> = match pool_cfg.execution {
        PoolExecution::Threads => {
            let handler = handler_factory(id, pool_cfg)?;
            Arc::new(ThreadPool::new(id, pool_cfg.clone(), handler).map_err(invalid)?)
        }
        PoolExecution::Process => {
            let isolation = cfg
                .worker
                .isolation
                .clone()
                .ok_or_else(|| SchedulerError::InvalidConfig(format!("pool `{id}` needs worker.isolation")))?;
            Arc::new(ProcessPool::new(id, pool_cfg.clone(), isolation).map_err(invalid)?)
        }
    };
    Ok(pool)
}

/// Build every configured pool and the manager dispatching `registry` onto
/// them.
///
/// # Errors
///
/// Invalid configuration, a failing handler factory, or a descriptor naming
/// a pool missing from `cfg.pools`.
pub fn build_pool_manager<FH>(
    cfg: &SchedulerConfig,
    registry: Arc<TaskRegistry>,
    mut handler_factory: FH,
) -> Result<WorkerPoolManager, SchedulerError>
where
    FH: FnMut(&str, &PoolConfig) -> Result<Arc<dyn TaskHandler>, SchedulerError>,
{
    cfg.validate().map_err(SchedulerError::InvalidConfig)?;

    let mut ids: Vec<&String> = cfg.pools.keys().collect();
    ids.sort();
    let mut pools = Vec::with_capacity(ids.len());
    for id in ids {
        pools.push(build_pool(cfg, id, &cfg.pools[id], &mut handler_factory)?);
    }
    WorkerPoolManager::new(registry, pools)
}

/// Build the manager and a scheduler over `store` and `locks`.
///
/// Active drafts are overlaid with [`DraftOverlay`]; use
/// [`ResourceScheduler::new`] directly for another adapter. The scheduler
/// samples `cfg.worker.candidate_sample_size` candidates per query and
/// retries failures after `cfg.worker.error_retry_delay_ms`.
///
/// # Errors
///
/// See [`build_pool_manager`].
pub fn build_scheduler<FH>(
    cfg: &SchedulerConfig,
    registry: Arc<TaskRegistry>,
    handler_factory: FH,
    store: Arc<dyn ResourceStore>,
    locks: Arc<dyn DistributedLock>,
) -> Result<ResourceScheduler, SchedulerError>
where
    FH: FnMut(&str, &PoolConfig) -> Result<Arc<dyn TaskHandler>, SchedulerError>,
{
    let manager = build_pool_manager(cfg, registry, handler_factory)?;
    Ok(
        ResourceScheduler::new(store, locks, Arc::new(DraftOverlay), Arc::new(manager))
            .with_sample_size(cfg.worker.candidate_sample_size)
            .with_retry_policy(ErrorRetryPolicy::from(&cfg.worker)),
    )
}
