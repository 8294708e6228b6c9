//! Tests for builder modules

use pipeline_scheduler::builders::{build_pool, build_pool_manager, build_scheduler};
use pipeline_scheduler::config::{IsolationConfig, LockConfig, PoolConfig, SchedulerConfig, WorkerConfig};
use pipeline_scheduler::core::{
    standard_registry, ExecutionPool, SchedulerError, TaskHandler, TaskRegistry, TaskRouter,
};
use pipeline_scheduler::infra::{InMemoryLock, InMemoryResourceStore};
use std::sync::Arc;
use std::time::Duration;

fn router() -> Arc<dyn TaskHandler> {
    Arc::new(TaskRouter::new())
}

fn small_config() -> SchedulerConfig {
    SchedulerConfig::with_default_pools(
        WorkerConfig {
            base_concurrency: 1,
            ..WorkerConfig::default()
        },
        LockConfig::default(),
    )
}

#[test]
fn test_build_pool_manager_creates_every_pool() {
    let cfg = small_config();
    let mut asked = Vec::new();
    let manager = build_pool_manager(&cfg, Arc::new(standard_registry()), |id, pool_cfg| {
        asked.push((id.to_string(), pool_cfg.capacity()));
        Ok(router())
    })
    .expect("manager");

    asked.sort();
    assert_eq!(
        asked,
        [
            ("batch-processor".to_string(), 1),
            ("files-manager".to_string(), 2),
            ("files-processor".to_string(), 1),
            ("short-processor".to_string(), 4),
        ]
    );
    assert_eq!(manager.stats().len(), 4);
    assert!(manager.is_available("short-processor"));
}

#[test]
fn test_build_pool_manager_rejects_missing_pools() {
    let mut cfg = small_config();
    cfg.pools.remove("batch-processor");
    let err = build_pool_manager(&cfg, Arc::new(standard_registry()), |_, _| Ok(router()))
        .err()
        .expect("missing pool");
    assert!(matches!(err, SchedulerError::UnknownPool(ref id) if id == "batch-processor"));
}

#[test]
fn test_build_pool_manager_rejects_invalid_config() {
    let mut cfg = small_config();
    cfg.pools.insert("broken".to_string(), PoolConfig::threads(0, 1));
    let err = build_pool_manager(&cfg, Arc::new(TaskRegistry::builder().build()), |_, _| Ok(router()))
        .err()
        .expect("invalid config");
    assert!(matches!(err, SchedulerError::InvalidConfig(_)));
}

#[test]
fn test_handler_factory_errors_propagate() {
    let cfg = small_config();
    let err = build_pool_manager(&cfg, Arc::new(standard_registry()), |id, _| {
        Err(SchedulerError::Backend(format!("no handler for {id}")))
    })
    .err()
    .expect("factory failure");
    assert!(err.to_string().contains("no handler"));
}

#[test]
fn test_build_process_pool() {
    let mut cfg = small_config();
    cfg.worker.isolation = Some(IsolationConfig {
        program: "pipeline-task".to_string(),
        args: Vec::new(),
    });
    let pool_cfg = PoolConfig::threads(2, 1).isolated();
    let mut factory_calls = 0;
    let pool = build_pool(&cfg, "isolated", &pool_cfg, &mut |_: &str, _: &PoolConfig| {
        factory_calls += 1;
        Ok(router())
    })
    .expect("process pool");
    assert_eq!(pool.id(), "isolated");
    assert_eq!(pool.config().capacity(), 2);
    assert_eq!(factory_calls, 0, "process pools run the isolation program, not a handler");
}

#[test]
fn test_build_scheduler_applies_worker_settings() {
    let mut cfg = small_config();
    cfg.worker.candidate_sample_size = 7;
    cfg.worker.error_retry_delay_ms = 45_000;
    let scheduler = build_scheduler(
        &cfg,
        Arc::new(standard_registry()),
        |_, _| Ok(router()),
        Arc::new(InMemoryResourceStore::new()),
        Arc::new(InMemoryLock::default()),
    )
    .expect("scheduler");
    assert!(scheduler.owner().starts_with("worker-"));
    assert_eq!(scheduler.manager().stats().len(), 4);
    assert_eq!(scheduler.sample_size(), 7);
    assert_eq!(scheduler.retry_policy().delay(), Duration::from_secs(45));
}
