//! Tests for configuration validation

use pipeline_scheduler::config::{
    IsolationConfig, LockConfig, PoolConfig, PoolExecution, SchedulerConfig, WorkerConfig, BATCH_PROCESSOR,
    FILES_MANAGER, FILES_PROCESSOR, SHORT_PROCESSOR,
};
use std::time::Duration;

#[test]
fn test_pool_config_validation() {
    let valid = PoolConfig::threads(2, 4);
    assert!(valid.validate().is_ok());
    assert_eq!(valid.capacity(), 8);
    assert_eq!(valid.idle_timeout(), Duration::from_secs(60));
    assert_eq!(valid.close_timeout(), Duration::from_secs(30));
}

#[test]
fn test_pool_config_invalid_max_concurrency() {
    assert!(PoolConfig::threads(0, 4).validate().is_err());
}

#[test]
fn test_pool_config_invalid_per_worker_concurrency() {
    assert!(PoolConfig::threads(1, 0).validate().is_err());
}

#[test]
fn test_pool_config_invalid_memory_ceiling() {
    let invalid = PoolConfig::threads(1, 1).with_memory_ceiling_mb(0);
    assert!(invalid.validate().is_err());
    assert!(PoolConfig::threads(1, 1).with_memory_ceiling_mb(512).validate().is_ok());
}

#[test]
fn test_pool_config_invalid_stack_size() {
    let invalid = PoolConfig {
        thread_stack_size: 1024,
        ..PoolConfig::threads(1, 1)
    };
    assert!(invalid.validate().is_err());
}

#[test]
fn test_scheduler_config_default_pools() {
    let cfg = SchedulerConfig::with_default_pools(
        WorkerConfig {
            base_concurrency: 4,
            ..WorkerConfig::default()
        },
        LockConfig::default(),
    );
    assert!(cfg.validate().is_ok());
    assert_eq!(cfg.pools.len(), 4);
    assert_eq!(cfg.pools[SHORT_PROCESSOR].max_concurrency, 1);
    assert_eq!(cfg.pools[SHORT_PROCESSOR].per_worker_concurrency, 16);
    assert_eq!(cfg.pools[FILES_MANAGER].per_worker_concurrency, 8);
    assert_eq!(cfg.pools[FILES_PROCESSOR].max_concurrency, 4);
    assert_eq!(cfg.pools[BATCH_PROCESSOR].per_worker_concurrency, 4);
    assert_eq!(cfg.locks.ttl(), Duration::from_secs(60));
    assert_eq!(cfg.worker.error_retry_delay(), Duration::from_secs(600));
}

#[test]
fn test_scheduler_config_empty_pools() {
    let cfg = SchedulerConfig {
        pools: std::collections::HashMap::new(),
        worker: WorkerConfig::default(),
        locks: LockConfig::default(),
    };
    assert!(cfg.validate().is_err());
}

#[test]
fn test_scheduler_config_invalid_pool() {
    let mut cfg = SchedulerConfig::default();
    cfg.pools.insert("broken".to_string(), PoolConfig::threads(0, 1));
    let err = cfg.validate().unwrap_err();
    assert!(err.contains("broken"));
}

#[test]
fn test_from_json_str() {
    let cfg = SchedulerConfig::from_json_str(
        r#"{
            "pools": {
                "short-processor": {"max_concurrency": 1, "per_worker_concurrency": 8},
                "files-processor": {"max_concurrency": 2, "execution": "process", "memory_ceiling_mb": 2048}
            },
            "worker": {"isolation": {"program": "/usr/bin/pipeline-task", "args": ["--task"]}},
            "locks": {"ttl_secs": 30}
        }"#,
    )
    .expect("valid configuration");

    assert_eq!(cfg.pools["short-processor"].capacity(), 8);
    let files = &cfg.pools["files-processor"];
    assert_eq!(files.execution, PoolExecution::Process);
    assert_eq!(files.per_worker_concurrency, 1);
    assert_eq!(files.memory_ceiling_mb, Some(2048));
    assert_eq!(cfg.locks.ttl_secs, 30);
    assert_eq!(
        cfg.worker.isolation,
        Some(IsolationConfig {
            program: "/usr/bin/pipeline-task".to_string(),
            args: vec!["--task".to_string()],
        })
    );
}

#[test]
fn test_from_json_str_rejects_process_pool_without_isolation() {
    let err = SchedulerConfig::from_json_str(r#"{"pools": {"p": {"execution": "process"}}}"#).unwrap_err();
    assert!(err.contains("isolation"));
    assert!(SchedulerConfig::from_json_str("not json").unwrap_err().starts_with("parse error"));
}

#[test]
fn test_from_lookup_reads_worker_variables() {
    let cfg = SchedulerConfig::from_lookup(|key| match key {
        "WORKER_BASE_CONCURRENCY" => Some("3".to_string()),
        "WORKER_CLOSE_TIMEOUT" => Some("5000".to_string()),
        _ => None,
    })
    .expect("valid environment");
    assert_eq!(cfg.worker.base_concurrency, 3);
    assert!(cfg.pools.values().all(|p| p.close_timeout_ms == 5000));
}
