//! Tests for error types

use pipeline_scheduler::core::{PoolError, SchedulerError, TaskError, NO_RETRY_PREFIX};
use std::error::Error;

#[test]
fn test_unknown_pool_error() {
    let err = SchedulerError::UnknownPool("gpu".to_string());
    assert_eq!(format!("{}", err), "unknown pool `gpu`");
}

#[test]
fn test_backend_error() {
    let err = SchedulerError::Backend("connection failed".to_string());
    assert_eq!(format!("{}", err), "backend error: connection failed");
}

#[test]
fn test_task_error_chain() {
    let err = SchedulerError::Task {
        task: "normalizeFile".to_string(),
        resource: "datasets:d1".to_string(),
        source: PoolError::TaskFailed(TaskError::failed("bad encoding")),
    };
    assert_eq!(
        err.to_string(),
        "task `normalizeFile` failed on datasets:d1: task failed: bad encoding"
    );
    let pool_err = err.source().expect("pool error source");
    assert_eq!(pool_err.to_string(), "task failed: bad encoding");
    assert_eq!(pool_err.source().expect("task error source").to_string(), "bad encoding");
}

#[test]
fn test_no_retry_detection() {
    let msg = format!("{NO_RETRY_PREFIX}file is empty");
    assert!(TaskError::failed(msg.clone()).is_no_retry());
    assert!(PoolError::TaskFailed(TaskError::failed(msg.clone())).is_no_retry());
    assert!(TaskError::Process {
        status: "exit status: 1".to_string(),
        stderr: msg,
    }
    .is_no_retry());

    assert!(!TaskError::failed("timeout").is_no_retry());
    assert!(!PoolError::Draining.is_no_retry());
}

#[test]
fn test_pool_error_display() {
    assert_eq!(PoolError::Draining.to_string(), "pool is draining");
    assert_eq!(PoolError::PoolShutdown.to_string(), "pool has been shut down");
    assert_eq!(
        PoolError::InvalidConfig("x".to_string()).to_string(),
        "invalid configuration: x"
    );
    assert_eq!(PoolError::from(TaskError::UnknownTask("t".into())).to_string(), "task failed: unknown task `t`");
}
