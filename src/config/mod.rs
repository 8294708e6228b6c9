//! Configuration models for pools, locks and worker settings.

pub mod pool;

pub use pool::{
    IsolationConfig, LockConfig, PoolConfig, PoolExecution, SchedulerConfig, WorkerConfig, BATCH_PROCESSOR,
    FILES_MANAGER, FILES_PROCESSOR, SHORT_PROCESSOR,
};
