//! Core scheduling abstractions: resources, filters, tasks, pools and the
//! scheduler loop.

pub mod audit;
pub mod backends;
pub mod catalog;
pub mod error;
pub mod executor;
pub mod filter;
pub mod pool_manager;
pub mod registry;
pub mod resource;
pub mod retry;
pub mod scheduler;
pub mod task;
pub mod worker_pool;

pub use audit::{build_audit_event, AuditEvent, AuditSink, InMemoryAuditSink};
pub use backends::{DistributedLock, DraftMergeAdapter, Patch, ResourceStore};
pub use catalog::standard_registry;
pub use error::{AppResult, SchedulerError, TaskError, NO_RETRY_PREFIX};
pub use executor::{TaskFn, TaskFuture, TaskHandler, TaskRouter};
pub use filter::StructuredFilter;
pub use pool_manager::{PendingTask, WorkerPoolManager};
pub use registry::{TaskRegistry, TaskRegistryBuilder};
pub use resource::{lookup, PipelineStatus, Resource, ResourceKey, ResourceType, DRAFT_VIEW_FIELD};
pub use retry::{ErrorRetryPolicy, Failure};
pub use scheduler::{ResourceScheduler, DEFAULT_SAMPLE_SIZE};
pub use task::{BusinessPredicate, StatePredicate, TaskContext, TaskDescriptor};
pub use worker_pool::{ExecutionPool, PoolError, PoolStats, ProcessPool, ThreadPool};
