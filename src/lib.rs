//! # Pipeline Scheduler
//!
//! Moves datasets, applications and catalogs through their processing
//! pipelines by dispatching tasks onto bounded worker pools.
//!
//! Every resource carries a lifecycle `status` (and optionally a `draft`
//! revision with its own status). A [`TaskRegistry`](core::TaskRegistry)
//! lists, per resource type and in priority order, the tasks that advance a
//! resource: each descriptor pairs a store-side filter (which resources are
//! candidates) with an in-memory business predicate (whether this resource
//! really needs the task now).
//!
//! ## Components
//!
//! - **Registry**: immutable task descriptors; see
//!   [`core::catalog::standard_registry`] for the dataset pipeline.
//! - **Pools**: named execution pools with a concurrency ceiling. A
//!   [`ThreadPool`](core::ThreadPool) runs task bodies on dedicated OS
//!   threads; a [`ProcessPool`](core::ProcessPool) runs each task in a child
//!   process so a crash or OOM kill fails only that task.
//! - **Manager**: [`WorkerPoolManager`](core::WorkerPoolManager) dispatches to
//!   pools, filters tasks whose pool is draining and tracks pending tasks.
//! - **Scheduler**: [`ResourceScheduler`](core::ResourceScheduler) locks one
//!   resource, then repeatedly reloads it and runs the first task that
//!   applies, until none does or a task fails.
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use pipeline_scheduler::builders::build_scheduler;
//! use pipeline_scheduler::config::SchedulerConfig;
//! use pipeline_scheduler::core::{standard_registry, ResourceType, TaskHandler, TaskRouter};
//! use pipeline_scheduler::infra::{InMemoryLock, InMemoryResourceStore};
//!
//! let cfg = SchedulerConfig::from_env()?;
//! let router: Arc<dyn TaskHandler> = Arc::new(TaskRouter::new().route("finalize", finalize));
//! let scheduler = build_scheduler(
//!     &cfg,
//!     Arc::new(standard_registry()),
//!     |_, _| Ok(Arc::clone(&router)),
//!     Arc::new(InMemoryResourceStore::new()),
//!     Arc::new(InMemoryLock::new(cfg.locks.ttl())),
//! )?;
//!
//! if let Some(id) = scheduler.query_next_resource(ResourceType::Datasets).await? {
//!     scheduler.process_resource(ResourceType::Datasets, &id).await?;
//! }
//! scheduler.manager().drain_all().await;
//! ```

/// Core scheduling abstractions: resources, filters, tasks, pools and the
/// scheduler itself.
pub mod core;
/// Configuration models for pools, locks and worker settings.
pub mod config;
/// Builders to construct pools, the manager and the scheduler from configuration.
pub mod builders;
/// Infrastructure adapters: resource store, lock and draft overlay.
pub mod infra;
/// Isolated task entry point and pool observability.
pub mod runtime;
/// Shared utilities.
pub mod util;
