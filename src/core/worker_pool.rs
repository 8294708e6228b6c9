//! Execution pools: named fabrics running task bodies under their own
//! concurrency ceiling.
//!
//! Two implementations share the [`ExecutionPool`] trait:
//!
//! - [`ThreadPool`]: dedicated OS threads, each driving a current-thread tokio
//!   runtime, so CPU-heavy task bodies never block the scheduler's runtime.
//! - [`ProcessPool`]: one disposable child process per task, containing
//!   process-fatal failures (out-of-memory, aborts) away from the scheduler.
//!
//! Every pool honors a cooperative drain: once `needs_drain` is set, `run`
//! rejects new work with [`PoolError::Draining`] while in-flight work runs to
//! completion or until the pool's close timeout elapses.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use pipeline_scheduler::config::PoolConfig;
//! use pipeline_scheduler::core::{ExecutionPool, ThreadPool, TaskRouter};
//!
//! let pool = ThreadPool::new("files-processor", PoolConfig::threads(4, 1), Arc::new(TaskRouter::new()))?;
//! pool.run(resource, ctx).await?;
//! let finished = pool.drain().await;
//! ```

mod isolated;
mod native;

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::Notify;

use crate::config::PoolConfig;

use super::{Resource, TaskContext, TaskError};

pub use isolated::ProcessPool;
pub use native::ThreadPool;

/// Errors that can occur when running work on a pool.
#[derive(Debug)]
pub enum PoolError {
    /// The pool is draining and admits no new work.
    Draining,

    /// The pool has been shut down.
    PoolShutdown,

    /// The task body raised.
    TaskFailed(TaskError),

    /// The operation timed out.
    Timeout,

    /// Configuration validation failed.
    InvalidConfig(String),

    /// Internal error (worker thread panic, channel closed, process spawn failure).
    Internal(String),
}

impl PoolError {
    /// True when the failure message says retrying cannot succeed.
    #[must_use]
    pub fn is_no_retry(&self) -> bool {
        matches!(self, Self::TaskFailed(err) if err.is_no_retry())
    }
}

impl fmt::Display for PoolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Draining => write!(f, "pool is draining"),
            Self::PoolShutdown => write!(f, "pool has been shut down"),
            Self::TaskFailed(err) => write!(f, "task failed: {err}"),
            Self::Timeout => write!(f, "operation timed out"),
            Self::InvalidConfig(msg) => write!(f, "invalid configuration: {msg}"),
            Self::Internal(msg) => write!(f, "internal error: {msg}"),
        }
    }
}

impl std::error::Error for PoolError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::TaskFailed(err) => Some(err),
            _ => None,
        }
    }
}

impl From<TaskError> for PoolError {
    fn from(err: TaskError) -> Self {
        Self::TaskFailed(err)
    }
}

/// Statistics about pool utilization and performance.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Live worker threads or child processes.
    pub worker_count: usize,

    /// Configured thread / process ceiling.
    pub max_concurrency: usize,

    /// Tasks one worker may run at once.
    pub per_worker_concurrency: usize,

    /// Advisory memory ceiling in megabytes.
    pub memory_ceiling_mb: Option<u64>,

    /// The pool rejects new work.
    pub needs_drain: bool,

    /// Currently executing tasks.
    pub active_tasks: u64,

    /// Tasks accepted but not yet started.
    pub queued_tasks: u64,

    /// Total tasks completed successfully.
    pub completed_tasks: u64,

    /// Total tasks that failed.
    pub failed_tasks: u64,

    /// Total tasks submitted.
    pub submitted_tasks: u64,

    /// Cumulative run time of finished tasks.
    pub total_run_time: Duration,
}

impl PoolStats {
    /// Finished tasks, successful or not.
    #[must_use]
    pub const fn finished_tasks(&self) -> u64 {
        self.completed_tasks + self.failed_tasks
    }

    /// Mean run time of finished tasks, zero before the first one.
    #[must_use]
    pub fn mean_run_time(&self) -> Duration {
        let n = self.finished_tasks();
        if n == 0 {
            return Duration::ZERO;
        }
        let nanos = self.total_run_time.as_nanos() / u128::from(n);
        Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX))
    }
}

/// Internal counters for pool statistics (thread-safe).
#[derive(Debug, Default)]
pub(crate) struct PoolCounters {
    pub active_tasks: AtomicU64,
    pub queued_tasks: AtomicU64,
    pub completed_tasks: AtomicU64,
    pub failed_tasks: AtomicU64,
    pub submitted_tasks: AtomicU64,
    pub total_run_time_us: AtomicU64,
    idle: Notify,
}

impl PoolCounters {
    /// A task was accepted by `run`.
    pub fn submitted(&self) {
        self.submitted_tasks.fetch_add(1, Ordering::Relaxed);
        self.queued_tasks.fetch_add(1, Ordering::Relaxed);
    }

    /// A task was accepted then dropped before starting.
    pub fn abandoned(&self) {
        self.queued_tasks.fetch_sub(1, Ordering::Relaxed);
        self.failed_tasks.fetch_add(1, Ordering::Relaxed);
        self.idle.notify_waiters();
    }

    /// Move a queued task to active; the guard records its outcome on drop.
    pub fn start(&self) -> RunGuard<'_> {
        self.active_tasks.fetch_add(1, Ordering::AcqRel);
        self.queued_tasks.fetch_sub(1, Ordering::AcqRel);
        RunGuard {
            counters: self,
            started: Instant::now(),
            succeeded: false,
        }
    }

    /// Queued plus active tasks. Reads `queued` first: `start` bumps
    /// `active` before leaving the queue.
    pub fn in_flight(&self) -> u64 {
        let queued = self.queued_tasks.load(Ordering::Acquire);
        queued + self.active_tasks.load(Ordering::Acquire)
    }

    /// Wait until nothing is queued or running, at most `timeout`.
    ///
    /// Returns `false` when the timeout elapsed first.
    pub async fn wait_idle(&self, timeout: Duration) -> bool {
        let wait = async {
            loop {
                let notified = self.idle.notified();
                tokio::pin!(notified);
                notified.as_mut().enable();
                if self.in_flight() == 0 {
                    return;
                }
                notified.await;
            }
        };
        tokio::time::timeout(timeout, wait).await.is_ok()
    }

    /// Get a snapshot of current statistics.
    pub fn snapshot(&self, config: &PoolConfig, worker_count: usize, needs_drain: bool) -> PoolStats {
        PoolStats {
            worker_count,
            max_concurrency: config.max_concurrency,
            per_worker_concurrency: config.per_worker_concurrency,
            memory_ceiling_mb: config.memory_ceiling_mb,
            needs_drain,
            active_tasks: self.active_tasks.load(Ordering::Relaxed),
            queued_tasks: self.queued_tasks.load(Ordering::Relaxed),
            completed_tasks: self.completed_tasks.load(Ordering::Relaxed),
            failed_tasks: self.failed_tasks.load(Ordering::Relaxed),
            submitted_tasks: self.submitted_tasks.load(Ordering::Relaxed),
            total_run_time: Duration::from_micros(self.total_run_time_us.load(Ordering::Relaxed)),
        }
    }
}

/// Tracks one running task. Counts as failed unless marked otherwise, so a
/// panicking task body still releases its active slot.
pub(crate) struct RunGuard<'a> {
    counters: &'a PoolCounters,
    started: Instant,
    succeeded: bool,
}

impl RunGuard<'_> {
    pub fn succeeded(&mut self) {
        self.succeeded = true;
    }
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        let elapsed = u64::try_from(self.started.elapsed().as_micros()).unwrap_or(u64::MAX);
        let c = self.counters;
        c.total_run_time_us.fetch_add(elapsed, Ordering::Relaxed);
        if self.succeeded {
            c.completed_tasks.fetch_add(1, Ordering::Relaxed);
        } else {
            c.failed_tasks.fetch_add(1, Ordering::Relaxed);
        }
        c.active_tasks.fetch_sub(1, Ordering::Release);
        c.idle.notify_waiters();
    }
}

/// A named execution fabric.
#[async_trait]
pub trait ExecutionPool: Send + Sync {
    /// Pool identifier referenced by task descriptors.
    fn id(&self) -> &str;

    /// Pool configuration.
    fn config(&self) -> &PoolConfig;

    /// False iff the pool's `needs_drain` flag is set.
    fn is_available(&self) -> bool;

    /// Run task `ctx.name` on `resource`, honoring the pool's concurrency
    /// ceiling. Resolves when the task body finishes.
    async fn run(&self, resource: Resource, ctx: TaskContext) -> Result<(), PoolError>;

    /// Stop admitting work and wait up to the close timeout for in-flight
    /// work. Returns `true` when everything finished in time.
    async fn drain(&self) -> bool;

    /// Current counters.
    fn stats(&self) -> PoolStats;
}
