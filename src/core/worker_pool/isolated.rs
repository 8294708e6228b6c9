//! Process-backed pool: every task runs in a disposable child process.
//!
//! The child receives `<task> <type> <id>` as its last arguments and
//! `MODE=task` in its environment; it loads the resource itself, runs the one
//! task and exits (see `runtime::isolation`). A crash of the child, including
//! an out-of-memory kill, fails only that task.

use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::process::Command;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use crate::config::{IsolationConfig, PoolConfig};
use crate::core::{Resource, TaskContext, TaskError};

use super::{ExecutionPool, PoolCounters, PoolError, PoolStats};

/// Pool spawning one child process per task.
pub struct ProcessPool {
    id: String,
    config: PoolConfig,
    isolation: IsolationConfig,
    permits: Semaphore,
    counters: PoolCounters,
    needs_drain: AtomicBool,
}

impl ProcessPool {
    /// Create a pool running `isolation.program` for each task.
    ///
    /// # Errors
    ///
    /// Returns `PoolError::InvalidConfig` if either configuration is invalid.
    pub fn new(id: impl Into<String>, config: PoolConfig, isolation: IsolationConfig) -> Result<Self, PoolError> {
        config.validate().map_err(PoolError::InvalidConfig)?;
        isolation.validate().map_err(PoolError::InvalidConfig)?;
        let id = id.into();
        info!(pool = %id, program = %isolation.program, capacity = config.capacity(), "process pool initialized");
        Ok(Self {
            permits: Semaphore::new(config.capacity()),
            id,
            config,
            isolation,
            counters: PoolCounters::default(),
            needs_drain: AtomicBool::new(false),
        })
    }

    fn command(&self, resource: &Resource, ctx: &TaskContext) -> Command {
        let mut cmd = Command::new(&self.isolation.program);
        cmd.args(&self.isolation.args)
            .arg(&ctx.name)
            .arg(ctx.resource_type.as_str())
            .arg(resource.id())
            .env("MODE", "task")
            .env("DATASET_DRAFT", if ctx.draft { "true" } else { "false" })
            .env("TASK_POOL", &self.id)
            .env("TASK_OWNER", &ctx.owner)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(mb) = self.config.memory_ceiling_mb {
            cmd.env("TASK_MEMORY_CEILING_MB", mb.to_string());
        }
        cmd
    }
}

#[async_trait]
impl ExecutionPool for ProcessPool {
    fn id(&self) -> &str {
        &self.id
    }

    fn config(&self) -> &PoolConfig {
        &self.config
    }

    fn is_available(&self) -> bool {
        !self.needs_drain.load(Ordering::Acquire)
    }

    async fn run(&self, resource: Resource, ctx: TaskContext) -> Result<(), PoolError> {
        if !self.is_available() {
            return Err(PoolError::Draining);
        }
        self.counters.submitted();
        let Ok(_permit) = self.permits.acquire().await else {
            self.counters.abandoned();
            return Err(PoolError::PoolShutdown);
        };
        let mut guard = self.counters.start();

        let key = resource.key();
        debug!(pool = %self.id, task = %ctx.name, resource = %key, "spawning task process");
        let output = self
            .command(&resource, &ctx)
            .output()
            .await
            .map_err(|e| PoolError::Internal(format!("failed to spawn `{}`: {e}", self.isolation.program)))?;

        if output.status.success() {
            guard.succeeded();
            return Ok(());
        }

        let stderr = relevant_stderr(&String::from_utf8_lossy(&output.stderr));
        warn!(
            pool = %self.id,
            task = %ctx.name,
            resource = %key,
            status = %output.status,
            "task process failed"
        );
        Err(PoolError::TaskFailed(TaskError::Process {
            status: output.status.to_string(),
            stderr,
        }))
    }

    async fn drain(&self) -> bool {
        self.needs_drain.store(true, Ordering::Release);
        let timeout = self.config.close_timeout();
        info!(pool = %self.id, in_flight = self.counters.in_flight(), "draining pool");
        let finished = self.counters.wait_idle(timeout).await;
        if !finished {
            warn!(pool = %self.id, in_flight = self.counters.in_flight(), "pool did not drain within close timeout");
        }
        self.permits.close();
        finished
    }

    fn stats(&self) -> PoolStats {
        let active = usize::try_from(self.counters.active_tasks.load(Ordering::Relaxed)).unwrap_or(usize::MAX);
        self.counters.snapshot(&self.config, active, !self.is_available())
    }
}

/// Rebuild an error message from a child's stderr, minus runtime warnings
/// and worker noise.
pub(crate) fn relevant_stderr(stderr: &str) -> String {
    stderr
        .lines()
        .filter(|line| !line.trim().is_empty())
        .filter(|line| !line.contains("Warning:") && !line.contains("--trace-warnings"))
        .filter(|line| !line.starts_with("worker:"))
        .collect::<Vec<_>>()
        .join("\n")
}
