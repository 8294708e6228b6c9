//! Pool and scheduler configuration structures.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Standard pool running quick metadata and maintenance tasks.
pub const SHORT_PROCESSOR: &str = "short-processor";
/// Standard pool moving files in and out of storage.
pub const FILES_MANAGER: &str = "files-manager";
/// Standard pool converting and analyzing files.
pub const FILES_PROCESSOR: &str = "files-processor";
/// Standard pool for long batch work (validation, extension, indexing).
pub const BATCH_PROCESSOR: &str = "batch-processor";

/// How a pool executes task bodies.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PoolExecution {
    /// Dedicated OS threads inside the scheduler process.
    #[default]
    Threads,
    /// One child process per task (fatal isolation).
    Process,
}

/// Pool configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Threads (or concurrent processes divided by `per_worker_concurrency`).
    pub max_concurrency: usize,
    /// Tasks a single worker runs at once.
    pub per_worker_concurrency: usize,
    /// Idle time after which a worker thread exits.
    pub idle_timeout_ms: u64,
    /// How long a drain waits for in-flight work.
    pub close_timeout_ms: u64,
    /// Advisory memory ceiling, reported in stats and passed to isolated tasks.
    pub memory_ceiling_mb: Option<u64>,
    /// Stack size of worker threads in bytes.
    pub thread_stack_size: usize,
    /// Execution fabric.
    pub execution: PoolExecution,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 1,
            per_worker_concurrency: 1,
            idle_timeout_ms: 60_000,
            close_timeout_ms: 30_000,
            memory_ceiling_mb: None,
            thread_stack_size: 2 * 1024 * 1024,
            execution: PoolExecution::Threads,
        }
    }
}

impl PoolConfig {
    /// Thread pool with the given ceilings and default timeouts.
    #[must_use]
    pub fn threads(max_concurrency: usize, per_worker_concurrency: usize) -> Self {
        Self {
            max_concurrency,
            per_worker_concurrency,
            ..Self::default()
        }
    }

    /// Set the advisory memory ceiling.
    #[must_use]
    pub const fn with_memory_ceiling_mb(mut self, mb: u64) -> Self {
        self.memory_ceiling_mb = Some(mb);
        self
    }

    /// Set the drain timeout.
    #[must_use]
    pub const fn with_close_timeout_ms(mut self, ms: u64) -> Self {
        self.close_timeout_ms = ms;
        self
    }

    /// Run tasks in child processes.
    #[must_use]
    pub const fn isolated(mut self) -> Self {
        self.execution = PoolExecution::Process;
        self
    }

    /// Maximum tasks running at once: `max_concurrency × per_worker_concurrency`.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.max_concurrency.saturating_mul(self.per_worker_concurrency)
    }

    /// Idle timeout as a `Duration`.
    #[must_use]
    pub const fn idle_timeout(&self) -> Duration {
        Duration::from_millis(self.idle_timeout_ms)
    }

    /// Close timeout as a `Duration`.
    #[must_use]
    pub const fn close_timeout(&self) -> Duration {
        Duration::from_millis(self.close_timeout_ms)
    }

    /// Validate pool configuration values.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_concurrency == 0 {
            return Err("max_concurrency must be greater than 0".into());
        }
        if self.per_worker_concurrency == 0 {
            return Err("per_worker_concurrency must be greater than 0".into());
        }
        if self.idle_timeout_ms == 0 {
            return Err("idle_timeout_ms must be greater than 0".into());
        }
        if self.thread_stack_size < 64 * 1024 {
            return Err("thread_stack_size must be at least 64 KiB".into());
        }
        if self.memory_ceiling_mb == Some(0) {
            return Err("memory_ceiling_mb must be greater than 0 when set".into());
        }
        Ok(())
    }
}

/// Child process used by process pools.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IsolationConfig {
    /// Executable to run.
    pub program: String,
    /// Arguments placed before `<task> <type> <id>`.
    #[serde(default)]
    pub args: Vec<String>,
}

impl IsolationConfig {
    /// Validate the program name.
    pub fn validate(&self) -> Result<(), String> {
        if self.program.trim().is_empty() {
            return Err("isolation program must not be empty".into());
        }
        Ok(())
    }
}

/// Process-wide worker settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Base used to size the standard pools.
    pub base_concurrency: usize,
    /// Default drain timeout of the standard pools.
    pub close_timeout_ms: u64,
    /// Delay before an automatic retry of a failed task.
    pub error_retry_delay_ms: u64,
    /// Candidates sampled per `query_next_resource`.
    pub candidate_sample_size: usize,
    /// Child process for process pools.
    pub isolation: Option<IsolationConfig>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            base_concurrency: num_cpus::get(),
            close_timeout_ms: 30_000,
            error_retry_delay_ms: 600_000,
            candidate_sample_size: 100,
            isolation: None,
        }
    }
}

impl WorkerConfig {
    /// Retry delay as a `Duration`.
    #[must_use]
    pub const fn error_retry_delay(&self) -> Duration {
        Duration::from_millis(self.error_retry_delay_ms)
    }
}

/// Lock backend settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LockConfig {
    /// Lifetime of a lock entry whose owner never released it.
    pub ttl_secs: u64,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self { ttl_secs: 60 }
    }
}

impl LockConfig {
    /// TTL as a `Duration`.
    #[must_use]
    pub const fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

/// Root scheduler configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Map of pool id to configuration.
    pub pools: HashMap<String, PoolConfig>,
    /// Worker settings.
    #[serde(default)]
    pub worker: WorkerConfig,
    /// Lock settings.
    #[serde(default)]
    pub locks: LockConfig,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        let worker = WorkerConfig::default();
        Self::with_default_pools(worker, LockConfig::default())
    }
}

impl SchedulerConfig {
    /// The four standard pools sized from `worker.base_concurrency`.
    #[must_use]
    pub fn with_default_pools(worker: WorkerConfig, locks: LockConfig) -> Self {
        let base = worker.base_concurrency.max(1);
        let close = worker.close_timeout_ms;
        let pools = [
            (SHORT_PROCESSOR, PoolConfig::threads(1, base * 4)),
            (FILES_MANAGER, PoolConfig::threads(1, base * 2)),
            (FILES_PROCESSOR, PoolConfig::threads(base, 1)),
            (BATCH_PROCESSOR, PoolConfig::threads(1, base)),
        ]
        .into_iter()
        .map(|(id, cfg)| (id.to_owned(), cfg.with_close_timeout_ms(close)))
        .collect();
        Self { pools, worker, locks }
    }

    /// Validate all pools and ensure at least one pool exists.
    pub fn validate(&self) -> Result<(), String> {
        if self.pools.is_empty() {
            return Err("at least one pool must be defined".into());
        }
        if self.worker.base_concurrency == 0 {
            return Err("worker.base_concurrency must be greater than 0".into());
        }
        if self.worker.candidate_sample_size == 0 {
            return Err("worker.candidate_sample_size must be greater than 0".into());
        }
        if self.locks.ttl_secs == 0 {
            return Err("locks.ttl_secs must be greater than 0".into());
        }
        if let Some(isolation) = &self.worker.isolation {
            isolation.validate()?;
        }
        for (name, pool) in &self.pools {
            pool.validate().map_err(|e| format!("pool `{name}` invalid: {e}"))?;
            if pool.execution == PoolExecution::Process && self.worker.isolation.is_none() {
                return Err(format!("pool `{name}` runs processes but worker.isolation is not set"));
            }
        }
        Ok(())
    }

    /// Parse scheduler configuration from a JSON string and validate.
    pub fn from_json_str(input: &str) -> Result<Self, String> {
        let cfg: Self = serde_json::from_str(input).map_err(|e| format!("parse error: {e}"))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Standard pools configured from the environment.
    ///
    /// Loads `.env` when present, then reads `WORKER_BASE_CONCURRENCY`,
    /// `WORKER_CLOSE_TIMEOUT`, `WORKER_ERROR_RETRY_DELAY` (milliseconds) and
    /// `LOCKS_TTL` (seconds). Unset variables keep their defaults.
    pub fn from_env() -> Result<Self, String> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`SchedulerConfig::from_env`] with an explicit variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, String> {
        fn parse<T: std::str::FromStr>(key: &str, value: Option<String>) -> Result<Option<T>, String> {
            value
                .map(|v| v.trim().parse::<T>().map_err(|_| format!("{key} must be a number, got `{v}`")))
                .transpose()
        }

        let mut worker = WorkerConfig::default();
        let mut locks = LockConfig::default();
        if let Some(v) = parse("WORKER_BASE_CONCURRENCY", lookup("WORKER_BASE_CONCURRENCY"))? {
            worker.base_concurrency = v;
        }
        if let Some(v) = parse("WORKER_CLOSE_TIMEOUT", lookup("WORKER_CLOSE_TIMEOUT"))? {
            worker.close_timeout_ms = v;
        }
        if let Some(v) = parse("WORKER_ERROR_RETRY_DELAY", lookup("WORKER_ERROR_RETRY_DELAY"))? {
            worker.error_retry_delay_ms = v;
        }
        if let Some(v) = parse("LOCKS_TTL", lookup("LOCKS_TTL"))? {
            locks.ttl_secs = v;
        }

        let cfg = Self::with_default_pools(worker, locks);
        cfg.validate()?;
        Ok(cfg)
    }
}
