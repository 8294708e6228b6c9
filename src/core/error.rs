//! Error types for scheduler operations.

use thiserror::Error;

use super::worker_pool::PoolError;

/// Prefix a task failure message carries when retrying cannot help.
pub const NO_RETRY_PREFIX: &str = "[noretry] ";

/// Errors produced by scheduler components.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// A descriptor or caller referenced a pool that is not configured.
    #[error("unknown pool `{0}`")]
    UnknownPool(String),
    /// The resource document store failed.
    #[error("store error: {0}")]
    Store(String),
    /// The lock backend failed (not a contended lock, which is `Ok(false)`).
    #[error("lock error: {0}")]
    Lock(String),
    /// A task handler or its pool raised while processing a resource.
    #[error("task `{task}` failed on {resource}: {source}")]
    Task {
        /// Descriptor name.
        task: String,
        /// `"<type>:<id>"` of the processed resource.
        resource: String,
        /// Failure reported by the pool.
        source: PoolError,
    },
    /// Configuration rejected by validation.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// Backend-specific failure with context.
    #[error("backend error: {0}")]
    Backend(String),
}

/// Errors raised by task handlers, the business logic behind a descriptor.
#[derive(Debug, Error)]
pub enum TaskError {
    /// The pool's handler has no body for the requested task name.
    #[error("unknown task `{0}`")]
    UnknownTask(String),
    /// The task body failed with a message.
    #[error("{0}")]
    Failed(String),
    /// An isolated task process exited unsuccessfully.
    #[error("task process exited with {status}: {stderr}")]
    Process {
        /// Rendered exit status.
        status: String,
        /// Relevant stderr lines of the child process.
        stderr: String,
    },
    /// Any other failure bubbled up from handler internals.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl TaskError {
    /// Build a `Failed` error from a message.
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }

    /// True when the message says retrying cannot succeed.
    #[must_use]
    pub fn is_no_retry(&self) -> bool {
        match self {
            Self::Process { stderr, .. } => stderr.starts_with(NO_RETRY_PREFIX),
            other => other.to_string().starts_with(NO_RETRY_PREFIX),
        }
    }
}

/// Application-facing result using anyhow for higher-level contexts.
pub type AppResult<T> = Result<T, anyhow::Error>;
