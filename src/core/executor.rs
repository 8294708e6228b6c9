//! Task handler traits: the business logic a pool executes.
//!
//! The scheduler never looks inside a task. Each pool is built with one
//! [`TaskHandler`] that receives the resource and a [`TaskContext`] naming the
//! task to run, and is expected to move the resource to another pipeline state
//! as a side effect.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;

use super::{Resource, TaskContext, TaskError};

/// Executes the task bodies of one pool.
///
/// # Example
///
/// ```rust,ignore
/// use async_trait::async_trait;
/// use pipeline_scheduler::core::{Resource, TaskContext, TaskError, TaskHandler};
///
/// struct Finalizer;
///
/// #[async_trait]
/// impl TaskHandler for Finalizer {
///     async fn run(&self, resource: Resource, ctx: TaskContext) -> Result<(), TaskError> {
///         // compute metadata, then patch `status` to `finalized`
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait TaskHandler: Send + Sync + 'static {
    /// Run task `ctx.name` on `resource`.
    ///
    /// # Threading
    ///
    /// On a thread pool this is called from a dedicated worker thread with
    /// its own single-threaded tokio runtime, so CPU-heavy bodies do not
    /// block the scheduler's runtime.
    async fn run(&self, resource: Resource, ctx: TaskContext) -> Result<(), TaskError>;
}

/// Boxed future returned by routed task bodies.
pub type TaskFuture = Pin<Box<dyn Future<Output = Result<(), TaskError>> + Send>>;

/// Type-erased task body.
pub type TaskFn = Arc<dyn Fn(Resource, TaskContext) -> TaskFuture + Send + Sync>;

/// Handler dispatching on the task name, one body per name.
#[derive(Clone, Default)]
pub struct TaskRouter {
    routes: HashMap<String, TaskFn>,
}

impl TaskRouter {
    /// Empty router.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the body of task `name`, replacing any previous one.
    #[must_use]
    pub fn route<F, Fut>(mut self, name: impl Into<String>, body: F) -> Self
    where
        F: Fn(Resource, TaskContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), TaskError>> + Send + 'static,
    {
        let body: TaskFn = Arc::new(move |resource, ctx| Box::pin(body(resource, ctx)));
        self.routes.insert(name.into(), body);
        self
    }

    /// Names with a registered body.
    #[must_use]
    pub fn task_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.routes.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

#[async_trait]
impl TaskHandler for TaskRouter {
    async fn run(&self, resource: Resource, ctx: TaskContext) -> Result<(), TaskError> {
        let Some(body) = self.routes.get(&ctx.name).cloned() else {
            return Err(TaskError::UnknownTask(ctx.name));
        };
        body(resource, ctx).await
    }
}
