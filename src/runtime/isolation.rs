//! Child side of the process pool.
//!
//! A binary configured as `IsolationConfig::program` calls [`run_isolated`]
//! when it is started with `MODE=task`: it loads the resource, runs the one
//! task and exits non-zero with the error on stderr when the task fails.

use anyhow::{bail, Context};
use tracing::info;

use crate::core::{AppResult, DraftMergeAdapter, ResourceStore, ResourceType, TaskContext, TaskHandler};

/// One task invocation read from the command line and environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IsolatedInvocation {
    /// Task name.
    pub task: String,
    /// Resource type.
    pub resource_type: ResourceType,
    /// Resource id.
    pub id: String,
    /// Run against the draft overlay (`DATASET_DRAFT=true`).
    pub draft: bool,
    /// Pool that spawned the process (`TASK_POOL`).
    pub pool: String,
    /// Lock owner of the parent scheduler (`TASK_OWNER`).
    pub owner: String,
}

impl IsolatedInvocation {
    /// Parse the last three arguments `<task> <type> <id>` and read the
    /// process environment.
    ///
    /// # Errors
    ///
    /// Missing arguments or an unknown resource type.
    pub fn from_args<I>(args: I) -> AppResult<Self>
    where
        I: IntoIterator<Item = String>,
    {
        Self::from_parts(args, |name| std::env::var(name).ok())
    }

    /// Like [`IsolatedInvocation::from_args`] with an explicit environment.
    ///
    /// # Errors
    ///
    /// Missing arguments or an unknown resource type.
    pub fn from_parts<I>(args: I, env: impl Fn(&str) -> Option<String>) -> AppResult<Self>
    where
        I: IntoIterator<Item = String>,
    {
        let args: Vec<String> = args.into_iter().collect();
        let [.., task, resource_type, id] = args.as_slice() else {
            bail!("expected `<task> <type> <id>` arguments, got {args:?}");
        };
        let resource_type = resource_type.parse::<ResourceType>()?;
        Ok(Self {
            task: task.clone(),
            resource_type,
            id: id.clone(),
            draft: env("DATASET_DRAFT").is_some_and(|v| v == "true"),
            pool: env("TASK_POOL").unwrap_or_else(|| "isolated".to_owned()),
            owner: env("TASK_OWNER").unwrap_or_else(|| format!("task-{}", std::process::id())),
        })
    }
}

/// Run the invoked task once.
///
/// # Errors
///
/// The resource is missing, the draft cannot be overlaid or the task failed.
pub async fn run_isolated(
    invocation: &IsolatedInvocation,
    store: &dyn ResourceStore,
    drafts: &dyn DraftMergeAdapter,
    handler: &dyn TaskHandler,
) -> AppResult<()> {
    let key = format!("{}:{}", invocation.resource_type, invocation.id);
    let mut resource = store
        .fetch(invocation.resource_type, &invocation.id)
        .await?
        .with_context(|| format!("resource {key} not found"))?;
    if invocation.draft {
        resource = drafts.merge_draft(resource).await?;
    }

    let ctx = TaskContext::new(&invocation.task, &resource, &invocation.pool, &invocation.owner);
    info!(resource = %key, task = %invocation.task, draft = invocation.draft, "running isolated task");
    handler.run(resource, ctx).await?;
    Ok(())
}
