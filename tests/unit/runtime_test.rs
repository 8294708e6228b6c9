//! Tests for the isolated task entry point

use pipeline_scheduler::core::{ResourceType, TaskError, TaskRouter};
use pipeline_scheduler::infra::{DraftOverlay, InMemoryResourceStore};
use pipeline_scheduler::runtime::{run_isolated, IsolatedInvocation};
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

fn args(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| (*s).to_string()).collect()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_isolated_invocation_runs_one_task() {
    let store = InMemoryResourceStore::new();
    store
        .insert_document(ResourceType::Applications, json!({"id": "app1", "publications": []}))
        .unwrap();

    let runs = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&runs);
    let router = TaskRouter::new().route("publishApplication", move |resource, ctx| {
        let counter = Arc::clone(&counter);
        async move {
            assert_eq!(resource.id(), "app1");
            assert_eq!(ctx.resource_type, ResourceType::Applications);
            assert_eq!(ctx.owner, "worker-parent");
            assert!(!ctx.draft);
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    });

    let invocation = IsolatedInvocation::from_parts(args(&["publishApplication", "application", "app1"]), |name| {
        (name == "TASK_OWNER").then(|| "worker-parent".to_string())
    })
    .expect("valid invocation");
    run_isolated(&invocation, &store, &DraftOverlay, &router)
        .await
        .expect("task succeeds");
    assert_eq!(runs.load(Ordering::SeqCst), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_isolated_invocation_reports_unknown_task() {
    let store = InMemoryResourceStore::new();
    store
        .insert_document(ResourceType::Catalogs, json!({"id": "c1"}))
        .unwrap();
    let invocation = IsolatedInvocation::from_parts(args(&["harvest", "catalogs", "c1"]), |_| None).unwrap();

    let err = run_isolated(&invocation, &store, &DraftOverlay, &TaskRouter::new())
        .await
        .unwrap_err();
    let task_err = err.downcast_ref::<TaskError>().expect("task error");
    assert!(matches!(task_err, TaskError::UnknownTask(name) if name == "harvest"));
}
