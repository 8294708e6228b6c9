//! Tests for the standard task registry and its filters

use chrono::Utc;
use pipeline_scheduler::config::{BATCH_PROCESSOR, FILES_MANAGER, FILES_PROCESSOR, SHORT_PROCESSOR};
use pipeline_scheduler::core::{standard_registry, Resource, ResourceType, StructuredFilter};
use serde_json::json;

#[test]
fn test_dataset_tasks_keep_registration_order() {
    let registry = standard_registry();
    let names: Vec<&str> = registry
        .list_tasks(ResourceType::Datasets)
        .iter()
        .map(|d| d.name())
        .collect();
    assert_eq!(
        names,
        [
            "initialize",
            "storeFile",
            "downloadFile",
            "normalizeFile",
            "analyzeCsv",
            "analyzeGeojson",
            "validateFile",
            "extend",
            "indexLines",
            "finalize",
            "exportRest",
            "publishDataset",
            "renewApiKey",
            "manageTTL",
            "autoUpdate",
            "errorRetry",
            "autoUpdateExtension",
        ]
    );
    assert_eq!(registry.list_tasks(ResourceType::Applications).len(), 1);
    assert_eq!(registry.list_tasks(ResourceType::Catalogs).len(), 1);
    assert_eq!(registry.len(), 19);
}

#[test]
fn test_registry_uses_the_standard_pools() {
    let registry = standard_registry();
    let pools: Vec<&str> = registry.pool_ids().into_iter().collect();
    assert_eq!(pools, [BATCH_PROCESSOR, FILES_MANAGER, FILES_PROCESSOR, SHORT_PROCESSOR]);
    assert_eq!(
        registry.task(ResourceType::Datasets, "finalize").map(|d| d.pool()),
        Some(SHORT_PROCESSOR)
    );
    assert_eq!(
        registry.task(ResourceType::Datasets, "finalize").and_then(|d| d.events_prefix()),
        Some("finalize")
    );
    assert!(registry.task(ResourceType::Catalogs, "finalize").is_none());
}

#[test]
fn test_pending_filter_sees_the_draft_track() {
    let registry = standard_registry();
    let now = Utc::now();
    let pending = StructuredFilter::or(
        registry
            .list_tasks(ResourceType::Datasets)
            .iter()
            .map(|d| d.state_predicate(now)),
    );

    let draft_in_progress = json!({"id": "d", "status": "finalized", "draft": {"status": "loaded"}});
    let draft_done = json!({"id": "d", "status": "finalized", "draft": {"status": "finalized"}});
    assert!(pending.matches(&draft_in_progress));
    assert!(!pending.matches(&draft_done));
}

#[test]
fn test_filters_survive_a_json_round_trip_to_the_store() {
    let registry = standard_registry();
    let now = Utc::now();
    let filter = registry
        .task(ResourceType::Datasets, "errorRetry")
        .expect("errorRetry registered")
        .state_predicate(now);

    let wire = serde_json::to_string(&filter).expect("serializable filter");
    let decoded: StructuredFilter = serde_json::from_str(&wire).expect("deserializable filter");
    assert_eq!(decoded, filter);

    let due = json!({"id": "d", "status": "error", "errorStatus": "analyzed", "errorRetry": "2000-01-01T00:00:00.000Z"});
    assert!(decoded.matches(&due));
}

#[test]
fn test_business_predicate_is_stricter_than_the_filter() {
    let registry = standard_registry();
    let now = Utc::now();
    let normalize = registry
        .task(ResourceType::Datasets, "normalizeFile")
        .expect("normalizeFile registered");

    // A virtual dataset passes the store filter but has no file to normalize.
    let doc = json!({"id": "d", "status": "stored", "isVirtual": true, "originalFile": {"mimetype": "application/zip"}});
    let resource = Resource::new(ResourceType::Datasets, doc.clone()).expect("valid resource");
    assert!(normalize.state_predicate(now).matches(&doc));
    assert!(!normalize.matches(&resource, now));
}
