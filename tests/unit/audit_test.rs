//! Tests for audit sink

use pipeline_scheduler::core::{build_audit_event, AuditSink, InMemoryAuditSink};

#[test]
fn test_in_memory_audit_sink() {
    let mut sink = InMemoryAuditSink::new(10);

    let event = build_audit_event(
        "datasets:d1",
        "finalize",
        "short-processor",
        "worker-1",
        "finalize-start",
        None,
    );

    sink.record(event.clone());
    assert_eq!(sink.events().len(), 1);

    let events = sink.events();
    assert_eq!(events[0], event);
    assert_eq!(events[0].resource, "datasets:d1");
    assert_eq!(events[0].action, "finalize-start");
}

#[test]
fn test_audit_sink_overflow() {
    let mut sink = InMemoryAuditSink::new(2);

    sink.record(build_audit_event("datasets:d1", "initialize", "files-manager", "w", "initialize-start", None));
    sink.record(build_audit_event("datasets:d1", "initialize", "files-manager", "w", "initialize-end", None));
    sink.record(build_audit_event("datasets:d1", "storeFile", "files-manager", "w", "store-start", None));

    let events = sink.events();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].action, "initialize-end"); // First one popped
    assert_eq!(events[1].action, "store-start");
}

#[test]
fn test_zero_capacity_sink_drops_everything() {
    let mut sink = InMemoryAuditSink::new(0);
    sink.record(build_audit_event("datasets:d1", "finalize", "p", "w", "finalize-start", None));
    assert!(sink.events().is_empty());
}

#[test]
fn test_build_audit_event() {
    let event = build_audit_event(
        "datasets:d1",
        "validateFile",
        "batch-processor",
        "worker-1",
        "validate-end",
        Some("task failed: schema mismatch".to_string()),
    );

    assert_eq!(event.task, "validateFile");
    assert_eq!(event.pool, "batch-processor");
    assert_eq!(event.owner, "worker-1");
    assert_eq!(event.payload.as_deref(), Some("task failed: schema mismatch"));
    assert!(event.created_at_ms > 0);
    assert_eq!(event.event_id.len(), 36);

    let other = build_audit_event("datasets:d1", "validateFile", "batch-processor", "worker-1", "validate-end", None);
    assert_ne!(event.event_id, other.event_id);
}
