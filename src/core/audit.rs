//! Audit sink implementations.
//!
//! The scheduler records `<prefix>-start` / `<prefix>-end` events around
//! tasks whose descriptor declares an events prefix.

use std::collections::VecDeque;

use serde::Serialize;

use crate::util::clock::now_ms;

/// Audit event structure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuditEvent {
    /// Event identifier.
    pub event_id: String,
    /// `"<type>:<id>"` of the processed resource.
    pub resource: String,
    /// Task name.
    pub task: String,
    /// Pool identifier.
    pub pool: String,
    /// Lock owner of the scheduler.
    pub owner: String,
    /// Event type, e.g. `finalize-start`.
    pub action: String,
    /// Timestamp milliseconds.
    pub created_at_ms: u128,
    /// Additional context (error message of a failed task).
    pub payload: Option<String>,
}

/// Audit sink abstraction.
pub trait AuditSink: Send {
    /// Record an audit event.
    fn record(&mut self, event: AuditEvent);
}

/// In-memory audit sink for testing and dev.
pub struct InMemoryAuditSink {
    events: VecDeque<AuditEvent>,
    max_events: usize,
}

impl InMemoryAuditSink {
    /// Create a new in-memory sink with a bounded buffer.
    #[must_use]
    pub fn new(max_events: usize) -> Self {
        Self {
            events: VecDeque::with_capacity(max_events),
            max_events,
        }
    }

    /// Retrieve a snapshot of stored events.
    #[must_use]
    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.iter().cloned().collect()
    }
}

impl AuditSink for InMemoryAuditSink {
    fn record(&mut self, event: AuditEvent) {
        if self.max_events == 0 {
            return;
        }
        if self.events.len() >= self.max_events {
            self.events.pop_front();
        }
        self.events.push_back(event);
    }
}

/// Helper to build an audit event from context.
pub fn build_audit_event(
    resource: impl Into<String>,
    task: impl Into<String>,
    pool: impl Into<String>,
    owner: impl Into<String>,
    action: impl Into<String>,
    payload: Option<String>,
) -> AuditEvent {
    AuditEvent {
        event_id: uuid::Uuid::new_v4().to_string(),
        resource: resource.into(),
        task: task.into(),
        pool: pool.into(),
        owner: owner.into(),
        action: action.into(),
        created_at_ms: now_ms(),
        payload,
    }
}
