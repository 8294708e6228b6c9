//! Error and retry conventions shared by task handlers.
//!
//! The scheduler never mutates a resource on failure. Handlers that follow
//! the usual convention use [`ErrorRetryPolicy`] to build the patch they write
//! before raising, and the `errorRetry` task uses [`ErrorRetryPolicy::retry_patch`]
//! to put the resource back on its pipeline stage.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::config::WorkerConfig;
use crate::util::clock::to_iso;

use super::{Patch, PipelineStatus, Resource, NO_RETRY_PREFIX};

/// What a handler writes when a task fails.
#[derive(Debug, Clone, PartialEq)]
pub struct Failure {
    /// Fields to set on the resource.
    pub patch: Patch,
    /// Message for the journal, without the `[noretry] ` prefix.
    pub message: String,
    /// An automatic retry is scheduled.
    pub retry: bool,
}

/// Builds failure and retry patches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ErrorRetryPolicy {
    delay: Duration,
}

impl Default for ErrorRetryPolicy {
    fn default() -> Self {
        Self::new(Duration::from_secs(600))
    }
}

impl From<&WorkerConfig> for ErrorRetryPolicy {
    fn from(worker: &WorkerConfig) -> Self {
        Self::new(worker.error_retry_delay())
    }
}

impl ErrorRetryPolicy {
    /// Retry `delay` after a failure. A zero delay disables retries.
    #[must_use]
    pub const fn new(delay: Duration) -> Self {
        Self { delay }
    }

    /// Delay before the automatic retry.
    #[must_use]
    pub const fn delay(&self) -> Duration {
        self.delay
    }

    /// Patch moving `resource` to `error` after a failure with `message`.
    ///
    /// Writes on the draft track when `resource` is a draft view.
    #[must_use]
    pub fn failure(&self, resource: &Resource, message: &str, now: DateTime<Utc>) -> Failure {
        let (message, no_retry) = message
            .strip_prefix(NO_RETRY_PREFIX)
            .map_or((message, false), |rest| (rest, true));
        let retry = !no_retry && !self.delay.is_zero();

        // A failing retry keeps the stage it was retrying.
        let stage = match resource.status() {
            Some(PipelineStatus::Error) | None => resource.error_status(),
            status => status,
        };

        let prefix = if resource.is_draft_view() { "draft." } else { "" };
        let mut patch = Patch::new();
        patch.insert(format!("{prefix}status"), PipelineStatus::Error.into());
        patch.insert(format!("{prefix}errorStatus"), stage.map_or(Value::Null, Value::from));
        let next = chrono::Duration::from_std(self.delay)
            .ok()
            .and_then(|d| now.checked_add_signed(d))
            .filter(|_| retry);
        patch.insert(
            format!("{prefix}errorRetry"),
            next.map_or(Value::Null, |at| Value::String(to_iso(at))),
        );

        Failure {
            patch,
            message: message.to_owned(),
            retry: next.is_some(),
        }
    }

    /// Patch putting a failed resource back on the stage it failed in.
    ///
    /// `None` when neither track of `resource` is in error.
    #[must_use]
    pub fn retry_patch(resource: &Resource) -> Option<Patch> {
        let prefix = if resource.status_is(PipelineStatus::Error) {
            ""
        } else if resource.str_at("draft.status") == Some(PipelineStatus::Error.as_str()) {
            "draft."
        } else {
            return None;
        };
        let stage = resource.get(&format!("{prefix}errorStatus")).cloned()?;

        let mut patch = Patch::new();
        patch.insert(format!("{prefix}status"), stage);
        patch.insert(format!("{prefix}errorStatus"), Value::Null);
        patch.insert(format!("{prefix}errorRetry"), Value::Null);
        Some(patch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ResourceType;
    use serde_json::json;

    fn at(s: &str) -> DateTime<Utc> {
        s.parse().unwrap()
    }

    #[test]
    fn failure_schedules_retry() {
        let r = Resource::new(ResourceType::Datasets, json!({"id": "d", "status": "analyzed"})).unwrap();
        let f = ErrorRetryPolicy::new(Duration::from_secs(600)).failure(&r, "boom", at("2024-01-01T00:00:00Z"));
        assert!(f.retry);
        assert_eq!(f.message, "boom");
        assert_eq!(f.patch["status"], json!("error"));
        assert_eq!(f.patch["errorStatus"], json!("analyzed"));
        assert_eq!(f.patch["errorRetry"], json!("2024-01-01T00:10:00.000Z"));
    }

    #[test]
    fn delay_comes_from_worker_config() {
        let worker = WorkerConfig {
            error_retry_delay_ms: 90_000,
            ..WorkerConfig::default()
        };
        let policy = ErrorRetryPolicy::from(&worker);
        assert_eq!(policy.delay(), Duration::from_secs(90));
        assert_eq!(ErrorRetryPolicy::from(&WorkerConfig::default()), ErrorRetryPolicy::default());

        let r = Resource::new(ResourceType::Datasets, json!({"id": "d", "status": "stored"})).unwrap();
        let f = policy.failure(&r, "boom", at("2024-01-01T00:00:00Z"));
        assert_eq!(f.patch["errorRetry"], json!("2024-01-01T00:01:30.000Z"));
    }

    #[test]
    fn no_retry_prefix_is_stripped() {
        let r = Resource::new(ResourceType::Datasets, json!({"id": "d", "status": "stored"})).unwrap();
        let f = ErrorRetryPolicy::default().failure(&r, "[noretry] bad file", Utc::now());
        assert!(!f.retry);
        assert_eq!(f.message, "bad file");
        assert_eq!(f.patch["errorRetry"], Value::Null);
    }

    #[test]
    fn draft_failures_go_to_the_draft_track() {
        let r = Resource::new(
            ResourceType::Datasets,
            json!({"id": "d", "status": "analyzed", "_draftView": true}),
        )
        .unwrap();
        let f = ErrorRetryPolicy::new(Duration::ZERO).failure(&r, "boom", Utc::now());
        assert!(!f.retry);
        assert_eq!(f.patch["draft.status"], json!("error"));
        assert_eq!(f.patch["draft.errorStatus"], json!("analyzed"));
    }

    #[test]
    fn retry_patch_restores_stage() {
        let r = Resource::new(
            ResourceType::Datasets,
            json!({"id": "d", "status": "error", "errorStatus": "validated", "errorRetry": "2024-01-01T00:00:00.000Z"}),
        )
        .unwrap();
        let patch = ErrorRetryPolicy::retry_patch(&r).unwrap();
        assert_eq!(patch["status"], json!("validated"));
        assert_eq!(patch["errorStatus"], Value::Null);

        let draft = Resource::new(
            ResourceType::Datasets,
            json!({"id": "d", "status": "finalized", "draft": {"status": "error", "errorStatus": "analyzed"}}),
        )
        .unwrap();
        assert_eq!(ErrorRetryPolicy::retry_patch(&draft).unwrap()["draft.status"], json!("analyzed"));

        let fine = Resource::new(ResourceType::Datasets, json!({"id": "d", "status": "finalized"})).unwrap();
        assert!(ErrorRetryPolicy::retry_patch(&fine).is_none());
    }
}
