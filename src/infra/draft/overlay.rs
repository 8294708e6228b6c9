//! Draft overlay: presents a resource with an active draft as its draft.

use async_trait::async_trait;
use serde_json::Value;

use crate::core::{DraftMergeAdapter, Resource, SchedulerError, DRAFT_VIEW_FIELD};

/// Copies every field of `draft` over the main fields, drops `draft` and
/// marks the result with `_draftView: true`.
///
/// Main fields the draft does not redefine (`file` uploaded before the
/// revision, API keys, publications) stay visible.
#[derive(Debug, Clone, Copy, Default)]
pub struct DraftOverlay;

impl DraftOverlay {
    /// Draft view of `resource`.
    ///
    /// # Errors
    ///
    /// `SchedulerError::Backend` when the resource has no draft object.
    pub fn overlay(resource: Resource) -> Result<Resource, SchedulerError> {
        let resource_type = resource.resource_type();
        let id = resource.id().to_owned();
        let mut document = resource.into_document();
        let Some(Value::Object(draft)) = document.as_object_mut().and_then(|doc| doc.remove("draft")) else {
            return Err(SchedulerError::Backend(format!("{resource_type}:{id} has no draft")));
        };
        if let Value::Object(doc) = &mut document {
            doc.extend(draft.into_iter().filter(|(key, _)| key != "id"));
            doc.insert(DRAFT_VIEW_FIELD.to_owned(), Value::Bool(true));
        }
        Resource::new(resource_type, document)
    }
}

#[async_trait]
impl DraftMergeAdapter for DraftOverlay {
    async fn merge_draft(&self, resource: Resource) -> Result<Resource, SchedulerError> {
        Self::overlay(resource)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{PipelineStatus, ResourceType};
    use serde_json::json;

    #[test]
    fn draft_fields_win() {
        let r = Resource::new(
            ResourceType::Datasets,
            json!({
                "id": "d", "status": "finalized", "file": {"mimetype": "text/csv"},
                "draft": {"status": "analyzed", "draftReason": {"key": "file-updated"}}
            }),
        )
        .unwrap();
        let view = DraftOverlay::overlay(r).unwrap();
        assert!(view.is_draft_view());
        assert_eq!(view.status(), Some(PipelineStatus::Analyzed));
        assert_eq!(view.file_mimetype(), Some("text/csv"));
        assert!(view.get("draft").is_none());
        assert!(view.get("draftReason").is_some());
        assert_eq!(view.id(), "d");
    }

    #[test]
    fn no_draft_is_an_error() {
        let r = Resource::new(ResourceType::Datasets, json!({"id": "d"})).unwrap();
        assert!(DraftOverlay::overlay(r).is_err());
    }
}
