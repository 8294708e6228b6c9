//! Resource documents and their pipeline state.
//!
//! A resource is kept as its raw JSON document: tasks patch arbitrary fields,
//! and the scheduler only ever reads a handful of them (`status`,
//! `draft.status`, the error fields and a few maintenance timers).

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::SchedulerError;

/// Field marking a document as the draft overlay of a resource.
pub const DRAFT_VIEW_FIELD: &str = "_draftView";

/// Kinds of long-lived resources the scheduler drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceType {
    /// Datasets, the only type with a full processing pipeline.
    Datasets,
    /// Applications (publication only).
    Applications,
    /// Catalogs (harvesting only).
    Catalogs,
}

impl ResourceType {
    /// Every resource type, in polling order.
    pub const ALL: [Self; 3] = [Self::Datasets, Self::Applications, Self::Catalogs];

    /// Collection-style name used in lock keys and logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Datasets => "datasets",
            Self::Applications => "applications",
            Self::Catalogs => "catalogs",
        }
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceType {
    type Err = SchedulerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "datasets" | "dataset" => Ok(Self::Datasets),
            "applications" | "application" => Ok(Self::Applications),
            "catalogs" | "catalog" => Ok(Self::Catalogs),
            other => Err(SchedulerError::Backend(format!("unknown resource type `{other}`"))),
        }
    }
}

/// Identity of a resource, rendered `"<type>:<id>"` for locks and bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceKey {
    /// Resource type.
    pub resource_type: ResourceType,
    /// Resource id within its type.
    pub id: String,
}

impl ResourceKey {
    /// Build a key.
    pub fn new(resource_type: ResourceType, id: impl Into<String>) -> Self {
        Self {
            resource_type,
            id: id.into(),
        }
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.resource_type, self.id)
    }
}

/// Position of a resource (or of its draft) in the processing pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PipelineStatus {
    /// Freshly created by the API layer.
    Created,
    /// Source file uploaded or downloaded, not yet stored.
    Loaded,
    /// Declared from a remote source, file still to download.
    Imported,
    /// File copied to storage.
    Stored,
    /// File converted to a basic format.
    Normalized,
    /// Schema inferred.
    Analyzed,
    /// Validation rules changed, data must be validated again.
    ValidationUpdated,
    /// Data checked against the schema.
    Validated,
    /// REST dataset whose lines changed.
    Updated,
    /// Extensions computed.
    Extended,
    /// REST dataset whose extensions changed.
    ExtendedUpdated,
    /// Lines indexed in the search backend.
    Indexed,
    /// Terminal success state.
    Finalized,
    /// Absorbing failure state, see `errorStatus` / `errorRetry`.
    Error,
}

impl PipelineStatus {
    /// Wire name of the status.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Loaded => "loaded",
            Self::Imported => "imported",
            Self::Stored => "stored",
            Self::Normalized => "normalized",
            Self::Analyzed => "analyzed",
            Self::ValidationUpdated => "validation-updated",
            Self::Validated => "validated",
            Self::Updated => "updated",
            Self::Extended => "extended",
            Self::ExtendedUpdated => "extended-updated",
            Self::Indexed => "indexed",
            Self::Finalized => "finalized",
            Self::Error => "error",
        }
    }

    /// `finalized` and `error` end the pipeline.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Finalized | Self::Error)
    }
}

impl fmt::Display for PipelineStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PipelineStatus {
    type Err = SchedulerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let status = match s {
            "created" => Self::Created,
            "loaded" => Self::Loaded,
            "imported" => Self::Imported,
            "stored" => Self::Stored,
            "normalized" => Self::Normalized,
            "analyzed" => Self::Analyzed,
            "validation-updated" => Self::ValidationUpdated,
            "validated" => Self::Validated,
            "updated" => Self::Updated,
            "extended" => Self::Extended,
            "extended-updated" => Self::ExtendedUpdated,
            "indexed" => Self::Indexed,
            "finalized" => Self::Finalized,
            "error" => Self::Error,
            other => {
                return Err(SchedulerError::Backend(format!(
                    "unknown pipeline status `{other}`"
                )))
            }
        };
        Ok(status)
    }
}

impl From<PipelineStatus> for Value {
    fn from(status: PipelineStatus) -> Self {
        Self::String(status.as_str().to_string())
    }
}

/// Follow a dotted path through nested objects. Arrays are not traversed.
#[must_use]
pub fn lookup<'a>(document: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.')
        .try_fold(document, |current, segment| current.get(segment))
        .filter(|value| !value.is_null())
}

/// A resource document tagged with its type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    resource_type: ResourceType,
    document: Value,
}

impl Resource {
    /// Wrap a document. It must be a JSON object carrying a string `id`.
    ///
    /// # Errors
    ///
    /// Returns `SchedulerError::Store` when the document has no usable id.
    pub fn new(resource_type: ResourceType, document: Value) -> Result<Self, SchedulerError> {
        let has_id = matches!(document.get("id"), Some(Value::String(id)) if !id.is_empty());
        if !has_id {
            return Err(SchedulerError::Store(format!(
                "{resource_type} document without a string id"
            )));
        }
        Ok(Self {
            resource_type,
            document,
        })
    }

    /// Resource id.
    #[must_use]
    pub fn id(&self) -> &str {
        self.document
            .get("id")
            .and_then(Value::as_str)
            .unwrap_or_default()
    }

    /// Resource type.
    #[must_use]
    pub const fn resource_type(&self) -> ResourceType {
        self.resource_type
    }

    /// Lock/bookkeeping key of the resource.
    #[must_use]
    pub fn key(&self) -> ResourceKey {
        ResourceKey::new(self.resource_type, self.id())
    }

    /// Raw document.
    #[must_use]
    pub const fn document(&self) -> &Value {
        &self.document
    }

    /// Mutable raw document.
    pub fn document_mut(&mut self) -> &mut Value {
        &mut self.document
    }

    /// Consume the resource, returning its document.
    #[must_use]
    pub fn into_document(self) -> Value {
        self.document
    }

    /// Value at a dotted path, `None` when absent or null.
    #[must_use]
    pub fn get(&self, path: &str) -> Option<&Value> {
        lookup(&self.document, path)
    }

    /// String at a dotted path.
    #[must_use]
    pub fn str_at(&self, path: &str) -> Option<&str> {
        self.get(path).and_then(Value::as_str)
    }

    /// True when the path holds boolean `true`.
    #[must_use]
    pub fn flag(&self, path: &str) -> bool {
        self.get(path).and_then(Value::as_bool).unwrap_or(false)
    }

    /// Elements of the array at `path`, empty when absent.
    #[must_use]
    pub fn array(&self, path: &str) -> &[Value] {
        self.get(path)
            .and_then(Value::as_array)
            .map_or(&[][..], Vec::as_slice)
    }

    /// Main-track status. Unknown strings read as `None`.
    #[must_use]
    pub fn status(&self) -> Option<PipelineStatus> {
        self.str_at("status").and_then(|s| s.parse().ok())
    }

    /// Draft-track status.
    #[must_use]
    pub fn draft_status(&self) -> Option<PipelineStatus> {
        self.str_at("draft.status").and_then(|s| s.parse().ok())
    }

    /// True when the main status equals `status`.
    #[must_use]
    pub fn status_is(&self, status: PipelineStatus) -> bool {
        self.str_at("status") == Some(status.as_str())
    }

    /// Stage recorded when the resource last failed.
    #[must_use]
    pub fn error_status(&self) -> Option<PipelineStatus> {
        self.str_at("errorStatus").and_then(|s| s.parse().ok())
    }

    /// Next permitted automatic retry, as stored.
    #[must_use]
    pub fn error_retry(&self) -> Option<&str> {
        self.str_at("errorRetry")
    }

    /// A draft exists and still has pipeline work ahead of it.
    #[must_use]
    pub fn has_active_draft(&self) -> bool {
        matches!(self.get("draft"), Some(Value::Object(_)))
            && self
                .str_at("draft.status")
                .is_some_and(|s| s != "finalized" && s != "error")
    }

    /// True when this value is the draft overlay rather than the main view.
    #[must_use]
    pub fn is_draft_view(&self) -> bool {
        self.flag(DRAFT_VIEW_FIELD)
    }

    /// MIME type of the current data file.
    #[must_use]
    pub fn file_mimetype(&self) -> Option<&str> {
        self.str_at("file.mimetype")
    }

    /// True for REST (editable lines) datasets.
    #[must_use]
    pub fn is_rest(&self) -> bool {
        self.flag("isRest")
    }
}
