//! In-memory resource store for development and tests.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::{Map, Value};

use crate::core::{Patch, Resource, ResourceStore, ResourceType, SchedulerError, StructuredFilter};

/// Documents by type, then id. Candidate queries scan in id order.
#[derive(Default)]
pub struct InMemoryResourceStore {
    documents: RwLock<HashMap<ResourceType, BTreeMap<String, Value>>>,
}

impl InMemoryResourceStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a resource.
    pub fn insert(&self, resource: Resource) {
        let resource_type = resource.resource_type();
        let id = resource.id().to_owned();
        self.documents
            .write()
            .entry(resource_type)
            .or_default()
            .insert(id, resource.into_document());
    }

    /// Insert or replace a raw document.
    ///
    /// # Errors
    ///
    /// `SchedulerError::Store` when the document has no string `id`.
    pub fn insert_document(&self, resource_type: ResourceType, document: Value) -> Result<(), SchedulerError> {
        let resource = Resource::new(resource_type, document).map_err(|e| SchedulerError::Store(e.to_string()))?;
        self.insert(resource);
        Ok(())
    }

    /// Remove a resource, returning its document.
    pub fn remove(&self, resource_type: ResourceType, id: &str) -> Option<Value> {
        self.documents.write().get_mut(&resource_type)?.remove(id)
    }

    /// Current document of a resource.
    #[must_use]
    pub fn document(&self, resource_type: ResourceType, id: &str) -> Option<Value> {
        self.documents.read().get(&resource_type)?.get(id).cloned()
    }

    /// Number of stored resources of a type.
    #[must_use]
    pub fn len(&self, resource_type: ResourceType) -> usize {
        self.documents.read().get(&resource_type).map_or(0, BTreeMap::len)
    }
}

#[async_trait]
impl ResourceStore for InMemoryResourceStore {
    async fn fetch(&self, resource_type: ResourceType, id: &str) -> Result<Option<Resource>, SchedulerError> {
        self.document(resource_type, id)
            .map(|doc| Resource::new(resource_type, doc))
            .transpose()
    }

    async fn find_candidates(
        &self,
        resource_type: ResourceType,
        filter: &StructuredFilter,
        limit: usize,
    ) -> Result<Vec<String>, SchedulerError> {
        let documents = self.documents.read();
        let Some(docs) = documents.get(&resource_type) else {
            return Ok(Vec::new());
        };
        Ok(docs
            .iter()
            .filter(|(_, doc)| filter.matches(doc))
            .map(|(id, _)| id.clone())
            .take(limit)
            .collect())
    }

    async fn apply_patch(
        &self,
        resource_type: ResourceType,
        id: &str,
        patch: &Patch,
    ) -> Result<Option<Resource>, SchedulerError> {
        if patch.contains_key("id") {
            return Err(SchedulerError::Store(format!("cannot patch the id of {resource_type}:{id}")));
        }
        let mut documents = self.documents.write();
        let Some(doc) = documents.get_mut(&resource_type).and_then(|docs| docs.get_mut(id)) else {
            return Ok(None);
        };
        for (path, value) in patch {
            set_path(doc, path, value.clone());
        }
        Resource::new(resource_type, doc.clone()).map(Some)
    }
}

/// Set the dotted `path` of `doc`, creating intermediate objects. A `null`
/// value removes the field.
fn set_path(doc: &mut Value, path: &str, value: Value) {
    let (parents, last) = path.rsplit_once('.').map_or((None, path), |(p, l)| (Some(p), l));

    let mut current = doc;
    for segment in parents.into_iter().flat_map(|p| p.split('.')) {
        let Value::Object(map) = current else {
            return;
        };
        if value.is_null() {
            let Some(child) = map.get_mut(segment) else {
                return;
            };
            current = child;
        } else {
            let child = map.entry(segment).or_insert_with(|| Value::Object(Map::new()));
            if !child.is_object() {
                *child = Value::Object(Map::new());
            }
            current = child;
        }
    }

    if let Value::Object(map) = current {
        if value.is_null() {
            map.remove(last);
        } else {
            map.insert(last.to_owned(), value);
        }
    }
}
