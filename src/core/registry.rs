//! Task registry: the ordered task descriptors of every resource type.
//!
//! Built once at startup through [`TaskRegistryBuilder`] and then shared
//! read-only. Registration order is priority order: when several descriptors
//! match a resource, the first one wins.

use std::collections::{BTreeSet, HashMap};

use super::{ResourceType, TaskDescriptor};

/// Immutable registry of task descriptors per resource type.
#[derive(Debug, Clone, Default)]
pub struct TaskRegistry {
    tasks: HashMap<ResourceType, Vec<TaskDescriptor>>,
}

impl TaskRegistry {
    /// Start building a registry.
    #[must_use]
    pub fn builder() -> TaskRegistryBuilder {
        TaskRegistryBuilder::default()
    }

    /// Descriptors of `resource_type` in registration order.
    #[must_use]
    pub fn list_tasks(&self, resource_type: ResourceType) -> &[TaskDescriptor] {
        self.tasks.get(&resource_type).map_or(&[][..], Vec::as_slice)
    }

    /// Descriptor `name` of `resource_type`.
    #[must_use]
    pub fn task(&self, resource_type: ResourceType, name: &str) -> Option<&TaskDescriptor> {
        self.list_tasks(resource_type).iter().find(|d| d.name() == name)
    }

    /// Every pool id referenced by a descriptor, sorted.
    #[must_use]
    pub fn pool_ids(&self) -> BTreeSet<&str> {
        self.tasks.values().flatten().map(TaskDescriptor::pool).collect()
    }

    /// Total number of descriptors.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tasks.values().map(Vec::len).sum()
    }

    /// True when nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Collects descriptors before freezing them into a [`TaskRegistry`].
#[derive(Debug, Default)]
pub struct TaskRegistryBuilder {
    tasks: HashMap<ResourceType, Vec<TaskDescriptor>>,
}

impl TaskRegistryBuilder {
    /// Append `descriptor` to the tasks of `resource_type`.
    #[must_use]
    pub fn register(mut self, resource_type: ResourceType, descriptor: TaskDescriptor) -> Self {
        self.tasks.entry(resource_type).or_default().push(descriptor);
        self
    }

    /// Freeze the registry.
    #[must_use]
    pub fn build(self) -> TaskRegistry {
        TaskRegistry { tasks: self.tasks }
    }
}
