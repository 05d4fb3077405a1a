use std::collections::HashMap;
use std::sync::Arc;

use goflow_core::error::{GoflowError, Result};
use goflow_core::workflow::{EventType, WorkflowDefinition};

/// Registry of workflow definitions, one per event type.
///
/// Built once at startup and shared read-only afterwards.
#[derive(Debug, Clone, Default)]
pub struct WorkflowRegistry {
    by_event: HashMap<EventType, Arc<WorkflowDefinition>>,
}

impl WorkflowRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a definition. Each event type and definition ID may appear once.
    pub fn register(&mut self, definition: WorkflowDefinition) -> Result<()> {
        let event_type = definition.event_type();
        if let Some(existing) = self.by_event.get(&event_type) {
            return Err(GoflowError::Config(format!(
                "{} is already handled by workflow {}",
                event_type,
                existing.id()
            )));
        }
        if self.get_by_id(definition.id()).is_some() {
            return Err(GoflowError::Config(format!(
                "workflow {} is registered twice",
                definition.id()
            )));
        }

        tracing::debug!(
            definition = definition.id(),
            event_type = %event_type,
            instructions = definition.instructions().len(),
            "Registered workflow"
        );
        self.by_event.insert(event_type, Arc::new(definition));
        Ok(())
    }

    /// Get the definition handling an event type.
    pub fn get(&self, event_type: EventType) -> Option<Arc<WorkflowDefinition>> {
        self.by_event.get(&event_type).cloned()
    }

    /// Get a definition by its ID.
    pub fn get_by_id(&self, id: &str) -> Option<Arc<WorkflowDefinition>> {
        self.by_event.values().find(|d| d.id() == id).cloned()
    }

    /// Get all definition IDs.
    pub fn ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.by_event.values().map(|d| d.id()).collect();
        ids.sort_unstable();
        ids
    }

    pub fn len(&self) -> usize {
        self.by_event.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_event.is_empty()
    }
}
