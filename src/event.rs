//! Entity lifecycle events consumed by the entity manager's observer registry.

use crate::component::ComponentTag;
use crate::entity::EntityId;
use crate::error::{EcsError, Result};

/// Entity lifecycle events that trigger observers
#[derive(Clone, Debug)]
pub enum EntityEvent {
    /// Entity was spawned (created)
    Spawned(EntityId),

    /// Entity was despawned (destroyed)
    Despawned(EntityId),

    /// Component was added to entity
    ComponentAdded(EntityId, ComponentTag),

    /// Component was removed from entity
    ComponentRemoved(EntityId, ComponentTag),

    /// Custom event (name, entity_id, data)
    Custom(String, EntityId, Vec<u8>),

    /// An entity's parent changed (child, old_parent, new_parent)
    ParentChanged(EntityId, Option<EntityId>, EntityId),
}

impl EntityEvent {
    /// Get the entity involved in this event
    pub fn entity_id(&self) -> EntityId {
        match self {
            EntityEvent::Spawned(id) => *id,
            EntityEvent::Despawned(id) => *id,
            EntityEvent::ComponentAdded(id, _) => *id,
            EntityEvent::ComponentRemoved(id, _) => *id,
            EntityEvent::Custom(_, id, _) => *id,
            EntityEvent::ParentChanged(id, _, _) => *id,
        }
    }

    /// Get event type name for debugging
    pub fn event_type(&self) -> &str {
        match self {
            EntityEvent::Spawned(_) => "Spawned",
            EntityEvent::Despawned(_) => "Despawned",
            EntityEvent::ComponentAdded(_, _) => "ComponentAdded",
            EntityEvent::ComponentRemoved(_, _) => "ComponentRemoved",
            EntityEvent::Custom(name, _, _) => name,
            EntityEvent::ParentChanged(_, _, _) => "ParentChanged",
        }
    }
}

/// Event queue for deferred lifecycle-event processing.
pub struct EventQueue {
    events: std::collections::VecDeque<EntityEvent>,
    capacity: usize,
}

impl EventQueue {
    /// Create new event queue
    pub fn new() -> Self {
        Self::with_capacity(1024)
    }

    /// Create with specific capacity
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            events: std::collections::VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Add event to queue. Returns `QueueFull` once capacity is reached rather than
    /// silently dropping the event.
    pub fn push(&mut self, event: EntityEvent) -> Result<()> {
        if self.events.len() >= self.capacity {
            return Err(EcsError::QueueFull);
        }
        self.events.push_back(event);
        Ok(())
    }

    /// Get next event
    pub fn pop(&mut self) -> Option<EntityEvent> {
        self.events.pop_front()
    }

    /// Check if queue is empty
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Clear all events
    pub fn clear(&mut self) {
        self.events.clear();
    }

    /// Get number of pending events
    pub fn len(&self) -> usize {
        self.events.len()
    }
}

impl Default for EventQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::EntityId;

    #[test]
    fn test_event_queue_push_pop() {
        let mut queue = EventQueue::new();
        let id = EntityId::default();

        queue.push(EntityEvent::Spawned(id)).unwrap();
        assert!(!queue.is_empty());

        let event = queue.pop();
        assert!(event.is_some());
        assert!(queue.is_empty());
    }

    #[test]
    fn test_event_entity_id() {
        let id = EntityId::default();
        let event = EntityEvent::Spawned(id);
        assert_eq!(event.entity_id(), id);
    }

    #[test]
    fn queue_full_is_reported_not_dropped() {
        let mut queue = EventQueue::with_capacity(1);
        queue.push(EntityEvent::Spawned(EntityId::default())).unwrap();
        let err = queue.push(EntityEvent::Spawned(EntityId::default())).unwrap_err();
        assert_eq!(err.code(), "queue_full");
    }
}
