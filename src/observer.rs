//! Lifecycle-hook registry used by the entity manager.
//!
//! Hooks observe [`EntityEvent`]s (spawn/despawn/component add/remove) fired by
//! `EntityManager`. They intentionally do not receive `&mut World`: a hook firing
//! from inside an entity-manager mutation cannot itself re-enter the world without a
//! double mutable borrow, so hooks are notification-only (logging, metrics, and
//! cross-bookkeeping belong here; deferred world mutation belongs in `CommandBuffer`).

use crate::error::Result;
use crate::event::EntityEvent;

/// Observer that reacts to entity lifecycle events.
pub trait Observer: Send + Sync {
    /// Called when an entity event occurs. Returning an error stops the remaining
    /// observers in this broadcast from running.
    fn on_event(&mut self, event: &EntityEvent) -> Result<()>;

    /// Get name for debugging
    fn name(&self) -> &str {
        "Observer"
    }

    /// Called once the observer has been stored in the registry.
    fn on_registered(&mut self, _index: usize) -> Result<()> {
        Ok(())
    }

    /// Called when the observer is removed from the registry.
    fn on_unregistered(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Metrics for observer performance tracking
#[derive(Debug, Clone, Default)]
pub struct ObserverMetrics {
    /// Total number of events processed
    pub total_events: u64,

    /// Total time spent in observers (microseconds)
    pub total_time_us: u64,

    /// Events processed per observer type
    pub events_by_type: std::collections::HashMap<String, u64>,

    /// Average time per event (microseconds)
    pub avg_time_us: f64,

    /// Peak time for single event (microseconds)
    pub peak_time_us: u64,

    /// Last reset time
    pub last_reset: Option<std::time::Instant>,
}

impl ObserverMetrics {
    /// Reset metrics
    pub fn reset(&mut self) {
        self.total_events = 0;
        self.total_time_us = 0;
        self.events_by_type.clear();
        self.avg_time_us = 0.0;
        self.peak_time_us = 0;
        self.last_reset = Some(std::time::Instant::now());
    }

    /// Record an event processing
    pub fn record_event(&mut self, event_type: &str, duration_us: u64) {
        self.total_events += 1;
        self.total_time_us += duration_us;
        self.avg_time_us = self.total_time_us as f64 / self.total_events as f64;
        self.peak_time_us = self.peak_time_us.max(duration_us);

        *self.events_by_type.entry(event_type.to_string()).or_insert(0) += 1;
    }
}

/// Registry that manages all lifecycle observers for an `EntityManager`.
pub struct ObserverRegistry {
    pub(crate) observers: Vec<Box<dyn Observer>>,
    pub metrics: ObserverMetrics,
}

impl ObserverRegistry {
    /// Create new registry
    pub fn new() -> Self {
        Self {
            observers: Vec::new(),
            metrics: ObserverMetrics::default(),
        }
    }

    /// Register observer, returning its index (used for `unregister`).
    pub fn register(&mut self, mut observer: Box<dyn Observer>) -> Result<usize> {
        let index = self.observers.len();
        observer.on_registered(index)?;
        self.observers.push(observer);
        Ok(index)
    }

    /// Unregister observer by index
    pub fn unregister(&mut self, index: usize) -> Option<Box<dyn Observer>> {
        if index < self.observers.len() {
            let mut observer = self.observers.remove(index);
            let _ = observer.on_unregistered();
            Some(observer)
        } else {
            None
        }
    }

    /// Broadcast event to all observers, recording timing into `metrics`.
    pub fn broadcast(&mut self, event: &EntityEvent) -> Result<()> {
        let start = std::time::Instant::now();
        for observer in &mut self.observers {
            observer.on_event(event)?;
        }
        self.metrics.record_event(event.event_type(), start.elapsed().as_micros() as u64);
        Ok(())
    }

    /// Get number of registered observers
    pub fn observer_count(&self) -> usize {
        self.observers.len()
    }

    /// Clear all observers
    pub fn clear(&mut self) {
        self.observers.clear();
    }
}

impl Default for ObserverRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Example: log observer that prints all events.
pub struct LoggingObserver;

impl Observer for LoggingObserver {
    fn on_event(&mut self, event: &EntityEvent) -> Result<()> {
        #[cfg(feature = "profiling")]
        match event {
            EntityEvent::Spawned(id) => tracing::debug!(entity = ?id, "entity spawned"),
            EntityEvent::Despawned(id) => tracing::debug!(entity = ?id, "entity despawned"),
            EntityEvent::ComponentAdded(id, tag) => {
                tracing::debug!(entity = ?id, tag = tag.0, "component added")
            }
            EntityEvent::ComponentRemoved(id, tag) => {
                tracing::debug!(entity = ?id, tag = tag.0, "component removed")
            }
            EntityEvent::Custom(name, id, _) => {
                tracing::debug!(entity = ?id, event = name, "custom event")
            }
            EntityEvent::ParentChanged(child, old_parent, new_parent) => {
                tracing::debug!(entity = ?child, old = ?old_parent, new = ?new_parent, "parent changed")
            }
        }
        #[cfg(not(feature = "profiling"))]
        let _ = event;
        Ok(())
    }

    fn name(&self) -> &str {
        "LoggingObserver"
    }
}

/// Example: counter observer that tracks lifecycle statistics.
#[derive(Default)]
pub struct StatisticsObserver {
    pub spawned_count: usize,
    pub despawned_count: usize,
    pub component_additions: usize,
    pub component_removals: usize,
}

impl StatisticsObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

impl Observer for StatisticsObserver {
    fn on_event(&mut self, event: &EntityEvent) -> Result<()> {
        match event {
            EntityEvent::Spawned(_) => self.spawned_count += 1,
            EntityEvent::Despawned(_) => self.despawned_count += 1,
            EntityEvent::ComponentAdded(_, _) => self.component_additions += 1,
            EntityEvent::ComponentRemoved(_, _) => self.component_removals += 1,
            EntityEvent::Custom(_, _, _) => {}
            EntityEvent::ParentChanged(_, _, _) => {}
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "StatisticsObserver"
    }
}
