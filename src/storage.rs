//! Component store: dirty-bit tracking and entity-level (de)serialization glue on top
//! of archetype columns.
//!
//! Archetypes already hold the per-type Structure-of-Arrays columns; this module adds
//! the cross-cutting bookkeeping the specification asks of a "component store" without
//! duplicating that storage: a per-entity dirty mask for change tracking, and
//! `serialize_entity`/`deserialize_entity` used by `persistence.rs`.

use ahash::AHashMap;

use crate::archetype::Archetype;
use crate::bitset::Signature;
use crate::component::{ComponentRegistry, ComponentTag};
use crate::entity::EntityId;
use crate::error::{EcsError, Result};

/// Tracks which component tags changed on which entities since the last `clear`.
#[derive(Default)]
pub struct DirtyTracker {
    dirty: AHashMap<EntityId, Signature>,
}

impl DirtyTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark(&mut self, id: EntityId, tag: ComponentTag) {
        self.dirty.entry(id).or_insert(Signature::EMPTY).set(tag);
    }

    pub fn is_dirty(&self, id: EntityId, tag: ComponentTag) -> bool {
        self.dirty.get(&id).is_some_and(|sig| sig.contains(tag))
    }

    pub fn dirty_mask(&self, id: EntityId) -> Signature {
        self.dirty.get(&id).copied().unwrap_or(Signature::EMPTY)
    }

    pub fn clear_entity(&mut self, id: EntityId) {
        self.dirty.remove(&id);
    }

    /// Clear all dirty bits, called once per frame when change tracking is enabled.
    pub fn clear(&mut self) {
        self.dirty.clear();
    }

    pub fn len(&self) -> usize {
        self.dirty.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dirty.is_empty()
    }

    /// Take every `(entity, tag)` pair marked dirty since the last `drain`/`clear`, and
    /// clear the tracker. A second call before any new mark returns an empty vector.
    pub fn drain(&mut self, registry: &ComponentRegistry) -> Vec<(EntityId, ComponentTag)> {
        let mut out = Vec::new();
        for (&id, &mask) in self.dirty.iter() {
            for info in registry.iter() {
                if mask.contains(info.tag) {
                    out.push((id, info.tag));
                }
            }
        }
        self.dirty.clear();
        out
    }
}

/// One persisted component payload: its tag and the bytes `ComponentTypeInfo::serialize`
/// produced.
pub type PersistedComponent = (ComponentTag, Vec<u8>);

/// Snapshot a single entity's persistable components out of its archetype row.
pub fn serialize_entity(
    archetype: &Archetype,
    row: usize,
    registry: &ComponentRegistry,
) -> Vec<PersistedComponent> {
    archetype
        .signature()
        .iter_tags()
        .filter_map(|tag| {
            let info = registry.info(tag)?;
            if !info.persistable {
                return None;
            }
            let bytes = archetype.get_column(tag)?.get_bytes(row)?;
            Some((tag, info.serialize(bytes)))
        })
        .collect()
}

/// Write previously-serialized component payloads back into an entity's archetype row.
/// Unknown type tags are skipped with a warning rather than aborting the load.
pub fn deserialize_entity(
    archetype: &mut Archetype,
    row: usize,
    registry: &ComponentRegistry,
    records: &[PersistedComponent],
) -> Result<()> {
    for (tag, bytes) in records {
        let Some(info) = registry.info(*tag) else {
            #[cfg(feature = "profiling")]
            tracing::warn!(tag = tag.0, "unknown component type tag in save data, skipping");
            continue;
        };
        let decoded = info
            .deserialize(bytes)
            .ok_or_else(|| EcsError::DeserializationError(format!("malformed payload for tag {}", tag.0)))?;
        if let Some(column) = archetype.get_column_mut(*tag) {
            column.set_bytes(row, &decoded);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::RegistrationOptions;

    #[derive(Clone, Copy)]
    struct Health(f32);

    #[test]
    fn dirty_tracker_marks_and_clears() {
        let mut tracker = DirtyTracker::new();
        let e = EntityId::default();
        let tag = ComponentTag(3);
        assert!(!tracker.is_dirty(e, tag));
        tracker.mark(e, tag);
        assert!(tracker.is_dirty(e, tag));
        tracker.clear();
        assert!(!tracker.is_dirty(e, tag));
    }

    #[test]
    fn round_trips_persistable_component_through_archetype_row() {
        let mut registry = ComponentRegistry::new();
        let opts = RegistrationOptions::<Health> {
            persistable: true,
            allowed_in_mod: true,
            validator: None,
        };
        let tag = registry.register_with::<Health>(opts).unwrap();

        let mut archetype = Archetype::new(Signature::single(tag));
        archetype.register_component::<Health>(tag);
        let e = EntityId::default();
        let row = archetype.allocate_row(e);
        archetype.get_column_mut(tag).unwrap().set_bytes(row, &42.0f32.to_ne_bytes());

        let records = serialize_entity(&archetype, row, &registry);
        assert_eq!(records.len(), 1);

        archetype.get_column_mut(tag).unwrap().set_bytes(row, &0.0f32.to_ne_bytes());
        deserialize_entity(&mut archetype, row, &registry, &records).unwrap();
        let restored = archetype.get_column(tag).unwrap().get::<Health>(row).unwrap();
        assert_eq!(restored.0, 42.0);
    }

    #[test]
    fn unknown_type_tag_is_skipped_not_fatal() {
        let registry = ComponentRegistry::new();
        let mut archetype = Archetype::new(Signature::EMPTY);
        let e = EntityId::default();
        let row = archetype.allocate_row(e);
        let records = vec![(ComponentTag(5), vec![1, 2, 3])];
        assert!(deserialize_entity(&mut archetype, row, &registry, &records).is_ok());
    }
}
