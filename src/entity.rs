// Copyright 2024 Saptak Santra
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Entity identifiers, hierarchy, tags, groups, and lifecycle hooks.

use ahash::AHashMap;
use slotmap::{new_key_type, SlotMap};
use std::collections::HashSet;

use crate::error::{EcsError, Result};
use crate::event::EntityEvent;
use crate::observer::{Observer, ObserverRegistry};

new_key_type! {
    /// Unique entity identifier backed by slotmap's generational keys.
    pub struct EntityId;
}

/// Entity location in archetype (archetype_id, row)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntityLocation {
    pub archetype_id: usize,
    pub archetype_row: usize,
}

#[derive(Default)]
struct EntitySlot {
    parent: Option<EntityId>,
    children: Vec<EntityId>,
    tag: Option<String>,
}

/// Owns entity identity, the parent/child hierarchy, the single-tag-per-entity index,
/// named groups, and lifecycle observers. Component payloads live elsewhere
/// (`ComponentStore`/`Archetype`); this type only tracks relational metadata.
pub struct EntityManager {
    slots: SlotMap<EntityId, EntitySlot>,
    tag_index: AHashMap<String, EntityId>,
    groups: AHashMap<String, HashSet<EntityId>>,
    entity_groups: AHashMap<EntityId, HashSet<String>>,
    max_entities: usize,
    observers: ObserverRegistry,
}

impl EntityManager {
    pub fn new(max_entities: usize) -> Self {
        Self {
            slots: SlotMap::with_key(),
            tag_index: AHashMap::new(),
            groups: AHashMap::new(),
            entity_groups: AHashMap::new(),
            max_entities,
            observers: ObserverRegistry::new(),
        }
    }

    /// Allocate a new entity. O(1) amortised: draws from slotmap's internal free list
    /// before growing the backing array.
    pub fn create(&mut self) -> Result<EntityId> {
        if self.slots.len() >= self.max_entities {
            return Err(EcsError::EntityLimitReached(self.max_entities));
        }
        let id = self.slots.insert(EntitySlot::default());
        self.observers.broadcast(&EntityEvent::Spawned(id))?;
        Ok(id)
    }

    pub fn is_live(&self, id: EntityId) -> bool {
        self.slots.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Destroy an entity: orphans children (clears their parent pointer, does not
    /// cascade-destroy), detaches from its own parent, clears its tag and group
    /// memberships, then recycles the slot (generation bump is handled by slotmap).
    pub fn destroy(&mut self, id: EntityId) -> Result<()> {
        let slot = self.slots.remove(id).ok_or(EcsError::EntityNotFound(id))?;

        for child in &slot.children {
            if let Some(child_slot) = self.slots.get_mut(*child) {
                child_slot.parent = None;
            }
        }

        if let Some(parent) = slot.parent {
            if let Some(parent_slot) = self.slots.get_mut(parent) {
                parent_slot.children.retain(|c| *c != id);
            }
        }

        if let Some(tag) = &slot.tag {
            self.tag_index.remove(tag);
        }

        if let Some(member_groups) = self.entity_groups.remove(&id) {
            for group in member_groups {
                if let Some(members) = self.groups.get_mut(&group) {
                    members.remove(&id);
                }
            }
        }

        self.observers.broadcast(&EntityEvent::Despawned(id))?;
        Ok(())
    }

    /// Set `child`'s parent to `parent`. Rejects a cycle by walking the parent chain
    /// from `parent` upward looking for `child`.
    pub fn set_parent(&mut self, child: EntityId, parent: EntityId) -> Result<()> {
        if !self.is_live(child) {
            return Err(EcsError::EntityNotFound(child));
        }
        if !self.is_live(parent) {
            return Err(EcsError::EntityNotFound(parent));
        }

        let mut walker = Some(parent);
        while let Some(current) = walker {
            if current == child {
                return Err(EcsError::HierarchyCycle { child, parent });
            }
            walker = self.slots[current].parent;
        }

        let old_parent = self.slots[child].parent;
        if let Some(old) = old_parent {
            if let Some(old_slot) = self.slots.get_mut(old) {
                old_slot.children.retain(|c| *c != child);
            }
        }

        self.slots[child].parent = Some(parent);
        self.slots[parent].children.push(child);

        self.observers.broadcast(&EntityEvent::ParentChanged(child, old_parent, parent))?;
        Ok(())
    }

    pub fn parent(&self, id: EntityId) -> Option<EntityId> {
        self.slots.get(id).and_then(|s| s.parent)
    }

    pub fn children(&self, id: EntityId) -> &[EntityId] {
        self.slots.get(id).map(|s| s.children.as_slice()).unwrap_or(&[])
    }

    /// Assign a tag to `id`. At most one tag per entity; re-tagging replaces the
    /// previous tag and updates the reverse index. Empty tags are rejected.
    pub fn tag(&mut self, id: EntityId, tag: impl Into<String>) -> Result<()> {
        if !self.is_live(id) {
            return Err(EcsError::EntityNotFound(id));
        }
        let tag = tag.into();
        if tag.is_empty() {
            return Err(EcsError::EmptyTag);
        }

        if let Some(old) = self.slots[id].tag.take() {
            self.tag_index.remove(&old);
        }
        self.tag_index.insert(tag.clone(), id);
        self.slots[id].tag = Some(tag);
        Ok(())
    }

    pub fn tag_of(&self, id: EntityId) -> Option<&str> {
        self.slots.get(id).and_then(|s| s.tag.as_deref())
    }

    pub fn entity_by_tag(&self, tag: &str) -> Option<EntityId> {
        self.tag_index.get(tag).copied()
    }

    /// Add `id` to a named group, maintaining both the forward (entity→groups) and
    /// reverse (group→entities) indexes.
    pub fn add_to_group(&mut self, id: EntityId, group: impl Into<String>) -> Result<()> {
        if !self.is_live(id) {
            return Err(EcsError::EntityNotFound(id));
        }
        let group = group.into();
        self.groups.entry(group.clone()).or_default().insert(id);
        self.entity_groups.entry(id).or_default().insert(group);
        Ok(())
    }

    pub fn remove_from_group(&mut self, id: EntityId, group: &str) {
        if let Some(members) = self.groups.get_mut(group) {
            members.remove(&id);
        }
        if let Some(member_groups) = self.entity_groups.get_mut(&id) {
            member_groups.remove(group);
        }
    }

    pub fn entities_in_group(&self, group: &str) -> impl Iterator<Item = EntityId> + '_ {
        self.groups.get(group).into_iter().flatten().copied()
    }

    pub fn groups_of(&self, id: EntityId) -> impl Iterator<Item = &str> {
        self.entity_groups.get(&id).into_iter().flatten().map(|s| s.as_str())
    }

    /// Register a lifecycle observer, returning its index for later `unregister`.
    pub fn add_observer(&mut self, observer: Box<dyn Observer>) -> Result<usize> {
        self.observers.register(observer)
    }

    pub fn remove_observer(&mut self, index: usize) -> Option<Box<dyn Observer>> {
        self.observers.unregister(index)
    }

    pub fn observers(&self) -> &ObserverRegistry {
        &self.observers
    }

    /// Broadcast a component-added/removed lifecycle event, called by `ComponentStore`.
    pub fn notify(&mut self, event: EntityEvent) -> Result<()> {
        self.observers.broadcast(&event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_destroy_recycles_generation() {
        let mut mgr = EntityManager::new(16);
        let e1 = mgr.create().unwrap();
        mgr.destroy(e1).unwrap();
        assert!(!mgr.is_live(e1));
        let e2 = mgr.create().unwrap();
        assert_ne!(e1, e2);
    }

    #[test]
    fn destroy_unknown_entity_errors() {
        let mut mgr = EntityManager::new(16);
        let e1 = mgr.create().unwrap();
        mgr.destroy(e1).unwrap();
        assert!(matches!(mgr.destroy(e1), Err(EcsError::EntityNotFound(_))));
    }

    #[test]
    fn destroy_orphans_children_without_cascading() {
        let mut mgr = EntityManager::new(16);
        let parent = mgr.create().unwrap();
        let child = mgr.create().unwrap();
        mgr.set_parent(child, parent).unwrap();

        mgr.destroy(parent).unwrap();

        assert!(mgr.is_live(child));
        assert_eq!(mgr.parent(child), None);
    }

    #[test]
    fn set_parent_rejects_cycle() {
        let mut mgr = EntityManager::new(16);
        let a = mgr.create().unwrap();
        let b = mgr.create().unwrap();
        mgr.set_parent(b, a).unwrap();
        assert!(matches!(
            mgr.set_parent(a, b),
            Err(EcsError::HierarchyCycle { .. })
        ));
    }

    #[test]
    fn tag_replaces_previous_and_updates_reverse_index() {
        let mut mgr = EntityManager::new(16);
        let e = mgr.create().unwrap();
        mgr.tag(e, "player").unwrap();
        mgr.tag(e, "hero").unwrap();
        assert_eq!(mgr.entity_by_tag("player"), None);
        assert_eq!(mgr.entity_by_tag("hero"), Some(e));
    }

    #[test]
    fn empty_tag_is_rejected() {
        let mut mgr = EntityManager::new(16);
        let e = mgr.create().unwrap();
        assert!(matches!(mgr.tag(e, ""), Err(EcsError::EmptyTag)));
    }

    #[test]
    fn group_membership_cleared_on_destroy() {
        let mut mgr = EntityManager::new(16);
        let e = mgr.create().unwrap();
        mgr.add_to_group(e, "enemies").unwrap();
        assert_eq!(mgr.entities_in_group("enemies").count(), 1);
        mgr.destroy(e).unwrap();
        assert_eq!(mgr.entities_in_group("enemies").count(), 0);
    }

    #[test]
    fn entity_limit_reached_is_structured_error() {
        let mut mgr = EntityManager::new(1);
        mgr.create().unwrap();
        assert!(matches!(mgr.create(), Err(EcsError::EntityLimitReached(1))));
    }
}
