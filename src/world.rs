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

//! `World`: the composition root. Owns entity identity (`EntityManager`), the
//! component registry, archetype storage keyed by `Signature`, the query engine, the
//! spatial index, change tracking, the deferred lifecycle-event queue, the global event
//! bus, and singleton resources.

use std::any::{Any, TypeId};

use ahash::AHashMap;
use slotmap::SecondaryMap;

use crate::archetype::{Archetype, ComponentColumn};
use crate::bitset::Signature;
use crate::component::{Bundle, Component, ComponentRegistry, ComponentTag};
use crate::config::WorldConfig;
use crate::entity::{EntityId, EntityLocation, EntityManager};
use crate::error::{EcsError, Result};
use crate::event::{EntityEvent, EventQueue};
use crate::event_bus::EventBus;
use crate::memory::{AllocHandle, MemoryManager};
use crate::observer::Observer;
use crate::query::{QueryContext, QueryEngine, QueryResult, QuerySpec};
use crate::spatial::SpatialGrid;
use crate::storage::DirtyTracker;
use crate::transform::GlobalTransform;

/// Central ECS world: spawns/despawns entities, stores their components in
/// archetypes, and runs queries and systems over them.
pub struct World {
    config: WorldConfig,
    registry: ComponentRegistry,
    entities: EntityManager,
    archetypes: Vec<Archetype>,
    archetype_index: AHashMap<u64, usize>,
    locations: SecondaryMap<EntityId, EntityLocation>,
    dirty: DirtyTracker,
    query_engine: QueryEngine,
    spatial_index: SpatialGrid,
    tick: u64,
    created_tick: AHashMap<EntityId, u64>,
    modified_tick: AHashMap<EntityId, u64>,
    event_queue: EventQueue,
    global_event_bus: EventBus,
    resources: AHashMap<TypeId, Box<dyn Any + Send + Sync>>,
    memory: MemoryManager,
    memory_handles: AHashMap<EntityId, (AllocHandle, usize)>,
}

impl World {
    pub fn new() -> Self {
        Self::with_config(WorldConfig::default())
    }

    /// The constructor that threads every [`WorldConfig`] option that is actually wired
    /// into `World` today: `max_entities`, `memory_limit_bytes`, `query_cache_capacity`,
    /// `event_queue_capacity`, `enable_change_tracking`, and `enable_leak_detection`.
    /// `worker_count`, `event_worker_count`, `enable_metrics`, `parallel_execution`, and
    /// `system_timeout` are read by other subsystems on their own initiative (the event
    /// bus's own `start` call, a system's own `timeout()` override) or are reserved — see
    /// `DESIGN.md`.
    pub fn with_config(config: WorldConfig) -> Self {
        let mut registry = ComponentRegistry::new();
        let transform_tag = registry
            .register::<GlobalTransform>()
            .expect("registering the built-in transform type cannot exhaust the tag space");

        let mut query_engine = QueryEngine::new(config.query_cache_capacity);
        query_engine.set_transform_tag(Some(transform_tag));

        let entities = EntityManager::new(config.max_entities);
        let event_queue = EventQueue::with_capacity(config.event_queue_capacity);
        let memory_limit = Some(config.memory_limit_bytes).filter(|&limit| limit > 0);
        let memory = MemoryManager::new(memory_limit, config.enable_leak_detection);

        let mut world = Self {
            config,
            registry,
            entities,
            archetypes: Vec::new(),
            archetype_index: AHashMap::new(),
            locations: SecondaryMap::new(),
            dirty: DirtyTracker::new(),
            query_engine,
            spatial_index: SpatialGrid::new(16.0),
            tick: 1,
            created_tick: AHashMap::new(),
            modified_tick: AHashMap::new(),
            event_queue,
            global_event_bus: EventBus::new(),
            resources: AHashMap::new(),
            memory,
            memory_handles: AHashMap::new(),
        };

        let empty = Archetype::new(Signature::EMPTY);
        world.archetypes.push(empty);
        world.archetype_index.insert(Signature::EMPTY.bits(), 0);
        world
    }

    pub fn config(&self) -> &WorldConfig {
        &self.config
    }

    /// Live-byte accounting for every entity's archetype-column storage, charged on
    /// spawn/despawn/archetype migration against `config.memory_limit_bytes`.
    pub fn memory_stats(&self) -> crate::memory::MemoryStats {
        self.memory.stats()
    }

    /// Release the tracked memory charge for `entity`'s current row, if any.
    fn release_memory(&mut self, entity: EntityId) {
        if let Some((handle, size)) = self.memory_handles.remove(&entity) {
            self.memory.release(handle, size);
        }
    }

    /// Charge `entity`'s row in the larger `archetype_id`, before any data moves, so a
    /// budget that can't fit the growth is rejected without mutating anything. Used by
    /// `add_component`, whose destination archetype always has one more column.
    fn charge_growth(&mut self, entity: EntityId, archetype_id: usize) -> Result<()> {
        let row_size = self.archetypes[archetype_id].row_size();
        let handle = self.memory.charge(row_size)?;
        if let Some((old_handle, old_size)) = self.memory_handles.insert(entity, (handle, row_size)) {
            self.memory.release(old_handle, old_size);
        }
        Ok(())
    }

    /// Release `entity`'s current charge, then charge the smaller `archetype_id` row.
    /// Releasing first means this can never spuriously hit the limit, since the
    /// replacement charge is never larger than what was just freed. Used by
    /// `remove_component`, whose destination archetype always has one fewer column.
    fn charge_shrink(&mut self, entity: EntityId, archetype_id: usize) -> Result<()> {
        self.release_memory(entity);
        let row_size = self.archetypes[archetype_id].row_size();
        let handle = self.memory.charge(row_size)?;
        self.memory_handles.insert(entity, (handle, row_size));
        Ok(())
    }

    pub fn tick(&self) -> u64 {
        self.tick
    }

    /// Advance the world tick, called once per frame by the executor. Feeds
    /// `TemporalConstraint::CreatedAfter`/`ModifiedSince` queries.
    pub fn advance_tick(&mut self) -> u64 {
        self.tick += 1;
        self.tick
    }

    pub fn is_alive(&self, entity: EntityId) -> bool {
        self.entities.is_live(entity)
    }

    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    pub fn archetype_count(&self) -> usize {
        self.archetypes.len()
    }

    pub fn register_component<T: Component>(&mut self) -> Result<ComponentTag> {
        self.registry.register::<T>()
    }

    /// Register `T` with non-default options (persistable, allowed in a mod sandbox, a
    /// validator). Must run before the first `spawn` that uses `T`, since a bundle's own
    /// `register_components` call is a no-op once the type is already known.
    pub fn register_component_with<T: Component>(
        &mut self,
        opts: crate::component::RegistrationOptions<T>,
    ) -> Result<ComponentTag> {
        self.registry.register_with::<T>(opts)
    }

    // --- spawning -----------------------------------------------------------------

    /// Spawn an entity with the given component bundle.
    pub fn spawn<B: Bundle>(&mut self, bundle: B) -> Result<EntityId> {
        let archetype_id = self.ensure_archetype_for_bundle::<B>();
        let row_size = self.archetypes[archetype_id].row_size();
        let handle = self.memory.charge(row_size)?;

        let id = match self.entities.create() {
            Ok(id) => id,
            Err(err) => {
                self.memory.release(handle, row_size);
                return Err(err);
            }
        };
        self.memory_handles.insert(id, (handle, row_size));

        let row = self.archetypes[archetype_id].allocate_row(id);
        let type_ids = B::type_ids();
        let mut ptrs: smallvec::SmallVec<[*mut u8; crate::component::MAX_BUNDLE_COMPONENTS]> =
            smallvec::SmallVec::new();
        for type_id in type_ids.iter() {
            let tag = self
                .registry
                .tag_of_type_id(*type_id)
                .expect("bundle registers every one of its own component types");
            let column = self.archetypes[archetype_id]
                .get_column_mut(tag)
                .expect("archetype carries a column for every tag in its signature");
            ptrs.push(column.get_ptr_mut(row));
        }
        unsafe {
            bundle.write_components(&ptrs);
        }

        self.locations.insert(id, EntityLocation { archetype_id, archetype_row: row });
        self.created_tick.insert(id, self.tick);
        self.modified_tick.insert(id, self.tick);

        for tag in self.archetypes[archetype_id].signature().iter_tags() {
            self.query_engine.invalidate_for_tag(tag);
        }

        Ok(id)
    }

    /// Spawn many entities sharing the same bundle type, reserving archetype rows once.
    pub fn spawn_batch<B: Bundle>(&mut self, bundles: impl IntoIterator<Item = B>) -> Result<Vec<EntityId>> {
        let archetype_id = self.ensure_archetype_for_bundle::<B>();
        let row_size = self.archetypes[archetype_id].row_size();
        let mut out = Vec::new();
        for bundle in bundles {
            let handle = self.memory.charge(row_size)?;
            let id = match self.entities.create() {
                Ok(id) => id,
                Err(err) => {
                    self.memory.release(handle, row_size);
                    return Err(err);
                }
            };
            self.memory_handles.insert(id, (handle, row_size));
            let row = self.archetypes[archetype_id].allocate_row(id);
            let type_ids = B::type_ids();
            let mut ptrs: smallvec::SmallVec<[*mut u8; crate::component::MAX_BUNDLE_COMPONENTS]> =
                smallvec::SmallVec::new();
            for type_id in type_ids.iter() {
                let tag = self.registry.tag_of_type_id(*type_id).expect("registered above");
                let column = self.archetypes[archetype_id].get_column_mut(tag).expect("column exists");
                ptrs.push(column.get_ptr_mut(row));
            }
            unsafe {
                bundle.write_components(&ptrs);
            }
            self.locations.insert(id, EntityLocation { archetype_id, archetype_row: row });
            self.created_tick.insert(id, self.tick);
            self.modified_tick.insert(id, self.tick);
            out.push(id);
        }
        for tag in self.archetypes[archetype_id].signature().iter_tags() {
            self.query_engine.invalidate_for_tag(tag);
        }
        Ok(out)
    }

    /// Build (or find) the archetype a bundle spawns into. The bundle's signature isn't
    /// known until its types are registered, so a fresh archetype is built and then
    /// either kept (first time this signature is seen) or discarded in favor of the
    /// existing one with the same resulting signature.
    fn ensure_archetype_for_bundle<B: Bundle>(&mut self) -> usize {
        let mut scratch = Archetype::new(Signature::EMPTY);
        B::register_components(&mut scratch, &mut self.registry);
        scratch.mark_columns_initialized();
        let signature = scratch.signature();

        if let Some(&id) = self.archetype_index.get(&signature.bits()) {
            return id;
        }

        self.archetypes.push(scratch);
        let id = self.archetypes.len() - 1;
        self.archetype_index.insert(signature.bits(), id);
        id
    }

    fn get_or_create_archetype(&mut self, signature: Signature, build: impl FnOnce(&mut Archetype)) -> usize {
        if let Some(&id) = self.archetype_index.get(&signature.bits()) {
            return id;
        }
        let mut archetype = Archetype::new(Signature::EMPTY);
        build(&mut archetype);
        archetype.mark_columns_initialized();
        self.archetypes.push(archetype);
        let id = self.archetypes.len() - 1;
        self.archetype_index.insert(signature.bits(), id);
        id
    }

    // --- despawning -----------------------------------------------------------------

    pub fn despawn(&mut self, entity: EntityId) -> Result<()> {
        let location = self.locations.remove(entity).ok_or(EcsError::EntityNotFound(entity))?;
        let tags: Vec<ComponentTag> = self.archetypes[location.archetype_id].signature().iter_tags().collect();

        unsafe {
            if let Some(swapped) = self.archetypes[location.archetype_id].remove_row(location.archetype_row) {
                if let Some(loc) = self.locations.get_mut(swapped) {
                    loc.archetype_row = location.archetype_row;
                }
            }
        }

        self.entities.destroy(entity)?;
        self.spatial_index.remove(entity);
        self.dirty.clear_entity(entity);
        self.created_tick.remove(&entity);
        self.modified_tick.remove(&entity);
        self.release_memory(entity);

        for tag in tags {
            self.query_engine.invalidate_for_tag(tag);
        }

        Ok(())
    }

    // --- component access -----------------------------------------------------------

    pub fn has_component<T: Component>(&self, entity: EntityId) -> bool {
        let Some(tag) = self.registry.tag_of::<T>() else {
            return false;
        };
        self.locations
            .get(entity)
            .is_some_and(|loc| self.archetypes[loc.archetype_id].signature().contains(tag))
    }

    pub fn get_component<T: Component>(&self, entity: EntityId) -> Option<&T> {
        let tag = self.registry.tag_of::<T>()?;
        let location = self.locations.get(entity)?;
        self.archetypes[location.archetype_id].get_column(tag)?.get::<T>(location.archetype_row)
    }

    pub fn get_component_mut<T: Component>(&mut self, entity: EntityId) -> Option<&mut T> {
        let tag = self.registry.tag_of::<T>()?;
        let location = *self.locations.get(entity)?;
        if !self.archetypes[location.archetype_id].signature().contains(tag) {
            return None;
        }

        if self.config.enable_change_tracking {
            self.dirty.mark(entity, tag);
            self.modified_tick.insert(entity, self.tick);
        }
        self.query_engine.invalidate_for_tag(tag);

        self.archetypes[location.archetype_id].get_column_mut(tag)?.get_mut::<T>(location.archetype_row)
    }

    /// Add (or, per the overwrite policy, replace) a component on a live entity. Moves
    /// the entity to a new archetype if it doesn't already carry `T`.
    pub fn add_component<T: Component>(&mut self, entity: EntityId, component: T) -> Result<()> {
        if !self.entities.is_live(entity) {
            return Err(EcsError::EntityNotFound(entity));
        }
        let tag = self.registry.register::<T>()?;
        let location = *self.locations.get(entity).ok_or(EcsError::EntityNotFound(entity))?;

        if self.archetypes[location.archetype_id].get_column(tag).is_some() {
            let column = self.archetypes[location.archetype_id].get_column_mut(tag).unwrap();
            let ptr = column.get_ptr_mut(location.archetype_row) as *mut T;
            unsafe {
                std::ptr::drop_in_place(ptr);
                std::ptr::write(ptr, component);
            }
        } else {
            let old_tags: Vec<ComponentTag> =
                self.archetypes[location.archetype_id].signature().iter_tags().collect();
            let cloned: Vec<(ComponentTag, ComponentColumn)> = old_tags
                .iter()
                .filter_map(|&t| self.archetypes[location.archetype_id].get_column(t).map(|c| (t, c.clone_empty())))
                .collect();
            let new_signature = self.archetypes[location.archetype_id].signature().with(tag);

            let new_archetype_id = self.get_or_create_archetype(new_signature, |arch| {
                for (t, col) in cloned {
                    arch.adopt_column(t, col);
                }
                arch.adopt_column(tag, ComponentColumn::new::<T>());
            });

            self.charge_growth(entity, new_archetype_id)?;
            self.move_entity_to_archetype(entity, location, new_archetype_id, &old_tags)?;

            let new_location = self.locations[entity];
            let column = self.archetypes[new_location.archetype_id].get_column_mut(tag).unwrap();
            let ptr = column.get_ptr_mut(new_location.archetype_row) as *mut T;
            unsafe {
                std::ptr::write(ptr, component);
            }
        }

        if TypeId::of::<T>() == TypeId::of::<GlobalTransform>() {
            if let Some(transform) = self.get_component::<GlobalTransform>(entity) {
                self.spatial_index.upsert(entity, transform.position);
            }
        }

        self.mark_modified(entity, tag);
        let _ = self.event_queue.push(EntityEvent::ComponentAdded(entity, tag));
        Ok(())
    }

    /// Remove `T` from a live entity, returning its value. Moves the entity to the
    /// archetype for its remaining components.
    pub fn remove_component<T: Component>(&mut self, entity: EntityId) -> Result<T> {
        if !self.entities.is_live(entity) {
            return Err(EcsError::EntityNotFound(entity));
        }
        let component_name = std::any::type_name::<T>();
        let tag = self
            .registry
            .tag_of::<T>()
            .ok_or(EcsError::ComponentNotFound { entity, component: component_name })?;
        let location = *self.locations.get(entity).ok_or(EcsError::EntityNotFound(entity))?;

        if !self.archetypes[location.archetype_id].signature().contains(tag) {
            return Err(EcsError::ComponentNotFound { entity, component: component_name });
        }

        let value = {
            let column = self.archetypes[location.archetype_id].get_column_mut(tag).unwrap();
            let ptr = column.get_ptr_mut(location.archetype_row) as *mut T;
            unsafe { std::ptr::read(ptr) }
        };

        let remaining_tags: Vec<ComponentTag> = self.archetypes[location.archetype_id]
            .signature()
            .iter_tags()
            .filter(|&t| t != tag)
            .collect();
        let all_old_tags: Vec<ComponentTag> = self.archetypes[location.archetype_id].signature().iter_tags().collect();
        let cloned: Vec<(ComponentTag, ComponentColumn)> = remaining_tags
            .iter()
            .filter_map(|&t| self.archetypes[location.archetype_id].get_column(t).map(|c| (t, c.clone_empty())))
            .collect();

        let mut new_signature = self.archetypes[location.archetype_id].signature();
        new_signature.clear(tag);
        let new_archetype_id = self.get_or_create_archetype(new_signature, |arch| {
            for (t, col) in cloned {
                arch.adopt_column(t, col);
            }
        });

        // `value` has already been moved out of its column by the `ptr::read` above, so
        // this charge must not fail the whole call via `?` — a shrink can never exceed the
        // budget it just released room for, but if it somehow did, returning early here
        // would drop `value` while its old backing slot is still live, double-dropping it
        // once that slot is reused. Record the charge on a best-effort basis instead.
        let _ = self.charge_shrink(entity, new_archetype_id);
        self.move_entity_to_archetype(entity, location, new_archetype_id, &all_old_tags)?;

        if TypeId::of::<T>() == TypeId::of::<GlobalTransform>() {
            self.spatial_index.remove(entity);
        }

        self.mark_modified(entity, tag);
        let _ = self.event_queue.push(EntityEvent::ComponentRemoved(entity, tag));
        Ok(value)
    }

    /// Move `entity` from its current archetype (`old_location`) to `new_archetype_id`,
    /// copying forward the payload bytes for every tag in `moved_tags`. Every one of
    /// those tags' payloads in the old row is considered already accounted for by the
    /// caller (copied here, or read out by value beforehand), so the old row is removed
    /// without running any column's drop function.
    fn move_entity_to_archetype(
        &mut self,
        entity: EntityId,
        old_location: EntityLocation,
        new_archetype_id: usize,
        moved_tags: &[ComponentTag],
    ) -> Result<()> {
        let new_row = self.archetypes[new_archetype_id].allocate_row(entity);

        for &tag in moved_tags {
            let bytes = self.archetypes[old_location.archetype_id]
                .get_column(tag)
                .and_then(|c| c.get_bytes(old_location.archetype_row))
                .map(|b| b.to_vec());
            if let Some(bytes) = bytes {
                if let Some(column) = self.archetypes[new_archetype_id].get_column_mut(tag) {
                    column.set_bytes(new_row, &bytes);
                }
            }
        }

        unsafe {
            if let Some(swapped) = self.archetypes[old_location.archetype_id].remove_row_forget(old_location.archetype_row) {
                if let Some(loc) = self.locations.get_mut(swapped) {
                    loc.archetype_row = old_location.archetype_row;
                }
            }
        }

        self.locations.insert(entity, EntityLocation { archetype_id: new_archetype_id, archetype_row: new_row });
        Ok(())
    }

    fn mark_modified(&mut self, entity: EntityId, tag: ComponentTag) {
        if self.config.enable_change_tracking {
            self.dirty.mark(entity, tag);
            self.modified_tick.insert(entity, self.tick);
        }
        self.query_engine.invalidate_for_tag(tag);
    }

    // --- querying ---------------------------------------------------------------

    pub fn query(&mut self, spec: QuerySpec) -> Result<QueryResult> {
        let ctx = QueryContext {
            archetypes: &self.archetypes,
            registry: &self.registry,
            entity_manager: &self.entities,
            dirty: &self.dirty,
            spatial_index: &self.spatial_index,
            change_tracking_enabled: self.config.enable_change_tracking,
            created_tick: &self.created_tick,
            modified_tick: &self.modified_tick,
        };
        self.query_engine.execute(&ctx, &spec)
    }

    pub fn query_cache_stats(&self) -> crate::query::QueryCacheStats {
        self.query_engine.stats()
    }

    pub fn clear_query_cache(&mut self) {
        self.query_engine.clear_cache();
    }

    /// Take every `(entity, tag)` change-tracking mark recorded since the last drain,
    /// clearing the dirty set. A second call before any new mutation returns empty.
    pub fn drain_dirty(&mut self) -> Vec<(EntityId, ComponentTag)> {
        self.dirty.drain(&self.registry)
    }

    // --- hierarchy / tags / groups: delegate to EntityManager -----------------------

    pub fn parent(&self, entity: EntityId) -> Option<EntityId> {
        self.entities.parent(entity)
    }

    pub fn children(&self, entity: EntityId) -> &[EntityId] {
        self.entities.children(entity)
    }

    pub fn set_parent(&mut self, child: EntityId, parent: EntityId) -> Result<()> {
        self.entities.set_parent(child, parent)
    }

    pub fn tag_entity(&mut self, entity: EntityId, tag: impl Into<String>) -> Result<()> {
        self.entities.tag(entity, tag)
    }

    pub fn tag_of(&self, entity: EntityId) -> Option<&str> {
        self.entities.tag_of(entity)
    }

    pub fn entity_by_tag(&self, tag: &str) -> Option<EntityId> {
        self.entities.entity_by_tag(tag)
    }

    pub fn add_to_group(&mut self, entity: EntityId, group: impl Into<String>) -> Result<()> {
        self.entities.add_to_group(entity, group)
    }

    pub fn remove_from_group(&mut self, entity: EntityId, group: &str) {
        self.entities.remove_from_group(entity, group)
    }

    pub fn entities_in_group(&self, group: &str) -> impl Iterator<Item = EntityId> + '_ {
        self.entities.entities_in_group(group)
    }

    pub fn groups_of(&self, entity: EntityId) -> impl Iterator<Item = &str> {
        self.entities.groups_of(entity)
    }

    pub fn add_observer(&mut self, observer: Box<dyn Observer>) -> Result<usize> {
        self.entities.add_observer(observer)
    }

    pub fn remove_observer(&mut self, index: usize) -> Option<Box<dyn Observer>> {
        self.entities.remove_observer(index)
    }

    /// Drain the deferred lifecycle-event queue, rebroadcasting each event through the
    /// entity manager's observer registry.
    pub fn process_events(&mut self) -> Result<()> {
        while let Some(event) = self.event_queue.pop() {
            self.entities.notify(event)?;
        }
        Ok(())
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.global_event_bus
    }

    pub fn event_bus_mut(&mut self) -> &mut EventBus {
        &mut self.global_event_bus
    }

    // --- resources ----------------------------------------------------------------

    pub fn insert_resource<T: Send + Sync + 'static>(&mut self, resource: T) -> Option<T> {
        self.resources
            .insert(TypeId::of::<T>(), Box::new(resource))
            .and_then(|old| old.downcast::<T>().ok())
            .map(|b| *b)
    }

    pub fn get_resource<T: Send + Sync + 'static>(&self) -> Option<&T> {
        self.resources.get(&TypeId::of::<T>()).and_then(|b| b.downcast_ref::<T>())
    }

    pub fn get_resource_mut<T: Send + Sync + 'static>(&mut self) -> Option<&mut T> {
        self.resources.get_mut(&TypeId::of::<T>()).and_then(|b| b.downcast_mut::<T>())
    }

    pub fn remove_resource<T: Send + Sync + 'static>(&mut self) -> Option<T> {
        self.resources.remove(&TypeId::of::<T>()).and_then(|b| b.downcast::<T>().ok()).map(|b| *b)
    }

    // --- persistence ----------------------------------------------------------------

    /// Snapshot every live entity's persistable components into the self-describing
    /// byte stream `crate::persistence` defines.
    pub fn save_to_bytes(&self) -> Vec<u8> {
        use slotmap::Key;

        let mut persisted = Vec::with_capacity(self.entities.len());
        for archetype in &self.archetypes {
            for (row, &entity) in archetype.entities().iter().enumerate() {
                let components = crate::storage::serialize_entity(archetype, row, &self.registry);
                let signature = components.iter().fold(Signature::EMPTY, |sig, (tag, _)| sig.with(*tag));
                persisted.push(crate::persistence::PersistedEntity {
                    key_data: entity.data().as_ffi(),
                    signature,
                    components,
                });
            }
        }
        crate::persistence::serialize_world(&persisted)
    }

    /// Load entities from a byte stream produced by [`Self::save_to_bytes`], re-homing
    /// every persisted entity onto a freshly allocated `EntityId` rather than attempting
    /// to reuse its saved slotmap key. Returns the number of entities loaded.
    pub fn load_from_bytes(&mut self, bytes: &[u8]) -> Result<usize> {
        let persisted = crate::persistence::deserialize_world(bytes, &self.registry)?;
        let transform_tag = self.registry.tag_of::<GlobalTransform>();

        for entity in &persisted {
            let tags: Vec<ComponentTag> = entity.components.iter().map(|(tag, _)| *tag).collect();
            let signature = tags.iter().fold(Signature::EMPTY, |sig, &tag| sig.with(tag));
            let columns: Vec<(ComponentTag, ComponentColumn)> = tags
                .iter()
                .filter_map(|&tag| self.registry.info(tag).map(|info| (tag, info.new_column())))
                .collect();

            let archetype_id = self.get_or_create_archetype(signature, |arch| {
                for (tag, column) in columns {
                    arch.adopt_column(tag, column);
                }
            });

            let row_size = self.archetypes[archetype_id].row_size();
            let handle = self.memory.charge(row_size)?;
            let id = match self.entities.create() {
                Ok(id) => id,
                Err(err) => {
                    self.memory.release(handle, row_size);
                    return Err(err);
                }
            };
            self.memory_handles.insert(id, (handle, row_size));

            let row = self.archetypes[archetype_id].allocate_row(id);
            crate::storage::deserialize_entity(&mut self.archetypes[archetype_id], row, &self.registry, &entity.components)?;

            self.locations.insert(id, EntityLocation { archetype_id, archetype_row: row });
            self.created_tick.insert(id, self.tick);
            self.modified_tick.insert(id, self.tick);

            if let Some(tt) = transform_tag {
                if signature.contains(tt) {
                    if let Some(transform) = self.get_component::<GlobalTransform>(id) {
                        self.spatial_index.upsert(id, transform.position);
                    }
                }
            }

            for &tag in &tags {
                self.query_engine.invalidate_for_tag(tag);
            }
        }

        Ok(persisted.len())
    }
}

impl Default for World {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq)]
    struct Position {
        x: f32,
        y: f32,
    }

    #[derive(Debug, Clone, Copy, PartialEq)]
    struct Velocity {
        dx: f32,
    }

    #[test]
    fn spawn_despawn_roundtrips() {
        let mut world = World::new();
        let e = world.spawn((Position { x: 1.0, y: 2.0 },)).unwrap();
        assert!(world.is_alive(e));
        assert_eq!(world.get_component::<Position>(e), Some(&Position { x: 1.0, y: 2.0 }));

        world.despawn(e).unwrap();
        assert!(!world.is_alive(e));
        assert_eq!(world.get_component::<Position>(e), None);
    }

    #[test]
    fn distinct_bundles_segregate_into_distinct_archetypes() {
        let mut world = World::new();
        world.spawn((Position { x: 0.0, y: 0.0 },)).unwrap();
        world.spawn((Position { x: 0.0, y: 0.0 }, Velocity { dx: 1.0 })).unwrap();

        // empty archetype + two bundle archetypes
        assert_eq!(world.archetype_count(), 3);
    }

    #[test]
    fn add_component_moves_entity_to_new_archetype_and_preserves_existing_data() {
        let mut world = World::new();
        let e = world.spawn((Position { x: 3.0, y: 4.0 },)).unwrap();
        world.add_component(e, Velocity { dx: 9.0 }).unwrap();

        assert_eq!(world.get_component::<Position>(e), Some(&Position { x: 3.0, y: 4.0 }));
        assert_eq!(world.get_component::<Velocity>(e), Some(&Velocity { dx: 9.0 }));
    }

    #[test]
    fn remove_component_returns_value_and_drops_column() {
        let mut world = World::new();
        let e = world.spawn((Position { x: 1.0, y: 1.0 }, Velocity { dx: 5.0 })).unwrap();
        let removed = world.remove_component::<Velocity>(e).unwrap();
        assert_eq!(removed, Velocity { dx: 5.0 });
        assert!(!world.has_component::<Velocity>(e));
        assert_eq!(world.get_component::<Position>(e), Some(&Position { x: 1.0, y: 1.0 }));
    }

    #[test]
    fn remove_component_on_entity_without_it_errors() {
        let mut world = World::new();
        let e = world.spawn((Position { x: 0.0, y: 0.0 },)).unwrap();
        assert!(matches!(
            world.remove_component::<Velocity>(e),
            Err(EcsError::ComponentNotFound { .. })
        ));
    }

    #[test]
    fn save_and_load_roundtrip_preserves_persistable_components() {
        let mut world = World::new();
        world
            .register_component_with::<Position>(crate::component::RegistrationOptions {
                persistable: true,
                allowed_in_mod: false,
                validator: None,
            })
            .unwrap();
        world.spawn((Position { x: 3.0, y: 4.0 },)).unwrap();
        world.spawn((Position { x: 1.0, y: 1.0 }, Velocity { dx: 2.0 })).unwrap();

        let bytes = world.save_to_bytes();

        let mut loaded = World::new();
        loaded
            .register_component_with::<Position>(crate::component::RegistrationOptions {
                persistable: true,
                allowed_in_mod: false,
                validator: None,
            })
            .unwrap();
        let count = loaded.load_from_bytes(&bytes).unwrap();
        assert_eq!(count, 2);

        let result = loaded
            .query(QuerySpec::new().require(loaded.registry.tag_of::<Position>().unwrap()))
            .unwrap();
        assert_eq!(result.entities.len(), 2);
    }

    #[test]
    fn query_finds_spawned_entities_by_required_component() {
        let mut world = World::new();
        let tag = world.register_component::<Position>().unwrap();
        let e1 = world.spawn((Position { x: 0.0, y: 0.0 },)).unwrap();
        world.spawn((Velocity { dx: 1.0 },)).unwrap();

        let result = world.query(QuerySpec::new().require(tag)).unwrap();
        assert_eq!(result.entities, vec![e1]);
    }

    #[test]
    fn hierarchy_delegates_to_entity_manager() {
        let mut world = World::new();
        let parent = world.spawn(()).unwrap();
        let child = world.spawn(()).unwrap();
        world.set_parent(child, parent).unwrap();
        assert_eq!(world.parent(child), Some(parent));
        assert_eq!(world.children(parent), &[child]);
    }

    #[test]
    fn resource_insert_get_remove_roundtrips() {
        let mut world = World::new();
        assert!(world.insert_resource(42u32).is_none());
        assert_eq!(world.get_resource::<u32>(), Some(&42));
        *world.get_resource_mut::<u32>().unwrap() += 1;
        assert_eq!(world.remove_resource::<u32>(), Some(43));
        assert_eq!(world.get_resource::<u32>(), None);
    }

    #[test]
    fn despawn_unknown_entity_errors() {
        let mut world = World::new();
        let e = world.spawn(()).unwrap();
        world.despawn(e).unwrap();
        assert!(matches!(world.despawn(e), Err(EcsError::EntityNotFound(_))));
    }
}
