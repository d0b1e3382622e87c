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

//! Archetype storage with row allocation and removal.
//!
//! Archetypes group entities that share the same [`Signature`] and store their
//! component payloads column-major (Structure of Arrays), keyed by [`ComponentTag`]
//! rather than `TypeId` so the signature fits in a single 64-bit word.

use rustc_hash::FxHashMap;

use crate::bitset::Signature;
use crate::component::{Component, ComponentTag};
use crate::entity::EntityId;

/// Archetype: Structure of Arrays storage
pub struct Archetype {
    signature: Signature,
    entities: Vec<EntityId>,
    components: Vec<ComponentColumn>,
    component_indices: FxHashMap<ComponentTag, usize>,
    columns_initialized: bool,
}

impl Archetype {
    /// Create new archetype
    pub fn new(signature: Signature) -> Self {
        Self {
            signature,
            entities: Vec::new(),
            components: Vec::new(),
            component_indices: FxHashMap::default(),
            columns_initialized: false,
        }
    }

    /// Get signature
    pub fn signature(&self) -> Signature {
        self.signature
    }

    /// Allocate row for entity
    pub fn allocate_row(&mut self, entity: EntityId) -> usize {
        let row = self.entities.len();
        self.entities.push(entity);
        for column in &mut self.components {
            column.push_zeroed();
        }
        row
    }

    /// Remove row and return entity that was swapped in
    ///
    /// # Safety
    /// Caller must ensure `row` is a valid index within this archetype.
    /// Returns Some(entity) if another entity was swapped into this row.
    pub unsafe fn remove_row(&mut self, row: usize) -> Option<EntityId> {
        if row >= self.entities.len() {
            return None;
        }

        self.entities.swap_remove(row);
        for column in &mut self.components {
            column.swap_remove_drop(row);
        }

        if row < self.entities.len() {
            Some(self.entities[row])
        } else {
            None
        }
    }

    /// Remove the row at `row` without running any column's drop function, used during
    /// an add/remove-component migration where `World` has already taken ownership of
    /// every payload in this row (copied forward into the destination archetype, or
    /// read out by value for a removed component). Returns the entity swapped into
    /// `row`, if any.
    ///
    /// # Safety
    /// Caller must ensure `row` is valid and that every column's payload at `row` has
    /// already been moved out, or a double-drop/use-after-move follows.
    pub unsafe fn remove_row_forget(&mut self, row: usize) -> Option<EntityId> {
        if row >= self.entities.len() {
            return None;
        }

        self.entities.swap_remove(row);
        for column in &mut self.components {
            column.swap_remove_forget(row);
        }

        if row < self.entities.len() {
            Some(self.entities[row])
        } else {
            None
        }
    }

    /// Get column immutably
    pub fn get_column(&self, tag: ComponentTag) -> Option<&ComponentColumn> {
        let idx = *self.component_indices.get(&tag)?;
        self.components.get(idx)
    }

    /// Get column by index
    pub fn get_column_by_index(&self, index: usize) -> Option<&ComponentColumn> {
        self.components.get(index)
    }

    /// Get column mutably
    pub fn get_column_mut(&mut self, tag: ComponentTag) -> Option<&mut ComponentColumn> {
        let idx = *self.component_indices.get(&tag)?;
        self.components.get_mut(idx)
    }

    /// Get column index for a component tag
    pub fn column_index(&self, tag: ComponentTag) -> Option<usize> {
        self.component_indices.get(&tag).copied()
    }

    /// Get component column by precomputed index
    pub fn get_column_mut_by_index(&mut self, index: usize) -> Option<&mut ComponentColumn> {
        self.components.get_mut(index)
    }

    /// Get mutable slice of component columns
    pub(crate) fn components_mut(&mut self) -> &mut [ComponentColumn] {
        &mut self.components
    }

    /// Reserve space for additional rows
    pub fn reserve_rows(&mut self, additional: usize) {
        if self.entities.capacity() - self.entities.len() < additional {
            self.entities.reserve(additional);
            for column in &mut self.components {
                column.data.reserve(additional * column.item_size);
            }
        }
    }

    /// Get all entities
    pub fn entities(&self) -> &[EntityId] {
        &self.entities
    }

    /// Number of entities
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    /// Is empty
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Register a component column for `T` under `tag`, back-filling zeroed slots for
    /// rows already allocated in this archetype (so columns stay row-aligned even when
    /// added after entities already exist, e.g. during a bundle-driven transition).
    pub fn register_component<T: Component>(&mut self, tag: ComponentTag) {
        if !self.component_indices.contains_key(&tag) {
            let mut column = ComponentColumn::new::<T>();
            for _ in 0..self.entities.len() {
                column.push_zeroed();
            }
            let idx = self.components.len();
            self.components.push(column);
            self.component_indices.insert(tag, idx);
            self.signature.set(tag);
        }
    }

    /// Adopt a pre-built column under `tag` without knowing its concrete type, used
    /// when migrating an entity to a new archetype during add/remove-component: the
    /// other tags' columns are cloned structurally (via [`ComponentColumn::clone_empty`])
    /// from the source archetype rather than re-registered from a static type. Backfills
    /// zeroed slots the same way [`Self::register_component`] does.
    pub fn adopt_column(&mut self, tag: ComponentTag, mut column: ComponentColumn) {
        if self.component_indices.contains_key(&tag) {
            return;
        }
        for _ in 0..self.entities.len() {
            column.push_zeroed();
        }
        let idx = self.components.len();
        self.components.push(column);
        self.component_indices.insert(tag, idx);
        self.signature.set(tag);
    }

    /// Total bytes one row occupies across every column, used by the memory manager to
    /// charge/release a per-entity budget on spawn, despawn, and archetype migration.
    pub fn row_size(&self) -> usize {
        self.components.iter().map(|c| c.item_size()).sum()
    }

    /// Check if all component columns have been initialized for this signature
    pub fn columns_initialized(&self) -> bool {
        self.columns_initialized
    }

    /// Mark columns as initialized
    pub fn mark_columns_initialized(&mut self) {
        self.columns_initialized = true;
    }
}

/// Type-erased component column
pub struct ComponentColumn {
    data: Vec<u8>,
    item_size: usize,
    drop_fn: Option<unsafe fn(*mut u8)>,
}

impl ComponentColumn {
    /// Create new column for type T
    pub fn new<T: Component>() -> Self {
        Self {
            data: Vec::new(),
            item_size: std::mem::size_of::<T>(),
            drop_fn: if std::mem::needs_drop::<T>() {
                Some(|ptr| unsafe {
                    std::ptr::drop_in_place(ptr as *mut T);
                })
            } else {
                None
            },
        }
    }

    /// Append a zero-filled slot, keeping the column aligned with the archetype's rows.
    pub fn push_zeroed(&mut self) {
        self.data.resize(self.data.len() + self.item_size, 0);
    }

    /// Swap-remove the slot at `row`, dropping its previous contents in place first.
    pub fn swap_remove_drop(&mut self, row: usize) {
        let count = self.len();
        if row >= count {
            return;
        }
        let offset = row * self.item_size;
        if let Some(drop_fn) = self.drop_fn {
            unsafe { drop_fn(self.data.as_mut_ptr().add(offset)) };
        }
        let last = count - 1;
        if row != last {
            let last_offset = last * self.item_size;
            // SAFETY: offset and last_offset are distinct, in-bounds, item_size-wide
            // regions of `data`.
            unsafe {
                let ptr = self.data.as_mut_ptr();
                std::ptr::copy_nonoverlapping(ptr.add(last_offset), ptr.add(offset), self.item_size);
            }
        }
        self.data.truncate(last * self.item_size);
    }

    /// Swap-remove the slot at `row` without running the drop function, used when the
    /// caller has already taken ownership of the payload (moved it to another archetype
    /// or read it out by value).
    pub fn swap_remove_forget(&mut self, row: usize) {
        let count = self.len();
        if row >= count {
            return;
        }
        let offset = row * self.item_size;
        let last = count - 1;
        if row != last {
            let last_offset = last * self.item_size;
            // SAFETY: offset and last_offset are distinct, in-bounds, item_size-wide
            // regions of `data`.
            unsafe {
                let ptr = self.data.as_mut_ptr();
                std::ptr::copy_nonoverlapping(ptr.add(last_offset), ptr.add(offset), self.item_size);
            }
        }
        self.data.truncate(last * self.item_size);
    }

    /// Get mutable pointer for writing
    pub fn get_ptr_mut(&mut self, index: usize) -> *mut u8 {
        let offset = index * self.item_size;
        if offset + self.item_size > self.data.len() {
            self.data.resize(offset + self.item_size, 0);
        }
        unsafe { self.data.as_mut_ptr().add(offset) }
    }

    /// Get raw bytes for a slot, used by the persistence codec and validators.
    pub fn get_bytes(&self, index: usize) -> Option<&[u8]> {
        let offset = index * self.item_size;
        if offset + self.item_size > self.data.len() {
            return None;
        }
        Some(&self.data[offset..offset + self.item_size])
    }

    /// Overwrite a slot's raw bytes, used by the persistence codec on load.
    pub fn set_bytes(&mut self, index: usize, bytes: &[u8]) {
        debug_assert_eq!(bytes.len(), self.item_size);
        let ptr = self.get_ptr_mut(index);
        unsafe {
            std::ptr::copy_nonoverlapping(bytes.as_ptr(), ptr, self.item_size);
        }
    }

    /// Get component at index
    pub fn get<T: Component>(&self, index: usize) -> Option<&T> {
        let offset = index * self.item_size;
        if offset + self.item_size > self.data.len() {
            return None;
        }
        Some(unsafe { &*(self.data.as_ptr().add(offset) as *const T) })
    }

    /// Get mutable component at index
    pub fn get_mut<T: Component>(&mut self, index: usize) -> Option<&mut T> {
        let offset = index * self.item_size;
        if offset + self.item_size > self.data.len() {
            return None;
        }
        Some(unsafe { &mut *(self.data.as_mut_ptr().add(offset) as *mut T) })
    }

    /// Item size in bytes, used by the memory manager's size-class accounting.
    pub fn item_size(&self) -> usize {
        self.item_size
    }

    /// A column with the same item layout and drop behavior but no rows, used to
    /// replicate a component's storage shape into a new archetype during a
    /// migration without needing the concrete component type at the call site.
    pub fn clone_empty(&self) -> Self {
        Self {
            data: Vec::new(),
            item_size: self.item_size,
            drop_fn: self.drop_fn,
        }
    }

    /// Number of components
    pub fn len(&self) -> usize {
        if self.item_size == 0 {
            0
        } else {
            self.data.len() / self.item_size
        }
    }

    /// Is empty
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl Drop for ComponentColumn {
    fn drop(&mut self) {
        if let Some(drop_fn) = self.drop_fn {
            let count = self.len();
            for i in 0..count {
                let offset = i * self.item_size;
                unsafe {
                    drop_fn(self.data.as_mut_ptr().add(offset));
                }
            }
        }
    }
}
