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

//! Component and Bundle traits, and the runtime component-type registry.
//!
//! Components are data attached to entities. Bundles group multiple components for
//! spawning. The registry assigns each registered Rust type a small integer tag
//! (at most 64, see [`crate::bitset::Signature`]) carrying the vtable the rest of the
//! runtime dispatches through: size hint, validator, serializer, and the
//! persistable/allowed-in-mod flags.

use std::any::TypeId;
use std::sync::Arc;

use ahash::AHashMap;
use smallvec::{smallvec, SmallVec};

use crate::archetype::Archetype;
use crate::error::{EcsError, Result};

/// Maximum number of components supported by Bundle implementations
pub const MAX_BUNDLE_COMPONENTS: usize = 8;

/// Maximum number of distinct component types the bitset layer can represent.
pub const MAX_COMPONENT_TYPES: usize = 64;

/// Marker trait for components
///
/// Components must be 'static (no borrowed data)
pub trait Component: 'static + Send + Sync {}

/// Automatically implement Component for all valid types
impl<T: 'static + Send + Sync> Component for T {}

/// A small integer tag (0..64) identifying a registered component type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ComponentTag(pub u8);

/// The per-type vtable the specification requires: size hint, validator, serializer,
/// persistable flag, allowed-in-mod flag. Operates over raw bytes since the store keeps
/// components as opaque payloads; typed registration callers supply typed closures which
/// are wrapped once at registration time.
pub struct ComponentTypeInfo {
    pub tag: ComponentTag,
    pub type_id: TypeId,
    pub name: &'static str,
    pub size_hint: usize,
    pub persistable: bool,
    pub allowed_in_mod: bool,
    validator: Option<Arc<dyn Fn(&[u8]) -> bool + Send + Sync>>,
    serializer: Option<Arc<dyn Fn(&[u8]) -> Vec<u8> + Send + Sync>>,
    deserializer: Option<Arc<dyn Fn(&[u8]) -> Option<Vec<u8>> + Send + Sync>>,
    column_factory: Arc<dyn Fn() -> crate::archetype::ComponentColumn + Send + Sync>,
}

impl ComponentTypeInfo {
    pub fn validate(&self, bytes: &[u8]) -> bool {
        self.validator.as_ref().map(|v| v(bytes)).unwrap_or(true)
    }

    /// Encode a payload for the persistence byte stream. Defaults to an identity copy
    /// of the raw bytes, since the store already treats payloads as opaque blobs.
    pub fn serialize(&self, bytes: &[u8]) -> Vec<u8> {
        self.serializer.as_ref().map(|s| s(bytes)).unwrap_or_else(|| bytes.to_vec())
    }

    /// Decode a payload read back from the persistence byte stream. Returns `None` if
    /// the encoded bytes are malformed for this type.
    pub fn deserialize(&self, bytes: &[u8]) -> Option<Vec<u8>> {
        match &self.deserializer {
            Some(d) => d(bytes),
            None => Some(bytes.to_vec()),
        }
    }

    /// The "allocation factory": a zeroed block of `size_hint` bytes, which callers
    /// overwrite with the real payload on add.
    pub fn zero_block(&self) -> Vec<u8> {
        vec![0u8; self.size_hint]
    }

    /// Build an empty column for this type from just its runtime tag, used by the
    /// persistence load path where only the saved signature, not a static type
    /// parameter, is available.
    pub fn new_column(&self) -> crate::archetype::ComponentColumn {
        (self.column_factory)()
    }
}

/// Optional per-type hooks supplied at registration, wrapped into byte-level callbacks.
pub struct RegistrationOptions<T> {
    pub persistable: bool,
    pub allowed_in_mod: bool,
    pub validator: Option<Arc<dyn Fn(&T) -> bool + Send + Sync>>,
}

// Manual impl: the derived one would add a spurious `T: Default` bound, but every
// field here is `Default`-able independent of `T` (`Option` doesn't need it).
impl<T> Default for RegistrationOptions<T> {
    fn default() -> Self {
        Self { persistable: false, allowed_in_mod: false, validator: None }
    }
}

/// Runtime registry mapping Rust types to small integer [`ComponentTag`]s.
pub struct ComponentRegistry {
    by_type: AHashMap<TypeId, ComponentTag>,
    by_name: AHashMap<&'static str, ComponentTag>,
    infos: Vec<ComponentTypeInfo>,
}

impl ComponentRegistry {
    pub fn new() -> Self {
        Self {
            by_type: AHashMap::new(),
            by_name: AHashMap::new(),
            infos: Vec::new(),
        }
    }

    /// Register `T` with default options (not persistable, not mod-allowed, no
    /// validator). Idempotent: re-registering an already-known type returns its
    /// existing tag.
    pub fn register<T: Component>(&mut self) -> Result<ComponentTag> {
        self.register_with::<T>(RegistrationOptions::default())
    }

    pub fn register_with<T: Component>(
        &mut self,
        opts: RegistrationOptions<T>,
    ) -> Result<ComponentTag> {
        let type_id = TypeId::of::<T>();
        if let Some(&tag) = self.by_type.get(&type_id) {
            return Ok(tag);
        }

        if self.infos.len() >= MAX_COMPONENT_TYPES {
            return Err(EcsError::ComponentTagsExhausted);
        }

        let tag = ComponentTag(self.infos.len() as u8);
        let validator = opts.validator.map(|v| {
            let cb: Arc<dyn Fn(&[u8]) -> bool + Send + Sync> = Arc::new(move |bytes: &[u8]| {
                if bytes.len() < std::mem::size_of::<T>() {
                    return false;
                }
                // SAFETY: bytes originate from a ComponentColumn<T> slot, sized and
                // aligned for T by construction.
                let value = unsafe { &*(bytes.as_ptr() as *const T) };
                v(value)
            });
            cb
        });

        let name = std::any::type_name::<T>();
        self.infos.push(ComponentTypeInfo {
            tag,
            type_id,
            name,
            size_hint: std::mem::size_of::<T>(),
            persistable: opts.persistable,
            allowed_in_mod: opts.allowed_in_mod,
            validator,
            serializer: None,
            deserializer: None,
            column_factory: Arc::new(crate::archetype::ComponentColumn::new::<T>),
        });
        self.by_type.insert(type_id, tag);
        self.by_name.insert(name, tag);
        Ok(tag)
    }

    pub fn tag_of<T: Component>(&self) -> Option<ComponentTag> {
        self.by_type.get(&TypeId::of::<T>()).copied()
    }

    /// Resolve a tag from a `TypeId` directly, used by bundle spawning where the
    /// caller only has `Bundle::type_ids()` to work with, not the concrete types.
    pub fn tag_of_type_id(&self, type_id: TypeId) -> Option<ComponentTag> {
        self.by_type.get(&type_id).copied()
    }

    pub fn tag_by_name(&self, name: &str) -> Option<ComponentTag> {
        self.by_name.get(name).copied()
    }

    pub fn info(&self, tag: ComponentTag) -> Option<&ComponentTypeInfo> {
        self.infos.get(tag.0 as usize)
    }

    pub fn len(&self) -> usize {
        self.infos.len()
    }

    pub fn is_empty(&self) -> bool {
        self.infos.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ComponentTypeInfo> {
        self.infos.iter()
    }
}

impl Default for ComponentRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Bundle of components
///
/// Allows spawning entities with multiple components at once.
pub trait Bundle: Send + Sync + 'static {
    /// Get type IDs of all components in bundle
    fn type_ids() -> SmallVec<[TypeId; MAX_BUNDLE_COMPONENTS]>
    where
        Self: Sized;

    /// Ensure component columns exist in an archetype
    fn register_components(archetype: &mut Archetype, registry: &mut ComponentRegistry)
    where
        Self: Sized;

    /// Write components to raw pointers
    ///
    /// # Safety
    /// Caller must ensure pointers are valid and properly aligned
    unsafe fn write_components(self, ptrs: &[*mut u8]);
}

// Macro for tuple Bundle implementations
macro_rules! impl_bundle {
    ($($T:ident),*) => {
        impl<$($T: Component),*> Bundle for ($($T,)*) {
            fn type_ids() -> SmallVec<[TypeId; MAX_BUNDLE_COMPONENTS]> {
                smallvec![$(TypeId::of::<$T>()),*]
            }

            fn register_components(archetype: &mut Archetype, registry: &mut ComponentRegistry) {
                $(
                    let tag = registry.register::<$T>().expect("component tag space exhausted");
                    archetype.register_component::<$T>(tag);
                )*
            }

            #[allow(non_snake_case)]
            unsafe fn write_components(self, ptrs: &[*mut u8]) {
                let ($($T,)*) = self;
                let mut i = 0;
                $(
                    std::ptr::write(ptrs[i] as *mut $T, $T);
                    i += 1;
                )*
                let _ = i;
            }
        }
    };
}

impl_bundle!();
impl_bundle!(A);
impl_bundle!(A, B);
impl_bundle!(A, B, C);
impl_bundle!(A, B, C, D);
impl_bundle!(A, B, C, D, E);
impl_bundle!(A, B, C, D, E, F);
impl_bundle!(A, B, C, D, E, F, G);
impl_bundle!(A, B, C, D, E, F, G, H);
