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

//! A narrowed, quota-enforcing facade over [`crate::world::World`] for untrusted mod
//! code: every entity it creates is auto-tagged `mod:<mod_id>` so ownership can be
//! checked on destroy/mutate, and every operation is checked against the mod's
//! `ModContext` before reaching the world.

use std::time::Duration;

use crate::component::Component;
use crate::entity::EntityId;
use crate::error::{EcsError, Result};
use crate::query::{QueryResult, QuerySpec};
use crate::world::World;

/// Fixed per-entity byte charge against a mod's memory quota, independent of the
/// entity's actual component payload size — a coarse accounting unit, not a precise one.
const ENTITY_BYTE_COST: usize = 64;

/// Per-mod resource and permission limits.
#[derive(Debug, Clone)]
pub struct ModContext {
    pub mod_id: String,
    pub max_entities: usize,
    pub max_memory_bytes: usize,
    pub max_system_update_time: Duration,
    pub allowed_components: Vec<&'static str>,
    pub max_queries_per_frame: usize,
}

impl ModContext {
    fn owner_tag(&self) -> String {
        format!("mod:{}", self.mod_id)
    }

    fn component_allowed(&self, name: &str) -> bool {
        self.allowed_components.iter().any(|&c| c == name)
    }
}

/// Static validator rejecting system identifiers that look like path traversal,
/// destructive shell invocations, URL schemes, or system-file access. Repeated
/// violations by the same mod should be escalated by the caller to `SecurityViolation`.
pub fn validate_system_id(id: &str) -> bool {
    const BANNED_SUBSTRINGS: [&str; 9] =
        ["../", "..\\", "rm -rf", "sudo ", "://", "/etc/", "/proc/", "cmd.exe", "powershell"];
    !BANNED_SUBSTRINGS.iter().any(|&pattern| id.contains(pattern))
}

/// Quota-enforcing facade a mod host hands to untrusted mod code.
pub struct ModSandbox<'w> {
    world: &'w mut World,
    context: ModContext,
    entities_created: usize,
    memory_used: usize,
    queries_this_frame: usize,
    violations: u32,
}

impl<'w> ModSandbox<'w> {
    pub fn new(world: &'w mut World, context: ModContext) -> Self {
        Self { world, context, entities_created: 0, memory_used: 0, queries_this_frame: 0, violations: 0 }
    }

    /// Reset the per-frame query counter, called by the host once per frame.
    pub fn begin_frame(&mut self) {
        self.queries_this_frame = 0;
    }

    fn is_owned(&self, entity: EntityId) -> bool {
        self.world.tag_of(entity) == Some(self.context.owner_tag().as_str())
    }

    /// Spawn a single-component entity, auto-tagged with this mod's ownership tag and
    /// charged against the mod's entity and memory quotas.
    pub fn spawn<T: Component>(&mut self, component: T) -> Result<EntityId> {
        let type_name = std::any::type_name::<T>();
        if !self.context.component_allowed(type_name) {
            return Err(EcsError::ComponentNotAllowed { mod_id: self.context.mod_id.clone(), component: type_name });
        }
        if self.entities_created >= self.context.max_entities {
            return Err(EcsError::PermissionDenied { mod_id: self.context.mod_id.clone(), entity: None });
        }
        if self.memory_used + ENTITY_BYTE_COST > self.context.max_memory_bytes {
            return Err(EcsError::MemoryLimitExceeded {
                requested: ENTITY_BYTE_COST,
                limit: self.context.max_memory_bytes,
            });
        }

        let entity = self.world.spawn((component,))?;
        if let Err(e) = self.world.tag_entity(entity, self.context.owner_tag()) {
            let _ = self.world.despawn(entity);
            return Err(e);
        }

        self.entities_created += 1;
        self.memory_used += ENTITY_BYTE_COST;
        Ok(entity)
    }

    /// Destroy a mod-owned entity. Rejects non-owned entities with `PermissionDenied`
    /// and untagged (system-owned) entities with `SystemEntityAccessDenied`.
    pub fn despawn(&mut self, entity: EntityId) -> Result<()> {
        match self.world.tag_of(entity) {
            Some(tag) if tag == self.context.owner_tag() => {
                self.world.despawn(entity)?;
                self.memory_used = self.memory_used.saturating_sub(ENTITY_BYTE_COST);
                Ok(())
            }
            Some(_) => Err(EcsError::PermissionDenied { mod_id: self.context.mod_id.clone(), entity: Some(entity) }),
            None => Err(EcsError::SystemEntityAccessDenied { mod_id: self.context.mod_id.clone(), entity }),
        }
    }

    /// Add a component to a mod-owned entity.
    pub fn add_component<T: Component>(&mut self, entity: EntityId, component: T) -> Result<()> {
        let type_name = std::any::type_name::<T>();
        if !self.context.component_allowed(type_name) {
            return Err(EcsError::ComponentNotAllowed { mod_id: self.context.mod_id.clone(), component: type_name });
        }
        if !self.is_owned(entity) {
            return Err(EcsError::PermissionDenied { mod_id: self.context.mod_id.clone(), entity: Some(entity) });
        }
        self.world.add_component(entity, component)
    }

    /// Run a query, counted against the mod's per-frame quota and filtered to entities
    /// this mod owns.
    pub fn query(&mut self, spec: QuerySpec) -> Result<QueryResult> {
        if self.queries_this_frame >= self.context.max_queries_per_frame {
            return Err(EcsError::QueryLimitExceeded {
                mod_id: self.context.mod_id.clone(),
                limit: self.context.max_queries_per_frame,
            });
        }
        self.queries_this_frame += 1;

        let mut result = self.world.query(spec)?;
        let owner_tag = self.context.owner_tag();
        let world = &self.world;
        result.entities.retain(|&id| world.tag_of(id) == Some(owner_tag.as_str()));
        result.count = result.entities.len();
        Ok(result)
    }

    /// Validate a system's declared execution-time cap against this mod's limit.
    pub fn validate_system_timeout(&self, declared: Duration) -> Result<()> {
        if declared > self.context.max_system_update_time {
            return Err(EcsError::ExecutionTimeExceedsLimit {
                mod_id: self.context.mod_id.clone(),
                declared_ms: declared.as_millis() as u64,
                cap_ms: self.context.max_system_update_time.as_millis() as u64,
            });
        }
        Ok(())
    }

    /// Validate a system identifier string, escalating to a terminal `SecurityViolation`
    /// after three rejected attempts from this sandbox.
    pub fn validate_system_id(&mut self, id: &str) -> Result<()> {
        if validate_system_id(id) {
            return Ok(());
        }
        self.violations += 1;
        if self.violations >= 3 {
            return Err(EcsError::SecurityViolation {
                mod_id: self.context.mod_id.clone(),
                reason: format!("repeated invalid system identifier: {id}"),
            });
        }
        Err(EcsError::InvalidComponentType("system identifier failed security validation"))
    }
}
