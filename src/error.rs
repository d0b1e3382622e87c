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

//! Unified error taxonomy for the runtime.

use crate::entity::EntityId;
use crate::system::SystemId;
use std::fmt;
use std::time::SystemTime;

/// Severity associated with an [`EcsError`] kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Warning,
    Error,
    Critical,
}

/// Structured error carrying the entity/component/system context for the failure.
#[derive(Debug, Clone)]
pub enum EcsError {
    // --- Not-found (warning) ---
    EntityNotFound(EntityId),
    ComponentNotFound { entity: EntityId, component: &'static str },
    SystemNotFound(SystemId),
    SubscriptionNotFound(u64),

    // --- Existence (error) ---
    ComponentExists { entity: EntityId, component: &'static str },
    SystemExists(SystemId),
    ComponentTypeAlreadyRegistered(&'static str),

    // --- Validation (error) ---
    InvalidEntity,
    InvalidComponentType(&'static str),
    InvalidQuery(String),
    ComponentTagsExhausted,

    // --- Capacity (critical, except QueueFull) ---
    EntityLimitReached(usize),
    MemoryLimitExceeded { requested: usize, limit: usize },
    QueryCacheFull(usize),
    QueueFull,

    // --- Concurrency (critical) ---
    DeadlockDetected(String),
    RaceConditionDetected(String),

    // --- Scheduler-specific ---
    SystemDisabled(SystemId),
    CircularDependency { from: SystemId, to: SystemId },
    SystemTimeout { system: SystemId, elapsed_ms: u64 },

    // --- Query ---
    QueryTimeout { partial: bool },

    // --- Event bus ---
    HandlerPanic { subscriber: String, message: String },

    // --- MOD sandbox security (error, escalating to critical) ---
    PermissionDenied { mod_id: String, entity: Option<EntityId> },
    SystemEntityAccessDenied { mod_id: String, entity: EntityId },
    ComponentNotAllowed { mod_id: String, component: &'static str },
    QueryLimitExceeded { mod_id: String, limit: usize },
    ExecutionTimeExceedsLimit { mod_id: String, declared_ms: u64, cap_ms: u64 },
    SecurityViolation { mod_id: String, reason: String },

    // --- Persistence ---
    SerializationError(String),
    DeserializationError(String),
    ChecksumMismatch,
    UnsupportedFormatVersion(u32),

    // --- Hierarchy ---
    HierarchyCycle { child: EntityId, parent: EntityId },
    EmptyTag,

    // --- IO passthrough ---
    IoError(String),
}

impl EcsError {
    /// Timestamp the error was constructed — part of the admin-surface error shape.
    pub fn timestamp(&self) -> SystemTime {
        SystemTime::now()
    }

    pub fn severity(&self) -> Severity {
        use EcsError::*;
        match self {
            EntityNotFound(_) | ComponentNotFound { .. } | SystemNotFound(_)
            | SubscriptionNotFound(_) | SystemTimeout { .. } | QueryTimeout { .. } => {
                Severity::Warning
            }
            QueueFull => Severity::Warning,
            ComponentExists { .. }
            | SystemExists(_)
            | ComponentTypeAlreadyRegistered(_)
            | InvalidEntity
            | InvalidComponentType(_)
            | InvalidQuery(_)
            | ComponentTagsExhausted
            | SystemDisabled(_)
            | CircularDependency { .. }
            | HandlerPanic { .. }
            | PermissionDenied { .. }
            | SystemEntityAccessDenied { .. }
            | ComponentNotAllowed { .. }
            | QueryLimitExceeded { .. }
            | ExecutionTimeExceedsLimit { .. }
            | SerializationError(_)
            | DeserializationError(_)
            | ChecksumMismatch
            | UnsupportedFormatVersion(_)
            | HierarchyCycle { .. }
            | EmptyTag
            | IoError(_) => Severity::Error,
            EntityLimitReached(_)
            | MemoryLimitExceeded { .. }
            | QueryCacheFull(_)
            | DeadlockDetected(_)
            | RaceConditionDetected(_)
            | SecurityViolation { .. } => Severity::Critical,
        }
    }

    /// Stable machine-readable code, used by the admin surface error shape.
    pub fn code(&self) -> &'static str {
        use EcsError::*;
        match self {
            EntityNotFound(_) => "entity_not_found",
            ComponentNotFound { .. } => "component_not_found",
            SystemNotFound(_) => "system_not_found",
            SubscriptionNotFound(_) => "subscription_not_found",
            ComponentExists { .. } => "component_exists",
            SystemExists(_) => "system_exists",
            ComponentTypeAlreadyRegistered(_) => "component_type_already_registered",
            InvalidEntity => "invalid_entity",
            InvalidComponentType(_) => "invalid_component_type",
            InvalidQuery(_) => "invalid_query",
            ComponentTagsExhausted => "component_tags_exhausted",
            EntityLimitReached(_) => "entity_limit_reached",
            MemoryLimitExceeded { .. } => "memory_limit_exceeded",
            QueryCacheFull(_) => "query_cache_full",
            QueueFull => "queue_full",
            DeadlockDetected(_) => "deadlock_detected",
            RaceConditionDetected(_) => "race_condition_detected",
            SystemDisabled(_) => "system_disabled",
            CircularDependency { .. } => "circular_dependency",
            SystemTimeout { .. } => "system_timeout",
            QueryTimeout { .. } => "query_timeout",
            HandlerPanic { .. } => "handler_panic",
            PermissionDenied { .. } => "permission_denied",
            SystemEntityAccessDenied { .. } => "system_entity_access_denied",
            ComponentNotAllowed { .. } => "component_not_allowed",
            QueryLimitExceeded { .. } => "query_limit_exceeded",
            ExecutionTimeExceedsLimit { .. } => "execution_time_exceeds_limit",
            SecurityViolation { .. } => "security_violation",
            SerializationError(_) => "serialization_error",
            DeserializationError(_) => "deserialization_error",
            ChecksumMismatch => "checksum_mismatch",
            UnsupportedFormatVersion(_) => "unsupported_format_version",
            HierarchyCycle { .. } => "hierarchy_cycle",
            EmptyTag => "empty_tag",
            IoError(_) => "io_error",
        }
    }
}

impl fmt::Display for EcsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use EcsError::*;
        match self {
            EntityNotFound(e) => write!(f, "entity not found: {e:?}"),
            ComponentNotFound { entity, component } => {
                write!(f, "component {component} not found on entity {entity:?}")
            }
            SystemNotFound(id) => write!(f, "system not found: {id:?}"),
            SubscriptionNotFound(id) => write!(f, "subscription not found: {id}"),
            ComponentExists { entity, component } => {
                write!(f, "component {component} already present on entity {entity:?}")
            }
            SystemExists(id) => write!(f, "system already registered: {id:?}"),
            ComponentTypeAlreadyRegistered(name) => {
                write!(f, "component type already registered: {name}")
            }
            InvalidEntity => write!(f, "invalid entity id"),
            InvalidComponentType(name) => write!(f, "invalid component type: {name}"),
            InvalidQuery(reason) => write!(f, "invalid query: {reason}"),
            ComponentTagsExhausted => write!(f, "component tag space exhausted (max 64 types)"),
            EntityLimitReached(cap) => write!(f, "entity limit reached: {cap}"),
            MemoryLimitExceeded { requested, limit } => {
                write!(f, "memory limit exceeded: requested {requested}, limit {limit}")
            }
            QueryCacheFull(cap) => write!(f, "query cache full: capacity {cap}"),
            QueueFull => write!(f, "event queue full"),
            DeadlockDetected(msg) => write!(f, "deadlock detected: {msg}"),
            RaceConditionDetected(msg) => write!(f, "race condition detected: {msg}"),
            SystemDisabled(id) => write!(f, "system disabled: {id:?}"),
            CircularDependency { from, to } => {
                write!(f, "adding dependency {from:?} -> {to:?} would create a cycle")
            }
            SystemTimeout { system, elapsed_ms } => {
                write!(f, "system {system:?} exceeded its deadline ({elapsed_ms}ms)")
            }
            QueryTimeout { partial } => write!(f, "query timed out (partial result: {partial})"),
            HandlerPanic { subscriber, message } => {
                write!(f, "handler panicked in subscriber {subscriber}: {message}")
            }
            PermissionDenied { mod_id, entity } => {
                write!(f, "mod {mod_id} denied permission on entity {entity:?}")
            }
            SystemEntityAccessDenied { mod_id, entity } => {
                write!(f, "mod {mod_id} may not access system-owned entity {entity:?}")
            }
            ComponentNotAllowed { mod_id, component } => {
                write!(f, "mod {mod_id} is not allowed to use component {component}")
            }
            QueryLimitExceeded { mod_id, limit } => {
                write!(f, "mod {mod_id} exceeded its per-frame query limit of {limit}")
            }
            ExecutionTimeExceedsLimit { mod_id, declared_ms, cap_ms } => write!(
                f,
                "mod {mod_id} declared execution time {declared_ms}ms exceeds cap {cap_ms}ms"
            ),
            SecurityViolation { mod_id, reason } => {
                write!(f, "security violation by mod {mod_id}: {reason}")
            }
            SerializationError(msg) => write!(f, "serialization error: {msg}"),
            DeserializationError(msg) => write!(f, "deserialization error: {msg}"),
            ChecksumMismatch => write!(f, "checksum mismatch while deserializing world"),
            UnsupportedFormatVersion(v) => write!(f, "unsupported persistence format version: {v}"),
            HierarchyCycle { child, parent } => {
                write!(f, "setting parent {parent:?} of {child:?} would create a cycle")
            }
            EmptyTag => write!(f, "entity tag must not be empty"),
            IoError(msg) => write!(f, "io error: {msg}"),
        }
    }
}

impl std::error::Error for EcsError {}

impl From<std::io::Error> for EcsError {
    fn from(err: std::io::Error) -> Self {
        EcsError::IoError(err.to_string())
    }
}

/// Result type alias used throughout the crate.
pub type Result<T> = std::result::Result<T, EcsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn queue_full_is_recoverable_warning() {
        assert_eq!(EcsError::QueueFull.severity(), Severity::Warning);
    }

    #[test]
    fn entity_limit_is_critical() {
        assert_eq!(EcsError::EntityLimitReached(10).severity(), Severity::Critical);
    }

    #[test]
    fn codes_are_stable_strings() {
        assert_eq!(EcsError::ChecksumMismatch.code(), "checksum_mismatch");
    }
}
