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

//! Contract-only value types for an external admin surface: world status, entity
//! inspection, component mutation, system enable/disable, query execution, cache
//! stats, save-slot CRUD, and a metrics snapshot. No transport is implemented here —
//! a collaborator (HTTP, RPC, in-process tool) drives a `World` through these request
//! types and returns these response shapes.

use std::time::UNIX_EPOCH;

use serde::{Deserialize, Serialize};

use crate::entity::EntityId;
use crate::error::EcsError;
use crate::query::{QueryCacheStats, QuerySpec};
use crate::system::SystemId;

/// Successful response envelope wrapping typed `data`, with optional paging metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminResponse<T> {
    pub success: bool,
    pub data: T,
    pub paging: Option<PagingMeta>,
}

impl<T> AdminResponse<T> {
    pub fn ok(data: T) -> Self {
        Self { success: true, data, paging: None }
    }

    pub fn with_paging(data: T, paging: PagingMeta) -> Self {
        Self { success: true, data, paging: Some(paging) }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PagingMeta {
    pub offset: usize,
    pub limit: usize,
    pub total: usize,
}

/// Error response envelope, mirroring the uniform `{code, message, details?, timestamp}`
/// shape every `EcsError` variant already exposes via `.code()`/`Display`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminError {
    pub success: bool,
    pub code: String,
    pub message: String,
    pub details: Option<String>,
    pub timestamp: u64,
}

impl From<&EcsError> for AdminError {
    fn from(err: &EcsError) -> Self {
        let timestamp = err
            .timestamp()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        Self {
            success: false,
            code: err.code().to_string(),
            message: err.to_string(),
            details: None,
            timestamp,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default)]
pub struct WorldStatus {
    pub entity_count: usize,
    pub archetype_count: usize,
    pub tick: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntitySummary {
    pub id: EntityId,
    pub tag: Option<String>,
    pub component_count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityDetail {
    pub id: EntityId,
    pub tag: Option<String>,
    pub parent: Option<EntityId>,
    pub children: Vec<EntityId>,
    pub groups: Vec<String>,
    /// Component tags present, each paired with its serialized payload.
    pub components: Vec<(u8, Vec<u8>)>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentUpdateRequest {
    pub entity: EntityId,
    pub component_tag: u8,
    pub payload: Vec<u8>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SystemEnableRequest {
    pub system: SystemId,
    pub enabled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryRequest {
    #[serde(skip, default)]
    pub spec: Option<QuerySpec>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SaveSlotRequest {
    pub slot: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub query_cache: QueryCacheStatsDto,
    pub memory_current_bytes: usize,
    pub memory_peak_bytes: usize,
    pub events_processed: u64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default)]
pub struct QueryCacheStatsDto {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub size: usize,
}

impl From<QueryCacheStats> for QueryCacheStatsDto {
    fn from(stats: QueryCacheStats) -> Self {
        Self { hits: stats.hits, misses: stats.misses, evictions: stats.evictions, size: stats.size }
    }
}

/// A single real-time event pushed over the (out-of-scope) subscription transport.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum AdminStreamEvent {
    EntitySpawned(EntityId),
    EntityDespawned(EntityId),
    MetricsTick(MetricsSnapshot),
}
