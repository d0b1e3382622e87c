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

//! World construction knobs. `World::with_config` is the only constructor that honors
//! every option here; `World::new` is `with_config(WorldConfig::default())`.

use std::time::Duration;

/// Construction-time knobs for a [`crate::world::World`].
#[derive(Debug, Clone)]
pub struct WorldConfig {
    /// Hard cap on live entities, enforced by `EntityManager::create` as
    /// `EntityLimitReached`.
    pub max_entities: usize,
    /// Cap on bytes charged for archetype-column storage, enforced by the memory manager
    /// as `MemoryLimitExceeded` on spawn or archetype migration. Zero means unlimited.
    pub memory_limit_bytes: usize,
    /// Thread count for a [`crate::worker_pool::WorkerPool`] sized from this config.
    /// Reserved for parallel stage dispatch; the schedule itself currently runs every
    /// stage's systems serially regardless of this value (see `DESIGN.md`).
    pub worker_count: usize,
    /// Capacity of the query result cache (`QueryEngine::new`).
    pub query_cache_capacity: usize,
    /// Capacity of the deferred lifecycle-event queue.
    pub event_queue_capacity: usize,
    /// Worker thread count for the bounded-async event bus mode.
    pub event_worker_count: usize,
    /// Whether `SystemProfiler`/`QueryCacheStats`/`MemoryStats` accumulate.
    pub enable_metrics: bool,
    /// Whether component writes mark `DirtyTracker`/`modified_tick`, enabling
    /// `TemporalConstraint` queries.
    pub enable_change_tracking: bool,
    /// Whether the memory manager tracks per-allocation call sites for `leak_report`.
    pub enable_leak_detection: bool,
    /// Reserved: intended to gate whether the schedule dispatches a stage's independent
    /// systems across worker threads rather than running them in declared order. Not
    /// yet consulted by `Schedule::run_update` (see `DESIGN.md`).
    pub parallel_execution: bool,
    /// Default per-system deadline, used when a system doesn't declare its own via
    /// `System::timeout`.
    pub system_timeout: Option<Duration>,
}

impl Default for WorldConfig {
    /// Generous entity cap, worker count matched to available parallelism, metrics and
    /// change tracking on, leak detection off (it has a cost), parallel execution on.
    fn default() -> Self {
        Self {
            max_entities: 1_000_000,
            memory_limit_bytes: 1024 * 1024 * 1024,
            worker_count: std::thread::available_parallelism().map(|n| n.get()).unwrap_or(4),
            query_cache_capacity: 256,
            event_queue_capacity: 1024,
            event_worker_count: 2,
            enable_metrics: true,
            enable_change_tracking: true,
            enable_leak_detection: false,
            parallel_execution: true,
            system_timeout: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_sane_entity_cap() {
        let config = WorldConfig::default();
        assert!(config.max_entities > 0);
        assert!(config.enable_metrics);
        assert!(config.enable_change_tracking);
        assert!(!config.enable_leak_detection);
    }
}
