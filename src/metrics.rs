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

//! Consolidated metrics surface: per-system timing (`SystemProfiler`), query cache
//! hit/miss/eviction counters, memory accounting, and event throughput, gathered into
//! one snapshot for the admin surface or a host's diagnostic overlay.

use crate::event_bus::EventBus;
use crate::executor::{SystemProfiler, SystemStats};
use crate::memory::{MemoryManager, MemoryStats};
use crate::query::QueryCacheStats;
use crate::system::SystemId;

/// A point-in-time rollup of every subsystem that tracks its own statistics.
#[derive(Debug, Clone, Default)]
pub struct Metrics {
    pub query_cache: QueryCacheStats,
    pub memory: MemoryStats,
    pub events_processed: u64,
}

impl Metrics {
    pub fn gather(query_cache: QueryCacheStats, memory: &MemoryManager, event_bus: &EventBus) -> Self {
        Self { query_cache, memory: memory.stats(), events_processed: event_bus.processed_count() }
    }

    pub fn system_stats(profiler: &SystemProfiler, id: SystemId) -> Option<SystemStats> {
        profiler.get_stats(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gather_combines_subsystem_snapshots() {
        let memory = MemoryManager::new(Some(1024), false);
        let event_bus = EventBus::new();
        let metrics = Metrics::gather(QueryCacheStats::default(), &memory, &event_bus);
        assert_eq!(metrics.memory.current_usage, 0);
        assert_eq!(metrics.events_processed, 0);
    }
}
