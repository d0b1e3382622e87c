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

//! Runtime query engine: a [`QuerySpec`] built at runtime (rather than compile-time
//! generic filter tuples) compiles to a required/excluded/optional [`Signature`]
//! triple, matched against archetypes first and narrowed by predicates,
//! spatial/hierarchical/temporal constraints, ordering, and paging. Results are cached
//! by an explicit string key with a TTL and invalidated by component-tag writes.

use std::sync::Arc;
use std::time::{Duration, Instant};

use ahash::AHashMap;
use glam::Vec3;
use lru::LruCache;

use crate::archetype::Archetype;
use crate::bitset::Signature;
use crate::component::{ComponentRegistry, ComponentTag};
use crate::entity::{EntityId, EntityManager};
use crate::error::{EcsError, Result};
use crate::spatial::{Aabb, SpatialGrid};
use crate::storage::DirtyTracker;

/// How to order a query's result set.
pub enum Ordering {
    /// Archetype-then-row order (stable, not a documented API guarantee).
    None,
    ByEntityId,
    /// Sort by a component's raw bytes, via a caller-supplied comparator.
    ByComponentField {
        tag: ComponentTag,
        compare: Arc<dyn Fn(&[u8], &[u8]) -> std::cmp::Ordering + Send + Sync>,
    },
    Custom(Arc<dyn Fn(EntityId, EntityId) -> std::cmp::Ordering + Send + Sync>),
}

impl Clone for Ordering {
    fn clone(&self) -> Self {
        match self {
            Ordering::None => Ordering::None,
            Ordering::ByEntityId => Ordering::ByEntityId,
            Ordering::ByComponentField { tag, compare } => {
                Ordering::ByComponentField { tag: *tag, compare: compare.clone() }
            }
            Ordering::Custom(f) => Ordering::Custom(f.clone()),
        }
    }
}

/// Spatial constraint over `GlobalTransform` positions. Requires the transform
/// component to be part of the query's required set (enforced at validation time).
#[derive(Clone)]
pub enum SpatialConstraint {
    WithinRadius { center: Vec3, radius: f32 },
    WithinAabb(Aabb),
    IntersectsAabb(Aabb),
    KNearest { point: Vec3, k: usize },
}

/// Constraint over the entity hierarchy, relative to a pivot entity.
#[derive(Clone, Copy)]
pub enum HierarchicalConstraint {
    ChildrenOf(EntityId),
    DescendantsOf(EntityId),
    AncestorsOf(EntityId),
    SiblingsOf(EntityId),
}

/// Constraint requiring change tracking, relative to a world tick.
#[derive(Clone, Copy)]
pub enum TemporalConstraint {
    CreatedAfter(u64),
    ModifiedSince(u64),
}

/// A runtime query specification, built with the fluent setters below.
#[derive(Clone, Default)]
pub struct QuerySpec {
    pub required: Signature,
    pub excluded: Signature,
    pub optional: Signature,
    pub entity_predicate: Option<Arc<dyn Fn(EntityId) -> bool + Send + Sync>>,
    pub component_predicates: Vec<(ComponentTag, Arc<dyn Fn(&[u8]) -> bool + Send + Sync>)>,
    pub ordering: Option<Ordering>,
    pub spatial: Option<SpatialConstraint>,
    pub hierarchical: Option<HierarchicalConstraint>,
    pub temporal: Option<TemporalConstraint>,
    pub cache_key: Option<String>,
    pub cache_ttl: Option<Duration>,
    pub limit: Option<usize>,
    pub offset: usize,
    pub count_only: bool,
    pub distinct_by: Option<ComponentTag>,
    pub timeout: Option<Duration>,
}

impl std::fmt::Debug for QuerySpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QuerySpec")
            .field("required", &self.required)
            .field("excluded", &self.excluded)
            .field("optional", &self.optional)
            .field("has_entity_predicate", &self.entity_predicate.is_some())
            .field("component_predicates", &self.component_predicates.len())
            .field("has_ordering", &self.ordering.is_some())
            .field("cache_key", &self.cache_key)
            .field("cache_ttl", &self.cache_ttl)
            .field("limit", &self.limit)
            .field("offset", &self.offset)
            .field("count_only", &self.count_only)
            .field("distinct_by", &self.distinct_by)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl QuerySpec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn require(mut self, tag: ComponentTag) -> Self {
        self.required.set(tag);
        self
    }

    pub fn exclude(mut self, tag: ComponentTag) -> Self {
        self.excluded.set(tag);
        self
    }

    pub fn optional(mut self, tag: ComponentTag) -> Self {
        self.optional.set(tag);
        self
    }

    pub fn with_entity_predicate(mut self, f: impl Fn(EntityId) -> bool + Send + Sync + 'static) -> Self {
        self.entity_predicate = Some(Arc::new(f));
        self
    }

    pub fn with_component_predicate(
        mut self,
        tag: ComponentTag,
        f: impl Fn(&[u8]) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.component_predicates.push((tag, Arc::new(f)));
        self.required.set(tag);
        self
    }

    pub fn order_by(mut self, ordering: Ordering) -> Self {
        self.ordering = Some(ordering);
        self
    }

    pub fn spatial(mut self, constraint: SpatialConstraint) -> Self {
        self.spatial = Some(constraint);
        self
    }

    pub fn hierarchical(mut self, constraint: HierarchicalConstraint) -> Self {
        self.hierarchical = Some(constraint);
        self
    }

    pub fn temporal(mut self, constraint: TemporalConstraint) -> Self {
        self.temporal = Some(constraint);
        self
    }

    pub fn cached(mut self, key: impl Into<String>, ttl: Option<Duration>) -> Self {
        self.cache_key = Some(key.into());
        self.cache_ttl = ttl;
        self
    }

    pub fn limit(mut self, n: usize) -> Self {
        self.limit = Some(n);
        self
    }

    pub fn offset(mut self, n: usize) -> Self {
        self.offset = n;
        self
    }

    pub fn count_only(mut self, yes: bool) -> Self {
        self.count_only = yes;
        self
    }

    pub fn distinct_by(mut self, tag: ComponentTag) -> Self {
        self.distinct_by = Some(tag);
        self
    }

    /// Bound the wall-clock time spent scanning candidates. If the budget is exceeded
    /// before every archetype has been scanned, `execute` returns `QueryTimeout` rather
    /// than a silently truncated result.
    pub fn timeout(mut self, budget: Duration) -> Self {
        self.timeout = Some(budget);
        self
    }

    fn validate(&self, transform_tag: Option<ComponentTag>, change_tracking_enabled: bool) -> Result<()> {
        if self.required.intersects(&self.excluded) {
            return Err(EcsError::InvalidQuery("required and excluded sets overlap".into()));
        }
        if self.spatial.is_some() {
            match transform_tag {
                Some(tag) if self.required.contains(tag) => {}
                _ => return Err(EcsError::InvalidQuery("spatial constraint requires Transform to be required".into())),
            }
        }
        if self.temporal.is_some() && !change_tracking_enabled {
            return Err(EcsError::InvalidQuery("temporal constraint requires change tracking to be enabled".into()));
        }
        Ok(())
    }
}

/// Result of executing a [`QuerySpec`].
#[derive(Debug, Clone, Default)]
pub struct QueryResult {
    pub entities: Vec<EntityId>,
    pub count: usize,
    pub partial: bool,
}

#[derive(Clone)]
struct CachedEntry {
    entities: Vec<EntityId>,
    depends_on: Signature,
    inserted_at: Instant,
    ttl: Option<Duration>,
}

impl CachedEntry {
    fn is_stale(&self) -> bool {
        self.ttl.is_some_and(|ttl| self.inserted_at.elapsed() > ttl)
    }
}

/// Live counters backing `metrics::QueryCacheStats`.
#[derive(Debug, Clone, Default)]
pub struct QueryCacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub size: usize,
}

/// Context gathered from `World` for one query execution. Grouped into a single struct
/// so `World::query` can build it from disjoint field borrows without aliasing
/// `query_engine`, which is borrowed mutably for the call.
pub struct QueryContext<'a> {
    pub archetypes: &'a [Archetype],
    pub registry: &'a ComponentRegistry,
    pub entity_manager: &'a EntityManager,
    pub dirty: &'a DirtyTracker,
    pub spatial_index: &'a SpatialGrid,
    pub change_tracking_enabled: bool,
    pub created_tick: &'a AHashMap<EntityId, u64>,
    pub modified_tick: &'a AHashMap<EntityId, u64>,
}

/// Compiles and executes [`QuerySpec`]s against archetype storage, with an explicit-key
/// TTL cache invalidated by component-tag writes.
pub struct QueryEngine {
    cache: LruCache<String, CachedEntry>,
    stats: QueryCacheStats,
    transform_tag: Option<ComponentTag>,
}

impl QueryEngine {
    pub fn new(capacity: usize) -> Self {
        let cap = std::num::NonZeroUsize::new(capacity.max(1)).unwrap();
        Self {
            cache: LruCache::new(cap),
            stats: QueryCacheStats::default(),
            transform_tag: None,
        }
    }

    pub fn set_transform_tag(&mut self, tag: Option<ComponentTag>) {
        self.transform_tag = tag;
    }

    pub fn stats(&self) -> QueryCacheStats {
        let mut stats = self.stats.clone();
        stats.size = self.cache.len();
        stats
    }

    pub fn clear_cache(&mut self) {
        self.cache.clear();
    }

    /// Evict every cached entry whose declared dependency signature touches `tag`,
    /// called whenever a component of that tag is added, removed, or modified.
    pub fn invalidate_for_tag(&mut self, tag: ComponentTag) {
        let stale: Vec<String> = self
            .cache
            .iter()
            .filter(|(_, entry)| entry.depends_on.contains(tag))
            .map(|(k, _)| k.clone())
            .collect();
        for key in stale {
            self.cache.pop(&key);
            self.stats.evictions += 1;
        }
    }

    pub fn execute(&mut self, ctx: &QueryContext<'_>, spec: &QuerySpec) -> Result<QueryResult> {
        spec.validate(self.transform_tag, ctx.change_tracking_enabled)?;

        if let Some(key) = &spec.cache_key {
            if let Some(entry) = self.cache.get(key) {
                if !entry.is_stale() {
                    self.stats.hits += 1;
                    return Ok(Self::finish(entry.entities.clone(), spec, ctx));
                }
            }
            self.stats.misses += 1;
        }

        let entities = self.collect(ctx, spec)?;

        if let Some(key) = &spec.cache_key {
            let depends_on = spec.required.union(&spec.excluded).union(&spec.optional);
            self.cache.put(
                key.clone(),
                CachedEntry { entities: entities.clone(), depends_on, inserted_at: Instant::now(), ttl: spec.cache_ttl },
            );
        }

        Ok(Self::finish(entities, spec, ctx))
    }

    fn collect(&self, ctx: &QueryContext<'_>, spec: &QuerySpec) -> Result<Vec<EntityId>> {
        let start = Instant::now();
        let mut out = Vec::new();

        if let Some(h) = spec.hierarchical {
            for id in Self::hierarchical_candidates(ctx.entity_manager, h) {
                if let Some(budget) = spec.timeout {
                    if start.elapsed() > budget {
                        return Err(EcsError::QueryTimeout { partial: !out.is_empty() });
                    }
                }
                let Some((archetype, row)) =
                    ctx.archetypes.iter().find_map(|a| a.entities().iter().position(|&e| e == id).map(|row| (a, row)))
                else {
                    continue;
                };
                if !archetype.signature().matches(spec.required, spec.excluded, spec.optional) {
                    continue;
                }
                if let Some(pred) = &spec.entity_predicate {
                    if !pred(id) {
                        continue;
                    }
                }
                if Self::matches_component_predicates(archetype, row, spec) {
                    out.push(id);
                }
            }
        } else {
            for archetype in ctx.archetypes {
                if !archetype.signature().matches(spec.required, spec.excluded, spec.optional) {
                    continue;
                }
                for (row, &id) in archetype.entities().iter().enumerate() {
                    if let Some(budget) = spec.timeout {
                        if start.elapsed() > budget {
                            return Err(EcsError::QueryTimeout { partial: !out.is_empty() });
                        }
                    }
                    if let Some(pred) = &spec.entity_predicate {
                        if !pred(id) {
                            continue;
                        }
                    }
                    if Self::matches_component_predicates(archetype, row, spec) {
                        out.push(id);
                    }
                }
            }
        }

        if let Some(temporal) = spec.temporal {
            out.retain(|id| match temporal {
                TemporalConstraint::CreatedAfter(tick) => ctx.created_tick.get(id).is_some_and(|&t| t > tick),
                TemporalConstraint::ModifiedSince(tick) => ctx.modified_tick.get(id).is_some_and(|&t| t > tick),
            });
        }

        if let Some(spatial) = &spec.spatial {
            out = Self::apply_spatial(ctx.spatial_index, &out, spatial);
        }

        Ok(out)
    }

    fn matches_component_predicates(archetype: &Archetype, row: usize, spec: &QuerySpec) -> bool {
        spec.component_predicates.iter().all(|(tag, pred)| {
            archetype.get_column(*tag).and_then(|c| c.get_bytes(row)).is_some_and(|bytes| pred(bytes))
        })
    }

    fn hierarchical_candidates(mgr: &EntityManager, constraint: HierarchicalConstraint) -> Vec<EntityId> {
        match constraint {
            HierarchicalConstraint::ChildrenOf(id) => mgr.children(id).to_vec(),
            HierarchicalConstraint::DescendantsOf(id) => {
                let mut out = Vec::new();
                let mut stack: Vec<EntityId> = mgr.children(id).to_vec();
                while let Some(next) = stack.pop() {
                    out.push(next);
                    stack.extend(mgr.children(next).iter().copied());
                }
                out
            }
            HierarchicalConstraint::AncestorsOf(id) => {
                let mut out = Vec::new();
                let mut current = mgr.parent(id);
                while let Some(p) = current {
                    out.push(p);
                    current = mgr.parent(p);
                }
                out
            }
            HierarchicalConstraint::SiblingsOf(id) => match mgr.parent(id) {
                Some(parent) => mgr.children(parent).iter().copied().filter(|&c| c != id).collect(),
                None => Vec::new(),
            },
        }
    }

    fn apply_spatial(grid: &SpatialGrid, candidates: &[EntityId], constraint: &SpatialConstraint) -> Vec<EntityId> {
        let matched: Vec<EntityId> = match constraint {
            SpatialConstraint::WithinRadius { center, radius } => grid.query_radius(*center, *radius),
            SpatialConstraint::WithinAabb(aabb) | SpatialConstraint::IntersectsAabb(aabb) => grid.query_aabb(aabb),
            SpatialConstraint::KNearest { point, k } => grid.k_nearest(*point, *k),
        };
        let allowed: std::collections::HashSet<EntityId> = candidates.iter().copied().collect();
        matched.into_iter().filter(|id| allowed.contains(id)).collect()
    }

    fn finish(mut entities: Vec<EntityId>, spec: &QuerySpec, ctx: &QueryContext<'_>) -> QueryResult {
        let bytes_of = |tag: ComponentTag, id: &EntityId| -> Option<Vec<u8>> {
            ctx.archetypes.iter().find_map(|a| {
                let row = a.entities().iter().position(|e| e == id)?;
                a.get_column(tag)?.get_bytes(row).map(|b| b.to_vec())
            })
        };

        match &spec.ordering {
            None | Some(Ordering::None) => {}
            Some(Ordering::ByEntityId) => entities.sort(),
            Some(Ordering::ByComponentField { tag, compare }) => {
                entities.sort_by(|a, b| match (bytes_of(*tag, a), bytes_of(*tag, b)) {
                    (Some(ba), Some(bb)) => compare(&ba, &bb),
                    _ => std::cmp::Ordering::Equal,
                });
            }
            Some(Ordering::Custom(f)) => entities.sort_by(|a, b| f(*a, *b)),
        }

        if let Some(tag) = spec.distinct_by {
            let mut seen = std::collections::HashSet::new();
            entities.retain(|id| match bytes_of(tag, id) {
                Some(bytes) => seen.insert(bytes),
                None => true,
            });
        }

        let total = entities.len();
        let windowed: Vec<EntityId> = entities.into_iter().skip(spec.offset).collect();
        let windowed: Vec<EntityId> = match spec.limit {
            Some(n) => windowed.into_iter().take(n).collect(),
            None => windowed,
        };

        let count = if spec.count_only {
            total.saturating_sub(spec.offset).min(spec.limit.unwrap_or(usize::MAX))
        } else {
            windowed.len()
        };

        QueryResult {
            entities: if spec.count_only { Vec::new() } else { windowed },
            count,
            partial: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::ComponentRegistry;
    use crate::entity::EntityManager;
    use crate::storage::DirtyTracker;

    fn ctx<'a>(
        archetypes: &'a [Archetype],
        registry: &'a ComponentRegistry,
        mgr: &'a EntityManager,
        dirty: &'a DirtyTracker,
        grid: &'a SpatialGrid,
        created: &'a AHashMap<EntityId, u64>,
        modified: &'a AHashMap<EntityId, u64>,
    ) -> QueryContext<'a> {
        QueryContext {
            archetypes,
            registry,
            entity_manager: mgr,
            dirty,
            spatial_index: grid,
            change_tracking_enabled: true,
            created_tick: created,
            modified_tick: modified,
        }
    }

    #[test]
    fn required_signature_filters_archetypes() {
        let a = ComponentTag(0);
        let b = ComponentTag(1);
        let mut arch_with_both = Archetype::new(Signature::single(a).with(b));
        let mut arch_with_a_only = Archetype::new(Signature::single(a));
        let e1 = EntityId::default();
        arch_with_both.allocate_row(e1);
        arch_with_a_only.allocate_row(EntityId::default());
        let archetypes = vec![arch_with_both, arch_with_a_only];

        let registry = ComponentRegistry::new();
        let mgr = EntityManager::new(16);
        let dirty = DirtyTracker::new();
        let grid = SpatialGrid::new(1.0);
        let created = AHashMap::new();
        let modified = AHashMap::new();
        let c = ctx(&archetypes, &registry, &mgr, &dirty, &grid, &created, &modified);

        let mut engine = QueryEngine::new(16);
        let spec = QuerySpec::new().require(a).require(b);
        let result = engine.execute(&c, &spec).unwrap();
        assert_eq!(result.entities, vec![e1]);
    }

    #[test]
    fn overlapping_required_and_excluded_is_invalid() {
        let a = ComponentTag(0);
        let archetypes: Vec<Archetype> = Vec::new();
        let registry = ComponentRegistry::new();
        let mgr = EntityManager::new(16);
        let dirty = DirtyTracker::new();
        let grid = SpatialGrid::new(1.0);
        let created = AHashMap::new();
        let modified = AHashMap::new();
        let c = ctx(&archetypes, &registry, &mgr, &dirty, &grid, &created, &modified);

        let mut engine = QueryEngine::new(16);
        let spec = QuerySpec::new().require(a).exclude(a);
        assert!(matches!(engine.execute(&c, &spec), Err(EcsError::InvalidQuery(_))));
    }

    #[test]
    fn cache_hit_skips_recompute_until_invalidated() {
        let a = ComponentTag(0);
        let mut arch = Archetype::new(Signature::single(a));
        arch.allocate_row(EntityId::default());
        let archetypes = vec![arch];
        let registry = ComponentRegistry::new();
        let mgr = EntityManager::new(16);
        let dirty = DirtyTracker::new();
        let grid = SpatialGrid::new(1.0);
        let created = AHashMap::new();
        let modified = AHashMap::new();
        let c = ctx(&archetypes, &registry, &mgr, &dirty, &grid, &created, &modified);

        let mut engine = QueryEngine::new(16);
        let spec = QuerySpec::new().require(a).cached("enemies", None);
        engine.execute(&c, &spec).unwrap();
        engine.execute(&c, &spec).unwrap();
        assert_eq!(engine.stats().hits, 1);

        engine.invalidate_for_tag(a);
        engine.execute(&c, &spec).unwrap();
        assert_eq!(engine.stats().hits, 1);
        assert_eq!(engine.stats().misses, 2);
    }

    #[test]
    fn limit_zero_yields_empty_result() {
        let a = ComponentTag(0);
        let mut arch = Archetype::new(Signature::single(a));
        arch.allocate_row(EntityId::default());
        let archetypes = vec![arch];
        let registry = ComponentRegistry::new();
        let mgr = EntityManager::new(16);
        let dirty = DirtyTracker::new();
        let grid = SpatialGrid::new(1.0);
        let created = AHashMap::new();
        let modified = AHashMap::new();
        let c = ctx(&archetypes, &registry, &mgr, &dirty, &grid, &created, &modified);

        let mut engine = QueryEngine::new(16);
        let spec = QuerySpec::new().require(a).limit(0);
        let result = engine.execute(&c, &spec).unwrap();
        assert!(result.entities.is_empty());
    }

    #[test]
    fn spatial_constraint_without_transform_required_is_invalid() {
        let archetypes: Vec<Archetype> = Vec::new();
        let registry = ComponentRegistry::new();
        let mgr = EntityManager::new(16);
        let dirty = DirtyTracker::new();
        let grid = SpatialGrid::new(1.0);
        let created = AHashMap::new();
        let modified = AHashMap::new();
        let c = ctx(&archetypes, &registry, &mgr, &dirty, &grid, &created, &modified);

        let mut engine = QueryEngine::new(16);
        let spec = QuerySpec::new().spatial(SpatialConstraint::WithinRadius { center: Vec3::ZERO, radius: 1.0 });
        assert!(matches!(engine.execute(&c, &spec), Err(EcsError::InvalidQuery(_))));
    }

    #[test]
    fn hierarchical_constraint_still_honors_required_signature() {
        let a = ComponentTag(0);
        let mut mgr = EntityManager::new(16);
        let parent = mgr.create().unwrap();
        let tagged_child = mgr.create().unwrap();
        let untagged_child = mgr.create().unwrap();
        mgr.set_parent(tagged_child, parent).unwrap();
        mgr.set_parent(untagged_child, parent).unwrap();

        let mut arch_with_a = Archetype::new(Signature::single(a));
        arch_with_a.allocate_row(tagged_child);
        let mut arch_without_a = Archetype::new(Signature::EMPTY);
        arch_without_a.allocate_row(untagged_child);
        let archetypes = vec![arch_with_a, arch_without_a];

        let registry = ComponentRegistry::new();
        let dirty = DirtyTracker::new();
        let grid = SpatialGrid::new(1.0);
        let created = AHashMap::new();
        let modified = AHashMap::new();
        let c = ctx(&archetypes, &registry, &mgr, &dirty, &grid, &created, &modified);

        let mut engine = QueryEngine::new(16);
        let spec = QuerySpec::new().hierarchical(HierarchicalConstraint::ChildrenOf(parent)).require(a);
        let result = engine.execute(&c, &spec).unwrap();
        assert_eq!(result.entities, vec![tagged_child]);
    }

    #[test]
    fn exhausted_timeout_reports_partial_progress() {
        let a = ComponentTag(0);
        let mut arch = Archetype::new(Signature::single(a));
        arch.allocate_row(EntityId::default());
        arch.allocate_row(EntityId::default());
        let archetypes = vec![arch];
        let registry = ComponentRegistry::new();
        let mgr = EntityManager::new(16);
        let dirty = DirtyTracker::new();
        let grid = SpatialGrid::new(1.0);
        let created = AHashMap::new();
        let modified = AHashMap::new();
        let c = ctx(&archetypes, &registry, &mgr, &dirty, &grid, &created, &modified);

        let mut engine = QueryEngine::new(16);
        // A predicate that sleeps past the budget on its first call guarantees the
        // timeout check on the next candidate fires before the scan completes.
        let spec = QuerySpec::new()
            .require(a)
            .with_entity_predicate(|_| {
                std::thread::sleep(Duration::from_millis(5));
                true
            })
            .timeout(Duration::from_millis(1));
        let result = engine.execute(&c, &spec);
        assert!(matches!(result, Err(EcsError::QueryTimeout { .. })));
    }
}
