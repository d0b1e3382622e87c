//! Grid spatial index over entity world positions, backing the query engine's spatial
//! constraints (within-radius, within/intersects-AABB, k-nearest).
//!
//! Cells are square buckets of configurable size; an entity occupies exactly one cell,
//! keyed by the floor of its position divided by the cell size. Updates are incremental:
//! callers remove the stale cell membership and insert the new one rather than rebuilding
//! the whole grid on every Transform write.

use ahash::AHashMap;
use glam::Vec3;

use crate::entity::EntityId;

type CellKey = (i32, i32);

fn cell_of(pos: Vec3, cell_size: f32) -> CellKey {
    ((pos.x / cell_size).floor() as i32, (pos.z / cell_size).floor() as i32)
}

/// Axis-aligned bounding box in the XZ ground plane (Y ignored, consistent with a 2D
/// game engine's spatial queries).
#[derive(Debug, Clone, Copy)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Aabb {
    pub fn contains(&self, point: Vec3) -> bool {
        point.x >= self.min.x && point.x <= self.max.x && point.z >= self.min.z && point.z <= self.max.z
    }

    pub fn intersects(&self, other: &Aabb) -> bool {
        self.min.x <= other.max.x && self.max.x >= other.min.x && self.min.z <= other.max.z && self.max.z >= other.min.z
    }
}

/// Incrementally-maintained grid spatial index.
pub struct SpatialGrid {
    cell_size: f32,
    cells: AHashMap<CellKey, Vec<EntityId>>,
    positions: AHashMap<EntityId, Vec3>,
}

impl SpatialGrid {
    pub fn new(cell_size: f32) -> Self {
        Self {
            cell_size: cell_size.max(0.001),
            cells: AHashMap::new(),
            positions: AHashMap::new(),
        }
    }

    pub fn cell_size(&self) -> f32 {
        self.cell_size
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Insert or move `id` to `pos`. A no-op remove-then-insert if `id` already exists.
    pub fn upsert(&mut self, id: EntityId, pos: Vec3) {
        self.remove(id);
        let key = cell_of(pos, self.cell_size);
        self.cells.entry(key).or_default().push(id);
        self.positions.insert(id, pos);
    }

    pub fn remove(&mut self, id: EntityId) {
        if let Some(pos) = self.positions.remove(&id) {
            let key = cell_of(pos, self.cell_size);
            if let Some(bucket) = self.cells.get_mut(&key) {
                bucket.retain(|&e| e != id);
                if bucket.is_empty() {
                    self.cells.remove(&key);
                }
            }
        }
    }

    pub fn position_of(&self, id: EntityId) -> Option<Vec3> {
        self.positions.get(&id).copied()
    }

    /// All entities within `radius` of `center` (inclusive), scanning the cells the
    /// radius' bounding square overlaps.
    pub fn query_radius(&self, center: Vec3, radius: f32) -> Vec<EntityId> {
        let radius_sq = radius * radius;
        let span = (radius / self.cell_size).ceil() as i32;
        let (cx, cz) = cell_of(center, self.cell_size);
        let mut out = Vec::new();
        for dx in -span..=span {
            for dz in -span..=span {
                if let Some(bucket) = self.cells.get(&(cx + dx, cz + dz)) {
                    for &id in bucket {
                        if let Some(pos) = self.positions.get(&id) {
                            if pos.distance_squared(center) <= radius_sq {
                                out.push(id);
                            }
                        }
                    }
                }
            }
        }
        out
    }

    pub fn query_aabb(&self, aabb: &Aabb) -> Vec<EntityId> {
        let min_key = cell_of(aabb.min, self.cell_size);
        let max_key = cell_of(aabb.max, self.cell_size);
        let mut out = Vec::new();
        for cx in min_key.0..=max_key.0 {
            for cz in min_key.1..=max_key.1 {
                if let Some(bucket) = self.cells.get(&(cx, cz)) {
                    for &id in bucket {
                        if let Some(pos) = self.positions.get(&id) {
                            if aabb.contains(*pos) {
                                out.push(id);
                            }
                        }
                    }
                }
            }
        }
        out
    }

    /// The `k` entities closest to `point`, expanding the search ring until enough
    /// candidates are found or the grid is exhausted.
    pub fn k_nearest(&self, point: Vec3, k: usize) -> Vec<EntityId> {
        if k == 0 || self.positions.is_empty() {
            return Vec::new();
        }
        let mut ring = 1i32;
        let max_ring = {
            let mut extent = 1i32;
            for key in self.cells.keys() {
                extent = extent.max(key.0.unsigned_abs() as i32).max(key.1.unsigned_abs() as i32);
            }
            extent + 2
        };
        loop {
            let candidates = self.query_radius(point, ring as f32 * self.cell_size);
            if candidates.len() >= k || ring > max_ring {
                let mut scored: Vec<(f32, EntityId)> = candidates
                    .into_iter()
                    .filter_map(|id| self.positions.get(&id).map(|p| (p.distance_squared(point), id)))
                    .collect();
                scored.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));
                scored.truncate(k);
                return scored.into_iter().map(|(_, id)| id).collect();
            }
            ring += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upsert_moves_entity_between_cells() {
        let mut grid = SpatialGrid::new(10.0);
        let id = EntityId::default();
        grid.upsert(id, Vec3::new(1.0, 0.0, 1.0));
        assert_eq!(grid.query_radius(Vec3::ZERO, 5.0), vec![id]);

        grid.upsert(id, Vec3::new(100.0, 0.0, 100.0));
        assert!(grid.query_radius(Vec3::ZERO, 5.0).is_empty());
        assert_eq!(grid.query_radius(Vec3::new(100.0, 0.0, 100.0), 5.0), vec![id]);
    }

    #[test]
    fn remove_clears_membership() {
        let mut grid = SpatialGrid::new(10.0);
        let id = EntityId::default();
        grid.upsert(id, Vec3::ZERO);
        grid.remove(id);
        assert!(grid.is_empty());
        assert!(grid.query_radius(Vec3::ZERO, 100.0).is_empty());
    }

    #[test]
    fn aabb_query_respects_bounds() {
        let mut grid = SpatialGrid::new(10.0);
        let inside = EntityId::default();
        grid.upsert(inside, Vec3::new(5.0, 0.0, 5.0));
        let aabb = Aabb { min: Vec3::ZERO, max: Vec3::new(10.0, 0.0, 10.0) };
        assert_eq!(grid.query_aabb(&aabb), vec![inside]);
    }

    #[test]
    fn k_nearest_orders_by_distance() {
        let mut grid = SpatialGrid::new(10.0);
        let far = EntityId::default();
        grid.upsert(far, Vec3::new(50.0, 0.0, 0.0));
        let mut mgr = slotmap::SlotMap::<EntityId, ()>::with_key();
        let near = mgr.insert(());
        grid.upsert(near, Vec3::new(1.0, 0.0, 0.0));
        let result = grid.k_nearest(Vec3::ZERO, 1);
        assert_eq!(result, vec![near]);
    }
}
