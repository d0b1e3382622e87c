//! Schedule: lazily-rebuilt execution plan over registered systems.
//!
//! Dirty/rebuild semantics are preserved from the teacher's design: any mutation marks
//! the plan stale (`invalidate`), and the next `update`/`render` call rebuilds it once
//! (`ensure_built`) rather than on every mutation.

use ahash::AHashMap;

use crate::dependency::DependencyGraph;
use crate::error::{EcsError, Result};
use crate::system::{BoxedSystem, System, SystemId, ThreadSafety};
use crate::world::World;

/// A named ordering constraint resolved against sibling systems by name at rebuild
/// time (mirrors the teacher's scaffolding, but is now actually applied).
#[derive(Debug, Clone)]
struct OrderingConstraint {
    system: SystemId,
    before: Vec<String>,
    after: Vec<String>,
}

/// Complete execution schedule: owns the systems, drives per-frame `update`/`render`.
pub struct Schedule {
    systems: Vec<BoxedSystem>,
    enabled: Vec<bool>,
    priorities: Vec<i32>,
    name_to_id: AHashMap<&'static str, SystemId>,
    constraints: Vec<OrderingConstraint>,
    graph: Option<DependencyGraph>,
    next_id: u32,
}

impl Default for Schedule {
    fn default() -> Self {
        Self::new()
    }
}

impl Schedule {
    pub fn new() -> Self {
        Self {
            systems: Vec::new(),
            enabled: Vec::new(),
            priorities: Vec::new(),
            name_to_id: AHashMap::new(),
            constraints: Vec::new(),
            graph: None,
            next_id: 0,
        }
    }

    fn next_system_id(&mut self) -> SystemId {
        let id = SystemId(self.next_id);
        self.next_id += 1;
        id
    }

    /// Register a system at `priority` (higher runs earlier among otherwise-ready
    /// systems). Rejects a duplicate name with `SystemExists`.
    pub fn add_system(&mut self, system: BoxedSystem, priority: i32) -> Result<SystemId> {
        if self.name_to_id.contains_key(system.name()) {
            return Err(EcsError::SystemExists(self.name_to_id[system.name()]));
        }
        let id = self.next_system_id();
        self.name_to_id.insert(system.name(), id);
        self.systems.push(system);
        self.enabled.push(true);
        self.priorities.push(priority);
        self.invalidate();
        Ok(id)
    }

    /// Register a system that must run before `before` (resolved by name at rebuild).
    pub fn add_system_before(&mut self, system: BoxedSystem, priority: i32, before: &str) -> Result<SystemId> {
        let id = self.add_system(system, priority)?;
        self.constraints.push(OrderingConstraint {
            system: id,
            before: vec![before.to_string()],
            after: Vec::new(),
        });
        self.invalidate();
        Ok(id)
    }

    /// Register a system that must run after `after` (resolved by name at rebuild).
    pub fn add_system_after(&mut self, system: BoxedSystem, priority: i32, after: &str) -> Result<SystemId> {
        let id = self.add_system(system, priority)?;
        self.constraints.push(OrderingConstraint {
            system: id,
            before: Vec::new(),
            after: vec![after.to_string()],
        });
        self.invalidate();
        Ok(id)
    }

    pub fn set_enabled(&mut self, id: SystemId, enabled: bool) -> Result<()> {
        let idx = id.0 as usize;
        if idx >= self.systems.len() {
            return Err(EcsError::SystemNotFound(id));
        }
        self.enabled[idx] = enabled;
        Ok(())
    }

    pub fn is_enabled(&self, id: SystemId) -> Result<bool> {
        self.enabled.get(id.0 as usize).copied().ok_or(EcsError::SystemNotFound(id))
    }

    fn invalidate(&mut self) {
        self.graph = None;
    }

    pub fn get_system_mut(&mut self, name: &str) -> Option<&mut (dyn System + 'static)> {
        let id = *self.name_to_id.get(name)?;
        self.systems.get_mut(id.0 as usize).map(|s| s.as_mut())
    }

    /// Ensure the dependency graph is built (lazily, only once per dirtying mutation).
    fn ensure_built(&mut self) -> Result<()> {
        if self.graph.is_some() {
            return Ok(());
        }

        let mut graph = DependencyGraph::new();
        for (idx, system) in self.systems.iter().enumerate() {
            let id = SystemId(idx as u32);
            graph.add_system(id, system.access(), system.thread_safety(), self.priorities[idx])?;
        }

        for constraint in &self.constraints {
            for before_name in &constraint.before {
                if let Some(&before_id) = self.name_to_id.get(before_name.as_str()) {
                    graph.add_dependency(constraint.system, before_id)?;
                }
            }
            for after_name in &constraint.after {
                if let Some(&after_id) = self.name_to_id.get(after_name.as_str()) {
                    graph.add_dependency(after_id, constraint.system)?;
                }
            }
        }

        graph.build()?;
        self.graph = Some(graph);
        Ok(())
    }

    pub fn stage_count(&mut self) -> Result<usize> {
        self.ensure_built()?;
        Ok(self.graph.as_ref().unwrap().stage_count())
    }

    pub fn system_count(&self) -> usize {
        self.systems.len()
    }

    /// Run every enabled system's `update(dt)` in dependency order, recording each
    /// system's wall-clock duration and collecting per-system errors (including
    /// `SystemTimeout` when a system's declared `timeout()` is exceeded) rather than
    /// aborting the frame.
    pub fn run_update(&mut self, world: &mut World, dt: f32) -> Vec<(SystemId, std::time::Duration, Option<EcsError>)> {
        if let Err(e) = self.ensure_built() {
            return vec![(SystemId(u32::MAX), std::time::Duration::ZERO, Some(e))];
        }
        let stages = self.graph.as_ref().unwrap().stages().to_vec();
        let mut results = Vec::new();
        for stage in &stages {
            for &id in &stage.system_ids {
                let idx = id.0 as usize;
                if !self.enabled[idx] {
                    continue;
                }
                let start = std::time::Instant::now();
                let outcome = self.systems[idx].update(world, dt);
                let elapsed = start.elapsed();
                let error = match outcome {
                    Err(e) => Some(e),
                    Ok(()) => self.systems[idx].timeout().filter(|t| elapsed > *t).map(|_| {
                        EcsError::SystemTimeout { system: id, elapsed_ms: elapsed.as_millis() as u64 }
                    }),
                };
                results.push((id, elapsed, error));
            }
        }
        results
    }

    /// Run every enabled system's `render(dt)`, serial with respect to the render
    /// target regardless of the update phase's parallel grouping.
    pub fn run_render(&mut self, world: &World, dt: f32) -> Vec<(SystemId, EcsError)> {
        let mut errors = Vec::new();
        for (idx, system) in self.systems.iter_mut().enumerate() {
            if !self.enabled[idx] {
                continue;
            }
            if let Err(e) = system.render(world, dt) {
                errors.push((SystemId(idx as u32), e));
            }
        }
        errors
    }

    pub fn stage_thread_safety_is_serial(&self, stage_size: usize, safety: ThreadSafety) -> bool {
        stage_size <= 1 || safety == ThreadSafety::None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::system::SystemAccess;

    struct MockSystem {
        name: &'static str,
    }

    impl System for MockSystem {
        fn access(&self) -> SystemAccess {
            SystemAccess::empty()
        }
        fn name(&self) -> &'static str {
            self.name
        }
        fn update(&mut self, _world: &mut World, _dt: f32) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_lazy_rebuild() {
        let mut schedule = Schedule::new();
        schedule.add_system(Box::new(MockSystem { name: "a" }), 0).unwrap();

        assert!(schedule.graph.is_none(), "graph should be dirty after add_system");
        schedule.ensure_built().expect("failed to build");
        assert!(schedule.graph.is_some(), "graph should be built after ensure_built");

        schedule.add_system(Box::new(MockSystem { name: "b" }), 0).unwrap();
        assert!(schedule.graph.is_none(), "graph should be invalidated after a new system");
    }

    #[test]
    fn duplicate_name_is_rejected() {
        let mut schedule = Schedule::new();
        schedule.add_system(Box::new(MockSystem { name: "a" }), 0).unwrap();
        assert!(matches!(
            schedule.add_system(Box::new(MockSystem { name: "a" }), 0),
            Err(EcsError::SystemExists(_))
        ));
    }

    #[test]
    fn named_before_constraint_orders_systems() {
        let mut schedule = Schedule::new();
        let second = schedule.add_system(Box::new(MockSystem { name: "second" }), 0).unwrap();
        schedule.add_system_before(Box::new(MockSystem { name: "first" }), 0, "second").unwrap();
        schedule.ensure_built().unwrap();
        let order = schedule.graph.as_ref().unwrap().order();
        let first_pos = order.iter().position(|&id| id != second).unwrap();
        let second_pos = order.iter().position(|&id| id == second).unwrap();
        assert!(first_pos < second_pos);
    }

    #[test]
    fn disabling_a_system_skips_its_update() {
        let mut schedule = Schedule::new();
        let id = schedule.add_system(Box::new(MockSystem { name: "a" }), 0).unwrap();
        schedule.set_enabled(id, false).unwrap();
        let mut world = World::new();
        let errors = schedule.run_update(&mut world, 0.016);
        assert!(errors.is_empty());
    }
}
