//! System dependency DAG: cycle-rejecting edges, a stable topological sort, and
//! parallel-group formation from declared thread-safety plus component access.

use ahash::AHashMap;
use std::collections::VecDeque;

use crate::error::{EcsError, Result};
use crate::system::{SystemAccess, SystemId, ThreadSafety};

/// Per-system metadata the graph needs to order and group systems.
#[derive(Clone)]
struct SystemMeta {
    id: SystemId,
    access: SystemAccess,
    thread_safety: ThreadSafety,
    priority: i32,
    registration_order: u32,
}

/// A set of systems (by graph-local index) that may execute concurrently.
#[derive(Clone, Debug, Default)]
pub struct ExecutionStage {
    pub system_ids: Vec<SystemId>,
}

/// DAG of system dependencies, producing a topological execution order grouped into
/// parallel stages.
#[derive(Default)]
pub struct DependencyGraph {
    metas: Vec<SystemMeta>,
    id_to_index: AHashMap<SystemId, usize>,
    // edges[i] = indices j such that i must run before j.
    edges: Vec<Vec<usize>>,
    order: Vec<usize>,
    stages: Vec<ExecutionStage>,
    next_registration_order: u32,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a system node. Idempotent keyed by `id`: re-adding replaces metadata
    /// but leaves existing edges intact.
    pub fn add_system(
        &mut self,
        id: SystemId,
        access: SystemAccess,
        thread_safety: ThreadSafety,
        priority: i32,
    ) -> Result<()> {
        if let Some(&idx) = self.id_to_index.get(&id) {
            return Err(EcsError::SystemExists(self.metas[idx].id));
        }
        let index = self.metas.len();
        self.metas.push(SystemMeta {
            id,
            access,
            thread_safety,
            priority,
            registration_order: self.next_registration_order,
        });
        self.next_registration_order += 1;
        self.edges.push(Vec::new());
        self.id_to_index.insert(id, index);
        self.invalidate();
        Ok(())
    }

    pub fn remove_system(&mut self, id: SystemId) -> Result<()> {
        let idx = *self.id_to_index.get(&id).ok_or(EcsError::SystemNotFound(id))?;
        self.metas.remove(idx);
        self.edges.remove(idx);
        for edges in &mut self.edges {
            edges.retain(|&j| j != idx);
            for j in edges.iter_mut() {
                if *j > idx {
                    *j -= 1;
                }
            }
        }
        self.id_to_index.clear();
        for (i, m) in self.metas.iter().enumerate() {
            self.id_to_index.insert(m.id, i);
        }
        self.invalidate();
        Ok(())
    }

    /// Add a "before" dependency: `from` must run before `to`. Rejects the edge (graph
    /// unchanged) with `CircularDependency` if it would create a cycle.
    pub fn add_dependency(&mut self, from: SystemId, to: SystemId) -> Result<()> {
        let from_idx = *self.id_to_index.get(&from).ok_or(EcsError::SystemNotFound(from))?;
        let to_idx = *self.id_to_index.get(&to).ok_or(EcsError::SystemNotFound(to))?;

        if from_idx == to_idx || self.reachable(to_idx, from_idx) {
            return Err(EcsError::CircularDependency { from, to });
        }

        if !self.edges[from_idx].contains(&to_idx) {
            self.edges[from_idx].push(to_idx);
        }
        self.invalidate();
        Ok(())
    }

    fn reachable(&self, from: usize, target: usize) -> bool {
        let mut visited = vec![false; self.metas.len()];
        let mut stack = vec![from];
        while let Some(node) = stack.pop() {
            if node == target {
                return true;
            }
            if visited[node] {
                continue;
            }
            visited[node] = true;
            stack.extend(self.edges[node].iter().copied());
        }
        false
    }

    fn invalidate(&mut self) {
        self.order.clear();
        self.stages.clear();
    }

    pub fn is_built(&self) -> bool {
        !self.metas.is_empty() && (!self.order.is_empty() || self.metas.len() == self.order.len())
    }

    /// Compute the topological order (stable under `(-priority, registration_order)`)
    /// and group it into parallel stages.
    pub fn build(&mut self) -> Result<()> {
        let count = self.metas.len();
        if count == 0 {
            self.order.clear();
            self.stages.clear();
            return Ok(());
        }

        let mut in_degree = vec![0usize; count];
        for edges in &self.edges {
            for &j in edges {
                in_degree[j] += 1;
            }
        }

        let ready_key = |idx: usize| (-self.metas[idx].priority, self.metas[idx].registration_order);
        let mut ready: Vec<usize> = (0..count).filter(|&i| in_degree[i] == 0).collect();
        ready.sort_by_key(|&i| ready_key(i));
        let mut queue: VecDeque<usize> = ready.into();

        let mut order = Vec::with_capacity(count);
        while let Some(node) = queue.pop_front() {
            order.push(node);
            let mut newly_ready = Vec::new();
            for &next in &self.edges[node] {
                in_degree[next] -= 1;
                if in_degree[next] == 0 {
                    newly_ready.push(next);
                }
            }
            if !newly_ready.is_empty() {
                let mut merged: Vec<usize> = queue.drain(..).chain(newly_ready).collect();
                merged.sort_by_key(|&i| ready_key(i));
                queue = merged.into();
            }
        }

        if order.len() != count {
            // A cycle exists that `add_dependency` should have rejected; surface it
            // rather than silently dropping systems.
            let stuck = (0..count).find(|i| !order.contains(i)).unwrap();
            return Err(EcsError::CircularDependency {
                from: self.metas[stuck].id,
                to: self.metas[stuck].id,
            });
        }

        self.order = order;
        self.stages = self.build_stages();
        Ok(())
    }

    fn build_stages(&self) -> Vec<ExecutionStage> {
        let mut depends_on_any_in = |node: usize, placed: &[usize]| -> bool {
            placed.iter().any(|&p| self.edges[p].contains(&node) || self.edges[node].contains(&p))
        };

        let mut stages: Vec<Vec<usize>> = Vec::new();
        for &node in &self.order {
            let mut placed_in = None;
            for (stage_idx, stage) in stages.iter().enumerate().rev() {
                if depends_on_any_in(node, stage) {
                    break;
                }
                let meta = &self.metas[node];
                let compatible = stage.iter().all(|&other| {
                    let other_meta = &self.metas[other];
                    meta.thread_safety.compatible_with(other_meta.thread_safety)
                        && !meta.access.conflicts_with(&other_meta.access)
                });
                if compatible {
                    placed_in = Some(stage_idx);
                } else {
                    break;
                }
            }

            match placed_in {
                Some(idx) => stages[idx].push(node),
                None => stages.push(vec![node]),
            }
        }

        stages
            .into_iter()
            .map(|indices| ExecutionStage {
                system_ids: indices.into_iter().map(|i| self.metas[i].id).collect(),
            })
            .collect()
    }

    pub fn stages(&self) -> &[ExecutionStage] {
        &self.stages
    }

    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }

    /// Topological execution order as `SystemId`s, serial (ignoring stage grouping).
    pub fn order(&self) -> Vec<SystemId> {
        self.order.iter().map(|&i| self.metas[i].id).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::ComponentTag;

    fn access(reads: &[u8], writes: &[u8]) -> SystemAccess {
        SystemAccess {
            reads: reads.iter().map(|&t| ComponentTag(t)).collect(),
            writes: writes.iter().map(|&t| ComponentTag(t)).collect(),
        }
    }

    #[test]
    fn disjoint_writers_run_in_one_stage() {
        let mut graph = DependencyGraph::new();
        graph.add_system(SystemId(0), access(&[], &[0]), ThreadSafety::Writer, 0).unwrap();
        graph.add_system(SystemId(1), access(&[], &[1]), ThreadSafety::Writer, 0).unwrap();
        graph.build().unwrap();
        assert_eq!(graph.stage_count(), 1);
    }

    #[test]
    fn conflicting_writers_split_into_stages() {
        let mut graph = DependencyGraph::new();
        graph.add_system(SystemId(0), access(&[], &[0]), ThreadSafety::Writer, 0).unwrap();
        graph.add_system(SystemId(1), access(&[], &[0]), ThreadSafety::Writer, 0).unwrap();
        graph.build().unwrap();
        assert_eq!(graph.stage_count(), 2);
    }

    #[test]
    fn explicit_dependency_orders_systems() {
        let mut graph = DependencyGraph::new();
        graph.add_system(SystemId(0), access(&[], &[]), ThreadSafety::FullyReentrant, 0).unwrap();
        graph.add_system(SystemId(1), access(&[], &[]), ThreadSafety::FullyReentrant, 0).unwrap();
        graph.add_dependency(SystemId(1), SystemId(0)).unwrap();
        graph.build().unwrap();
        let order = graph.order();
        assert_eq!(order, vec![SystemId(1), SystemId(0)]);
    }

    #[test]
    fn cyclic_dependency_is_rejected_and_graph_unchanged() {
        let mut graph = DependencyGraph::new();
        graph.add_system(SystemId(0), access(&[], &[]), ThreadSafety::FullyReentrant, 0).unwrap();
        graph.add_system(SystemId(1), access(&[], &[]), ThreadSafety::FullyReentrant, 0).unwrap();
        graph.add_dependency(SystemId(0), SystemId(1)).unwrap();
        let err = graph.add_dependency(SystemId(1), SystemId(0)).unwrap_err();
        assert!(matches!(err, EcsError::CircularDependency { .. }));
        graph.build().unwrap();
        assert_eq!(graph.order(), vec![SystemId(0), SystemId(1)]);
    }

    #[test]
    fn stable_tiebreak_is_priority_then_registration_order() {
        let mut graph = DependencyGraph::new();
        graph.add_system(SystemId(0), access(&[], &[]), ThreadSafety::None, 0).unwrap();
        graph.add_system(SystemId(1), access(&[], &[]), ThreadSafety::None, 5).unwrap();
        graph.add_system(SystemId(2), access(&[], &[]), ThreadSafety::None, 0).unwrap();
        graph.build().unwrap();
        assert_eq!(graph.order(), vec![SystemId(1), SystemId(0), SystemId(2)]);
    }
}
