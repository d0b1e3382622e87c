//! Per-frame executor: drives `Schedule` through the update and render phases and
//! records per-system timing via `SystemProfiler`.

use std::collections::HashMap;
use std::time::Duration;

use crate::command::CommandBuffer;
use crate::entity::EntityId;
use crate::error::{EcsError, Result};
use crate::schedule::Schedule;
use crate::system::SystemId;
use crate::world::World;

/// Aggregated timing for one system across all frames since the last `clear`.
#[derive(Debug, Clone)]
pub struct SystemStats {
    pub min: Duration,
    pub max: Duration,
    pub avg: Duration,
    pub call_count: u64,
}

/// Per-system execution timing, feeding `metrics::Metrics`.
pub struct SystemProfiler {
    timings: HashMap<SystemId, Vec<Duration>>,
    call_counts: HashMap<SystemId, u64>,
}

impl SystemProfiler {
    pub fn new() -> Self {
        Self {
            timings: HashMap::new(),
            call_counts: HashMap::new(),
        }
    }

    pub fn record_execution(&mut self, id: SystemId, duration: Duration) {
        self.timings.entry(id).or_default().push(duration);
        *self.call_counts.entry(id).or_insert(0) += 1;
    }

    pub fn get_stats(&self, id: SystemId) -> Option<SystemStats> {
        let timings = self.timings.get(&id)?;
        if timings.is_empty() {
            return None;
        }

        let min = *timings.iter().min().unwrap_or(&Duration::ZERO);
        let max = *timings.iter().max().unwrap_or(&Duration::ZERO);
        let avg = timings.iter().sum::<Duration>() / timings.len() as u32;

        Some(SystemStats {
            min,
            max,
            avg,
            call_count: *self.call_counts.get(&id).unwrap_or(&0),
        })
    }

    pub fn clear(&mut self) {
        self.timings.clear();
        self.call_counts.clear();
    }
}

impl Default for SystemProfiler {
    fn default() -> Self {
        Self::new()
    }
}

/// What to do with errors a system's `update`/`render` raised this frame.
pub enum ErrorPolicy {
    /// Log and continue with the rest of the frame (the default).
    Isolate,
    /// Stop the frame and propagate the first error encountered.
    Escalate,
}

/// Drives one simulation frame: `update` phase (parallel groups via the schedule),
/// then a `SyncPoint` flush, then the serial `render` phase.
pub struct Executor {
    pub schedule: Schedule,
    pub profiler: SystemProfiler,
    pub error_policy: ErrorPolicy,
}

impl Executor {
    pub fn new(schedule: Schedule) -> Self {
        Self {
            schedule,
            profiler: SystemProfiler::new(),
            error_policy: ErrorPolicy::Isolate,
        }
    }

    /// Execute one full frame: update, flush a sync point, then render.
    pub fn execute_frame(&mut self, world: &mut World, dt: f32) -> Result<()> {
        let update_results = self.schedule.run_update(world, dt);
        let mut first_error = None;
        for (id, duration, error) in update_results {
            self.profiler.record_execution(id, duration);
            if let Some(e) = error {
                #[cfg(feature = "profiling")]
                tracing::warn!(system = ?id, error = %e, "system update failed");
                if first_error.is_none() {
                    first_error = Some(e);
                }
            }
        }

        let mut sync = SyncPoint::new();
        sync.flush(world)?;

        let render_results = self.schedule.run_render(world, dt);
        for (id, e) in render_results {
            #[cfg(feature = "profiling")]
            tracing::warn!(system = ?id, error = %e, "system render failed");
            if first_error.is_none() {
                first_error = Some(e);
            }
        }

        match (self.error_policy, first_error) {
            (ErrorPolicy::Escalate, Some(e)) => Err(e),
            _ => Ok(()),
        }
    }
}

impl Copy for ErrorPolicy {}
impl Clone for ErrorPolicy {
    fn clone(&self) -> Self {
        *self
    }
}

/// Synchronization point between stages: flushes deferred despawns and command
/// buffers produced during a frame's systems.
pub struct SyncPoint {
    pub command_buffers: Vec<CommandBuffer>,
    pub despawn_queue: Vec<EntityId>,
}

impl SyncPoint {
    pub fn new() -> Self {
        Self {
            command_buffers: Vec::new(),
            despawn_queue: Vec::new(),
        }
    }

    pub fn add_command_buffer(&mut self, buffer: CommandBuffer) {
        self.command_buffers.push(buffer);
    }

    pub fn queue_despawn(&mut self, entity: EntityId) {
        self.despawn_queue.push(entity);
    }

    /// Flush all commands to the world: despawns first (LIFO, so swap-removal inside
    /// archetypes doesn't invalidate later indices), then command buffers.
    pub fn flush(&mut self, world: &mut World) -> Result<()> {
        for entity in self.despawn_queue.drain(..).rev() {
            let _ = world.despawn(entity);
        }

        for mut buffer in self.command_buffers.drain(..) {
            buffer.apply(world)?;
        }

        Ok(())
    }
}

impl Default for SyncPoint {
    fn default() -> Self {
        Self::new()
    }
}

/// Debug snapshot of a schedule's stage layout.
#[derive(Debug, Clone)]
pub struct ScheduleDebugInfo {
    pub stage_count: usize,
    pub total_systems: usize,
}

impl ScheduleDebugInfo {
    pub fn from_schedule(schedule: &mut Schedule) -> Result<Self> {
        Ok(Self {
            stage_count: schedule.stage_count()?,
            total_systems: schedule.system_count(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sync_point_creation() {
        let sp = SyncPoint::new();
        assert!(sp.command_buffers.is_empty());
        assert!(sp.despawn_queue.is_empty());
    }

    #[test]
    fn test_profiler_records_stats() {
        let mut profiler = SystemProfiler::new();
        let id = SystemId(0);
        profiler.record_execution(id, Duration::from_millis(2));
        profiler.record_execution(id, Duration::from_millis(4));
        let stats = profiler.get_stats(id).unwrap();
        assert_eq!(stats.call_count, 2);
        assert_eq!(stats.min, Duration::from_millis(2));
        assert_eq!(stats.max, Duration::from_millis(4));
    }

    #[test]
    fn execute_frame_runs_schedule_and_flushes_sync_point() {
        let schedule = Schedule::new();
        let mut executor = Executor::new(schedule);
        let mut world = World::new();
        executor.execute_frame(&mut world, 0.016).unwrap();
    }
}
