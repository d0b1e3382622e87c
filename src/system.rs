//! System trait, per-system access declarations, and thread-safety classification.

use std::time::Duration;

use crate::component::ComponentTag;
use crate::error::Result;
use crate::world::World;

/// System ID
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub struct SystemId(pub u32);

/// Declared component-level access for a system, used to detect write-write and
/// read-write conflicts when forming parallel groups.
#[derive(Debug, Clone, Default)]
pub struct SystemAccess {
    pub reads: Vec<ComponentTag>,
    pub writes: Vec<ComponentTag>,
}

impl SystemAccess {
    pub fn empty() -> Self {
        Self::default()
    }

    /// True if `self` and `other` cannot safely run concurrently: any write-write or
    /// write-read overlap on the same component tag.
    pub fn conflicts_with(&self, other: &SystemAccess) -> bool {
        self.writes.iter().any(|w| other.writes.contains(w))
            || self.writes.iter().any(|w| other.reads.contains(w))
            || self.reads.iter().any(|r| other.writes.contains(r))
    }
}

/// Declared concurrency category for a system, checked before `SystemAccess` overlap
/// when forming parallel groups.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadSafety {
    /// Must run alone; never grouped with any other system.
    None,
    /// May run alongside other read-only systems, or a single writer, but never
    /// alongside another writer.
    ReadOnly,
    /// Writes components; may share a group with read-only systems touching disjoint
    /// tags, never with another writer of an overlapping tag.
    Writer,
    /// Safe to run alongside anything, including other fully re-entrant systems,
    /// regardless of declared access (e.g. a system that only touches thread-safe
    /// external resources).
    FullyReentrant,
}

impl ThreadSafety {
    /// Whether two systems with these thread-safety levels may ever share a parallel
    /// group, independent of their `SystemAccess` overlap.
    pub fn compatible_with(self, other: ThreadSafety) -> bool {
        use ThreadSafety::*;
        match (self, other) {
            (None, _) | (_, None) => false,
            (FullyReentrant, _) | (_, FullyReentrant) => true,
            (ReadOnly, ReadOnly) => true,
            (ReadOnly, Writer) | (Writer, ReadOnly) => true,
            // Two writers may still share a stage: `build_stages` ANDs this with
            // `SystemAccess::conflicts_with`, which is what actually rejects writers
            // with overlapping tags.
            (Writer, Writer) => true,
        }
    }
}

/// A system runs gameplay logic against the world once per frame phase.
pub trait System: Send + Sync {
    /// Component-level read/write declaration, used for parallel-group conflict checks.
    fn access(&self) -> SystemAccess;

    /// Declared concurrency category.
    fn thread_safety(&self) -> ThreadSafety {
        ThreadSafety::None
    }

    /// Get system name
    fn name(&self) -> &'static str;

    /// Maximum wall-clock time this system may spend in `update`/`render` before the
    /// scheduler raises `SystemTimeout`. `None` means no cap beyond the schedule-wide
    /// default.
    fn timeout(&self) -> Option<Duration> {
        None
    }

    /// Advance simulation state by `dt` seconds.
    fn update(&mut self, world: &mut World, dt: f32) -> Result<()>;

    /// Render phase, serial with respect to the render target. Default no-op for
    /// systems that only touch simulation state.
    fn render(&mut self, _world: &World, _dt: f32) -> Result<()> {
        Ok(())
    }
}

/// Boxed system
pub type BoxedSystem = Box<dyn System>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_access_conflicts() {
        let mut access1 = SystemAccess::empty();
        access1.writes.push(ComponentTag(0));

        let mut access2 = SystemAccess::empty();
        access2.writes.push(ComponentTag(0));

        assert!(access1.conflicts_with(&access2));
    }

    #[test]
    fn test_system_access_no_conflicts() {
        let mut access1 = SystemAccess::empty();
        access1.reads.push(ComponentTag(0));

        let mut access2 = SystemAccess::empty();
        access2.reads.push(ComponentTag(0));

        assert!(!access1.conflicts_with(&access2));
    }

    #[test]
    fn thread_safety_none_never_groups() {
        assert!(!ThreadSafety::None.compatible_with(ThreadSafety::None));
        assert!(!ThreadSafety::None.compatible_with(ThreadSafety::FullyReentrant));
    }

    #[test]
    fn two_writers_with_disjoint_access_are_compatible() {
        assert!(ThreadSafety::Writer.compatible_with(ThreadSafety::Writer));
    }

    #[test]
    fn reader_and_single_writer_are_compatible() {
        assert!(ThreadSafety::ReadOnly.compatible_with(ThreadSafety::Writer));
    }
}
