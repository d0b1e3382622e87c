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

//! Size-class memory accounting: pooled allocation for small requests, a live-byte
//! budget enforced against `MemoryLimitExceeded`, threshold callbacks, and opt-in leak
//! tracking.

use parking_lot::Mutex;

use crate::error::{EcsError, Result};

/// Allocation size classes the manager pools; anything larger bypasses pooling.
pub const SIZE_CLASSES: [usize; 6] = [32, 64, 128, 256, 512, 1024];

fn size_class_for(size: usize) -> Option<usize> {
    SIZE_CLASSES.iter().copied().find(|&class| size <= class)
}

#[derive(Default)]
struct Pool {
    free_blocks: Vec<Vec<u8>>,
}

struct LeakRecord {
    size: usize,
    allocated_at: std::time::Instant,
}

/// A point-in-time accounting snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MemoryStats {
    pub current_usage: usize,
    pub peak_usage: usize,
    pub live_allocations: usize,
}

/// Fires once per threshold crossing of `current_usage / limit`.
pub type ThresholdCallback = Box<dyn Fn(f64) + Send + Sync>;

/// Pooled allocator with a global live-byte budget.
pub struct MemoryManager {
    pools: Mutex<Vec<Pool>>,
    limit: Option<usize>,
    current_usage: std::sync::atomic::AtomicUsize,
    peak_usage: std::sync::atomic::AtomicUsize,
    leak_tracking: bool,
    leaks: Mutex<ahash::AHashMap<usize, LeakRecord>>,
    next_handle: std::sync::atomic::AtomicUsize,
    thresholds: Mutex<Vec<(f64, bool)>>,
    callbacks: Mutex<Vec<ThresholdCallback>>,
}

/// Opaque handle to a pooled or direct allocation, returned by `allocate`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AllocHandle(usize);

impl MemoryManager {
    pub fn new(limit: Option<usize>, leak_tracking: bool) -> Self {
        Self {
            pools: Mutex::new((0..SIZE_CLASSES.len()).map(|_| Pool::default()).collect()),
            limit,
            current_usage: std::sync::atomic::AtomicUsize::new(0),
            peak_usage: std::sync::atomic::AtomicUsize::new(0),
            leak_tracking,
            leaks: Mutex::new(ahash::AHashMap::new()),
            next_handle: std::sync::atomic::AtomicUsize::new(1),
            thresholds: Mutex::new(Vec::new()),
            callbacks: Mutex::new(Vec::new()),
        }
    }

    /// Register a warning callback fired once per crossing of `current/limit >= ratio`.
    pub fn on_threshold(&self, ratio: f64, callback: ThresholdCallback) {
        self.thresholds.lock().push((ratio, false));
        self.callbacks.lock().push(callback);
    }

    pub fn stats(&self) -> MemoryStats {
        MemoryStats {
            current_usage: self.current_usage.load(std::sync::atomic::Ordering::Relaxed),
            peak_usage: self.peak_usage.load(std::sync::atomic::Ordering::Relaxed),
            live_allocations: self.leaks.lock().len(),
        }
    }

    /// Allocate `size` bytes, pooled if it fits a size class. Fails without mutating
    /// `current_usage` if a limit is set and would be exceeded.
    pub fn allocate(&self, size: usize) -> Result<(AllocHandle, Vec<u8>)> {
        use std::sync::atomic::Ordering;

        let current = self.current_usage.load(Ordering::Relaxed);
        if let Some(limit) = self.limit {
            if current + size > limit {
                return Err(EcsError::MemoryLimitExceeded { requested: size, limit });
            }
        }

        let block = match size_class_for(size) {
            Some(class) => {
                let class_idx = SIZE_CLASSES.iter().position(|&c| c == class).unwrap();
                let mut pools = self.pools.lock();
                pools[class_idx].free_blocks.pop().unwrap_or_else(|| vec![0u8; class])
            }
            None => vec![0u8; size],
        };

        let new_usage = self.current_usage.fetch_add(size, Ordering::Relaxed) + size;
        self.peak_usage.fetch_max(new_usage, Ordering::Relaxed);

        let handle = AllocHandle(self.next_handle.fetch_add(1, Ordering::Relaxed));
        if self.leak_tracking {
            self.leaks.lock().insert(handle.0, LeakRecord { size, allocated_at: std::time::Instant::now() });
        }

        self.check_thresholds(new_usage);
        Ok((handle, block))
    }

    /// Return a block to its size-class pool (or drop it, for oversized requests) and
    /// release its accounted bytes.
    pub fn deallocate(&self, handle: AllocHandle, size: usize, block: Vec<u8>) {
        use std::sync::atomic::Ordering;

        if let Some(class) = size_class_for(size) {
            let class_idx = SIZE_CLASSES.iter().position(|&c| c == class).unwrap();
            self.pools.lock()[class_idx].free_blocks.push(block);
        }
        self.current_usage.fetch_sub(size, Ordering::Relaxed);
        if self.leak_tracking {
            self.leaks.lock().remove(&handle.0);
        }
    }

    fn check_thresholds(&self, current: usize) {
        let Some(limit) = self.limit else { return };
        if limit == 0 {
            return;
        }
        let ratio = current as f64 / limit as f64;
        let mut thresholds = self.thresholds.lock();
        let callbacks = self.callbacks.lock();
        for (i, (threshold, fired)) in thresholds.iter_mut().enumerate() {
            if ratio >= *threshold && !*fired {
                *fired = true;
                if let Some(cb) = callbacks.get(i) {
                    cb(ratio);
                }
            } else if ratio < *threshold {
                *fired = false;
            }
        }
    }

    /// Snapshot of every tracked live allocation's size and age. Empty unless leak
    /// tracking was enabled at construction.
    pub fn leak_report(&self) -> Vec<(usize, std::time::Duration)> {
        self.leaks.lock().values().map(|r| (r.size, r.allocated_at.elapsed())).collect()
    }

    /// Allocate `size` bytes whose start is aligned to `align` (a power of two).
    /// Pads the backing buffer by `align` bytes so some offset within it satisfies the
    /// alignment, and remembers that offset (and the oversized origin buffer) in the
    /// returned [`AlignedAllocation`] so [`Self::deallocate_aligned`] frees the right
    /// bytes. Bypasses size-class pooling, same as any oversized direct allocation.
    pub fn allocate_aligned(&self, size: usize, align: usize) -> Result<AlignedAllocation> {
        use std::sync::atomic::Ordering;
        debug_assert!(align.is_power_of_two(), "alignment must be a power of two");

        let padded = size + align;
        let current = self.current_usage.load(Ordering::Relaxed);
        if let Some(limit) = self.limit {
            if current + padded > limit {
                return Err(EcsError::MemoryLimitExceeded { requested: padded, limit });
            }
        }

        let origin = vec![0u8; padded];
        let base = origin.as_ptr() as usize;
        let offset = base.wrapping_neg() & (align - 1);

        let new_usage = self.current_usage.fetch_add(padded, Ordering::Relaxed) + padded;
        self.peak_usage.fetch_max(new_usage, Ordering::Relaxed);

        let handle = AllocHandle(self.next_handle.fetch_add(1, Ordering::Relaxed));
        if self.leak_tracking {
            self.leaks.lock().insert(handle.0, LeakRecord { size: padded, allocated_at: std::time::Instant::now() });
        }
        self.check_thresholds(new_usage);

        Ok(AlignedAllocation { handle, origin, offset, size })
    }

    /// Free an allocation returned by `allocate_aligned`, releasing its padded byte
    /// count from the budget.
    pub fn deallocate_aligned(&self, block: AlignedAllocation) {
        use std::sync::atomic::Ordering;
        self.current_usage.fetch_sub(block.origin.len(), Ordering::Relaxed);
        if self.leak_tracking {
            self.leaks.lock().remove(&block.handle.0);
        }
    }

    /// Track `size` bytes of externally-owned memory (e.g. an archetype column growing)
    /// against the live-byte budget without going through the pooled allocator. Returns
    /// a handle to pass to `release`.
    pub fn charge(&self, size: usize) -> Result<AllocHandle> {
        use std::sync::atomic::Ordering;

        let current = self.current_usage.load(Ordering::Relaxed);
        if let Some(limit) = self.limit {
            if current + size > limit {
                return Err(EcsError::MemoryLimitExceeded { requested: size, limit });
            }
        }

        let new_usage = self.current_usage.fetch_add(size, Ordering::Relaxed) + size;
        self.peak_usage.fetch_max(new_usage, Ordering::Relaxed);

        let handle = AllocHandle(self.next_handle.fetch_add(1, Ordering::Relaxed));
        if self.leak_tracking {
            self.leaks.lock().insert(handle.0, LeakRecord { size, allocated_at: std::time::Instant::now() });
        }
        self.check_thresholds(new_usage);
        Ok(handle)
    }

    /// Release bytes tracked by `charge`.
    pub fn release(&self, handle: AllocHandle, size: usize) {
        use std::sync::atomic::Ordering;
        self.current_usage.fetch_sub(size, Ordering::Relaxed);
        if self.leak_tracking {
            self.leaks.lock().remove(&handle.0);
        }
    }
}

/// An aligned allocation returned by [`MemoryManager::allocate_aligned`]. `origin` is
/// padded by up to `align` bytes; `offset` is where the aligned region of `size` bytes
/// starts within it.
pub struct AlignedAllocation {
    handle: AllocHandle,
    origin: Vec<u8>,
    offset: usize,
    size: usize,
}

impl AlignedAllocation {
    pub fn as_slice(&self) -> &[u8] {
        &self.origin[self.offset..self.offset + self.size]
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.origin[self.offset..self.offset + self.size]
    }

    pub fn addr(&self) -> usize {
        self.origin.as_ptr() as usize + self.offset
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocate_deallocate_roundtrips_usage() {
        let mgr = MemoryManager::new(Some(1024), false);
        let (handle, block) = mgr.allocate(64).unwrap();
        assert_eq!(mgr.stats().current_usage, 64);
        mgr.deallocate(handle, 64, block);
        assert_eq!(mgr.stats().current_usage, 0);
    }

    #[test]
    fn allocation_past_limit_is_rejected_without_side_effects() {
        let mgr = MemoryManager::new(Some(32), false);
        assert!(matches!(mgr.allocate(64), Err(EcsError::MemoryLimitExceeded { .. })));
        assert_eq!(mgr.stats().current_usage, 0);
    }

    #[test]
    fn leak_tracking_reports_untracked_allocations_until_deallocated() {
        let mgr = MemoryManager::new(None, true);
        let (handle, block) = mgr.allocate(32).unwrap();
        assert_eq!(mgr.leak_report().len(), 1);
        mgr.deallocate(handle, 32, block);
        assert_eq!(mgr.leak_report().len(), 0);
    }

    #[test]
    fn aligned_allocation_start_is_aligned_and_deallocate_releases_budget() {
        let mgr = MemoryManager::new(Some(1024), false);
        let mut block = mgr.allocate_aligned(100, 64).unwrap();
        assert_eq!(block.addr() % 64, 0);
        assert_eq!(block.as_slice().len(), 100);
        block.as_mut_slice()[0] = 7;
        assert_eq!(block.as_slice()[0], 7);

        assert!(mgr.stats().current_usage > 0);
        mgr.deallocate_aligned(block);
        assert_eq!(mgr.stats().current_usage, 0);
    }

    #[test]
    fn aligned_allocation_past_limit_is_rejected() {
        let mgr = MemoryManager::new(Some(32), false);
        assert!(matches!(mgr.allocate_aligned(64, 64), Err(EcsError::MemoryLimitExceeded { .. })));
        assert_eq!(mgr.stats().current_usage, 0);
    }

    #[test]
    fn charge_and_release_roundtrip_usage() {
        let mgr = MemoryManager::new(Some(1024), false);
        let handle = mgr.charge(64).unwrap();
        assert_eq!(mgr.stats().current_usage, 64);
        mgr.release(handle, 64);
        assert_eq!(mgr.stats().current_usage, 0);
    }

    #[test]
    fn threshold_callback_fires_once_per_crossing() {
        let mgr = MemoryManager::new(Some(100), false);
        let hits = std::sync::Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let hits_clone = hits.clone();
        mgr.on_threshold(0.5, Box::new(move |_ratio| {
            hits_clone.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        }));

        let (h1, b1) = mgr.allocate(60).unwrap();
        assert_eq!(hits.load(std::sync::atomic::Ordering::Relaxed), 1);
        let (h2, b2) = mgr.allocate(10).unwrap();
        assert_eq!(hits.load(std::sync::atomic::Ordering::Relaxed), 1);
        mgr.deallocate(h1, 60, b1);
        mgr.deallocate(h2, 10, b2);
    }
}
