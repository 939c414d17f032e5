//! Collection-cycle clock polled by the weak-generation sweeper.
//!
//! The sweeper never receives callbacks from the collector. It only polls a
//! monotonic cycle counter on allocate/free and flips the weak generations
//! when a boundary has passed.

use std::sync::atomic::{AtomicU64, Ordering};

/// Source of the runtime's monotonic collection-cycle counter.
///
/// Implementations report how many collection cycles have completed. The
/// counter must never move backwards.
pub trait CollectionClock: Send + Sync {
    /// The number of completed collection cycles.
    fn cycle(&self) -> u64;
}

/// A plain atomic cycle counter.
///
/// Embedders advance it from their collector's end-of-cycle hook; tests
/// advance it directly.
#[derive(Debug, Default)]
pub struct CycleCounter {
    cycles: AtomicU64,
}

impl CycleCounter {
    /// Create a counter at cycle zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a completed collection cycle. Returns the new cycle count.
    pub fn advance(&self) -> u64 {
        self.cycles.fetch_add(1, Ordering::Release) + 1
    }
}

impl CollectionClock for CycleCounter {
    fn cycle(&self) -> u64 {
        self.cycles.load(Ordering::Acquire)
    }
}
