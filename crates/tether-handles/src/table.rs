//! Partitioned handle table — the authority for live boundary references.
//!
//! One partition per handle kind. All partition reads and writes are
//! serialized through a single coarse mutex per table; per-kind counters are
//! atomic and advance outside the lock, so two racing allocations never
//! receive the same token regardless of lock acquisition order.
//!
//! Weak entries live in a two-generation pair. On every allocate/free the
//! table polls the collection clock; when a cycle boundary has passed, the
//! current generation becomes the shadow and the old shadow is dropped.
//! Invalidation is O(1) per cycle instead of a per-entry liveness scan, at
//! the cost of weak handles surviving up to ~2 cycles past collection.

use crate::clock::CollectionClock;
use crate::error::{HandleError, HandleResult};
use crate::handle::{Handle, HandleKind, INDEX_MASK};
use crossbeam_utils::CachePadded;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Two-generation weak mapping: `current` receives new entries, `shadow`
/// holds the previous generation until the next flip drops it.
struct WeakGenerations<T> {
    current: FxHashMap<u64, T>,
    shadow: FxHashMap<u64, T>,
}

impl<T> WeakGenerations<T> {
    fn new() -> Self {
        Self {
            current: FxHashMap::default(),
            shadow: FxHashMap::default(),
        }
    }

    /// Retire the shadow generation and demote `current` into its place.
    /// Returns how many stale entries were dropped.
    fn flip(&mut self) -> usize {
        let dropped = self.shadow.len();
        self.shadow = std::mem::take(&mut self.current);
        dropped
    }

    fn insert(&mut self, index: u64, value: T) {
        self.current.insert(index, value);
    }

    /// Look up in the current generation first, then the shadow.
    fn get(&self, index: u64) -> Option<&T> {
        self.current.get(&index).or_else(|| self.shadow.get(&index))
    }

    fn remove(&mut self, index: u64) -> bool {
        self.current.remove(&index).is_some() || self.shadow.remove(&index).is_some()
    }

    /// Replace an entry in place, re-homing it into the current generation
    /// so a freshly written mapping survives a full cycle.
    fn rehome(&mut self, index: u64, value: T) -> bool {
        if self.current.remove(&index).is_some() || self.shadow.remove(&index).is_some() {
            self.current.insert(index, value);
            true
        } else {
            false
        }
    }

    fn len(&self) -> usize {
        self.current.len() + self.shadow.len()
    }
}

/// All partitions, guarded together by the table mutex.
struct Partitions<T> {
    normal: FxHashMap<u64, T>,
    pinned: FxHashMap<u64, T>,
    weak: WeakGenerations<T>,
}

impl<T> Partitions<T> {
    fn new() -> Self {
        Self {
            normal: FxHashMap::default(),
            pinned: FxHashMap::default(),
            weak: WeakGenerations::new(),
        }
    }

    fn strong(&mut self, kind: HandleKind) -> &mut FxHashMap<u64, T> {
        match kind {
            HandleKind::Normal => &mut self.normal,
            HandleKind::Pinned => &mut self.pinned,
            HandleKind::Weak => unreachable!("weak entries live in the generation pair"),
        }
    }
}

/// Partitioned pool of live object references keyed by opaque tokens.
///
/// The table exclusively owns the strong references it holds; callers own
/// only the token. `T` is expected to be a cheap-clone owner (an `Arc`-like
/// reference into the managed runtime) whose pointee does not move — for
/// Pinned entries, holding the entry *is* the pin.
///
/// Constructed explicitly and shared by reference (`Arc`); there is no
/// ambient global table.
pub struct HandleTable<T> {
    partitions: Mutex<Partitions<T>>,
    /// Per-kind token counters, indexed by `HandleKind` discriminant.
    /// Incremented outside the table lock.
    counters: [CachePadded<AtomicU64>; 3],
    clock: Arc<dyn CollectionClock>,
    /// Cycle count at which the next weak flip happens.
    next_cycle: AtomicU64,
}

impl<T: Clone> HandleTable<T> {
    /// Create an empty table polling the given collection clock.
    pub fn new(clock: Arc<dyn CollectionClock>) -> Self {
        let next_cycle = clock.cycle() + 1;
        Self {
            partitions: Mutex::new(Partitions::new()),
            counters: [
                CachePadded::new(AtomicU64::new(1)),
                CachePadded::new(AtomicU64::new(1)),
                CachePadded::new(AtomicU64::new(1)),
            ],
            clock,
            next_cycle: AtomicU64::new(next_cycle),
        }
    }

    /// Issue a fresh token for `value` in the given kind's partition.
    ///
    /// The only failure is per-kind counter exhaustion, which indicates the
    /// process has issued 2^62 handles of one kind.
    pub fn allocate(&self, value: T, kind: HandleKind) -> HandleResult<Handle> {
        let index = self.counters[kind as usize].fetch_add(1, Ordering::Relaxed);
        if index > INDEX_MASK {
            return Err(HandleError::CounterExhausted { kind });
        }
        let handle = Handle::new(kind, index);

        let mut parts = self.partitions.lock();
        self.poll_sweep(&mut parts);
        match kind {
            HandleKind::Weak => parts.weak.insert(index, value),
            kind => {
                parts.strong(kind).insert(index, value);
            }
        }
        Ok(handle)
    }

    /// Remove the entry behind `handle`.
    ///
    /// A missing Normal/Pinned entry is a double-free or a forged token and
    /// surfaces as [`HandleError::InvalidHandle`], never silently ignored.
    /// Weak frees are best-effort: an entry already dropped by a generation
    /// flip is indistinguishable from a collected one, so the call succeeds.
    pub fn free(&self, handle: Handle) -> HandleResult<()> {
        let kind = self.decode(handle)?;
        let mut parts = self.partitions.lock();
        self.poll_sweep(&mut parts);
        match kind {
            HandleKind::Weak => {
                parts.weak.remove(handle.index());
                Ok(())
            }
            kind => match parts.strong(kind).remove(&handle.index()) {
                Some(_) => Ok(()),
                None => Err(HandleError::InvalidHandle { handle }),
            },
        }
    }

    /// Resolve `handle` to its target.
    ///
    /// Normal/Pinned handles must resolve while live: a miss is
    /// [`HandleError::InvalidHandle`] and `Ok(None)` is never returned for
    /// them. For Weak handles both generations are checked and `Ok(None)` is
    /// the expected stale outcome, distinct from the forged-token error.
    pub fn get(&self, handle: Handle) -> HandleResult<Option<T>> {
        let kind = self.decode(handle)?;
        let mut parts = self.partitions.lock();
        match kind {
            HandleKind::Weak => Ok(parts.weak.get(handle.index()).cloned()),
            kind => match parts.strong(kind).get(&handle.index()) {
                Some(value) => Ok(Some(value.clone())),
                None => Err(HandleError::InvalidHandle { handle }),
            },
        }
    }

    /// Replace the stored target in place, redirecting the handle without
    /// reissuing a token. Same fatal-on-missing semantics as [`free`].
    ///
    /// A weak set re-homes the entry into the current generation.
    ///
    /// [`free`]: HandleTable::free
    pub fn set(&self, handle: Handle, value: T) -> HandleResult<()> {
        let kind = self.decode(handle)?;
        let mut parts = self.partitions.lock();
        match kind {
            HandleKind::Weak => {
                if parts.weak.rehome(handle.index(), value) {
                    Ok(())
                } else {
                    Err(HandleError::InvalidHandle { handle })
                }
            }
            kind => match parts.strong(kind).get_mut(&handle.index()) {
                Some(slot) => {
                    *slot = value;
                    Ok(())
                }
                None => Err(HandleError::InvalidHandle { handle }),
            },
        }
    }

    /// Number of live entries across all partitions, stale weak shadow
    /// entries included. Diagnostics only.
    pub fn len(&self) -> usize {
        let parts = self.partitions.lock();
        parts.normal.len() + parts.pinned.len() + parts.weak.len()
    }

    /// Whether the table holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn decode(&self, handle: Handle) -> HandleResult<HandleKind> {
        handle
            .kind()
            .ok_or(HandleError::InvalidHandle { handle })
    }

    /// Flip the weak generations if a collection-cycle boundary has passed
    /// since the last allocate/free. Caller holds the table lock.
    fn poll_sweep(&self, parts: &mut Partitions<T>) {
        let cycle = self.clock.cycle();
        if cycle >= self.next_cycle.load(Ordering::Acquire) {
            let dropped = parts.weak.flip();
            self.next_cycle.store(cycle + 1, Ordering::Release);
            #[cfg(feature = "table_logging")]
            tracing::debug!(cycle, dropped, "weak generation flip");
            #[cfg(not(feature = "table_logging"))]
            let _ = dropped;
        }
    }
}
