//! Per-thread wrapper pool — a high-water-mark cache of array wrappers.
//!
//! Hot marshaling paths recycle wrapper instances instead of allocating.
//! The pool is strictly thread-affine: it is `!Send`, and every wrapper it
//! issues is stamped with the pool's process-unique id, so a wrapper that
//! crosses threads is rejected at return time instead of corrupting another
//! thread's free list. The slot list only grows, never shrinks.

use crate::array::NativeArray;
use crate::error::{MarshalError, MarshalResult};
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};

/// Slot count past which pool growth is logged.
const GROWTH_LOG_THRESHOLD: usize = 64;

static NEXT_POOL_ID: AtomicU64 = AtomicU64::new(1);

/// Identifies the pool slot a wrapper was issued from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct PoolTag {
    pub(crate) pool_id: u64,
    pub(crate) slot: usize,
}

struct PoolSlot {
    /// The parked wrapper instance, present while the slot is free.
    wrapper: Option<Box<NativeArray>>,
    in_use: bool,
}

/// Free list of reusable array wrappers owned by one thread.
///
/// Obtained through a worker context ([`crate::context::ThreadRegistry`]),
/// never shared: the type is `!Send` by construction.
pub struct WrapperPool {
    id: u64,
    slots: Vec<PoolSlot>,
    _thread_affine: PhantomData<*mut ()>,
}

impl WrapperPool {
    pub(crate) fn new() -> Self {
        Self {
            id: NEXT_POOL_ID.fetch_add(1, Ordering::Relaxed),
            slots: Vec::new(),
            _thread_affine: PhantomData,
        }
    }

    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    /// Check out a wrapper: the first free slot's parked instance, or a
    /// fresh one if every slot is busy. The instance is conceptually
    /// borrowed until [`put`] returns it.
    ///
    /// [`put`]: WrapperPool::put
    pub fn get(&mut self) -> Box<NativeArray> {
        for slot in self.slots.iter_mut() {
            if !slot.in_use {
                if let Some(wrapper) = slot.wrapper.take() {
                    slot.in_use = true;
                    return wrapper;
                }
            }
        }

        let slot_index = self.slots.len();
        self.slots.push(PoolSlot {
            wrapper: None,
            in_use: true,
        });
        if self.slots.len() > GROWTH_LOG_THRESHOLD {
            tracing::debug!(pool = self.id, slots = self.slots.len(), "wrapper pool grew");
        }
        let mut wrapper = Box::new(NativeArray::detached());
        wrapper.set_pool_tag(PoolTag {
            pool_id: self.id,
            slot: slot_index,
        });
        wrapper
    }

    /// Return a wrapper to its slot, releasing whatever it still holds.
    ///
    /// Fatal misuse, never ignored: a wrapper this pool does not track
    /// (untagged, or tagged by another pool — including another thread's)
    /// is [`MarshalError::ForeignWrapper`]; a return into a slot that is not
    /// checked out is [`MarshalError::DoubleReturn`].
    pub fn put(&mut self, mut wrapper: Box<NativeArray>) -> MarshalResult<()> {
        let tag = wrapper.pool_tag().ok_or(MarshalError::ForeignWrapper)?;
        if tag.pool_id != self.id {
            return Err(MarshalError::ForeignWrapper);
        }
        let slot = self
            .slots
            .get_mut(tag.slot)
            .ok_or(MarshalError::ForeignWrapper)?;
        if !slot.in_use {
            return Err(MarshalError::DoubleReturn { slot: tag.slot });
        }
        wrapper.release();
        slot.wrapper = Some(wrapper);
        slot.in_use = false;
        Ok(())
    }

    /// Total slots ever created (the high-water mark).
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Slots currently checked out.
    pub fn in_use(&self) -> usize {
        self.slots.iter().filter(|s| s.in_use).count()
    }
}

impl std::fmt::Debug for WrapperPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WrapperPool")
            .field("id", &self.id)
            .field("capacity", &self.capacity())
            .field("in_use", &self.in_use())
            .finish()
    }
}
