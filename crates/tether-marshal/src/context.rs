//! Per-worker marshal context and the thread registry that issues it.
//!
//! The "this thread owns this pool" relationship is explicit: a worker
//! registers with the shared [`ThreadRegistry`] and receives a
//! [`WorkerContext`] holding its wrapper pool and codec cache. The context
//! is `!Send`, so the pool can never silently migrate; deregistration
//! happens when the context is dropped.

use crate::codec::{ArrayCodec, CodecRegistry, ElementType};
use crate::error::{MarshalError, MarshalResult};
use crate::pool::WrapperPool;
use dashmap::DashMap;
use rustc_hash::FxHashMap;
use std::any::TypeId;
use std::sync::Arc;
use std::thread::ThreadId;

#[derive(Debug, Default)]
struct RegistryInner {
    /// Thread id → pool id of that thread's live context.
    workers: DashMap<ThreadId, u64>,
}

/// Shared registry of worker threads holding live marshal contexts.
///
/// Explicitly constructed at startup; clones share the same registry. One
/// context per thread at a time.
#[derive(Debug, Clone, Default)]
pub struct ThreadRegistry {
    inner: Arc<RegistryInner>,
}

impl ThreadRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the calling thread and hand it a worker context.
    ///
    /// Errors with [`MarshalError::ThreadAlreadyRegistered`] while a
    /// previous context for this thread is still alive.
    pub fn register(&self) -> MarshalResult<WorkerContext> {
        use dashmap::mapref::entry::Entry;

        let thread = std::thread::current().id();
        let pool = WrapperPool::new();
        match self.inner.workers.entry(thread) {
            Entry::Occupied(_) => Err(MarshalError::ThreadAlreadyRegistered),
            Entry::Vacant(vacant) => {
                vacant.insert(pool.id());
                tracing::debug!(?thread, pool = pool.id(), "worker registered");
                Ok(WorkerContext {
                    registry: Arc::clone(&self.inner),
                    thread,
                    pool,
                    codecs: FxHashMap::default(),
                })
            }
        }
    }

    /// Whether the given thread currently holds a context.
    pub fn is_registered(&self, thread: ThreadId) -> bool {
        self.inner.workers.contains_key(&thread)
    }

    /// Number of live worker contexts.
    pub fn len(&self) -> usize {
        self.inner.workers.len()
    }

    /// Whether no workers are registered.
    pub fn is_empty(&self) -> bool {
        self.inner.workers.is_empty()
    }
}

/// A worker thread's marshaling state: its wrapper pool plus a per-thread
/// codec cache that avoids contention on the shared registry.
///
/// `!Send` by construction (the pool is thread-affine).
pub struct WorkerContext {
    registry: Arc<RegistryInner>,
    thread: ThreadId,
    pool: WrapperPool,
    codecs: FxHashMap<TypeId, ArrayCodec>,
}

impl WorkerContext {
    /// This worker's wrapper pool.
    pub fn pool(&mut self) -> &mut WrapperPool {
        &mut self.pool
    }

    /// Resolve a codec, memoized per thread: only the first request for an
    /// element type touches the shared registry.
    pub fn cached_codec(
        &mut self,
        registry: &CodecRegistry,
        element: ElementType,
    ) -> MarshalResult<ArrayCodec> {
        if let Some(codec) = self.codecs.get(&element.type_id()) {
            return Ok(*codec);
        }
        let codec = registry.resolve(element)?;
        self.codecs.insert(element.type_id(), codec);
        Ok(codec)
    }

    /// Number of codecs cached on this worker. Diagnostics and tests.
    pub fn cached_codec_count(&self) -> usize {
        self.codecs.len()
    }
}

impl Drop for WorkerContext {
    fn drop(&mut self) {
        self.registry.workers.remove(&self.thread);
        tracing::debug!(thread = ?self.thread, "worker deregistered");
    }
}

impl std::fmt::Debug for WorkerContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerContext")
            .field("thread", &self.thread)
            .field("pool", &self.pool)
            .field("cached_codecs", &self.codecs.len())
            .finish()
    }
}
