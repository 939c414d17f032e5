//! Managed-array marshaling wrappers.
//!
//! [`ManagedArray`] is the runtime-side array object: cheap-clone shared
//! byte storage plus element metadata. [`NativeArray`] is the view handed to
//! the non-GC side: a raw (pointer, count, element size) triple backed
//! either by a *pinned* managed array or by an *owned* native allocation.
//!
//! A wrapped array is tracked as a Pinned entry in a handle table: the entry
//! keeps the storage alive and address-stable, and releasing the wrapper
//! frees that entry. The non-owning side must never free a wrapped pointer;
//! an owned pointer is freed only through the wrapper's release path.

use crate::codec::{CodecRegistry, ElementType};
use crate::context::WorkerContext;
use crate::error::{MarshalError, MarshalResult};
use crate::pool::PoolTag;
use bytemuck::{AnyBitPattern, NoUninit};
use std::alloc::{Layout, alloc_zeroed, dealloc, handle_alloc_error};
use std::sync::Arc;
use tether_handles::{Handle, HandleKind, HandleTable};

/// A managed-runtime array: shared, address-stable byte storage with element
/// metadata for reconstruction.
///
/// Cloning shares the storage: a clone held anywhere (in particular, in a
/// pin table entry) keeps the bytes alive and in place.
#[derive(Debug, Clone)]
pub struct ManagedArray {
    bytes: Arc<[u8]>,
    element: ElementType,
}

impl ManagedArray {
    /// Build a managed array by copying a typed slice.
    pub fn from_slice<T: AnyBitPattern + NoUninit + 'static>(elements: &[T]) -> Self {
        Self {
            bytes: Arc::from(bytemuck::cast_slice::<T, u8>(elements)),
            element: ElementType::of::<T>(),
        }
    }

    /// Build a managed array from raw bytes with known element metadata.
    pub fn from_bytes(bytes: &[u8], element: ElementType) -> MarshalResult<Self> {
        if element.size() == 0 || bytes.len() % element.size() != 0 {
            return Err(MarshalError::RaggedBuffer {
                byte_len: bytes.len(),
                element_size: element.size().max(1),
            });
        }
        Ok(Self {
            bytes: Arc::from(bytes),
            element,
        })
    }

    /// Element count.
    pub fn len(&self) -> usize {
        match self.element.size() {
            0 => 0,
            size => self.bytes.len() / size,
        }
    }

    /// Whether the array holds no elements.
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Total storage size in bytes.
    pub fn byte_len(&self) -> usize {
        self.bytes.len()
    }

    /// Recorded element metadata.
    pub fn element_type(&self) -> ElementType {
        self.element
    }

    /// Raw storage bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Typed view of the elements. Demands exact element-type identity, not
    /// merely a size match — this is the managed side's own array.
    pub fn elements<T: AnyBitPattern + NoUninit + 'static>(&self) -> MarshalResult<&[T]> {
        let requested = ElementType::of::<T>();
        if requested.type_id() != self.element.type_id() {
            return Err(MarshalError::TypeMismatch {
                expected: self.element.name(),
                actual: requested.name(),
            });
        }
        bytemuck::try_cast_slice(&self.bytes).map_err(|_| MarshalError::ElementMismatch {
            actual: self.element.size(),
            requested: requested.size(),
        })
    }
}

/// How a [`NativeArray`] holds its buffer.
enum Backing {
    /// Released or never bound; the wrapper exposes null/zero.
    Empty,
    /// Wrapping an existing managed array, pinned via a table entry. The
    /// managed side still owns the array; the pin only blocks relocation
    /// and collection while the wrapper is live.
    Pinned {
        handle: Handle,
        table: Arc<HandleTable<ManagedArray>>,
    },
    /// Owning a natively allocated buffer; release deallocates it.
    Owned { layout: Layout },
}

/// The marshaling wrapper exposed to the non-GC side: a raw pointer, an
/// element count, and element metadata for round-trip reconstruction.
///
/// Release is explicit and idempotent. Dropping an un-released wrapper
/// still releases it, but logs a leak warning — the safety net is not the
/// contract.
pub struct NativeArray {
    ptr: *const u8,
    len: usize,
    element: Option<ElementType>,
    backing: Backing,
    tag: Option<PoolTag>,
}

// SAFETY: the backing is either an exclusively owned native buffer or a
// pinned managed array whose bytes are immutable and kept alive by the pin
// table entry. Shared references only permit reads; release and mutable
// views take &mut self.
unsafe impl Send for NativeArray {}
unsafe impl Sync for NativeArray {}

impl NativeArray {
    /// A wrapper with no buffer bound. Pool slots start here.
    pub(crate) fn detached() -> Self {
        Self {
            ptr: std::ptr::null(),
            len: 0,
            element: None,
            backing: Backing::Empty,
            tag: None,
        }
    }

    /// Wrap an existing managed array, pinning it in `table` for the
    /// wrapper's lifetime.
    pub fn wrap(
        table: &Arc<HandleTable<ManagedArray>>,
        array: &ManagedArray,
    ) -> MarshalResult<Self> {
        let mut wrapper = Self::detached();
        wrapper.rewrap(table, array)?;
        Ok(wrapper)
    }

    /// Allocate an owned, zero-filled native buffer for `len` elements.
    pub fn allocate(element: ElementType, len: usize) -> MarshalResult<Self> {
        let mut wrapper = Self::detached();
        wrapper.reallocate(element, len)?;
        Ok(wrapper)
    }

    /// Bind this (released) wrapper around an existing managed array.
    ///
    /// The array is inserted into `table` as a Pinned entry: that entry is
    /// the pin, and [`release`] frees it. Errors with
    /// [`MarshalError::AlreadyBound`] if the wrapper was not released first.
    ///
    /// [`release`]: NativeArray::release
    pub fn rewrap(
        &mut self,
        table: &Arc<HandleTable<ManagedArray>>,
        array: &ManagedArray,
    ) -> MarshalResult<()> {
        if !matches!(self.backing, Backing::Empty) {
            return Err(MarshalError::AlreadyBound);
        }
        let handle = table.allocate(array.clone(), HandleKind::Pinned)?;
        self.ptr = array.as_bytes().as_ptr();
        self.len = array.len();
        self.element = Some(array.element_type());
        self.backing = Backing::Pinned {
            handle,
            table: Arc::clone(table),
        };
        Ok(())
    }

    /// Bind this (released) wrapper to a fresh owned native buffer.
    pub fn reallocate(&mut self, element: ElementType, len: usize) -> MarshalResult<()> {
        if !matches!(self.backing, Backing::Empty) {
            return Err(MarshalError::AlreadyBound);
        }
        if len == 0 || element.size() == 0 {
            return Err(MarshalError::InvalidLayout("zero-length allocation"));
        }
        let byte_len = element
            .size()
            .checked_mul(len)
            .ok_or(MarshalError::InvalidLayout("byte length overflow"))?;
        let layout = Layout::from_size_align(byte_len, element.align())
            .map_err(|_| MarshalError::InvalidLayout("unrepresentable layout"))?;
        // SAFETY: layout has non-zero size (len and element size checked above).
        let ptr = unsafe { alloc_zeroed(layout) };
        if ptr.is_null() {
            handle_alloc_error(layout);
        }
        self.ptr = ptr;
        self.len = len;
        self.element = Some(element);
        self.backing = Backing::Owned { layout };
        Ok(())
    }

    /// Release the buffer: un-pin a wrapped array or free an owned one,
    /// then clear the pointer. Idempotent; calls after the first are no-ops.
    pub fn release(&mut self) {
        match std::mem::replace(&mut self.backing, Backing::Empty) {
            Backing::Empty => return,
            Backing::Pinned { handle, table } => {
                // The wrapper owns this pin entry; a miss here means the
                // entry was freed behind the wrapper's back.
                if let Err(err) = table.free(handle) {
                    tracing::error!(error = %err, "pin entry missing during wrapper release");
                }
            }
            Backing::Owned { layout } => {
                // SAFETY: ptr came from alloc_zeroed with exactly this
                // layout and has not been freed (backing was still Owned).
                unsafe { dealloc(self.ptr as *mut u8, layout) };
            }
        }
        self.ptr = std::ptr::null();
        self.len = 0;
        self.element = None;
    }

    /// Whether the wrapper currently has no buffer bound.
    pub fn is_released(&self) -> bool {
        matches!(self.backing, Backing::Empty)
    }

    /// Raw pointer of the wire triple. Null once released.
    pub fn ptr(&self) -> *const u8 {
        self.ptr
    }

    /// Element count of the wire triple. Zero once released.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the wrapper exposes no elements.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Element size of the wire triple. Zero once released.
    pub fn element_size(&self) -> usize {
        self.element.map_or(0, |e| e.size())
    }

    /// Recorded element metadata, if bound.
    pub fn element_type(&self) -> Option<ElementType> {
        self.element
    }

    /// Total buffer size in bytes.
    pub fn byte_len(&self) -> usize {
        self.element.map_or(0, |e| e.size() * self.len)
    }

    /// The whole buffer as bytes.
    pub fn as_bytes(&self) -> MarshalResult<&[u8]> {
        if self.is_released() {
            return Err(MarshalError::Released);
        }
        // SAFETY: ptr/byte_len describe either the owned allocation or the
        // pinned managed storage; both stay live and in place until release.
        Ok(unsafe { std::slice::from_raw_parts(self.ptr, self.byte_len()) })
    }

    /// Mutable byte access. Only owned buffers are writable; a wrapped
    /// array's bytes belong to the managed side.
    pub fn as_bytes_mut(&mut self) -> MarshalResult<&mut [u8]> {
        match self.backing {
            Backing::Empty => Err(MarshalError::Released),
            Backing::Pinned { .. } => Err(MarshalError::ReadOnlyBacking),
            Backing::Owned { .. } => {
                // SAFETY: owned buffer, exclusive access via &mut self.
                Ok(unsafe {
                    std::slice::from_raw_parts_mut(self.ptr as *mut u8, self.byte_len())
                })
            }
        }
    }

    /// Reinterpret the buffer as a slice of `T`.
    ///
    /// Valid only while the wrapper is live and `size_of::<T>()` matches the
    /// recorded element size; anything else is signaled, never silently
    /// reinterpreted or truncated.
    pub fn typed<T: AnyBitPattern + NoUninit + 'static>(&self) -> MarshalResult<&[T]> {
        let element = self.element.ok_or(MarshalError::Released)?;
        let requested = std::mem::size_of::<T>();
        if requested != element.size() {
            return Err(MarshalError::ElementMismatch {
                actual: element.size(),
                requested,
            });
        }
        bytemuck::try_cast_slice(self.as_bytes()?).map_err(|_| MarshalError::ElementMismatch {
            actual: element.size(),
            requested,
        })
    }

    /// Copy the buffer out as a typed vector.
    pub fn to_vec<T: AnyBitPattern + NoUninit + 'static>(&self) -> MarshalResult<Vec<T>> {
        Ok(self.typed::<T>()?.to_vec())
    }

    /// Reconstruct a concrete managed array from the buffer using the codec
    /// recorded for its element type, resolved through the worker's
    /// per-thread cache.
    pub fn to_managed(
        &self,
        ctx: &mut WorkerContext,
        registry: &CodecRegistry,
    ) -> MarshalResult<ManagedArray> {
        let element = self.element.ok_or(MarshalError::Released)?;
        let codec = ctx.cached_codec(registry, element)?;
        codec.rebuild(self.as_bytes()?)
    }

    pub(crate) fn pool_tag(&self) -> Option<PoolTag> {
        self.tag
    }

    pub(crate) fn set_pool_tag(&mut self, tag: PoolTag) {
        self.tag = Some(tag);
    }
}

impl Drop for NativeArray {
    fn drop(&mut self) {
        if !self.is_released() {
            tracing::warn!(
                len = self.len,
                element = self.element.map(|e| e.name()).unwrap_or("?"),
                "array wrapper dropped without explicit release"
            );
            self.release();
        }
    }
}

impl std::fmt::Debug for NativeArray {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NativeArray")
            .field("ptr", &self.ptr)
            .field("len", &self.len)
            .field("element", &self.element.map(|e| e.name()))
            .field("pooled", &self.tag.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tether_handles::{CollectionClock, CycleCounter};

    fn make_pin_table() -> Arc<HandleTable<ManagedArray>> {
        let clock = Arc::new(CycleCounter::new());
        Arc::new(HandleTable::new(clock as Arc<dyn CollectionClock>))
    }

    #[test]
    fn test_wrap_round_trip() {
        let table = make_pin_table();
        let source = ManagedArray::from_slice(&[1.0f32, 2.5, -3.25, 4.0]);
        let mut wrapper = NativeArray::wrap(&table, &source).unwrap();

        assert_eq!(wrapper.len(), 4);
        assert_eq!(wrapper.element_size(), 4);
        assert_eq!(wrapper.typed::<f32>().unwrap(), &[1.0, 2.5, -3.25, 4.0]);
        assert_eq!(table.len(), 1, "wrap pins the array in the table");

        wrapper.release();
        assert!(wrapper.is_released());
        assert!(wrapper.ptr().is_null());
        assert!(table.is_empty(), "release un-pins");
    }

    #[test]
    fn test_release_is_idempotent() {
        let table = make_pin_table();
        let source = ManagedArray::from_slice(&[7u8, 8, 9]);
        let mut wrapper = NativeArray::wrap(&table, &source).unwrap();
        wrapper.release();
        wrapper.release();
        wrapper.release();
        assert!(table.is_empty());
        assert!(matches!(wrapper.as_bytes(), Err(MarshalError::Released)));
    }

    #[test]
    fn test_owned_allocation_zeroed_and_writable() {
        let element = ElementType::of::<u32>();
        let mut wrapper = NativeArray::allocate(element, 8).unwrap();
        assert_eq!(wrapper.typed::<u32>().unwrap(), &[0u32; 8]);

        let payload = [1u32, 2, 3, 4, 5, 6, 7, 8];
        wrapper
            .as_bytes_mut()
            .unwrap()
            .copy_from_slice(bytemuck::cast_slice(&payload));
        assert_eq!(wrapper.to_vec::<u32>().unwrap(), payload.to_vec());
        wrapper.release();
    }

    #[test]
    fn test_wrapped_buffer_is_read_only() {
        let table = make_pin_table();
        let source = ManagedArray::from_slice(&[1u16, 2, 3]);
        let mut wrapper = NativeArray::wrap(&table, &source).unwrap();
        assert!(matches!(
            wrapper.as_bytes_mut(),
            Err(MarshalError::ReadOnlyBacking)
        ));
        wrapper.release();
    }

    #[test]
    fn test_typed_view_size_mismatch_is_signaled() {
        let table = make_pin_table();
        let source = ManagedArray::from_slice(&[1u32, 2, 3]);
        let mut wrapper = NativeArray::wrap(&table, &source).unwrap();
        assert!(matches!(
            wrapper.typed::<u16>(),
            Err(MarshalError::ElementMismatch {
                actual: 4,
                requested: 2
            })
        ));
        wrapper.release();
    }

    #[test]
    fn test_rebind_without_release_rejected() {
        let table = make_pin_table();
        let source = ManagedArray::from_slice(&[1u8]);
        let mut wrapper = NativeArray::wrap(&table, &source).unwrap();
        assert!(matches!(
            wrapper.rewrap(&table, &source),
            Err(MarshalError::AlreadyBound)
        ));
        wrapper.release();
        wrapper.rewrap(&table, &source).unwrap();
        wrapper.release();
    }

    #[test]
    fn test_zero_length_allocation_rejected() {
        let element = ElementType::of::<u64>();
        assert!(matches!(
            NativeArray::allocate(element, 0),
            Err(MarshalError::InvalidLayout(_))
        ));
    }

    #[test]
    fn test_drop_safety_net_unpins() {
        let table = make_pin_table();
        let source = ManagedArray::from_slice(&[42i64]);
        {
            let _wrapper = NativeArray::wrap(&table, &source).unwrap();
            assert_eq!(table.len(), 1);
        }
        assert!(table.is_empty(), "drop must release a forgotten wrapper");
    }

    #[test]
    fn test_managed_elements_demand_exact_type() {
        let array = ManagedArray::from_slice(&[1.0f32, 2.0]);
        assert!(array.elements::<f32>().is_ok());
        assert!(matches!(
            array.elements::<u32>(),
            Err(MarshalError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn test_wire_triple_reads_back_source_bytes() {
        let table = make_pin_table();
        let source = ManagedArray::from_slice(&[0xAABBu16, 0xCCDD]);
        let mut wrapper = NativeArray::wrap(&table, &source).unwrap();

        // Simulate the native side reading through the raw triple.
        let (ptr, len, size) = (wrapper.ptr(), wrapper.len(), wrapper.element_size());
        let raw = unsafe { std::slice::from_raw_parts(ptr, len * size) };
        assert_eq!(raw, source.as_bytes());
        wrapper.release();
    }
}
