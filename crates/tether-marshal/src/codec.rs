//! Type-identity codec table for type-erased array reconstruction.
//!
//! Reconstruction never uses runtime type introspection: a process-wide
//! registry maps element `TypeId` to a conversion function, populated once
//! at startup. Workers resolve through a per-thread cache (see
//! [`crate::context::WorkerContext`]) so hot marshaling paths neither pay
//! repeated resolution cost nor contend on the shared map.

use crate::array::ManagedArray;
use crate::error::{MarshalError, MarshalResult};
use bytemuck::{AnyBitPattern, NoUninit};
use dashmap::DashMap;
use std::any::TypeId;

/// Identity and layout of a marshaled element type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ElementType {
    type_id: TypeId,
    size: usize,
    align: usize,
    name: &'static str,
}

impl ElementType {
    /// Describe `T` as a marshalable element type.
    pub fn of<T: AnyBitPattern + NoUninit + 'static>() -> Self {
        Self {
            type_id: TypeId::of::<T>(),
            size: std::mem::size_of::<T>(),
            align: std::mem::align_of::<T>(),
            name: std::any::type_name::<T>(),
        }
    }

    /// The element's `TypeId`, the codec registry key.
    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    /// Element size in bytes.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Element alignment in bytes.
    pub fn align(&self) -> usize {
        self.align
    }

    /// Rust type name, for diagnostics only.
    pub fn name(&self) -> &'static str {
        self.name
    }
}

/// A copyable reconstruction record: element identity plus the conversion
/// function rebuilding a concrete managed array from raw bytes.
#[derive(Clone, Copy)]
pub struct ArrayCodec {
    element: ElementType,
    rebuild: fn(&[u8]) -> MarshalResult<ManagedArray>,
}

impl ArrayCodec {
    fn for_type<T: AnyBitPattern + NoUninit + 'static>() -> Self {
        Self {
            element: ElementType::of::<T>(),
            rebuild: rebuild_as::<T>,
        }
    }

    /// The element type this codec reconstructs.
    pub fn element(&self) -> ElementType {
        self.element
    }

    /// Rebuild a concrete managed array from a raw byte buffer.
    pub fn rebuild(&self, bytes: &[u8]) -> MarshalResult<ManagedArray> {
        (self.rebuild)(bytes)
    }
}

impl std::fmt::Debug for ArrayCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArrayCodec")
            .field("element", &self.element)
            .finish()
    }
}

fn rebuild_as<T: AnyBitPattern + NoUninit + 'static>(
    bytes: &[u8],
) -> MarshalResult<ManagedArray> {
    ManagedArray::from_bytes(bytes, ElementType::of::<T>())
}

/// Process-wide codec registry, populated once at startup.
///
/// An explicitly constructed service: create it during initialization,
/// register every element type the boundary marshals, and share it by
/// reference. Lookups are O(1); duplicate registration replaces the entry so
/// startup code can be idempotent.
#[derive(Debug, Default)]
pub struct CodecRegistry {
    codecs: DashMap<TypeId, ArrayCodec>,
}

impl CodecRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the codec for element type `T`, returning its descriptor.
    pub fn register<T: AnyBitPattern + NoUninit + 'static>(&self) -> ElementType {
        let codec = ArrayCodec::for_type::<T>();
        self.codecs.insert(codec.element().type_id(), codec);
        codec.element()
    }

    /// Resolve the codec for an element type.
    pub fn resolve(&self, element: ElementType) -> MarshalResult<ArrayCodec> {
        self.codecs
            .get(&element.type_id())
            .map(|entry| *entry)
            .ok_or(MarshalError::UnknownElementType {
                name: element.name(),
            })
    }

    /// Number of registered codecs.
    pub fn len(&self) -> usize {
        self.codecs.len()
    }

    /// Whether no codecs are registered.
    pub fn is_empty(&self) -> bool {
        self.codecs.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_element_type_layout() {
        let e = ElementType::of::<f32>();
        assert_eq!(e.size(), 4);
        assert_eq!(e.align(), 4);
        assert_eq!(e.type_id(), TypeId::of::<f32>());
    }

    #[test]
    fn test_register_and_resolve() {
        let registry = CodecRegistry::new();
        let element = registry.register::<u32>();
        let codec = registry.resolve(element).unwrap();
        assert_eq!(codec.element(), element);
    }

    #[test]
    fn test_unknown_type_errors() {
        let registry = CodecRegistry::new();
        let element = ElementType::of::<u64>();
        assert!(matches!(
            registry.resolve(element),
            Err(MarshalError::UnknownElementType { .. })
        ));
    }

    #[test]
    fn test_duplicate_registration_is_idempotent() {
        let registry = CodecRegistry::new();
        registry.register::<i16>();
        registry.register::<i16>();
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_rebuild_rejects_ragged_buffer() {
        let registry = CodecRegistry::new();
        let element = registry.register::<u32>();
        let codec = registry.resolve(element).unwrap();
        assert!(matches!(
            codec.rebuild(&[0u8; 7]),
            Err(MarshalError::RaggedBuffer { .. })
        ));
    }
}
