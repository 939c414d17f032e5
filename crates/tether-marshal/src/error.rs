//! Error types for the marshaling layer.

use tether_handles::HandleError;
use thiserror::Error;

/// Errors surfaced by array marshaling, pooling, and reconstruction.
///
/// Like the handle layer, every variant indicates a caller bug; there are no
/// recoverable-by-retry failure modes in this subsystem.
#[derive(Debug, Error)]
pub enum MarshalError {
    /// Pin-table failure while wrapping or releasing a managed array.
    #[error(transparent)]
    Handle(#[from] HandleError),

    /// A typed view was requested whose element size does not match the
    /// wrapper's recorded metadata.
    #[error("element size mismatch: buffer holds {actual}-byte elements, view requested {requested}-byte elements")]
    ElementMismatch {
        /// Recorded element size of the buffer.
        actual: usize,
        /// Element size of the requested view type.
        requested: usize,
    },

    /// A typed accessor named a different element type than the array
    /// records, even if the sizes happen to agree.
    #[error("element type mismatch: array holds `{expected}`, accessor requested `{actual}`")]
    TypeMismatch {
        /// Element type recorded on the array.
        expected: &'static str,
        /// Element type the accessor asked for.
        actual: &'static str,
    },

    /// Type-erased reconstruction was requested for an element type that was
    /// never registered with the codec registry.
    #[error("no codec registered for element type `{name}`")]
    UnknownElementType {
        /// Rust type name of the unregistered element type.
        name: &'static str,
    },

    /// A byte buffer cannot be carved into whole elements.
    #[error("byte length {byte_len} is not a multiple of element size {element_size}")]
    RaggedBuffer {
        /// Total buffer length in bytes.
        byte_len: usize,
        /// Recorded element size.
        element_size: usize,
    },

    /// The requested native allocation has an impossible layout
    /// (zero-length, or size overflow).
    #[error("invalid buffer layout: {0}")]
    InvalidLayout(&'static str),

    /// A wrapper was returned to its pool slot twice.
    #[error("wrapper returned to pool twice (slot {slot})")]
    DoubleReturn {
        /// The pool slot the wrapper claims to occupy.
        slot: usize,
    },

    /// A wrapper was returned to a pool that does not track it: either it
    /// was never pooled or it belongs to another thread's pool.
    #[error("wrapper does not belong to this pool")]
    ForeignWrapper,

    /// The calling thread already holds a live worker context.
    #[error("thread is already registered with the marshal registry")]
    ThreadAlreadyRegistered,

    /// A view or reconstruction was requested on a released wrapper.
    #[error("operation on a released array wrapper")]
    Released,

    /// A wrapper still bound to a buffer was re-initialized without an
    /// intervening release.
    #[error("wrapper is still bound; release it before rebinding")]
    AlreadyBound,

    /// A mutable view was requested on a wrapped (managed-owned) buffer.
    #[error("wrapped arrays are read-only on the native side")]
    ReadOnlyBacking,
}

/// Result type for marshaling operations.
pub type MarshalResult<T> = std::result::Result<T, MarshalError>;
