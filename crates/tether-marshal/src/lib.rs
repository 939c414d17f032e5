//! # Tether Marshal
//!
//! Bulk array/string marshaling across the managed-runtime boundary, built
//! on the handle layer in `tether-handles`.
//!
//! ## Design
//!
//! - **Managed array wrapper**: a (pointer, count, element size) triple over
//!   either a pinned managed array or an owned native allocation; explicit,
//!   idempotent release with a drop-time leak detector
//! - **Wrapper pool**: per-thread, `!Send`, high-water-mark free list with
//!   hard affinity checks on return
//! - **Codec registry**: element `TypeId` → reconstruction function,
//!   populated once at startup, resolved through a per-worker cache

#![warn(clippy::all)]
#![warn(missing_docs)]

pub mod array;
pub mod codec;
pub mod context;
pub mod error;
pub mod pool;

pub use array::{ManagedArray, NativeArray};
pub use codec::{ArrayCodec, CodecRegistry, ElementType};
pub use context::{ThreadRegistry, WorkerContext};
pub use error::{MarshalError, MarshalResult};
pub use pool::WrapperPool;
