//! # Tether Handles
//!
//! Boundary layer letting native code hold stable, opaque references to
//! objects owned by a garbage-collected runtime.
//!
//! ## Design
//!
//! - **Handle table**: partitioned pools keyed by opaque 64-bit tokens, one
//!   partition per kind (Normal, Pinned, Weak), one coarse mutex per table
//! - **Weak sweeper**: two-generation flip driven by polling a monotonic
//!   collection-cycle clock, O(1) invalidation per cycle
//! - **String bridge**: handle-table specialization with a canonical shared
//!   handle for the empty string

#![warn(clippy::all)]
#![warn(missing_docs)]

pub mod clock;
pub mod error;
pub mod handle;
pub mod string;
pub mod table;

pub use clock::{CollectionClock, CycleCounter};
pub use error::{HandleError, HandleResult};
pub use handle::{Handle, HandleKind};
pub use string::StringBridge;
pub use table::HandleTable;
