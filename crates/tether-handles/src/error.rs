//! Error types for the handle layer.

use crate::handle::{Handle, HandleKind};
use thiserror::Error;

/// Errors surfaced by handle-table operations.
///
/// Every variant signals a logic bug at the boundary, not a transient
/// condition, and nothing here is retried. A weak handle whose target was
/// collected is *not* an error; it resolves to `Ok(None)`.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum HandleError {
    /// The token is absent from every partition that should contain it:
    /// a forged value, a double-free, or a use-after-free.
    #[error("invalid handle {handle:?}: not present in any partition")]
    InvalidHandle {
        /// The offending token.
        handle: Handle,
    },

    /// The 62-bit per-kind counter overflowed. Unreachable in practice.
    #[error("handle counter exhausted for kind {kind:?}")]
    CounterExhausted {
        /// The kind whose counter ran out.
        kind: HandleKind,
    },
}

/// Result type for handle-table operations.
pub type HandleResult<T> = std::result::Result<T, HandleError>;
