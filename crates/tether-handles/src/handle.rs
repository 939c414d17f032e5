//! Opaque handle tokens passed by value across the boundary.
//!
//! A handle is a single `u64`. The top two bits carry the kind tag, the low
//! 62 bits carry a per-kind counter that is never reused within a kind.
//! Tag `0b00` is reserved: the raw value zero is never issued as a live
//! handle and serves as the wire encoding of "absent".
//!
//! Callers on the non-owning side must treat the value as fully opaque:
//! never synthesize one, never increment or decrement it.

use std::fmt;

/// Number of low bits carrying the per-kind counter.
pub const INDEX_BITS: u32 = 62;

/// Mask selecting the counter bits of a raw handle.
pub const INDEX_MASK: u64 = (1 << INDEX_BITS) - 1;

/// The kind of reference a handle represents.
///
/// The kind is encoded in the top two bits of the token and decides which
/// table partition owns the entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandleKind {
    /// Strong persistent reference — the handle keeps the target alive.
    Normal,
    /// Strong reference with an address-stability guarantee: the target's
    /// backing memory will not move while the handle is live.
    Pinned,
    /// Non-owning reference. Does not prevent collection and may stop
    /// resolving after a collection-cycle boundary.
    Weak,
}

impl HandleKind {
    /// All kinds, in tag order.
    pub const ALL: [HandleKind; 3] = [HandleKind::Normal, HandleKind::Pinned, HandleKind::Weak];

    /// The two-bit tag stored in the top bits of a raw handle.
    pub const fn tag(self) -> u64 {
        match self {
            HandleKind::Normal => 0b01,
            HandleKind::Pinned => 0b10,
            HandleKind::Weak => 0b11,
        }
    }

    /// Decode a two-bit tag. `0b00` is reserved and yields `None`.
    pub const fn from_tag(tag: u64) -> Option<HandleKind> {
        match tag {
            0b01 => Some(HandleKind::Normal),
            0b10 => Some(HandleKind::Pinned),
            0b11 => Some(HandleKind::Weak),
            _ => None,
        }
    }
}

/// An opaque token identifying exactly one table entry until freed.
///
/// Handles are `Copy` and compare by value. A freed handle value is never
/// reassigned to a different live object: the per-kind counter only moves
/// forward.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Handle(u64);

impl Handle {
    /// The zero token. Never issued; encodes "absent" on the wire.
    pub const NULL: Handle = Handle(0);

    /// Build a handle from a kind and a per-kind counter value.
    ///
    /// Counter values are 1-based; zero and overflow are rejected by the
    /// allocating table before this is reached.
    pub(crate) const fn new(kind: HandleKind, index: u64) -> Handle {
        debug_assert!(index != 0 && index <= INDEX_MASK);
        Handle((kind.tag() << INDEX_BITS) | index)
    }

    /// Reconstruct a handle from its raw wire value.
    pub const fn from_raw(raw: u64) -> Handle {
        Handle(raw)
    }

    /// The raw wire value, passed by value across the boundary.
    pub const fn to_raw(self) -> u64 {
        self.0
    }

    /// Decode the kind tag. `None` for the zero token and any forged value
    /// carrying the reserved tag.
    pub const fn kind(self) -> Option<HandleKind> {
        HandleKind::from_tag(self.0 >> INDEX_BITS)
    }

    /// The per-kind counter portion of the token.
    pub const fn index(self) -> u64 {
        self.0 & INDEX_MASK
    }

    /// Whether this is the zero token.
    pub const fn is_null(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Debug for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind() {
            Some(kind) => write!(f, "Handle({:?}, {})", kind, self.index()),
            None if self.is_null() => write!(f, "Handle(NULL)"),
            None => write!(f, "Handle(forged, raw={:#018x})", self.0),
        }
    }
}
