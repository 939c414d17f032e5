//! String bridge — a thin handle-table specialization for string values.
//!
//! The wire contract: the zero token encodes an absent string, and the empty
//! string maps to one canonical, process-lifetime handle that generic
//! release logic can never free.

use crate::clock::CollectionClock;
use crate::error::HandleResult;
use crate::handle::{Handle, HandleKind};
use crate::table::HandleTable;
use std::sync::Arc;

/// Marshals strings across the boundary through an internal handle table.
pub struct StringBridge {
    table: HandleTable<Arc<str>>,
    /// Canonical shared handle for the empty string. Allocated once at
    /// construction and never freed.
    empty: Handle,
}

impl StringBridge {
    /// Create a bridge, allocating the canonical empty-string handle.
    pub fn new(clock: Arc<dyn CollectionClock>) -> HandleResult<Self> {
        let table = HandleTable::new(clock);
        let empty = table.allocate(Arc::from(""), HandleKind::Normal)?;
        Ok(Self { table, empty })
    }

    /// The canonical empty-string token. Stable for the process lifetime.
    pub fn empty_handle(&self) -> Handle {
        self.empty
    }

    /// Convert a string to a boundary token.
    ///
    /// `None` maps to the zero token, the empty string to the canonical
    /// handle, anything else to a fresh Normal handle.
    pub fn to_native(&self, value: Option<&str>) -> HandleResult<Handle> {
        match value {
            None => Ok(Handle::NULL),
            Some("") => Ok(self.empty),
            Some(s) => self.table.allocate(Arc::from(s), HandleKind::Normal),
        }
    }

    /// Weak variant of [`to_native`]: the token does not keep the string
    /// alive past a collection-cycle boundary. The empty string still maps
    /// to the canonical (strong) handle.
    ///
    /// [`to_native`]: StringBridge::to_native
    pub fn to_native_weak(&self, value: &str) -> HandleResult<Handle> {
        if value.is_empty() {
            Ok(self.empty)
        } else {
            self.table.allocate(Arc::from(value), HandleKind::Weak)
        }
    }

    /// Resolve a token back to its string.
    ///
    /// The zero token resolves to `None`; a stale weak token also resolves
    /// to `None`. A forged or freed strong token is an error.
    pub fn to_managed(&self, handle: Handle) -> HandleResult<Option<Arc<str>>> {
        if handle.is_null() {
            return Ok(None);
        }
        self.table.get(handle)
    }

    /// Release a string token.
    ///
    /// The zero token and the canonical empty-string handle are permanent
    /// no-op release targets; everything else is freed from the table.
    pub fn free(&self, handle: Handle) -> HandleResult<()> {
        if handle.is_null() || handle == self.empty {
            return Ok(());
        }
        self.table.free(handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::CycleCounter;
    use crate::error::HandleError;

    fn make_bridge() -> StringBridge {
        StringBridge::new(Arc::new(CycleCounter::new())).unwrap()
    }

    #[test]
    fn test_round_trip() {
        let bridge = make_bridge();
        let h = bridge.to_native(Some("viewport")).unwrap();
        assert_eq!(bridge.to_managed(h).unwrap().unwrap().as_ref(), "viewport");
        bridge.free(h).unwrap();
        assert!(matches!(
            bridge.to_managed(h),
            Err(HandleError::InvalidHandle { .. })
        ));
    }

    #[test]
    fn test_null_token_is_absent_string() {
        let bridge = make_bridge();
        assert_eq!(bridge.to_native(None).unwrap(), Handle::NULL);
        assert_eq!(bridge.to_managed(Handle::NULL), Ok(None));
    }

    #[test]
    fn test_canonical_empty_handle_is_stable() {
        let bridge = make_bridge();
        let h1 = bridge.to_native(Some("")).unwrap();
        let h2 = bridge.to_native(Some("")).unwrap();
        assert_eq!(h1, h2);
        assert_eq!(h1, bridge.empty_handle());

        // Freeing the canonical handle is a permanent no-op.
        bridge.free(h1).unwrap();
        bridge.free(h1).unwrap();
        let h3 = bridge.to_native(Some("")).unwrap();
        assert_eq!(h3, h1);
        assert_eq!(bridge.to_managed(h3).unwrap().unwrap().as_ref(), "");
    }

    #[test]
    fn test_weak_variant_empty_string_still_canonical() {
        let bridge = make_bridge();
        let h = bridge.to_native_weak("").unwrap();
        assert_eq!(h, bridge.empty_handle());
    }

    #[test]
    fn test_weak_string_token() {
        let bridge = make_bridge();
        let h = bridge.to_native_weak("transient").unwrap();
        assert_eq!(h.kind(), Some(crate::handle::HandleKind::Weak));
        assert_eq!(
            bridge.to_managed(h).unwrap().unwrap().as_ref(),
            "transient"
        );
    }

    #[test]
    fn test_distinct_strings_get_distinct_tokens() {
        let bridge = make_bridge();
        let a = bridge.to_native(Some("a")).unwrap();
        let b = bridge.to_native(Some("a")).unwrap();
        assert_ne!(a, b, "tokens are never reused or shared for non-empty strings");
    }
}
