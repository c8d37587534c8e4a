//! Capability gate in front of the store.
//!
//! The identity check runs once, when a caller asks for a handle. Holding
//! the returned `Arc` is the capability; operations are not re-checked.

use std::sync::Arc;

use subtle::ConstantTimeEq;
use tracing::{debug, warn};
use weaver_spec::CallerId;

use crate::store::SlotStore;

/// Hands out the store only to the configured caller.
#[derive(Debug)]
pub struct Gatekeeper {
    store: Arc<SlotStore>,
    authorized: CallerId,
}

impl Gatekeeper {
    /// Guard `store`, admitting only `authorized`.
    pub fn new(store: Arc<SlotStore>, authorized: CallerId) -> Self {
        Self { store, authorized }
    }

    /// Handle for `caller`, or `None` if it is not the authorized identity.
    pub fn acquire(&self, caller: &CallerId) -> Option<Arc<SlotStore>> {
        if bool::from(self.authorized.ct_eq(caller)) {
            debug!(%caller, "store handle granted");
            Some(self.store.clone())
        } else {
            warn!(%caller, "store handle refused");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timer::SystemClock;

    fn gate() -> Gatekeeper {
        let store = Arc::new(SlotStore::in_memory(Arc::new(SystemClock)));
        Gatekeeper::new(store, CallerId::from_hex("a00000006200").unwrap())
    }

    #[test]
    fn authorized_caller_gets_shared_handle() {
        let gate = gate();
        let id = CallerId::from_hex("A00000006200").unwrap();
        let first = gate.acquire(&id).unwrap();
        let second = gate.acquire(&id).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.slot_count(), weaver_spec::SLOT_COUNT);
    }

    #[test]
    fn other_callers_get_nothing() {
        let gate = gate();
        for hex in ["a00000006201", "a000000062", "a0000000620000"] {
            assert!(gate.acquire(&CallerId::from_hex(hex).unwrap()).is_none());
        }
    }
}
