//! Weaver core: a fixed bank of secret slots, each guarded by a failure
//! counter and a backoff timer, with crash-atomic journaling and a
//! capability gate for handle acquisition.
#![deny(missing_docs)]
#![forbid(unsafe_code)]

pub mod gate;
pub mod journal;
pub mod slot;
pub mod store;
pub mod timer;

pub use gate::Gatekeeper;
pub use journal::{FileJournal, Journal, JournalError, MemoryJournal, SlotRecord, StoreImage};
pub use slot::Slot;
pub use store::{SlotStore, StoreError};
pub use timer::{Clock, ElapsedTimer, ManualClock, SystemClock, TimerState};

pub use weaver_spec as spec;
