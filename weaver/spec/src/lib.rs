//! # Weaver spec
//!
//! Fixed-size domain types shared by the Weaver slot store and its hosts:
//! slot geometry, secret key/value buffers, read outcomes, status codes,
//! caller identities, and the brute-force backoff policy.
//!
//! Everything here is allocation-free except [`CallerId`] parsing, and
//! compiles without `std` so it can sit next to a secure-element runtime.

#![cfg_attr(not(test), no_std)]
#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]

extern crate alloc;

pub mod backoff;
mod caller;
mod outcome;
mod secret;

pub use backoff::throttle_seconds;
pub use caller::{CallerId, CallerIdError, MAX_CALLER_ID_BYTES};
pub use outcome::{ReadOutcome, ReadStatus, Status};
pub use secret::{SlotKey, SlotValue};

/// Number of slots in a store. Fixed for the lifetime of the store.
pub const SLOT_COUNT: usize = 64;

/// Length of every slot key in bytes.
pub const KEY_BYTES: usize = 16;

/// Length of every slot value in bytes. Every read response carries exactly
/// this many payload bytes, whatever the outcome.
pub const VALUE_BYTES: usize = 16;

/// Payload bytes used to carry a remaining-backoff value (big-endian `u32`).
pub const BACKOFF_BYTES: usize = 4;

const _: () = assert!(BACKOFF_BYTES <= VALUE_BYTES);
