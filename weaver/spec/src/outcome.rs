//! Read outcomes and the status codes handed to the dispatch layer.

use serde::{Deserialize, Serialize};
use subtle::Choice;

use crate::{SlotValue, BACKOFF_BYTES, VALUE_BYTES};

/// Result class of a slot read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadStatus {
    /// Key matched; the payload is the slot value.
    Success,
    /// Key did not match and no throttle is armed.
    WrongKey,
    /// Reads are refused; the payload carries the remaining seconds.
    BackedOff,
}

/// Response to a slot read.
///
/// The payload is always [`VALUE_BYTES`] long. For anything but
/// [`ReadStatus::Success`] it holds the remaining backoff as a big-endian
/// `u32` in its first [`BACKOFF_BYTES`] bytes, followed by zeroes.
#[derive(Debug, Clone)]
pub struct ReadOutcome {
    status: ReadStatus,
    payload: SlotValue,
}

impl ReadOutcome {
    /// Build a refusal carrying `remaining` seconds.
    pub fn backed_off(remaining: u32) -> Self {
        Self {
            status: ReadStatus::BackedOff,
            payload: encode_backoff(remaining),
        }
    }

    /// Build the response for a read that compared keys.
    ///
    /// `matched` selects between the stored value and the backoff encoding
    /// byte by byte, so both branches copy the same amount of data.
    pub fn from_comparison(matched: Choice, value: &SlotValue, remaining: u32) -> Self {
        let backoff = encode_backoff(remaining);
        let payload = SlotValue::select(&backoff, value, matched);
        let status = if bool::from(matched) {
            ReadStatus::Success
        } else if remaining > 0 {
            ReadStatus::BackedOff
        } else {
            ReadStatus::WrongKey
        };
        Self { status, payload }
    }

    /// Outcome class.
    pub fn status(&self) -> ReadStatus {
        self.status
    }

    /// Fixed-size response payload.
    pub fn payload(&self) -> &[u8; VALUE_BYTES] {
        self.payload.as_bytes()
    }

    /// The slot value, only for a successful read.
    pub fn value(&self) -> Option<&SlotValue> {
        match self.status {
            ReadStatus::Success => Some(&self.payload),
            ReadStatus::WrongKey | ReadStatus::BackedOff => None,
        }
    }

    /// Remaining backoff seconds, only for a refused read.
    pub fn remaining_backoff(&self) -> Option<u32> {
        match self.status {
            ReadStatus::BackedOff => Some(decode_backoff(&self.payload)),
            ReadStatus::Success | ReadStatus::WrongKey => None,
        }
    }

    /// Status code for the dispatch layer.
    pub fn to_status(&self) -> Status {
        match self.status {
            ReadStatus::Success => Status::Success,
            ReadStatus::WrongKey => Status::WrongKey,
            ReadStatus::BackedOff => Status::BackedOff {
                remaining_secs: decode_backoff(&self.payload),
            },
        }
    }
}

fn encode_backoff(remaining: u32) -> SlotValue {
    let mut bytes = [0u8; VALUE_BYTES];
    bytes[..BACKOFF_BYTES].copy_from_slice(&remaining.to_be_bytes());
    SlotValue::new(bytes)
}

fn decode_backoff(payload: &SlotValue) -> u32 {
    let mut bytes = [0u8; BACKOFF_BYTES];
    bytes.copy_from_slice(&payload.as_bytes()[..BACKOFF_BYTES]);
    u32::from_be_bytes(bytes)
}

/// Status codes exchanged with the command-dispatch layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Status {
    /// Operation completed.
    Success,
    /// Supplied key did not match.
    WrongKey,
    /// Slot is throttled.
    BackedOff {
        /// Seconds until the next read will be considered.
        remaining_secs: u32,
    },
    /// Slot id out of range.
    InvalidSlotId,
}

impl Status {
    /// One-byte wire code.
    pub fn code(self) -> u8 {
        match self {
            Status::Success => 0x00,
            Status::WrongKey => 0x01,
            Status::BackedOff { .. } => 0x02,
            Status::InvalidSlotId => 0x03,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_payload_encoding() {
        let outcome = ReadOutcome::backed_off(86_400);
        assert_eq!(outcome.status(), ReadStatus::BackedOff);
        assert_eq!(&outcome.payload()[..4], &86_400u32.to_be_bytes());
        assert!(outcome.payload()[4..].iter().all(|b| *b == 0));
        assert_eq!(outcome.remaining_backoff(), Some(86_400));
        assert!(outcome.value().is_none());
    }

    #[test]
    fn comparison_selects_value_only_on_match() {
        let value = SlotValue::new([0x5A; VALUE_BYTES]);

        let hit = ReadOutcome::from_comparison(Choice::from(1), &value, 0);
        assert_eq!(hit.status(), ReadStatus::Success);
        assert_eq!(hit.payload(), value.as_bytes());

        let miss = ReadOutcome::from_comparison(Choice::from(0), &value, 0);
        assert_eq!(miss.status(), ReadStatus::WrongKey);
        assert_eq!(miss.payload(), &[0u8; VALUE_BYTES]);

        let throttled = ReadOutcome::from_comparison(Choice::from(0), &value, 30);
        assert_eq!(throttled.to_status(), Status::BackedOff { remaining_secs: 30 });
        assert!(throttled.payload().iter().all(|b| *b != 0x5A));
    }

    #[test]
    fn status_codes_are_distinct() {
        let codes = [
            Status::Success.code(),
            Status::WrongKey.code(),
            Status::BackedOff { remaining_secs: 1 }.code(),
            Status::InvalidSlotId.code(),
        ];
        for (i, a) in codes.iter().enumerate() {
            for b in &codes[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }
}
