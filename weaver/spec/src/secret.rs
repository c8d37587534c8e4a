//! Secret slot buffers.
//!
//! Neither type implements `PartialEq`: comparisons go through
//! [`ConstantTimeEq`] so no caller can accidentally short-circuit on a
//! secret byte.

use core::fmt;

use subtle::{Choice, ConditionallySelectable, ConstantTimeEq};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::{KEY_BYTES, VALUE_BYTES};

/// Key guarding a slot.
#[derive(Clone, Default, Zeroize, ZeroizeOnDrop)]
pub struct SlotKey([u8; KEY_BYTES]);

impl SlotKey {
    /// Wrap raw key bytes.
    pub fn new(bytes: [u8; KEY_BYTES]) -> Self {
        Self(bytes)
    }

    /// Parse a key from exactly `2 * KEY_BYTES` hex digits.
    ///
    /// # Errors
    ///
    /// Returns [`hex::FromHexError`] on bad digits or a wrong length.
    pub fn from_hex(digits: &str) -> Result<Self, hex::FromHexError> {
        let mut key = Self::default();
        hex::decode_to_slice(digits, &mut key.0)?;
        Ok(key)
    }

    /// Borrow the key bytes.
    pub fn as_bytes(&self) -> &[u8; KEY_BYTES] {
        &self.0
    }
}

impl ConstantTimeEq for SlotKey {
    fn ct_eq(&self, other: &Self) -> Choice {
        self.0[..].ct_eq(&other.0[..])
    }
}

impl fmt::Debug for SlotKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SlotKey(<redacted>)")
    }
}

/// Secret value stored in a slot, and the fixed-size payload of every read.
#[derive(Clone, Default, Zeroize, ZeroizeOnDrop)]
pub struct SlotValue([u8; VALUE_BYTES]);

impl SlotValue {
    /// Wrap raw value bytes.
    pub fn new(bytes: [u8; VALUE_BYTES]) -> Self {
        Self(bytes)
    }

    /// Parse a value from exactly `2 * VALUE_BYTES` hex digits.
    ///
    /// # Errors
    ///
    /// Returns [`hex::FromHexError`] on bad digits or a wrong length.
    pub fn from_hex(digits: &str) -> Result<Self, hex::FromHexError> {
        let mut value = Self::default();
        hex::decode_to_slice(digits, &mut value.0)?;
        Ok(value)
    }

    /// Borrow the value bytes.
    pub fn as_bytes(&self) -> &[u8; VALUE_BYTES] {
        &self.0
    }

    /// Byte-wise select: `a` where `choice` is 0, `b` where it is 1.
    ///
    /// Touches every byte of both inputs regardless of `choice`.
    #[must_use]
    pub fn select(a: &Self, b: &Self, choice: Choice) -> Self {
        let mut out = Self::default();
        for (dst, (x, y)) in out.0.iter_mut().zip(a.0.iter().zip(b.0.iter())) {
            *dst = u8::conditional_select(x, y, choice);
        }
        out
    }
}

impl ConstantTimeEq for SlotValue {
    fn ct_eq(&self, other: &Self) -> Choice {
        self.0[..].ct_eq(&other.0[..])
    }
}

impl fmt::Debug for SlotValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SlotValue(<redacted>)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_round_trip_and_length_check() {
        let key = SlotKey::from_hex("000102030405060708090a0b0c0d0e0f").unwrap();
        assert_eq!(key.as_bytes()[15], 0x0f);
        assert!(SlotKey::from_hex("0001").is_err());
        assert!(SlotValue::from_hex("zz0102030405060708090a0b0c0d0e0f").is_err());
    }

    #[test]
    fn debug_is_redacted() {
        let key = SlotKey::new([0xAB; KEY_BYTES]);
        let rendered = format!("{key:?}");
        assert!(!rendered.to_lowercase().contains("ab"));
        assert_eq!(format!("{:?}", SlotValue::default()), "SlotValue(<redacted>)");
    }

    #[test]
    fn constant_time_equality() {
        let a = SlotKey::new([7; KEY_BYTES]);
        let mut last_differs = [7; KEY_BYTES];
        last_differs[KEY_BYTES - 1] = 8;
        assert!(bool::from(a.ct_eq(&a.clone())));
        assert!(!bool::from(a.ct_eq(&SlotKey::new(last_differs))));
    }

    #[test]
    fn select_picks_by_choice() {
        let a = SlotValue::new([1; VALUE_BYTES]);
        let b = SlotValue::new([2; VALUE_BYTES]);
        assert_eq!(SlotValue::select(&a, &b, Choice::from(0)).as_bytes(), a.as_bytes());
        assert_eq!(SlotValue::select(&a, &b, Choice::from(1)).as_bytes(), b.as_bytes());
    }
}
