//! Caller identities used by the capability gate.

use alloc::vec::Vec;
use core::fmt;

use subtle::{Choice, ConstantTimeEq};

/// Upper bound on an identity, sized like a smart-card applet identifier.
pub const MAX_CALLER_ID_BYTES: usize = 16;

/// Identity presented by a client asking for a store handle.
#[derive(Clone)]
pub struct CallerId(Vec<u8>);

/// Rejected caller identity.
#[derive(Debug, Clone, PartialEq)]
pub enum CallerIdError {
    /// Zero bytes, or more than [`MAX_CALLER_ID_BYTES`].
    Length(usize),
    /// Not valid hex.
    Hex(hex::FromHexError),
}

impl fmt::Display for CallerIdError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallerIdError::Length(len) => write!(
                f,
                "caller id must be 1..={MAX_CALLER_ID_BYTES} bytes, got {len}"
            ),
            CallerIdError::Hex(err) => write!(f, "caller id is not hex: {err}"),
        }
    }
}

impl CallerId {
    /// Build an identity from raw bytes.
    ///
    /// # Errors
    ///
    /// [`CallerIdError::Length`] when empty or longer than
    /// [`MAX_CALLER_ID_BYTES`].
    pub fn new(bytes: impl Into<Vec<u8>>) -> Result<Self, CallerIdError> {
        let bytes = bytes.into();
        if bytes.is_empty() || bytes.len() > MAX_CALLER_ID_BYTES {
            return Err(CallerIdError::Length(bytes.len()));
        }
        Ok(Self(bytes))
    }

    /// Parse an identity from hex digits.
    ///
    /// # Errors
    ///
    /// [`CallerIdError::Hex`] on malformed input, or a length error.
    pub fn from_hex(digits: &str) -> Result<Self, CallerIdError> {
        let bytes = hex::decode(digits.trim()).map_err(CallerIdError::Hex)?;
        Self::new(bytes)
    }

    /// Borrow the identity bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

/// Length is compared first (identities are not secret in length), then
/// every byte.
impl ConstantTimeEq for CallerId {
    fn ct_eq(&self, other: &Self) -> Choice {
        self.0.as_slice().ct_eq(other.0.as_slice())
    }
}

impl fmt::Debug for CallerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CallerId({})", hex::encode(&self.0))
    }
}

impl fmt::Display for CallerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(&self.0))
    }
}
