//! Wire nonce construction and parsing.
//!
//! Every frame on the signaling channel starts with a 24-byte nonce:
//!
//! ```text
//! [ cookie (16) | source (1) | destination (1) | overflow (2 BE) | sequence (4 BE) ]
//! ```
//!
//! Parsing validates nothing beyond the length: authenticity comes from
//! AEAD decryption upstream. Until a frame decrypts, only the `source` and
//! `destination` fields may be trusted enough to pick a key.

use crate::core::{SignalingError, COOKIE_SIZE, NONCE_SIZE};

use super::cookie::Cookie;
use super::csn::SequencePair;

/// A 24-byte wire nonce.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Nonce {
    cookie: Cookie,
    source: u8,
    destination: u8,
    overflow: u16,
    sequence: u32,
}

impl Nonce {
    /// Construct a nonce for an outbound frame.
    pub fn new(cookie: Cookie, source: u8, destination: u8, csn: SequencePair) -> Self {
        Self {
            cookie,
            source,
            destination,
            overflow: csn.overflow,
            sequence: csn.sequence,
        }
    }

    /// Parse the nonce at the head of a frame.
    ///
    /// Fails only on insufficient length.
    pub fn parse(data: &[u8]) -> Result<Self, SignalingError> {
        if data.len() < NONCE_SIZE {
            return Err(SignalingError::BadMessageLength {
                expected: NONCE_SIZE,
                actual: data.len(),
            });
        }
        let mut bytes = [0u8; NONCE_SIZE];
        bytes.copy_from_slice(&data[..NONCE_SIZE]);
        Ok(Self::from_bytes(bytes))
    }

    /// Decode from exactly 24 bytes.
    pub fn from_bytes(bytes: [u8; NONCE_SIZE]) -> Self {
        let mut cookie = [0u8; COOKIE_SIZE];
        cookie.copy_from_slice(&bytes[0..16]);
        Self {
            cookie: Cookie::from_bytes(cookie),
            source: bytes[16],
            destination: bytes[17],
            overflow: u16::from_be_bytes([bytes[18], bytes[19]]),
            sequence: u32::from_be_bytes([bytes[20], bytes[21], bytes[22], bytes[23]]),
        }
    }

    /// Encode to the 24-byte wire layout.
    pub fn to_bytes(&self) -> [u8; NONCE_SIZE] {
        let mut bytes = [0u8; NONCE_SIZE];
        bytes[0..16].copy_from_slice(self.cookie.as_bytes());
        bytes[16] = self.source;
        bytes[17] = self.destination;
        bytes[18..20].copy_from_slice(&self.overflow.to_be_bytes());
        bytes[20..24].copy_from_slice(&self.sequence.to_be_bytes());
        bytes
    }

    /// The cookie field.
    pub fn cookie(&self) -> &Cookie {
        &self.cookie
    }

    /// The source address byte.
    pub fn source(&self) -> u8 {
        self.source
    }

    /// The destination address byte.
    pub fn destination(&self) -> u8 {
        self.destination
    }

    /// The `(overflow, sequence)` pair.
    pub fn csn(&self) -> SequencePair {
        SequencePair {
            overflow: self.overflow,
            sequence: self.sequence,
        }
    }
}
