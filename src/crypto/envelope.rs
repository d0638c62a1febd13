//! Frame envelopes.
//!
//! Every frame on the signaling channel is `nonce(24) ‖ bytes`, where the
//! bytes are ciphertext for all frames but the two unencrypted handshake
//! messages (`server-hello`, `client-hello`).

use crate::core::{SignalingError, NONCE_SIZE};

use super::nonce::Nonce;

/// A `(nonce, bytes)` envelope in wire order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    nonce: Nonce,
    bytes: Vec<u8>,
}

impl Envelope {
    /// Wrap a nonce and payload bytes.
    pub fn new(nonce: Nonce, bytes: Vec<u8>) -> Self {
        Self { nonce, bytes }
    }

    /// Split a raw frame into nonce and payload.
    ///
    /// Requires at least one payload byte after the nonce.
    pub fn from_slice(frame: &[u8]) -> Result<Self, SignalingError> {
        if frame.len() <= NONCE_SIZE {
            return Err(SignalingError::BadMessageLength {
                expected: NONCE_SIZE + 1,
                actual: frame.len(),
            });
        }
        Ok(Self {
            nonce: Nonce::parse(frame)?,
            bytes: frame[NONCE_SIZE..].to_vec(),
        })
    }

    /// The nonce at the head of the frame.
    pub fn nonce(&self) -> &Nonce {
        &self.nonce
    }

    /// The payload bytes after the nonce.
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Encode to wire order: `nonce ‖ bytes`.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut frame = Vec::with_capacity(NONCE_SIZE + self.bytes.len());
        frame.extend_from_slice(&self.nonce.to_bytes());
        frame.extend_from_slice(&self.bytes);
        frame
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::{Cookie, SequencePair};

    fn sample_nonce() -> Nonce {
        Nonce::new(
            Cookie::from_bytes([0x11; 16]),
            0x00,
            0x01,
            SequencePair {
                overflow: 0,
                sequence: 42,
            },
        )
    }

    #[test]
    fn test_roundtrip() {
        let envelope = Envelope::new(sample_nonce(), vec![1, 2, 3]);
        let parsed = Envelope::from_slice(&envelope.to_bytes()).unwrap();
        assert_eq!(parsed, envelope);
    }

    #[test]
    fn test_rejects_nonce_only_frame() {
        let frame = sample_nonce().to_bytes();
        assert!(matches!(
            Envelope::from_slice(&frame),
            Err(SignalingError::BadMessageLength { .. })
        ));
    }

    #[test]
    fn test_single_payload_byte_is_enough() {
        let mut frame = sample_nonce().to_bytes().to_vec();
        frame.push(0xff);
        let envelope = Envelope::from_slice(&frame).unwrap();
        assert_eq!(envelope.bytes(), &[0xff]);
    }
}
