//! Error types for the signaling protocol.

use thiserror::Error;

/// Errors from the chunking sublayer.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ChunkError {
    /// Invalid construction argument.
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),

    /// Chunk carries an unknown flag byte.
    #[error("invalid chunk flag: {0:#04x}")]
    InvalidChunk(u8),

    /// A chunk arrived after the terminal chunk.
    #[error("message already complete")]
    AlreadyComplete,

    /// The terminal chunk has not arrived yet.
    #[error("message not yet complete")]
    NotComplete,
}

/// Errors in the crypto layer.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CryptoError {
    /// AEAD encryption failed.
    #[error("encryption failed")]
    EncryptionFailed,

    /// AEAD decryption failed (invalid tag, wrong key, or corrupted frame).
    #[error("decryption failed")]
    DecryptionFailed,

    /// Combined sequence number space exhausted - connection must terminate.
    #[error("combined sequence number space exhausted")]
    OverflowExhausted,
}

/// Errors in the signaling state machine.
///
/// Every variant is fatal to the current connection: the engine resets to
/// its initial state and the driver tears the transport down.
#[derive(Debug, Error)]
pub enum SignalingError {
    /// Frame too short to carry a nonce and a payload.
    #[error("message too short: {actual} bytes (minimum {expected})")]
    BadMessageLength {
        /// Minimum acceptable length.
        expected: usize,
        /// Actual frame length.
        actual: usize,
    },

    /// A well-formed message of the wrong type for the current state.
    #[error("unexpected message type: {0}")]
    BadMessageType(&'static str),

    /// Structured decode failure.
    #[error("malformed message: {0}")]
    BadMessage(String),

    /// `your_cookie` does not bind to the cookie we sent, or a peer echoed
    /// our own cookie back as theirs.
    #[error("cookie mismatch")]
    BadCookie,

    /// Nonce source byte invalid for the current role and state.
    #[error("invalid nonce source: {0:#04x}")]
    BadNonceSource(u8),

    /// Nonce destination does not match our assigned address.
    #[error("invalid nonce destination: {0:#04x}")]
    BadNonceDestination(u8),

    /// Outbound receiver address that this role may not address.
    #[error("invalid receiver address: {0:#04x}")]
    BadReceiver(u8),

    /// Crypto layer failure.
    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),

    /// Any other protocol violation.
    #[error("protocol violation: {0}")]
    Protocol(String),
}

/// Errors at the transport seam.
#[derive(Debug, Error)]
pub enum TransportError {
    /// I/O failure.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// The underlying channel is gone.
    #[error("transport closed")]
    Closed,

    /// Any other transport failure.
    #[error("transport failure: {0}")]
    Other(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = SignalingError::BadMessageLength {
            expected: 25,
            actual: 3,
        };
        assert_eq!(err.to_string(), "message too short: 3 bytes (minimum 25)");

        let err = SignalingError::from(CryptoError::DecryptionFailed);
        assert_eq!(err.to_string(), "crypto error: decryption failed");

        assert_eq!(
            ChunkError::InvalidChunk(0x7f).to_string(),
            "invalid chunk flag: 0x7f"
        );
    }
}
