//! Core traits and transport-facing types.
//!
//! The signaling engine itself is sans-I/O; the [`Transport`] trait is the
//! seam through which the client driver moves frames. Any WebSocket-like
//! channel that preserves frame boundaries (one send = one receive) can
//! implement it.

use async_trait::async_trait;

use super::error::TransportError;

/// Close codes used on the signaling channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseCode {
    /// 1001: endpoint is going away.
    GoingAway,
    /// 1002: sub-protocol negotiation failed.
    SubprotocolError,
    /// 3000: the relay path is full.
    PathFull,
    /// 3001: protocol error.
    ProtocolError,
    /// 3002: internal error.
    InternalError,
    /// 3003: connection handed over to a data channel.
    Handover,
    /// 3004: dropped by the initiator.
    Dropped,
    /// Any other close code.
    Other(u16),
}

impl CloseCode {
    /// Numeric wire value.
    pub fn as_u16(self) -> u16 {
        match self {
            CloseCode::GoingAway => 1001,
            CloseCode::SubprotocolError => 1002,
            CloseCode::PathFull => 3000,
            CloseCode::ProtocolError => 3001,
            CloseCode::InternalError => 3002,
            CloseCode::Handover => 3003,
            CloseCode::Dropped => 3004,
            CloseCode::Other(code) => code,
        }
    }

    /// Parse a numeric close code.
    pub fn from_u16(code: u16) -> Self {
        match code {
            1001 => CloseCode::GoingAway,
            1002 => CloseCode::SubprotocolError,
            3000 => CloseCode::PathFull,
            3001 => CloseCode::ProtocolError,
            3002 => CloseCode::InternalError,
            3003 => CloseCode::Handover,
            3004 => CloseCode::Dropped,
            other => CloseCode::Other(other),
        }
    }
}

impl std::fmt::Display for CloseCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            CloseCode::GoingAway => "going away",
            CloseCode::SubprotocolError => "sub-protocol error",
            CloseCode::PathFull => "path full",
            CloseCode::ProtocolError => "protocol error",
            CloseCode::InternalError => "internal error",
            CloseCode::Handover => "handover",
            CloseCode::Dropped => "dropped",
            CloseCode::Other(_) => "unknown",
        };
        write!(f, "{} ({})", name, self.as_u16())
    }
}

/// A bidirectional binary frame channel to the relay server.
///
/// # Requirements
///
/// - Frame boundaries MUST be preserved: one `send` arrives as one `recv`.
/// - `recv` MUST return `Ok(None)` once the remote end has closed.
/// - The sub-protocol identifier ([`SUBPROTOCOL`](super::SUBPROTOCOL)) is
///   negotiated by the implementation, out-of-band from this trait.
#[async_trait]
pub trait Transport: Send {
    /// Send one binary frame.
    async fn send(&mut self, frame: Vec<u8>) -> Result<(), TransportError>;

    /// Receive the next binary frame, or `None` if the channel closed.
    async fn recv(&mut self) -> Result<Option<Vec<u8>>, TransportError>;

    /// Close the channel with the given code.
    async fn close(&mut self, code: CloseCode) -> Result<(), TransportError>;
}
