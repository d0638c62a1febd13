//! Wire message schemas.
//!
//! Messages are MessagePack maps with a `"type"` string discriminator,
//! e.g. `{"type": "server-hello", "key": <32 bytes>}`. Fixed-size byte
//! fields travel as MessagePack byte strings.
//!
//! Unrecognized types decode to [`Message::Unknown`] so the engine can
//! ignore unexpected server messages instead of failing the handshake.

use serde::{Deserialize, Serialize};

use crate::core::SignalingError;

/// A signaling message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Message {
    /// First message on the channel; announces the server's session key.
    ServerHello {
        /// The server's public session key.
        #[serde(with = "serde_bytes")]
        key: [u8; 32],
    },
    /// Responder's unencrypted key announcement to the server.
    ClientHello {
        /// The responder's permanent public key.
        #[serde(with = "serde_bytes")]
        key: [u8; 32],
    },
    /// Client authentication toward the server.
    ClientAuth {
        /// The cookie the server announced in `server-hello`.
        #[serde(with = "serde_bytes")]
        your_cookie: [u8; 16],
    },
    /// Server authentication; completes the server handshake.
    ServerAuth {
        /// The cookie we announced in `client-auth`.
        #[serde(with = "serde_bytes")]
        your_cookie: [u8; 16],
        /// Responder slots already connected (initiator only).
        #[serde(default, skip_serializing_if = "Option::is_none")]
        responders: Option<Vec<u8>>,
        /// Whether the initiator is connected (responder only).
        #[serde(default, skip_serializing_if = "Option::is_none")]
        initiator_connected: Option<bool>,
    },
    /// A responder joined the path (server to initiator).
    NewResponder {
        /// The assigned responder slot.
        id: u8,
    },
    /// The initiator joined the path (server to responder).
    NewInitiator,
    /// Ask the server to drop a responder, or learn that one was dropped.
    DropResponder {
        /// The responder slot to drop.
        id: u8,
    },
    /// A peer left the path (server to client).
    Disconnected {
        /// The address that disconnected.
        id: u8,
    },
    /// Responder's first message to the initiator, under the auth token.
    Token {
        /// The responder's permanent public key.
        #[serde(with = "serde_bytes")]
        key: [u8; 32],
    },
    /// Session key announcement between the peers.
    Key {
        /// The sender's public session key.
        #[serde(with = "serde_bytes")]
        key: [u8; 32],
    },
    /// Peer authentication; completes the peer handshake.
    Auth {
        /// The cookie the sender saw in our nonces.
        #[serde(with = "serde_bytes")]
        your_cookie: [u8; 16],
    },
    /// Any message type this client does not know.
    #[serde(other)]
    Unknown,
}

impl Message {
    /// Serialize to a MessagePack map.
    pub fn to_vec(&self) -> Result<Vec<u8>, SignalingError> {
        rmp_serde::to_vec_named(self).map_err(|e| SignalingError::BadMessage(e.to_string()))
    }

    /// Deserialize from a MessagePack map.
    pub fn from_slice(data: &[u8]) -> Result<Self, SignalingError> {
        rmp_serde::from_slice(data).map_err(|e| SignalingError::BadMessage(e.to_string()))
    }

    /// The wire name of this message's type.
    pub fn kind(&self) -> &'static str {
        match self {
            Message::ServerHello { .. } => "server-hello",
            Message::ClientHello { .. } => "client-hello",
            Message::ClientAuth { .. } => "client-auth",
            Message::ServerAuth { .. } => "server-auth",
            Message::NewResponder { .. } => "new-responder",
            Message::NewInitiator => "new-initiator",
            Message::DropResponder { .. } => "drop-responder",
            Message::Disconnected { .. } => "disconnected",
            Message::Token { .. } => "token",
            Message::Key { .. } => "key",
            Message::Auth { .. } => "auth",
            Message::Unknown => "unknown",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(message: Message) -> Message {
        Message::from_slice(&message.to_vec().unwrap()).unwrap()
    }

    #[test]
    fn test_roundtrip_all_types() {
        let messages = [
            Message::ServerHello { key: [0x01; 32] },
            Message::ClientHello { key: [0x02; 32] },
            Message::ClientAuth {
                your_cookie: [0x03; 16],
            },
            Message::ServerAuth {
                your_cookie: [0x04; 16],
                responders: Some(vec![0x02, 0x03]),
                initiator_connected: None,
            },
            Message::ServerAuth {
                your_cookie: [0x04; 16],
                responders: None,
                initiator_connected: Some(true),
            },
            Message::NewResponder { id: 0x07 },
            Message::NewInitiator,
            Message::DropResponder { id: 0x03 },
            Message::Disconnected { id: 0x01 },
            Message::Token { key: [0x05; 32] },
            Message::Key { key: [0x06; 32] },
            Message::Auth {
                your_cookie: [0x07; 16],
            },
        ];
        for message in messages {
            assert_eq!(roundtrip(message.clone()), message);
        }
    }

    #[test]
    fn test_type_discriminator_on_wire() {
        let bytes = Message::NewInitiator.to_vec().unwrap();
        // A one-entry map: {"type": "new-initiator"}.
        assert_eq!(bytes[0], 0x81);
        assert!(bytes.windows(4).any(|window| window == &b"type"[..]));
        assert!(bytes
            .windows(13)
            .any(|window| window == &b"new-initiator"[..]));
    }

    #[test]
    fn test_unknown_type_is_tolerated() {
        // {"type": "ping"} hand-encoded.
        let mut bytes = vec![0x81, 0xa4];
        bytes.extend_from_slice(b"type");
        bytes.push(0xa4);
        bytes.extend_from_slice(b"ping");
        assert_eq!(Message::from_slice(&bytes).unwrap(), Message::Unknown);
    }

    #[test]
    fn test_truncated_message_fails() {
        let bytes = Message::ServerHello { key: [0x01; 32] }.to_vec().unwrap();
        assert!(matches!(
            Message::from_slice(&bytes[..bytes.len() - 4]),
            Err(SignalingError::BadMessage(_))
        ));
    }

    #[test]
    fn test_wrong_key_length_fails() {
        // {"type": "token", "key": <4 bytes>}
        let mut bytes = vec![0x82, 0xa4];
        bytes.extend_from_slice(b"type");
        bytes.push(0xa5);
        bytes.extend_from_slice(b"token");
        bytes.push(0xa3);
        bytes.extend_from_slice(b"key");
        bytes.extend_from_slice(&[0xc4, 0x04, 1, 2, 3, 4]);
        assert!(matches!(
            Message::from_slice(&bytes),
            Err(SignalingError::BadMessage(_))
        ));
    }
}
