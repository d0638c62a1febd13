//! # Halite
//!
//! Client core for an end-to-end encrypted signaling protocol: an
//! *initiator* and a *responder* authenticate and key-agree through an
//! untrusted relay server to bootstrap a peer-to-peer session (typically
//! a WebRTC data channel). The relay forwards frames by a 1-byte address
//! and sees only ciphertext and routing metadata.
//!
//! - **Security**: NaCl box / secretbox authenticated encryption with a
//!   one-time auth token bootstrapping trust in the responder
//! - **Simplicity**: fixed cryptographic suite, no negotiation
//! - **Testability**: sans-I/O state machines driven one frame at a time
//!
//! ## Modules
//!
//! - [`core`]: constants, error types, and the transport trait
//! - [`crypto`]: cookies, combined sequence numbers, nonces, key material
//! - [`chunk`]: splitting and reassembly of bounded frames
//! - [`signaling`]: the initiator and responder state machines
//! - [`client`]: an async driver pumping a [`Transport`] through an engine
//!
//! ## Example
//!
//! ```no_run
//! use halite::prelude::*;
//!
//! # async fn run(transport: impl Transport + 'static) -> Result<(), ClientError> {
//! // The initiator mints its identity and the one-time auth token, then
//! // conveys the token and its public key through a side channel.
//! let permanent = KeyStore::generate();
//! let auth_token = AuthToken::generate();
//!
//! let (connection, handle, mut events) = ConnectionBuilder::new()
//!     .transport(transport) // connected to wss://<relay>/<path>
//!     .initiator(permanent, auth_token)
//!     .build()?;
//!
//! tokio::spawn(connection.run());
//! while let Some(event) = events.recv().await {
//!     if let ConnectionEvent::Connected { peer } = event {
//!         println!("secure channel up with {peer:#04x}");
//!         break;
//!     }
//! }
//! # drop(handle);
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod chunk;
pub mod client;
pub mod core;
pub mod crypto;
pub mod signaling;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::chunk::{Chunker, Dechunker};
    pub use crate::client::{ClientError, Connection, ConnectionBuilder, ConnectionEvent};
    pub use crate::core::{ChunkError, CloseCode, CryptoError, SignalingError, Transport};
    pub use crate::crypto::{AuthToken, KeyStore, PublicKey};
    pub use crate::signaling::{
        InitiatorSignaling, ResponderSignaling, Signaling, SignalingEvent, SignalingState,
    };
}

pub use crate::core::{ChunkError, CloseCode, CryptoError, SignalingError, Transport};
pub use crate::crypto::{AuthToken, KeyStore, PublicKey};
pub use crate::signaling::{
    InitiatorSignaling, ResponderSignaling, Signaling, SignalingState,
};
