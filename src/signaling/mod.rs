//! Signaling state machines.
//!
//! Both roles run the same two-phase handshake through the relay:
//!
//! ```text
//! server handshake          peer handshake
//! ┌──────────────────┐      ┌──────────────────────────────┐
//! │ <- server-hello  │      │ responder -> token   (token) │
//! │ -> client-hello* │  ->  │ initiator -> key     (perm)  │
//! │ -> client-auth   │      │ responder -> key     (perm)  │
//! │ <- server-auth   │      │ initiator -> auth (session)  │
//! └──────────────────┘      │ responder -> auth (session)  │
//!   * responder only        └──────────────────────────────┘
//! ```
//!
//! The engines are sans-I/O ([`Signaling::step`]); the [`client`](crate::client)
//! module drives them over a real transport.

mod engine;
mod initiator;
mod messages;
mod peer;
mod responder;

pub use engine::{Signaling, SignalingEvent, StepOutput};
pub use initiator::InitiatorSignaling;
pub use messages::Message;
pub use peer::{InitiatorContext, InitiatorContextState, ResponderSlot, SlotState};
pub use responder::ResponderSignaling;

/// The two endpoint roles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Publishes the relay path and creates the auth token.
    Initiator,
    /// Joins the path carrying the auth token.
    Responder,
}

/// Coarse engine state visible to the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalingState {
    /// Nothing happened yet.
    New,
    /// A transport connection attempt is underway.
    Connecting,
    /// Authenticating toward the server.
    ServerHandshake,
    /// Authenticating toward the peer.
    PeerHandshake,
    /// Both handshakes complete; the secure channel is up.
    Open,
    /// Shutting down.
    Closing,
    /// Shut down.
    Closed,
}
