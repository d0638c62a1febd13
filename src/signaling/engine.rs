//! Shared signaling engine plumbing.
//!
//! The engine is sans-I/O: the driver feeds one inbound transport frame
//! into [`Signaling::step`] and gets back the frames to send plus the
//! events to surface. All suspension points live in the driver; the state
//! machines here are plain synchronous code, which keeps them directly
//! unit-testable without a transport.

use tracing::debug;

use crate::core::{SignalingError, SERVER_ADDRESS, UNASSIGNED_ADDRESS};
use crate::crypto::{
    AuthToken, CombinedSequence, Cookie, CookiePair, Envelope, KeyStore, Nonce, PublicKey,
};

use super::messages::Message;
use super::{Role, SignalingState};

/// Events surfaced by the engine alongside outbound frames.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignalingEvent {
    /// The server handshake finished; the peer handshake is underway.
    ServerHandshakeDone,
    /// The peer handshake finished; the secure channel is up.
    Connected {
        /// Address of the authenticated peer.
        peer: u8,
    },
    /// Decrypted post-handshake payload from the authenticated peer.
    Data {
        /// Address the payload came from.
        source: u8,
        /// The decrypted bytes; dispatch is the host's concern.
        payload: Vec<u8>,
    },
    /// The server reported a peer as gone.
    PeerDisconnected {
        /// Address that disconnected.
        id: u8,
    },
}

/// Result of one engine step: frames to transmit, events to surface.
#[derive(Debug, Default)]
pub struct StepOutput {
    /// Outbound frames, in transmit order.
    pub frames: Vec<Vec<u8>>,
    /// Events for the host.
    pub events: Vec<SignalingEvent>,
}

/// A role-agnostic signaling engine.
///
/// Implemented by [`InitiatorSignaling`](super::InitiatorSignaling) and
/// [`ResponderSignaling`](super::ResponderSignaling). Exactly one owner
/// drives the engine; messages are processed strictly in receive order.
pub trait Signaling: Send {
    /// Coarse engine state.
    fn state(&self) -> SignalingState;

    /// Note that a transport connection attempt has started.
    fn connecting(&mut self);

    /// Note that the transport is open. The server speaks first, so this
    /// produces no frames.
    fn begin(&mut self) -> Result<(), SignalingError>;

    /// Process one inbound transport frame.
    ///
    /// On error the engine has already reset itself to its initial state;
    /// the driver is expected to tear the transport down and notify the
    /// host. Nothing is retried internally.
    fn step(&mut self, frame: &[u8]) -> Result<StepOutput, SignalingError>;

    /// Seal an application payload for the authenticated peer.
    ///
    /// Only valid once the engine is [`Open`](SignalingState::Open); the
    /// payload encoding is the host's concern.
    fn seal_data(&mut self, payload: &[u8]) -> Result<Vec<u8>, SignalingError>;

    /// Shut the engine down. Idempotent; drops all per-connection key
    /// material and peer records.
    fn close(&mut self);
}

/// Key material selection for one frame, per the protocol's key matrix.
#[derive(Debug)]
pub(crate) enum KeySelector<'a> {
    /// No encryption (the responder's `client-hello` only).
    Plain,
    /// Own permanent key against the server's session key.
    Server,
    /// The shared auth token (secret box).
    Token(&'a AuthToken),
    /// Own permanent key against a peer's permanent key.
    PeerPermanent(&'a PublicKey),
    /// A session keystore against a peer's session key.
    PeerSession {
        own: &'a KeyStore,
        peer: &'a PublicKey,
    },
}

/// Server handshake progress, identical for both roles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ServerHandshakeState {
    /// Waiting for `server-hello`.
    AwaitingHello,
    /// `client-auth` sent, waiting for `server-auth`.
    AwaitingAuth,
    /// Server handshake complete.
    Done,
}

/// State shared by both roles.
#[derive(Debug)]
pub(crate) struct Common {
    role: Role,
    state: SignalingState,
    /// Our address: `0x00` until assigned (the initiator pre-sets `0x01`
    /// before `server-auth`, the responder adopts its slot from it).
    pub(crate) address: u8,
    pub(crate) permanent: KeyStore,
    pub(crate) server_pub: Option<PublicKey>,
    pub(crate) cookie_pair: Option<CookiePair>,
    pub(crate) server_csn: CombinedSequence,
    pub(crate) server_hs: ServerHandshakeState,
}

impl Common {
    pub(crate) fn new(role: Role, permanent: KeyStore) -> Self {
        Self {
            role,
            state: SignalingState::New,
            address: UNASSIGNED_ADDRESS,
            permanent,
            server_pub: None,
            cookie_pair: None,
            server_csn: CombinedSequence::random(),
            server_hs: ServerHandshakeState::AwaitingHello,
        }
    }

    pub(crate) fn state(&self) -> SignalingState {
        self.state
    }

    pub(crate) fn set_state(&mut self, state: SignalingState) {
        if self.state != state {
            debug!(role = ?self.role, from = ?self.state, to = ?state, "signaling state");
            self.state = state;
        }
    }

    /// Drop everything learned on this connection and return to `New`.
    pub(crate) fn reset(&mut self) {
        self.set_state(SignalingState::New);
        self.address = UNASSIGNED_ADDRESS;
        self.server_pub = None;
        self.cookie_pair = None;
        self.server_csn = CombinedSequence::random();
        self.server_hs = ServerHandshakeState::AwaitingHello;
    }

    /// The cookie we stamp into outbound nonces.
    pub(crate) fn our_cookie(&self) -> Result<Cookie, SignalingError> {
        self.cookie_pair
            .as_ref()
            .map(|pair| pair.ours)
            .ok_or_else(|| SignalingError::Protocol("cookie pair not established".into()))
    }

    /// Process `server-hello`: learn the server key, fix the cookie pair.
    pub(crate) fn handle_server_hello(
        &mut self,
        nonce: &Nonce,
        payload: &[u8],
    ) -> Result<(), SignalingError> {
        let message = Message::from_slice(payload)?;
        let Message::ServerHello { key } = message else {
            return Err(SignalingError::BadMessageType(message.kind()));
        };
        self.server_pub = Some(PublicKey::from(key));
        self.cookie_pair = Some(CookiePair::from_theirs(*nonce.cookie()));
        debug!("server-hello received");
        Ok(())
    }

    /// Build this role's `client-auth` frame.
    pub(crate) fn client_auth_frame(&mut self) -> Result<Vec<u8>, SignalingError> {
        let theirs = self
            .cookie_pair
            .as_ref()
            .map(|pair| pair.theirs)
            .ok_or_else(|| SignalingError::Protocol("cookie pair not established".into()))?;
        let message = Message::ClientAuth {
            your_cookie: *theirs.as_bytes(),
        };
        self.frame_to_server(&message, true)
    }

    /// Check `your_cookie` from an auth message against our cookie.
    pub(crate) fn verify_your_cookie(&self, your_cookie: &[u8; 16]) -> Result<(), SignalingError> {
        if your_cookie != self.our_cookie()?.as_bytes() {
            return Err(SignalingError::BadCookie);
        }
        Ok(())
    }

    /// Reject inbound frames that are not addressed to us.
    pub(crate) fn check_destination(&self, nonce: &Nonce) -> Result<(), SignalingError> {
        if nonce.destination() != self.address {
            return Err(SignalingError::BadNonceDestination(nonce.destination()));
        }
        Ok(())
    }

    /// Assemble a frame to the server, advancing the server counter.
    pub(crate) fn frame_to_server(
        &mut self,
        message: &Message,
        encrypted: bool,
    ) -> Result<Vec<u8>, SignalingError> {
        let csn = self.server_csn.next()?;
        let nonce = Nonce::new(self.our_cookie()?, self.address, SERVER_ADDRESS, csn);
        let selector = if encrypted {
            KeySelector::Server
        } else {
            KeySelector::Plain
        };
        self.seal(&selector, nonce, message)
    }

    /// Serialize and seal a message under the selected key.
    pub(crate) fn seal(
        &self,
        selector: &KeySelector<'_>,
        nonce: Nonce,
        message: &Message,
    ) -> Result<Vec<u8>, SignalingError> {
        let payload = message.to_vec()?;
        let frame = match selector {
            KeySelector::Plain => Envelope::new(nonce, payload).to_bytes(),
            KeySelector::Server => {
                let server_pub = self.server_pub()?;
                self.permanent.encrypt(&payload, nonce, &server_pub)?.to_bytes()
            }
            KeySelector::Token(token) => token.encrypt(&payload, nonce)?.to_bytes(),
            KeySelector::PeerPermanent(peer) => {
                self.permanent.encrypt(&payload, nonce, peer)?.to_bytes()
            }
            KeySelector::PeerSession { own, peer } => {
                own.encrypt(&payload, nonce, peer)?.to_bytes()
            }
        };
        Ok(frame)
    }

    /// Open an envelope under the selected key and decode the message.
    pub(crate) fn open(
        &self,
        selector: &KeySelector<'_>,
        envelope: &Envelope,
    ) -> Result<Message, SignalingError> {
        let plaintext = match selector {
            KeySelector::Plain => envelope.bytes().to_vec(),
            KeySelector::Server => {
                let server_pub = self.server_pub()?;
                self.permanent.decrypt(envelope, &server_pub)?
            }
            KeySelector::Token(token) => token.decrypt(envelope)?,
            KeySelector::PeerPermanent(peer) => self.permanent.decrypt(envelope, peer)?,
            KeySelector::PeerSession { own, peer } => own.decrypt(envelope, peer)?,
        };
        Message::from_slice(&plaintext)
    }

    fn server_pub(&self) -> Result<PublicKey, SignalingError> {
        self.server_pub
            .clone()
            .ok_or_else(|| SignalingError::Protocol("server key not yet known".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reset_forgets_connection_state() {
        let mut common = Common::new(Role::Initiator, KeyStore::generate());
        common.set_state(SignalingState::PeerHandshake);
        common.address = 0x01;
        common.server_pub = Some(KeyStore::generate().public_key().clone());
        common.cookie_pair = Some(CookiePair::from_theirs(Cookie::random()));
        common.server_hs = ServerHandshakeState::Done;

        common.reset();
        assert_eq!(common.state(), SignalingState::New);
        assert_eq!(common.address, UNASSIGNED_ADDRESS);
        assert!(common.server_pub.is_none());
        assert!(common.cookie_pair.is_none());
        assert_eq!(common.server_hs, ServerHandshakeState::AwaitingHello);
    }

    #[test]
    fn test_frame_to_server_requires_cookie_pair() {
        let mut common = Common::new(Role::Responder, KeyStore::generate());
        let message = Message::NewInitiator;
        assert!(matches!(
            common.frame_to_server(&message, false),
            Err(SignalingError::Protocol(_))
        ));
    }

    #[test]
    fn test_plain_frame_layout() {
        let mut common = Common::new(Role::Responder, KeyStore::generate());
        common.cookie_pair = Some(CookiePair::from_theirs(Cookie::random()));

        let message = Message::ClientHello {
            key: common.permanent.public_key_bytes(),
        };
        let frame = common.frame_to_server(&message, false).unwrap();

        let envelope = Envelope::from_slice(&frame).unwrap();
        assert_eq!(envelope.nonce().source(), UNASSIGNED_ADDRESS);
        assert_eq!(envelope.nonce().destination(), SERVER_ADDRESS);
        assert_eq!(Message::from_slice(envelope.bytes()).unwrap(), message);
    }
}
