//! Responder-side signaling.
//!
//! The responder connects to the relay path derived from the initiator's
//! permanent public key, carrying the auth token it received through a
//! side channel. Its first message to the initiator (`token`) is the only
//! use of that token; everything after runs on permanent and then session
//! keys.

use tracing::{debug, info, warn};

use crate::core::{is_responder_address, SignalingError, INITIATOR_ADDRESS, SERVER_ADDRESS};
use crate::crypto::{AuthToken, Envelope, KeyStore, Nonce, PublicKey};

use super::engine::{
    Common, KeySelector, ServerHandshakeState, Signaling, SignalingEvent, StepOutput,
};
use super::messages::Message;
use super::peer::{InitiatorContext, InitiatorContextState};
use super::{Role, SignalingState};

/// The responder's signaling engine.
pub struct ResponderSignaling {
    common: Common,
    auth_token: AuthToken,
    initiator: InitiatorContext,
}

impl ResponderSignaling {
    /// Create a responder engine around its permanent keystore, the
    /// initiator's permanent public key, and the shared auth token.
    pub fn new(permanent: KeyStore, initiator_permanent: PublicKey, auth_token: AuthToken) -> Self {
        Self {
            common: Common::new(Role::Responder, permanent),
            auth_token,
            initiator: InitiatorContext::new(initiator_permanent),
        }
    }

    /// The relay path component: lowercase hex of the initiator's
    /// permanent public key.
    pub fn path(&self) -> String {
        hex::encode(self.initiator.permanent_pub.as_bytes())
    }

    fn abort(&mut self) {
        self.initiator.reset_session();
        self.initiator.connected = false;
        self.common.reset();
    }

    fn process(&mut self, frame: &[u8]) -> Result<StepOutput, SignalingError> {
        let envelope = Envelope::from_slice(frame)?;
        match self.common.state() {
            SignalingState::ServerHandshake => self.process_server_handshake(&envelope),
            SignalingState::PeerHandshake | SignalingState::Open => {
                self.common.check_destination(envelope.nonce())?;
                match envelope.nonce().source() {
                    SERVER_ADDRESS => self.process_server_message(&envelope),
                    INITIATOR_ADDRESS => self.process_peer_frame(&envelope),
                    source => Err(SignalingError::BadNonceSource(source)),
                }
            }
            state => Err(SignalingError::Protocol(format!(
                "frame received in state {state:?}"
            ))),
        }
    }

    fn process_server_handshake(
        &mut self,
        envelope: &Envelope,
    ) -> Result<StepOutput, SignalingError> {
        let mut out = StepOutput::default();
        let nonce = envelope.nonce().clone();
        if nonce.source() != SERVER_ADDRESS {
            return Err(SignalingError::BadNonceSource(nonce.source()));
        }
        match self.common.server_hs {
            ServerHandshakeState::AwaitingHello => {
                self.common.check_destination(&nonce)?;
                self.common.handle_server_hello(&nonce, envelope.bytes())?;
                // client-hello goes out unencrypted, then client-auth.
                let hello = Message::ClientHello {
                    key: self.common.permanent.public_key_bytes(),
                };
                out.frames.push(self.common.frame_to_server(&hello, false)?);
                out.frames.push(self.common.client_auth_frame()?);
                self.common.server_hs = ServerHandshakeState::AwaitingAuth;
            }
            ServerHandshakeState::AwaitingAuth => {
                let destination = nonce.destination();
                if !is_responder_address(destination) {
                    return Err(SignalingError::BadNonceDestination(destination));
                }
                let message = self.common.open(&KeySelector::Server, envelope)?;
                let Message::ServerAuth {
                    your_cookie,
                    initiator_connected,
                    ..
                } = message
                else {
                    return Err(SignalingError::BadMessageType(message.kind()));
                };
                self.common.verify_your_cookie(&your_cookie)?;
                // Adopt the slot the server assigned us.
                self.common.address = destination;
                self.initiator.connected = initiator_connected.unwrap_or(false);
                debug!(
                    address = destination,
                    initiator_connected = self.initiator.connected,
                    "server-auth received"
                );
                self.common.server_hs = ServerHandshakeState::Done;
                self.common.set_state(SignalingState::PeerHandshake);
                out.events.push(SignalingEvent::ServerHandshakeDone);
                if self.initiator.connected {
                    self.send_token(&mut out)?;
                }
            }
            ServerHandshakeState::Done => {
                return Err(SignalingError::Protocol(
                    "server handshake already complete".into(),
                ));
            }
        }
        Ok(out)
    }

    /// Announce our permanent key to the initiator under the auth token.
    fn send_token(&mut self, out: &mut StepOutput) -> Result<(), SignalingError> {
        let our_cookie = self.common.our_cookie()?;
        let csn = self.initiator.csn.next()?;
        let nonce = Nonce::new(our_cookie, self.common.address, INITIATOR_ADDRESS, csn);
        let message = Message::Token {
            key: self.common.permanent.public_key_bytes(),
        };
        out.frames
            .push(self.common.seal(&KeySelector::Token(&self.auth_token), nonce, &message)?);
        self.initiator.state = InitiatorContextState::TokenSent;
        debug!("token sent");
        Ok(())
    }

    fn process_server_message(
        &mut self,
        envelope: &Envelope,
    ) -> Result<StepOutput, SignalingError> {
        let mut out = StepOutput::default();
        let message = self.common.open(&KeySelector::Server, envelope)?;
        match message {
            Message::NewInitiator => {
                if self.common.state() == SignalingState::Open {
                    warn!("new-initiator after open, ignoring");
                } else {
                    debug!("initiator joined");
                    self.initiator.connected = true;
                    self.initiator.reset_session();
                    self.send_token(&mut out)?;
                }
            }
            Message::Disconnected { id } => {
                debug!(id, "peer disconnected");
                out.events.push(SignalingEvent::PeerDisconnected { id });
            }
            other => debug!(kind = other.kind(), "ignoring server message"),
        }
        Ok(out)
    }

    fn process_peer_frame(&mut self, envelope: &Envelope) -> Result<StepOutput, SignalingError> {
        if self.common.state() == SignalingState::Open {
            return self.process_peer_data(envelope);
        }
        match self.initiator.state {
            InitiatorContextState::TokenSent => self.handle_key(envelope),
            InitiatorContextState::KeySent => self.handle_auth(envelope),
            InitiatorContextState::New | InitiatorContextState::AuthReceived => Err(
                SignalingError::Protocol("unexpected initiator frame".into()),
            ),
        }
    }

    /// The initiator's `key` under permanent keys. Answer with a fresh
    /// session key of our own.
    fn handle_key(&mut self, envelope: &Envelope) -> Result<StepOutput, SignalingError> {
        let mut out = StepOutput::default();
        let message = self.common.open(
            &KeySelector::PeerPermanent(&self.initiator.permanent_pub),
            envelope,
        )?;
        let Message::Key { key } = message else {
            return Err(SignalingError::BadMessageType(message.kind()));
        };
        self.initiator.session_pub = Some(PublicKey::from(key));
        debug!("key received");

        let session = KeyStore::generate();
        let reply = Message::Key {
            key: session.public_key_bytes(),
        };
        let our_cookie = self.common.our_cookie()?;
        let csn = self.initiator.csn.next()?;
        let nonce = Nonce::new(our_cookie, self.common.address, INITIATOR_ADDRESS, csn);
        out.frames.push(self.common.seal(
            &KeySelector::PeerPermanent(&self.initiator.permanent_pub),
            nonce,
            &reply,
        )?);
        self.initiator.session = Some(session);
        self.initiator.state = InitiatorContextState::KeySent;
        Ok(out)
    }

    /// The initiator's `auth` under session keys. Answering it completes
    /// the peer handshake.
    fn handle_auth(&mut self, envelope: &Envelope) -> Result<StepOutput, SignalingError> {
        let mut out = StepOutput::default();
        let session = self
            .initiator
            .session
            .as_ref()
            .ok_or_else(|| SignalingError::Protocol("own session key missing".into()))?;
        let peer_session = self
            .initiator
            .session_pub
            .as_ref()
            .ok_or_else(|| SignalingError::Protocol("initiator session key missing".into()))?;
        let message = self.common.open(
            &KeySelector::PeerSession {
                own: session,
                peer: peer_session,
            },
            envelope,
        )?;
        let Message::Auth { your_cookie } = message else {
            return Err(SignalingError::BadMessageType(message.kind()));
        };
        self.common.verify_your_cookie(&your_cookie)?;
        let our_cookie = self.common.our_cookie()?;
        // A peer replaying our own cookie is a broken or hostile peer.
        if envelope.nonce().cookie() == &our_cookie {
            return Err(SignalingError::BadCookie);
        }

        let csn = self.initiator.csn.next()?;
        let nonce = Nonce::new(our_cookie, self.common.address, INITIATOR_ADDRESS, csn);
        let reply = Message::Auth {
            your_cookie: *envelope.nonce().cookie().as_bytes(),
        };
        out.frames.push(self.common.seal(
            &KeySelector::PeerSession {
                own: session,
                peer: peer_session,
            },
            nonce,
            &reply,
        )?);
        self.initiator.state = InitiatorContextState::AuthReceived;
        self.common.set_state(SignalingState::Open);
        info!("peer handshake complete");
        out.events.push(SignalingEvent::Connected {
            peer: INITIATOR_ADDRESS,
        });
        Ok(out)
    }

    /// Post-handshake frame from the initiator.
    fn process_peer_data(&mut self, envelope: &Envelope) -> Result<StepOutput, SignalingError> {
        let mut out = StepOutput::default();
        let session = self
            .initiator
            .session
            .as_ref()
            .ok_or_else(|| SignalingError::Protocol("own session key missing".into()))?;
        let peer_session = self
            .initiator
            .session_pub
            .as_ref()
            .ok_or_else(|| SignalingError::Protocol("initiator session key missing".into()))?;
        let payload = session.decrypt(envelope, peer_session)?;
        out.events.push(SignalingEvent::Data {
            source: INITIATOR_ADDRESS,
            payload,
        });
        Ok(out)
    }
}

impl Signaling for ResponderSignaling {
    fn state(&self) -> SignalingState {
        self.common.state()
    }

    fn connecting(&mut self) {
        self.common.set_state(SignalingState::Connecting);
    }

    fn begin(&mut self) -> Result<(), SignalingError> {
        match self.common.state() {
            SignalingState::New | SignalingState::Connecting => {
                self.common.set_state(SignalingState::ServerHandshake);
                Ok(())
            }
            state => Err(SignalingError::Protocol(format!(
                "cannot begin in state {state:?}"
            ))),
        }
    }

    fn step(&mut self, frame: &[u8]) -> Result<StepOutput, SignalingError> {
        match self.process(frame) {
            Ok(out) => Ok(out),
            Err(error) => {
                warn!(%error, "aborting connection");
                self.abort();
                Err(error)
            }
        }
    }

    fn seal_data(&mut self, payload: &[u8]) -> Result<Vec<u8>, SignalingError> {
        if self.common.state() != SignalingState::Open {
            return Err(SignalingError::Protocol("peer channel not open".into()));
        }
        let session = self
            .initiator
            .session
            .as_ref()
            .ok_or_else(|| SignalingError::Protocol("own session key missing".into()))?;
        let peer_session = self
            .initiator
            .session_pub
            .as_ref()
            .ok_or_else(|| SignalingError::Protocol("initiator session key missing".into()))?;
        let csn = self.initiator.csn.next()?;
        let nonce = Nonce::new(self.common.our_cookie()?, self.common.address, INITIATOR_ADDRESS, csn);
        Ok(session.encrypt(payload, nonce, peer_session)?.to_bytes())
    }

    fn close(&mut self) {
        if self.common.state() == SignalingState::Closed {
            return;
        }
        self.common.set_state(SignalingState::Closing);
        self.initiator.reset_session();
        self.initiator.connected = false;
        self.common.set_state(SignalingState::Closed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> ResponderSignaling {
        let initiator_key = KeyStore::generate();
        ResponderSignaling::new(
            KeyStore::generate(),
            initiator_key.public_key().clone(),
            AuthToken::generate(),
        )
    }

    #[test]
    fn test_initial_state() {
        assert_eq!(engine().state(), SignalingState::New);
    }

    #[test]
    fn test_path_derives_from_initiator_key() {
        let initiator_key = KeyStore::generate();
        let responder = ResponderSignaling::new(
            KeyStore::generate(),
            initiator_key.public_key().clone(),
            AuthToken::generate(),
        );
        assert_eq!(responder.path(), initiator_key.public_key_hex());
    }

    #[test]
    fn test_frame_in_new_state_is_fatal() {
        let mut engine = engine();
        assert!(engine.step(&[0u8; 32]).is_err());
        assert_eq!(engine.state(), SignalingState::New);
    }

    #[test]
    fn test_close_is_idempotent() {
        let mut engine = engine();
        engine.close();
        engine.close();
        assert_eq!(engine.state(), SignalingState::Closed);
    }
}
