//! Initiator-side signaling.
//!
//! The initiator publishes a relay path keyed by its permanent public key
//! and hands the auth token to the responder through a side channel. Any
//! number of responders may then try the handshake concurrently; the
//! first one to complete `token` / `key` / `auth` is elected and every
//! other candidate is dropped at the server.

use std::collections::BTreeMap;

use tracing::{debug, info, warn};

use crate::core::{is_responder_address, SignalingError, INITIATOR_ADDRESS, SERVER_ADDRESS};
use crate::crypto::{AuthToken, Envelope, KeyStore, Nonce, PublicKey};

use super::engine::{
    Common, KeySelector, ServerHandshakeState, Signaling, SignalingEvent, StepOutput,
};
use super::messages::Message;
use super::peer::{ResponderSlot, SlotState};
use super::{Role, SignalingState};

/// The initiator's signaling engine.
pub struct InitiatorSignaling {
    common: Common,
    auth_token: AuthToken,
    slots: BTreeMap<u8, ResponderSlot>,
    chosen: Option<ResponderSlot>,
}

impl InitiatorSignaling {
    /// Create an initiator engine around its permanent keystore and the
    /// auth token it handed out.
    pub fn new(permanent: KeyStore, auth_token: AuthToken) -> Self {
        Self {
            common: Common::new(Role::Initiator, permanent),
            auth_token,
            slots: BTreeMap::new(),
            chosen: None,
        }
    }

    /// The relay path component: lowercase hex of our permanent public
    /// key.
    pub fn path(&self) -> String {
        self.common.permanent.public_key_hex()
    }

    /// Number of responder candidates currently tracked. Zero once a
    /// responder has been elected.
    pub fn tracked_responders(&self) -> usize {
        self.slots.len()
    }

    fn abort(&mut self) {
        self.slots.clear();
        self.chosen = None;
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
                    source if is_responder_address(source) => self.process_peer_frame(&envelope),
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
                out.frames.push(self.common.client_auth_frame()?);
                // The server addresses us as initiator from here on.
                self.common.address = INITIATOR_ADDRESS;
                self.common.server_hs = ServerHandshakeState::AwaitingAuth;
            }
            ServerHandshakeState::AwaitingAuth => {
                if nonce.destination() != INITIATOR_ADDRESS {
                    return Err(SignalingError::BadNonceDestination(nonce.destination()));
                }
                let message = self.common.open(&KeySelector::Server, envelope)?;
                let Message::ServerAuth {
                    your_cookie,
                    responders,
                    ..
                } = message
                else {
                    return Err(SignalingError::BadMessageType(message.kind()));
                };
                self.common.verify_your_cookie(&your_cookie)?;
                for id in responders.unwrap_or_default() {
                    if !is_responder_address(id) {
                        warn!(id, "ignoring responder with invalid address");
                        continue;
                    }
                    self.slots.insert(id, ResponderSlot::new(id));
                }
                debug!(responders = self.slots.len(), "server-auth received");
                self.common.server_hs = ServerHandshakeState::Done;
                self.common.set_state(SignalingState::PeerHandshake);
                out.events.push(SignalingEvent::ServerHandshakeDone);
            }
            ServerHandshakeState::Done => {
                return Err(SignalingError::Protocol(
                    "server handshake already complete".into(),
                ));
            }
        }
        Ok(out)
    }

    fn process_server_message(
        &mut self,
        envelope: &Envelope,
    ) -> Result<StepOutput, SignalingError> {
        let mut out = StepOutput::default();
        let message = self.common.open(&KeySelector::Server, envelope)?;
        match message {
            Message::NewResponder { id } => {
                if !is_responder_address(id) {
                    warn!(id, "new-responder with invalid address, ignoring");
                } else if self.common.state() == SignalingState::Open {
                    debug!(id, "responder already elected, dropping newcomer");
                    out.frames
                        .push(self.common.frame_to_server(&Message::DropResponder { id }, true)?);
                } else if self.slots.contains_key(&id) {
                    warn!(id, "duplicate new-responder, ignoring");
                } else {
                    debug!(id, "responder joined");
                    self.slots.insert(id, ResponderSlot::new(id));
                }
            }
            Message::Disconnected { id } => {
                debug!(id, "peer disconnected");
                self.slots.remove(&id);
                out.events.push(SignalingEvent::PeerDisconnected { id });
            }
            other => debug!(kind = other.kind(), "ignoring server message"),
        }
        Ok(out)
    }

    fn process_peer_frame(&mut self, envelope: &Envelope) -> Result<StepOutput, SignalingError> {
        let source = envelope.nonce().source();
        if self.common.state() == SignalingState::Open {
            return self.process_peer_data(envelope);
        }
        let Some(state) = self.slots.get(&source).map(|slot| slot.state()) else {
            debug!(source, "frame from unknown responder, skipping");
            return Ok(StepOutput::default());
        };
        match state {
            SlotState::New => self.handle_token(source, envelope),
            SlotState::TokenReceived => self.handle_key(source, envelope),
            SlotState::KeyReceived => self.handle_auth(source, envelope),
        }
    }

    /// First message from a candidate: `token` under the auth token.
    fn handle_token(&mut self, source: u8, envelope: &Envelope) -> Result<StepOutput, SignalingError> {
        let mut out = StepOutput::default();
        let message = self
            .common
            .open(&KeySelector::Token(&self.auth_token), envelope)?;
        let Message::Token { key } = message else {
            return Err(SignalingError::BadMessageType(message.kind()));
        };
        let peer_permanent = PublicKey::from(key);
        debug!(source, "token received");

        let our_cookie = self.common.our_cookie()?;
        let address = self.common.address;
        let slot = self
            .slots
            .get_mut(&source)
            .ok_or(SignalingError::BadReceiver(source))?;
        slot.permanent_pub = Some(peer_permanent.clone());
        slot.set_state(SlotState::TokenReceived);

        let csn = slot.csn.next()?;
        let nonce = Nonce::new(our_cookie, address, source, csn);
        let reply = Message::Key {
            key: slot.own_session.public_key_bytes(),
        };
        out.frames
            .push(self.common.seal(&KeySelector::PeerPermanent(&peer_permanent), nonce, &reply)?);
        Ok(out)
    }

    /// Second message: `key` under permanent keys.
    fn handle_key(&mut self, source: u8, envelope: &Envelope) -> Result<StepOutput, SignalingError> {
        let mut out = StepOutput::default();
        let peer_permanent = self
            .slots
            .get(&source)
            .and_then(|slot| slot.permanent_pub.clone())
            .ok_or_else(|| SignalingError::Protocol("responder permanent key missing".into()))?;
        let message = self
            .common
            .open(&KeySelector::PeerPermanent(&peer_permanent), envelope)?;
        let Message::Key { key } = message else {
            return Err(SignalingError::BadMessageType(message.kind()));
        };
        let peer_session = PublicKey::from(key);
        debug!(source, "key received");

        let our_cookie = self.common.our_cookie()?;
        let address = self.common.address;
        let slot = self
            .slots
            .get_mut(&source)
            .ok_or(SignalingError::BadReceiver(source))?;
        slot.session_pub = Some(peer_session.clone());
        slot.set_state(SlotState::KeyReceived);

        // A peer replaying our own cookie is a broken or hostile peer.
        if envelope.nonce().cookie() == &our_cookie {
            return Err(SignalingError::BadCookie);
        }

        let csn = slot.csn.next()?;
        let nonce = Nonce::new(our_cookie, address, source, csn);
        let reply = Message::Auth {
            your_cookie: *envelope.nonce().cookie().as_bytes(),
        };
        out.frames.push(self.common.seal(
            &KeySelector::PeerSession {
                own: &slot.own_session,
                peer: &peer_session,
            },
            nonce,
            &reply,
        )?);
        Ok(out)
    }

    /// Third message: `auth` under session keys. Completing it elects the
    /// responder and drops every other candidate.
    fn handle_auth(&mut self, source: u8, envelope: &Envelope) -> Result<StepOutput, SignalingError> {
        let mut out = StepOutput::default();
        {
            let slot = self
                .slots
                .get(&source)
                .ok_or_else(|| SignalingError::Protocol("responder slot vanished".into()))?;
            let peer_session = slot
                .session_pub
                .as_ref()
                .ok_or_else(|| SignalingError::Protocol("responder session key missing".into()))?;
            let message = self.common.open(
                &KeySelector::PeerSession {
                    own: &slot.own_session,
                    peer: peer_session,
                },
                envelope,
            )?;
            let Message::Auth { your_cookie } = message else {
                return Err(SignalingError::BadMessageType(message.kind()));
            };
            self.common.verify_your_cookie(&your_cookie)?;
        }

        let chosen = self
            .slots
            .remove(&source)
            .ok_or_else(|| SignalingError::Protocol("responder slot vanished".into()))?;
        let others: Vec<u8> = self.slots.keys().copied().collect();
        for id in &others {
            out.frames
                .push(self.common.frame_to_server(&Message::DropResponder { id: *id }, true)?);
        }
        self.slots.clear();
        info!(peer = source, dropped = others.len(), "responder elected");
        self.chosen = Some(chosen);
        self.common.set_state(SignalingState::Open);
        out.events.push(SignalingEvent::Connected { peer: source });
        Ok(out)
    }

    /// Post-handshake frame from the elected responder.
    fn process_peer_data(&mut self, envelope: &Envelope) -> Result<StepOutput, SignalingError> {
        let mut out = StepOutput::default();
        let source = envelope.nonce().source();
        let chosen = self
            .chosen
            .as_ref()
            .ok_or_else(|| SignalingError::Protocol("no elected responder".into()))?;
        if chosen.id() != source {
            debug!(source, "frame from non-elected responder, skipping");
            return Ok(out);
        }
        let peer_session = chosen
            .session_pub
            .as_ref()
            .ok_or_else(|| SignalingError::Protocol("responder session key missing".into()))?;
        let payload = chosen.own_session.decrypt(envelope, peer_session)?;
        out.events.push(SignalingEvent::Data { source, payload });
        Ok(out)
    }
}

impl Signaling for InitiatorSignaling {
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
        let our_cookie = self.common.our_cookie()?;
        let address = self.common.address;
        let chosen = self
            .chosen
            .as_mut()
            .ok_or_else(|| SignalingError::Protocol("no elected responder".into()))?;
        let peer_session = chosen
            .session_pub
            .clone()
            .ok_or_else(|| SignalingError::Protocol("responder session key missing".into()))?;
        let csn = chosen.csn.next()?;
        let nonce = Nonce::new(our_cookie, address, chosen.id(), csn);
        Ok(chosen
            .own_session
            .encrypt(payload, nonce, &peer_session)?
            .to_bytes())
    }

    fn close(&mut self) {
        if self.common.state() == SignalingState::Closed {
            return;
        }
        self.common.set_state(SignalingState::Closing);
        self.slots.clear();
        self.chosen = None;
        self.common.set_state(SignalingState::Closed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> InitiatorSignaling {
        InitiatorSignaling::new(KeyStore::generate(), AuthToken::generate())
    }

    #[test]
    fn test_initial_state() {
        let engine = engine();
        assert_eq!(engine.state(), SignalingState::New);
        assert_eq!(engine.tracked_responders(), 0);
    }

    #[test]
    fn test_path_is_lowercase_hex_of_permanent_key() {
        let engine = engine();
        assert_eq!(engine.path().len(), 64);
        assert!(engine.path().chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(engine.path(), engine.path().to_lowercase());
    }

    #[test]
    fn test_begin_transitions_to_server_handshake() {
        let mut engine = engine();
        engine.connecting();
        assert_eq!(engine.state(), SignalingState::Connecting);
        engine.begin().unwrap();
        assert_eq!(engine.state(), SignalingState::ServerHandshake);
        assert!(engine.begin().is_err());
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
        assert_eq!(engine.state(), SignalingState::Closed);
        engine.close();
        assert_eq!(engine.state(), SignalingState::Closed);
    }
}
