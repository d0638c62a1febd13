//! Per-peer handshake records.

use crate::crypto::{CombinedSequence, KeyStore, PublicKey};

/// Initiator-side handshake progress for one responder slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    /// Nothing received yet; the next message must be `token`.
    New,
    /// `token` received; the next message must be `key`.
    TokenReceived,
    /// `key` received; the next message must be `auth`.
    KeyReceived,
}

/// A responder known to the initiator.
///
/// The slot owns the initiator's session keystore *for this responder*
/// and the outbound counter toward it. Slots are keyed by id in the
/// engine's table; they hold no back-references.
#[derive(Debug)]
pub struct ResponderSlot {
    id: u8,
    state: SlotState,
    pub(crate) permanent_pub: Option<PublicKey>,
    pub(crate) session_pub: Option<PublicKey>,
    pub(crate) own_session: KeyStore,
    pub(crate) csn: CombinedSequence,
}

impl ResponderSlot {
    /// Create a fresh slot with its own session keystore and counter.
    pub fn new(id: u8) -> Self {
        Self {
            id,
            state: SlotState::New,
            permanent_pub: None,
            session_pub: None,
            own_session: KeyStore::generate(),
            csn: CombinedSequence::random(),
        }
    }

    /// The slot's address.
    pub fn id(&self) -> u8 {
        self.id
    }

    /// The slot's handshake state.
    pub fn state(&self) -> SlotState {
        self.state
    }

    pub(crate) fn set_state(&mut self, state: SlotState) {
        self.state = state;
    }
}

/// Responder-side handshake progress toward the initiator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitiatorContextState {
    /// Nothing sent yet.
    New,
    /// `token` sent; the next inbound must be `key`.
    TokenSent,
    /// `key` sent; the next inbound must be `auth`.
    KeySent,
    /// `auth` received and answered; the peer handshake is complete.
    AuthReceived,
}

/// The responder's view of the initiator.
#[derive(Debug)]
pub struct InitiatorContext {
    /// The initiator's permanent public key, known out-of-band.
    pub(crate) permanent_pub: PublicKey,
    /// The initiator's session key, learned from its `key` message.
    pub(crate) session_pub: Option<PublicKey>,
    /// Our session keystore, generated when answering `key`.
    pub(crate) session: Option<KeyStore>,
    /// Handshake progress.
    pub(crate) state: InitiatorContextState,
    /// Outbound counter toward the initiator.
    pub(crate) csn: CombinedSequence,
    /// Whether the server reports the initiator as connected.
    pub(crate) connected: bool,
}

impl InitiatorContext {
    /// Create a context around the out-of-band initiator key.
    pub fn new(permanent_pub: PublicKey) -> Self {
        Self {
            permanent_pub,
            session_pub: None,
            session: None,
            state: InitiatorContextState::New,
            csn: CombinedSequence::random(),
            connected: false,
        }
    }

    /// Forget everything learned from a previous initiator.
    pub(crate) fn reset_session(&mut self) {
        self.session_pub = None;
        self.session = None;
        self.state = InitiatorContextState::New;
        self.csn = CombinedSequence::random();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_slot() {
        let slot = ResponderSlot::new(0x02);
        assert_eq!(slot.id(), 0x02);
        assert_eq!(slot.state(), SlotState::New);
        assert!(slot.permanent_pub.is_none());
        assert!(slot.session_pub.is_none());
    }

    #[test]
    fn test_slots_have_distinct_session_keys() {
        let a = ResponderSlot::new(0x02);
        let b = ResponderSlot::new(0x03);
        assert_ne!(a.own_session.public_key_bytes(), b.own_session.public_key_bytes());
    }

    #[test]
    fn test_context_reset_forgets_session() {
        let mut context = InitiatorContext::new(KeyStore::generate().public_key().clone());
        context.session = Some(KeyStore::generate());
        context.session_pub = Some(KeyStore::generate().public_key().clone());
        context.state = InitiatorContextState::KeySent;

        context.reset_session();
        assert!(context.session.is_none());
        assert!(context.session_pub.is_none());
        assert_eq!(context.state, InitiatorContextState::New);
    }
}
