//! Cryptographic framing layer.
//!
//! - [`Cookie`] / [`CookiePair`]: 16-byte per-peer tags binding replies to
//!   requests
//! - [`CombinedSequence`]: 48-bit monotonic outbound counters
//! - [`Nonce`]: the 24-byte wire nonce carrying routing metadata
//! - [`KeyStore`] / [`AuthToken`]: NaCl box / secretbox key material
//! - [`Envelope`]: the `nonce ‖ bytes` wire frame

mod cookie;
mod csn;
mod envelope;
mod keystore;
mod nonce;

pub use cookie::{Cookie, CookiePair};
pub use csn::{CombinedSequence, SequencePair};
pub use envelope::Envelope;
pub use keystore::{AuthToken, KeyStore};
pub use nonce::Nonce;

pub use crypto_box::PublicKey;
