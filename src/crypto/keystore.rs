//! Key material.
//!
//! [`KeyStore`] owns an X25519 keypair and performs public-key
//! authenticated encryption (NaCl box: X25519 + XSalsa20-Poly1305).
//! [`AuthToken`] owns a 32-byte symmetric secret and performs secret-key
//! authenticated encryption (NaCl secretbox: XSalsa20-Poly1305).
//!
//! Both primitives use 32-byte keys, 24-byte nonces, and a 16-byte MAC.
//! Secret material is zeroized on drop.

use crypto_box::aead::generic_array::GenericArray;
use crypto_box::aead::{Aead, KeyInit};
use crypto_box::{PublicKey, SalsaBox, SecretKey};
use crypto_secretbox::XSalsa20Poly1305;
use rand::{rngs::OsRng, RngCore};
use zeroize::Zeroize;

use crate::core::{CryptoError, AUTH_TOKEN_SIZE, PUBLIC_KEY_SIZE, SECRET_KEY_SIZE};

use super::envelope::Envelope;
use super::nonce::Nonce;

/// An X25519 keypair with NaCl box encryption.
///
/// One permanent keystore identifies a party for its lifetime; session
/// keystores are generated per handshake (the initiator keeps a distinct
/// session keystore per candidate responder).
pub struct KeyStore {
    secret: SecretKey,
    public: PublicKey,
}

impl KeyStore {
    /// Generate a new random keypair.
    pub fn generate() -> Self {
        let secret = SecretKey::generate(&mut OsRng);
        let public = secret.public_key();
        Self { secret, public }
    }

    /// Restore a keypair from a stored secret scalar.
    pub fn from_secret_bytes(bytes: [u8; SECRET_KEY_SIZE]) -> Self {
        let secret = SecretKey::from(bytes);
        let public = secret.public_key();
        Self { secret, public }
    }

    /// The public key.
    pub fn public_key(&self) -> &PublicKey {
        &self.public
    }

    /// The public key as raw bytes.
    pub fn public_key_bytes(&self) -> [u8; PUBLIC_KEY_SIZE] {
        *self.public.as_bytes()
    }

    /// The public key as lowercase hex (the relay path component).
    pub fn public_key_hex(&self) -> String {
        hex::encode(self.public.as_bytes())
    }

    /// Encrypt `plaintext` for `peer` under the given nonce.
    ///
    /// The returned envelope carries exactly the nonce that was passed in.
    pub fn encrypt(
        &self,
        plaintext: &[u8],
        nonce: Nonce,
        peer: &PublicKey,
    ) -> Result<Envelope, CryptoError> {
        let salsa_box = SalsaBox::new(peer, &self.secret);
        let ciphertext = salsa_box
            .encrypt(&GenericArray::from(nonce.to_bytes()), plaintext)
            .map_err(|_| CryptoError::EncryptionFailed)?;
        Ok(Envelope::new(nonce, ciphertext))
    }

    /// Decrypt an envelope sent by `peer`.
    pub fn decrypt(&self, envelope: &Envelope, peer: &PublicKey) -> Result<Vec<u8>, CryptoError> {
        let salsa_box = SalsaBox::new(peer, &self.secret);
        salsa_box
            .decrypt(
                &GenericArray::from(envelope.nonce().to_bytes()),
                envelope.bytes(),
            )
            .map_err(|_| CryptoError::DecryptionFailed)
    }
}

impl std::fmt::Debug for KeyStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyStore")
            .field("public", &self.public_key_hex())
            .finish_non_exhaustive()
    }
}

/// A 32-byte symmetric secret with NaCl secretbox encryption.
///
/// Created by the initiator, conveyed to the responder through a side
/// channel, and consumed to authenticate the responder's first message.
pub struct AuthToken {
    key: [u8; AUTH_TOKEN_SIZE],
}

impl AuthToken {
    /// Generate a new random token.
    pub fn generate() -> Self {
        let mut key = [0u8; AUTH_TOKEN_SIZE];
        OsRng.fill_bytes(&mut key);
        Self { key }
    }

    /// Restore a token received through the side channel.
    pub fn from_bytes(key: [u8; AUTH_TOKEN_SIZE]) -> Self {
        Self { key }
    }

    /// The raw secret, for out-of-band conveyance.
    ///
    /// # Security
    /// Handle with care - this exposes sensitive key material.
    pub fn as_bytes(&self) -> &[u8; AUTH_TOKEN_SIZE] {
        &self.key
    }

    /// Encrypt `plaintext` under the given nonce.
    pub fn encrypt(&self, plaintext: &[u8], nonce: Nonce) -> Result<Envelope, CryptoError> {
        let cipher = XSalsa20Poly1305::new(GenericArray::from_slice(&self.key));
        let ciphertext = cipher
            .encrypt(&GenericArray::from(nonce.to_bytes()), plaintext)
            .map_err(|_| CryptoError::EncryptionFailed)?;
        Ok(Envelope::new(nonce, ciphertext))
    }

    /// Decrypt an envelope sealed with this token.
    pub fn decrypt(&self, envelope: &Envelope) -> Result<Vec<u8>, CryptoError> {
        let cipher = XSalsa20Poly1305::new(GenericArray::from_slice(&self.key));
        cipher
            .decrypt(
                &GenericArray::from(envelope.nonce().to_bytes()),
                envelope.bytes(),
            )
            .map_err(|_| CryptoError::DecryptionFailed)
    }
}

impl std::fmt::Debug for AuthToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthToken").finish_non_exhaustive()
    }
}

impl Drop for AuthToken {
    fn drop(&mut self) {
        self.key.zeroize();
    }
}
