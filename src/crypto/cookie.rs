//! Per-peer cookies.
//!
//! A cookie is 16 random bytes carried in every wire nonce and echoed back
//! in `your_cookie` fields to bind replies to requests.

use rand::{rngs::OsRng, RngCore};

use crate::core::COOKIE_SIZE;

/// A 16-byte random per-peer tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cookie([u8; COOKIE_SIZE]);

impl Cookie {
    /// Generate a fresh random cookie.
    pub fn random() -> Self {
        let mut bytes = [0u8; COOKIE_SIZE];
        OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Generate a cookie guaranteed to differ from `other`.
    pub fn random_distinct_from(other: &Cookie) -> Self {
        loop {
            let cookie = Self::random();
            if cookie != *other {
                return cookie;
            }
        }
    }

    /// Create from raw bytes.
    pub fn from_bytes(bytes: [u8; COOKIE_SIZE]) -> Self {
        Self(bytes)
    }

    /// Get the raw bytes.
    pub fn as_bytes(&self) -> &[u8; COOKIE_SIZE] {
        &self.0
    }
}

/// The cookie pair of one connection.
///
/// Invariant: `ours != theirs`.
#[derive(Debug, Clone)]
pub struct CookiePair {
    /// The cookie we put into every outbound nonce.
    pub ours: Cookie,
    /// The cookie the peer announced.
    pub theirs: Cookie,
}

impl CookiePair {
    /// Build a pair around a received peer cookie, generating a distinct
    /// local cookie.
    pub fn from_theirs(theirs: Cookie) -> Self {
        Self {
            ours: Cookie::random_distinct_from(&theirs),
            theirs,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cookie_equality() {
        let bytes = [0x2a; COOKIE_SIZE];
        assert_eq!(Cookie::from_bytes(bytes), Cookie::from_bytes(bytes));
        assert_ne!(Cookie::from_bytes(bytes), Cookie::from_bytes([0x2b; COOKIE_SIZE]));
    }

    #[test]
    fn test_random_cookies_differ() {
        // Collisions of 16 random bytes are negligible.
        assert_ne!(Cookie::random(), Cookie::random());
    }

    #[test]
    fn test_pair_is_distinct() {
        for _ in 0..16 {
            let theirs = Cookie::random();
            let pair = CookiePair::from_theirs(theirs);
            assert_ne!(pair.ours, pair.theirs);
            assert_eq!(pair.theirs, theirs);
        }
    }
}
