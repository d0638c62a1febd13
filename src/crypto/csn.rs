//! Combined sequence numbers.
//!
//! Each (local endpoint, remote address) direction carries a 48-bit
//! monotonic counter split into a 32-bit sequence and a 16-bit overflow.
//! The initial sequence is random; the overflow starts at zero. Once the
//! overflow would wrap, the space is spent and the connection must die.

use rand::{rngs::OsRng, RngCore};

use crate::core::CryptoError;

/// One issued `(overflow, sequence)` pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct SequencePair {
    /// 16-bit overflow counter.
    pub overflow: u16,
    /// 32-bit sequence counter.
    pub sequence: u32,
}

/// A 48-bit monotonic outbound counter.
///
/// Not thread-safe by itself; the engine serializes access per peer.
#[derive(Debug, Clone)]
pub struct CombinedSequence {
    sequence: u32,
    overflow: u16,
}

impl CombinedSequence {
    /// Create a counter with a random initial sequence.
    pub fn random() -> Self {
        Self {
            sequence: OsRng.next_u32(),
            overflow: 0,
        }
    }

    /// Create a counter from explicit parts.
    pub fn new(sequence: u32, overflow: u16) -> Self {
        Self { sequence, overflow }
    }

    /// Advance the counter and return the new pair.
    ///
    /// The sequence wraps into the overflow; exhausting the overflow fails
    /// with [`CryptoError::OverflowExhausted`], which is fatal to the
    /// connection.
    pub fn next(&mut self) -> Result<SequencePair, CryptoError> {
        if self.sequence == u32::MAX {
            self.overflow = self
                .overflow
                .checked_add(1)
                .ok_or(CryptoError::OverflowExhausted)?;
            self.sequence = 0;
        } else {
            self.sequence += 1;
        }
        Ok(SequencePair {
            overflow: self.overflow,
            sequence: self.sequence,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_monotonically_increasing() {
        let mut csn = CombinedSequence::new(7, 0);
        let mut previous = csn.next().unwrap();
        for _ in 0..100 {
            let current = csn.next().unwrap();
            assert!(current > previous);
            previous = current;
        }
    }

    #[test]
    fn test_sequence_wraps_into_overflow() {
        let mut csn = CombinedSequence::new(u32::MAX, 3);
        let pair = csn.next().unwrap();
        assert_eq!(pair.overflow, 4);
        assert_eq!(pair.sequence, 0);

        let pair = csn.next().unwrap();
        assert_eq!(pair.overflow, 4);
        assert_eq!(pair.sequence, 1);
    }

    #[test]
    fn test_overflow_exhaustion() {
        let mut csn = CombinedSequence::new(u32::MAX, u16::MAX);
        assert_eq!(csn.next(), Err(CryptoError::OverflowExhausted));
        // The failure is sticky.
        assert_eq!(csn.next(), Err(CryptoError::OverflowExhausted));
    }

    #[test]
    fn test_random_initial_overflow_is_zero() {
        let mut csn = CombinedSequence::random();
        let pair = csn.next().unwrap();
        assert!(pair.overflow <= 1);
    }
}
