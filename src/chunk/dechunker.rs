//! Reassembling chunked buffers.

use crate::core::{ChunkError, CHUNK_FLAG_END, CHUNK_FLAG_MORE};

/// Accumulates chunks until the terminal chunk arrives.
#[derive(Debug, Default)]
pub struct Dechunker {
    buf: Vec<u8>,
    complete: bool,
}

impl Dechunker {
    /// Create an empty dechunker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one chunk.
    ///
    /// Returns `true` once the terminal chunk has been consumed. Empty
    /// chunks are ignored. Feeding past the terminal chunk fails with
    /// [`ChunkError::AlreadyComplete`]; an unknown flag byte fails with
    /// [`ChunkError::InvalidChunk`].
    pub fn add(&mut self, chunk: &[u8]) -> Result<bool, ChunkError> {
        if self.complete {
            return Err(ChunkError::AlreadyComplete);
        }
        let Some((&flag, payload)) = chunk.split_first() else {
            return Ok(false);
        };
        match flag {
            CHUNK_FLAG_MORE => {
                self.buf.extend_from_slice(payload);
                Ok(false)
            }
            CHUNK_FLAG_END => {
                self.buf.extend_from_slice(payload);
                self.complete = true;
                Ok(true)
            }
            other => Err(ChunkError::InvalidChunk(other)),
        }
    }

    /// Whether the terminal chunk has arrived.
    pub fn is_complete(&self) -> bool {
        self.complete
    }

    /// The reassembled buffer.
    ///
    /// Fails with [`ChunkError::NotComplete`] before the terminal chunk;
    /// afterwards it may be called any number of times.
    pub fn merge(&self) -> Result<&[u8], ChunkError> {
        if self.complete {
            Ok(&self.buf)
        } else {
            Err(ChunkError::NotComplete)
        }
    }
}
