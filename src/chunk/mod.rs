//! Chunking sublayer.
//!
//! Splits byte buffers into bounded frames for transports with a maximum
//! message size (data channels cap at 16 KiB) and reassembles them on the
//! far side. Handshake frames are never chunked; this layer only carries
//! post-handshake payloads.
//!
//! Wire format per chunk:
//!
//! ```text
//! [ flag (1) | payload (1..=chunk_size-1) ]
//! ```
//!
//! where the flag is `0x01` while more chunks follow and `0x00` on the
//! terminal chunk.

mod chunker;
mod dechunker;

pub use chunker::Chunker;
pub use dechunker::Dechunker;
