//! Streaming chunk decoder for accumulating partial reads.
//!
//! Maintains a state machine per connection:
//! - `AwaitingHeader`: need at least 16 bytes
//! - `AwaitingBody`: header parsed, need `chunk_length` more bytes
//!
//! Complete chunks are returned in arrival order; reassembly into full
//! payloads happens one layer up in [`super::reassembly`].

use bytes::BytesMut;

use super::frame::Chunk;
use super::wire::{ChunkHeader, HEADER_SIZE};
use crate::error::Result;

#[derive(Debug, Clone)]
enum State {
    /// Waiting for a complete 16-byte header.
    AwaitingHeader,
    /// Header parsed, waiting for the chunk body.
    AwaitingBody { header: ChunkHeader },
}

/// Buffer for accumulating incoming bytes and extracting complete chunks.
///
/// All data is held in a single `BytesMut`; chunk bodies are split off
/// without copying.
pub struct ChunkDecoder {
    buffer: BytesMut,
    state: State,
}

impl ChunkDecoder {
    /// Create a new decoder with a read-sized buffer.
    pub fn new() -> Self {
        Self {
            buffer: BytesMut::with_capacity(64 * 1024),
            state: State::AwaitingHeader,
        }
    }

    /// Push data into the decoder and extract all complete chunks.
    ///
    /// Partial data is buffered internally for the next push.
    ///
    /// # Errors
    ///
    /// Returns a framing error if a header fails validation; the
    /// connection owning this decoder must then be terminated.
    pub fn push(&mut self, data: &[u8]) -> Result<Vec<Chunk>> {
        self.buffer.extend_from_slice(data);

        let mut chunks = Vec::new();
        while let Some(chunk) = self.try_extract_one()? {
            chunks.push(chunk);
        }
        Ok(chunks)
    }

    fn try_extract_one(&mut self) -> Result<Option<Chunk>> {
        match self.state {
            State::AwaitingHeader => {
                if self.buffer.len() < HEADER_SIZE {
                    return Ok(None);
                }

                let header = ChunkHeader::decode(&self.buffer[..HEADER_SIZE])
                    .expect("buffer has enough bytes");
                header.validate()?;

                let _ = self.buffer.split_to(HEADER_SIZE);
                self.state = State::AwaitingBody { header };
                self.try_extract_one()
            }

            State::AwaitingBody { header } => {
                let needed = header.chunk_length as usize;
                if self.buffer.len() < needed {
                    return Ok(None);
                }

                let body = self.buffer.split_to(needed).freeze();
                self.state = State::AwaitingHeader;
                Ok(Some(Chunk::new(header, body)))
            }
        }
    }

    /// Number of buffered bytes not yet part of a complete chunk.
    pub fn pending_bytes(&self) -> usize {
        self.buffer.len()
    }

    /// True when no partial chunk is buffered.
    pub fn is_idle(&self) -> bool {
        self.buffer.is_empty() && matches!(self.state, State::AwaitingHeader)
    }
}

impl Default for ChunkDecoder {
    fn default() -> Self {
        Self::new()
    }
}
