//! Per-channel payload reassembly.
//!
//! Chunks of one payload may interleave with chunks for other channels on
//! the same connection, so partial buffers are keyed by channel number.
//! A completed payload is handed up and its buffer released; subscribers
//! never observe partial chunks.

use std::collections::HashMap;

use bytes::{Bytes, BytesMut};

use super::frame::Chunk;
use crate::error::{Result, RoutioError};

struct Partial {
    total: u32,
    filled: u32,
    buffer: BytesMut,
}

/// Reassembles chunk streams into complete payloads, per channel.
///
/// Owned by its connection; dropping the connection releases every
/// in-progress buffer.
pub struct Reassembler {
    partial: HashMap<u32, Partial>,
}

impl Reassembler {
    /// Create an empty reassembler.
    pub fn new() -> Self {
        Self {
            partial: HashMap::new(),
        }
    }

    /// Feed one chunk; returns the completed payload if this chunk
    /// finished it.
    ///
    /// # Errors
    ///
    /// Framing errors terminate the connection: a chunk whose total
    /// disagrees with the in-progress buffer for its channel, or whose
    /// offset does not continue that buffer contiguously.
    pub fn push(&mut self, chunk: Chunk) -> Result<Option<(u32, Bytes)>> {
        let channel = chunk.header.channel;

        // Whole payload in one chunk and nothing pending: fast path.
        if chunk.header.is_whole() && !self.partial.contains_key(&channel) {
            return Ok(Some((channel, chunk.body)));
        }

        let (expected_total, expected_offset) = match self.partial.get(&channel) {
            Some(partial) => (partial.total, partial.filled),
            None => (chunk.header.total_length, 0),
        };

        if chunk.header.total_length != expected_total {
            self.partial.remove(&channel);
            return Err(RoutioError::Framing(format!(
                "chunk total {} disagrees with in-progress payload of {expected_total} on channel {channel}",
                chunk.header.total_length
            )));
        }

        if chunk.header.chunk_offset != expected_offset {
            self.partial.remove(&channel);
            return Err(RoutioError::Framing(format!(
                "chunk offset {} is not contiguous (expected {expected_offset}) on channel {channel}",
                chunk.header.chunk_offset
            )));
        }

        let entry = self.partial.entry(channel).or_insert_with(|| Partial {
            total: chunk.header.total_length,
            filled: 0,
            buffer: BytesMut::with_capacity(chunk.header.total_length as usize),
        });
        entry.buffer.extend_from_slice(&chunk.body);
        entry.filled += chunk.header.chunk_length;

        if entry.filled == entry.total {
            let done = self.partial.remove(&channel).expect("entry present");
            return Ok(Some((channel, done.buffer.freeze())));
        }

        Ok(None)
    }

    /// Number of channels with a payload in flight.
    pub fn in_progress(&self) -> usize {
        self.partial.len()
    }

    /// Bytes currently held in partial buffers.
    pub fn buffered_bytes(&self) -> usize {
        self.partial.values().map(|p| p.buffer.len()).sum()
    }
}

impl Default for Reassembler {
    fn default() -> Self {
        Self::new()
    }
}
