//! Chunk header encoding and decoding.
//!
//! Implements the 16-byte frame header:
//! ```text
//! ┌──────────┬──────────────┬──────────────┬──────────────┐
//! │ Channel  │ Total length │ Chunk offset │ Chunk length │
//! │ 4 bytes  │ 4 bytes      │ 4 bytes      │ 4 bytes      │
//! │ u32 LE   │ u32 LE       │ u32 LE       │ u32 LE       │
//! └──────────┴──────────────┴──────────────┴──────────────┘
//! ```
//!
//! All integer fields are little-endian. A payload no larger than
//! [`MAX_CHUNK`] travels as a single chunk (offset 0, length = total);
//! larger payloads are split into contiguous chunks in offset order and
//! reassembled per (connection, channel) before delivery.

use crate::error::{Result, RoutioError};

/// Header size in bytes (fixed, exactly 16).
pub const HEADER_SIZE: usize = 16;

/// Largest chunk body the codec will emit or accept.
pub const MAX_CHUNK: usize = 64 * 1024;

/// Channel number reserved for control traffic.
pub const CONTROL_CHANNEL: u32 = 0;

/// Decoded chunk header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkHeader {
    /// Destination channel number (0 reserved for control).
    pub channel: u32,
    /// Length of the complete payload this chunk belongs to.
    pub total_length: u32,
    /// Byte offset of this chunk within the payload.
    pub chunk_offset: u32,
    /// Number of payload bytes carried by this chunk.
    pub chunk_length: u32,
}

impl ChunkHeader {
    /// Create a new header.
    pub fn new(channel: u32, total_length: u32, chunk_offset: u32, chunk_length: u32) -> Self {
        Self {
            channel,
            total_length,
            chunk_offset,
            chunk_length,
        }
    }

    /// Header for a payload small enough to travel as one chunk.
    pub fn single(channel: u32, length: u32) -> Self {
        Self::new(channel, length, 0, length)
    }

    /// Encode the header to bytes (little-endian).
    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        buf[0..4].copy_from_slice(&self.channel.to_le_bytes());
        buf[4..8].copy_from_slice(&self.total_length.to_le_bytes());
        buf[8..12].copy_from_slice(&self.chunk_offset.to_le_bytes());
        buf[12..16].copy_from_slice(&self.chunk_length.to_le_bytes());
        buf
    }

    /// Decode a header from bytes.
    ///
    /// Returns `None` if the buffer is too short.
    pub fn decode(buf: &[u8]) -> Option<Self> {
        if buf.len() < HEADER_SIZE {
            return None;
        }
        Some(Self {
            channel: u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]),
            total_length: u32::from_le_bytes([buf[4], buf[5], buf[6], buf[7]]),
            chunk_offset: u32::from_le_bytes([buf[8], buf[9], buf[10], buf[11]]),
            chunk_length: u32::from_le_bytes([buf[12], buf[13], buf[14], buf[15]]),
        })
    }

    /// Validate internal consistency.
    ///
    /// Checks:
    /// - chunk body fits in `MAX_CHUNK`
    /// - (offset, length) stays inside the declared total
    pub fn validate(&self) -> Result<()> {
        if self.chunk_length as usize > MAX_CHUNK {
            return Err(RoutioError::Framing(format!(
                "chunk length {} exceeds maximum {}",
                self.chunk_length, MAX_CHUNK
            )));
        }

        let end = self.chunk_offset as u64 + self.chunk_length as u64;
        if end > self.total_length as u64 {
            return Err(RoutioError::Framing(format!(
                "chunk [{}, {}) exceeds declared total {}",
                self.chunk_offset, end, self.total_length
            )));
        }

        Ok(())
    }

    /// Check if this chunk carries a complete payload by itself.
    #[inline]
    pub fn is_whole(&self) -> bool {
        self.chunk_offset == 0 && self.chunk_length == self.total_length
    }

    /// Check if this header addresses the control channel.
    #[inline]
    pub fn is_control(&self) -> bool {
        self.channel == CONTROL_CHANNEL
    }
}
