//! Chunk construction and payload splitting.
//!
//! A [`Chunk`] pairs a decoded header with its body bytes. Outbound
//! payloads are split with [`chunk_payload`]: every produced chunk slices
//! the same `bytes::Bytes` allocation, so fanning one payload out to many
//! subscriber queues shares a single buffer instead of copying it.

use bytes::{Bytes, BytesMut};

use super::wire::{ChunkHeader, HEADER_SIZE, MAX_CHUNK};

/// One wire unit: header plus body bytes.
#[derive(Debug, Clone)]
pub struct Chunk {
    /// Decoded header.
    pub header: ChunkHeader,
    /// Body bytes (zero-copy slice of the payload).
    pub body: Bytes,
}

impl Chunk {
    /// Create a new chunk from header and body.
    pub fn new(header: ChunkHeader, body: Bytes) -> Self {
        Self { header, body }
    }

    /// Total on-wire size of this chunk (header + body).
    #[inline]
    pub fn wire_size(&self) -> usize {
        HEADER_SIZE + self.body.len()
    }

    /// Encode the chunk into a contiguous buffer.
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.wire_size());
        buf.extend_from_slice(&self.header.encode());
        buf.extend_from_slice(&self.body);
        buf.freeze()
    }
}

/// Split a payload into offset-ordered chunks addressed to `channel`.
///
/// A payload of at most [`MAX_CHUNK`] bytes produces exactly one chunk
/// (offset 0, length = total); larger payloads produce contiguous chunks
/// of `MAX_CHUNK` bytes with a shorter tail. All chunk bodies are slices
/// of the input `Bytes` and share its allocation.
pub fn chunk_payload(channel: u32, payload: Bytes) -> Vec<Chunk> {
    let total = payload.len() as u32;

    if payload.len() <= MAX_CHUNK {
        return vec![Chunk::new(ChunkHeader::single(channel, total), payload)];
    }

    let mut chunks = Vec::with_capacity(payload.len().div_ceil(MAX_CHUNK));
    let mut offset = 0usize;
    while offset < payload.len() {
        let len = MAX_CHUNK.min(payload.len() - offset);
        let header = ChunkHeader::new(channel, total, offset as u32, len as u32);
        chunks.push(Chunk::new(header, payload.slice(offset..offset + len)));
        offset += len;
    }
    chunks
}
