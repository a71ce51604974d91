//! Wire protocol: chunk headers, payload splitting, streaming decode and
//! per-channel reassembly.
//!
//! A payload addressed to a channel travels as one or more chunks, each a
//! 16-byte header followed by up to [`MAX_CHUNK`] body bytes. The decode
//! path is a two-stage pipeline per connection: [`ChunkDecoder`] turns the
//! byte stream into chunks, [`Reassembler`] turns chunks into complete
//! payloads.

mod decoder;
mod frame;
mod reassembly;
mod wire;

pub use decoder::ChunkDecoder;
pub use frame::{chunk_payload, Chunk};
pub use reassembly::Reassembler;
pub use wire::{ChunkHeader, CONTROL_CHANNEL, HEADER_SIZE, MAX_CHUNK};
