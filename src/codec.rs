//! Payload serialization for control messages and message envelopes.
//!
//! Structs are encoded as MessagePack maps (`to_vec_named`), never as
//! positional arrays, so the Python binding and generated readers address
//! fields by name.

use crate::error::Result;

/// MessagePack codec for structured payloads.
pub struct PayloadCodec;

impl PayloadCodec {
    /// Encode a value to MsgPack bytes (struct-as-map format).
    ///
    /// # Errors
    ///
    /// Returns an error if the value cannot be serialized.
    #[inline]
    pub fn encode<T: serde::Serialize>(value: &T) -> Result<Vec<u8>> {
        Ok(rmp_serde::to_vec_named(value)?)
    }

    /// Decode MsgPack bytes to a value.
    ///
    /// # Errors
    ///
    /// Returns an error if the bytes cannot be deserialized to type T.
    #[inline]
    pub fn decode<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> Result<T> {
        Ok(rmp_serde::from_slice(bytes)?)
    }
}
