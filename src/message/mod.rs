//! Typed messages, headers, and wire-type identity.
//!
//! Every user-level message travels with a [`MessageHeader`] (originating
//! client label and wall-clock timestamp), serialized together with the
//! value as a [`Message`] envelope. The framing layer below never looks
//! inside.
//!
//! A type's on-wire identity is a stable textual hash computed by
//! [`digest`]; the [`WireType`] trait ties a Rust type to its identifier.
//! The router compares identifiers only, it never decodes payloads.

mod digest;
mod tensor;

use std::collections::HashMap;
use std::time::SystemTime;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

pub use digest::{canonical_form, digest, type_digest};
pub use tensor::{Array, Element, Tensor};

/// Header carried by every user-level message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageHeader {
    /// Label of the originating client.
    pub source: String,
    /// Wall-clock time at publish.
    pub timestamp: SystemTime,
}

impl MessageHeader {
    /// Create a header stamped with the current wall-clock time.
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            timestamp: SystemTime::now(),
        }
    }
}

/// Envelope delivered to typed subscribers.
#[derive(Debug, Clone, Deserialize)]
pub struct Message<T> {
    /// Originating client label and publish timestamp.
    pub header: MessageHeader,
    /// The decoded value.
    pub value: T,
}

/// Borrowing envelope used on the publish path; field names must match
/// [`Message`] so both sides agree on the map keys.
#[derive(Serialize)]
pub(crate) struct WireMessage<'a, T: Serialize> {
    pub header: &'a MessageHeader,
    pub value: &'a T,
}

/// A type with a stable on-wire identifier.
///
/// Built-in types fold their bare name; user types fold name plus ordered
/// fields (see [`type_digest`]).
pub trait WireType: Serialize + DeserializeOwned {
    /// The textual identifier naming this type on the wire.
    fn type_identifier() -> String;
}

macro_rules! builtin_wire_type {
    ($ty:ty, $name:literal) => {
        impl WireType for $ty {
            fn type_identifier() -> String {
                digest($name)
            }
        }
    };
}

builtin_wire_type!(i8, "int8");
builtin_wire_type!(i16, "int16");
builtin_wire_type!(i32, "int32");
builtin_wire_type!(i64, "int64");
builtin_wire_type!(u8, "uint8");
builtin_wire_type!(u16, "uint16");
builtin_wire_type!(u32, "uint32");
builtin_wire_type!(u64, "uint64");
builtin_wire_type!(f32, "float32");
builtin_wire_type!(f64, "float64");
builtin_wire_type!(bool, "bool");
builtin_wire_type!(String, "string");
builtin_wire_type!(SystemTime, "timestamp");
builtin_wire_type!(serde_bytes::ByteBuf, "bytes");
builtin_wire_type!(Array, "array");
builtin_wire_type!(Tensor, "tensor");

/// Ad-hoc string-to-string map for untyped key/value exchange.
pub type Dictionary = HashMap<String, String>;

impl WireType for Dictionary {
    fn type_identifier() -> String {
        // Dictionaries keep their literal name on the wire, not a digest;
        // the identifier predates the digest scheme.
        "dictionary".to_string()
    }
}
