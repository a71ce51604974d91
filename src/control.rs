//! Control-channel payloads.
//!
//! Channel 0 is reserved; its payloads are [`ControlMessage`] values
//! serialized through the same MessagePack framework as user data, each
//! carrying a `kind` tag followed by kind-specific fields. Requests flow
//! client → router; [`ControlMessage::ChannelAssigned`],
//! [`ControlMessage::ChannelInfo`], [`ControlMessage::Error`] and
//! [`ControlMessage::Pong`] flow back.

use serde::{Deserialize, Serialize};

use crate::codec::PayloadCodec;
use crate::error::Result;

/// Structured error codes carried in control-channel error replies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlErrorCode {
    /// Declaration conflicted with the channel's established type.
    TypeMismatch,
    /// Data frame named a channel the directory does not know.
    UnknownChannel,
    /// Malformed or unexpected control traffic.
    Protocol,
}

/// A message on the reserved control channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ControlMessage {
    /// Peer label exchange; first message in both directions.
    Handshake {
        /// The peer's label.
        label: String,
    },

    /// Declare a subscription to an alias.
    Subscribe {
        /// Client-local channel name.
        alias: String,
        /// Type identifier the subscriber expects.
        type_id: String,
        /// Deliver the client's own publishes back to it.
        loopback: bool,
        /// Opt into oldest-first drops instead of disconnection under
        /// backpressure.
        lossy: bool,
    },

    /// Withdraw a subscription.
    Unsubscribe {
        /// Client-local channel name.
        alias: String,
    },

    /// Declare publish intent on an alias.
    Announce {
        /// Client-local channel name.
        alias: String,
        /// Type identifier the publisher will send.
        type_id: String,
    },

    /// Ask the router what an alias resolves to.
    Lookup {
        /// Client-local channel name.
        alias: String,
    },

    /// Liveness probe.
    Ping,

    /// Reply: an alias is bound to a channel number.
    ChannelAssigned {
        /// The alias that was declared.
        alias: String,
        /// Assigned channel number.
        channel: u32,
        /// The channel's established type identifier.
        type_id: String,
    },

    /// Reply to [`ControlMessage::Lookup`].
    ChannelInfo {
        /// The alias that was looked up.
        alias: String,
        /// Channel number, if the alias is known.
        channel: Option<u32>,
        /// Established type identifier, if the alias is known.
        type_id: Option<String>,
    },

    /// Reply: a directory operation failed. The connection stays up.
    Error {
        /// Structured error code.
        code: ControlErrorCode,
        /// Alias the failed operation named (empty when not applicable).
        alias: String,
        /// Short textual reason.
        reason: String,
    },

    /// Reply to [`ControlMessage::Ping`].
    Pong,
}

impl ControlMessage {
    /// Serialize for the wire.
    pub fn encode(&self) -> Result<Vec<u8>> {
        PayloadCodec::encode(self)
    }

    /// Deserialize from a control-channel payload.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        PayloadCodec::decode(bytes)
    }
}
