//! Error types for routio.

use thiserror::Error;

/// Main error type for all routio operations.
#[derive(Debug, Error)]
pub enum RoutioError {
    /// I/O error during socket operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// MsgPack serialization error.
    #[error("encode error: {0}")]
    Encode(#[from] rmp_serde::encode::Error),

    /// MsgPack deserialization error.
    #[error("decode error: {0}")]
    Decode(#[from] rmp_serde::decode::Error),

    /// Malformed chunk framing; terminates the offending connection.
    #[error("framing error: {0}")]
    Framing(String),

    /// A declaration conflicted with a channel's established type.
    #[error("type mismatch on \"{alias}\": channel is {declared}, requested {offered}")]
    TypeMismatch {
        /// Channel alias the declaration named.
        alias: String,
        /// Type identifier already bound to the channel.
        declared: String,
        /// Type identifier the rejected declaration carried.
        offered: String,
    },

    /// A data frame named a channel the directory does not know.
    #[error("unknown channel: {0}")]
    UnknownChannel(u32),

    /// Malformed or unexpected control traffic; reported, not fatal.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// A subscriber's outbound queue exceeded its high-water mark.
    #[error("subscriber over high-water mark ({pending} of {limit} bytes)")]
    Backpressure {
        /// Bytes queued at the time of the violation.
        pending: usize,
        /// Configured high-water mark.
        limit: usize,
    },

    /// Connection closed while an operation was in flight.
    #[error("connection closed")]
    ConnectionClosed,

    /// Endpoint string could not be understood.
    #[error("invalid endpoint: {0}")]
    InvalidEndpoint(String),

    /// Message description failed to parse.
    #[error(transparent)]
    Parse(#[from] crate::generator::ParseError),
}

/// Result type alias using RoutioError.
pub type Result<T> = std::result::Result<T, RoutioError>;
