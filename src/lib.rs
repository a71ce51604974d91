//! # routio
//!
//! Interprocess message routing for embedded vision and robotics
//! workloads on POSIX hosts.
//!
//! A central router process mediates named, typed publish/subscribe
//! channels between local clients connected over a UNIX-domain or TCP
//! stream socket. The wire is a length-delimited chunked frame format;
//! payloads are typed messages whose on-wire identity is a stable
//! textual hash.
//!
//! ## Architecture
//!
//! - **Router** ([`router::Router`]): owns the channel directory,
//!   accepts clients, serves control traffic on channel 0, fans data out
//!   to subscribers.
//! - **Client** ([`client::Client`], [`pubsub`]): connects, declares
//!   typed publishers and subscribers, dispatches decoded values to
//!   callbacks on the loop thread.
//! - **Loop** ([`io_loop::IoLoop`]): one cooperative thread per process;
//!   the only suspension point is `wait`.
//! - **Compiler** ([`generator`]): the message description language
//!   behind the `gen` binary.
//!
//! ## Example
//!
//! ```ignore
//! use std::time::Duration;
//! use routio::{Endpoint, IoLoop, Client, TypedPublisher};
//!
//! let io = IoLoop::new()?;
//! let client = Client::connect(&io, &Endpoint::unix("/tmp/r.sock"), "ticker")?;
//! let ticks = TypedPublisher::<i32>::new(&client, "tick")?;
//!
//! let mut n = 0;
//! while io.wait(Duration::from_millis(100)) {
//!     ticks.send(&n)?;
//!     n += 1;
//! }
//! ```

pub mod backpressure;
pub mod client;
pub mod codec;
pub mod connection;
pub mod control;
pub mod error;
pub mod generator;
pub mod io_loop;
pub mod message;
pub mod protocol;
pub mod pubsub;
pub mod router;
pub mod transport;

pub use client::Client;
pub use error::{Result, RoutioError};
pub use io_loop::IoLoop;
pub use message::{Message, MessageHeader, WireType};
pub use pubsub::{SubscriberOptions, TypedPublisher, TypedSubscriber};
pub use router::Router;
pub use transport::Endpoint;

/// Create a loop and a connected client in one call.
///
/// A convenience for small tools; both halves are returned explicitly so
/// nothing hides the loop.
pub fn connect(endpoint: &Endpoint, label: &str) -> Result<(IoLoop, Client)> {
    let io = IoLoop::new()?;
    let client = Client::connect(&io, endpoint, label)?;
    Ok((io, client))
}
