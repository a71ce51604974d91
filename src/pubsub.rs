//! Typed publishers and subscribers.
//!
//! [`TypedPublisher`] and [`TypedSubscriber`] bind an alias to a
//! [`WireType`] and take care of the envelope: every published value is
//! wrapped in a [`MessageHeader`] carrying the client label and a
//! wall-clock timestamp, and subscribers receive the decoded
//! [`Message`] on the loop thread.
//!
//! # Example
//!
//! ```ignore
//! let publisher = TypedPublisher::<i32>::new(&client, "tick")?;
//! publisher.send(&1)?;
//!
//! let _subscriber = TypedSubscriber::<i32>::new(&client, "tick", |m| {
//!     println!("{} from {}", m.value, m.header.source);
//! })?;
//! ```

use std::marker::PhantomData;

use crate::client::Client;
use crate::codec::PayloadCodec;
use crate::error::Result;
use crate::message::{Message, MessageHeader, WireMessage, WireType};

/// Options for a subscription.
#[derive(Debug, Clone, Copy, Default)]
pub struct SubscriberOptions {
    /// Receive this client's own publishes on the same alias.
    pub loopback: bool,
    /// Prefer dropped frames over disconnection when falling behind.
    pub lossy: bool,
}

/// Publishing end of a typed channel.
///
/// Holds a clone of its [`Client`], so a publisher can be moved into a
/// subscriber callback and used there.
pub struct TypedPublisher<T: WireType> {
    client: Client,
    alias: String,
    source: String,
    _marker: PhantomData<fn(&T)>,
}

impl<T: WireType> TypedPublisher<T> {
    /// Declare publish intent for `alias` with `T`'s type identifier.
    ///
    /// Fails immediately if this client already uses the alias with a
    /// different type; a conflict with another client's declaration
    /// arrives later via [`Client::on_error`].
    pub fn new(client: &Client, alias: &str) -> Result<Self> {
        client.declare_publisher(alias, &T::type_identifier())?;
        Ok(Self {
            client: client.clone(),
            alias: alias.to_string(),
            source: client.source_label(),
            _marker: PhantomData,
        })
    }

    /// Serialize `value` with a fresh header and queue it for the router.
    ///
    /// Values sent before the router assigns a channel number are queued
    /// locally and flushed in order. If the router rejects the
    /// declaration instead, queued values are discarded and subsequent
    /// sends return an error.
    pub fn send(&self, value: &T) -> Result<()> {
        let header = MessageHeader::new(self.source.clone());
        let wire = WireMessage {
            header: &header,
            value,
        };
        let payload = PayloadCodec::encode(&wire)?;
        self.client.publish_payload(&self.alias, payload.into())
    }

    /// The alias this publisher writes to.
    pub fn alias(&self) -> &str {
        &self.alias
    }
}

/// Subscribing end of a typed channel.
///
/// The callback runs on the loop thread; it may publish, but must not
/// create publishers or subscribers.
pub struct TypedSubscriber<T: WireType> {
    client: Client,
    alias: String,
    _marker: PhantomData<fn(T)>,
}

impl<T: WireType + 'static> TypedSubscriber<T> {
    /// Subscribe to `alias` with default options.
    pub fn new<F>(client: &Client, alias: &str, callback: F) -> Result<Self>
    where
        F: FnMut(Message<T>) + 'static,
    {
        Self::with_options(client, alias, SubscriberOptions::default(), callback)
    }

    /// Subscribe with explicit options.
    pub fn with_options<F>(
        client: &Client,
        alias: &str,
        options: SubscriberOptions,
        mut callback: F,
    ) -> Result<Self>
    where
        F: FnMut(Message<T>) + 'static,
    {
        let decode_alias = alias.to_string();
        let handler = Box::new(move |payload: bytes::Bytes| {
            match PayloadCodec::decode::<Message<T>>(&payload) {
                Ok(message) => callback(message),
                Err(e) => {
                    tracing::warn!(alias = %decode_alias, error = %e, "payload failed to decode");
                }
            }
        });

        client.declare_subscriber(
            alias,
            &T::type_identifier(),
            options.loopback,
            options.lossy,
            handler,
        )?;

        Ok(Self {
            client: client.clone(),
            alias: alias.to_string(),
            _marker: PhantomData,
        })
    }

    /// Withdraw the subscription. In-flight deliveries already decoded
    /// may still invoke the callback once.
    pub fn unsubscribe(self) -> Result<()> {
        self.client.withdraw_subscriber(&self.alias)
    }

    /// The alias this subscriber listens on.
    pub fn alias(&self) -> &str {
        &self.alias
    }
}
