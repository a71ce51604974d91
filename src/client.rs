//! Client runtime: the application-side dual of the router.
//!
//! A [`Client`] connects to a router endpoint, performs the label
//! handshake, and then serves two jobs on its [`IoLoop`]:
//!
//! - outbound: typed publishers serialize values and queue frames;
//! - inbound: a pump decodes payloads and dispatches them to the
//!   subscriber registered for their channel.
//!
//! All callbacks run on the loop thread during
//! [`IoLoop::wait`](crate::io_loop::IoLoop::wait). Sending from inside a
//! callback is allowed; creating publishers or subscribers from inside a
//! callback is not supported.
//!
//! Channel numbers are assigned by the router asynchronously: declares go
//! out immediately, and values published before the assignment arrives
//! are queued client-side and flushed FIFO on assignment, preserving
//! publish order.

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::rc::Rc;

use bytes::Bytes;

use crate::backpressure::{Budget, OverflowPolicy};
use crate::connection::{writer_loop, InboundPump, OutboundQueue};
use crate::control::{ControlErrorCode, ControlMessage};
use crate::error::{Result, RoutioError};
use crate::io_loop::IoLoop;
use crate::protocol::{chunk_payload, CONTROL_CHANNEL};
use crate::transport::{Endpoint, Stream};

/// Handler invoked with the raw payload of one channel.
pub(crate) type DataHandler = Box<dyn FnMut(Bytes)>;

/// Callback invoked with directory errors reported on the control
/// channel.
pub type ErrorHandler = Box<dyn FnMut(ControlErrorCode, &str, &str)>;

/// Callback invoked with the result of a [`Client::lookup`].
pub type LookupHandler = Box<dyn FnOnce(Option<(u32, String)>)>;

#[derive(Clone)]
struct AliasEntry {
    channel: Option<u32>,
    type_id: String,
    /// This client declared publish intent on the alias.
    publisher: bool,
    /// This client holds a subscription on the alias.
    subscriber: bool,
}

pub(crate) struct ClientShared {
    label: String,
    connected: bool,
    aliases: HashMap<String, AliasEntry>,
    handlers: HashMap<u32, Rc<RefCell<DataHandler>>>,
    pending_handlers: HashMap<String, Rc<RefCell<DataHandler>>>,
    pending_sends: HashMap<String, VecDeque<Bytes>>,
    lookups: HashMap<String, Vec<LookupHandler>>,
    on_error: Option<ErrorHandler>,
}

/// A connected routio client.
///
/// Cheaply clonable: clones share the same connection and state, so a
/// handle can be moved into subscriber callbacks for publishing.
#[derive(Clone)]
pub struct Client {
    shared: Rc<RefCell<ClientShared>>,
    queue: OutboundQueue,
    label: String,
}

impl Client {
    /// Connect to a router, perform the handshake, and register the
    /// connection's pump and writer on `io`.
    ///
    /// Blocks (driving the loop) until the router's handshake reply
    /// arrives.
    pub fn connect(io: &IoLoop, endpoint: &Endpoint, label: &str) -> Result<Self> {
        let stopper = io.stopper();

        let (pump, queue, router_label) = io.block_on(async {
            let stream = Stream::connect(endpoint).await?;
            let (reader, writer) = stream.into_split();

            // The client's own outbound queue is unbounded; backpressure
            // policy lives router-side.
            let queue = OutboundQueue::new(Budget::new(usize::MAX));
            tokio::task::spawn_local(writer_loop(queue.clone(), writer));

            let hello = ControlMessage::Handshake {
                label: label.to_string(),
            };
            queue.push_control(&chunk_payload(CONTROL_CHANNEL, hello.encode()?.into()))?;

            let mut pump = InboundPump::new(reader);
            let (channel, payload) = pump
                .next_payload()
                .await?
                .ok_or(RoutioError::ConnectionClosed)?;
            if channel != CONTROL_CHANNEL {
                return Err(RoutioError::Protocol(format!(
                    "expected handshake reply on control channel, got channel {channel}"
                )));
            }
            let router_label = match ControlMessage::decode(&payload)? {
                ControlMessage::Handshake { label } => label,
                other => {
                    return Err(RoutioError::Protocol(format!(
                        "expected handshake reply, got {other:?}"
                    )));
                }
            };

            Ok::<_, RoutioError>((pump, queue, router_label))
        })?;

        tracing::debug!(label, router = %router_label, "connected");

        let shared = Rc::new(RefCell::new(ClientShared {
            label: label.to_string(),
            connected: true,
            aliases: HashMap::new(),
            handlers: HashMap::new(),
            pending_handlers: HashMap::new(),
            pending_sends: HashMap::new(),
            lookups: HashMap::new(),
            on_error: None,
        }));

        let pump_shared = shared.clone();
        let pump_queue = queue.clone();
        io.add_handler(async move {
            let result = pump
                .run(|channel, payload| {
                    dispatch(&pump_shared, &pump_queue, channel, payload);
                    Ok(())
                })
                .await;

            if let Err(ref e) = result {
                tracing::warn!(error = %e, "connection to router lost");
            }
            // `connected` already false means a deliberate local
            // disconnect; only an unexpected loss terminates the loop
            // (wait() then returns false, like a termination signal).
            let unexpected = {
                let mut st = pump_shared.borrow_mut();
                std::mem::replace(&mut st.connected, false)
            };
            pump_queue.abort();
            if unexpected {
                stopper.stop();
            }
        });

        Ok(Self {
            shared,
            queue,
            label: label.to_string(),
        })
    }

    /// The label this client presented in its handshake.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// True while the router connection is up.
    pub fn is_connected(&self) -> bool {
        self.shared.borrow().connected
    }

    /// Register a callback for directory errors reported on the control
    /// channel (type mismatches, unknown channels, protocol issues).
    pub fn on_error<F>(&self, callback: F)
    where
        F: FnMut(ControlErrorCode, &str, &str) + 'static,
    {
        self.shared.borrow_mut().on_error = Some(Box::new(callback));
    }

    /// Ask the router what `alias` resolves to; `callback` runs on the
    /// loop thread with `Some((channel, type_id))` or `None`.
    pub fn lookup<F>(&self, alias: &str, callback: F) -> Result<()>
    where
        F: FnOnce(Option<(u32, String)>) + 'static,
    {
        self.shared
            .borrow_mut()
            .lookups
            .entry(alias.to_string())
            .or_default()
            .push(Box::new(callback));
        self.send_control(&ControlMessage::Lookup {
            alias: alias.to_string(),
        })
    }

    /// Send a liveness probe.
    pub fn ping(&self) -> Result<()> {
        self.send_control(&ControlMessage::Ping)
    }

    /// Close the connection, dropping any unsent frames.
    pub fn disconnect(&self) {
        self.shared.borrow_mut().connected = false;
        self.queue.abort();
    }

    pub(crate) fn send_control(&self, msg: &ControlMessage) -> Result<()> {
        let bytes = msg.encode()?;
        self.queue
            .push_control(&chunk_payload(CONTROL_CHANNEL, bytes.into()))
    }

    /// Register a publisher declaration for `alias`; payloads published
    /// before the channel number arrives queue client-side.
    pub(crate) fn declare_publisher(&self, alias: &str, type_id: &str) -> Result<()> {
        self.register_alias(alias, type_id, true)?;
        self.send_control(&ControlMessage::Announce {
            alias: alias.to_string(),
            type_id: type_id.to_string(),
        })
    }

    /// Register a subscriber declaration and its payload handler.
    pub(crate) fn declare_subscriber(
        &self,
        alias: &str,
        type_id: &str,
        loopback: bool,
        lossy: bool,
        handler: DataHandler,
    ) -> Result<()> {
        self.register_alias(alias, type_id, false)?;
        {
            let mut st = self.shared.borrow_mut();
            // Bound already? Attach the handler to the known channel.
            if let Some(channel) = st.aliases.get(alias).and_then(|e| e.channel) {
                st.handlers.insert(channel, Rc::new(RefCell::new(handler)));
            } else {
                st.pending_handlers
                    .insert(alias.to_string(), Rc::new(RefCell::new(handler)));
            }
        }
        self.send_control(&ControlMessage::Subscribe {
            alias: alias.to_string(),
            type_id: type_id.to_string(),
            loopback,
            lossy,
        })
    }

    /// Withdraw a subscription and drop its handler.
    ///
    /// With no publisher left on the alias, the binding is forgotten
    /// entirely: the router may collect the channel, and a fresh number
    /// is assigned when the alias is declared again, so a resubscribe
    /// must go back through the pending path.
    pub(crate) fn withdraw_subscriber(&self, alias: &str) -> Result<()> {
        {
            let mut st = self.shared.borrow_mut();
            st.pending_handlers.remove(alias);

            let mut bound_channel = None;
            let mut drop_entry = false;
            if let Some(entry) = st.aliases.get_mut(alias) {
                entry.subscriber = false;
                bound_channel = entry.channel;
                drop_entry = !entry.publisher;
            }
            if let Some(channel) = bound_channel {
                st.handlers.remove(&channel);
            }
            if drop_entry {
                st.aliases.remove(alias);
            }
        }
        self.send_control(&ControlMessage::Unsubscribe {
            alias: alias.to_string(),
        })
    }

    /// Serialize-side publish: queue `payload` for `alias`, or hold it
    /// until the channel assignment arrives.
    ///
    /// Fails fast once the alias has no declaration left, which is how a
    /// router-rejected declaration surfaces on later sends.
    pub(crate) fn publish_payload(&self, alias: &str, payload: Bytes) -> Result<()> {
        if !self.shared.borrow().connected {
            return Err(RoutioError::ConnectionClosed);
        }

        let channel = {
            let st = self.shared.borrow();
            match st.aliases.get(alias) {
                Some(entry) => entry.channel,
                None => {
                    return Err(RoutioError::Protocol(format!(
                        "no active declaration for alias \"{alias}\""
                    )));
                }
            }
        };
        match channel {
            Some(number) => {
                let chunks = chunk_payload(number, payload);
                self.queue.push_data(&chunks, OverflowPolicy::Disconnect)
            }
            None => {
                self.shared
                    .borrow_mut()
                    .pending_sends
                    .entry(alias.to_string())
                    .or_default()
                    .push_back(payload);
                Ok(())
            }
        }
    }

    pub(crate) fn source_label(&self) -> String {
        self.label.clone()
    }

    /// Record (or re-check) the alias declaration and its role, keeping
    /// one declared type per alias on the client side too.
    fn register_alias(&self, alias: &str, type_id: &str, publisher: bool) -> Result<()> {
        let mut st = self.shared.borrow_mut();
        match st.aliases.get_mut(alias) {
            Some(entry) if entry.type_id != type_id => Err(RoutioError::TypeMismatch {
                alias: alias.to_string(),
                declared: entry.type_id.clone(),
                offered: type_id.to_string(),
            }),
            Some(entry) => {
                if publisher {
                    entry.publisher = true;
                } else {
                    entry.subscriber = true;
                }
                Ok(())
            }
            None => {
                st.aliases.insert(
                    alias.to_string(),
                    AliasEntry {
                        channel: None,
                        type_id: type_id.to_string(),
                        publisher,
                        subscriber: !publisher,
                    },
                );
                Ok(())
            }
        }
    }
}

/// Inbound dispatch, run on the loop thread by the pump task.
fn dispatch(shared: &Rc<RefCell<ClientShared>>, queue: &OutboundQueue, channel: u32, payload: Bytes) {
    if channel == CONTROL_CHANNEL {
        handle_control(shared, queue, payload);
        return;
    }

    // Clone the handler cell so the shared state is not borrowed while
    // the callback runs; callbacks may publish.
    let handler = shared.borrow().handlers.get(&channel).cloned();
    match handler {
        Some(cell) => {
            let mut handler = cell.borrow_mut();
            (*handler)(payload);
        }
        None => {
            tracing::trace!(channel, "payload for channel without subscriber");
        }
    }
}

fn handle_control(shared: &Rc<RefCell<ClientShared>>, queue: &OutboundQueue, payload: Bytes) {
    let msg = match ControlMessage::decode(&payload) {
        Ok(msg) => msg,
        Err(e) => {
            tracing::warn!(error = %e, "undecodable control reply");
            return;
        }
    };

    match msg {
        ControlMessage::ChannelAssigned {
            alias,
            channel,
            type_id,
        } => {
            let flush = {
                let mut st = shared.borrow_mut();
                match st.aliases.get_mut(&alias) {
                    Some(entry) => entry.channel = Some(channel),
                    None => {
                        st.aliases.insert(
                            alias.clone(),
                            AliasEntry {
                                channel: Some(channel),
                                type_id,
                                publisher: false,
                                subscriber: false,
                            },
                        );
                    }
                }
                if let Some(handler) = st.pending_handlers.remove(&alias) {
                    st.handlers.insert(channel, handler);
                }
                st.pending_sends.remove(&alias)
            };

            tracing::debug!(alias = %alias, channel, "channel assigned");

            // Flush FIFO anything published before the assignment.
            if let Some(backlog) = flush {
                for payload in backlog {
                    let chunks = chunk_payload(channel, payload);
                    if let Err(e) = queue.push_data(&chunks, OverflowPolicy::Disconnect) {
                        tracing::warn!(error = %e, "failed to flush queued publish");
                        break;
                    }
                }
            }
        }

        ControlMessage::ChannelInfo {
            alias,
            channel,
            type_id,
        } => {
            let callbacks = shared.borrow_mut().lookups.remove(&alias);
            let info = channel.zip(type_id);
            if let Some(callbacks) = callbacks {
                for callback in callbacks {
                    callback(info.clone());
                }
            }
        }

        ControlMessage::Error {
            code,
            alias,
            reason,
        } => {
            tracing::debug!(?code, alias = %alias, reason = %reason, "router reported error");
            // Drop the callback from the shared cell while it runs so an
            // error handler may call back into the client.
            let callback = shared.borrow_mut().on_error.take();
            if let Some(mut callback) = callback {
                callback(code, &alias, &reason);
                let mut st = shared.borrow_mut();
                if st.on_error.is_none() {
                    st.on_error = Some(callback);
                }
            }
            // A rejected declaration never gets a channel; drop
            // everything speculatively registered for the alias so later
            // publishes fail fast instead of queueing forever. A bound
            // alias is left alone; rejections only concern unbound ones.
            if !alias.is_empty() {
                let mut st = shared.borrow_mut();
                st.pending_sends.remove(&alias);
                st.pending_handlers.remove(&alias);
                let unbound = st
                    .aliases
                    .get(&alias)
                    .map(|entry| entry.channel.is_none())
                    .unwrap_or(false);
                if unbound {
                    st.aliases.remove(&alias);
                }
            }
        }

        ControlMessage::Pong => {
            tracing::trace!("pong");
        }

        other => {
            tracing::warn!(msg = ?other, "unexpected control kind from router");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connect_refused_without_router() {
        let io = IoLoop::new().unwrap();
        let endpoint = Endpoint::Unix(crate::transport::scratch_socket_path());
        assert!(Client::connect(&io, &endpoint, "lonely").is_err());
    }
}
