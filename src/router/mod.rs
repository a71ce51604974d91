//! The router: accepts clients, serves the control channel, fans data out.
//!
//! One router process owns the [`Directory`] and every client connection.
//! All state lives on the loop thread behind a single `Rc<RefCell>`; the
//! accept loop, per-connection pumps and writer tasks are handlers on the
//! same [`IoLoop`](crate::io_loop::IoLoop).
//!
//! Per-client control state machine:
//!
//! ```text
//! await-handshake ──handshake──► active ──peer EOF──► draining ──► closed
//! ```
//!
//! In `await-handshake` only the peer-label handshake is accepted; a data
//! frame or any other control kind terminates the connection. In `active`,
//! directory failures are answered with structured errors on the control
//! channel and never terminate the connection; framing and I/O errors
//! terminate only the offending connection.

mod directory;

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use bytes::Bytes;

use crate::backpressure::{Budget, OverflowPolicy};
use crate::connection::{writer_loop, ConnectionState, InboundPump, OutboundQueue};
use crate::control::{ControlErrorCode, ControlMessage};
use crate::error::{Result, RoutioError};
use crate::io_loop::{IoLoop, LoopHandle};
use crate::protocol::{chunk_payload, CONTROL_CHANNEL};
use crate::transport::{Endpoint, Listener, Stream};

pub use directory::{Channel, ConnId, Directory, Role, SubscribeOptions};

/// Router tunables.
#[derive(Debug, Clone)]
pub struct RouterConfig {
    /// Per-subscriber outbound high-water mark in bytes.
    pub high_water_bytes: usize,
    /// Label the router presents in handshakes.
    pub label: String,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            high_water_bytes: crate::backpressure::DEFAULT_HIGH_WATER_BYTES,
            label: "routio-router".to_string(),
        }
    }
}

/// Snapshot of router counters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RouterStats {
    /// Connections accepted since start.
    pub connections_accepted: u64,
    /// Connections currently registered.
    pub connections_active: usize,
    /// Live channels in the directory.
    pub channels: usize,
    /// Data payloads fanned out.
    pub messages_routed: u64,
    /// Payload bytes received.
    pub bytes_in: u64,
    /// Payload bytes queued outbound (before drops).
    pub bytes_out: u64,
    /// Chunks dropped for lossy subscribers.
    pub frames_dropped: u64,
    /// Slow subscribers disconnected.
    pub backpressure_disconnects: u64,
}

struct ClientConn {
    state: ConnectionState,
    label: Option<String>,
    queue: OutboundQueue,
    serve: Option<tokio::task::JoinHandle<()>>,
}

struct RouterState {
    config: RouterConfig,
    directory: Directory,
    conns: HashMap<ConnId, ClientConn>,
    next_conn: ConnId,
    stats: RouterStats,
}

type Shared = Rc<RefCell<RouterState>>;

/// A running router bound to an endpoint.
pub struct Router {
    state: Shared,
    accept_task: LoopHandle,
    endpoint: Endpoint,
}

impl Router {
    /// Bind to `endpoint` and register the accept loop on `io`.
    pub fn bind(io: &IoLoop, endpoint: &Endpoint) -> Result<Self> {
        Self::bind_with(io, endpoint, RouterConfig::default())
    }

    /// Bind with explicit configuration.
    pub fn bind_with(io: &IoLoop, endpoint: &Endpoint, config: RouterConfig) -> Result<Self> {
        let listener = io.block_on(Listener::bind(endpoint))?;
        let endpoint = listener.local_endpoint()?;
        tracing::info!(%endpoint, "router listening");

        let state = Rc::new(RefCell::new(RouterState {
            config,
            directory: Directory::new(),
            conns: HashMap::new(),
            next_conn: 1,
            stats: RouterStats::default(),
        }));

        let accept_task = io.add_handler(accept_loop(listener, state.clone()));

        Ok(Self {
            state,
            accept_task,
            endpoint,
        })
    }

    /// The endpoint the router is listening on (with the actual port for
    /// ephemeral TCP binds).
    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Snapshot of the router's counters.
    pub fn statistics(&self) -> RouterStats {
        let state = self.state.borrow();
        let mut stats = state.stats.clone();
        stats.connections_active = state.conns.len();
        stats.channels = state.directory.channel_count();
        stats
    }

    /// Log the counter snapshot at info level.
    pub fn log_statistics(&self) {
        let s = self.statistics();
        tracing::info!(
            connections = s.connections_active,
            channels = s.channels,
            routed = s.messages_routed,
            bytes_in = s.bytes_in,
            bytes_out = s.bytes_out,
            dropped = s.frames_dropped,
            slow_disconnects = s.backpressure_disconnects,
            "router statistics"
        );
    }

    /// Stop accepting new clients. Existing connections drain as usual.
    pub fn shutdown(&self, io: &IoLoop) {
        io.remove_handler(&self.accept_task);
        let state = self.state.borrow();
        for conn in state.conns.values() {
            conn.queue.close();
        }
    }
}

async fn accept_loop(listener: Listener, state: Shared) {
    loop {
        match listener.accept().await {
            Ok(stream) => register_connection(stream, &state),
            Err(e) => {
                tracing::warn!(error = %e, "accept failed");
            }
        }
    }
}

fn register_connection(stream: Stream, state: &Shared) {
    let (reader, writer) = stream.into_split();

    let (id, queue) = {
        let mut st = state.borrow_mut();
        let id = st.next_conn;
        st.next_conn += 1;
        st.stats.connections_accepted += 1;

        let queue = OutboundQueue::new(Budget::new(st.config.high_water_bytes));
        st.conns.insert(
            id,
            ClientConn {
                state: ConnectionState::Connecting,
                label: None,
                queue: queue.clone(),
                serve: None,
            },
        );
        (id, queue)
    };

    tokio::task::spawn_local(writer_loop(queue, writer));

    let serve = tokio::task::spawn_local(serve_connection(id, InboundPump::new(reader), state.clone()));
    if let Some(conn) = state.borrow_mut().conns.get_mut(&id) {
        conn.serve = Some(serve);
    }

    tracing::debug!(conn = id, "connection accepted");
}

async fn serve_connection(id: ConnId, pump: InboundPump, state: Shared) {
    let result = pump
        .run(|channel, payload| handle_payload(id, channel, payload, &state))
        .await;

    match result {
        Ok(()) => {
            tracing::debug!(conn = id, "peer closed, draining");
            drop_connection(&state, id, false);
        }
        Err(RoutioError::ConnectionClosed) => {
            // Connection already torn down (e.g. self backpressure).
        }
        Err(e) => {
            tracing::warn!(conn = id, error = %e, "connection terminated");
            drop_connection(&state, id, true);
        }
    }
}

/// Remove a connection from the directory and connection table.
///
/// `abort` discards its outbound queue; otherwise queued frames drain
/// before the socket shuts down.
fn drop_connection(state: &Shared, id: ConnId, abort: bool) {
    let mut st = state.borrow_mut();
    let Some(conn) = st.conns.remove(&id) else {
        return;
    };

    if abort {
        conn.queue.abort();
    } else {
        conn.queue.close();
    }
    st.directory.drop_connection(id);

    tracing::debug!(conn = id, label = conn.label.as_deref().unwrap_or(""), "connection dropped");
}

fn handle_payload(id: ConnId, channel: u32, payload: Bytes, state: &Shared) -> Result<()> {
    let conn_state = {
        let st = state.borrow();
        match st.conns.get(&id) {
            Some(conn) => conn.state,
            // Torn down mid-callback (self backpressure); stop the pump.
            None => return Err(RoutioError::ConnectionClosed),
        }
    };

    match conn_state {
        ConnectionState::Connecting => handle_handshake(id, channel, payload, state),
        ConnectionState::Ready => {
            if channel == CONTROL_CHANNEL {
                handle_control(id, payload, state);
                Ok(())
            } else {
                dispatch_data(id, channel, payload, state);
                Ok(())
            }
        }
        ConnectionState::Draining | ConnectionState::Closed => Err(RoutioError::ConnectionClosed),
    }
}

fn handle_handshake(id: ConnId, channel: u32, payload: Bytes, state: &Shared) -> Result<()> {
    if channel != CONTROL_CHANNEL {
        return Err(RoutioError::Protocol(format!(
            "data frame on channel {channel} before handshake"
        )));
    }

    let label = match ControlMessage::decode(&payload) {
        Ok(ControlMessage::Handshake { label }) => label,
        Ok(other) => {
            return Err(RoutioError::Protocol(format!(
                "expected handshake, got {other:?}"
            )));
        }
        Err(e) => return Err(RoutioError::Protocol(format!("bad handshake: {e}"))),
    };

    let mut st = state.borrow_mut();
    let router_label = st.config.label.clone();
    let Some(conn) = st.conns.get_mut(&id) else {
        return Err(RoutioError::ConnectionClosed);
    };
    conn.label = Some(label.clone());
    conn.state = ConnectionState::Ready;
    let queue = conn.queue.clone();
    drop(st);

    tracing::info!(conn = id, label = %label, "client ready");
    send_control(&queue, &ControlMessage::Handshake { label: router_label })
}

fn handle_control(id: ConnId, payload: Bytes, state: &Shared) {
    let msg = match ControlMessage::decode(&payload) {
        Ok(msg) => msg,
        Err(e) => {
            tracing::warn!(conn = id, error = %e, "undecodable control message");
            reply_error(id, state, ControlErrorCode::Protocol, "", &e.to_string());
            return;
        }
    };

    match msg {
        ControlMessage::Subscribe {
            alias,
            type_id,
            loopback,
            lossy,
        } => {
            let options = SubscribeOptions { loopback, lossy };
            declare(id, state, &alias, &type_id, Role::Subscriber, options);
        }
        ControlMessage::Announce { alias, type_id } => {
            declare(id, state, &alias, &type_id, Role::Publisher, SubscribeOptions::default());
        }
        ControlMessage::Unsubscribe { alias } => {
            let mut st = state.borrow_mut();
            if let Some(number) = st.directory.resolve_alias(id, &alias) {
                st.directory.unsubscribe(id, number);
                tracing::debug!(conn = id, alias = %alias, number, "unsubscribed");
            } else {
                tracing::debug!(conn = id, alias = %alias, "unsubscribe for unknown alias");
            }
        }
        ControlMessage::Lookup { alias } => {
            let reply = {
                let st = state.borrow();
                match st.directory.lookup(&alias) {
                    Some((number, type_id)) => ControlMessage::ChannelInfo {
                        alias: alias.clone(),
                        channel: Some(number),
                        type_id: Some(type_id.to_string()),
                    },
                    None => ControlMessage::ChannelInfo {
                        alias: alias.clone(),
                        channel: None,
                        type_id: None,
                    },
                }
            };
            reply_to(id, state, &reply);
        }
        ControlMessage::Ping => {
            reply_to(id, state, &ControlMessage::Pong);
        }
        other => {
            // Replies and repeated handshakes are reported, never fatal.
            tracing::warn!(conn = id, msg = ?other, "unexpected control kind");
            reply_error(
                id,
                state,
                ControlErrorCode::Protocol,
                "",
                "unexpected control kind",
            );
        }
    }
}

fn declare(
    id: ConnId,
    state: &Shared,
    alias: &str,
    type_id: &str,
    role: Role,
    options: SubscribeOptions,
) {
    let outcome = {
        let mut st = state.borrow_mut();
        st.directory.declare(id, alias, type_id, role, options)
    };

    match outcome {
        Ok(number) => {
            // A successful declare implies the type matched the channel's.
            reply_to(
                id,
                state,
                &ControlMessage::ChannelAssigned {
                    alias: alias.to_string(),
                    channel: number,
                    type_id: type_id.to_string(),
                },
            );
        }
        Err(e) => {
            tracing::debug!(conn = id, alias, error = %e, "declaration rejected");
            let code = match e {
                RoutioError::TypeMismatch { .. } => ControlErrorCode::TypeMismatch,
                _ => ControlErrorCode::Protocol,
            };
            reply_error(id, state, code, alias, &e.to_string());
        }
    }
}

fn dispatch_data(id: ConnId, channel: u32, payload: Bytes, state: &Shared) {
    let targets: Vec<(ConnId, SubscribeOptions, OutboundQueue)> = {
        let mut st = state.borrow_mut();
        st.stats.bytes_in += payload.len() as u64;

        let members = match st
            .directory
            .subscribers(channel)
            .map(|iter| iter.collect::<Vec<_>>())
        {
            Ok(members) => members,
            Err(_) => {
                drop(st);
                tracing::debug!(conn = id, channel, "data for unknown channel");
                reply_error(
                    id,
                    state,
                    ControlErrorCode::UnknownChannel,
                    "",
                    &format!("unknown channel {channel}"),
                );
                return;
            }
        };
        st.stats.messages_routed += 1;

        members
            .into_iter()
            .filter_map(|(conn_id, opts)| {
                st.conns
                    .get(&conn_id)
                    .map(|c| (conn_id, opts, c.queue.clone()))
            })
            .collect()
    };

    let chunks = chunk_payload(channel, payload);
    let mut slow = Vec::new();

    for (target, opts, queue) in targets {
        if target == id && !opts.loopback {
            continue;
        }

        let policy = if opts.lossy {
            OverflowPolicy::DropOldest
        } else {
            OverflowPolicy::Disconnect
        };

        let dropped_before = queue.dropped_frames();
        match queue.push_data(&chunks, policy) {
            Ok(()) => {
                let mut st = state.borrow_mut();
                st.stats.bytes_out += chunks.iter().map(|c| c.body.len() as u64).sum::<u64>();
                st.stats.frames_dropped += queue.dropped_frames() - dropped_before;
            }
            Err(RoutioError::Backpressure { pending, limit }) => {
                tracing::warn!(
                    conn = target,
                    channel,
                    pending,
                    limit,
                    "slow subscriber over high-water mark, disconnecting"
                );
                slow.push(target);
            }
            Err(_) => {
                // Target already draining; its membership goes with it.
            }
        }
    }

    for target in slow {
        let serve = {
            let mut st = state.borrow_mut();
            st.stats.backpressure_disconnects += 1;
            st.conns.get_mut(&target).and_then(|c| c.serve.take())
        };
        drop_connection(state, target, true);
        if let Some(handle) = serve {
            handle.abort();
        }
    }
}

fn reply_to(id: ConnId, state: &Shared, msg: &ControlMessage) {
    let queue = {
        let st = state.borrow();
        st.conns.get(&id).map(|c| c.queue.clone())
    };
    if let Some(queue) = queue {
        if let Err(e) = send_control(&queue, msg) {
            tracing::debug!(conn = id, error = %e, "control reply failed");
        }
    }
}

fn reply_error(id: ConnId, state: &Shared, code: ControlErrorCode, alias: &str, reason: &str) {
    reply_to(
        id,
        state,
        &ControlMessage::Error {
            code,
            alias: alias.to_string(),
            reason: reason.to_string(),
        },
    );
}

fn send_control(queue: &OutboundQueue, msg: &ControlMessage) -> Result<()> {
    let bytes = msg.encode()?;
    let chunks = chunk_payload(CONTROL_CHANNEL, bytes.into());
    queue.push_control(&chunks)
}
