//! Per-socket connection plumbing.
//!
//! Bridges the chunk codec to the loop. Each connection owns:
//!
//! - an [`OutboundQueue`] of chunks drained by a dedicated writer task,
//!   with byte accounting against a [`Budget`];
//! - an [`InboundPump`] feeding the decoder and reassembler and handing
//!   complete payloads up.
//!
//! ```text
//! dispatch ──► OutboundQueue ──► writer task ──► socket
//! socket ──► InboundPump ──► ChunkDecoder ──► Reassembler ──► payload
//! ```
//!
//! Queued chunks keep their body as a `Bytes` slice of the published
//! payload, so fan-out to many subscribers shares one allocation; only
//! the 16-byte headers are materialized per queue.
//!
//! Lifecycle: peer EOF ends the pump; the writer keeps draining queued
//! frames ([`OutboundQueue::close`]) before shutting the socket down.
//! A local close ([`OutboundQueue::abort`]) drops the queue immediately.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use bytes::Bytes;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::Notify;

use crate::backpressure::{Budget, OverflowPolicy};
use crate::error::{Result, RoutioError};
use crate::protocol::{Chunk, ChunkDecoder, Reassembler};
use crate::transport::{ReadHalf, WriteHalf};

/// Connection lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Socket established, handshake not yet complete.
    Connecting,
    /// Handshake done; control and data accepted.
    Ready,
    /// Peer closed; outbound queue flushing.
    Draining,
    /// Collected.
    Closed,
}

/// Chunks the writer drains per wakeup before re-checking the queue.
const WRITE_BATCH: usize = 64;

struct QueueInner {
    chunks: VecDeque<Chunk>,
    queued_bytes: usize,
    dropped_frames: u64,
    /// No further pushes accepted; writer drains what is queued.
    closing: bool,
    /// Queue discarded; writer stops at once.
    aborted: bool,
}

/// Outbound chunk queue shared between dispatch and the writer task.
///
/// Single-threaded by construction (lives on the loop's `LocalSet`), so
/// plain `Rc<RefCell>` state suffices.
#[derive(Clone)]
pub struct OutboundQueue {
    inner: Rc<RefCell<QueueInner>>,
    notify: Rc<Notify>,
    budget: Budget,
}

impl OutboundQueue {
    /// Create a queue with the given budget.
    pub fn new(budget: Budget) -> Self {
        Self {
            inner: Rc::new(RefCell::new(QueueInner {
                chunks: VecDeque::new(),
                queued_bytes: 0,
                dropped_frames: 0,
                closing: false,
                aborted: false,
            })),
            notify: Rc::new(Notify::new()),
            budget,
        }
    }

    /// Queue the chunks of one data payload under the given overflow
    /// policy.
    ///
    /// With [`OverflowPolicy::DropOldest`] the oldest pending chunks are
    /// discarded until the new ones fit; with
    /// [`OverflowPolicy::Disconnect`] the push fails and the caller must
    /// tear the connection down.
    pub fn push_data(&self, chunks: &[Chunk], policy: OverflowPolicy) -> Result<()> {
        let added: usize = chunks.iter().map(Chunk::wire_size).sum();
        let mut inner = self.inner.borrow_mut();

        if inner.closing || inner.aborted {
            return Err(RoutioError::ConnectionClosed);
        }

        if inner.queued_bytes + added > self.budget.high_water {
            match policy {
                OverflowPolicy::Disconnect => {
                    return Err(RoutioError::Backpressure {
                        pending: inner.queued_bytes + added,
                        limit: self.budget.high_water,
                    });
                }
                OverflowPolicy::DropOldest => {
                    while inner.queued_bytes + added > self.budget.high_water {
                        match inner.chunks.pop_front() {
                            Some(old) => {
                                inner.queued_bytes -= old.wire_size();
                                inner.dropped_frames += 1;
                            }
                            None => break,
                        }
                    }
                }
            }
        }

        for chunk in chunks {
            inner.queued_bytes += chunk.wire_size();
            inner.chunks.push_back(chunk.clone());
        }
        drop(inner);

        self.notify.notify_one();
        Ok(())
    }

    /// Queue chunks under the queue's default policy.
    pub fn push_chunks(&self, chunks: &[Chunk]) -> Result<()> {
        self.push_data(chunks, self.budget.policy)
    }

    /// Queue control chunks, bypassing the budget.
    ///
    /// Control replies are small and must not be dropped by a lossy data
    /// policy.
    pub fn push_control(&self, chunks: &[Chunk]) -> Result<()> {
        let mut inner = self.inner.borrow_mut();
        if inner.closing || inner.aborted {
            return Err(RoutioError::ConnectionClosed);
        }
        for chunk in chunks {
            inner.queued_bytes += chunk.wire_size();
            inner.chunks.push_back(chunk.clone());
        }
        drop(inner);

        self.notify.notify_one();
        Ok(())
    }

    /// Bytes currently queued (headers included).
    pub fn queued_bytes(&self) -> usize {
        self.inner.borrow().queued_bytes
    }

    /// Chunks discarded by the lossy policy so far.
    pub fn dropped_frames(&self) -> u64 {
        self.inner.borrow().dropped_frames
    }

    /// Stop accepting frames; the writer drains the queue, then shuts the
    /// socket down.
    pub fn close(&self) {
        self.inner.borrow_mut().closing = true;
        self.notify.notify_one();
    }

    /// Discard the queue and stop the writer immediately.
    pub fn abort(&self) {
        let mut inner = self.inner.borrow_mut();
        inner.aborted = true;
        inner.chunks.clear();
        inner.queued_bytes = 0;
        drop(inner);
        self.notify.notify_one();
    }

    /// True once `close` or `abort` was called.
    pub fn is_closed(&self) -> bool {
        let inner = self.inner.borrow();
        inner.closing || inner.aborted
    }

    fn take_batch(&self) -> Vec<Chunk> {
        let mut inner = self.inner.borrow_mut();
        let take = inner.chunks.len().min(WRITE_BATCH);
        let mut batch = Vec::with_capacity(take);
        for _ in 0..take {
            if let Some(chunk) = inner.chunks.pop_front() {
                inner.queued_bytes -= chunk.wire_size();
                batch.push(chunk);
            }
        }
        batch
    }

    fn drained(&self) -> bool {
        let inner = self.inner.borrow();
        inner.aborted || (inner.closing && inner.chunks.is_empty())
    }
}

/// Writer task: drains the queue to the socket until it is closed and
/// empty, or a write error occurs.
pub async fn writer_loop(queue: OutboundQueue, mut writer: WriteHalf) {
    loop {
        let notified = queue.notify.notified();

        let batch = queue.take_batch();
        if !batch.is_empty() {
            for chunk in &batch {
                if let Err(e) = write_chunk(&mut writer, chunk).await {
                    tracing::debug!(error = %e, "outbound write failed");
                    queue.abort();
                    return;
                }
            }
            if let Err(e) = writer.flush().await {
                tracing::debug!(error = %e, "outbound flush failed");
                queue.abort();
                return;
            }
            continue;
        }

        if queue.drained() {
            let _ = writer.shutdown().await;
            return;
        }

        notified.await;
    }
}

async fn write_chunk(writer: &mut WriteHalf, chunk: &Chunk) -> std::io::Result<()> {
    writer.write_all(&chunk.header.encode()).await?;
    writer.write_all(&chunk.body).await
}

/// Inbound half of a connection: socket reads through decode and
/// reassembly to complete payloads.
pub struct InboundPump {
    reader: ReadHalf,
    decoder: ChunkDecoder,
    reassembler: Reassembler,
    buf: Vec<u8>,
    pending: VecDeque<(u32, Bytes)>,
}

impl InboundPump {
    /// Wrap the read half of a connection.
    pub fn new(reader: ReadHalf) -> Self {
        Self {
            reader,
            decoder: ChunkDecoder::new(),
            reassembler: Reassembler::new(),
            buf: vec![0u8; 64 * 1024],
            pending: VecDeque::new(),
        }
    }

    /// Read until one complete payload is available.
    ///
    /// Returns `None` on peer EOF; framing and I/O errors are fatal for
    /// the connection.
    pub async fn next_payload(&mut self) -> Result<Option<(u32, Bytes)>> {
        loop {
            if let Some(done) = self.pending.pop_front() {
                return Ok(Some(done));
            }

            let n = self.reader.read(&mut self.buf).await?;
            if n == 0 {
                return Ok(None);
            }

            for chunk in self.decoder.push(&self.buf[..n])? {
                if let Some(done) = self.reassembler.push(chunk)? {
                    self.pending.push_back(done);
                }
            }
        }
    }

    /// Drive the pump to EOF, handing each payload to `on_payload`.
    ///
    /// An error from `on_payload` terminates the pump the same way a
    /// framing error does.
    pub async fn run<F>(mut self, mut on_payload: F) -> Result<()>
    where
        F: FnMut(u32, Bytes) -> Result<()>,
    {
        while let Some((channel, payload)) = self.next_payload().await? {
            on_payload(channel, payload)?;
        }
        Ok(())
    }
}
