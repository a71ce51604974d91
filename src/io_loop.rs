//! Single-threaded cooperative I/O loop.
//!
//! One loop drives all handlers of a process on one thread. Handlers are
//! futures registered with [`IoLoop::add_handler`]; they run cooperatively
//! and must not block outside socket I/O. The only suspension point is
//! [`IoLoop::wait`], which drives every registered handler for up to the
//! given timeout and reports `false` once a termination signal (SIGINT or
//! SIGTERM) has been observed.
//!
//! Internally this is a tokio current-thread runtime plus a `LocalSet`, so
//! handler futures need not be `Send` and callbacks dispatched by the
//! client runtime stay on the loop thread.
//!
//! # Example
//!
//! ```ignore
//! let io = IoLoop::new()?;
//! let client = Client::connect(&io, &endpoint, "sensor")?;
//! while io.wait(Duration::from_millis(100)) {
//!     // callbacks have run; do cooperative work here
//! }
//! ```

use std::cell::Cell;
use std::future::Future;
use std::rc::Rc;
use std::time::Duration;

use tokio::runtime::{Builder, Runtime};
use tokio::signal::unix::{signal, SignalKind};
use tokio::task::LocalSet;

use crate::error::Result;

/// Handle to a registered handler; pass back to
/// [`IoLoop::remove_handler`] to deregister it.
pub struct LoopHandle {
    handle: tokio::task::JoinHandle<()>,
}

impl LoopHandle {
    /// True once the handler has run to completion or been removed.
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

/// Clonable handle that can terminate a loop from a handler.
///
/// The client runtime uses this to surface a lost router connection as a
/// termination, so `wait` returns `false`.
#[derive(Clone)]
pub struct LoopStopper {
    flag: Rc<Cell<bool>>,
}

impl LoopStopper {
    /// Make the owning loop's next `wait` return `false`.
    pub fn stop(&self) {
        self.flag.set(true);
    }
}

/// Single-threaded readiness loop.
pub struct IoLoop {
    rt: Runtime,
    local: LocalSet,
    terminated: Rc<Cell<bool>>,
}

impl IoLoop {
    /// Create a loop and install its termination-signal watcher.
    pub fn new() -> Result<Self> {
        let rt = Builder::new_current_thread().enable_all().build()?;
        let local = LocalSet::new();
        let terminated = Rc::new(Cell::new(false));

        let flag = terminated.clone();
        {
            // Signal stream registration needs the runtime's reactor.
            let _guard = rt.enter();
            let mut interrupt = signal(SignalKind::interrupt())?;
            let mut terminate = signal(SignalKind::terminate())?;
            local.spawn_local(async move {
                tokio::select! {
                    _ = interrupt.recv() => {}
                    _ = terminate.recv() => {}
                }
                flag.set(true);
            });
        }

        Ok(Self {
            rt,
            local,
            terminated,
        })
    }

    /// Register a handler. It starts running at the next [`wait`].
    ///
    /// [`wait`]: IoLoop::wait
    pub fn add_handler<F>(&self, handler: F) -> LoopHandle
    where
        F: Future<Output = ()> + 'static,
    {
        LoopHandle {
            handle: self.local.spawn_local(handler),
        }
    }

    /// Deregister a handler.
    ///
    /// After this returns, the handler gets no further polls in the
    /// current or any future [`wait`](IoLoop::wait) invocation.
    pub fn remove_handler(&self, handler: &LoopHandle) {
        handler.handle.abort();
    }

    /// Drive all handlers for up to `timeout`.
    ///
    /// Returns `false` once a termination signal has been observed (or
    /// [`stop`](IoLoop::stop) was called), `true` otherwise.
    pub fn wait(&self, timeout: Duration) -> bool {
        if self.terminated.get() {
            return false;
        }
        let _guard = self.rt.enter();
        self.rt
            .block_on(self.local.run_until(tokio::time::sleep(timeout)));
        !self.terminated.get()
    }

    /// Run a future to completion on the loop, driving handlers meanwhile.
    ///
    /// Used for connection setup; must not be called from inside a
    /// handler callback.
    pub fn block_on<F: Future>(&self, fut: F) -> F::Output {
        self.rt.block_on(self.local.run_until(fut))
    }

    /// Programmatic termination: the next `wait` returns `false`.
    pub fn stop(&self) {
        self.terminated.set(true);
    }

    /// A handle handlers can hold to terminate the loop.
    pub fn stopper(&self) -> LoopStopper {
        LoopStopper {
            flag: self.terminated.clone(),
        }
    }

    /// Run blocking work off the loop thread.
    ///
    /// Callbacks must never block the loop; hand work that does real
    /// computation or file I/O to this helper and await the handle from
    /// a handler instead.
    pub fn post_blocking<F, R>(&self, work: F) -> tokio::task::JoinHandle<R>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        self.rt.spawn_blocking(work)
    }

    /// True once a termination signal has been observed.
    pub fn is_terminated(&self) -> bool {
        self.terminated.get()
    }
}
