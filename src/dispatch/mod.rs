//! Bus dispatch loop. Drains the transport and routes each message to its
//! registered handler.
//!
//! # Routing
//!
//! Every message ready at the time of [`DispatchLoop::run_once`] is looked up
//! in the [`DispatchTable`] by type; unregistered types go to the default
//! handler, so nothing is dropped silently.
//!
//! # Buffer ownership
//!
//! Handlers receive a [`MessageContext`] that owns the transport buffer.
//! After the handler returns, fails, or panics, the loop releases the buffer
//! if the handler did not.  Each delivered buffer therefore reaches
//! [`BusTransport::release`] exactly once.
//!
//! # Threading
//!
//! Handlers run synchronously on the dispatch thread; a slow handler delays
//! the messages behind it.  The loop runs under `spawn_blocking` because the
//! transport's receive call blocks.

mod handlers;
mod registry;

pub use handlers::{
    PING_ACK, active_xapp_handler, default_handler, register_builtin_handlers,
    ric_indication_handler,
};
pub use registry::{
    DispatchTable, DispatchTableBuilder, MessageContext, MessageHandler, RegistryError,
};

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::bus::{BusTransport, ReceivedMessage};
use crate::error::AppError;
use crate::runtime::{Component, ComponentFuture};

/// Counters maintained by the dispatch loop.
#[derive(Debug, Default)]
pub struct DispatchStats {
    dispatched: AtomicU64,
    handler_errors: AtomicU64,
    handler_panics: AtomicU64,
    forced_releases: AtomicU64,
}

/// Point-in-time copy of [`DispatchStats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DispatchSnapshot {
    pub dispatched: u64,
    pub handler_errors: u64,
    pub handler_panics: u64,
    /// Buffers the loop had to release because the handler did not.
    pub forced_releases: u64,
}

impl DispatchStats {
    pub fn snapshot(&self) -> DispatchSnapshot {
        DispatchSnapshot {
            dispatched: self.dispatched.load(Ordering::Relaxed),
            handler_errors: self.handler_errors.load(Ordering::Relaxed),
            handler_panics: self.handler_panics.load(Ordering::Relaxed),
            forced_releases: self.forced_releases.load(Ordering::Relaxed),
        }
    }
}

pub struct DispatchLoop {
    transport: Arc<dyn BusTransport>,
    table: DispatchTable,
    poll_wait: Duration,
    stats: Arc<DispatchStats>,
}

impl DispatchLoop {
    pub fn new(transport: Arc<dyn BusTransport>, table: DispatchTable, poll_wait: Duration) -> Self {
        Self {
            transport,
            table,
            poll_wait,
            stats: Arc::new(DispatchStats::default()),
        }
    }

    pub fn stats(&self) -> Arc<DispatchStats> {
        self.stats.clone()
    }

    /// Dispatch every message available now (waiting up to the poll interval
    /// for the first). Returns how many messages were dispatched.
    pub fn run_once(&self) -> Result<usize, AppError> {
        let batch = self.transport.receive_available(self.poll_wait)?;
        let count = batch.len();
        for message in batch {
            self.dispatch(message);
        }
        Ok(count)
    }

    fn dispatch(&self, message: ReceivedMessage) {
        let mtype = message.mtype;
        let mut ctx = MessageContext::new(self.transport.as_ref(), message);
        let handler = self.table.get(mtype);

        debug!(mtype, registered = self.table.is_registered(mtype), "invoking handler");
        self.stats.dispatched.fetch_add(1, Ordering::Relaxed);

        match panic::catch_unwind(AssertUnwindSafe(|| handler.handle(&mut ctx))) {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                self.stats.handler_errors.fetch_add(1, Ordering::Relaxed);
                warn!(mtype, "handler failed: {e}");
            }
            Err(_) => {
                self.stats.handler_panics.fetch_add(1, Ordering::Relaxed);
                error!(mtype, "handler panicked");
            }
        }

        if !ctx.is_released() {
            self.stats.forced_releases.fetch_add(1, Ordering::Relaxed);
            warn!(mtype, buffer = ctx.buffer_id(), "handler did not release buffer; releasing");
            ctx.release();
        }
    }

    /// Loop on [`run_once`](Self::run_once) until `shutdown` is cancelled.
    /// Transport errors are logged and the loop keeps going.
    pub fn run_blocking(&self, shutdown: &CancellationToken) {
        info!(
            registered = ?self.table.registered_types(),
            poll_wait_ms = self.poll_wait.as_millis() as u64,
            "dispatch loop running"
        );

        while !shutdown.is_cancelled() {
            if let Err(e) = self.run_once() {
                warn!("bus receive failed: {e}");
                std::thread::sleep(self.poll_wait);
            }
        }

        info!(stats = ?self.stats.snapshot(), "dispatch loop stopped");
    }
}

impl Component for DispatchLoop {
    fn id(&self) -> &str {
        "dispatch"
    }

    fn run(self: Box<Self>, shutdown: CancellationToken) -> ComponentFuture {
        Box::pin(async move {
            tokio::task::spawn_blocking(move || self.run_blocking(&shutdown))
                .await
                .map_err(|e| AppError::Runtime(format!("dispatch loop join: {e}")))
        })
    }
}
