//! In-process bus transport.
//!
//! Messages are injected with [`LoopbackTransport::inject`] and drained by
//! the dispatch loop; replies and sends are recorded for inspection.  The
//! transport also keeps the set of outstanding (unreleased) buffers so leaks
//! and double releases are observable.
//!
//! Nothing leaves the process: the binary falls back to this transport when
//! no external bus is wired in.  Only the most recent outbound messages are
//! kept (see [`LoopbackTransport::with_history`]).

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tracing::{trace, warn};

/// Outbound messages kept by [`LoopbackTransport::new`].
pub const DEFAULT_OUTBOUND_HISTORY: usize = 1024;

use super::{BufferHandle, BusTransport, MessageType, ReceivedMessage};
use crate::error::AppError;

/// A message the xApp put on the bus (reply or fresh send).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    pub mtype: MessageType,
    pub payload: Vec<u8>,
    /// Buffer id of the message this replies to, `None` for plain sends.
    pub in_reply_to: Option<u64>,
}

#[derive(Default)]
struct Inner {
    next_id: u64,
    inbound: VecDeque<ReceivedMessage>,
    /// Buffers handed to the dispatcher and not yet released: id -> type.
    outstanding: HashMap<u64, MessageType>,
    released: u64,
    invalid_releases: u64,
    outbound: VecDeque<OutboundMessage>,
    dropped_outbound: u64,
}

pub struct LoopbackTransport {
    inner: Mutex<Inner>,
    arrived: Condvar,
    healthy: AtomicBool,
    history: usize,
}

impl Default for LoopbackTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl LoopbackTransport {
    pub fn new() -> Self {
        Self::with_history(DEFAULT_OUTBOUND_HISTORY)
    }

    /// Keep at most `history` outbound messages; older ones are discarded.
    pub fn with_history(history: usize) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            arrived: Condvar::new(),
            healthy: AtomicBool::new(true),
            history,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn record(&self, inner: &mut Inner, msg: OutboundMessage) {
        if self.history == 0 {
            inner.dropped_outbound += 1;
            return;
        }
        if inner.outbound.len() == self.history {
            inner.outbound.pop_front();
            inner.dropped_outbound += 1;
        }
        inner.outbound.push_back(msg);
    }

    /// Queue an inbound message; returns its buffer id.
    pub fn inject(&self, mtype: MessageType, payload: impl Into<Vec<u8>>) -> u64 {
        let mut inner = self.lock();
        inner.next_id += 1;
        let id = inner.next_id;
        inner.inbound.push_back(ReceivedMessage {
            mtype,
            payload: payload.into(),
            handle: BufferHandle::new(id),
        });
        drop(inner);
        self.arrived.notify_one();
        id
    }

    /// Recent replies and sends, oldest first.
    pub fn sent(&self) -> Vec<OutboundMessage> {
        self.lock().outbound.iter().cloned().collect()
    }

    /// Outbound messages discarded to stay within the history limit.
    pub fn dropped_outbound(&self) -> u64 {
        self.lock().dropped_outbound
    }

    /// Buffers delivered but not yet released.
    pub fn outstanding(&self) -> usize {
        self.lock().outstanding.len()
    }

    /// Successful releases so far.
    pub fn released(&self) -> u64 {
        self.lock().released
    }

    /// Releases of buffers that were never delivered or already released.
    pub fn invalid_releases(&self) -> u64 {
        self.lock().invalid_releases
    }

    /// Messages still queued for delivery.
    pub fn pending(&self) -> usize {
        self.lock().inbound.len()
    }

    pub fn set_healthy(&self, healthy: bool) {
        self.healthy.store(healthy, Ordering::Relaxed);
    }
}

impl BusTransport for LoopbackTransport {
    fn receive_available(&self, wait: Duration) -> Result<Vec<ReceivedMessage>, AppError> {
        let mut inner = self.lock();
        if inner.inbound.is_empty() && !wait.is_zero() {
            let (guard, _timeout) = self
                .arrived
                .wait_timeout_while(inner, wait, |i| i.inbound.is_empty())
                .unwrap_or_else(PoisonError::into_inner);
            inner = guard;
        }

        let batch: Vec<ReceivedMessage> = inner.inbound.drain(..).collect();
        for msg in &batch {
            inner.outstanding.insert(msg.handle.id(), msg.mtype);
        }
        if !batch.is_empty() {
            trace!(count = batch.len(), "loopback delivered batch");
        }
        Ok(batch)
    }

    fn release(&self, handle: BufferHandle) {
        let mut inner = self.lock();
        if inner.outstanding.remove(&handle.id()).is_some() {
            inner.released += 1;
        } else {
            inner.invalid_releases += 1;
            warn!(buffer = handle.id(), "release of unknown or already released buffer");
        }
    }

    fn reply(&self, handle: &BufferHandle, mtype: MessageType, payload: &[u8]) -> Result<(), AppError> {
        let mut inner = self.lock();
        if !inner.outstanding.contains_key(&handle.id()) {
            return Err(AppError::Bus(format!("reply on released buffer {}", handle.id())));
        }
        let msg = OutboundMessage {
            mtype,
            payload: payload.to_vec(),
            in_reply_to: Some(handle.id()),
        };
        self.record(&mut inner, msg);
        Ok(())
    }

    fn send(&self, mtype: MessageType, payload: &[u8]) -> Result<(), AppError> {
        if !self.is_healthy() {
            return Err(AppError::Bus("transport unhealthy".into()));
        }
        let msg = OutboundMessage { mtype, payload: payload.to_vec(), in_reply_to: None };
        self.record(&mut self.lock(), msg);
        Ok(())
    }

    fn is_healthy(&self) -> bool {
        self.healthy.load(Ordering::Relaxed)
    }
}
