//! Message bus interface: what the xApp needs from the pub/sub transport.
//!
//! The transport itself (port binding, routing tables, wire format) lives
//! outside this crate.  The dispatch loop only needs the four primitives on
//! [`BusTransport`]: drain what is ready, release a buffer, reply to the
//! sender of a buffer, and send a fresh message.
//!
//! Payloads are opaque byte buffers keyed by an integer [`MessageType`].

pub mod loopback;

use std::time::Duration;

use crate::error::AppError;

pub use loopback::{LoopbackTransport, OutboundMessage};

/// Integer message-type tag carried by every bus message.
pub type MessageType = i32;

/// RIC indication sent by a subscribed E2 node.
pub const RIC_INDICATION: MessageType = 12050;
/// RIC control request, the reply to an indication.
pub const RIC_CONTROL_REQ: MessageType = 12040;
/// Liveness ping from a peer ("active") xApp.
pub const ACTIVE_XAPP_PING: MessageType = 12345;

/// Opaque transport handle for one received buffer.
///
/// Deliberately not `Clone`: releasing consumes the handle, so a buffer can
/// only be handed back to the transport once.
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct BufferHandle(u64);

impl BufferHandle {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn id(&self) -> u64 {
        self.0
    }
}

/// One inbound message as delivered by [`BusTransport::receive_available`].
#[derive(Debug)]
pub struct ReceivedMessage {
    pub mtype: MessageType,
    pub payload: Vec<u8>,
    pub handle: BufferHandle,
}

/// Transport primitives consumed by the dispatch loop and handlers.
///
/// Implementations must be `Send + Sync`; the dispatch loop holds one behind
/// an `Arc` on a blocking thread while the control surface probes
/// [`BusTransport::is_healthy`] concurrently.
pub trait BusTransport: Send + Sync {
    /// Return every message ready at call time, waiting up to `wait` for the
    /// first one. An empty vector means nothing arrived in time.
    fn receive_available(&self, wait: Duration) -> Result<Vec<ReceivedMessage>, AppError>;

    /// Hand a buffer back to the transport.
    fn release(&self, handle: BufferHandle);

    /// Return-to-sender: reply to the originator of `handle` with a new type
    /// and payload. Does not release `handle`.
    fn reply(&self, handle: &BufferHandle, mtype: MessageType, payload: &[u8]) -> Result<(), AppError>;

    /// Publish a new message routed by type.
    fn send(&self, mtype: MessageType, payload: &[u8]) -> Result<(), AppError>;

    /// Whether the transport is usable; backs the liveness probe.
    fn is_healthy(&self) -> bool;
}
