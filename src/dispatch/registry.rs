//! Message type registry. Maps bus message types to handlers.
//!
//! Registration happens once at startup through [`DispatchTableBuilder`];
//! [`DispatchTableBuilder::build`] consumes the builder, so the resulting
//! [`DispatchTable`] is immutable for the lifetime of the dispatch loop.
//! Types without an explicit registration resolve to the default handler.

use std::collections::HashMap;

use thiserror::Error;
use tracing::warn;

use crate::bus::{BufferHandle, BusTransport, MessageType, ReceivedMessage};
use crate::error::AppError;

use super::handlers;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("message type {mtype} already has a registered handler")]
    DuplicateRegistration { mtype: MessageType },
}

// ── MessageContext ────────────────────────────────────────────────────────────

/// One inbound message as seen by a handler.
///
/// Owns the transport buffer until [`MessageContext::release`] hands it back.
/// Releasing twice is a logged no-op, so a buffer reaches the transport at
/// most once; the dispatch loop releases whatever a handler leaves behind.
pub struct MessageContext<'a> {
    transport: &'a dyn BusTransport,
    mtype: MessageType,
    payload: Vec<u8>,
    handle: Option<BufferHandle>,
    buffer_id: u64,
}

impl<'a> MessageContext<'a> {
    pub fn new(transport: &'a dyn BusTransport, message: ReceivedMessage) -> Self {
        Self {
            transport,
            mtype: message.mtype,
            payload: message.payload,
            buffer_id: message.handle.id(),
            handle: Some(message.handle),
        }
    }

    pub fn mtype(&self) -> MessageType {
        self.mtype
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn buffer_id(&self) -> u64 {
        self.buffer_id
    }

    /// Return-to-sender with a new type and payload. Must precede `release`.
    pub fn reply(&self, mtype: MessageType, payload: &[u8]) -> Result<(), AppError> {
        match &self.handle {
            Some(handle) => self.transport.reply(handle, mtype, payload),
            None => Err(AppError::Bus(format!(
                "reply on buffer {} after release",
                self.buffer_id
            ))),
        }
    }

    /// Publish a fresh message on the bus.
    pub fn send(&self, mtype: MessageType, payload: &[u8]) -> Result<(), AppError> {
        self.transport.send(mtype, payload)
    }

    /// Hand the buffer back to the transport. Returns `false` if it had
    /// already been released.
    pub fn release(&mut self) -> bool {
        match self.handle.take() {
            Some(handle) => {
                self.transport.release(handle);
                true
            }
            None => {
                warn!(buffer = self.buffer_id, mtype = self.mtype, "buffer already released");
                false
            }
        }
    }

    pub fn is_released(&self) -> bool {
        self.handle.is_none()
    }
}

// ── MessageHandler ────────────────────────────────────────────────────────────

/// A handler for one message type.
///
/// Handlers run synchronously on the dispatch thread and are expected to
/// release the buffer they were given, including on early return.
pub trait MessageHandler: Send + Sync {
    fn handle(&self, ctx: &mut MessageContext<'_>) -> Result<(), AppError>;
}

impl<F> MessageHandler for F
where
    F: Fn(&mut MessageContext<'_>) -> Result<(), AppError> + Send + Sync,
{
    fn handle(&self, ctx: &mut MessageContext<'_>) -> Result<(), AppError> {
        self(ctx)
    }
}

// ── DispatchTable ─────────────────────────────────────────────────────────────

pub struct DispatchTable {
    handlers: HashMap<MessageType, Box<dyn MessageHandler>>,
    default: Box<dyn MessageHandler>,
}

impl DispatchTable {
    /// Start a table whose fallback is [`handlers::default_handler`].
    pub fn builder() -> DispatchTableBuilder {
        DispatchTableBuilder {
            handlers: HashMap::new(),
            default: Box::new(handlers::default_handler),
        }
    }

    /// Handler for `mtype`, or the default handler when none is registered.
    pub fn get(&self, mtype: MessageType) -> &dyn MessageHandler {
        self.handlers
            .get(&mtype)
            .map(|h| h.as_ref())
            .unwrap_or(self.default.as_ref())
    }

    pub fn is_registered(&self, mtype: MessageType) -> bool {
        self.handlers.contains_key(&mtype)
    }

    /// Registered types in ascending order.
    pub fn registered_types(&self) -> Vec<MessageType> {
        let mut types: Vec<MessageType> = self.handlers.keys().copied().collect();
        types.sort_unstable();
        types
    }
}

pub struct DispatchTableBuilder {
    handlers: HashMap<MessageType, Box<dyn MessageHandler>>,
    default: Box<dyn MessageHandler>,
}

impl DispatchTableBuilder {
    /// Bind `handler` to `mtype`. Each type may be bound once.
    pub fn register(
        &mut self,
        mtype: MessageType,
        handler: impl MessageHandler + 'static,
    ) -> Result<&mut Self, RegistryError> {
        if self.handlers.contains_key(&mtype) {
            return Err(RegistryError::DuplicateRegistration { mtype });
        }
        self.handlers.insert(mtype, Box::new(handler));
        Ok(self)
    }

    /// Replace the fallback handler for unregistered types.
    pub fn default_handler(mut self, handler: impl MessageHandler + 'static) -> Self {
        self.default = Box::new(handler);
        self
    }

    pub fn build(self) -> DispatchTable {
        DispatchTable {
            handlers: self.handlers,
            default: self.default,
        }
    }
}
