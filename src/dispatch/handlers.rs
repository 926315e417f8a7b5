//! Built-in bus message handlers.

use tracing::{debug, info};

use crate::bus::{ACTIVE_XAPP_PING, RIC_CONTROL_REQ, RIC_INDICATION};
use crate::error::AppError;

use super::registry::{DispatchTableBuilder, MessageContext, RegistryError};

/// Reply payload for [`ACTIVE_XAPP_PING`].
pub const PING_ACK: &[u8] = b"Received message correctly";

/// Fallback for types with no registration: log and release.
pub fn default_handler(ctx: &mut MessageContext<'_>) -> Result<(), AppError> {
    info!(
        mtype = ctx.mtype(),
        payload_len = ctx.payload().len(),
        "received message with no registered handler"
    );
    ctx.release();
    Ok(())
}

/// RIC indication from a subscribed node: answer with a RIC control request.
pub fn ric_indication_handler(ctx: &mut MessageContext<'_>) -> Result<(), AppError> {
    info!(buffer = ctx.buffer_id(), "received RIC indication, replying with RIC control");
    let sent = ctx.reply(RIC_CONTROL_REQ, ctx.payload());
    ctx.release();
    sent
}

/// Ping from a peer xApp: acknowledge on the same type.
pub fn active_xapp_handler(ctx: &mut MessageContext<'_>) -> Result<(), AppError> {
    debug!(
        payload = %String::from_utf8_lossy(ctx.payload()),
        "received active-xapp ping"
    );
    let sent = ctx.reply(ACTIVE_XAPP_PING, PING_ACK);
    ctx.release();
    sent
}

/// Register every built-in handler on `builder`.
pub fn register_builtin_handlers(builder: &mut DispatchTableBuilder) -> Result<(), RegistryError> {
    builder
        .register(RIC_INDICATION, ric_indication_handler)?
        .register(ACTIVE_XAPP_PING, active_xapp_handler)?;
    Ok(())
}
