//! subreact-xapp: near-RT RIC xApp core.
//!
//! Routes typed bus messages to handlers and keeps E2 subscriptions alive
//! against the platform subscription manager. The binary in `main.rs` wires
//! these modules together; integration tests drive them directly.

pub mod bus;
pub mod config;
#[cfg(feature = "control-http")]
pub mod control;
pub mod dispatch;
pub mod error;
pub mod logger;
pub mod runtime;
pub mod store;
pub mod subscriptions;
pub mod watch;
