//! Application-wide error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("config error: {0}")]
    Config(String),

    #[error("logger error: {0}")]
    Logger(String),

    #[error("bus error: {0}")]
    Bus(String),

    #[error("store error: {0}")]
    Store(String),

    #[error("subscription error: {0}")]
    Subscription(String),

    #[error("control error: {0}")]
    Control(String),

    #[error("runtime error: {0}")]
    Runtime(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
