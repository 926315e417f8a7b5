//! Subscription service: the single owner of subscription state.
//!
//! The startup path, the `/resubscribe` endpoint, the confirmation callback
//! and the shutdown path all mutate the same index. Rather than share it
//! behind a lock, [`SubscriptionService`] owns the [`SubscriptionManager`]
//! and processes [`SubscriptionCommand`]s one at a time; everyone else holds
//! a cloneable [`SubscriptionHandle`].

pub mod client;
pub mod index;
pub mod inventory;
pub mod manager;
pub mod types;

pub use client::{ClientFuture, HttpSubmgrClient, SubmgrClient};
pub use index::SubscriptionIndex;
pub use inventory::{FileInventory, NodeInventory, StaticInventory};
pub use manager::SubscriptionManager;
pub use types::{
    BatchReport, Node, RequestTemplate, ResubscribeReport, SubscriptionError, SubscriptionParams,
    SubscriptionRecord, SubscriptionResponse, TargetFailure,
};

use std::{error::Error, fmt};

use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::AppError;
use crate::runtime::{Component, ComponentFuture};

/// Requests handled by the subscription service loop.
#[derive(Debug)]
pub enum SubscriptionCommand {
    SubscribeAll {
        reply_tx: oneshot::Sender<BatchReport>,
    },
    UnsubscribeAll {
        reply_tx: oneshot::Sender<BatchReport>,
    },
    Resubscribe {
        reply_tx: oneshot::Sender<ResubscribeReport>,
    },
    Confirm {
        subscription_id: String,
        instances: Option<Value>,
        reply_tx: oneshot::Sender<Result<(), SubscriptionError>>,
    },
    Snapshot {
        reply_tx: oneshot::Sender<Vec<SubscriptionRecord>>,
    },
}

/// Client-facing handle for the subscription service.
#[derive(Clone)]
pub struct SubscriptionHandle {
    tx: mpsc::Sender<SubscriptionCommand>,
}

impl SubscriptionHandle {
    async fn call<T>(
        &self,
        command: impl FnOnce(oneshot::Sender<T>) -> SubscriptionCommand,
    ) -> Result<T, SubscriptionCallError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(command(reply_tx))
            .await
            .map_err(|_| SubscriptionCallError::Send)?;
        reply_rx.await.map_err(|_| SubscriptionCallError::Recv)
    }

    pub async fn subscribe_all(&self) -> Result<BatchReport, SubscriptionCallError> {
        self.call(|reply_tx| SubscriptionCommand::SubscribeAll { reply_tx }).await
    }

    pub async fn unsubscribe_all(&self) -> Result<BatchReport, SubscriptionCallError> {
        self.call(|reply_tx| SubscriptionCommand::UnsubscribeAll { reply_tx }).await
    }

    pub async fn resubscribe(&self) -> Result<ResubscribeReport, SubscriptionCallError> {
        self.call(|reply_tx| SubscriptionCommand::Resubscribe { reply_tx }).await
    }

    pub async fn confirm(
        &self,
        subscription_id: impl Into<String>,
        instances: Option<Value>,
    ) -> Result<Result<(), SubscriptionError>, SubscriptionCallError> {
        let subscription_id = subscription_id.into();
        self.call(|reply_tx| SubscriptionCommand::Confirm { subscription_id, instances, reply_tx })
            .await
    }

    pub async fn snapshot(&self) -> Result<Vec<SubscriptionRecord>, SubscriptionCallError> {
        self.call(|reply_tx| SubscriptionCommand::Snapshot { reply_tx }).await
    }
}

/// Call-level transport errors for subscription requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionCallError {
    Send,
    Recv,
}

impl fmt::Display for SubscriptionCallError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubscriptionCallError::Send => {
                write!(f, "subscription send failed: service is not running")
            }
            SubscriptionCallError::Recv => {
                write!(f, "subscription recv failed: service dropped reply sender")
            }
        }
    }
}

impl Error for SubscriptionCallError {}

/// Owns the [`SubscriptionManager`] and serves [`SubscriptionCommand`]s.
pub struct SubscriptionService {
    manager: SubscriptionManager,
    rx: mpsc::Receiver<SubscriptionCommand>,
    unsubscribe_on_shutdown: bool,
}

impl SubscriptionService {
    pub fn new(
        manager: SubscriptionManager,
        buffer: usize,
        unsubscribe_on_shutdown: bool,
    ) -> (Self, SubscriptionHandle) {
        let (tx, rx) = mpsc::channel(buffer);
        (
            Self { manager, rx, unsubscribe_on_shutdown },
            SubscriptionHandle { tx },
        )
    }

    async fn handle(&mut self, command: SubscriptionCommand) {
        // A dropped reply receiver just means the caller stopped waiting.
        match command {
            SubscriptionCommand::SubscribeAll { reply_tx } => {
                let _ = reply_tx.send(self.manager.subscribe_all().await);
            }
            SubscriptionCommand::UnsubscribeAll { reply_tx } => {
                let _ = reply_tx.send(self.manager.unsubscribe_all().await);
            }
            SubscriptionCommand::Resubscribe { reply_tx } => {
                let _ = reply_tx.send(self.manager.resubscribe().await);
            }
            SubscriptionCommand::Confirm { subscription_id, instances, reply_tx } => {
                let _ = reply_tx.send(self.manager.confirm(&subscription_id, instances));
            }
            SubscriptionCommand::Snapshot { reply_tx } => {
                let _ = reply_tx.send(self.manager.snapshot());
            }
        }
    }

    /// Serve commands until `shutdown` fires or every handle is dropped,
    /// then optionally delete whatever is still subscribed.
    pub async fn serve(mut self, shutdown: CancellationToken) {
        info!("subscription service running");
        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                command = self.rx.recv() => match command {
                    Some(command) => self.handle(command).await,
                    None => {
                        debug!("all subscription handles dropped");
                        break;
                    }
                },
            }
        }

        if self.unsubscribe_on_shutdown && !self.manager.index().is_empty() {
            info!(count = self.manager.index().len(), "unsubscribing before exit");
            self.manager.unsubscribe_all().await;
        }
        info!("subscription service stopped");
    }
}

impl Component for SubscriptionService {
    fn id(&self) -> &str {
        "subscriptions"
    }

    fn run(self: Box<Self>, shutdown: CancellationToken) -> ComponentFuture {
        Box::pin(async move {
            (*self).serve(shutdown).await;
            Ok::<(), AppError>(())
        })
    }
}
