//! Shared state behind the control surface.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::bus::BusTransport;
use crate::subscriptions::SubscriptionHandle;
use crate::watch::SharedConfig;

/// Liveness follows the bus transport; readiness is an explicit flag the
/// startup path raises once every component is running.
#[derive(Clone)]
pub struct HealthProbe {
    transport: Arc<dyn BusTransport>,
    ready: Arc<AtomicBool>,
}

impl HealthProbe {
    pub fn new(transport: Arc<dyn BusTransport>) -> Self {
        Self { transport, ready: Arc::new(AtomicBool::new(false)) }
    }

    pub fn is_alive(&self) -> bool {
        self.transport.is_healthy()
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::Release);
    }
}

/// Router state injected into every handler via [`axum::extract::State`].
///
/// Cheap to clone; all fields are reference-counted.
#[derive(Clone)]
pub struct ControlState {
    pub subscriptions: SubscriptionHandle,
    pub health: HealthProbe,
    pub config: SharedConfig,
}

impl ControlState {
    pub fn new(subscriptions: SubscriptionHandle, health: HealthProbe, config: SharedConfig) -> Self {
        Self { subscriptions, health, config }
    }
}
