//! Control HTTP surface: the platform-facing REST endpoints.
//!
//! Implements [`Component`]: `run()` drives the axum event loop and the
//! shared [`CancellationToken`] is wired to axum's graceful shutdown.
//!
//! ## URL layout (under the configured prefix, default `/ric/v1`)
//!
//! ```text
//! GET  /config                   resolved configuration
//! GET  /health/alive             200 Healthy | 503 Unhealthy
//! GET  /health/ready             200 Ready   | 503 Not ready
//! GET  /resubscribe              unsubscribe all, then subscribe all
//! GET  /subscriptions            tracked subscription records
//! POST /subscriptions/response   confirmation callback from the submgr
//! ```

mod api;
mod state;

pub use state::{ControlState, HealthProbe};

use axum::{
    Router,
    routing::{get, post},
};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::error::AppError;
use crate::runtime::{Component, ComponentFuture};

// ── ControlChannel ────────────────────────────────────────────────────────────

pub struct ControlChannel {
    bind_addr: String,
    route_prefix: String,
    state: ControlState,
}

impl ControlChannel {
    pub fn new(
        bind_addr: impl Into<String>,
        route_prefix: impl Into<String>,
        state: ControlState,
    ) -> Self {
        Self {
            bind_addr: bind_addr.into(),
            route_prefix: route_prefix.into(),
            state,
        }
    }
}

impl Component for ControlChannel {
    fn id(&self) -> &str {
        "control-http"
    }

    fn run(self: Box<Self>, shutdown: CancellationToken) -> ComponentFuture {
        Box::pin(run_axum(self.bind_addr, self.route_prefix, self.state, shutdown))
    }
}

// ── Server loop ───────────────────────────────────────────────────────────────

async fn run_axum(
    bind_addr: String,
    route_prefix: String,
    state: ControlState,
    shutdown: CancellationToken,
) -> Result<(), AppError> {
    let router = build_router(state, &route_prefix);

    let listener = TcpListener::bind(&bind_addr)
        .await
        .map_err(|e| AppError::Control(format!("bind failed on {bind_addr}: {e}")))?;

    info!(%bind_addr, prefix = %route_prefix, "control surface listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .map_err(|e| AppError::Control(format!("server error: {e}")))?;

    info!("control surface shut down");
    Ok(())
}

// ── Router ────────────────────────────────────────────────────────────────────

/// Routes mounted under `route_prefix`; an empty prefix mounts at the root.
pub fn build_router(state: ControlState, route_prefix: &str) -> Router {
    let routes = Router::new()
        .route("/config",                 get(api::config))
        .route("/health/alive",           get(api::alive))
        .route("/health/ready",           get(api::ready))
        .route("/resubscribe",            get(api::resubscribe))
        .route("/subscriptions",          get(api::subscriptions))
        .route("/subscriptions/response", post(api::subscription_response))
        .with_state(state);

    if route_prefix.is_empty() {
        routes
    } else {
        Router::new().nest(route_prefix, routes)
    }
}
