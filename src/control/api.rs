//! Axum handlers for the control routes.
//!
//! Each handler receives [`ControlState`] via [`axum::extract::State`] and
//! returns an axum [`Response`].

use axum::{
    Json,
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use tracing::{info, warn};

use crate::subscriptions::{SubscriptionError, SubscriptionResponse};

use super::state::ControlState;

/// Build a JSON error response body.
fn json_error(code: &str, msg: impl std::fmt::Display) -> Json<serde_json::Value> {
    Json(json!({ "error": code, "message": format!("{msg}") }))
}

fn status(code: StatusCode, status: &str) -> Response {
    (code, Json(json!({ "status": status }))).into_response()
}

/// GET /config
pub(super) async fn config(State(state): State<ControlState>) -> Response {
    (StatusCode::OK, Json(state.config.snapshot())).into_response()
}

/// GET /health/alive
pub(super) async fn alive(State(state): State<ControlState>) -> Response {
    if state.health.is_alive() {
        status(StatusCode::OK, "Healthy")
    } else {
        warn!("liveness probe failed: bus transport unhealthy");
        status(StatusCode::SERVICE_UNAVAILABLE, "Unhealthy")
    }
}

/// GET /health/ready
pub(super) async fn ready(State(state): State<ControlState>) -> Response {
    if state.health.is_ready() {
        status(StatusCode::OK, "Ready")
    } else {
        status(StatusCode::SERVICE_UNAVAILABLE, "Not ready")
    }
}

/// GET /resubscribe: drop every subscription, then subscribe the current
/// inventory. Answers once both passes are done.
pub(super) async fn resubscribe(State(state): State<ControlState>) -> Response {
    info!("resubscribe requested");
    match state.subscriptions.resubscribe().await {
        Ok(report) => (
            StatusCode::OK,
            Json(json!({
                "message": "ACK resubscribe",
                "unsubscribed": report.unsubscribed,
                "subscribed": report.subscribed,
            })),
        )
            .into_response(),
        Err(e) => {
            warn!("resubscribe failed: {e}");
            (StatusCode::SERVICE_UNAVAILABLE, json_error("unavailable", e)).into_response()
        }
    }
}

/// POST /subscriptions/response: confirmation callback from the remote
/// subscription manager. The body is parsed whatever its content type.
/// Unknown ids and unparseable bodies are logged and still acknowledged so
/// the remote side does not keep retrying.
pub(super) async fn subscription_response(
    State(state): State<ControlState>,
    body: Bytes,
) -> Response {
    match serde_json::from_slice::<SubscriptionResponse>(&body) {
        Ok(resp) => confirm(&state, resp).await,
        Err(e) => warn!(
            body = %String::from_utf8_lossy(&body),
            "unparseable subscription response: {e}"
        ),
    }
    (StatusCode::OK, Json(json!({ "message": "ACK subscription response" }))).into_response()
}

async fn confirm(state: &ControlState, resp: SubscriptionResponse) {
    let id = resp.subscription_id;
    match state.subscriptions.confirm(id.clone(), resp.subscription_instances).await {
        Ok(Ok(())) => {}
        Ok(Err(SubscriptionError::UnknownSubscription(_))) => {
            warn!(subscription_id = %id, "confirmation for unknown subscription");
        }
        Ok(Err(e)) => warn!(subscription_id = %id, "confirmation rejected: {e}"),
        Err(e) => warn!(subscription_id = %id, "confirmation not delivered: {e}"),
    }
}

/// GET /subscriptions: tracked subscription records.
pub(super) async fn subscriptions(State(state): State<ControlState>) -> Response {
    match state.subscriptions.snapshot().await {
        Ok(records) => (StatusCode::OK, Json(records)).into_response(),
        Err(e) => {
            warn!("subscription snapshot failed: {e}");
            (StatusCode::SERVICE_UNAVAILABLE, json_error("unavailable", e)).into_response()
        }
    }
}
