//! Subscription data model and the subscription-manager REST wire schema.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::config::{ClientEndpointConfig, RequestTemplateConfig};

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SubscriptionError {
    /// Network or transport failure talking to the subscription manager.
    #[error("request to subscription manager failed: {0}")]
    RequestFailed(String),

    /// The subscription manager answered with a non-2xx status.
    #[error("subscription manager returned status {status}: {body}")]
    UnexpectedStatus { status: u16, body: String },

    /// A confirmation referenced an id this xApp is not tracking.
    #[error("unknown subscription id {0:?}")]
    UnknownSubscription(String),

    /// The durable transaction counter could not be read or written.
    #[error("transaction counter store unavailable: {0}")]
    StoreUnavailable(String),
}

// ── Local model ───────────────────────────────────────────────────────────────

/// An E2 node as named by the inventory.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Node {
    pub inventory_name: String,
}

impl Node {
    pub fn new(inventory_name: impl Into<String>) -> Self {
        Self { inventory_name: inventory_name.into() }
    }
}

/// One node this xApp has subscribed to (or is waiting on).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubscriptionRecord {
    pub node: String,
    pub subscription_id: String,
    pub transaction_id: i64,
    /// Instance data from the subscription manager, `None` until known.
    pub instances: Option<Value>,
}

/// Per-target outcome of a subscribe or unsubscribe batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TargetFailure {
    pub target: String,
    pub error: String,
}

/// Outcome of one batch operation. Targets are node names for subscribe
/// and subscription ids for unsubscribe.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    pub succeeded: Vec<String>,
    pub failed: Vec<TargetFailure>,
    /// Nodes left alone because they already had a subscription.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub skipped: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ResubscribeReport {
    pub unsubscribed: BatchReport,
    pub subscribed: BatchReport,
}

// ── Wire schema: POST {submgr}/subscriptions ──────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SubscriptionParams {
    pub subscription_id: String,
    pub client_endpoint: ClientEndpoint,
    pub meid: String,
    #[serde(rename = "RANFunctionID")]
    pub ran_function_id: i64,
    pub e2_subscription_directives: E2SubscriptionDirectives,
    pub subscription_details: Vec<SubscriptionDetail>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientEndpoint {
    #[serde(rename = "Host")]
    pub host: String,
    #[serde(rename = "HTTPPort")]
    pub http_port: u16,
    #[serde(rename = "RMRPort")]
    pub rmr_port: u16,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct E2SubscriptionDirectives {
    #[serde(rename = "E2TimeoutTimerValue")]
    pub e2_timeout_timer_value: i64,
    #[serde(rename = "E2RetryCount")]
    pub e2_retry_count: i64,
    #[serde(rename = "RMRRoutingNeeded")]
    pub rmr_routing_needed: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SubscriptionDetail {
    pub xapp_event_instance_id: i64,
    pub event_triggers: Vec<i64>,
    pub action_to_be_setup_list: Vec<ActionToBeSetup>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ActionToBeSetup {
    #[serde(rename = "ActionID")]
    pub action_id: i64,
    pub action_type: String,
    pub action_definition: Vec<i64>,
    pub subsequent_action: SubsequentAction,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SubsequentAction {
    pub subsequent_action_type: String,
    pub time_to_wait: String,
}

/// Body of the subscription manager's create response, and of the
/// confirmation it later posts back to `/subscriptions/response`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SubscriptionResponse {
    pub subscription_id: String,
    #[serde(default)]
    pub subscription_instances: Option<Value>,
}

// ── Request template ──────────────────────────────────────────────────────────

/// Everything in a subscription request except the node and transaction id.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestTemplate {
    pub endpoint: ClientEndpointConfig,
    pub request: RequestTemplateConfig,
}

impl RequestTemplate {
    pub fn new(endpoint: ClientEndpointConfig, request: RequestTemplateConfig) -> Self {
        Self { endpoint, request }
    }

    /// Request body subscribing `node` under `transaction_id`.
    pub fn build(&self, node: &str, transaction_id: i64) -> SubscriptionParams {
        let r = &self.request;
        SubscriptionParams {
            subscription_id: String::new(),
            client_endpoint: ClientEndpoint {
                host: self.endpoint.host.clone(),
                http_port: self.endpoint.http_port,
                rmr_port: self.endpoint.rmr_port,
            },
            meid: node.to_string(),
            ran_function_id: r.ran_function_id,
            e2_subscription_directives: E2SubscriptionDirectives {
                e2_timeout_timer_value: r.e2_timeout_timer_value,
                e2_retry_count: r.e2_retry_count,
                rmr_routing_needed: r.rmr_routing_needed,
            },
            subscription_details: vec![SubscriptionDetail {
                xapp_event_instance_id: transaction_id,
                event_triggers: r.event_triggers.clone(),
                action_to_be_setup_list: vec![ActionToBeSetup {
                    action_id: r.action_id,
                    action_type: r.action_type.clone(),
                    action_definition: r.action_definition.clone(),
                    subsequent_action: SubsequentAction {
                        subsequent_action_type: r.subsequent_action_type.clone(),
                        time_to_wait: r.time_to_wait.clone(),
                    },
                }],
            }],
        }
    }
}
