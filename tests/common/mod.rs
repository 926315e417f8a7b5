//! Shared fixtures: an in-process fake subscription manager and a running
//! subscription service wired to it.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, post},
};
use serde_json::{Value, json};
use tempfile::TempDir;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use subreact_xapp::config::{ClientEndpointConfig, RequestTemplateConfig};
use subreact_xapp::store::{CounterStore, FileStore, TransactionCounter};
use subreact_xapp::subscriptions::{
    FileInventory, HttpSubmgrClient, NodeInventory, RequestTemplate, StaticInventory,
    SubscriptionHandle, SubscriptionManager, SubscriptionService,
};

pub const NAMESPACE: &str = "xapp4rmrsubreact";
pub const COUNTER_KEY: &str = "subscription_transaction_id";
pub const SEED: i64 = 54321;

// ── Fake subscription manager ─────────────────────────────────────────────────

#[derive(Default)]
pub struct FakeState {
    /// Bodies of every POST /subscriptions, in arrival order.
    pub posts: Vec<Value>,
    /// Ids of every DELETE /subscriptions/{id}, in arrival order.
    pub deletes: Vec<String>,
    /// Ids handed out before falling back to `<meid>-<n>`.
    pub assign_ids: VecDeque<String>,
    /// Nodes whose subscribe is answered with 500.
    pub reject_meids: Vec<String>,
    pub reject_deletes: bool,
    issued: u32,
}

#[derive(Clone, Default)]
pub struct FakeSubmgr {
    pub state: Arc<Mutex<FakeState>>,
}

impl FakeSubmgr {
    pub fn posts(&self) -> Vec<Value> {
        self.state.lock().unwrap().posts.clone()
    }

    pub fn deletes(&self) -> Vec<String> {
        self.state.lock().unwrap().deletes.clone()
    }

    pub fn txids(&self) -> Vec<i64> {
        self.posts()
            .iter()
            .map(|b| b["SubscriptionDetails"][0]["XappEventInstanceId"].as_i64().unwrap())
            .collect()
    }

    /// Serve on an ephemeral port; returns the REST base URL.
    pub async fn spawn(&self) -> String {
        let app = Router::new()
            .route("/ric/v1/subscriptions", post(create))
            .route("/ric/v1/subscriptions/{id}", delete(remove))
            .with_state(self.clone());
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}/ric/v1")
    }
}

async fn create(State(fake): State<FakeSubmgr>, Json(body): Json<Value>) -> Response {
    let mut st = fake.state.lock().unwrap();
    let meid = body["Meid"].as_str().unwrap_or_default().to_string();
    st.posts.push(body);
    if st.reject_meids.contains(&meid) {
        return (StatusCode::INTERNAL_SERVER_ERROR, "e2 node unavailable").into_response();
    }
    st.issued += 1;
    let issued = st.issued;
    let id = st.assign_ids.pop_front().unwrap_or_else(|| format!("{meid}-{issued}"));
    (
        StatusCode::CREATED,
        Json(json!({ "SubscriptionId": id, "SubscriptionInstances": null })),
    )
        .into_response()
}

async fn remove(State(fake): State<FakeSubmgr>, Path(id): Path<String>) -> StatusCode {
    let mut st = fake.state.lock().unwrap();
    st.deletes.push(id);
    if st.reject_deletes {
        StatusCode::INTERNAL_SERVER_ERROR
    } else {
        StatusCode::NO_CONTENT
    }
}

// ── Subscription service harness ──────────────────────────────────────────────

pub struct Harness {
    pub fake: FakeSubmgr,
    pub handle: SubscriptionHandle,
    pub shutdown: CancellationToken,
    pub task: JoinHandle<()>,
    pub store_path: PathBuf,
    pub submgr_url: String,
    pub tmp: TempDir,
}

impl Harness {
    pub async fn start(fake: FakeSubmgr, nodes: &[&str]) -> Self {
        let tmp = TempDir::new().unwrap();
        let inventory = Arc::new(StaticInventory::new(nodes.iter().copied()));
        Self::start_with(fake, inventory, tmp, true).await
    }

    /// Inventory read from a `nodes.json` in the harness temp dir.
    pub async fn start_with_file(fake: FakeSubmgr, nodes: &[&str]) -> Self {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("nodes.json");
        std::fs::write(&path, serde_json::to_string(nodes).unwrap()).unwrap();
        Self::start_with(fake, Arc::new(FileInventory::new(path)), tmp, true).await
    }

    pub async fn start_with(
        fake: FakeSubmgr,
        inventory: Arc<dyn NodeInventory>,
        tmp: TempDir,
        unsubscribe_on_shutdown: bool,
    ) -> Self {
        let submgr_url = fake.spawn().await;
        let store_path = tmp.path().join("store.json");
        let (handle, shutdown, task) =
            start_service(&submgr_url, inventory, &store_path, unsubscribe_on_shutdown);
        Self { fake, handle, shutdown, task, store_path, submgr_url, tmp }
    }

    pub fn write_nodes(&self, nodes: &[&str]) {
        std::fs::write(self.tmp.path().join("nodes.json"), serde_json::to_string(nodes).unwrap())
            .unwrap();
    }

    pub fn stored_counter(&self) -> Option<i64> {
        FileStore::new(&self.store_path).get(NAMESPACE, COUNTER_KEY).unwrap()
    }

    pub async fn stop(self) -> FakeSubmgr {
        self.shutdown.cancel();
        self.task.await.unwrap();
        self.fake
    }
}

pub fn start_service(
    submgr_url: &str,
    inventory: Arc<dyn NodeInventory>,
    store_path: &std::path::Path,
    unsubscribe_on_shutdown: bool,
) -> (SubscriptionHandle, CancellationToken, JoinHandle<()>) {
    let manager = SubscriptionManager::new(
        Arc::new(HttpSubmgrClient::new(submgr_url, Duration::from_secs(5)).unwrap()),
        inventory,
        TransactionCounter::new(Arc::new(FileStore::new(store_path)), NAMESPACE, COUNTER_KEY, SEED),
        RequestTemplate::new(
            ClientEndpointConfig {
                host: "service-ricxapp-xapp4rmrsubreact-http.ricxapp".into(),
                http_port: 8080,
                rmr_port: 4560,
            },
            RequestTemplateConfig::default(),
        ),
    );
    let (service, handle) = SubscriptionService::new(manager, 8, unsubscribe_on_shutdown);
    let shutdown = CancellationToken::new();
    let task = tokio::spawn(service.serve(shutdown.clone()));
    (handle, shutdown, task)
}
