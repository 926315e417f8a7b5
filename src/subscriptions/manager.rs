//! Subscription lifecycle against the remote subscription manager.
//!
//! [`SubscriptionManager`] owns the [`SubscriptionIndex`] outright; callers
//! reach it through the service actor in the parent module, so every
//! operation here runs to completion before the next one starts.
//!
//! # Transaction ids
//!
//! A subscribe batch reads the counter once (falling back to the seed), hands
//! out consecutive ids, and persists `next id` after each node the remote
//! accepted. Failed nodes do not consume an id. A failed write is logged and
//! the batch continues.

use std::collections::HashSet;
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::store::TransactionCounter;

use super::client::SubmgrClient;
use super::index::SubscriptionIndex;
use super::inventory::NodeInventory;
use super::types::{
    BatchReport, Node, RequestTemplate, ResubscribeReport, SubscriptionError, SubscriptionRecord,
    TargetFailure,
};

pub struct SubscriptionManager {
    client: Arc<dyn SubmgrClient>,
    inventory: Arc<dyn NodeInventory>,
    counter: TransactionCounter,
    template: RequestTemplate,
    index: SubscriptionIndex,
}

impl SubscriptionManager {
    pub fn new(
        client: Arc<dyn SubmgrClient>,
        inventory: Arc<dyn NodeInventory>,
        counter: TransactionCounter,
        template: RequestTemplate,
    ) -> Self {
        Self {
            client,
            inventory,
            counter,
            template,
            index: SubscriptionIndex::new(),
        }
    }

    pub fn index(&self) -> &SubscriptionIndex {
        &self.index
    }

    /// Inventory nodes, de-duplicated in first-seen order. Lookup failures
    /// yield an empty list.
    async fn candidate_nodes(&self) -> Vec<Node> {
        let inventory = self.inventory.clone();
        let result = match tokio::task::spawn_blocking(move || inventory.nodes()).await {
            Ok(result) => result,
            Err(e) => {
                warn!("inventory lookup task failed: {e}");
                return Vec::new();
            }
        };
        match result {
            Ok(nodes) => {
                let mut seen = HashSet::new();
                nodes
                    .into_iter()
                    .filter(|n| seen.insert(n.inventory_name.clone()))
                    .collect()
            }
            Err(e) => {
                warn!("inventory lookup failed: {e}");
                Vec::new()
            }
        }
    }

    async fn persist_counter(&self, next: i64) {
        if let Err(e) = self.counter.set(next).await {
            let err = SubscriptionError::StoreUnavailable(e.to_string());
            warn!(next_transaction_id = next, "{err}");
        }
    }

    /// The id after `txid`. The counter restarts from the seed once the id
    /// space is exhausted.
    fn next_txid(&self, txid: i64) -> i64 {
        txid.checked_add(1).unwrap_or_else(|| {
            let err = SubscriptionError::StoreUnavailable(format!("transaction id {txid} cannot advance"));
            warn!(seed = self.counter.seed(), "{err}; restarting from seed");
            self.counter.seed()
        })
    }

    /// Subscribe every inventory node that is not already tracked.
    pub async fn subscribe_all(&mut self) -> BatchReport {
        let nodes = self.candidate_nodes().await;
        let mut report = BatchReport::default();
        if nodes.is_empty() {
            info!("no E2 nodes in inventory; nothing to subscribe");
            return report;
        }

        let mut txid = self.counter.load_or_seed().await;
        for node in nodes {
            let name = node.inventory_name;
            if self.index.contains_node(&name) {
                debug!(node = %name, "already subscribed; skipping");
                report.skipped.push(name);
                continue;
            }

            let params = self.template.build(&name, txid);
            info!(node = %name, transaction_id = txid, "sending subscription request");

            let outcome = match self.client.subscribe(&params).await {
                Ok(resp) if resp.subscription_id.is_empty() => Err(SubscriptionError::RequestFailed(
                    "response carried no subscription id".into(),
                )),
                other => other,
            };

            match outcome {
                Ok(resp) => {
                    let record = SubscriptionRecord {
                        node: name.clone(),
                        subscription_id: resp.subscription_id,
                        transaction_id: txid,
                        instances: resp.subscription_instances,
                    };
                    info!(
                        node = %name,
                        subscription_id = %record.subscription_id,
                        transaction_id = txid,
                        "subscription created"
                    );
                    for evicted in self.index.insert(record) {
                        warn!(
                            node = %evicted.node,
                            subscription_id = %evicted.subscription_id,
                            "subscription id reassigned; dropped stale record"
                        );
                    }
                    txid = self.next_txid(txid);
                    self.persist_counter(txid).await;
                    report.succeeded.push(name);
                }
                Err(e) => {
                    warn!(node = %name, transaction_id = txid, "subscription failed: {e}");
                    report.failed.push(TargetFailure { target: name, error: e.to_string() });
                }
            }
        }

        info!(
            succeeded = report.succeeded.len(),
            failed = report.failed.len(),
            skipped = report.skipped.len(),
            "subscribe batch finished"
        );
        report
    }

    /// Delete every tracked subscription. Local records are dropped whether
    /// or not the remote delete succeeded.
    pub async fn unsubscribe_all(&mut self) -> BatchReport {
        let mut report = BatchReport::default();
        for id in self.index.subscription_ids() {
            let result = self.client.unsubscribe(&id).await;
            let node = self.index.remove_by_id(&id).map(|r| r.node).unwrap_or_default();
            match result {
                Ok(()) => {
                    info!(subscription_id = %id, %node, "subscription deleted");
                    report.succeeded.push(id);
                }
                Err(e) => {
                    warn!(subscription_id = %id, %node, "unsubscribe failed, record dropped anyway: {e}");
                    report.failed.push(TargetFailure { target: id, error: e.to_string() });
                }
            }
        }
        if !report.succeeded.is_empty() || !report.failed.is_empty() {
            info!(
                succeeded = report.succeeded.len(),
                failed = report.failed.len(),
                "unsubscribe batch finished"
            );
        }
        report
    }

    /// Unsubscribe everything, then subscribe the current inventory.
    pub async fn resubscribe(&mut self) -> ResubscribeReport {
        let unsubscribed = self.unsubscribe_all().await;
        let subscribed = self.subscribe_all().await;
        ResubscribeReport { unsubscribed, subscribed }
    }

    /// Record the instance data the remote posted for `subscription_id`.
    pub fn confirm(
        &mut self,
        subscription_id: &str,
        instances: Option<Value>,
    ) -> Result<(), SubscriptionError> {
        let record = self.index.confirm(subscription_id, instances)?;
        info!(
            subscription_id,
            node = %record.node,
            "subscription confirmed"
        );
        Ok(())
    }

    pub fn snapshot(&self) -> Vec<SubscriptionRecord> {
        self.index.records()
    }
}
