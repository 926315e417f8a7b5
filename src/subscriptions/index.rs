//! Bidirectional subscription index: subscription id → node, node → record.
//!
//! Invariant: every id in the id → node map points at a node whose record
//! carries that same id, and every record's id is in the id → node map.

use std::collections::{BTreeMap, HashMap};

use serde_json::Value;

use super::types::{SubscriptionError, SubscriptionRecord};

#[derive(Debug, Default)]
pub struct SubscriptionIndex {
    id_to_node: HashMap<String, String>,
    /// Ordered by node name so listings are stable.
    records: BTreeMap<String, SubscriptionRecord>,
}

impl SubscriptionIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Add or replace `record`. Any record that previously held the same node
    /// or the same subscription id is evicted and returned.
    pub fn insert(&mut self, record: SubscriptionRecord) -> Vec<SubscriptionRecord> {
        let mut evicted = Vec::new();

        if let Some(old) = self.records.remove(&record.node) {
            self.id_to_node.remove(&old.subscription_id);
            evicted.push(old);
        }
        if let Some(other_node) = self.id_to_node.remove(&record.subscription_id) {
            if let Some(old) = self.records.remove(&other_node) {
                evicted.push(old);
            }
        }

        self.id_to_node.insert(record.subscription_id.clone(), record.node.clone());
        self.records.insert(record.node.clone(), record);
        evicted
    }

    pub fn node_for(&self, subscription_id: &str) -> Option<&str> {
        self.id_to_node.get(subscription_id).map(String::as_str)
    }

    pub fn record(&self, node: &str) -> Option<&SubscriptionRecord> {
        self.records.get(node)
    }

    pub fn contains_node(&self, node: &str) -> bool {
        self.records.contains_key(node)
    }

    /// Attach confirmed instance data to the record owning `subscription_id`.
    pub fn confirm(
        &mut self,
        subscription_id: &str,
        instances: Option<Value>,
    ) -> Result<&SubscriptionRecord, SubscriptionError> {
        let node = self
            .id_to_node
            .get(subscription_id)
            .ok_or_else(|| SubscriptionError::UnknownSubscription(subscription_id.to_string()))?;
        let record = self
            .records
            .get_mut(node)
            .ok_or_else(|| SubscriptionError::UnknownSubscription(subscription_id.to_string()))?;
        record.instances = instances;
        Ok(record)
    }

    /// Drop the record for `subscription_id` from both maps.
    pub fn remove_by_id(&mut self, subscription_id: &str) -> Option<SubscriptionRecord> {
        let node = self.id_to_node.remove(subscription_id)?;
        self.records.remove(&node)
    }

    /// Tracked subscription ids, in node order.
    pub fn subscription_ids(&self) -> Vec<String> {
        self.records.values().map(|r| r.subscription_id.clone()).collect()
    }

    pub fn records(&self) -> Vec<SubscriptionRecord> {
        self.records.values().cloned().collect()
    }

    /// Whether both maps agree with each other.
    pub fn is_consistent(&self) -> bool {
        self.id_to_node.len() == self.records.len()
            && self.id_to_node.iter().all(|(id, node)| {
                self.records.get(node).is_some_and(|r| &r.subscription_id == id)
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(node: &str, id: &str, txid: i64) -> SubscriptionRecord {
        SubscriptionRecord {
            node: node.into(),
            subscription_id: id.into(),
            transaction_id: txid,
            instances: None,
        }
    }

    #[test]
    fn insert_indexes_both_directions() {
        let mut idx = SubscriptionIndex::new();
        assert!(idx.insert(record("nodeA", "abc", 1)).is_empty());
        assert_eq!(idx.node_for("abc"), Some("nodeA"));
        assert_eq!(idx.record("nodeA").unwrap().transaction_id, 1);
        assert!(idx.is_consistent());
    }

    #[test]
    fn reinsert_for_node_evicts_old_id() {
        let mut idx = SubscriptionIndex::new();
        idx.insert(record("nodeA", "old", 1));
        let evicted = idx.insert(record("nodeA", "new", 2));
        assert_eq!(evicted.len(), 1);
        assert_eq!(idx.node_for("old"), None);
        assert_eq!(idx.node_for("new"), Some("nodeA"));
        assert!(idx.is_consistent());
    }

    #[test]
    fn reused_id_evicts_other_node() {
        let mut idx = SubscriptionIndex::new();
        idx.insert(record("nodeA", "dup", 1));
        idx.insert(record("nodeB", "dup", 2));
        assert!(!idx.contains_node("nodeA"));
        assert_eq!(idx.node_for("dup"), Some("nodeB"));
        assert_eq!(idx.len(), 1);
        assert!(idx.is_consistent());
    }

    #[test]
    fn confirm_touches_only_the_owner() {
        let mut idx = SubscriptionIndex::new();
        idx.insert(record("nodeA", "abc", 1));
        idx.insert(record("nodeB", "def", 2));

        idx.confirm("abc", Some(json!([1, 2]))).unwrap();
        assert_eq!(idx.record("nodeA").unwrap().instances, Some(json!([1, 2])));
        assert_eq!(idx.record("nodeB").unwrap().instances, None);
    }

    #[test]
    fn confirm_unknown_id_changes_nothing() {
        let mut idx = SubscriptionIndex::new();
        idx.insert(record("nodeA", "abc", 1));
        let before = idx.records();
        let err = idx.confirm("zzz", Some(json!(1))).unwrap_err();
        assert_eq!(err, SubscriptionError::UnknownSubscription("zzz".into()));
        assert_eq!(idx.records(), before);
    }

    #[test]
    fn remove_by_id_clears_both_maps() {
        let mut idx = SubscriptionIndex::new();
        idx.insert(record("nodeA", "abc", 1));
        assert_eq!(idx.remove_by_id("abc").unwrap().node, "nodeA");
        assert!(idx.is_empty());
        assert_eq!(idx.node_for("abc"), None);
        assert!(idx.remove_by_id("abc").is_none());
    }
}
