//! Where the list of E2 nodes to subscribe to comes from.

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use crate::config::InventoryConfig;
use crate::error::AppError;

use super::types::Node;

/// Source of E2 node names. Called once per subscribe batch.
pub trait NodeInventory: Send + Sync {
    fn nodes(&self) -> Result<Vec<Node>, AppError>;
}

/// Fixed list, typically from the `[inventory] nodes` config key.
#[derive(Debug, Clone, Default)]
pub struct StaticInventory {
    nodes: Vec<Node>,
}

impl StaticInventory {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self { nodes: names.into_iter().map(Node::new).collect() }
    }
}

impl NodeInventory for StaticInventory {
    fn nodes(&self) -> Result<Vec<Node>, AppError> {
        Ok(self.nodes.clone())
    }
}

/// JSON array of node names, re-read on every lookup so an external agent
/// can rewrite it between batches.
#[derive(Debug, Clone)]
pub struct FileInventory {
    path: PathBuf,
}

impl FileInventory {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl NodeInventory for FileInventory {
    fn nodes(&self) -> Result<Vec<Node>, AppError> {
        let raw = fs::read_to_string(&self.path).map_err(|e| {
            AppError::Subscription(format!("cannot read inventory {}: {e}", self.path.display()))
        })?;
        let names: Vec<String> = serde_json::from_str(&raw).map_err(|e| {
            AppError::Subscription(format!("malformed inventory {}: {e}", self.path.display()))
        })?;
        Ok(names.into_iter().map(Node::new).collect())
    }
}

/// File-backed when `nodes_file` is set, otherwise the static list.
pub fn from_config(cfg: &InventoryConfig) -> Arc<dyn NodeInventory> {
    match &cfg.nodes_file {
        Some(path) => Arc::new(FileInventory::new(path.clone())),
        None => Arc::new(StaticInventory::new(cfg.nodes.iter().cloned())),
    }
}
