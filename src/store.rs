//! Durable key/value counter store.
//!
//! The xApp persists exactly one value, the subscription transaction id,
//! but the store interface is namespaced the way the platform's shared data
//! layer is: `get(namespace, key)` / `set(namespace, key, value)`.
//!
//! [`FileStore`] keeps all namespaces in one JSON file, rewritten through a
//! temp file + rename so a crash never leaves a half-written store.
//! [`TransactionCounter`] scopes a store to one namespace/key and moves the
//! blocking I/O onto `spawn_blocking`.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::AppError;

/// Blocking namespaced integer store. One writer per key is assumed.
pub trait CounterStore: Send + Sync {
    fn get(&self, namespace: &str, key: &str) -> Result<Option<i64>, AppError>;
    fn set(&self, namespace: &str, key: &str, value: i64) -> Result<(), AppError>;
}

// ── FileStore ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredValue {
    value: i64,
    /// RFC 3339 timestamp of the last write.
    updated_at: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreFile {
    #[serde(default)]
    namespaces: BTreeMap<String, BTreeMap<String, StoredValue>>,
}

pub struct FileStore {
    path: PathBuf,
    /// Serialises read-modify-write cycles within this process.
    write_lock: Mutex<()>,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), write_lock: Mutex::new(()) }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(&self) -> Result<StoreFile, AppError> {
        let data = match fs::read_to_string(&self.path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(StoreFile::default()),
            Err(e) => {
                return Err(AppError::Store(format!("cannot read {}: {e}", self.path.display())));
            }
        };
        serde_json::from_str(&data)
            .map_err(|e| AppError::Store(format!("malformed {}: {e}", self.path.display())))
    }

    fn write(&self, file: &StoreFile) -> Result<(), AppError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .map_err(|e| AppError::Store(format!("cannot create {}: {e}", parent.display())))?;
        }
        let data = serde_json::to_string_pretty(file)
            .map_err(|e| AppError::Store(format!("serialise store: {e}")))?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, data)
            .map_err(|e| AppError::Store(format!("cannot write {}: {e}", tmp.display())))?;
        fs::rename(&tmp, &self.path)
            .map_err(|e| AppError::Store(format!("cannot replace {}: {e}", self.path.display())))
    }
}

impl CounterStore for FileStore {
    fn get(&self, namespace: &str, key: &str) -> Result<Option<i64>, AppError> {
        let file = self.read()?;
        Ok(file
            .namespaces
            .get(namespace)
            .and_then(|ns| ns.get(key))
            .map(|v| v.value))
    }

    fn set(&self, namespace: &str, key: &str, value: i64) -> Result<(), AppError> {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut file = self.read()?;
        file.namespaces.entry(namespace.to_string()).or_default().insert(
            key.to_string(),
            StoredValue { value, updated_at: chrono::Utc::now().to_rfc3339() },
        );
        self.write(&file)
    }
}

// ── MemoryStore ───────────────────────────────────────────────────────────────

/// Volatile store. Values vanish with the process.
#[derive(Default)]
pub struct MemoryStore {
    values: Mutex<BTreeMap<(String, String), i64>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CounterStore for MemoryStore {
    fn get(&self, namespace: &str, key: &str) -> Result<Option<i64>, AppError> {
        let values = self.values.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(values.get(&(namespace.to_string(), key.to_string())).copied())
    }

    fn set(&self, namespace: &str, key: &str, value: i64) -> Result<(), AppError> {
        let mut values = self.values.lock().unwrap_or_else(PoisonError::into_inner);
        values.insert((namespace.to_string(), key.to_string()), value);
        Ok(())
    }
}

// ── TransactionCounter ────────────────────────────────────────────────────────

/// The transaction id counter: one key in one namespace of a [`CounterStore`].
#[derive(Clone)]
pub struct TransactionCounter {
    store: Arc<dyn CounterStore>,
    namespace: String,
    key: String,
    seed: i64,
}

impl TransactionCounter {
    pub fn new(
        store: Arc<dyn CounterStore>,
        namespace: impl Into<String>,
        key: impl Into<String>,
        seed: i64,
    ) -> Self {
        Self {
            store,
            namespace: namespace.into(),
            key: key.into(),
            seed,
        }
    }

    pub fn seed(&self) -> i64 {
        self.seed
    }

    /// Last stored value, `None` if never set.
    pub async fn get(&self) -> Result<Option<i64>, AppError> {
        let store = self.store.clone();
        let (ns, key) = (self.namespace.clone(), self.key.clone());
        tokio::task::spawn_blocking(move || store.get(&ns, &key))
            .await
            .map_err(|e| AppError::Store(format!("counter get join: {e}")))?
    }

    /// Persist `value`, overwriting any prior one.
    pub async fn set(&self, value: i64) -> Result<(), AppError> {
        let store = self.store.clone();
        let (ns, key) = (self.namespace.clone(), self.key.clone());
        tokio::task::spawn_blocking(move || store.set(&ns, &key, value))
            .await
            .map_err(|e| AppError::Store(format!("counter set join: {e}")))?
    }

    /// Starting transaction id for a batch: the stored value, or the seed
    /// when the store is empty or unreachable.
    pub async fn load_or_seed(&self) -> i64 {
        match self.get().await {
            Ok(Some(value)) => {
                debug!(namespace = %self.namespace, key = %self.key, value, "loaded transaction counter");
                value
            }
            Ok(None) => {
                debug!(seed = self.seed, "transaction counter unset, using seed");
                self.seed
            }
            Err(e) => {
                warn!(seed = self.seed, "transaction counter unavailable, using seed: {e}");
                self.seed
            }
        }
    }
}
