//! Config change notification.
//!
//! [`ConfigWatcher`] polls the config file and, when its contents change and
//! still parse, hands the new [`Config`] to every registered
//! [`ConfigChangeHandler`]. [`SharedConfig`] is the handler behind
//! `GET /config`.

use std::path::PathBuf;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::{self, Config, Overrides};
use crate::error::AppError;
use crate::runtime::{Component, ComponentFuture};

/// Receives the freshly parsed config after the file changed.
pub trait ConfigChangeHandler: Send + Sync {
    fn on_config_change(&self, config: &Config);
}

/// The current config as JSON, readable from any task.
#[derive(Clone)]
pub struct SharedConfig {
    inner: Arc<RwLock<Value>>,
}

impl SharedConfig {
    pub fn new(config: &Config) -> Self {
        Self { inner: Arc::new(RwLock::new(to_json(config))) }
    }

    pub fn snapshot(&self) -> Value {
        self.inner.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn replace(&self, config: &Config) {
        *self.inner.write().unwrap_or_else(PoisonError::into_inner) = to_json(config);
    }
}

fn to_json(config: &Config) -> Value {
    serde_json::to_value(config).unwrap_or_else(|e| {
        warn!("config not representable as JSON: {e}");
        Value::Null
    })
}

impl ConfigChangeHandler for SharedConfig {
    fn on_config_change(&self, config: &Config) {
        self.replace(config);
    }
}

pub struct ConfigWatcher {
    path: PathBuf,
    overrides: Overrides,
    interval: Duration,
    handlers: Vec<Arc<dyn ConfigChangeHandler>>,
    last: Option<String>,
}

impl ConfigWatcher {
    /// The file's current contents become the baseline; only later edits
    /// are reported.
    pub fn new(path: impl Into<PathBuf>, overrides: Overrides, interval: Duration) -> Self {
        let path = path.into();
        let last = std::fs::read_to_string(&path).ok();
        Self { path, overrides, interval, handlers: Vec::new(), last }
    }

    pub fn with_handler(mut self, handler: Arc<dyn ConfigChangeHandler>) -> Self {
        self.handlers.push(handler);
        self
    }

    /// Check the file once. Returns `true` if handlers were notified.
    pub async fn poll(&mut self) -> bool {
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(e) => {
                debug!(path = %self.path.display(), "config unreadable: {e}");
                return false;
            }
        };
        if self.last.as_deref() == Some(raw.as_str()) {
            return false;
        }

        let parsed = config::parse(&raw, &self.path.display().to_string(), &self.overrides);
        self.last = Some(raw);
        match parsed {
            Ok(cfg) => {
                info!(path = %self.path.display(), handlers = self.handlers.len(), "config changed");
                for handler in &self.handlers {
                    handler.on_config_change(&cfg);
                }
                true
            }
            Err(e) => {
                warn!("ignoring config change: {e}");
                false
            }
        }
    }
}

impl Component for ConfigWatcher {
    fn id(&self) -> &str {
        "config-watch"
    }

    fn run(mut self: Box<Self>, shutdown: CancellationToken) -> ComponentFuture {
        Box::pin(async move {
            info!(path = %self.path.display(), interval_ms = self.interval.as_millis() as u64, "config watcher running");
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = tokio::time::sleep(self.interval) => {
                        self.poll().await;
                    }
                }
            }
            Ok::<(), AppError>(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use tempfile::TempDir;

    const BASE: &str = "[xapp]\nname = \"a\"\nwork_dir = \"/tmp\"\n";

    #[derive(Default)]
    struct Recorder(Mutex<Vec<String>>);

    impl ConfigChangeHandler for Recorder {
        fn on_config_change(&self, config: &Config) {
            self.0.lock().unwrap().push(config.xapp_name.clone());
        }
    }

    #[tokio::test]
    async fn notifies_only_on_valid_change() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, BASE).unwrap();

        let recorder = Arc::new(Recorder::default());
        let mut watcher = ConfigWatcher::new(&path, Overrides::default(), Duration::from_millis(10))
            .with_handler(recorder.clone());

        assert!(!watcher.poll().await);

        std::fs::write(&path, BASE.replace("\"a\"", "\"b\"")).unwrap();
        assert!(watcher.poll().await);
        assert!(!watcher.poll().await);

        std::fs::write(&path, "not toml [").unwrap();
        assert!(!watcher.poll().await);

        assert_eq!(*recorder.0.lock().unwrap(), ["b"]);
    }

    #[tokio::test]
    async fn shared_config_follows_changes() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, BASE).unwrap();
        let cfg = config::load_from(&path, &Overrides::default()).unwrap();

        let shared = SharedConfig::new(&cfg);
        assert_eq!(shared.snapshot()["xapp_name"], "a");

        let mut watcher = ConfigWatcher::new(&path, Overrides::default(), Duration::from_millis(10))
            .with_handler(Arc::new(shared.clone()));
        std::fs::write(&path, BASE.replace("\"a\"", "\"c\"")).unwrap();
        watcher.poll().await;

        assert_eq!(shared.snapshot()["xapp_name"], "c");
    }
}
