//! Configuration loading with env-var overrides.
//!
//! Reads `config/default.toml` relative to the current working directory (or
//! the path given by `-f`/`XAPP_CONFIG`), then applies `XAPP_WORK_DIR`,
//! `XAPP_LOG_LEVEL` and `XAPP_SUBMGR_URL` env overrides.
//!
//! The resolved [`Config`] is `Serialize` so the control surface can expose
//! it verbatim at `GET /config`.

use std::{
    env, fs,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};

use crate::error::AppError;

pub const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

/// Control HTTP surface configuration (`[http]`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HttpConfig {
    /// Socket address the control surface binds to.
    #[serde(default = "default_http_bind")]
    pub bind: String,
    /// Path prefix every route is mounted under. Empty mounts at the root.
    #[serde(default = "default_route_prefix")]
    pub route_prefix: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self { bind: default_http_bind(), route_prefix: default_route_prefix() }
    }
}

/// Message bus configuration (`[bus]`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BusConfig {
    /// Port the bus transport listens on for inbound messages.
    #[serde(default = "default_rmr_port")]
    pub rmr_port: u16,
    /// Upper bound on how long one receive call waits for a batch.
    #[serde(default = "default_poll_wait_ms")]
    pub poll_wait_ms: u64,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self { rmr_port: default_rmr_port(), poll_wait_ms: default_poll_wait_ms() }
    }
}

/// Where the subscription manager should deliver callbacks for this xApp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientEndpointConfig {
    #[serde(default = "default_endpoint_host")]
    pub host: String,
    #[serde(default = "default_endpoint_http_port")]
    pub http_port: u16,
    #[serde(default = "default_rmr_port")]
    pub rmr_port: u16,
}

impl Default for ClientEndpointConfig {
    fn default() -> Self {
        Self {
            host: default_endpoint_host(),
            http_port: default_endpoint_http_port(),
            rmr_port: default_rmr_port(),
        }
    }
}

/// Fixed values copied into every subscription request body
/// (`[subscription.request]`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestTemplateConfig {
    #[serde(default = "default_ran_function_id")]
    pub ran_function_id: i64,
    #[serde(default = "default_e2_timer")]
    pub e2_timeout_timer_value: i64,
    #[serde(default = "default_e2_retry_count")]
    pub e2_retry_count: i64,
    #[serde(default = "default_true")]
    pub rmr_routing_needed: bool,
    #[serde(default = "default_event_triggers")]
    pub event_triggers: Vec<i64>,
    #[serde(default = "default_action_id")]
    pub action_id: i64,
    #[serde(default = "default_action_type")]
    pub action_type: String,
    #[serde(default = "default_action_definition")]
    pub action_definition: Vec<i64>,
    #[serde(default = "default_subsequent_action_type")]
    pub subsequent_action_type: String,
    #[serde(default = "default_time_to_wait")]
    pub time_to_wait: String,
}

impl Default for RequestTemplateConfig {
    fn default() -> Self {
        Self {
            ran_function_id: default_ran_function_id(),
            e2_timeout_timer_value: default_e2_timer(),
            e2_retry_count: default_e2_retry_count(),
            rmr_routing_needed: true,
            event_triggers: default_event_triggers(),
            action_id: default_action_id(),
            action_type: default_action_type(),
            action_definition: default_action_definition(),
            subsequent_action_type: default_subsequent_action_type(),
            time_to_wait: default_time_to_wait(),
        }
    }
}

/// Subscription manager configuration (`[subscription]`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubscriptionConfig {
    /// Base URI of the remote subscription-manager REST API.
    #[serde(default = "default_submgr_url")]
    pub submgr_url: String,
    /// Per-call timeout for subscribe/unsubscribe HTTP requests.
    #[serde(default = "default_request_timeout_seconds")]
    pub request_timeout_seconds: u64,
    #[serde(default = "default_true")]
    pub subscribe_on_start: bool,
    #[serde(default = "default_true")]
    pub unsubscribe_on_shutdown: bool,
    #[serde(default)]
    pub client_endpoint: ClientEndpointConfig,
    #[serde(default)]
    pub request: RequestTemplateConfig,
}

impl Default for SubscriptionConfig {
    fn default() -> Self {
        Self {
            submgr_url: default_submgr_url(),
            request_timeout_seconds: default_request_timeout_seconds(),
            subscribe_on_start: true,
            unsubscribe_on_shutdown: true,
            client_endpoint: ClientEndpointConfig::default(),
            request: RequestTemplateConfig::default(),
        }
    }
}

/// Durable counter store configuration (`[store]`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Store file; relative paths resolve against `work_dir`.
    #[serde(default = "default_store_file")]
    pub file: PathBuf,
    #[serde(default = "default_store_namespace")]
    pub namespace: String,
    #[serde(default = "default_counter_key")]
    pub counter_key: String,
    /// Transaction id used when the store holds no value yet.
    #[serde(default = "default_counter_seed")]
    pub counter_seed: i64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            file: default_store_file(),
            namespace: default_store_namespace(),
            counter_key: default_counter_key(),
            counter_seed: default_counter_seed(),
        }
    }
}

/// E2 node inventory configuration (`[inventory]`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InventoryConfig {
    /// Static node inventory names.
    #[serde(default)]
    pub nodes: Vec<String>,
    /// JSON array of node names, re-read on every lookup. Takes precedence
    /// over `nodes` when set.
    #[serde(default)]
    pub nodes_file: Option<PathBuf>,
}

/// Config file watcher (`[watch]`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WatchConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_watch_interval_ms")]
    pub interval_ms: u64,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self { enabled: true, interval_ms: default_watch_interval_ms() }
    }
}

/// Fully-resolved xApp configuration.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Config {
    pub xapp_name: String,
    /// Working directory for persistent data (already expanded, no `~`).
    pub work_dir: PathBuf,
    pub log_level: String,
    pub log_file: Option<PathBuf>,
    pub http: HttpConfig,
    pub bus: BusConfig,
    pub subscription: SubscriptionConfig,
    pub store: StoreConfig,
    pub inventory: InventoryConfig,
    pub watch: WatchConfig,
}

impl Config {
    /// Absolute (or work-dir relative) location of the counter store file.
    pub fn store_path(&self) -> PathBuf {
        if self.store.file.is_absolute() {
            self.store.file.clone()
        } else {
            self.work_dir.join(&self.store.file)
        }
    }
}

/// Explicit overrides applied on top of the TOML values.
///
/// [`Overrides::from_env`] fills these from the environment; tests pass them directly
/// instead of mutating env vars.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub work_dir: Option<String>,
    pub log_level: Option<String>,
    pub submgr_url: Option<String>,
}

impl Overrides {
    pub fn from_env() -> Self {
        Self {
            work_dir: env::var("XAPP_WORK_DIR").ok(),
            log_level: env::var("XAPP_LOG_LEVEL").ok(),
            submgr_url: env::var("XAPP_SUBMGR_URL").ok(),
        }
    }
}

/// Raw TOML shape, the `serde` target before resolution.
#[derive(Deserialize)]
struct RawConfig {
    xapp: RawXapp,
    #[serde(default)]
    http: HttpConfig,
    #[serde(default)]
    bus: BusConfig,
    #[serde(default)]
    subscription: SubscriptionConfig,
    #[serde(default)]
    store: StoreConfig,
    #[serde(default)]
    inventory: InventoryConfig,
    #[serde(default)]
    watch: WatchConfig,
}

#[derive(Deserialize)]
struct RawXapp {
    name: String,
    work_dir: String,
    #[serde(default = "default_log_level")]
    log_level: String,
    #[serde(default)]
    log_file: Option<String>,
}

fn default_log_level() -> String { "info".to_string() }
fn default_http_bind() -> String { "0.0.0.0:8080".to_string() }
fn default_route_prefix() -> String { "/ric/v1".to_string() }
fn default_rmr_port() -> u16 { 4560 }
fn default_poll_wait_ms() -> u64 { 100 }
fn default_endpoint_host() -> String { "service-ricxapp-xapp4rmrsubreact-http.ricxapp".to_string() }
fn default_endpoint_http_port() -> u16 { 8080 }
fn default_ran_function_id() -> i64 { 1 }
fn default_e2_timer() -> i64 { 2 }
fn default_e2_retry_count() -> i64 { 2 }
fn default_event_triggers() -> Vec<i64> { vec![2] }
fn default_action_id() -> i64 { 1 }
fn default_action_type() -> String { "insert".to_string() }
fn default_action_definition() -> Vec<i64> { vec![3] }
fn default_subsequent_action_type() -> String { "continue".to_string() }
fn default_time_to_wait() -> String { "w10ms".to_string() }
fn default_submgr_url() -> String { "http://service-ricplt-submgr-http.ricplt:8088/ric/v1".to_string() }
fn default_request_timeout_seconds() -> u64 { 10 }
fn default_store_file() -> PathBuf { PathBuf::from("xapp-store.json") }
fn default_store_namespace() -> String { "xapp4rmrsubreact".to_string() }
fn default_counter_key() -> String { "subscription_transaction_id".to_string() }
fn default_counter_seed() -> i64 { 54321 }
fn default_watch_interval_ms() -> u64 { 2000 }

fn default_true() -> bool {
    true
}

/// Resolve the config path: explicit argument, then `XAPP_CONFIG`, then
/// [`DEFAULT_CONFIG_PATH`].
pub fn resolve_path(explicit: Option<&str>) -> PathBuf {
    explicit
        .map(PathBuf::from)
        .or_else(|| env::var("XAPP_CONFIG").ok().map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

/// Load config from `path` (see [`resolve_path`]) and apply `overrides`,
/// usually [`Overrides::from_env`].
pub fn load_from(path: &Path, overrides: &Overrides) -> Result<Config, AppError> {
    let raw = fs::read_to_string(path)
        .map_err(|e| AppError::Config(format!("cannot read {}: {e}", path.display())))?;
    parse(&raw, &path.display().to_string(), overrides)
}

/// Parse TOML text into a resolved [`Config`]. `source` names the origin in
/// error messages.
pub fn parse(raw: &str, source: &str, overrides: &Overrides) -> Result<Config, AppError> {
    let parsed: RawConfig = toml::from_str(raw)
        .map_err(|e| AppError::Config(format!("parse error in {source}: {e}")))?;

    let x = parsed.xapp;

    let work_dir_str = overrides.work_dir.as_deref().unwrap_or(&x.work_dir);
    let work_dir = expand_home(work_dir_str);
    let log_level = overrides.log_level.clone().unwrap_or(x.log_level);
    crate::logger::parse_level(&log_level)
        .map_err(|e| AppError::Config(format!("{source}: {e}")))?;

    let mut subscription = parsed.subscription;
    if let Some(url) = &overrides.submgr_url {
        subscription.submgr_url = url.clone();
    }
    subscription.submgr_url = subscription.submgr_url.trim_end_matches('/').to_string();
    if subscription.submgr_url.is_empty() {
        return Err(AppError::Config(format!("{source}: subscription.submgr_url must not be empty")));
    }

    let mut http = parsed.http;
    http.route_prefix = normalise_prefix(&http.route_prefix)
        .map_err(|e| AppError::Config(format!("{source}: {e}")))?;

    Ok(Config {
        xapp_name: x.name,
        work_dir,
        log_level,
        log_file: x.log_file.map(|p| expand_home(&p)),
        http,
        bus: parsed.bus,
        subscription,
        store: parsed.store,
        inventory: parsed.inventory,
        watch: parsed.watch,
    })
}

/// Strip trailing slashes; `"/"` becomes the empty (root) prefix.
fn normalise_prefix(prefix: &str) -> Result<String, String> {
    let trimmed = prefix.trim_end_matches('/');
    if trimmed.is_empty() {
        return Ok(String::new());
    }
    if !trimmed.starts_with('/') {
        return Err(format!("http.route_prefix must start with '/': {prefix:?}"));
    }
    Ok(trimmed.to_string())
}

/// Expand a leading `~` to the user's home directory.
/// Absolute or relative paths without `~` are returned unchanged.
pub fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    if path == "~" {
        if let Some(home) = dirs::home_dir() {
            return home;
        }
    }
    PathBuf::from(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const MINIMAL_TOML: &str = r#"
[xapp]
name = "test-xapp"
work_dir = "~/.xapp"
log_level = "info"
"#;

    fn write_toml(content: &str) -> NamedTempFile {
        let mut f = NamedTempFile::new().unwrap();
        f.write_all(content.as_bytes()).unwrap();
        f
    }

    #[test]
    fn parse_minimal_config_uses_defaults() {
        let f = write_toml(MINIMAL_TOML);
        let cfg = load_from(f.path(), &Overrides::default()).unwrap();
        assert_eq!(cfg.xapp_name, "test-xapp");
        assert_eq!(cfg.log_level, "info");
        assert_eq!(cfg.http.route_prefix, "/ric/v1");
        assert_eq!(cfg.bus.rmr_port, 4560);
        assert_eq!(cfg.store.counter_seed, 54321);
        assert_eq!(cfg.store.namespace, "xapp4rmrsubreact");
        assert_eq!(cfg.subscription.request.event_triggers, vec![2]);
        assert_eq!(cfg.subscription.request.time_to_wait, "w10ms");
        assert!(cfg.subscription.subscribe_on_start);
        assert!(cfg.inventory.nodes.is_empty());
    }

    #[test]
    fn full_sections_parse() {
        let f = write_toml(
            r#"
[xapp]
name = "x"
work_dir = "/var/lib/xapp"

[http]
bind = "127.0.0.1:9090"
route_prefix = "/"

[subscription]
submgr_url = "http://submgr:8088/ric/v1/"
request_timeout_seconds = 3

[subscription.client_endpoint]
host = "my-xapp"
http_port = 9090

[store]
file = "/tmp/counter.json"
counter_seed = 100

[inventory]
nodes = ["gnb_1", "gnb_2"]
"#,
        );
        let cfg = load_from(f.path(), &Overrides::default()).unwrap();
        assert_eq!(cfg.http.bind, "127.0.0.1:9090");
        assert_eq!(cfg.http.route_prefix, "");
        assert_eq!(cfg.subscription.submgr_url, "http://submgr:8088/ric/v1");
        assert_eq!(cfg.subscription.client_endpoint.host, "my-xapp");
        assert_eq!(cfg.subscription.client_endpoint.rmr_port, 4560);
        assert_eq!(cfg.store.counter_seed, 100);
        assert_eq!(cfg.store_path(), PathBuf::from("/tmp/counter.json"));
        assert_eq!(cfg.inventory.nodes, vec!["gnb_1", "gnb_2"]);
    }

    #[test]
    fn relative_store_file_joins_work_dir() {
        let f = write_toml(MINIMAL_TOML);
        let cfg = load_from(f.path(), &Overrides {
            work_dir: Some("/srv/xapp".into()),
            ..Overrides::default()
        })
        .unwrap();
        assert_eq!(cfg.store_path(), PathBuf::from("/srv/xapp/xapp-store.json"));
    }

    #[test]
    fn tilde_expands_to_home() {
        let home = dirs::home_dir().expect("home dir must exist in test env");
        let expanded = expand_home("~/.xapp");
        assert!(expanded.starts_with(&home));
        assert!(expanded.ends_with(".xapp"));
    }

    #[test]
    fn absolute_path_unchanged() {
        assert_eq!(expand_home("/absolute/path"), PathBuf::from("/absolute/path"));
    }

    #[test]
    fn missing_file_errors() {
        let result = load_from(Path::new("/nonexistent/config.toml"), &Overrides::default());
        let msg = result.unwrap_err().to_string();
        assert!(msg.contains("config error"));
    }

    #[test]
    fn missing_xapp_section_errors() {
        let result = parse("[http]\nbind = \"0.0.0.0:1\"\n", "inline", &Overrides::default());
        assert!(matches!(result, Err(AppError::Config(msg)) if msg.contains("parse error")));
    }

    #[test]
    fn unknown_log_level_errors() {
        let toml = MINIMAL_TOML.replace("log_level = \"info\"", "log_level = \"chatty\"");
        let err = parse(&toml, "inline", &Overrides::default()).unwrap_err();
        assert!(matches!(err, AppError::Config(msg) if msg.contains("chatty")));
    }

    #[test]
    fn bad_route_prefix_errors() {
        let toml = format!("{MINIMAL_TOML}\n[http]\nroute_prefix = \"ric\"\n");
        assert!(parse(&toml, "inline", &Overrides::default()).is_err());
    }

    #[test]
    fn overrides_win_over_file() {
        let f = write_toml(MINIMAL_TOML);
        let cfg = load_from(f.path(), &Overrides {
            work_dir: Some("/tmp/test-override".into()),
            log_level: Some("debug".into()),
            submgr_url: Some("http://localhost:1/".into()),
        })
        .unwrap();
        assert_eq!(cfg.work_dir, PathBuf::from("/tmp/test-override"));
        assert_eq!(cfg.log_level, "debug");
        assert_eq!(cfg.subscription.submgr_url, "http://localhost:1");
    }

    #[test]
    fn config_serialises_to_json() {
        let cfg = parse(MINIMAL_TOML, "inline", &Overrides::default()).unwrap();
        let json = serde_json::to_value(&cfg).unwrap();
        assert_eq!(json["xapp_name"], "test-xapp");
        assert_eq!(json["store"]["counter_key"], "subscription_transaction_id");
    }

    #[test]
    fn shipped_default_config_parses() {
        let raw = include_str!("../config/default.toml");
        let cfg = parse(raw, DEFAULT_CONFIG_PATH, &Overrides::default()).unwrap();
        assert_eq!(cfg.store.counter_seed, 54321);
        assert_eq!(cfg.http.route_prefix, "/ric/v1");
        assert!(cfg.inventory.nodes.is_empty());
    }
}
