//! subreact-xapp entry point.
//!
//! Startup sequence:
//!   1. Load .env (if present)
//!   2. Parse CLI, load config
//!   3. Resolve effective log level (CLI `-v` flags > env > config)
//!   4. Init logger once
//!   5. Build counter store, node inventory and submgr client
//!   6. Build dispatch table with the built-in handlers
//!   7. Spawn Ctrl-C / SIGTERM → shutdown signal watcher
//!   8. Spawn components (dispatch, subscriptions, control, config watch)
//!   9. Initial subscribe, then mark ready
//!  10. Join components (subscriptions are dropped on the way out)

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use subreact_xapp::bus::{BusTransport, LoopbackTransport};
use subreact_xapp::config::{self, Overrides};
use subreact_xapp::dispatch::{DispatchLoop, DispatchTable, register_builtin_handlers};
use subreact_xapp::error::AppError;
use subreact_xapp::logger;
use subreact_xapp::runtime::{Component, spawn_components};
use subreact_xapp::store::{FileStore, TransactionCounter};
use subreact_xapp::subscriptions::{
    HttpSubmgrClient, RequestTemplate, SubscriptionManager, SubscriptionService, inventory,
};
use subreact_xapp::watch::{ConfigWatcher, SharedConfig};

#[cfg(feature = "control-http")]
use subreact_xapp::control::{ControlChannel, ControlState, HealthProbe};

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), AppError> {
    // Load .env if present; the file is optional.
    let _ = dotenvy::dotenv();

    let args = parse_cli_args();

    let config_path = config::resolve_path(args.config_path.as_deref());
    let overrides = Overrides::from_env();
    let config = config::load_from(&config_path, &overrides)?;

    let effective_log_level = args.log_level.unwrap_or(config.log_level.as_str());
    let force_cli_level = args.log_level.is_some();

    logger::init(effective_log_level, force_cli_level, config.log_file.as_deref())?;

    info!(
        xapp_name = %config.xapp_name,
        config = %config_path.display(),
        work_dir = %config.work_dir.display(),
        effective_log_level = %effective_log_level,
        submgr = %config.subscription.submgr_url,
        "config loaded"
    );

    // Subscription side.
    let store = Arc::new(FileStore::new(config.store_path()));
    info!(store = %store.path().display(), "counter store ready");
    let counter = TransactionCounter::new(
        store,
        config.store.namespace.clone(),
        config.store.counter_key.clone(),
        config.store.counter_seed,
    );
    let client = HttpSubmgrClient::new(
        config.subscription.submgr_url.clone(),
        Duration::from_secs(config.subscription.request_timeout_seconds),
    )?;
    let manager = SubscriptionManager::new(
        Arc::new(client),
        inventory::from_config(&config.inventory),
        counter,
        RequestTemplate::new(
            config.subscription.client_endpoint.clone(),
            config.subscription.request.clone(),
        ),
    );
    let (service, subscriptions) =
        SubscriptionService::new(manager, 32, config.subscription.unsubscribe_on_shutdown);

    // Bus side.
    let transport: Arc<dyn BusTransport> = Arc::new(LoopbackTransport::new());
    warn!(rmr_port = config.bus.rmr_port, "no external bus transport wired in; using in-process loopback");

    let mut builder = DispatchTable::builder();
    register_builtin_handlers(&mut builder).map_err(|e| AppError::Bus(e.to_string()))?;
    let dispatch = DispatchLoop::new(
        transport.clone(),
        builder.build(),
        Duration::from_millis(config.bus.poll_wait_ms),
    );

    // Shared shutdown token. Signals cancel it; every component watches it.
    let shutdown = CancellationToken::new();
    spawn_signal_watcher(shutdown.clone());

    let shared_config = SharedConfig::new(&config);
    let mut components: Vec<Box<dyn Component>> = vec![Box::new(dispatch), Box::new(service)];

    #[cfg(feature = "control-http")]
    let health = HealthProbe::new(transport.clone());
    #[cfg(feature = "control-http")]
    components.push(Box::new(ControlChannel::new(
        config.http.bind.clone(),
        config.http.route_prefix.clone(),
        ControlState::new(subscriptions.clone(), health.clone(), shared_config.clone()),
    )));

    if config.watch.enabled {
        components.push(Box::new(
            ConfigWatcher::new(
                &config_path,
                overrides,
                Duration::from_millis(config.watch.interval_ms),
            )
            .with_handler(Arc::new(shared_config)),
        ));
    }

    let handle = spawn_components(components, shutdown.clone());

    if config.subscription.subscribe_on_start {
        tokio::select! {
            _ = shutdown.cancelled() => {}
            result = subscriptions.subscribe_all() => match result {
                Ok(report) => info!(
                    subscribed = report.succeeded.len(),
                    failed = report.failed.len(),
                    "initial subscribe done"
                ),
                Err(e) => warn!("initial subscribe not run: {e}"),
            },
        }
    }

    #[cfg(feature = "control-http")]
    health.set_ready(true);
    info!("xapp ready");

    handle.join().await?;

    info!("shutdown complete");
    Ok(())
}

/// Cancel `shutdown` on Ctrl-C or SIGTERM.
fn spawn_signal_watcher(shutdown: CancellationToken) {
    tokio::spawn(async move {
        tokio::select! {
            result = tokio::signal::ctrl_c() => match result {
                Ok(()) => info!("ctrl-c received, initiating shutdown"),
                Err(e) => warn!("ctrl-c handler failed, shutting down: {e}"),
            },
            _ = terminate() => info!("SIGTERM received, initiating shutdown"),
        }
        shutdown.cancel();
    });
}

#[cfg(unix)]
async fn terminate() {
    use tokio::signal::unix::{SignalKind, signal};

    match signal(SignalKind::terminate()) {
        Ok(mut term) => {
            term.recv().await;
        }
        Err(e) => {
            warn!("cannot install SIGTERM handler: {e}");
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(not(unix))]
async fn terminate() {
    std::future::pending::<()>().await;
}

struct CliArgs {
    log_level: Option<&'static str>,
    config_path: Option<String>,
}

fn parse_cli_args() -> CliArgs {
    let mut verbosity = 0u8;
    let mut config_path = None;

    let mut iter = std::env::args().skip(1);
    while let Some(arg) = iter.next() {
        if arg == "--" {
            break;
        }

        match arg.as_str() {
            "-h" | "--help" => {
                println!("Usage: subreact-xapp [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -h, --help                 Print help");
                println!("  -f, --config <PATH>        Path to configuration file (default: config/default.toml)");
                println!("  -v, -vv, -vvv, -vvvv       Increase logging verbosity");
                std::process::exit(0);
            }
            "-f" | "--config" => {
                if let Some(path) = iter.next() {
                    config_path = Some(path);
                } else {
                    eprintln!("error: -f/--config requires a path argument");
                    std::process::exit(1);
                }
            }
            "--verbose" => verbosity = verbosity.saturating_add(1),
            a if a.starts_with('-') && a.len() > 1 && a.chars().skip(1).all(|c| c == 'v') => {
                verbosity = verbosity.saturating_add((a.len() - 1) as u8);
            }
            _ => {}
        }
    }

    // Each -v raises verbosity one tier:
    //   -v      → warn
    //   -vv     → info
    //   -vvv    → debug  (routing, handler registration, submgr status codes)
    //   -vvvv+  → trace
    let log_level = match verbosity {
        0 => None,
        1 => Some("warn"),
        2 => Some("info"),
        3 => Some("debug"),
        _ => Some("trace"),
    };

    CliArgs { log_level, config_path }
}
