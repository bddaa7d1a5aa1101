// # castwatchd - Castwatch Daemon
//
// Thin integration layer over castwatch-core:
// 1. Reads configuration from environment variables + an events file
// 2. Initializes logging and the runtime
// 3. Wires the Twitter source/sink and the dedup store into the engine
// 4. Runs the watch loop until SIGTERM/SIGINT
//
// ## Configuration
//
// Environment variables:
//
// - `CASTWATCH_BEARER_TOKEN`: Twitter API v2 bearer token (required)
// - `CASTWATCH_CREATOR_IDS`: comma-separated watched creator account ids (required)
// - `CASTWATCH_EVENTS_CONFIG`: path to the JSON event action table (required)
// - `CASTWATCH_BASE_INTERVAL_SECS`: poll interval floor (default 60)
// - `CASTWATCH_STORE_TYPE`: dedup store type: file, memory (default file)
// - `CASTWATCH_STORE_PATH`: path to the dedup store file (required for file store)
// - `CASTWATCH_HEALTH_PORT`: enable the health-check endpoint on this port
// - `CASTWATCH_LOG_LEVEL`: trace, debug, info, warn, error (default info)
//
// The events file holds the per-stage action table, e.g.:
//
// ```json
// {
//   "schedule": {
//     "notification": { "message": "{creator_name} announced {title} {url}" }
//   },
//   "schedule_remind": {
//     "before_secs": 1800,
//     "notification": { "message": "{title} starts soon {url}" }
//   },
//   "start": {
//     "notification": { "message": "{creator_name} is live: {title} {url}" },
//     "command": { "name": "notify-send", "args": ["{title}"] }
//   }
// }
// ```

use anyhow::{Context, Result};
use std::env;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{Level, debug, error, info, warn};
use tracing_subscriber::FmtSubscriber;

use castwatch_core::config::{EventsConfig, PollConfig, WatcherConfig};
use castwatch_core::engine::EngineEvent;
use castwatch_core::traits::DedupStore;
use castwatch_core::{FileDedupStore, MemoryDedupStore, WatchEngine};
use castwatch_twitter::{TwitterDeliverySink, TwitterSessionSource};

#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};

/// Exit codes for different termination scenarios
///
/// These codes follow systemd conventions:
/// - 0: Clean shutdown
/// - 1: Configuration or startup error
/// - 2: Runtime error (unexpected)
#[derive(Debug, Clone, Copy)]
enum DaemonExitCode {
    CleanShutdown = 0,
    ConfigError = 1,
    RuntimeError = 2,
}

impl From<DaemonExitCode> for ExitCode {
    fn from(code: DaemonExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

/// Application configuration
struct Config {
    bearer_token: String,
    creator_ids: Vec<String>,
    events_path: String,
    base_interval_secs: Option<u64>,
    store_type: String,
    store_path: Option<String>,
    health_port: Option<u16>,
    log_level: String,
}

impl Config {
    /// Load configuration from environment variables
    fn from_env() -> Result<Self> {
        Ok(Self {
            bearer_token: env::var("CASTWATCH_BEARER_TOKEN")
                .context("CASTWATCH_BEARER_TOKEN is required")?,
            creator_ids: env::var("CASTWATCH_CREATOR_IDS")
                .unwrap_or_default()
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            events_path: env::var("CASTWATCH_EVENTS_CONFIG")
                .context("CASTWATCH_EVENTS_CONFIG is required")?,
            base_interval_secs: env::var("CASTWATCH_BASE_INTERVAL_SECS")
                .ok()
                .map(|s| {
                    s.parse()
                        .context("CASTWATCH_BASE_INTERVAL_SECS must be an integer")
                })
                .transpose()?,
            store_type: env::var("CASTWATCH_STORE_TYPE").unwrap_or_else(|_| "file".to_string()),
            store_path: env::var("CASTWATCH_STORE_PATH").ok(),
            health_port: env::var("CASTWATCH_HEALTH_PORT")
                .ok()
                .map(|s| s.parse().context("CASTWATCH_HEALTH_PORT must be a port"))
                .transpose()?,
            log_level: env::var("CASTWATCH_LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
        })
    }

    /// Validate the configuration
    fn validate(&self) -> Result<()> {
        if self.bearer_token.is_empty() {
            anyhow::bail!(
                "CASTWATCH_BEARER_TOKEN is required. \
                Set it via: export CASTWATCH_BEARER_TOKEN=your_token"
            );
        }

        // Catch obvious placeholder tokens (common mistake)
        let token_lower = self.bearer_token.to_lowercase();
        if token_lower.contains("your_token")
            || token_lower.contains("replace_me")
            || token_lower == "token"
        {
            anyhow::bail!(
                "CASTWATCH_BEARER_TOKEN appears to be a placeholder. \
                Use an actual bearer token."
            );
        }

        if self.creator_ids.is_empty() {
            anyhow::bail!(
                "CASTWATCH_CREATOR_IDS must contain at least one account id. \
                Set it via: export CASTWATCH_CREATOR_IDS=12345,67890"
            );
        }

        for id in &self.creator_ids {
            if !id.chars().all(|c| c.is_ascii_digit()) {
                anyhow::bail!("CASTWATCH_CREATOR_IDS entry '{}' is not an account id", id);
            }
        }

        if let Some(interval) = self.base_interval_secs
            && !(1..=3600).contains(&interval)
        {
            anyhow::bail!(
                "CASTWATCH_BASE_INTERVAL_SECS must be between 1 and 3600. Got: {}",
                interval
            );
        }

        match self.store_type.as_str() {
            "file" => {
                if self.store_path.as_ref().is_none_or(|p| p.is_empty()) {
                    anyhow::bail!(
                        "CASTWATCH_STORE_PATH is required when CASTWATCH_STORE_TYPE=file. \
                        Set it via: export CASTWATCH_STORE_PATH=/var/lib/castwatch/dedup.json"
                    );
                }
            }
            "memory" => {}
            other => anyhow::bail!(
                "CASTWATCH_STORE_TYPE '{}' is not supported. Supported types: file, memory",
                other
            ),
        }

        match self.log_level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            other => anyhow::bail!(
                "CASTWATCH_LOG_LEVEL '{}' is not valid. \
                Valid levels: trace, debug, info, warn, error",
                other
            ),
        }

        Ok(())
    }
}

/// Load the per-stage action table from the events file
fn load_events(path: &str) -> Result<EventsConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read events config {path}"))?;
    serde_json::from_str(&content).with_context(|| format!("failed to parse events config {path}"))
}

fn main() -> ExitCode {
    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {e:#}");
            return DaemonExitCode::ConfigError.into();
        }
    };

    if let Err(e) = config.validate() {
        eprintln!("Configuration validation error: {e:#}");
        return DaemonExitCode::ConfigError.into();
    }

    let log_level = match config.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder().with_max_level(log_level).finish();
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {e}");
        return DaemonExitCode::ConfigError.into();
    }

    info!("starting castwatchd");
    info!(creators = config.creator_ids.len(), "configuration loaded");

    let rt = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("failed to create tokio runtime: {e}");
            return DaemonExitCode::RuntimeError.into();
        }
    };

    let result = rt.block_on(async {
        if let Err(e) = run_daemon(config).await {
            error!("daemon error: {e:#}");
            DaemonExitCode::RuntimeError
        } else {
            DaemonExitCode::CleanShutdown
        }
    });

    result.into()
}

/// Run the daemon
async fn run_daemon(config: Config) -> Result<()> {
    let events = load_events(&config.events_path)?;

    let mut poll = PollConfig::default();
    if let Some(interval) = config.base_interval_secs {
        poll.base_interval_secs = interval;
    }
    let watcher_config = WatcherConfig { poll, events };

    let store: Arc<dyn DedupStore> = match config.store_type.as_str() {
        "memory" => {
            warn!("using in-memory dedup store; notifications repeat after a restart");
            Arc::new(MemoryDedupStore::new())
        }
        _ => {
            let path = config.store_path.as_deref().unwrap_or("castwatch.json");
            info!(path, "opening dedup store");
            Arc::new(FileDedupStore::open(path).await?)
        }
    };

    let source = TwitterSessionSource::new(config.bearer_token.clone(), config.creator_ids.clone())?;
    let sink = Arc::new(TwitterDeliverySink::new(config.bearer_token)?);

    let (engine, event_rx) = WatchEngine::new(Box::new(source), sink, store, watcher_config)?;
    spawn_event_logger(event_rx);

    // Health-check endpoint: passive responder, never touches engine state.
    let (health_tx, health_rx) = tokio::sync::watch::channel(false);
    if let Some(port) = config.health_port {
        tokio::spawn(serve_health(port, health_rx));
    }

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();
    tokio::spawn(async move {
        let signal_name = wait_for_shutdown().await;
        info!(signal = signal_name, "shutdown signal received");
        let _ = shutdown_tx.send(());
    });

    info!("starting watch engine");
    engine.run_with_shutdown(Some(shutdown_rx)).await?;

    let _ = health_tx.send(true);
    info!("castwatchd stopped");
    Ok(())
}

/// Drain engine events into the log
fn spawn_event_logger(mut event_rx: tokio::sync::mpsc::Receiver<EngineEvent>) {
    tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            match event {
                EngineEvent::NotificationSent { session_id, status } => {
                    info!(session = %session_id, %status, "notification sent");
                }
                EngineEvent::SessionFailed { session_id, error } => {
                    warn!(session = %session_id, %error, "session failed");
                }
                EngineEvent::FetchFailed { error } => {
                    warn!(%error, "fetch failed");
                }
                EngineEvent::IntervalChanged { from_secs, to_secs } => {
                    info!(from_secs, to_secs, "poll interval changed");
                }
                other => debug!(?other, "engine event"),
            }
        }
    });
}

/// Serve the health-check endpoint until the shutdown flag flips
async fn serve_health(port: u16, mut shutdown: tokio::sync::watch::Receiver<bool>) {
    use warp::Filter;

    let route = warp::any().map(warp::reply);
    let (addr, server) =
        warp::serve(route).bind_with_graceful_shutdown(([0, 0, 0, 0], port), async move {
            let _ = shutdown.changed().await;
        });

    info!(%addr, "health check endpoint started");
    server.await;
    info!("health check endpoint stopped");
}

/// Wait for SIGTERM or SIGINT
#[cfg(unix)]
async fn wait_for_shutdown() -> &'static str {
    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(s) => s,
        Err(e) => {
            error!("failed to install SIGTERM handler: {e}");
            std::future::pending::<()>().await;
            unreachable!()
        }
    };
    let mut sigint = match signal(SignalKind::interrupt()) {
        Ok(s) => s,
        Err(e) => {
            error!("failed to install SIGINT handler: {e}");
            std::future::pending::<()>().await;
            unreachable!()
        }
    };

    tokio::select! {
        _ = sigterm.recv() => "SIGTERM",
        _ = sigint.recv() => "SIGINT",
    }
}

/// Wait for CTRL-C (non-Unix fallback)
#[cfg(not(unix))]
async fn wait_for_shutdown() -> &'static str {
    let _ = tokio::signal::ctrl_c().await;
    "SIGINT"
}
