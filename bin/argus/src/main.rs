//! Argus - NEP5-aware NEO blockchain scraper.
//!
//! # Usage
//!
//! ```bash
//! # Start with default config
//! argus
//!
//! # Start with environment overrides
//! DATABASE_URL=postgres://localhost/argus RPC_URL=http://localhost:10332 argus
//! ```

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use metrics_exporter_prometheus::PrometheusBuilder;
use tokio::signal;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, info_span, warn, Instrument};
use tracing_subscriber::{fmt, EnvFilter};

use argus_chain::{NeoRpcClient, NeoRpcConfig};
use argus_core::metrics::init_metrics;
use argus_core::models::ContractHash;
use argus_core::ports::NodeRpc;
use argus_core::services::{HealthMonitor, ScraperOptions, Supervisor, HEALTH_PROBE_INTERVAL};
use argus_storage::{Database, DatabaseConfig, PgRepositories};

/// Argus CLI - NEO blockchain scraper.
#[derive(Parser, Debug)]
#[command(name = "argus")]
#[command(about = "Argus - NEP5-aware NEO blockchain scraper")]
#[command(version)]
struct Cli {
    /// NEO node JSON-RPC URL.
    #[arg(long, env = "RPC_URL", default_value = "http://127.0.0.1:10332")]
    rpc_url: String,

    /// PostgreSQL database URL.
    #[arg(
        long,
        env = "DATABASE_URL",
        default_value = "postgres://localhost/argus"
    )]
    database_url: String,

    /// Maximum blocks fetched and applied per tick.
    #[arg(long, env = "CHUNK_SIZE", default_value = "1000")]
    chunk_size: u32,

    /// Run a balance repair pass every N applied blocks.
    #[arg(long, env = "REPAIR_NEP5_BLOCK_FREQUENCY", default_value = "1000")]
    repair_block_frequency: u64,

    /// Only re-verify balances at least this many seconds behind the tip.
    #[arg(long, env = "REPAIR_NEP5_LATENCY_SECONDS", default_value = "900")]
    repair_latency_seconds: u64,

    /// Comma-separated NEP5 script hashes to exclude from tracking.
    #[arg(long, env = "BLACKLIST_NEP5_HASHES", default_value = "")]
    blacklist_nep5_hashes: String,

    /// Maximum blocks unwound while searching for a common ancestor.
    #[arg(long, env = "MAX_ROLLBACK_DEPTH", default_value = "32")]
    max_rollback_depth: u64,

    /// Disable data migrations for this run.
    #[arg(long, env = "DISABLE_MIGRATIONS")]
    disable_migrations: bool,

    /// Polling interval in seconds when caught up with the chain.
    #[arg(long, env = "POLL_INTERVAL_SECONDS", default_value = "15")]
    poll_interval_seconds: u64,

    /// Prometheus metrics port.
    #[arg(long, env = "METRICS_PORT", default_value = "9090")]
    metrics_port: u16,

    /// Enable JSON log output.
    #[arg(long, env = "JSON_LOGS")]
    json_logs: bool,

    /// Run schema migrations and exit.
    #[arg(long)]
    migrate_only: bool,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_tracing(&cli.log_level, cli.json_logs);

    let blacklist =
        parse_blacklist(&cli.blacklist_nep5_hashes).context("Invalid blacklist entry")?;

    // Prometheus metrics exporter (optional - failures don't crash the app)
    let metrics_enabled = match format!("0.0.0.0:{}", cli.metrics_port).parse::<std::net::SocketAddr>()
    {
        Ok(metrics_addr) => {
            match PrometheusBuilder::new()
                .with_http_listener(metrics_addr)
                .install()
            {
                Ok(()) => {
                    init_metrics();
                    true
                }
                Err(e) => {
                    warn!(
                        "⚠️  Failed to start metrics exporter: {}. Continuing without metrics.",
                        e
                    );
                    false
                }
            }
        }
        Err(e) => {
            warn!("⚠️  Invalid metrics address: {}. Continuing without metrics.", e);
            false
        }
    };

    // ─────────────────────────────────────────────────────────────────────────
    // 🚀 STARTUP
    // ─────────────────────────────────────────────────────────────────────────
    info!("🚀 Starting Argus Scraper");
    debug!(rpc_url = %cli.rpc_url, "NEO endpoint");
    debug!(database_url = %mask_password(&cli.database_url), "Database endpoint");

    // ─────────────────────────────────────────────────────────────────────────
    // 🗄️ DATABASE
    // ─────────────────────────────────────────────────────────────────────────
    let db_config = DatabaseConfig::for_scraper(&cli.database_url);

    info!("🗄️  Connecting to database...");
    let db = Database::connect(&db_config)
        .await
        .context("Failed to connect to database")?;

    db.migrate().await.context("Failed to run schema migrations")?;
    info!("🗄️  Database ready (migrations applied)");

    if cli.migrate_only {
        info!("🛑 --migrate-only flag set, exiting");
        return Ok(());
    }

    let db = Arc::new(db);
    let repositories = Arc::new(PgRepositories::new(db.clone()));

    // ─────────────────────────────────────────────────────────────────────────
    // 📡 NEO CONNECTION
    // ─────────────────────────────────────────────────────────────────────────
    info!("📡 Connecting to NEO node...");
    let rpc_config = NeoRpcConfig {
        rpc_url: cli.rpc_url.clone(),
        ..Default::default()
    };
    let node = Arc::new(NeoRpcClient::new(&rpc_config).context("Failed to build RPC client")?);

    let block_count = node
        .block_count()
        .await
        .context("Failed to reach NEO node")?;
    info!(height = block_count.saturating_sub(1), "🔗 Chain connected");

    // ─────────────────────────────────────────────────────────────────────────
    // ⚡ SERVICES START
    // ─────────────────────────────────────────────────────────────────────────
    let (shutdown_tx, _) = watch::channel(false);

    let options = ScraperOptions {
        chunk_size: cli.chunk_size,
        migrations_enabled: !cli.disable_migrations,
        blacklist,
        repair_block_frequency: cli.repair_block_frequency,
        repair_latency_seconds: cli.repair_latency_seconds,
        max_rollback_depth: cli.max_rollback_depth,
        poll_interval: Duration::from_secs(cli.poll_interval_seconds),
        ..Default::default()
    };

    let supervisor = Arc::new(Supervisor::new(repositories.clone(), node.clone()));
    let (options_tx, options_rx) = mpsc::channel(8);
    options_tx
        .send(options)
        .await
        .context("Failed to queue initial configuration")?;

    let supervisor_runner = supervisor.clone();
    let supervisor_shutdown = shutdown_tx.subscribe();
    let supervisor_handle = tokio::spawn(
        async move {
            if let Err(e) = supervisor_runner.run(options_rx, supervisor_shutdown).await {
                error!(error = %e, "❌ Supervisor error");
            }
        }
        .instrument(info_span!("supervisor")),
    );

    // Liveness: the watch receiver is the externally visible readiness
    // signal (polled by the web tier); holding it here keeps it alive for
    // the process lifetime.
    let (liveness_tx, _liveness_rx) = watch::channel(true);
    let monitor = HealthMonitor::new(repositories.clone(), HEALTH_PROBE_INTERVAL);
    let monitor_shutdown = shutdown_tx.subscribe();
    let monitor_handle = tokio::spawn(
        async move {
            monitor.run(liveness_tx, monitor_shutdown).await;
        }
        .instrument(info_span!("health")),
    );

    // ─────────────────────────────────────────────────────────────────────────
    // ✅ READY
    // ─────────────────────────────────────────────────────────────────────────
    info!("✅ Argus ready");
    if metrics_enabled {
        info!(
            "   📊 Metrics:  http://localhost:{}/metrics",
            cli.metrics_port
        );
    } else {
        info!("   📊 Metrics:  disabled");
    }
    info!("   Press Ctrl+C to stop");

    shutdown_signal().await;

    // ─────────────────────────────────────────────────────────────────────────
    // 🛑 SHUTDOWN
    // ─────────────────────────────────────────────────────────────────────────
    info!("🛑 Shutting down...");
    let _ = shutdown_tx.send(true);

    match tokio::time::timeout(Duration::from_secs(30), supervisor_handle).await {
        Ok(_) => debug!("Supervisor stopped"),
        Err(_) => warn!("⚠️  Supervisor shutdown timed out"),
    }

    match tokio::time::timeout(Duration::from_secs(10), monitor_handle).await {
        Ok(_) => debug!("Health monitor stopped"),
        Err(_) => warn!("⚠️  Health monitor shutdown timed out"),
    }

    db.close().await;

    info!("🛑 Shutdown complete");
    Ok(())
}

/// Initialize tracing subscriber.
fn init_tracing(level: &str, json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    if json {
        fmt().with_env_filter(filter).json().init();
    } else {
        fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
            .init();
    }
}

/// Parse the comma-separated blacklist into contract hashes.
fn parse_blacklist(raw: &str) -> Result<HashSet<ContractHash>> {
    raw.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            ContractHash::from_hex(entry)
                .map_err(|e| anyhow::anyhow!("'{}' is not a contract hash: {}", entry, e))
        })
        .collect()
}

/// Mask password in database URL for logging.
fn mask_password(url_str: &str) -> String {
    match url::Url::parse(url_str) {
        Ok(mut url) => {
            if url.password().is_some() {
                let _ = url.set_password(Some("****"));
            }
            url.to_string()
        }
        Err(_) => url_str.to_string(),
    }
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
