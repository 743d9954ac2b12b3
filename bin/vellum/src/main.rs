//! Vellum - unified content listing service.
//!
//! # Usage
//!
//! ```bash
//! # Start with default config
//! vellum
//!
//! # Start with environment overrides
//! DATABASE_URL=postgres://localhost/content CURSOR_SECRET=change-me vellum
//! ```

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use metrics_exporter_prometheus::PrometheusBuilder;
use tokio::signal;
use tracing::{Instrument, debug, error, info, info_span, warn};
use tracing_subscriber::{EnvFilter, fmt};

use vellum_api::{AppState, ServerConfig, build_schema, serve_with_shutdown};
use vellum_core::cursor::CursorCodec;
use vellum_core::metrics::init_metrics;
use vellum_core::ports::{ContentRepository, DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE};
use vellum_core::services::{ListingConfig, ListingService};
use vellum_storage::{Database, DatabaseConfig, PgContentRepository, Relations};

/// Vellum CLI - content listing service.
#[derive(Parser, Debug)]
#[command(name = "vellum")]
#[command(about = "Vellum - unified content pagination over partitioned PostgreSQL")]
#[command(version)]
struct Cli {
    /// PostgreSQL database URL.
    #[arg(
        long,
        env = "DATABASE_URL",
        default_value = "postgres://localhost/vellum"
    )]
    database_url: String,

    /// HTTP server port (GraphQL and REST).
    #[arg(long, env = "HTTP_PORT", default_value = "4000")]
    http_port: u16,

    /// Prometheus metrics port.
    #[arg(long, env = "METRICS_PORT", default_value = "9090")]
    metrics_port: u16,

    /// Enable JSON log output.
    #[arg(long, env = "JSON_LOGS")]
    json_logs: bool,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Maximum pooled database connections.
    #[arg(long, env = "DB_MAX_CONNECTIONS", default_value = "15")]
    db_max_connections: u32,

    /// Server-side statement timeout in milliseconds (0 disables it).
    #[arg(long, env = "STATEMENT_TIMEOUT_MS", default_value = "2000")]
    statement_timeout_ms: u64,

    /// Secret used to sign cursors. Unsigned cursors when absent.
    #[arg(long, env = "CURSOR_SECRET", hide_env_values = true)]
    cursor_secret: Option<String>,

    /// Planner row estimate above which `count_mode=estimate` skips the exact count.
    #[arg(long, env = "COUNT_ESTIMATE_THRESHOLD")]
    count_estimate_threshold: Option<u64>,

    /// Page size used when a request sends none.
    #[arg(long, env = "DEFAULT_PAGE_SIZE", default_value_t = DEFAULT_PAGE_SIZE, value_parser = parse_page_size)]
    default_page_size: u32,

    /// Partitioned content relation.
    #[arg(long, env = "CONTENT_RELATION", default_value = "content_items")]
    content_relation: String,

    /// Partition holding `regular` rows.
    #[arg(long, env = "REGULAR_PARTITION", default_value = "content_items_regular")]
    regular_partition: String,

    /// Partition holding `auto` rows.
    #[arg(long, env = "AUTO_PARTITION", default_value = "content_items_auto")]
    auto_partition: String,

    /// Disable the GraphiQL playground at `/`.
    #[arg(long, env = "DISABLE_PLAYGROUND")]
    disable_playground: bool,
}

/// Parse a page size within `1..=MAX_PAGE_SIZE`.
fn parse_page_size(s: &str) -> Result<u32, String> {
    match s.parse::<u32>() {
        Ok(n) if (1..=MAX_PAGE_SIZE).contains(&n) => Ok(n),
        _ => Err(format!(
            "Invalid page size '{}'. Use a value between 1 and {}.",
            s, MAX_PAGE_SIZE
        )),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_tracing(&cli.log_level, cli.json_logs);

    // Prometheus metrics exporter (optional - failures don't crash the app)
    let metrics_enabled = match format!("0.0.0.0:{}", cli.metrics_port).parse::<std::net::SocketAddr>() {
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
                    warn!("⚠️  Failed to start metrics exporter: {}. Continuing without metrics.", e);
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
    info!("🚀 Starting Vellum");
    debug!(database_url = %mask_password(&cli.database_url), "Database endpoint");

    // ─────────────────────────────────────────────────────────────────────────
    // 🗄️ DATABASE
    // ─────────────────────────────────────────────────────────────────────────
    let mut db_config = DatabaseConfig::for_listing(&cli.database_url);
    db_config.max_connections = cli.db_max_connections;
    db_config.min_connections = db_config.min_connections.min(cli.db_max_connections);
    db_config.statement_timeout =
        (cli.statement_timeout_ms > 0).then(|| Duration::from_millis(cli.statement_timeout_ms));

    info!("🗄️  Connecting to database...");
    let db = Database::connect(&db_config)
        .await
        .context("Failed to connect to database")?;

    if !db.is_healthy().await {
        warn!("⚠️  Database health probe failed, requests may error until it recovers");
    }
    info!("🗄️  Database ready");

    // ─────────────────────────────────────────────────────────────────────────
    // 📚 LISTING SERVICE
    // ─────────────────────────────────────────────────────────────────────────
    let codec = match &cli.cursor_secret {
        Some(secret) if !secret.is_empty() => CursorCodec::with_signing_key(secret.as_bytes()),
        _ => {
            warn!("⚠️  CURSOR_SECRET not set, cursors are not signed");
            CursorCodec::new()
        }
    };

    let listing_config = ListingConfig {
        default_page_size: cli.default_page_size,
        count_estimate_threshold: cli.count_estimate_threshold,
        ..Default::default()
    };
    debug!(config = ?listing_config, signed_cursors = codec.is_signed(), "Listing configuration");

    let relations = Relations::new(
        &cli.content_relation,
        &cli.regular_partition,
        &cli.auto_partition,
    )
    .context("Invalid relation configuration")?;
    debug!(relations = ?relations, "Content relations");

    let repository: Arc<dyn ContentRepository> =
        Arc::new(PgContentRepository::new(&db).with_relations(relations));
    let service = Arc::new(ListingService::new(listing_config, codec, repository));

    // Includes DoS protection: depth limit, complexity limit
    let state = AppState {
        schema: build_schema(service.clone()),
        service,
    };

    // ─────────────────────────────────────────────────────────────────────────
    // ⚡ SERVER START
    // ─────────────────────────────────────────────────────────────────────────
    let (shutdown_tx, mut shutdown_rx) = tokio::sync::watch::channel(false);

    let server_config = ServerConfig {
        port: cli.http_port,
        enable_playground: !cli.disable_playground,
        ..Default::default()
    };

    let server_handle = tokio::spawn(
        async move {
            let shutdown = async move {
                while !*shutdown_rx.borrow() {
                    if shutdown_rx.changed().await.is_err() {
                        break;
                    }
                }
            };

            if let Err(e) = serve_with_shutdown(state, server_config, shutdown).await {
                error!(error = %e, "❌ Server error");
            }
            debug!("Server stopped");
        }
        .instrument(info_span!("http")),
    );

    // ─────────────────────────────────────────────────────────────────────────
    // ✅ READY
    // ─────────────────────────────────────────────────────────────────────────
    info!("✅ Vellum ready");
    info!("   ⚡ GraphQL:  http://localhost:{}/graphql", cli.http_port);
    info!("   📄 REST:     http://localhost:{}/contents", cli.http_port);
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

    match tokio::time::timeout(Duration::from_secs(10), server_handle).await {
        Ok(_) => debug!("Server stopped"),
        Err(_) => warn!("⚠️  Server shutdown timed out"),
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
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
