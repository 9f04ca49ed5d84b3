use anyhow::{Context, Result};
use axum::{routing::get, Router};
use clap::Parser;
use std::path::PathBuf;
use tracing::{error, info, level_filters::LevelFilter};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use order_notifier::config::{self, TransportKind};
use order_notifier::metrics;
use order_notifier::NotificationSession;

fn parse_path(s: &str) -> Result<PathBuf, String> {
    let path_buf = PathBuf::from(s);
    if path_buf.is_absolute() {
        return Ok(path_buf);
    }
    let cwd = std::env::current_dir().map_err(|e| format!("Failed to get current dir: {}", e))?;
    Ok(cwd.join(path_buf))
}

#[derive(Parser, Debug)]
struct CliArgs {
    /// Path to TOML configuration file. Values in the file override CLI arguments.
    #[clap(long, value_parser = parse_path)]
    pub config: Option<PathBuf>,

    /// Base URL of the storefront backend, e.g. https://shop.example.com
    #[clap(long)]
    pub backend_url: Option<String>,

    /// SQLite file holding the notification feed and polling high-water mark.
    #[clap(long, value_parser = parse_path)]
    pub db_path: Option<PathBuf>,

    /// Serve Prometheus metrics on this port. Disabled when omitted.
    #[clap(long)]
    pub metrics_port: Option<u16>,

    /// Timeout in seconds for order list requests.
    #[clap(long)]
    pub http_timeout_sec: Option<u64>,

    /// Framing used on the push channel.
    #[clap(long, value_enum)]
    pub transport: Option<TransportKind>,
}

/// Convert CLI args to CliConfig for config resolution
impl From<&CliArgs> for config::CliConfig {
    fn from(args: &CliArgs) -> Self {
        config::CliConfig {
            backend_url: args.backend_url.clone(),
            db_path: args.db_path.clone(),
            metrics_port: args.metrics_port,
            http_timeout_sec: args.http_timeout_sec,
            transport: args.transport,
        }
    }
}

async fn run_metrics_server(port: u16) -> Result<()> {
    let app = Router::new().route("/metrics", get(metrics::metrics_handler));
    let listener = tokio::net::TcpListener::bind(format!("127.0.0.1:{}", port))
        .await
        .with_context(|| format!("Failed to bind metrics port {}", port))?;
    Ok(axum::serve(listener, app).await?)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli_args = CliArgs::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .with_env_var("LOG_LEVEL")
                .from_env_lossy(),
        )
        .try_init()
        .context("Failed to install tracing subscriber")?;

    // Load TOML config if provided
    let file_config = match &cli_args.config {
        Some(path) => {
            info!("Loading configuration from {:?}", path);
            Some(config::FileConfig::load(path)?)
        }
        None => None,
    };

    // Resolve final configuration (TOML overrides CLI)
    let cli_config: config::CliConfig = (&cli_args).into();
    let app_config = config::AppConfig::resolve(&cli_config, file_config)?;

    info!("Configuration loaded:");
    info!("  backend_url: {}", app_config.backend_url);
    info!("  db_path: {:?}", app_config.db_path);
    info!(
        "  push: {} ({:?})",
        if app_config.push.enabled { "enabled" } else { "disabled" },
        app_config.push.transport
    );

    metrics::init_metrics();
    if let Some(port) = app_config.metrics_port {
        info!("Metrics available at port {}!", port);
        tokio::spawn(async move {
            if let Err(e) = run_metrics_server(port).await {
                error!("Metrics server stopped: {:#}", e);
            }
        });
    }

    let session = NotificationSession::start(&app_config)?;

    let mut feed = session.subscribe();
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    loop {
        tokio::select! {
            changed = feed.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = feed.borrow_and_update().clone();
                match state.newest() {
                    Some(newest) => info!(
                        "Feed updated: {} unread of {}, newest order #{} ({})",
                        state.unread_count,
                        state.notifications.len(),
                        newest.order_id,
                        newest.customer_name
                    ),
                    None => info!("Feed updated: empty"),
                }
            }
            _ = &mut ctrl_c => {
                info!("Received Ctrl+C, initiating graceful shutdown");
                break;
            }
        }
    }

    session.shutdown().await;
    Ok(())
}
