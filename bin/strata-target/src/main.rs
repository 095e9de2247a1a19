//! Strata Target - the storage node daemon
//!
//! Loads configuration (TOML file overlaid with CLI flags), wires the
//! engine singletons, serves health/metrics, and shuts down cleanly on
//! ctrl-c.

mod target;

use anyhow::Result;
use axum::{
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
    routing::get,
    Router,
};
use clap::Parser;
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use target::Target;
use tokio::net::TcpListener;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "strata-target")]
#[command(about = "Strata storage target daemon")]
#[command(version)]
struct Args {
    /// Configuration file path
    #[arg(short, long, default_value = "/etc/strata/target.toml")]
    config: String,

    /// Mountpath roots (repeatable); overrides the config file
    #[arg(short, long)]
    mountpaths: Vec<PathBuf>,

    /// Node ID; generated and logged when not set anywhere
    #[arg(long)]
    node_id: Option<String>,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Health/metrics port
    #[arg(long, default_value = "9370")]
    metrics_port: u16,
}

/// Configuration file structure
#[derive(Debug, Default, Deserialize)]
struct FileConfig {
    #[serde(default)]
    node: NodeConfig,
    #[serde(default)]
    logging: LoggingConfig,
    #[serde(default)]
    engine: strata_common::Config,
}

#[derive(Debug, Default, Deserialize)]
struct NodeConfig {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    mountpaths: Vec<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingConfig {
    #[serde(default)]
    level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let file: FileConfig = if std::path::Path::new(&args.config).exists() {
        let text = std::fs::read_to_string(&args.config)?;
        toml::from_str(&text).unwrap_or_else(|e| {
            eprintln!("Warning: failed to parse {}: {e}", args.config);
            FileConfig::default()
        })
    } else {
        FileConfig::default()
    };

    // CLI takes precedence over the config file
    let log_level = if args.log_level != "info" {
        args.log_level.clone()
    } else {
        file.logging.level.unwrap_or_else(|| "info".to_string())
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| log_level.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let roots = if args.mountpaths.is_empty() {
        file.node.mountpaths
    } else {
        args.mountpaths
    };
    if roots.is_empty() {
        error!("no mountpaths specified; use --mountpaths or configure [node] in {}", args.config);
        std::process::exit(2);
    }
    let roots = label_mountpaths(roots);

    let node_id = args
        .node_id
        .or(file.node.id)
        .unwrap_or_else(|| uuid::Uuid::new_v4().simple().to_string()[..8].to_string());

    info!("starting strata target {node_id}");
    info!("config file: {}", args.config);
    for (path, label) in &roots {
        info!("mountpath {label}: {}", path.display());
    }

    let engine = match Target::init(node_id, file.engine, roots, None) {
        Ok(engine) => engine,
        Err(e) => {
            error!("target init failed: {e}");
            std::process::exit(e.exit_code());
        }
    };

    let addr: SocketAddr = format!("0.0.0.0:{}", args.metrics_port).parse()?;
    let app = Router::new()
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .with_state(Arc::clone(&engine));
    let listener = TcpListener::bind(addr).await?;
    info!("health/metrics on http://{addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
            info!("shutting down...");
        })
        .await?;

    engine.shutdown();
    info!("target shut down gracefully");
    Ok(())
}

/// Assign stable labels to mountpath roots: the directory base name,
/// disambiguated by position.
fn label_mountpaths(roots: Vec<PathBuf>) -> Vec<(PathBuf, String)> {
    roots
        .into_iter()
        .enumerate()
        .map(|(i, path)| {
            let base = path
                .file_name()
                .and_then(|os| os.to_str())
                .unwrap_or("mp")
                .to_string();
            (path, format!("{base}-{i}"))
        })
        .collect()
}

async fn health_handler(State(engine): State<Arc<Target>>) -> impl IntoResponse {
    if engine.healthy() {
        (StatusCode::OK, "OK")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "UNHEALTHY")
    }
}

async fn metrics_handler(State(engine): State<Arc<Target>>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
        engine.metrics_text(),
    )
}
