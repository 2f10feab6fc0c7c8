//! parcel-gis: parcel geometry sync service
//!
//! Imports placemarks from a KMZ/KML file into the parcel store on demand
//! and serves the stored parcels as a live KML feed.

use anyhow::{Context, Result};
use clap::Parser;
use parcel_common::config::{
    default_config_path, load_toml_config, resolve_database_path, resolve_root_folder,
};
use parcel_common::db::init_database;
use parcel_gis::config::GisConfig;
use parcel_gis::{build_router, AppState};
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use tokio::signal;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command-line arguments
#[derive(Parser, Debug)]
#[command(name = "parcel-gis")]
#[command(about = "KMZ parcel synchronization and live KML feed")]
#[command(version)]
struct Args {
    /// Port to listen on
    #[arg(short, long, env = "PARCEL_GIS_PORT")]
    port: Option<u16>,

    /// Address to bind
    #[arg(long, default_value = "127.0.0.1", env = "PARCEL_GIS_HOST")]
    host: IpAddr,

    /// SQLite database file
    #[arg(short, long, env = "PARCEL_DATABASE")]
    database: Option<PathBuf>,

    /// Root folder holding the database
    #[arg(short, long, env = "PARCEL_ROOT_FOLDER")]
    root_folder: Option<PathBuf>,

    /// TOML configuration file
    #[arg(short, long, env = "PARCEL_GIS_CONFIG")]
    config: Option<PathBuf>,
}

const DEFAULT_PORT: u16 = 5790;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config_path = args.config.clone().unwrap_or_else(default_config_path);
    let toml_config = load_toml_config(&config_path)
        .with_context(|| format!("Failed to load {}", config_path.display()))?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!(
                    "parcel_gis={level},parcel_common={level},tower_http=info",
                    level = toml_config.logging.level
                )
                .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting parcel-gis v{}", env!("CARGO_PKG_VERSION"));

    let root_folder = resolve_root_folder(args.root_folder.as_deref(), &toml_config);
    let db_path = resolve_database_path(args.database.as_deref(), &root_folder, &toml_config);
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    info!("Database path: {}", db_path.display());

    let pool = init_database(&db_path)
        .await
        .context("Failed to initialize database")?;

    let gis_config = GisConfig::from_toml(&toml_config);
    info!("Deep links point at {}", gis_config.app_base_url);

    let state = AppState::new(pool, gis_config);
    let app = build_router(state);

    let port = args.port.or(toml_config.port).unwrap_or(DEFAULT_PORT);
    let addr = SocketAddr::new(args.host, port);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    info!("parcel-gis listening on http://{}", addr);
    info!("KML feed: http://{}/api/kml/feed", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
