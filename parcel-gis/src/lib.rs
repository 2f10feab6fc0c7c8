//! parcel-gis: KMZ/KML parcel synchronization and live KML feed
//!
//! Pipeline components, bottom-up:
//! - [`kmz`] unwraps the KMZ container
//! - [`kml`] extracts placemarks
//! - [`geometry`] converts between KML coordinates and GeoJSON
//! - [`google`] signs service-credential assertions and issues tokens
//! - [`fetch`] downloads the source file with fallback strategies
//! - [`reconcile`] upserts placemarks into the parcel store
//! - [`feed`] renders stored parcels back out as KML
//! - [`sync`] ties a run together; [`api`] exposes it over HTTP

pub mod api;
pub mod config;
pub mod error;
pub mod feed;
pub mod fetch;
pub mod geometry;
pub mod google;
pub mod kml;
pub mod kmz;
pub mod reconcile;
pub mod sync;

pub use crate::error::{ApiError, ApiResult};

use axum::{http::Method, Router};
use chrono::{DateTime, Utc};
use parcel_common::db::{ParcelStore, SqliteParcelStore};
use sqlx::SqlitePool;
use std::sync::Arc;
use tokio::sync::RwLock;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::api::{HttpSessionValidator, RejectAllSessions, SessionValidator};
use crate::config::GisConfig;
use crate::fetch::FileFetcher;
use crate::sync::{SyncError, SyncPipeline};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Database pool (settings table)
    pub db: SqlitePool,
    pub store: Arc<dyn ParcelStore>,
    pub pipeline: SyncPipeline,
    pub sessions: Arc<dyn SessionValidator>,
    pub config: Arc<GisConfig>,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
    /// Failure of the most recent sync run, cleared when a run succeeds
    pub last_error: Arc<RwLock<Option<String>>>,
}

impl AppState {
    pub fn new(db: SqlitePool, config: GisConfig) -> Self {
        let http_client = reqwest::Client::new();

        let fetcher = FileFetcher::new(
            http_client.clone(),
            config.drive_api_base_url.clone(),
            config.drive_download_base_url.clone(),
        );
        let pipeline = SyncPipeline::new(fetcher, config.credential.clone());

        let sessions: Arc<dyn SessionValidator> = match &config.session_url {
            Some(url) => Arc::new(HttpSessionValidator::new(http_client, url.clone())),
            None => Arc::new(RejectAllSessions),
        };

        Self {
            store: Arc::new(SqliteParcelStore::new(db.clone())),
            db,
            pipeline,
            sessions,
            config: Arc::new(config),
            startup_time: Utc::now(),
            last_error: Arc::new(RwLock::new(None)),
        }
    }

    /// Replace the session validator
    pub fn with_session_validator(mut self, sessions: Arc<dyn SessionValidator>) -> Self {
        self.sessions = sessions;
        self
    }

    pub(crate) async fn record_error(&self, error: &SyncError) {
        *self.last_error.write().await = Some(error.to_string());
    }

    pub(crate) async fn clear_error(&self) {
        *self.last_error.write().await = None;
    }
}

/// Build application router
///
/// Sync and settings routes require a recognized caller. The feed and
/// health check are public, with CORS open for browser-based GIS viewers.
pub fn build_router(state: AppState) -> Router {
    use axum::middleware;

    let protected = Router::new()
        .merge(api::sync_routes())
        .merge(api::settings_routes())
        .layer(middleware::from_fn_with_state(
            state.clone(),
            api::auth_middleware,
        ));

    let public = Router::new()
        .merge(api::feed_routes())
        .merge(api::health_routes())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods([Method::GET]),
        );

    Router::new()
        .merge(protected)
        .merge(public)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
