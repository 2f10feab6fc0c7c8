//! KMZ sync endpoints

use axum::{
    body::Bytes,
    extract::State,
    routing::post,
    Extension, Json, Router,
};
use geojson::FeatureCollection;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::auth::Caller;
use crate::error::{ApiError, ApiResult};
use crate::sync::{resolve_reference, SyncReport};
use crate::AppState;

/// Request body; every field is optional and the body may be empty
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncRequest {
    /// File id or share URL; falls back to the persisted default
    #[serde(default)]
    pub file_id: Option<String>,
}

impl SyncRequest {
    fn from_body(body: &[u8]) -> ApiResult<Self> {
        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(Self::default());
        }
        serde_json::from_slice(body)
            .map_err(|e| ApiError::BadRequest(format!("Invalid request body: {}", e)))
    }
}

/// POST /api/kmz/geojson response
#[derive(Debug, Serialize)]
pub struct GeoJsonResponse {
    pub success: bool,
    pub geojson: Option<FeatureCollection>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
    pub placemarks: usize,
}

/// POST /api/kmz/sync
pub async fn sync_kmz(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    body: Bytes,
) -> ApiResult<Json<SyncReport>> {
    let request = SyncRequest::from_body(&body)?;
    let reference = resolve_reference(&state.db, request.file_id.as_deref()).await?;

    info!(?caller, file = reference.label(), "Sync requested");

    match state.pipeline.run(state.store.as_ref(), &reference).await {
        Ok(report) => {
            state.clear_error().await;
            Ok(Json(report))
        }
        Err(e) => {
            state.record_error(&e).await;
            Err(e.into())
        }
    }
}

/// POST /api/kmz/geojson
pub async fn kmz_to_geojson(
    State(state): State<AppState>,
    body: Bytes,
) -> ApiResult<Json<GeoJsonResponse>> {
    let request = SyncRequest::from_body(&body)?;
    let reference = resolve_reference(&state.db, request.file_id.as_deref()).await?;

    let preview = state.pipeline.preview(&reference).await?;

    Ok(Json(GeoJsonResponse {
        success: true,
        geojson: preview.collection,
        warning: preview.warning,
        placemarks: preview.placemarks,
    }))
}

/// Build sync routes
pub fn sync_routes() -> Router<AppState> {
    Router::new()
        .route("/api/kmz/sync", post(sync_kmz))
        .route("/api/kmz/geojson", post(kmz_to_geojson))
}
