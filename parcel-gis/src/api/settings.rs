//! Default sync source setting

use axum::{extract::State, routing::get, Json, Router};
use parcel_common::db::settings;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{ApiError, ApiResult};
use crate::fetch::extract_file_id;
use crate::AppState;

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KmzFileIdSetting {
    pub file_id: Option<String>,
}

/// GET /api/settings/kmz-file-id
pub async fn get_kmz_file_id(State(state): State<AppState>) -> ApiResult<Json<KmzFileIdSetting>> {
    let file_id = settings::get_kmz_sync_file_id(&state.db).await?;
    Ok(Json(KmzFileIdSetting { file_id }))
}

/// PUT /api/settings/kmz-file-id
///
/// Accepts a bare id or a share URL; the extracted id is stored.
pub async fn set_kmz_file_id(
    State(state): State<AppState>,
    Json(request): Json<KmzFileIdSetting>,
) -> ApiResult<Json<KmzFileIdSetting>> {
    let input = request
        .file_id
        .ok_or_else(|| ApiError::BadRequest("fileId is required".to_string()))?;
    let file_id = extract_file_id(&input)
        .ok_or_else(|| ApiError::BadRequest(format!("No file id found in '{}'", input.trim())))?;

    settings::set_kmz_sync_file_id(&state.db, &file_id).await?;
    info!(%file_id, "Default KMZ sync file updated");

    Ok(Json(KmzFileIdSetting {
        file_id: Some(file_id),
    }))
}

/// Build settings routes
pub fn settings_routes() -> Router<AppState> {
    Router::new().route(
        "/api/settings/kmz-file-id",
        get(get_kmz_file_id).put(set_kmz_file_id),
    )
}
