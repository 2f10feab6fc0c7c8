//! Live KML feed endpoints

use axum::{
    extract::{Query, State},
    http::{
        header::{CACHE_CONTROL, CONTENT_TYPE, EXPIRES, HOST, PRAGMA},
        HeaderMap,
    },
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use reqwest::Url;
use serde::Deserialize;
use tracing::debug;

use crate::error::{ApiError, ApiResult};
use crate::feed::{render_feed, render_network_link, DEFAULT_REFRESH_SECS, KML_CONTENT_TYPE};
use crate::AppState;

const FEED_PATH: &str = "/api/kml/feed";

#[derive(Debug, Default, Deserialize)]
pub struct FeedQuery {
    /// Application root for deep links
    pub base_url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct NetworkLinkQuery {
    pub base_url: Option<String>,
    /// Refresh interval in seconds
    pub refresh: Option<u32>,
}

/// GET /api/kml/feed
pub async fn kml_feed(
    State(state): State<AppState>,
    Query(query): Query<FeedQuery>,
) -> ApiResult<Response> {
    let base_url = non_blank(query.base_url).unwrap_or_else(|| state.config.app_base_url.clone());
    let parcels = state.store.list_with_geometry().await?;

    debug!(parcels = parcels.len(), %base_url, "Rendering KML feed");
    Ok(kml_response(render_feed(&parcels, &base_url)))
}

/// GET /api/kml/network-link
///
/// Points a desktop viewer at this service's feed URL, derived from the
/// request's `Host` header.
pub async fn kml_network_link(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<NetworkLinkQuery>,
) -> ApiResult<Response> {
    let host = headers
        .get(HOST)
        .and_then(|h| h.to_str().ok())
        .ok_or_else(|| ApiError::BadRequest("Missing Host header".to_string()))?;

    let base_url = non_blank(query.base_url).unwrap_or_else(|| state.config.app_base_url.clone());
    let feed_url = Url::parse_with_params(
        &format!("http://{}{}", host, FEED_PATH),
        &[("base_url", base_url.as_str())],
    )
    .map_err(|e| ApiError::BadRequest(format!("Cannot build feed URL: {}", e)))?;

    let refresh = query.refresh.unwrap_or(DEFAULT_REFRESH_SECS);
    Ok(kml_response(render_network_link(feed_url.as_str(), refresh)))
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// KML body with caching disabled
fn kml_response(body: String) -> Response {
    (
        [
            (CONTENT_TYPE, KML_CONTENT_TYPE),
            (CACHE_CONTROL, "no-cache, no-store, must-revalidate"),
            (PRAGMA, "no-cache"),
            (EXPIRES, "0"),
        ],
        body,
    )
        .into_response()
}

/// Build feed routes
pub fn feed_routes() -> Router<AppState> {
    Router::new()
        .route(FEED_PATH, get(kml_feed))
        .route("/api/kml/network-link", get(kml_network_link))
}
