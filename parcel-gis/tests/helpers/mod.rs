//! Shared fixtures for parcel-gis integration tests
//!
//! Upstream services (file host, token endpoint, session endpoint) are
//! small axum routers bound to an ephemeral local port.

#![allow(dead_code)]

use axum::{
    body::Body,
    extract::{Path, Query, State},
    http::{HeaderMap, Request, StatusCode},
    response::{IntoResponse, Response},
    routing, Form, Json, Router,
};
use parcel_common::db::{init::create_tables, SqliteParcelStore};
use parcel_gis::config::GisConfig;
use parcel_gis::google::CredentialSource;
use parcel_gis::{build_router, AppState};
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use std::collections::HashMap;
use std::io::Write;
use std::sync::{Arc, Mutex};
use tempfile::NamedTempFile;
use tower::ServiceExt;

pub const KEY_PEM: &str = include_str!("../fixtures/test_service_key.pem");
pub const PRINCIPAL: &str = "sync@parcels-test.iam.example.com";
pub const FILE_ID: &str = "1KmzFileId_abcdefgh";

/// Request log shared between a mock server and the test
#[derive(Clone, Default)]
pub struct Hits(Arc<Mutex<Vec<String>>>);

impl Hits {
    pub fn push(&self, hit: impl Into<String>) {
        self.0.lock().unwrap().push(hit.into());
    }

    pub fn all(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }
}

/// Serve `router` on 127.0.0.1 and return its base URL
pub async fn spawn_upstream(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{}", addr)
}

/// Zip `kml` into a KMZ with the usual `doc.kml` entry
pub fn build_kmz(kml: &str) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
    let options = zip::write::SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Deflated);
    writer.start_file("doc.kml", options).unwrap();
    writer.write_all(kml.as_bytes()).unwrap();
    writer.finish().unwrap().into_inner()
}

/// KML document wrapping the given placemark fragments
pub fn kml_document(placemarks: &[String]) -> String {
    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
         <kml xmlns=\"http://www.opengis.net/kml/2.2\"><Document>{}</Document></kml>",
        placemarks.concat()
    )
}

pub fn polygon_placemark(name: &str, id: Option<&str>, coordinates: &str) -> String {
    let id_attr = id.map(|id| format!(" id=\"{}\"", id)).unwrap_or_default();
    format!(
        "<Placemark{}><name>{}</name><Polygon><outerBoundaryIs><LinearRing>\
         <coordinates>{}</coordinates></LinearRing></outerBoundaryIs></Polygon></Placemark>",
        id_attr, name, coordinates
    )
}

/// Closed four-point ring
pub const SQUARE: &str = "-47.1,-22.1,0 -47.0,-22.1,0 -47.0,-22.0,0 -47.1,-22.1,0";

pub async fn test_db() -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    create_tables(&pool).await.unwrap();
    pool
}

pub fn test_store(pool: &SqlitePool) -> SqliteParcelStore {
    SqliteParcelStore::new(pool.clone())
}

/// Credential JSON file whose token endpoint is `token_uri`
pub fn credential_file(token_uri: &str) -> NamedTempFile {
    let json = serde_json::json!({
        "type": "service_account",
        "client_email": PRINCIPAL,
        "private_key_id": "test-key-1",
        "private_key": KEY_PEM,
        "token_uri": token_uri,
    });
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(json.to_string().as_bytes()).unwrap();
    file
}

/// Service configuration pointing every upstream at `upstream`
pub fn test_config(upstream: &str, credential: CredentialSource) -> GisConfig {
    GisConfig {
        app_base_url: "https://app.example.com".to_string(),
        anonymous_token: Some("cron-anon-token".to_string()),
        session_url: None,
        credential,
        drive_api_base_url: format!("{}/drive/v3", upstream),
        drive_download_base_url: format!("{}/uc", upstream),
    }
}

pub fn test_app(pool: SqlitePool, config: GisConfig) -> Router {
    build_router(AppState::new(pool, config))
}

pub fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

/// Send one request, returning status and parsed JSON body
pub async fn send_json(app: Router, request: Request<Body>) -> (StatusCode, serde_json::Value) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
    (status, body)
}

pub const MOCK_ACCESS_TOKEN: &str = "mock-access-token";

/// How the public download link behaves
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum PublicMode {
    /// Serve the file directly
    Content,
    /// HTML virus-scan page unless `confirm` is present
    Interstitial,
    /// Always an HTML page
    AlwaysHtml,
    /// 404
    Denied,
}

/// How the authenticated API behaves for media requests
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ApiMode {
    Content,
    NotDownloadable,
    Forbidden,
}

/// Mock file host plus OAuth token endpoint
#[derive(Clone)]
pub struct DriveMock {
    pub hits: Hits,
    pub content: Arc<Vec<u8>>,
    pub public: PublicMode,
    pub api: ApiMode,
    pub mime_type: &'static str,
    pub token_ok: bool,
}

impl DriveMock {
    pub fn new(content: Vec<u8>) -> Self {
        Self {
            hits: Hits::default(),
            content: Arc::new(content),
            public: PublicMode::Content,
            api: ApiMode::Content,
            mime_type: "application/vnd.google-earth.kmz",
            token_ok: true,
        }
    }

    pub fn public(mut self, mode: PublicMode) -> Self {
        self.public = mode;
        self
    }

    pub fn api(mut self, mode: ApiMode) -> Self {
        self.api = mode;
        self
    }

    pub fn mime_type(mut self, mime_type: &'static str) -> Self {
        self.mime_type = mime_type;
        self
    }

    pub fn token_fails(mut self) -> Self {
        self.token_ok = false;
        self
    }

    /// Spawn the mock and return its base URL
    pub async fn spawn(&self) -> String {
        let router = Router::new()
            .route("/uc", routing::get(mock_public_download))
            .route("/token", routing::post(mock_token))
            .route("/drive/v3/files/:id", routing::get(mock_drive_file))
            .with_state(self.clone());
        spawn_upstream(router).await
    }
}

const INTERSTITIAL_HTML: &str =
    "<!DOCTYPE html><html><head><title>Virus scan warning</title></head><body>Download anyway</body></html>";

async fn mock_public_download(
    State(mock): State<DriveMock>,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    let confirmed = query.contains_key("confirm");
    mock.hits.push(if confirmed { "public-confirm" } else { "public" });

    match (mock.public, confirmed) {
        (PublicMode::Content, _) | (PublicMode::Interstitial, true) => {
            mock.content.as_ref().clone().into_response()
        }
        (PublicMode::Interstitial, false) | (PublicMode::AlwaysHtml, _) => {
            ([("content-type", "text/html")], INTERSTITIAL_HTML).into_response()
        }
        (PublicMode::Denied, _) => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn mock_token(
    State(mock): State<DriveMock>,
    Form(form): Form<HashMap<String, String>>,
) -> Response {
    mock.hits.push("token");

    let grant_ok = form.get("grant_type").map(String::as_str)
        == Some("urn:ietf:params:oauth:grant-type:jwt-bearer");
    if !mock.token_ok || !grant_ok || !form.contains_key("assertion") {
        return (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({"error": "invalid_grant", "error_description": "Invalid JWT Signature."})),
        )
            .into_response();
    }

    Json(serde_json::json!({
        "access_token": MOCK_ACCESS_TOKEN,
        "expires_in": 3599,
        "token_type": "Bearer",
    }))
    .into_response()
}

async fn mock_drive_file(
    State(mock): State<DriveMock>,
    Path(id): Path<String>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Response {
    let expected = format!("Bearer {}", MOCK_ACCESS_TOKEN);
    if headers.get("authorization").and_then(|v| v.to_str().ok()) != Some(expected.as_str()) {
        return StatusCode::UNAUTHORIZED.into_response();
    }

    if query.get("alt").map(String::as_str) == Some("media") {
        mock.hits.push("api-media");
        return match mock.api {
            ApiMode::Content => mock.content.as_ref().clone().into_response(),
            ApiMode::NotDownloadable => (
                StatusCode::FORBIDDEN,
                Json(serde_json::json!({"error": {"code": 403, "errors": [{"reason": "fileNotDownloadable"}]}})),
            )
                .into_response(),
            ApiMode::Forbidden => (
                StatusCode::FORBIDDEN,
                Json(serde_json::json!({"error": {"code": 403, "errors": [{"reason": "forbidden"}]}})),
            )
                .into_response(),
        };
    }

    mock.hits.push("api-metadata");
    Json(serde_json::json!({
        "id": id,
        "name": "parcels.kmz",
        "mimeType": mock.mime_type,
    }))
    .into_response()
}
