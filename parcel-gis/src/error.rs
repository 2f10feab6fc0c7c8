//! Error types for parcel-gis HTTP handlers

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::fetch::FetchError;
use crate::sync::SyncError;

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Invalid request (400)
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Caller could not be authenticated (401)
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Internal server error (500)
    #[error("Internal server error: {0}")]
    Internal(String),

    /// Pipeline failure
    #[error(transparent)]
    Sync(#[from] SyncError),

    /// parcel-common error
    #[error("Common error: {0}")]
    Common(#[from] parcel_common::Error),
}

impl ApiError {
    fn parts(&self) -> (StatusCode, &'static str) {
        match self {
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            ApiError::Unauthorized(_) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED"),
            ApiError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
            ApiError::Common(parcel_common::Error::InvalidInput(_)) => {
                (StatusCode::BAD_REQUEST, "BAD_REQUEST")
            }
            ApiError::Common(parcel_common::Error::NotFound(_)) => {
                (StatusCode::NOT_FOUND, "NOT_FOUND")
            }
            ApiError::Common(_) => (StatusCode::INTERNAL_SERVER_ERROR, "COMMON_ERROR"),
            ApiError::Sync(err) => match err {
                SyncError::MissingFileId | SyncError::Fetch(FetchError::MissingReference) => {
                    (StatusCode::BAD_REQUEST, "MISSING_FILE_ID")
                }
                SyncError::Archive(_) => (StatusCode::UNPROCESSABLE_ENTITY, "INVALID_ARCHIVE"),
                SyncError::NoPlacemarks => (StatusCode::UNPROCESSABLE_ENTITY, "NO_PLACEMARKS"),
                SyncError::Credential(_) | SyncError::Fetch(FetchError::Token(_)) => {
                    (StatusCode::BAD_GATEWAY, "AUTH_FAILED")
                }
                SyncError::Fetch(FetchError::DownloadFailed { .. }) => {
                    (StatusCode::BAD_GATEWAY, "DOWNLOAD_FAILED")
                }
                SyncError::Reconcile(_) | SyncError::Settings(_) => {
                    (StatusCode::INTERNAL_SERVER_ERROR, "DATASTORE_ERROR")
                }
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code) = self.parts();
        let message = self.to_string();

        if status.is_server_error() {
            tracing::error!(code = error_code, %message, "Request failed");
        } else {
            tracing::warn!(code = error_code, %message, "Request rejected");
        }

        let body = Json(json!({
            "error": {
                "code": error_code,
                "message": message,
            }
        }));

        (status, body).into_response()
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;
