//! Caller authentication for the sync endpoints
//!
//! Two kinds of caller are accepted:
//! - the scheduled job, which sends no bearer token or the configured
//!   anonymous token
//! - an interactive user, whose bearer token is checked by the host
//!   application's session endpoint
//!
//! Session handling itself is delegated; this module only asks.

use async_trait::async_trait;
use axum::{
    extract::{Request, State},
    http::{header::AUTHORIZATION, HeaderMap},
    middleware::Next,
    response::Response,
};
use tracing::{debug, warn};

use crate::error::ApiError;
use crate::AppState;

/// Who triggered the request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Caller {
    Scheduled,
    Interactive,
}

/// Checks an interactive caller's bearer token
#[async_trait]
pub trait SessionValidator: Send + Sync {
    async fn validate(&self, token: &str) -> bool;
}

/// Validates tokens by calling the host's session endpoint
///
/// Any 2xx response means the session is valid.
pub struct HttpSessionValidator {
    http_client: reqwest::Client,
    session_url: String,
}

impl HttpSessionValidator {
    pub fn new(http_client: reqwest::Client, session_url: impl Into<String>) -> Self {
        Self {
            http_client,
            session_url: session_url.into(),
        }
    }
}

#[async_trait]
impl SessionValidator for HttpSessionValidator {
    async fn validate(&self, token: &str) -> bool {
        match self
            .http_client
            .get(&self.session_url)
            .bearer_auth(token)
            .send()
            .await
        {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                warn!(error = %e, "Session endpoint unreachable");
                false
            }
        }
    }
}

/// Used when no session endpoint is configured
pub struct RejectAllSessions;

#[async_trait]
impl SessionValidator for RejectAllSessions {
    async fn validate(&self, _token: &str) -> bool {
        false
    }
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer ").or_else(|| v.strip_prefix("bearer ")))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Classify the caller and reject unknown bearer tokens
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let caller = match bearer_token(request.headers()) {
        None => Caller::Scheduled,
        Some(token) if state.config.anonymous_token.as_deref() == Some(token) => Caller::Scheduled,
        Some(token) => {
            if !state.sessions.validate(token).await {
                return Err(ApiError::Unauthorized(
                    "Invalid or expired session".to_string(),
                ));
            }
            Caller::Interactive
        }
    };

    debug!(?caller, path = %request.uri().path(), "Caller authenticated");
    request.extensions_mut().insert(caller);

    Ok(next.run(request).await)
}
