//! OAuth token issuance for a service credential
//!
//! A signed RS256 JWT assertion (issuer = principal, audience = token
//! endpoint, one hour lifetime) is exchanged for a short-lived bearer token
//! through the `jwt-bearer` grant. No retries happen at this layer.

use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;
use tracing::{debug, info};

use super::credential::ServiceCredential;

/// Default OAuth token endpoint
pub const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

/// Read-only file access scope
pub const DRIVE_READONLY_SCOPE: &str = "https://www.googleapis.com/auth/drive.readonly";

const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";

/// Assertion lifetime in seconds
const ASSERTION_TTL_SECS: u64 = 3600;

/// Token issuance errors
#[derive(Debug, Error)]
pub enum TokenError {
    #[error("Invalid service credential: {0}")]
    InvalidCredential(String),

    #[error("Failed to sign assertion: {0}")]
    Signing(String),

    #[error("Token exchange failed{}: {body}", http_status_suffix(.status))]
    TokenExchangeFailed { status: Option<u16>, body: String },
}

fn http_status_suffix(status: &Option<u16>) -> String {
    status.map(|s| format!(" (HTTP {})", s)).unwrap_or_default()
}

#[derive(Debug, Serialize)]
struct AssertionClaims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: u64,
    exp: u64,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

/// Build the signed JWT assertion for `scope` at time `now` (unix seconds)
pub fn build_assertion(
    credential: &ServiceCredential,
    scope: &str,
    now: u64,
) -> Result<String, TokenError> {
    let claims = AssertionClaims {
        iss: &credential.client_email,
        scope,
        aud: &credential.token_uri,
        iat: now,
        exp: now + ASSERTION_TTL_SECS,
    };

    let key = EncodingKey::from_rsa_pem(credential.pem().as_bytes())
        .map_err(|e| TokenError::InvalidCredential(format!("Private key rejected: {}", e)))?;

    let mut header = Header::new(Algorithm::RS256);
    header.kid = credential.private_key_id.clone();

    jsonwebtoken::encode(&header, &claims, &key).map_err(|e| TokenError::Signing(e.to_string()))
}

/// Exchanges service-credential assertions for bearer tokens
#[derive(Clone)]
pub struct TokenIssuer {
    http_client: reqwest::Client,
}

impl TokenIssuer {
    pub fn new(http_client: reqwest::Client) -> Self {
        Self { http_client }
    }

    /// Obtain a bearer token for `scope`
    pub async fn issue(
        &self,
        credential: &ServiceCredential,
        scope: &str,
    ) -> Result<String, TokenError> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|e| TokenError::Signing(e.to_string()))?
            .as_secs();
        let assertion = build_assertion(credential, scope, now)?;

        debug!(
            principal = %credential.client_email,
            endpoint = %credential.token_uri,
            "Exchanging service assertion for access token"
        );

        let response = self
            .http_client
            .post(&credential.token_uri)
            .form(&[("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())])
            .send()
            .await
            .map_err(|e| TokenError::TokenExchangeFailed {
                status: None,
                body: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "unable to read token response body".to_string());
            return Err(TokenError::TokenExchangeFailed {
                status: Some(status.as_u16()),
                body,
            });
        }

        let token: TokenResponse = response.json().await.map_err(|e| {
            TokenError::TokenExchangeFailed {
                status: Some(status.as_u16()),
                body: format!("Unreadable token response: {}", e),
            }
        })?;

        info!(
            principal = %credential.client_email,
            expires_in = token.expires_in,
            "Access token issued"
        );

        Ok(token.access_token)
    }
}
