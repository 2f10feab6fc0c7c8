//! Remote file retrieval with ordered fallback strategies
//!
//! Strategies, first success wins:
//! 1. Authenticated API download (file id + credential)
//! 2. Public download link
//! 3. Public download link with the `confirm` parameter (interstitial bypass)
//! 4. Authenticated API download again, reusing the run's token
//!
//! Each attempt yields bytes, a skip (the file exists but is not binary
//! content, e.g. a shortcut or native cloud document), or a retryable
//! failure that moves on to the next strategy.

mod reference;

pub use reference::{extract_file_id, FileReference};

use reqwest::{StatusCode, Url};
use serde::Deserialize;
use std::fmt;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::google::{ServiceCredential, TokenError, TokenIssuer, DRIVE_READONLY_SCOPE};

/// Bytes sniffed when deciding whether a body is an HTML page
const HTML_SNIFF_BYTES: usize = 500;

/// MIME prefix of provider-native documents and shortcuts
const NATIVE_MIME_PREFIX: &str = "application/vnd.google-apps.";

/// Successful fetch result
#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
    /// Raw file bytes
    Content(Vec<u8>),
    /// Valid reference to something that is not downloadable binary content
    NotBinary { reason: String },
}

/// Fetch failures that end the sync run
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("No file id or URL to download")]
    MissingReference,

    #[error("Download failed: {hint}")]
    DownloadFailed { hint: String, attempts: Vec<String> },

    #[error(transparent)]
    Token(#[from] TokenError),
}

/// One retrieval strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Strategy {
    Api,
    PublicLink,
    ConfirmLink,
    ApiFallback,
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Strategy::Api => "api",
            Strategy::PublicLink => "public-link",
            Strategy::ConfirmLink => "confirm-link",
            Strategy::ApiFallback => "api-fallback",
        })
    }
}

/// Result of one strategy
enum Attempt {
    Content(Vec<u8>),
    Skip(String),
    Retryable(String),
}

/// Per-run state shared by strategies
struct FetchRun<'a> {
    reference: &'a FileReference,
    credential: Option<&'a ServiceCredential>,
    token: Option<String>,
    token_error: Option<TokenError>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileMetadata {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    mime_type: Option<String>,
}

/// True when the first bytes look like an HTML page rather than file content
pub fn looks_like_html(bytes: &[u8]) -> bool {
    let head = &bytes[..bytes.len().min(HTML_SNIFF_BYTES)];
    let head = String::from_utf8_lossy(head).to_ascii_lowercase();
    head.contains("<!doctype html") || head.contains("<html")
}

/// Resolves file references to bytes
#[derive(Clone)]
pub struct FileFetcher {
    http_client: reqwest::Client,
    token_issuer: TokenIssuer,
    api_base_url: String,
    download_base_url: String,
}

impl FileFetcher {
    pub fn new(
        http_client: reqwest::Client,
        api_base_url: impl Into<String>,
        download_base_url: impl Into<String>,
    ) -> Self {
        Self {
            token_issuer: TokenIssuer::new(http_client.clone()),
            http_client,
            api_base_url: api_base_url.into().trim_end_matches('/').to_string(),
            download_base_url: download_base_url.into(),
        }
    }

    /// Fetch the referenced file
    pub async fn fetch(
        &self,
        reference: &FileReference,
        credential: Option<&ServiceCredential>,
    ) -> Result<FetchOutcome, FetchError> {
        let plan = self.plan(reference, credential.is_some());
        if plan.is_empty() {
            return Err(FetchError::MissingReference);
        }

        let mut run = FetchRun {
            reference,
            credential,
            token: None,
            token_error: None,
        };
        let mut attempts = Vec::new();

        for strategy in plan {
            debug!(%strategy, file = reference.label(), "Attempting download strategy");

            match self.attempt(strategy, &mut run).await {
                Attempt::Content(bytes) => {
                    info!(%strategy, file = reference.label(), bytes = bytes.len(), "File downloaded");
                    return Ok(FetchOutcome::Content(bytes));
                }
                Attempt::Skip(reason) => {
                    warn!(%strategy, file = reference.label(), %reason, "File is not binary content");
                    return Ok(FetchOutcome::NotBinary { reason });
                }
                Attempt::Retryable(reason) => {
                    warn!(%strategy, file = reference.label(), %reason, "Download strategy failed");
                    attempts.push(format!("{}: {}", strategy, reason));
                }
            }
        }

        // Every path failed and the credential could not even get a token
        if let Some(error) = run.token_error {
            return Err(FetchError::Token(error));
        }

        Err(FetchError::DownloadFailed {
            hint: failure_hint(credential),
            attempts,
        })
    }

    fn plan(&self, reference: &FileReference, has_credential: bool) -> Vec<Strategy> {
        let api = reference.file_id.is_some() && has_credential;
        let public = reference.file_id.is_some() || reference.url.is_some();

        let mut plan = Vec::with_capacity(4);
        if api {
            plan.push(Strategy::Api);
        }
        if public {
            plan.push(Strategy::PublicLink);
            plan.push(Strategy::ConfirmLink);
        }
        if api && public {
            plan.push(Strategy::ApiFallback);
        }
        plan
    }

    async fn attempt(&self, strategy: Strategy, run: &mut FetchRun<'_>) -> Attempt {
        match strategy {
            Strategy::Api | Strategy::ApiFallback => self.api_download(run).await,
            Strategy::PublicLink => match self.public_url(run.reference) {
                Some(url) => self.public_download(url).await,
                None => Attempt::Retryable("no public URL".to_string()),
            },
            Strategy::ConfirmLink => match self.public_url(run.reference) {
                Some(mut url) => {
                    url.query_pairs_mut().append_pair("confirm", "t");
                    self.public_download(url).await
                }
                None => Attempt::Retryable("no public URL".to_string()),
            },
        }
    }

    fn public_url(&self, reference: &FileReference) -> Option<Url> {
        match (&reference.file_id, &reference.url) {
            (Some(id), _) => Url::parse_with_params(
                &self.download_base_url,
                &[("export", "download"), ("id", id.as_str())],
            )
            .ok(),
            (None, Some(url)) => Url::parse(url).ok(),
            (None, None) => None,
        }
    }

    async fn public_download(&self, url: Url) -> Attempt {
        let response = match self.http_client.get(url).send().await {
            Ok(response) => response,
            Err(e) => return Attempt::Retryable(format!("request failed: {}", e)),
        };

        let status = response.status();
        if !status.is_success() {
            return Attempt::Retryable(format!("HTTP {}", status.as_u16()));
        }

        match response.bytes().await {
            Ok(bytes) if looks_like_html(&bytes) => {
                Attempt::Retryable("received an HTML confirmation page".to_string())
            }
            Ok(bytes) => Attempt::Content(bytes.to_vec()),
            Err(e) => Attempt::Retryable(format!("reading body failed: {}", e)),
        }
    }

    async fn api_download(&self, run: &mut FetchRun<'_>) -> Attempt {
        let (Some(file_id), Some(credential)) = (run.reference.file_id.as_deref(), run.credential)
        else {
            return Attempt::Retryable("API requires a file id and a credential".to_string());
        };

        let token = match &run.token {
            Some(token) => token.clone(),
            None => match self.token_issuer.issue(credential, DRIVE_READONLY_SCOPE).await {
                Ok(token) => {
                    run.token = Some(token.clone());
                    run.token_error = None;
                    token
                }
                Err(e) => {
                    let reason = e.to_string();
                    run.token_error = Some(e);
                    return Attempt::Retryable(reason);
                }
            },
        };

        let file_url = format!("{}/files/{}", self.api_base_url, file_id);

        // Metadata first: shortcuts and native documents have no binary body
        let metadata = self
            .http_client
            .get(&file_url)
            .bearer_auth(&token)
            .query(&[("fields", "id,name,mimeType"), ("supportsAllDrives", "true")])
            .send()
            .await;

        match metadata {
            Ok(response) if response.status().is_success() => {
                if let Ok(meta) = response.json::<FileMetadata>().await {
                    if let Some(mime) = meta.mime_type.as_deref() {
                        if mime.starts_with(NATIVE_MIME_PREFIX) {
                            return Attempt::Skip(format!(
                                "'{}' is a {} and has no downloadable KMZ/KML content",
                                meta.name.as_deref().unwrap_or(file_id),
                                native_kind(mime)
                            ));
                        }
                    }
                }
            }
            Ok(response) => {
                let status = response.status();
                let body = response.text().await.unwrap_or_default();
                return Attempt::Retryable(format!(
                    "metadata HTTP {}: {}",
                    status.as_u16(),
                    truncate(&body, 200)
                ));
            }
            Err(e) => return Attempt::Retryable(format!("metadata request failed: {}", e)),
        }

        let response = match self
            .http_client
            .get(&file_url)
            .bearer_auth(&token)
            .query(&[("alt", "media"), ("supportsAllDrives", "true")])
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => return Attempt::Retryable(format!("content request failed: {}", e)),
        };

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            if status == StatusCode::FORBIDDEN && body.contains("fileNotDownloadable") {
                return Attempt::Skip(
                    "file is a native cloud document and cannot be downloaded as binary".to_string(),
                );
            }
            return Attempt::Retryable(format!(
                "content HTTP {}: {}",
                status.as_u16(),
                truncate(&body, 200)
            ));
        }

        match response.bytes().await {
            Ok(bytes) => Attempt::Content(bytes.to_vec()),
            Err(e) => Attempt::Retryable(format!("reading body failed: {}", e)),
        }
    }
}

fn native_kind(mime: &str) -> &'static str {
    match mime.trim_start_matches(NATIVE_MIME_PREFIX) {
        "shortcut" => "shortcut",
        "folder" => "folder",
        "document" | "spreadsheet" | "presentation" => "native cloud document",
        _ => "cloud-native item",
    }
}

fn failure_hint(credential: Option<&ServiceCredential>) -> String {
    match credential {
        Some(credential) => format!(
            "could not download the file; ensure it is shared with the service principal {}",
            credential.client_email
        ),
        None => "could not download the file; share it as 'anyone with the link' or configure a service credential".to_string(),
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}
