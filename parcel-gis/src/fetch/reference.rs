//! Remote file references
//!
//! Users paste share links in several shapes; sync only needs the stable
//! file id when one can be found, and the original URL otherwise.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

static PATH_ID_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"/(?:file/)?d/([A-Za-z0-9_-]{10,})").expect("valid path id pattern")
});

static QUERY_ID_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[?&]id=([A-Za-z0-9_-]{10,})").expect("valid query id pattern")
});

static BARE_ID_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_-]{10,}$").expect("valid bare id pattern"));

/// A remote file, by URL and/or stable id
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileReference {
    pub url: Option<String>,
    pub file_id: Option<String>,
}

impl FileReference {
    /// Interpret user input: a bare file id or any URL
    ///
    /// Returns `None` for blank input.
    pub fn parse(input: &str) -> Option<Self> {
        let input = input.trim();
        if input.is_empty() {
            return None;
        }

        if BARE_ID_RE.is_match(input) {
            return Some(Self::from_id(input));
        }

        Some(Self {
            url: Some(input.to_string()),
            file_id: extract_file_id(input),
        })
    }

    pub fn from_id(file_id: impl Into<String>) -> Self {
        Self {
            url: None,
            file_id: Some(file_id.into()),
        }
    }

    /// Id if known, else the URL, for logs and provenance
    pub fn label(&self) -> &str {
        self.file_id
            .as_deref()
            .or(self.url.as_deref())
            .unwrap_or("<none>")
    }
}

/// Extract a file id from a share URL or accept a bare id
pub fn extract_file_id(input: &str) -> Option<String> {
    let input = input.trim();
    if BARE_ID_RE.is_match(input) {
        return Some(input.to_string());
    }

    PATH_ID_RE
        .captures(input)
        .or_else(|| QUERY_ID_RE.captures(input))
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}
