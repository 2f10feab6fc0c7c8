//! Service configuration for parcel-gis
//!
//! Resolved once at startup from environment variables and the TOML file,
//! environment first. The service credential is the exception: only its
//! *source* is resolved here, the JSON itself is read at each sync run.

use parcel_common::config::TomlConfig;
use std::path::PathBuf;
use tracing::info;

use crate::google::{CredentialSource, CREDENTIAL_ENV};

/// Environment variable holding the scheduled-job bearer token
pub const ANON_TOKEN_ENV: &str = "PARCEL_ANON_TOKEN";

/// Deep-link base used when nothing is configured
pub const DEFAULT_APP_BASE_URL: &str = "http://localhost:3000";

/// Runtime settings shared by handlers
#[derive(Debug, Clone)]
pub struct GisConfig {
    /// Web application root for feed deep links
    pub app_base_url: String,
    /// Bearer token the scheduled caller presents (if any)
    pub anonymous_token: Option<String>,
    /// Host endpoint validating interactive session tokens
    pub session_url: Option<String>,
    pub credential: CredentialSource,
    pub drive_api_base_url: String,
    pub drive_download_base_url: String,
}

impl Default for GisConfig {
    fn default() -> Self {
        Self::from_toml(&TomlConfig::default())
    }
}

impl GisConfig {
    pub fn from_toml(toml_config: &TomlConfig) -> Self {
        let anonymous_token = non_blank_env(ANON_TOKEN_ENV)
            .or_else(|| toml_config.auth.anonymous_token.clone())
            .filter(|t| !t.trim().is_empty());

        Self {
            app_base_url: toml_config
                .app_base_url
                .clone()
                .unwrap_or_else(|| DEFAULT_APP_BASE_URL.to_string()),
            anonymous_token,
            session_url: toml_config.auth.session_url.clone(),
            credential: resolve_credential_source(toml_config.credential_file.as_ref()),
            drive_api_base_url: toml_config.drive.api_base_url.clone(),
            drive_download_base_url: toml_config.drive.download_base_url.clone(),
        }
    }
}

/// Environment wins over the TOML `credential_file`
fn resolve_credential_source(credential_file: Option<&PathBuf>) -> CredentialSource {
    if non_blank_env(CREDENTIAL_ENV).is_some() {
        info!("Service credential source: environment ({})", CREDENTIAL_ENV);
        return CredentialSource::Env(CREDENTIAL_ENV.to_string());
    }

    match credential_file {
        Some(path) => {
            info!("Service credential source: file {}", path.display());
            CredentialSource::File(path.clone())
        }
        None => {
            info!("No service credential configured; only public downloads will work");
            CredentialSource::None
        }
    }
}

fn non_blank_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}
