//! Bootstrap configuration loading and root folder resolution
//!
//! Configuration sources, highest priority first:
//! 1. Command-line argument
//! 2. Environment variable
//! 3. TOML config file
//! 4. OS-dependent compiled default
//!
//! Only bootstrap concerns live in TOML. The default sync source file id is
//! runtime state and lives in the `settings` table (see [`crate::db::settings`]).

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable naming the root folder
pub const ROOT_FOLDER_ENV: &str = "PARCEL_ROOT_FOLDER";

/// Database file name inside the root folder
pub const DATABASE_FILE_NAME: &str = "parcels.db";

/// Default Drive REST endpoint
pub const DEFAULT_DRIVE_API_BASE_URL: &str = "https://www.googleapis.com/drive/v3";

/// Default public download endpoint
pub const DEFAULT_DRIVE_DOWNLOAD_BASE_URL: &str = "https://drive.google.com/uc";

/// Bootstrap configuration loaded from TOML file
///
/// Every field is optional in the file; a missing file yields `TomlConfig::default()`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TomlConfig {
    /// Root folder holding the database (optional)
    #[serde(default)]
    pub root_folder: Option<PathBuf>,

    /// Explicit database path, overrides `<root_folder>/parcels.db`
    #[serde(default)]
    pub database_path: Option<PathBuf>,

    /// HTTP server port
    #[serde(default)]
    pub port: Option<u16>,

    /// Base URL of the web application, used for deep links in the feed
    #[serde(default)]
    pub app_base_url: Option<String>,

    /// Path to a JSON service credential file
    #[serde(default)]
    pub credential_file: Option<PathBuf>,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Caller authentication for the sync trigger
    #[serde(default)]
    pub auth: AuthConfig,

    /// Remote file provider endpoints
    #[serde(default)]
    pub drive: DriveConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// Sync trigger authentication
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Fixed bearer token identifying the scheduled-job caller
    #[serde(default)]
    pub anonymous_token: Option<String>,

    /// Host endpoint that validates an interactive session bearer token
    #[serde(default)]
    pub session_url: Option<String>,
}

/// Remote file provider endpoints
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriveConfig {
    /// Authenticated REST API base
    #[serde(default = "default_drive_api_base_url")]
    pub api_base_url: String,

    /// Unauthenticated public download base
    #[serde(default = "default_drive_download_base_url")]
    pub download_base_url: String,
}

impl Default for DriveConfig {
    fn default() -> Self {
        Self {
            api_base_url: default_drive_api_base_url(),
            download_base_url: default_drive_download_base_url(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_drive_api_base_url() -> String {
    DEFAULT_DRIVE_API_BASE_URL.to_string()
}

fn default_drive_download_base_url() -> String {
    DEFAULT_DRIVE_DOWNLOAD_BASE_URL.to_string()
}

/// Load bootstrap configuration from a TOML file
///
/// A missing file is not an error: a warning is logged and defaults are used.
/// A file that exists but fails to parse is a configuration error.
pub fn load_toml_config(path: &Path) -> Result<TomlConfig> {
    if !path.exists() {
        warn!(
            "Config file not found at {}, using built-in defaults",
            path.display()
        );
        return Ok(TomlConfig::default());
    }

    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Read TOML failed: {}", e)))?;
    let config: TomlConfig = toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Parse TOML failed: {}", e)))?;

    info!("Loaded configuration from {}", path.display());
    Ok(config)
}

/// Root folder resolution
///
/// 1. Command-line argument
/// 2. `PARCEL_ROOT_FOLDER`
/// 3. `root_folder` from TOML
/// 4. OS-dependent compiled default
pub fn resolve_root_folder(cli_arg: Option<&Path>, toml_config: &TomlConfig) -> PathBuf {
    if let Some(path) = cli_arg {
        return path.to_path_buf();
    }

    if let Ok(path) = std::env::var(ROOT_FOLDER_ENV) {
        if !path.trim().is_empty() {
            return PathBuf::from(path);
        }
    }

    if let Some(path) = &toml_config.root_folder {
        return path.clone();
    }

    default_root_folder()
}

/// Resolve the database path: explicit path wins, else `<root>/parcels.db`
pub fn resolve_database_path(
    cli_arg: Option<&Path>,
    root_folder: &Path,
    toml_config: &TomlConfig,
) -> PathBuf {
    cli_arg
        .map(Path::to_path_buf)
        .or_else(|| toml_config.database_path.clone())
        .unwrap_or_else(|| root_folder.join(DATABASE_FILE_NAME))
}

/// Default configuration file path for the platform
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .map(|d| d.join("parcel-gis").join("config.toml"))
        .unwrap_or_else(|| PathBuf::from("parcel-gis.toml"))
}

/// OS-dependent default root folder path
pub fn default_root_folder() -> PathBuf {
    if cfg!(target_os = "linux") {
        // ~/.local/share/parcel-gis (or /var/lib/parcel-gis for system-wide)
        dirs::data_local_dir()
            .map(|d| d.join("parcel-gis"))
            .unwrap_or_else(|| PathBuf::from("/var/lib/parcel-gis"))
    } else if cfg!(target_os = "macos") {
        dirs::data_dir()
            .map(|d| d.join("parcel-gis"))
            .unwrap_or_else(|| PathBuf::from("/Library/Application Support/parcel-gis"))
    } else if cfg!(target_os = "windows") {
        dirs::data_local_dir()
            .map(|d| d.join("parcel-gis"))
            .unwrap_or_else(|| PathBuf::from("C:\\ProgramData\\parcel-gis"))
    } else {
        PathBuf::from("./parcel_gis_data")
    }
}
