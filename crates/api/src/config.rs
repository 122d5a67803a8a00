//! Application configuration loaded from environment variables.

use std::path::PathBuf;

use persistence::images::DEFAULT_MAX_BYTES;
use secrecy::SecretString;

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl LogFormat {
    fn parse(value: &str) -> Self {
        if value.trim().eq_ignore_ascii_case("json") {
            LogFormat::Json
        } else {
            LogFormat::Text
        }
    }
}

/// Server configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST`: bind address (default: `"0.0.0.0"`)
/// - `PORT`: listen port (default: `3000`)
/// - `RUST_LOG`: tracing filter directive (default: `"info"`)
/// - `LOG_FORMAT`: `text` or `json` (default: `text`)
/// - `SNAPSHOT_PATH`: file backing the snapshot slot
/// - `ADMIN_ACCOUNTS_PATH`: file holding admin accounts and password hashes
/// - `UPLOAD_DIR`, `UPLOAD_PUBLIC_PREFIX`, `UPLOAD_MAX_BYTES`: image storage
/// - `ADMIN_API_TOKEN`: static bearer token accepted on admin routes
/// - `DATABASE_URL`: enables the Postgres document gateway
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub log_format: LogFormat,
    pub snapshot_path: PathBuf,
    pub admin_accounts_path: PathBuf,
    pub upload_dir: PathBuf,
    pub upload_public_prefix: String,
    pub upload_max_bytes: usize,
    pub admin_api_token: Option<SecretString>,
    pub database_url: Option<SecretString>,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a configuration from any key lookup. Blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let defaults = Self::default();

        Self {
            host: var("HOST").unwrap_or(defaults.host),
            port: var("PORT")
                .and_then(|p| p.trim().parse().ok())
                .unwrap_or(defaults.port),
            log_level: var("RUST_LOG").unwrap_or(defaults.log_level),
            log_format: var("LOG_FORMAT")
                .map(|f| LogFormat::parse(&f))
                .unwrap_or_default(),
            snapshot_path: var("SNAPSHOT_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.snapshot_path),
            admin_accounts_path: var("ADMIN_ACCOUNTS_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.admin_accounts_path),
            upload_dir: var("UPLOAD_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.upload_dir),
            upload_public_prefix: var("UPLOAD_PUBLIC_PREFIX")
                .unwrap_or(defaults.upload_public_prefix),
            upload_max_bytes: var("UPLOAD_MAX_BYTES")
                .and_then(|b| b.trim().parse().ok())
                .unwrap_or(defaults.upload_max_bytes),
            admin_api_token: var("ADMIN_API_TOKEN").map(SecretString::from),
            database_url: var("DATABASE_URL").map(SecretString::from),
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            log_format: LogFormat::Text,
            snapshot_path: PathBuf::from("data/restaurant-state.json"),
            admin_accounts_path: PathBuf::from("data/admin-accounts.json"),
            upload_dir: PathBuf::from("public/uploads"),
            upload_public_prefix: "/uploads".to_string(),
            upload_max_bytes: DEFAULT_MAX_BYTES,
            admin_api_token: None,
            database_url: None,
        }
    }
}
