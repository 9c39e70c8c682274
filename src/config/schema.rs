use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Deployment environment. Production tightens error detail and adds HSTS.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Production,
}

impl Environment {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Development => "development",
            Self::Production => "production",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "development" | "dev" => Some(Self::Development),
            "production" | "prod" => Some(Self::Production),
            _ => None,
        }
    }

    pub fn is_production(self) -> bool {
        self == Self::Production
    }
}

/// Top-level service configuration (`teacart.toml`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub environment: Environment,
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub cleanup: CleanupConfig,
    #[serde(default)]
    pub notifications: NotificationConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Allowed CORS origins. Empty allows any origin.
    #[serde(default)]
    pub allowed_origins: Vec<String>,
    #[serde(default = "default_login_rate_limit")]
    pub login_rate_limit_per_minute: u32,
    #[serde(default = "default_api_rate_limit")]
    pub api_rate_limit_per_minute: u32,
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_host() -> String {
    "127.0.0.1".into()
}

fn default_port() -> u16 {
    3000
}

fn default_login_rate_limit() -> u32 {
    5
}

fn default_api_rate_limit() -> u32 {
    100
}

fn default_max_body_bytes() -> usize {
    10 * 1024
}

fn default_request_timeout_secs() -> u64 {
    30
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            allowed_origins: Vec::new(),
            login_rate_limit_per_minute: default_login_rate_limit(),
            api_rate_limit_per_minute: default_api_rate_limit(),
            max_body_bytes: default_max_body_bytes(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

/// Which persistence backend to open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Sqlite,
    /// JSON document file next to the SQLite path (`teacart.json` by default).
    Document,
}

impl StoreBackend {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "sqlite" => Some(Self::Sqlite),
            "document" | "mongodb" => Some(Self::Document),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub backend: StoreBackend,
    /// SQLite database file. The document backend swaps the extension for `.json`.
    #[serde(default = "default_store_path")]
    pub path: PathBuf,
}

impl StoreConfig {
    /// File opened by the selected backend.
    pub fn data_path(&self) -> PathBuf {
        match self.backend {
            StoreBackend::Sqlite => self.path.clone(),
            StoreBackend::Document => self.path.with_extension("json"),
        }
    }
}

fn default_store_path() -> PathBuf {
    PathBuf::from("teacart.db")
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::default(),
            path: default_store_path(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Plaintext used to bootstrap the admin credential on first run.
    #[serde(default = "default_admin_password")]
    pub default_admin_password: String,
    #[serde(default = "default_min_password_len")]
    pub min_password_len: usize,
}

fn default_admin_password() -> String {
    "teatime".into()
}

fn default_min_password_len() -> usize {
    8
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            default_admin_password: default_admin_password(),
            min_password_len: default_min_password_len(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CleanupConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Six-field cron expression (seconds first).
    #[serde(default = "default_cleanup_schedule")]
    pub schedule: String,
    /// IANA timezone the schedule and the day boundary are evaluated in.
    #[serde(default = "default_cleanup_timezone")]
    pub timezone: String,
}

fn default_true() -> bool {
    true
}

fn default_cleanup_schedule() -> String {
    "0 0 0 * * *".into()
}

fn default_cleanup_timezone() -> String {
    "Asia/Kolkata".into()
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            schedule: default_cleanup_schedule(),
            timezone: default_cleanup_timezone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationConfig {
    /// How many notifications `GET /api/notifications` returns.
    #[serde(default = "default_list_limit")]
    pub list_limit: usize,
}

fn default_list_limit() -> usize {
    20
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            list_limit: default_list_limit(),
        }
    }
}
