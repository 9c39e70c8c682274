//! Service configuration: TOML file, then environment overrides.
//!
//! Lookup order for the file: `--config PATH`, else `teacart.toml` in the
//! platform config directory when it exists, else built-in defaults.

pub mod schema;

pub use schema::{
    AuthConfig, CleanupConfig, Config, Environment, GatewayConfig, NotificationConfig,
    StoreBackend, StoreConfig,
};

use crate::booking::cleanup::CleanupSchedule;
use anyhow::{bail, Context, Result};
use directories::ProjectDirs;
use std::path::{Path, PathBuf};

/// Config file name inside the project config directory.
const CONFIG_FILE: &str = "teacart.toml";

impl Config {
    /// Load from `path` (or the default location), apply process environment
    /// overrides, and validate.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => match default_config_path() {
                Some(path) if path.exists() => Self::from_file(&path)?,
                _ => Self::default(),
            },
        };
        config.apply_env_overrides_from(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }

    /// Apply overrides from environment-style variables.
    /// Unparseable values are ignored with a warning.
    pub fn apply_env_overrides_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(host) = lookup("HOST").filter(|h| !h.trim().is_empty()) {
            self.gateway.host = host.trim().to_string();
        }
        if let Some(port) = lookup("PORT") {
            match port.trim().parse() {
                Ok(port) => self.gateway.port = port,
                Err(_) => tracing::warn!("Ignoring invalid PORT value: {port}"),
            }
        }

        let env = lookup("TEACART_ENV").or_else(|| lookup("NODE_ENV"));
        if let Some(env) = env {
            match Environment::parse(&env) {
                Some(parsed) => self.environment = parsed,
                None => tracing::warn!("Ignoring unknown environment: {env}"),
            }
        }

        if let Some(backend) = lookup("STORE_BACKEND") {
            match StoreBackend::parse(&backend) {
                Some(parsed) => self.store.backend = parsed,
                None => tracing::warn!("Ignoring unknown STORE_BACKEND: {backend}"),
            }
        }
        if let Some(name) = lookup("DB_NAME").filter(|n| !n.trim().is_empty()) {
            self.store.path = PathBuf::from(name.trim());
        }

        if let Some(password) = lookup("DEFAULT_ADMIN_PASSWORD").filter(|p| !p.is_empty()) {
            self.auth.default_admin_password = password;
        }

        if let Some(origins) = lookup("ALLOWED_ORIGINS") {
            self.gateway.allowed_origins = origins
                .split(',')
                .map(str::trim)
                .filter(|o| !o.is_empty())
                .map(String::from)
                .collect();
        }

        if let Some(limit) = lookup("MAX_LOGIN_ATTEMPTS_PER_MINUTE") {
            match limit.trim().parse() {
                Ok(limit) => self.gateway.login_rate_limit_per_minute = limit,
                Err(_) => tracing::warn!("Ignoring invalid MAX_LOGIN_ATTEMPTS_PER_MINUTE: {limit}"),
            }
        }
        if let Some(limit) = lookup("MAX_API_REQUESTS_PER_MINUTE") {
            match limit.trim().parse() {
                Ok(limit) => self.gateway.api_rate_limit_per_minute = limit,
                Err(_) => tracing::warn!("Ignoring invalid MAX_API_REQUESTS_PER_MINUTE: {limit}"),
            }
        }

        // Serverless hosts have no long-lived process to run the sweep in.
        if lookup("VERCEL").as_deref() == Some("1") {
            self.cleanup.enabled = false;
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.gateway.port == 0 {
            bail!("gateway.port must be non-zero");
        }
        if self.gateway.host.trim().is_empty() {
            bail!("gateway.host must not be empty");
        }
        if self.auth.default_admin_password.is_empty() {
            bail!("auth.default_admin_password must not be empty");
        }
        CleanupSchedule::new(&self.cleanup.schedule, &self.cleanup.timezone)
            .context("Invalid [cleanup] section")?;
        Ok(())
    }

    /// The parsed cleanup schedule. Only fails on a config that skipped
    /// [`Config::validate`].
    pub fn cleanup_schedule(&self) -> Result<CleanupSchedule> {
        CleanupSchedule::new(&self.cleanup.schedule, &self.cleanup.timezone)
    }
}

/// `<platform config dir>/teacart.toml`, when a home directory is known.
pub fn default_config_path() -> Option<PathBuf> {
    ProjectDirs::from("", "", "teacart").map(|dirs| dirs.config_dir().join(CONFIG_FILE))
}
