use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;
use std::path::Path;
use thiserror::Error;
use tracing::info;
use validator::Validate;

const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_ENV: &str = "development";
const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 8080;
const CONFIG_DIR: &str = "config";
const DEFAULT_GATEWAY_BASE_URL: &str = "https://api.sandbox.gateway.local";
const DEFAULT_CANCEL_WINDOW_HOURS: i64 = 24;
const DEV_DEFAULT_GATEWAY_SERVER_KEY: &str = "SB-server-key-for-local-development-only";

/// Application configuration, loaded from layered config files plus
/// `APP__`-prefixed environment variables.
#[derive(Clone, Debug, Deserialize, Validate)]
pub struct AppConfig {
    /// Database connection URL
    pub database_url: String,

    /// Server host address
    #[serde(default = "default_host")]
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Application environment
    #[serde(default = "default_environment")]
    pub environment: String,

    /// Logging level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Log in JSON format (structured logging)
    #[serde(default)]
    pub log_json: bool,

    /// Whether to run database migrations on startup
    #[serde(default)]
    pub auto_migrate: bool,

    #[serde(default = "default_db_max_connections")]
    pub db_max_connections: u32,

    #[serde(default = "default_db_min_connections")]
    pub db_min_connections: u32,

    /// Comma-separated list of allowed CORS origins; permissive when unset
    /// in development
    #[serde(default)]
    pub cors_allowed_origins: Option<String>,

    /// Base URL of the payment gateway API
    #[serde(default = "default_gateway_base_url")]
    pub gateway_base_url: String,

    /// Server key used for gateway authentication and webhook signature
    /// verification
    #[validate(length(min = 16))]
    #[serde(default = "default_gateway_server_key")]
    pub gateway_server_key: String,

    /// Comma-separated list of payment channels offered on the hosted page
    #[serde(default)]
    pub gateway_enabled_payments: Option<String>,

    /// Hours after creation during which a transaction may be canceled
    #[serde(default = "default_cancel_window_hours")]
    pub cancel_window_hours: i64,
}

fn default_host() -> String {
    DEFAULT_HOST.to_string()
}
fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_environment() -> String {
    DEFAULT_ENV.to_string()
}
fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}
fn default_db_max_connections() -> u32 {
    10
}
fn default_db_min_connections() -> u32 {
    1
}
fn default_gateway_base_url() -> String {
    DEFAULT_GATEWAY_BASE_URL.to_string()
}
fn default_gateway_server_key() -> String {
    DEV_DEFAULT_GATEWAY_SERVER_KEY.to_string()
}
fn default_cancel_window_hours() -> i64 {
    DEFAULT_CANCEL_WINDOW_HOURS
}

impl AppConfig {
    /// Constructs a minimal configuration, used by the test harness.
    pub fn new(database_url: String, host: String, port: u16, environment: String) -> Self {
        Self {
            database_url,
            host,
            port,
            environment,
            log_level: default_log_level(),
            log_json: false,
            auto_migrate: false,
            db_max_connections: default_db_max_connections(),
            db_min_connections: default_db_min_connections(),
            cors_allowed_origins: None,
            gateway_base_url: default_gateway_base_url(),
            gateway_server_key: default_gateway_server_key(),
            gateway_enabled_payments: None,
            cancel_window_hours: default_cancel_window_hours(),
        }
    }

    pub fn is_development(&self) -> bool {
        self.environment == "development" || self.environment == "test"
    }

    /// Comma-separated `gateway_enabled_payments` split into channel names;
    /// empty means the gateway decides.
    pub fn enabled_payments(&self) -> Vec<String> {
        self.gateway_enabled_payments
            .as_deref()
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_owned)
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[derive(Debug, Error)]
pub enum AppConfigError {
    #[error("configuration error: {0}")]
    Load(#[from] ConfigError),
    #[error("configuration validation failed: {0}")]
    Validation(#[from] validator::ValidationErrors),
    #[error("{0}")]
    Invalid(String),
}

/// Loads configuration from `config/default.toml`, an environment-specific
/// overlay, an optional `config/local.toml`, and `APP__*` environment
/// variables, in that order of precedence.
pub fn load_config() -> Result<AppConfig, AppConfigError> {
    let run_env = env::var("APP_ENV").unwrap_or_else(|_| DEFAULT_ENV.to_string());

    let mut builder = Config::builder()
        .set_default("environment", run_env.clone())?
        .add_source(File::from(Path::new(CONFIG_DIR).join("default")).required(false))
        .add_source(File::from(Path::new(CONFIG_DIR).join(&run_env)).required(false))
        .add_source(File::from(Path::new(CONFIG_DIR).join("local")).required(false))
        .add_source(Environment::with_prefix("APP").separator("__"));

    // Plain DATABASE_URL wins over file-based values for container deploys.
    if let Ok(url) = env::var("DATABASE_URL") {
        builder = builder.set_override("database_url", url)?;
    }

    let cfg: AppConfig = builder.build()?.try_deserialize()?;
    cfg.validate()?;

    if !cfg.is_development() && cfg.gateway_server_key == DEV_DEFAULT_GATEWAY_SERVER_KEY {
        return Err(AppConfigError::Invalid(
            "gateway_server_key must be set outside development".to_string(),
        ));
    }

    info!(environment = %cfg.environment, "Configuration loaded");
    Ok(cfg)
}

/// Initializes the global tracing subscriber.
pub fn init_tracing(level: &str, json: bool) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let default_directive = format!("kasira_api={},tower_http=info", level);
    let filter = env::var("RUST_LOG")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or(default_directive);

    let registry = tracing_subscriber::registry().with(EnvFilter::new(filter));
    if json {
        let _ = registry.with(fmt::layer().json()).try_init();
    } else {
        let _ = registry.with(fmt::layer()).try_init();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_harness_config_uses_defaults() {
        let cfg = AppConfig::new(
            "sqlite::memory:".to_string(),
            "127.0.0.1".to_string(),
            18_080,
            "test".to_string(),
        );
        assert_eq!(cfg.cancel_window_hours, 24);
        assert!(cfg.is_development());
        assert!(cfg.cors_allowed_origins.is_none());
    }
}
