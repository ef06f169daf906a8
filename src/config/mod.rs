use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, ValueEnum};

/// Default decision service endpoint.
pub const DEFAULT_BASE_URL: &str = "https://decide.arcjet.com";

/// Endpoint used when running on Fly.io.
pub const FLY_BASE_URL: &str = "https://fly.decide.arcjet.com";

/// Base URL overrides accepted from the environment in production.
pub const ALLOWED_BASE_URLS: &[&str] = &[
    "https://decide.arcjet.com",
    "https://decide.arcjettest.com",
    "https://fly.decide.arcjet.com",
    "https://fly.decide.arcjettest.com",
    "https://decide.arcjet.orb.local",
];

const PRODUCTION_DECIDE_TIMEOUT_MS: u64 = 500;
const DEVELOPMENT_DECIDE_TIMEOUT_MS: u64 = 1000;

/// Deployment environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum Environment {
    #[default]
    Production,
    Development,
}

impl Environment {
    #[inline]
    pub fn is_production(&self) -> bool {
        *self == Environment::Production
    }
}

/// Service configuration.
#[derive(Debug, Clone, Parser)]
#[command(name = "arcjet-protect")]
#[command(about = "Request protection decision service")]
pub struct Config {
    /// HTTP server listen address
    #[arg(long, default_value = "0.0.0.0:8080", env = "ARCJET_LISTEN_ADDR")]
    pub listen_addr: String,

    /// Site key used as the bearer token for the decision service
    #[arg(long, default_value = "", env = "ARCJET_KEY", hide_env_values = true)]
    pub key: String,

    /// Decision service base URL (takes precedence over the environment)
    #[arg(long)]
    pub base_url: Option<String>,

    /// Base URL override from the environment (allow-listed in production)
    #[arg(long, env = "ARCJET_BASE_URL")]
    pub base_url_override: Option<String>,

    /// Deployment environment
    #[arg(long, value_enum, default_value = "production", env = "ARCJET_ENV")]
    pub environment: Environment,

    /// Set when running on Fly.io
    #[arg(long, env = "FLY_APP_NAME")]
    pub fly_app_name: Option<String>,

    /// Decide timeout in milliseconds (defaults depend on the environment)
    #[arg(long, env = "ARCJET_DECIDE_TIMEOUT_MS")]
    pub decide_timeout_ms: Option<u64>,

    /// Report timeout in milliseconds
    #[arg(long, default_value = "2000", env = "ARCJET_REPORT_TIMEOUT_MS")]
    pub report_timeout_ms: u64,

    /// Path to the rules YAML file
    #[arg(long, default_value = "rules.yaml", env = "ARCJET_RULES_PATH")]
    pub rules_path: PathBuf,

    /// Fingerprint characteristics (comma separated)
    #[arg(long, value_delimiter = ',', env = "ARCJET_CHARACTERISTICS")]
    pub characteristics: Vec<String>,

    /// Interval for sweeping expired cache entries, in seconds
    #[arg(long, default_value = "60", env = "ARCJET_CACHE_SWEEP_SECS")]
    pub cache_sweep_secs: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "RUST_LOG")]
    pub log_level: String,

    /// Emit logs as JSON lines
    #[arg(long, env = "ARCJET_LOG_JSON")]
    pub log_json: bool,

    /// Enable graceful shutdown
    #[arg(long, default_value = "true", env = "ARCJET_GRACEFUL_SHUTDOWN")]
    pub graceful_shutdown: bool,
}

impl Config {
    /// Decide timeout, biased short in production so requests fail open fast.
    pub fn decide_timeout(&self) -> Duration {
        let default = if self.environment.is_production() {
            PRODUCTION_DECIDE_TIMEOUT_MS
        } else {
            DEVELOPMENT_DECIDE_TIMEOUT_MS
        };
        Duration::from_millis(self.decide_timeout_ms.unwrap_or(default))
    }

    pub fn report_timeout(&self) -> Duration {
        Duration::from_millis(self.report_timeout_ms)
    }

    pub fn cache_sweep_interval(&self) -> Duration {
        Duration::from_secs(self.cache_sweep_secs.max(1))
    }

    pub fn base_url(&self) -> String {
        resolve_base_url(
            self.base_url.as_deref(),
            self.base_url_override.as_deref(),
            self.environment,
            self.fly_app_name.is_some(),
        )
    }

    /// Resolve everything the remote client needs, once, at startup.
    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            base_url: self.base_url(),
            decide_timeout: self.decide_timeout(),
            report_timeout: self.report_timeout(),
            ..ClientConfig::default()
        }
    }

    pub fn protector_config(&self) -> ProtectorConfig {
        ProtectorConfig {
            key: self.key.clone(),
            characteristics: self.characteristics.clone(),
            decide_timeout: self.decide_timeout(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            listen_addr: "0.0.0.0:8080".to_string(),
            key: String::new(),
            base_url: None,
            base_url_override: None,
            environment: Environment::Production,
            fly_app_name: None,
            decide_timeout_ms: None,
            report_timeout_ms: 2000,
            rules_path: PathBuf::from("rules.yaml"),
            characteristics: Vec::new(),
            cache_sweep_secs: 60,
            log_level: "info".to_string(),
            log_json: false,
            graceful_shutdown: true,
        }
    }
}

/// Pick the decision service URL.
///
/// Precedence: explicit configuration, then the environment override (in
/// production only when allow-listed), then the platform default.
pub fn resolve_base_url(
    explicit: Option<&str>,
    env_override: Option<&str>,
    environment: Environment,
    on_fly: bool,
) -> String {
    if let Some(url) = explicit.filter(|u| !u.is_empty()) {
        return url.to_string();
    }

    if let Some(url) = env_override.filter(|u| !u.is_empty()) {
        if !environment.is_production() || ALLOWED_BASE_URLS.contains(&url) {
            return url.to_string();
        }
    }

    if on_fly {
        FLY_BASE_URL.to_string()
    } else {
        DEFAULT_BASE_URL.to_string()
    }
}

/// Remote client settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub base_url: String,
    pub decide_timeout: Duration,
    pub report_timeout: Duration,
    pub sdk_stack: String,
    pub sdk_version: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            base_url: DEFAULT_BASE_URL.to_string(),
            decide_timeout: Duration::from_millis(PRODUCTION_DECIDE_TIMEOUT_MS),
            report_timeout: Duration::from_millis(2000),
            sdk_stack: "RUST".to_string(),
            sdk_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Pipeline settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtectorConfig {
    pub key: String,
    /// Fingerprint characteristics; empty means the client IP only
    pub characteristics: Vec<String>,
    pub decide_timeout: Duration,
}

impl Default for ProtectorConfig {
    fn default() -> Self {
        ProtectorConfig {
            key: String::new(),
            characteristics: Vec::new(),
            decide_timeout: Duration::from_millis(PRODUCTION_DECIDE_TIMEOUT_MS),
        }
    }
}
