//! Application configuration
//!
//! Centralized configuration loaded with the `config` crate from defaults,
//! optional files under `config/`, and `RENTO__*` environment variables.

use config::{Config, ConfigError, Environment, File};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::env;

/// Main application configuration
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    #[serde(default)]
    pub booking: BookingConfig,
    #[serde(default)]
    pub gateways: GatewayConfig,
}

/// HTTP server configuration
#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Number of worker threads
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Comma separated list of allowed CORS origins
    #[serde(default = "default_cors_origins")]
    pub cors_origins: String,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_workers() -> usize {
    num_cpus::get()
}

fn default_timeout() -> u64 {
    30
}

fn default_cors_origins() -> String {
    "http://localhost:3000".to_string()
}

/// Database configuration
#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL, or `memory://` for the in-process store
    #[serde(default = "default_database_url")]
    pub url: String,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    #[serde(default = "default_min_connections")]
    pub min_connections: u32,

    /// Connection acquire timeout in seconds
    #[serde(default = "default_acquire_timeout")]
    pub acquire_timeout_secs: u64,

    /// Run embedded migrations on startup
    #[serde(default)]
    pub run_migrations: bool,
}

fn default_database_url() -> String {
    "memory://".to_string()
}

fn default_max_connections() -> u32 {
    10
}

fn default_min_connections() -> u32 {
    2
}

fn default_acquire_timeout() -> u64 {
    30
}

impl DatabaseConfig {
    /// True when the in-process store should be used instead of PostgreSQL
    pub fn is_memory(&self) -> bool {
        self.url.starts_with("memory://")
    }
}

/// Authentication configuration
#[derive(Debug, Deserialize, Clone)]
pub struct AuthConfig {
    /// JWT signing secret
    pub jwt_secret: String,

    /// JWT token expiration in minutes
    #[serde(default = "default_jwt_expiration")]
    pub jwt_expiration_minutes: i64,
}

fn default_jwt_expiration() -> i64 {
    1440
}

/// Booking rules: operating window, buffers and fee fallbacks
#[derive(Debug, Deserialize, Clone)]
pub struct BookingConfig {
    /// IANA name of the operating time zone
    #[serde(default = "default_timezone")]
    pub timezone: String,

    /// First hour an hourly slot may start (local)
    #[serde(default = "default_open_hour")]
    pub open_hour: u32,

    /// Hour by which an hourly slot must be complete (local)
    #[serde(default = "default_close_hour")]
    pub close_hour: u32,

    /// After this local hour a daily-capable apartment no longer offers today
    #[serde(default = "default_daily_cutoff_hour")]
    pub daily_cutoff_hour: u32,

    #[serde(default = "default_cleaning_minutes")]
    pub cleaning_minutes: i64,

    /// Cancellations closer to start than this are non-refundable
    #[serde(default = "default_refund_cutoff_hours")]
    pub refund_cutoff_hours: i64,

    /// Start offsets tried per duration when enumerating availability
    #[serde(default = "default_max_probes")]
    pub max_probes: u32,

    /// A lock without telemetry for this long is reported offline
    #[serde(default = "default_lock_freshness")]
    pub lock_freshness_secs: i64,

    /// Interval of the activation / completion sweep
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,

    /// Used when the platform setting is missing or unreadable
    #[serde(default = "default_fee_percent")]
    pub default_service_fee_percent: u32,

    /// Flat fee applied to daily bookings
    #[serde(default = "default_daily_fee")]
    pub daily_service_fee: Decimal,
}

fn default_timezone() -> String {
    "Asia/Almaty".to_string()
}

fn default_open_hour() -> u32 {
    10
}

fn default_close_hour() -> u32 {
    22
}

fn default_daily_cutoff_hour() -> u32 {
    23
}

fn default_cleaning_minutes() -> i64 {
    60
}

fn default_refund_cutoff_hours() -> i64 {
    6
}

fn default_max_probes() -> u32 {
    6
}

fn default_lock_freshness() -> i64 {
    300
}

fn default_sweep_interval() -> u64 {
    60
}

fn default_fee_percent() -> u32 {
    10
}

fn default_daily_fee() -> Decimal {
    Decimal::from(3000)
}

impl Default for BookingConfig {
    fn default() -> Self {
        Self {
            timezone: default_timezone(),
            open_hour: default_open_hour(),
            close_hour: default_close_hour(),
            daily_cutoff_hour: default_daily_cutoff_hour(),
            cleaning_minutes: default_cleaning_minutes(),
            refund_cutoff_hours: default_refund_cutoff_hours(),
            max_probes: default_max_probes(),
            lock_freshness_secs: default_lock_freshness(),
            sweep_interval_secs: default_sweep_interval(),
            default_service_fee_percent: default_fee_percent(),
            daily_service_fee: default_daily_fee(),
        }
    }
}

/// Outbound collaborators
#[derive(Debug, Deserialize, Clone, Default)]
pub struct GatewayConfig {
    /// Payment status endpoint base URL; unset disables the HTTP gateway
    pub payment_url: Option<String>,

    pub lock_vendor_url: Option<String>,

    pub notification_url: Option<String>,

    /// Per-request timeout in milliseconds
    #[serde(default = "default_gateway_timeout")]
    pub timeout_ms: u64,

    /// Attempts for lock vendor calls before giving up
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,

    /// HMAC key for inbound lock vendor webhooks; unset refuses them all
    pub webhook_secret: Option<String>,
}

fn default_gateway_timeout() -> u64 {
    5000
}

fn default_retry_attempts() -> u32 {
    3
}

impl AppConfig {
    /// Load configuration from environment and optional config file
    pub fn load() -> Result<Self, ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".to_string());

        let config = Config::builder()
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 8080)?
            .set_default("server.workers", num_cpus::get() as i64)?
            .set_default("server.timeout_secs", 30)?
            .set_default("database.url", "memory://")?
            .set_default("database.max_connections", 10)?
            .set_default("database.min_connections", 2)?
            .set_default("auth.jwt_expiration_minutes", 1440)?
            .set_default("booking.timezone", "Asia/Almaty")?
            .set_default("booking.open_hour", 10)?
            .set_default("booking.close_hour", 22)?
            .set_default("gateways.timeout_ms", 5000)?
            .set_default("gateways.retry_attempts", 3)?
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            .add_source(
                Environment::with_prefix("RENTO")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Load configuration from a specific file
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(File::with_name(path))
            .add_source(Environment::with_prefix("RENTO").separator("__"))
            .build()?;

        config.try_deserialize()
    }

    /// Get the server bind address
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}
