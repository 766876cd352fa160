use serde::Deserialize;
use std::env;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub redis: RedisConfig,
    pub auth: AuthConfig,
    #[serde(default)]
    pub business_rules: BusinessRules,
    pub payments: PaymentsConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BusinessRules {
    #[serde(default = "default_seat_lock_seconds")]
    pub seat_lock_seconds: u64,
    #[serde(default = "default_booking_expiry_seconds")]
    pub booking_expiry_seconds: u64,
    #[serde(default = "default_sweep_interval_seconds")]
    pub sweep_interval_seconds: u64,
    #[serde(default = "default_snapshot_ttl_seconds")]
    pub seat_snapshot_ttl_seconds: u64,
    #[serde(default = "default_viewer_buffer")]
    pub viewer_buffer: usize,
    #[serde(default = "default_rate_limit")]
    pub rate_limit_per_minute: i64,
}

fn default_seat_lock_seconds() -> u64 { 600 }
fn default_booking_expiry_seconds() -> u64 { 900 }
fn default_sweep_interval_seconds() -> u64 { 60 }
fn default_snapshot_ttl_seconds() -> u64 { 30 }
fn default_viewer_buffer() -> usize { 256 }
fn default_rate_limit() -> i64 { 100 }

impl Default for BusinessRules {
    fn default() -> Self {
        Self {
            seat_lock_seconds: default_seat_lock_seconds(),
            booking_expiry_seconds: default_booking_expiry_seconds(),
            sweep_interval_seconds: default_sweep_interval_seconds(),
            seat_snapshot_ttl_seconds: default_snapshot_ttl_seconds(),
            viewer_buffer: default_viewer_buffer(),
            rate_limit_per_minute: default_rate_limit(),
        }
    }
}

impl BusinessRules {
    pub fn seat_lock_duration(&self) -> Duration {
        Duration::from_secs(self.seat_lock_seconds)
    }

    pub fn booking_expiry(&self) -> Duration {
        Duration::from_secs(self.booking_expiry_seconds)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_seconds)
    }

    pub fn seat_snapshot_ttl(&self) -> Duration {
        Duration::from_secs(self.seat_snapshot_ttl_seconds)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct AuthConfig {
    pub jwt_secret: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 { 5 }

#[derive(Debug, Deserialize, Clone)]
pub struct RedisConfig {
    pub url: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PaymentsConfig {
    #[serde(default = "default_currency")]
    pub currency: String,
    pub return_url_base: String,
    pub webhook_url_base: String,
    pub momo: Option<MomoConfig>,
    pub zalopay: Option<ZaloPayConfig>,
    pub payos: Option<PayOsConfig>,
}

fn default_currency() -> String { "VND".to_string() }

#[derive(Debug, Deserialize, Clone)]
pub struct MomoConfig {
    pub partner_code: String,
    pub access_key: String,
    pub secret_key: String,
    /// Sandbox accounts settle every status poll and refund locally.
    #[serde(default)]
    pub sandbox: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ZaloPayConfig {
    pub app_id: String,
    pub key1: String,
    pub key2: String,
    /// Sandbox accounts settle every status poll and refund locally.
    #[serde(default)]
    pub sandbox: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PayOsConfig {
    pub client_id: String,
    pub api_key: String,
    pub checksum_key: String,
    /// Sandbox accounts settle every status poll and refund locally.
    #[serde(default)]
    pub sandbox: bool,
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = config::Config::builder()
            .add_source(config::File::with_name("config/default"))
            // Optional per-environment overrides
            .add_source(config::File::with_name(&format!("config/{}", run_mode)).required(false))
            // Local overrides, never checked in
            .add_source(config::File::with_name("config/local").required(false))
            // Eg.. `SEATLINE_BUSINESS_RULES__SEAT_LOCK_SECONDS=300`
            .add_source(config::Environment::with_prefix("SEATLINE").separator("__"))
            .build()?;

        s.try_deserialize()
    }
}
