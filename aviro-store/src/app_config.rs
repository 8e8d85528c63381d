use serde::Deserialize;
use std::env;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub payments: PaymentsConfig,
    pub pricing: PricingConfig,
    pub booking: BookingConfig,
    pub reconcile: ReconcileConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 {
    5
}

#[derive(Debug, Deserialize, Clone)]
pub struct PaymentsConfig {
    /// Unset means webhook signatures are not verified (development only).
    pub webhook_secret: Option<String>,
    pub success_url: String,
    pub cancel_url: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PricingConfig {
    #[serde(default = "default_tax_rate_bp")]
    pub tax_rate_bp: i64,
    #[serde(default = "default_true")]
    pub apply_unvalidated_coupons: bool,
}

fn default_tax_rate_bp() -> i64 {
    500
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize, Clone)]
pub struct BookingConfig {
    #[serde(default = "default_hold_minutes")]
    pub hold_minutes: i64,
    #[serde(default = "default_cancellation_fee_bp")]
    pub cancellation_fee_bp: i64,
}

fn default_hold_minutes() -> i64 {
    30
}

fn default_cancellation_fee_bp() -> i64 {
    1_000
}

#[derive(Debug, Deserialize, Clone)]
pub struct ReconcileConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    #[serde(default = "default_limit")]
    pub limit: i64,
}

fn default_interval_secs() -> u64 {
    300
}

fn default_limit() -> i64 {
    50
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = config::Config::builder()
            .add_source(config::File::with_name("config/default"))
            .add_source(config::File::with_name(&format!("config/{}", run_mode)).required(false))
            // Local overrides, not checked in
            .add_source(config::File::with_name("config/local").required(false))
            .add_source(config::Environment::with_prefix("AVIRO").separator("__"))
            .build()?;

        s.try_deserialize()
    }
}
