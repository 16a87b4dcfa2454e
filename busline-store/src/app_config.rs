use serde::Deserialize;
use std::env;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    #[serde(default)]
    pub redis: RedisConfig,
    #[serde(default)]
    pub kafka: KafkaConfig,
    pub auth: AuthConfig,
    pub booking_rules: BookingRules,
    #[serde(default)]
    pub notifications: NotificationConfig,
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
    /// Run against the in-process store instead of Postgres
    #[serde(default)]
    pub use_memory: bool,
}

fn default_max_connections() -> u32 {
    5
}

/// Rate limiting is skipped when no url is configured
#[derive(Debug, Deserialize, Clone, Default)]
pub struct RedisConfig {
    pub url: Option<String>,
    #[serde(default = "default_rate_limit")]
    pub rate_limit_per_minute: i64,
}

fn default_rate_limit() -> i64 {
    120
}

#[derive(Debug, Deserialize, Clone)]
pub struct KafkaConfig {
    pub brokers: Option<String>,
    #[serde(default = "default_topic")]
    pub topic: String,
}

impl Default for KafkaConfig {
    fn default() -> Self {
        Self { brokers: None, topic: default_topic() }
    }
}

fn default_topic() -> String {
    "booking.events".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub jwt_expiration_seconds: u64,
    /// Shared secret payment providers send in `X-Webhook-Secret`
    pub webhook_secret: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BookingRules {
    pub lock_minutes_default: i64,
    pub lock_minutes_min: i64,
    pub lock_minutes_max: i64,
    pub payment_window_minutes: i64,
    pub reminder_lead_minutes: i64,
    pub booking_cutoff_minutes: i64,
    pub sweep_interval_seconds: u64,
    pub convenience_fee_bps: u32,
    pub bank_charge_bps: u32,
    #[serde(default)]
    pub minimum_total: i64,
    pub currency: String,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum NotificationProvider {
    #[default]
    Console,
    Smtp,
}

#[derive(Debug, Deserialize, Clone)]
pub struct NotificationConfig {
    #[serde(default)]
    pub provider: NotificationProvider,
    pub smtp_host: Option<String>,
    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,
    pub smtp_username: Option<String>,
    pub smtp_password: Option<String>,
    #[serde(default = "default_from")]
    pub from_address: String,
    #[serde(default = "default_dispatch_timeout")]
    pub timeout_seconds: u64,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            provider: NotificationProvider::Console,
            smtp_host: None,
            smtp_port: default_smtp_port(),
            smtp_username: None,
            smtp_password: None,
            from_address: default_from(),
            timeout_seconds: default_dispatch_timeout(),
        }
    }
}

fn default_smtp_port() -> u16 {
    587
}

fn default_from() -> String {
    "Busline <no-reply@busline.local>".to_string()
}

fn default_dispatch_timeout() -> u64 {
    45
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = config::Config::builder()
            .add_source(config::File::with_name("config/default"))
            // Per-environment overrides, optional
            .add_source(config::File::with_name(&format!("config/{}", run_mode)).required(false))
            // Not checked in
            .add_source(config::File::with_name("config/local").required(false))
            // Eg. `BUSLINE__DATABASE__URL=postgres://...`
            .add_source(config::Environment::with_prefix("BUSLINE").separator("__"))
            .build()?;

        s.try_deserialize()
    }
}
