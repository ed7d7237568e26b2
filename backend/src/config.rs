//! Configuration management for the Craftworks platform
//!
//! Supports hierarchical configuration loading:
//! 1. Default values in code
//! 2. Configuration files (config/development.toml, config/production.toml)
//! 3. Environment variable overrides with CRAFTWORKS__ prefix

use config::{ConfigError, Environment, File};
use serde::Deserialize;

/// Main application configuration
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// Current environment (development, production)
    pub environment: String,

    /// Server configuration
    pub server: ServerConfig,

    /// Database configuration
    pub database: DatabaseConfig,

    /// JWT authentication configuration
    pub jwt: JwtConfig,

    /// Background job schedule
    pub scheduler: SchedulerConfig,

    /// Payment provider webhook credentials
    pub payments: PaymentsConfig,

    /// Report output
    pub reports: ReportsConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    /// Server port
    pub port: u16,

    /// Server host
    pub host: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL
    pub url: String,

    /// Maximum number of connections in the pool
    pub max_connections: u32,

    /// Minimum number of connections in the pool
    pub min_connections: u32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct JwtConfig {
    /// Secret key for signing JWT tokens
    pub secret: String,

    /// Access token expiration in seconds
    pub access_token_expiry: i64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SchedulerConfig {
    /// Run background jobs at all
    pub enabled: bool,

    /// Seconds between production auto-advance passes
    pub auto_advance_interval_secs: u64,

    /// Seconds between timeline sweeps
    pub stage_update_interval_secs: u64,

    /// UTC hour of the daily forced timeline sweep
    pub forced_update_hour: u32,

    /// Save scheduled production and inventory reports to disk
    pub save_reports: bool,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct PaymentsConfig {
    /// Expected `X-Callback-Token` on Xendit callbacks
    pub xendit_webhook_token: Option<String>,

    /// Expected `X-Callback-Token` on Maya callbacks; a missing header is let through
    pub maya_webhook_token: Option<String>,

    /// Stripe endpoint signing secret (`whsec_...`)
    pub stripe_webhook_secret: Option<String>,

    /// Allowed clock skew for Stripe signatures in seconds
    pub stripe_tolerance_secs: i64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ReportsConfig {
    /// Directory saved reports are written under
    pub output_dir: String,

    /// Default usage window in days for inventory forecasts
    pub inventory_window_days: u32,
}

impl Config {
    /// Load configuration from files and environment variables
    pub fn load() -> Result<Self, ConfigError> {
        let environment =
            std::env::var("CRAFTWORKS_ENVIRONMENT").unwrap_or_else(|_| "development".into());
        let is_dev = matches!(environment.as_str(), "development" | "local" | "testing");

        let config = config::Config::builder()
            // Start with default values
            .set_default("environment", environment.clone())?
            .set_default("server.port", 3000)?
            .set_default("server.host", "0.0.0.0")?
            .set_default("database.max_connections", 10)?
            .set_default("database.min_connections", 2)?
            .set_default("jwt.access_token_expiry", 86400)?
            .set_default("scheduler.enabled", true)?
            .set_default("scheduler.auto_advance_interval_secs", if is_dev { 60 } else { 600 })?
            .set_default("scheduler.stage_update_interval_secs", 3600)?
            .set_default("scheduler.forced_update_hour", 23)?
            .set_default("scheduler.save_reports", !is_dev)?
            .set_default("payments.stripe_tolerance_secs", 300)?
            .set_default("reports.output_dir", "storage/reports")?
            .set_default("reports.inventory_window_days", 30)?
            // Load environment-specific config file
            .add_source(File::with_name(&format!("config/{}", environment)).required(false))
            // Override with environment variables (CRAFTWORKS__ prefix)
            .add_source(
                Environment::with_prefix("CRAFTWORKS")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    pub fn is_development(&self) -> bool {
        matches!(self.environment.as_str(), "development" | "local" | "testing")
    }
}
