//! Application configuration loaded from environment variables.
//!
//! All timing knobs that drive the sync policy (retry cutoff, stuck-run
//! threshold, revalidation interval) live here so deployments can tune
//! them without code changes.

use std::env;

use chrono::Duration;

/// Application configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    /// Base URL of the Garmin bridge service
    pub bridge_base_url: String,
    /// How long a failed activity must wait before it becomes a retry
    /// candidate (default: 1 hour)
    pub retry_cutoff: Duration,
    /// Age past which a non-terminal run is considered stuck and gets
    /// reclaimed by the reconciliation sweep (default: 2 hours)
    pub stuck_run_threshold: Duration,
    /// Hard bound on a single run's wall-clock duration (default: 1 hour)
    pub run_timeout: Duration,
    /// How long a confirmed-valid credential stays trusted before a
    /// revalidation probe is due (default: 24 hours)
    pub credential_revalidation_interval: Duration,
    /// Discovery window for manual/scheduled runs (default: 30 days)
    pub sync_lookback: Duration,
    /// Interval between sweep iterations in the daemon loop
    pub sweep_interval: Duration,
    /// Page size when listing activities from the bridge
    pub provider_page_size: u32,
}

impl Default for Config {
    /// Default config for testing only.
    fn default() -> Self {
        Self {
            bridge_base_url: "http://localhost:5000".to_string(),
            retry_cutoff: Duration::hours(1),
            stuck_run_threshold: Duration::hours(2),
            run_timeout: Duration::hours(1),
            credential_revalidation_interval: Duration::hours(24),
            sync_lookback: Duration::days(30),
            sweep_interval: Duration::minutes(5),
            provider_page_size: 100,
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok(); // Load .env file if present

        Ok(Self {
            bridge_base_url: env::var("GARMIN_BRIDGE_URL")
                .map_err(|_| ConfigError::Missing("GARMIN_BRIDGE_URL"))?,
            retry_cutoff: duration_from_env("RETRY_CUTOFF_SECS", 3600)?,
            stuck_run_threshold: duration_from_env("STUCK_RUN_THRESHOLD_SECS", 7200)?,
            run_timeout: duration_from_env("RUN_TIMEOUT_SECS", 3600)?,
            credential_revalidation_interval: duration_from_env(
                "CREDENTIAL_REVALIDATION_SECS",
                86_400,
            )?,
            sync_lookback: duration_from_env("SYNC_LOOKBACK_SECS", 30 * 24 * 3600)?,
            sweep_interval: duration_from_env("SWEEP_INTERVAL_SECS", 300)?,
            provider_page_size: env::var("PROVIDER_PAGE_SIZE")
                .unwrap_or_else(|_| "100".to_string())
                .parse()
                .map_err(|_| ConfigError::Invalid("PROVIDER_PAGE_SIZE"))?,
        })
    }
}

/// Read a seconds-valued env var, falling back to a default.
fn duration_from_env(name: &'static str, default_secs: i64) -> Result<Duration, ConfigError> {
    match env::var(name) {
        Ok(raw) => {
            let secs: i64 = raw.trim().parse().map_err(|_| ConfigError::Invalid(name))?;
            if secs < 0 {
                return Err(ConfigError::Invalid(name));
            }
            Ok(Duration::seconds(secs))
        }
        Err(_) => Ok(Duration::seconds(default_secs)),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid value for environment variable: {0}")]
    Invalid(&'static str),
}
