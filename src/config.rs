use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::Path;

use crate::models::ScoringWeights;

/// Application configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub state_store: StateStoreSettings,
    #[serde(default)]
    pub live: LiveSettings,
    #[serde(default)]
    pub scoring: ScoringSettings,
    #[serde(default)]
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StateStoreSettings {
    #[serde(default = "default_redis_url")]
    pub redis_url: String,
    pub connection_timeout_secs: Option<u64>,
}

impl Default for StateStoreSettings {
    fn default() -> Self {
        Self {
            redis_url: default_redis_url(),
            connection_timeout_secs: None,
        }
    }
}

fn default_redis_url() -> String {
    "redis://127.0.0.1:6379".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct LiveSettings {
    /// Concurrent engagements an expert can carry before reading as busy
    #[serde(default = "default_max_active_engagements")]
    pub max_active_engagements: u32,
    /// Heartbeats older than this read as offline
    #[serde(default = "default_stale_threshold_mins")]
    pub stale_threshold_mins: i64,
    /// TTL of a live status entry in the state store
    #[serde(default = "default_status_ttl_secs")]
    pub status_ttl_secs: u64,
    /// How long an unconfirmed reservation holds the expert
    #[serde(default = "default_reservation_ttl_secs")]
    pub reservation_ttl_secs: u64,
    /// Cadence of the background recomputation loop
    #[serde(default = "default_refresh_interval_secs")]
    pub refresh_interval_secs: u64,
    /// Planning horizon for next-slot searches
    #[serde(default = "default_horizon_days")]
    pub horizon_days: u32,
    #[serde(default = "default_snapshot_cache_size")]
    pub snapshot_cache_size: u64,
    #[serde(default = "default_snapshot_cache_ttl_secs")]
    pub snapshot_cache_ttl_secs: u64,
}

impl Default for LiveSettings {
    fn default() -> Self {
        Self {
            max_active_engagements: default_max_active_engagements(),
            stale_threshold_mins: default_stale_threshold_mins(),
            status_ttl_secs: default_status_ttl_secs(),
            reservation_ttl_secs: default_reservation_ttl_secs(),
            refresh_interval_secs: default_refresh_interval_secs(),
            horizon_days: default_horizon_days(),
            snapshot_cache_size: default_snapshot_cache_size(),
            snapshot_cache_ttl_secs: default_snapshot_cache_ttl_secs(),
        }
    }
}

fn default_max_active_engagements() -> u32 { 5 }
fn default_stale_threshold_mins() -> i64 { 30 }
fn default_status_ttl_secs() -> u64 { 300 }
fn default_reservation_ttl_secs() -> u64 { 120 }
fn default_refresh_interval_secs() -> u64 { 60 }
fn default_horizon_days() -> u32 { 7 }
fn default_snapshot_cache_size() -> u64 { 10_000 }
fn default_snapshot_cache_ttl_secs() -> u64 { 60 }

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ScoringSettings {
    #[serde(default)]
    pub weights: WeightsConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WeightsConfig {
    #[serde(default = "default_expertise_weight")]
    pub expertise: f64,
    #[serde(default = "default_price_weight")]
    pub price: f64,
    #[serde(default = "default_rating_weight")]
    pub rating: f64,
    #[serde(default = "default_experience_weight")]
    pub experience: f64,
    #[serde(default = "default_availability_weight")]
    pub availability: f64,
}

impl WeightsConfig {
    pub fn as_weights(&self) -> ScoringWeights {
        ScoringWeights {
            expertise: self.expertise,
            price: self.price,
            rating: self.rating,
            experience: self.experience,
            availability: self.availability,
        }
    }
}

impl Default for WeightsConfig {
    fn default() -> Self {
        Self {
            expertise: default_expertise_weight(),
            price: default_price_weight(),
            rating: default_rating_weight(),
            experience: default_experience_weight(),
            availability: default_availability_weight(),
        }
    }
}

fn default_expertise_weight() -> f64 { 0.40 }
fn default_price_weight() -> f64 { 0.20 }
fn default_rating_weight() -> f64 { 0.15 }
fn default_experience_weight() -> f64 { 0.15 }
fn default_availability_weight() -> f64 { 0.10 }

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingSettings {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

fn default_log_level() -> String { "info".to_string() }
fn default_log_format() -> String { "json".to_string() }

/// Initialize the global tracing subscriber from the logging settings
///
/// `RUST_LOG` takes precedence over the configured level when set.
pub fn init_tracing(settings: &LoggingSettings) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(settings.level.clone()));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_level(true);

    if settings.format == "pretty" {
        subscriber.pretty().init();
    } else {
        subscriber.init();
    }
}

impl Settings {
    /// Load configuration from file and environment variables
    ///
    /// Configuration is loaded in the following order (later overrides earlier):
    /// 1. Default values in the struct
    /// 2. Configuration file (config/default.toml)
    /// 3. Environment variables (prefixed with SAVORO_)
    pub fn load() -> Result<Self, ConfigError> {
        let settings = Config::builder()
            // Add default config file
            .add_source(File::with_name("config/default").required(false))
            // Add local config file (for development overrides)
            .add_source(File::with_name("config/local").required(false))
            // Add environment variables (prefixed with SAVORO_)
            // e.g., SAVORO_LIVE__REFRESH_INTERVAL_SECS -> live.refresh_interval_secs
            .add_source(
                Environment::with_prefix("SAVORO")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        settings.try_deserialize()
    }

    /// Load configuration from a custom path
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let settings = Config::builder()
            .add_source(File::from(path.as_ref()))
            .add_source(
                Environment::with_prefix("SAVORO")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        settings.try_deserialize()
    }
}
