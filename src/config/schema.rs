//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the data layer.
//! All types derive Serde traits for deserialization from config files.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::provider::DataDomain;
use crate::region::Region;

/// Root configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct NavConfig {
    /// Region detection settings.
    pub region: RegionConfig,

    /// Per-request retry executor settings.
    pub retry: RetryConfig,

    /// Retry budget applied around each provider call.
    pub health: HealthConfig,

    /// Circuit breaker thresholds.
    pub circuit_breaker: CircuitBreakerConfig,

    /// Per-domain cache durations.
    pub cache: CacheConfig,

    /// Offline tile download settings.
    pub prefetch: PrefetchConfig,

    /// Upstream provider definitions.
    pub providers: Vec<ProviderConfig>,

    /// Ordered provider lists per region and domain.
    pub regions: Vec<RegionRoute>,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Region detection configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct RegionConfig {
    /// Skip detection and use this region.
    pub force: Option<Region>,

    /// ISO 3166-1 alpha-2 country used for detection (e.g. "DE").
    pub country: Option<String>,
}

/// Retry executor configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Retries after the first attempt.
    pub max_retries: u32,

    /// Base delay for exponential backoff in milliseconds.
    pub initial_delay_ms: u64,

    /// Maximum delay for backoff and for honoured Retry-After waits.
    pub max_delay_ms: u64,

    /// Growth factor between attempts.
    pub backoff_multiplier: f64,

    /// Per-attempt timeout in milliseconds.
    pub timeout_ms: u64,

    /// Connection setup timeout in milliseconds.
    pub connect_timeout_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            initial_delay_ms: 500,
            max_delay_ms: 5_000,
            backoff_multiplier: 2.0,
            timeout_ms: 10_000,
            connect_timeout_ms: 5_000,
        }
    }
}

/// Retry budget around a provider's work.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HealthConfig {
    pub max_retries: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            max_retries: 1,
            initial_delay_ms: 250,
            max_delay_ms: 2_000,
        }
    }
}

/// Circuit breaker configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures before the circuit opens.
    pub failure_threshold: u32,

    /// Seconds an open circuit waits before admitting a trial.
    pub cooldown_secs: u64,

    /// Per-provider overrides keyed by provider name.
    pub overrides: HashMap<String, CircuitOverride>,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            cooldown_secs: 60,
            overrides: HashMap::new(),
        }
    }
}

/// Partial override of circuit breaker settings.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct CircuitOverride {
    pub failure_threshold: Option<u32>,
    pub cooldown_secs: Option<u64>,
}

/// Cache durations per data domain, in seconds.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CacheConfig {
    pub tiles_secs: u64,
    pub traffic_secs: u64,
    pub radar_secs: u64,
    pub weather_secs: u64,
    /// Default for callers that do not name a domain.
    pub default_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            tiles_secs: 7 * 24 * 3600,
            traffic_secs: 120,
            radar_secs: 3600,
            weather_secs: 600,
            default_secs: 300,
        }
    }
}

impl CacheConfig {
    pub fn secs_for(&self, domain: DataDomain) -> u64 {
        match domain {
            DataDomain::Tiles => self.tiles_secs,
            DataDomain::Traffic => self.traffic_secs,
            DataDomain::Radar => self.radar_secs,
            DataDomain::Weather => self.weather_secs,
        }
    }
}

/// Offline tile download configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PrefetchConfig {
    /// Tiles fetched concurrently per batch.
    pub batch_size: usize,

    /// Advisory cap on estimated download size, in bytes.
    pub max_download_bytes: u64,

    /// Average tile size used for estimates, in bytes.
    pub average_tile_bytes: u64,

    /// Tile URL template with `{z}`, `{x}`, `{y}` placeholders.
    pub tile_url_template: String,

    /// Root directory of the persistent tile store.
    pub cache_dir: String,

    /// URL schemes accepted as message origins.
    pub allowed_origin_schemes: Vec<String>,
}

impl Default for PrefetchConfig {
    fn default() -> Self {
        Self {
            batch_size: 50,
            max_download_bytes: 100 * 1024 * 1024,
            average_tile_bytes: 15 * 1024,
            tile_url_template: "https://tile.openstreetmap.org/{z}/{x}/{y}.png".to_string(),
            cache_dir: "navdata-cache".to_string(),
            allowed_origin_schemes: vec!["https".to_string(), "app".to_string()],
        }
    }
}

/// One upstream provider.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProviderConfig {
    /// Unique provider name (circuit breaker identity).
    pub name: String,

    /// Weather endpoint template (`{lat}`, `{lon}`).
    #[serde(default)]
    pub weather_url: Option<String>,

    /// Speed camera endpoint template (`{south}`, `{west}`, `{north}`, `{east}`).
    #[serde(default)]
    pub cameras_url: Option<String>,

    /// Traffic flow endpoint template (`{south}`, `{west}`, `{north}`, `{east}`).
    #[serde(default)]
    pub traffic_url: Option<String>,

    /// Tile endpoint template (`{z}`, `{x}`, `{y}`).
    #[serde(default)]
    pub tile_url: Option<String>,

    /// Environment variable holding the API key substituted for `{key}`.
    #[serde(default)]
    pub api_key_env: Option<String>,

    /// Per-attempt timeout override in milliseconds.
    #[serde(default)]
    pub timeout_ms: Option<u64>,

    /// Extra request headers.
    #[serde(default)]
    pub headers: HashMap<String, String>,
}

impl ProviderConfig {
    pub fn template_for(&self, domain: DataDomain) -> Option<&str> {
        match domain {
            DataDomain::Tiles => self.tile_url.as_deref(),
            DataDomain::Traffic => self.traffic_url.as_deref(),
            DataDomain::Radar => self.cameras_url.as_deref(),
            DataDomain::Weather => self.weather_url.as_deref(),
        }
    }
}

/// Ordered provider list for one region and domain.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RegionRoute {
    pub region: Region,
    pub domain: DataDomain,
    /// Provider names, most preferred first.
    pub providers: Vec<String>,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}
