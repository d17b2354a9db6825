//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → NavConfig (validated, immutable)
//!     → consumed once when the service context is built
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; cache durations and provider order
//!   never change at runtime
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, parse_config, ConfigError};
pub use schema::{
    CacheConfig, CircuitBreakerConfig, CircuitOverride, HealthConfig, NavConfig, ObservabilityConfig,
    PrefetchConfig, ProviderConfig, RegionConfig, RegionRoute, RetryConfig,
};
