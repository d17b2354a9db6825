//! Resilient regional data acquisition for navigation clients.
//!
//! Weather, speed cameras, traffic flow and map tiles are fetched from
//! interchangeable providers chosen per region. Each request passes through
//! a TTL cache, a failover walk over the region's providers, a circuit
//! breaker per provider, and finally a retrying HTTP executor. Tiles for a
//! whole area can be downloaded in the background through the prefetch
//! channel.

pub mod cache;
pub mod config;
pub mod error;
pub mod geo;
pub mod health;
pub mod lifecycle;
pub mod observability;
pub mod prefetch;
pub mod provider;
pub mod region;
pub mod registry;
pub mod resilience;
pub mod service;
pub mod transport;

pub use config::NavConfig;
pub use error::{FetchError, FetchResult};
pub use lifecycle::Shutdown;
pub use service::NavDataService;
