//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured log events via tracing)
//!     → metrics.rs (counters, gauges)
//!
//! Consumers:
//!     → Log output (stderr, filtered by RUST_LOG or config)
//!     → Metrics endpoint (Prometheus scrape, installed by the binary)
//! ```
//!
//! # Design Decisions
//! - Events carry named fields (provider, attempt, key, region, session_id)
//! - Metrics are cheap (atomic increments); without an installed recorder
//!   they are no-ops, so library code and tests never need setup

pub mod logging;
pub mod metrics;
