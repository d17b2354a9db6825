//! Health checking subsystem.
//!
//! # Data Flow
//! ```text
//! Provider call (monitor.rs):
//!     → circuit_breaker.rs admits or fails fast
//!     → work runs, transient failures re-run within the retry budget
//!     → passive.rs classifies the final outcome
//!     → verdict recorded in the circuit breaker registry
//! ```
//!
//! # Design Decisions
//! - Passive only: health is learned from real traffic, nothing is polled
//!   besides the half-open trial call
//! - Health state is per-provider, not per-region

pub mod monitor;
pub mod passive;

pub use monitor::{HealthMonitor, HealthRetryOptions};
