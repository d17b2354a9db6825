//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Network call:
//!     → timeouts.rs (per-attempt deadline, composed with caller cancellation)
//!     → retries.rs (resilient_fetch: classify, back off, retry)
//!         → rate_limit.rs (server-mandated wait on 429)
//!         → backoff.rs (exponential delay + jitter)
//!
//! Provider call (health monitor, one level up):
//!     → circuit_breaker.rs (fail fast while open, single half-open trial)
//! ```
//!
//! # Design Decisions
//! - Timeouts are non-negotiable; every external call has a deadline
//! - Client errors are definitive; only transient failures are retried
//! - Circuit breaker prevents hammering a provider that is down

pub mod backoff;
pub mod circuit_breaker;
pub mod rate_limit;
pub mod retries;
pub mod timeouts;

pub use circuit_breaker::{BreakerSettings, CircuitBreakerRegistry, CircuitPermit, CircuitState, CircuitStatus};
pub use retries::{resilient_fetch, RetryOptions};
