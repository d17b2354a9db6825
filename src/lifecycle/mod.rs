//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Shutdown (shutdown.rs):
//!     trigger() → broadcast to worker loops → root token cancelled
//!               → every prefetch session token (children) cancelled
//!
//! Signals (signals.rs):
//!     SIGINT (Ctrl+C) → caller decides: abort a download or shut down
//! ```
//!
//! # Design Decisions
//! - Session tokens are children of the shutdown token, so stopping the
//!   process never leaves a download running
//! - Shutdown is idempotent

pub mod shutdown;
pub mod signals;

pub use shutdown::Shutdown;
