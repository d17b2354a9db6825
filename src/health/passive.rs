//! Passive health checking (failure detection).
//!
//! # Responsibilities
//! - Classify call outcomes into provider verdicts
//! - Decide which failures are worth re-running inside the retry budget
//!
//! # Design Decisions
//! - Connection errors, timeouts, 5xx, rate limits and bad payloads count as failures
//! - 4xx are NOT failures (client error, not provider)
//! - Caller cancellation is no verdict at all
//! - A provider that does not serve the domain is skipped without penalty

use crate::error::FetchError;

/// How a failed call reflects on the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Counts toward opening the circuit.
    Failure,
    /// Neither success nor failure.
    Neutral,
}

/// Verdict for a failed call.
pub fn classify(error: &FetchError) -> Verdict {
    match error {
        FetchError::Aborted
        | FetchError::CircuitOpen { .. }
        | FetchError::Unsupported { .. } => Verdict::Neutral,
        e if e.is_client_error() => Verdict::Neutral,
        _ => Verdict::Failure,
    }
}

/// Whether the health monitor's retry budget should re-run the work.
///
/// Rate limits are excluded: the executor below already honoured the
/// server's wait, and a second round would multiply it.
pub fn is_retryable(error: &FetchError) -> bool {
    error.is_transient()
}
