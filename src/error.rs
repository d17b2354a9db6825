//! Error taxonomy for the data-acquisition layer.
//!
//! # Classes
//! - Transient (network, timeout, 5xx): retried with backoff
//! - Rate limited (429): retried after the mandated delay or failed fast
//! - Client errors (other 4xx): definitive, never retried
//! - Aborted: caller cancellation, never retried and not a provider failure
//! - Circuit open: cheap fast-fail, short-circuits retries entirely
//! - Provider exhaustion: every candidate failed; the cache may mask it
//!
//! `FetchError` is `Clone` so a single in-flight fetch can hand the same
//! failure to every de-duplicated waiter.

use std::fmt;
use std::time::Duration;

use thiserror::Error;

use crate::provider::DataDomain;

/// One provider's failure inside a failover walk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderFailure {
    pub provider: String,
    pub error: String,
}

impl fmt::Display for ProviderFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.provider, self.error)
    }
}

/// Errors produced while acquiring upstream data.
#[derive(Debug, Clone, Error)]
pub enum FetchError {
    /// Connection, DNS or body transfer failure.
    #[error("Network error from {service}: {message}")]
    Network { service: String, message: String },

    /// A single attempt exceeded its deadline.
    #[error("Request to {service} timed out after {after:?}")]
    Timeout { service: String, after: Duration },

    /// Upstream answered with a non-success status.
    #[error("HTTP {status} from {service}")]
    Http { service: String, status: u16 },

    /// Upstream rate limited the request and the wait did not fit the budget.
    #[error("Rate limited by {service} (retry after {retry_after:?})")]
    RateLimited {
        service: String,
        retry_after: Option<Duration>,
    },

    /// The caller cancelled the operation.
    #[error("Request aborted")]
    Aborted,

    /// The provider's circuit is open; the call was not attempted.
    #[error("Circuit open for provider {provider}")]
    CircuitOpen { provider: String },

    /// The provider does not serve this data domain.
    #[error("Provider {provider} does not support {domain}")]
    Unsupported { provider: String, domain: DataDomain },

    /// The response body could not be decoded.
    #[error("Failed to decode response from {service}: {message}")]
    Decode { service: String, message: String },

    /// The provider set for the domain was empty.
    #[error("No providers configured for {label} ({domain})")]
    NoProviders { label: String, domain: DataDomain },

    /// Every candidate in the provider set failed.
    #[error("All providers failed for {label} ({domain}): {}", join_failures(.failures))]
    AllProvidersFailed {
        label: String,
        domain: DataDomain,
        failures: Vec<ProviderFailure>,
    },

    /// Local storage failure.
    #[error("Storage error: {0}")]
    Storage(String),
}

fn join_failures(failures: &[ProviderFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl FetchError {
    /// True for caller cancellation.
    pub fn is_abort(&self) -> bool {
        matches!(self, FetchError::Aborted)
    }

    /// True for failures worth re-running: network, timeout, 5xx.
    pub fn is_transient(&self) -> bool {
        match self {
            FetchError::Network { .. } | FetchError::Timeout { .. } => true,
            FetchError::Http { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// True for non-429 4xx responses.
    pub fn is_client_error(&self) -> bool {
        matches!(self, FetchError::Http { status, .. } if (400..500).contains(status) && *status != 429)
    }
}

/// Result type for data acquisition.
pub type FetchResult<T> = Result<T, FetchError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        let server = FetchError::Http { service: "a".into(), status: 503 };
        assert!(server.is_transient());
        assert!(!server.is_client_error());

        let client = FetchError::Http { service: "a".into(), status: 404 };
        assert!(!client.is_transient());
        assert!(client.is_client_error());

        let limited = FetchError::Http { service: "a".into(), status: 429 };
        assert!(!limited.is_client_error());

        assert!(FetchError::Aborted.is_abort());
        assert!(!FetchError::CircuitOpen { provider: "a".into() }.is_transient());
    }

    #[test]
    fn test_aggregate_display() {
        let err = FetchError::AllProvidersFailed {
            label: "weather".into(),
            domain: DataDomain::Weather,
            failures: vec![
                ProviderFailure { provider: "a".into(), error: "HTTP 500 from a".into() },
                ProviderFailure { provider: "b".into(), error: "Circuit open for provider b".into() },
            ],
        };
        let text = err.to_string();
        assert!(text.starts_with("All providers failed for weather (weather)"));
        assert!(text.contains("a: HTTP 500 from a"));
        assert!(text.contains("b: Circuit open"));
    }
}
