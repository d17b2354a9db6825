//! Retry logic.
//!
//! # Responsibilities
//! - Execute one logical request as a series of attempts, each with a fresh
//!   deadline
//! - Honour server-mandated waits on 429, or fail fast when they exceed budget
//! - Back off exponentially with jitter on 5xx and network failures
//!
//! # Design Decisions
//! - 2xx and non-429 4xx are returned as-is; client errors are not transient
//! - Caller cancellation propagates immediately and is never logged as failure
//! - Circuit state is not touched here; the health monitor layers on top

use std::time::Duration;

use chrono::Utc;
use tokio_util::sync::CancellationToken;

use crate::config::RetryConfig;
use crate::error::FetchError;
use crate::observability::metrics;
use crate::resilience::backoff::calculate_backoff;
use crate::resilience::rate_limit;
use crate::resilience::timeouts::{cancellable_sleep, run_with_deadline, Interrupted};
use crate::transport::{HttpRequest, HttpResponse, HttpTransport};

/// Options for one `resilient_fetch` call.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryOptions {
    /// Retries after the first attempt.
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub backoff_multiplier: f64,
    /// Per-attempt deadline.
    pub timeout: Duration,
    /// Used in logs, metrics and errors.
    pub service_name: String,
}

impl Default for RetryOptions {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default(), "upstream")
    }
}

impl RetryOptions {
    pub fn from_config(config: &RetryConfig, service_name: &str) -> Self {
        Self {
            max_retries: config.max_retries,
            initial_delay: Duration::from_millis(config.initial_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
            backoff_multiplier: config.backoff_multiplier,
            timeout: Duration::from_millis(config.timeout_ms),
            service_name: service_name.to_string(),
        }
    }

    pub fn with_service(mut self, service_name: &str) -> Self {
        self.service_name = service_name.to_string();
        self
    }
}

/// Send `request` through `transport` with timeout, retry and rate-limit handling.
pub async fn resilient_fetch(
    transport: &dyn HttpTransport,
    request: &HttpRequest,
    options: &RetryOptions,
    cancel: Option<&CancellationToken>,
) -> Result<HttpResponse, FetchError> {
    let service = options.service_name.as_str();
    let mut attempt: u32 = 0;

    loop {
        let outcome = run_with_deadline(options.timeout, cancel, transport.send(request)).await;

        let failure = match outcome {
            Err(Interrupted::Cancelled) => {
                tracing::debug!(service = %service, attempt, "Request aborted by caller");
                return Err(FetchError::Aborted);
            }
            Err(Interrupted::TimedOut(after)) => FetchError::Timeout {
                service: service.to_string(),
                after,
            },
            Ok(Err(e)) => FetchError::Network {
                service: service.to_string(),
                message: e.to_string(),
            },
            Ok(Ok(response)) if response.status == 429 => {
                let wait = rate_limit::retry_after(&response, Utc::now());
                metrics::record_rate_limited(service);
                tracing::warn!(
                    service = %service,
                    attempt,
                    retry_after = ?wait,
                    url = %request.url,
                    "Rate limited by upstream"
                );

                let attempts_remain = attempt < options.max_retries;
                let delay = match wait {
                    Some(wait) if attempts_remain && wait <= options.max_delay => wait,
                    None if attempts_remain => calculate_backoff(
                        attempt,
                        options.initial_delay,
                        options.backoff_multiplier,
                        options.max_delay,
                    ),
                    _ => {
                        metrics::record_retry_exhausted(service);
                        tracing::error!(
                            service = %service,
                            attempts = attempt + 1,
                            retry_after = ?wait,
                            "Rate limit wait exceeds budget, failing fast"
                        );
                        return Err(FetchError::RateLimited {
                            service: service.to_string(),
                            retry_after: wait,
                        });
                    }
                };

                if cancellable_sleep(delay, cancel).await.is_err() {
                    return Err(FetchError::Aborted);
                }
                attempt += 1;
                continue;
            }
            Ok(Ok(response)) if response.is_server_error() => FetchError::Http {
                service: service.to_string(),
                status: response.status,
            },
            Ok(Ok(response)) => return Ok(response),
        };

        if attempt >= options.max_retries {
            metrics::record_retry_exhausted(service);
            tracing::error!(
                service = %service,
                attempts = attempt + 1,
                error = %failure,
                url = %request.url,
                "Retries exhausted"
            );
            return Err(failure);
        }

        let delay = calculate_backoff(
            attempt,
            options.initial_delay,
            options.backoff_multiplier,
            options.max_delay,
        );
        tracing::info!(service = %service, attempt, delay = ?delay, error = %failure, "Retrying request");

        if cancellable_sleep(delay, cancel).await.is_err() {
            return Err(FetchError::Aborted);
        }
        attempt += 1;
    }
}
