//! Health-gated execution of provider work.
//!
//! # Responsibilities
//! - Refuse work for providers whose circuit is open
//! - Re-run transient failures within a small retry budget
//! - Report the final verdict to the circuit breaker registry
//!
//! Retry backoff stops early only when a caller token is passed to
//! `execute_with_health_cancellable`; otherwise dropping the future is the
//! only way to stop it.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::config::HealthConfig;
use crate::error::FetchError;
use crate::health::passive::{self, Verdict};
use tokio_util::sync::CancellationToken;

use crate::resilience::backoff::calculate_backoff;
use crate::resilience::timeouts::cancellable_sleep;
use crate::resilience::{CircuitBreakerRegistry, CircuitStatus};

/// Retry budget applied around one provider's work.
#[derive(Debug, Clone, PartialEq)]
pub struct HealthRetryOptions {
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub backoff_multiplier: f64,
}

impl Default for HealthRetryOptions {
    fn default() -> Self {
        Self::from_config(&HealthConfig::default())
    }
}

impl HealthRetryOptions {
    pub fn from_config(config: &HealthConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            initial_delay: Duration::from_millis(config.initial_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
            backoff_multiplier: 2.0,
        }
    }

    pub fn no_retries() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }
}

/// Wraps provider calls with circuit breaking.
#[derive(Debug, Clone)]
pub struct HealthMonitor {
    breakers: Arc<CircuitBreakerRegistry>,
}

impl HealthMonitor {
    pub fn new(breakers: Arc<CircuitBreakerRegistry>) -> Self {
        Self { breakers }
    }

    pub fn breakers(&self) -> &Arc<CircuitBreakerRegistry> {
        &self.breakers
    }

    /// Run `work` against `provider` if its circuit admits the call.
    pub async fn execute_with_health<T, F, Fut>(
        &self,
        provider: &str,
        work: F,
        options: &HealthRetryOptions,
    ) -> Result<T, FetchError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, FetchError>>,
    {
        self.execute_with_health_cancellable(provider, work, options, None)
            .await
    }

    /// Like `execute_with_health`; `cancel` also interrupts the retry backoff
    /// with `Aborted`, which leaves the circuit untouched.
    pub async fn execute_with_health_cancellable<T, F, Fut>(
        &self,
        provider: &str,
        mut work: F,
        options: &HealthRetryOptions,
        cancel: Option<&CancellationToken>,
    ) -> Result<T, FetchError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, FetchError>>,
    {
        let permit = self.breakers.try_acquire(provider).inspect_err(|_| {
            tracing::debug!(provider = %provider, "Circuit open, failing fast");
        })?;

        let mut attempt: u32 = 0;
        loop {
            match work().await {
                Ok(value) => {
                    permit.success();
                    return Ok(value);
                }
                Err(e) if attempt < options.max_retries && passive::is_retryable(&e) => {
                    let delay = calculate_backoff(
                        attempt,
                        options.initial_delay,
                        options.backoff_multiplier,
                        options.max_delay,
                    );
                    tracing::debug!(provider = %provider, attempt, delay = ?delay, error = %e, "Retrying provider work");
                    if cancellable_sleep(delay, cancel).await.is_err() {
                        tracing::debug!(provider = %provider, attempt, "Provider retry aborted by caller");
                        drop(permit);
                        return Err(FetchError::Aborted);
                    }
                    attempt += 1;
                }
                Err(e) => {
                    match passive::classify(&e) {
                        Verdict::Failure => permit.failure(),
                        Verdict::Neutral => drop(permit),
                    }
                    return Err(e);
                }
            }
        }
    }

    pub fn circuit_breaker_status(&self, provider: &str) -> Option<CircuitStatus> {
        self.breakers.status(provider)
    }

    pub fn reset_circuit_breaker(&self, provider: &str) {
        self.breakers.reset(provider);
    }

    pub fn reset_all_circuit_breakers(&self) {
        self.breakers.reset_all();
    }
}
