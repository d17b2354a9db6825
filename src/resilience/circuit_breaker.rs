//! Circuit breaker for provider protection.
//!
//! # States
//! - Closed: normal operation, requests pass through
//! - Open: provider assumed down, requests fail fast
//! - Half-Open: testing if provider recovered
//!
//! # State Transitions
//! ```text
//! Closed → Open: consecutive failures >= threshold
//! Open → Half-Open: after cooldown
//! Half-Open → Closed: trial request succeeds
//! Half-Open → Open: trial request fails
//! ```
//!
//! # Design Decisions
//! - Keyed by provider name, shared across regions (an outage is provider-wide)
//! - Fail fast in Open state (no waiting for timeout)
//! - Single trial in Half-Open (prevents hammering recovering provider)
//! - Registry is an explicit object handed to whoever needs it, not a global

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use serde::Serialize;
use tokio::time::Instant;

use crate::config::CircuitBreakerConfig;
use crate::error::FetchError;
use crate::observability::metrics;

/// Circuit state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

/// Threshold and cooldown for one provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BreakerSettings {
    pub failure_threshold: u32,
    pub cooldown: Duration,
}

impl Default for BreakerSettings {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            cooldown: Duration::from_secs(60),
        }
    }
}

/// Snapshot returned by [`CircuitBreakerRegistry::status`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CircuitStatus {
    pub is_open: bool,
    pub failures: u32,
    pub state: CircuitState,
}

#[derive(Debug)]
struct Circuit {
    state: CircuitState,
    failure_count: u32,
    opened_at: Option<Instant>,
    trial_in_flight: bool,
}

impl Circuit {
    fn new() -> Self {
        Self {
            state: CircuitState::Closed,
            failure_count: 0,
            opened_at: None,
            trial_in_flight: false,
        }
    }
}

/// Per-provider circuit breakers.
#[derive(Debug, Default)]
pub struct CircuitBreakerRegistry {
    circuits: DashMap<String, Circuit>,
    defaults: BreakerSettings,
    overrides: HashMap<String, BreakerSettings>,
}

impl CircuitBreakerRegistry {
    pub fn new(defaults: BreakerSettings) -> Self {
        Self {
            circuits: DashMap::new(),
            defaults,
            overrides: HashMap::new(),
        }
    }

    /// Build from configuration, including per-provider overrides.
    pub fn from_config(config: &CircuitBreakerConfig) -> Self {
        let defaults = BreakerSettings {
            failure_threshold: config.failure_threshold,
            cooldown: Duration::from_secs(config.cooldown_secs),
        };
        let overrides = config
            .overrides
            .iter()
            .map(|(name, o)| {
                (
                    name.clone(),
                    BreakerSettings {
                        failure_threshold: o.failure_threshold.unwrap_or(defaults.failure_threshold),
                        cooldown: o
                            .cooldown_secs
                            .map(Duration::from_secs)
                            .unwrap_or(defaults.cooldown),
                    },
                )
            })
            .collect();

        Self {
            circuits: DashMap::new(),
            defaults,
            overrides,
        }
    }

    pub fn with_override(mut self, provider: &str, settings: BreakerSettings) -> Self {
        self.overrides.insert(provider.to_string(), settings);
        self
    }

    /// Settings in force for `provider`.
    pub fn settings_for(&self, provider: &str) -> BreakerSettings {
        self.overrides.get(provider).copied().unwrap_or(self.defaults)
    }

    /// Ask to call `provider`.
    ///
    /// Returns a permit when the circuit is closed, or when it is open, the
    /// cooldown has elapsed and no other trial is in flight. Otherwise fails
    /// fast with `CircuitOpen`.
    pub fn try_acquire(self: &Arc<Self>, provider: &str) -> Result<CircuitPermit, FetchError> {
        let settings = self.settings_for(provider);
        let mut circuit = self
            .circuits
            .entry(provider.to_string())
            .or_insert_with(Circuit::new);

        let trial = match circuit.state {
            CircuitState::Closed => false,
            CircuitState::Open => {
                let cooled = circuit
                    .opened_at
                    .map(|at| at.elapsed() >= settings.cooldown)
                    .unwrap_or(true);
                if !cooled {
                    return Err(FetchError::CircuitOpen {
                        provider: provider.to_string(),
                    });
                }
                tracing::info!(provider = %provider, "Circuit half-open, admitting trial");
                circuit.state = CircuitState::HalfOpen;
                circuit.trial_in_flight = true;
                true
            }
            CircuitState::HalfOpen => {
                if circuit.trial_in_flight {
                    return Err(FetchError::CircuitOpen {
                        provider: provider.to_string(),
                    });
                }
                circuit.trial_in_flight = true;
                true
            }
        };

        Ok(CircuitPermit {
            registry: Arc::clone(self),
            provider: provider.to_string(),
            trial,
            settled: false,
        })
    }

    /// Record a successful call: reset failures, close the circuit.
    pub fn record_success(&self, provider: &str) {
        let mut circuit = self
            .circuits
            .entry(provider.to_string())
            .or_insert_with(Circuit::new);

        if circuit.state != CircuitState::Closed {
            tracing::info!(provider = %provider, previous = ?circuit.state, "Circuit closed");
            metrics::record_circuit_state(provider, false);
        }
        circuit.state = CircuitState::Closed;
        circuit.failure_count = 0;
        circuit.opened_at = None;
        circuit.trial_in_flight = false;
    }

    /// Record a failed call; opens the circuit at the threshold or when a
    /// half-open trial fails.
    pub fn record_failure(&self, provider: &str) {
        let settings = self.settings_for(provider);
        let mut circuit = self
            .circuits
            .entry(provider.to_string())
            .or_insert_with(Circuit::new);

        circuit.failure_count = circuit.failure_count.saturating_add(1);
        let reopen = circuit.state == CircuitState::HalfOpen;
        circuit.trial_in_flight = false;

        if reopen || (circuit.state == CircuitState::Closed && circuit.failure_count >= settings.failure_threshold) {
            circuit.state = CircuitState::Open;
            circuit.opened_at = Some(Instant::now());
            metrics::record_circuit_state(provider, true);
            tracing::warn!(
                provider = %provider,
                failures = circuit.failure_count,
                cooldown = ?settings.cooldown,
                "Circuit opened"
            );
        } else {
            tracing::debug!(provider = %provider, failures = circuit.failure_count, "Provider failure recorded");
        }
    }

    fn release_trial(&self, provider: &str) {
        if let Some(mut circuit) = self.circuits.get_mut(provider) {
            circuit.trial_in_flight = false;
        }
    }

    /// Current status, or `None` if the provider has never been called.
    pub fn status(&self, provider: &str) -> Option<CircuitStatus> {
        self.circuits.get(provider).map(|c| CircuitStatus {
            is_open: c.state == CircuitState::Open,
            failures: c.failure_count,
            state: c.state,
        })
    }

    /// Status of every known provider.
    pub fn all_statuses(&self) -> Vec<(String, CircuitStatus)> {
        let mut all: Vec<_> = self
            .circuits
            .iter()
            .map(|r| {
                (
                    r.key().clone(),
                    CircuitStatus {
                        is_open: r.state == CircuitState::Open,
                        failures: r.failure_count,
                        state: r.state,
                    },
                )
            })
            .collect();
        all.sort_by(|a, b| a.0.cmp(&b.0));
        all
    }

    /// Close one provider's circuit.
    pub fn reset(&self, provider: &str) {
        if self.circuits.remove(provider).is_some() {
            metrics::record_circuit_state(provider, false);
            tracing::info!(provider = %provider, "Circuit breaker reset");
        }
    }

    /// Close every circuit.
    pub fn reset_all(&self) {
        for entry in self.circuits.iter() {
            metrics::record_circuit_state(entry.key(), false);
        }
        self.circuits.clear();
        tracing::info!("All circuit breakers reset");
    }
}

/// Permission to make one call. Settle it with `success` or `failure`;
/// dropping an unsettled trial frees the half-open slot without a verdict.
#[derive(Debug)]
pub struct CircuitPermit {
    registry: Arc<CircuitBreakerRegistry>,
    provider: String,
    trial: bool,
    settled: bool,
}

impl CircuitPermit {
    pub fn is_trial(&self) -> bool {
        self.trial
    }

    pub fn success(mut self) {
        self.settled = true;
        self.registry.record_success(&self.provider);
    }

    pub fn failure(mut self) {
        self.settled = true;
        self.registry.record_failure(&self.provider);
    }
}

impl Drop for CircuitPermit {
    fn drop(&mut self) {
        if !self.settled && self.trial {
            self.registry.release_trial(&self.provider);
        }
    }
}
