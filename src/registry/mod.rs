//! Provider registry and failover.
//!
//! # Responsibilities
//! - Map a region to ordered candidate providers per data domain
//! - Walk the candidates until one succeeds, each attempt health-gated
//! - Report which provider answered and whether a fallback was needed
//!
//! # Data Flow
//! ```text
//! for_region(region) → ProviderSet { domain → [primary, secondary, …] }
//!     ↓
//! with_failover(providers, operation)
//!     → execute_with_health(p0) ─ok─→ FailoverOutcome { attempts: 1 }
//!     ↓ err
//!     → execute_with_health(p1) ─ok─→ FailoverOutcome { fallback_used }
//!     ↓ err …
//!     → AllProvidersFailed { failures }
//! ```
//!
//! # Design Decisions
//! - Order is a static table; it is not re-ranked by observed latency
//! - Open-circuit providers stay in the walk and fail fast in O(1)
//! - A region's row is followed by the `Global` row as last resort;
//!   without any row, every provider that serves the domain is used in
//!   declared order

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use crate::config::{NavConfig, RegionRoute};
use crate::error::{FetchError, ProviderFailure};
use crate::health::{HealthMonitor, HealthRetryOptions};
use crate::observability::metrics;
use crate::provider::{DataDomain, HttpProvider, Provider};
use crate::region::Region;
use crate::transport::HttpTransport;

/// Ordered candidates for every domain, selected for one region.
#[derive(Clone, Default)]
pub struct ProviderSet {
    by_domain: HashMap<DataDomain, Vec<Arc<dyn Provider>>>,
}

impl ProviderSet {
    pub fn get(&self, domain: DataDomain) -> &[Arc<dyn Provider>] {
        self.by_domain.get(&domain).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Provider names for `domain`, most preferred first.
    pub fn names(&self, domain: DataDomain) -> Vec<&str> {
        self.get(domain).iter().map(|p| p.name()).collect()
    }
}

/// Result of a successful failover walk.
#[derive(Debug, Clone, PartialEq)]
pub struct FailoverOutcome<T> {
    pub data: T,
    /// Name of the provider that answered.
    pub provider: String,
    /// Candidates tried, including the winner.
    pub attempts: usize,
    /// True when the winner was not the primary.
    pub fallback_used: bool,
}

pub struct ProviderRegistry {
    providers: Vec<Arc<dyn Provider>>,
    routes: HashMap<(Region, DataDomain), Vec<String>>,
    health: HealthMonitor,
    health_options: HealthRetryOptions,
}

impl ProviderRegistry {
    pub fn new(
        providers: Vec<Arc<dyn Provider>>,
        routes: &[RegionRoute],
        health: HealthMonitor,
        health_options: HealthRetryOptions,
    ) -> Self {
        let routes = routes
            .iter()
            .map(|r| ((r.region, r.domain), r.providers.clone()))
            .collect();
        Self {
            providers,
            routes,
            health,
            health_options,
        }
    }

    /// Build `HttpProvider`s for every configured provider over one transport.
    pub fn from_config(config: &NavConfig, transport: Arc<dyn HttpTransport>, health: HealthMonitor) -> Self {
        let providers = config
            .providers
            .iter()
            .map(|p| {
                Arc::new(HttpProvider::new(p.clone(), Arc::clone(&transport), &config.retry)) as Arc<dyn Provider>
            })
            .collect();
        Self::new(
            providers,
            &config.regions,
            health,
            HealthRetryOptions::from_config(&config.health),
        )
    }

    pub fn health(&self) -> &HealthMonitor {
        &self.health
    }

    fn by_name(&self, name: &str) -> Option<&Arc<dyn Provider>> {
        self.providers.iter().find(|p| p.name() == name)
    }

    fn resolve(&self, names: &[String], region: Region) -> Vec<Arc<dyn Provider>> {
        names
            .iter()
            .filter_map(|name| {
                let found = self.by_name(name);
                if found.is_none() {
                    tracing::warn!(provider = %name, region = %region, "Route names unknown provider");
                }
                found.cloned()
            })
            .collect()
    }

    fn candidates(&self, region: Region, domain: DataDomain) -> Vec<Arc<dyn Provider>> {
        let regional = self.routes.get(&(region, domain));
        let global = self.routes.get(&(Region::Global, domain));

        if regional.is_none() && global.is_none() {
            return self
                .providers
                .iter()
                .filter(|p| p.supports(domain))
                .cloned()
                .collect();
        }

        let mut set = regional.map(|names| self.resolve(names, region)).unwrap_or_default();
        if region != Region::Global {
            for provider in global.map(|names| self.resolve(names, Region::Global)).unwrap_or_default() {
                if !set.iter().any(|p| p.name() == provider.name()) {
                    set.push(provider);
                }
            }
        }
        set
    }

    /// Ordered candidates for every domain in `region`.
    pub fn for_region(&self, region: Region) -> ProviderSet {
        let by_domain = DataDomain::ALL
            .into_iter()
            .map(|domain| (domain, self.candidates(region, domain)))
            .collect();
        ProviderSet { by_domain }
    }

    /// Try `operation` on each provider in order until one succeeds.
    ///
    /// `label` names the operation in errors and logs; `cache_key` is only
    /// carried into log events.
    pub async fn with_failover<T, F, Fut>(
        &self,
        providers: &[Arc<dyn Provider>],
        mut operation: F,
        label: &str,
        cache_key: &str,
        domain: DataDomain,
    ) -> Result<FailoverOutcome<T>, FetchError>
    where
        F: FnMut(Arc<dyn Provider>) -> Fut,
        Fut: Future<Output = Result<T, FetchError>>,
    {
        if providers.is_empty() {
            tracing::error!(label = %label, domain = %domain, "No providers configured");
            return Err(FetchError::NoProviders {
                label: label.to_string(),
                domain,
            });
        }

        let mut failures = Vec::new();
        for (index, provider) in providers.iter().enumerate() {
            let name = provider.name();
            let result = self
                .health
                .execute_with_health(name, || operation(Arc::clone(provider)), &self.health_options)
                .await;

            match result {
                Ok(data) => {
                    metrics::record_provider_attempt(name, domain.as_str(), true);
                    let fallback_used = index > 0;
                    if fallback_used {
                        metrics::record_failover(domain.as_str(), name);
                        tracing::info!(
                            label = %label,
                            key = %cache_key,
                            provider = %name,
                            attempts = index + 1,
                            "Served by fallback provider"
                        );
                    } else {
                        tracing::debug!(label = %label, key = %cache_key, provider = %name, "Served by primary provider");
                    }
                    return Ok(FailoverOutcome {
                        data,
                        provider: name.to_string(),
                        attempts: index + 1,
                        fallback_used,
                    });
                }
                Err(e) if e.is_abort() => return Err(e),
                Err(e) => {
                    metrics::record_provider_attempt(name, domain.as_str(), false);
                    tracing::warn!(
                        label = %label,
                        key = %cache_key,
                        provider = %name,
                        attempt = index + 1,
                        error = %e,
                        "Provider failed, trying next"
                    );
                    failures.push(ProviderFailure {
                        provider: name.to_string(),
                        error: e.to_string(),
                    });
                }
            }
        }

        tracing::error!(label = %label, key = %cache_key, domain = %domain, attempts = failures.len(), "All providers failed");
        Err(FetchError::AllProvidersFailed {
            label: label.to_string(),
            domain,
            failures,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ProviderConfig, RetryConfig};
    use crate::error::FetchResult;
    use crate::provider::WeatherNow;
    use crate::resilience::retries::tests::{ScriptedTransport, Step};
    use crate::resilience::{BreakerSettings, CircuitBreakerRegistry};
    use crate::transport::HttpResponse;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    /// Weather provider that fails its first `failures` calls.
    struct Flaky {
        name: String,
        failures: u32,
        calls: AtomicU32,
    }

    impl Flaky {
        fn new(name: &str, failures: u32) -> Arc<Self> {
            Arc::new(Self {
                name: name.to_string(),
                failures,
                calls: AtomicU32::new(0),
            })
        }
    }

    #[async_trait]
    impl Provider for Flaky {
        fn name(&self) -> &str {
            &self.name
        }

        async fn get_weather_now(&self, _lat: f64, _lon: f64) -> FetchResult<WeatherNow> {
            if self.calls.fetch_add(1, Ordering::SeqCst) < self.failures {
                return Err(FetchError::Http {
                    service: self.name.clone(),
                    status: 503,
                });
            }
            Ok(WeatherNow {
                temperature_c: 20.0,
                condition: format!("from {}", self.name),
                wind_speed_kph: 0.0,
                humidity_pct: None,
                observed_at: None,
            })
        }
    }

    fn health(threshold: u32) -> HealthMonitor {
        HealthMonitor::new(Arc::new(CircuitBreakerRegistry::new(BreakerSettings {
            failure_threshold: threshold,
            cooldown: Duration::from_secs(60),
        })))
    }

    fn registry(providers: Vec<Arc<dyn Provider>>, routes: &[RegionRoute]) -> ProviderRegistry {
        ProviderRegistry::new(providers, routes, health(3), HealthRetryOptions::no_retries())
    }

    fn route(region: Region, domain: DataDomain, names: &[&str]) -> RegionRoute {
        RegionRoute {
            region,
            domain,
            providers: names.iter().map(|s| s.to_string()).collect(),
        }
    }

    async fn weather(
        registry: &ProviderRegistry,
        providers: &[Arc<dyn Provider>],
    ) -> Result<FailoverOutcome<WeatherNow>, FetchError> {
        registry
            .with_failover(
                providers,
                |p| async move { p.get_weather_now(52.5, 13.4).await },
                "weather",
                "weather:52.5:13.4",
                DataDomain::Weather,
            )
            .await
    }

    #[test]
    fn test_for_region_appends_global_row() {
        let a: Arc<dyn Provider> = Flaky::new("a", 0);
        let b: Arc<dyn Provider> = Flaky::new("b", 0);
        let c: Arc<dyn Provider> = Flaky::new("c", 0);
        let registry = registry(
            vec![a, b, c],
            &[
                route(Region::Eu, DataDomain::Weather, &["b", "a"]),
                route(Region::Us, DataDomain::Weather, &["c"]),
                route(Region::Global, DataDomain::Weather, &["a"]),
            ],
        );

        assert_eq!(registry.for_region(Region::Eu).names(DataDomain::Weather), vec!["b", "a"]);
        assert_eq!(registry.for_region(Region::Us).names(DataDomain::Weather), vec!["c", "a"]);
        assert_eq!(registry.for_region(Region::Asia).names(DataDomain::Weather), vec!["a"]);
        // No row at all: every provider in declared order.
        assert_eq!(registry.for_region(Region::Eu).names(DataDomain::Traffic), vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_primary_success() {
        let providers: Vec<Arc<dyn Provider>> = vec![Flaky::new("a", 0), Flaky::new("b", 0)];
        let registry = registry(providers.clone(), &[]);

        let outcome = weather(&registry, &providers).await.unwrap();
        assert_eq!(outcome.provider, "a");
        assert_eq!(outcome.attempts, 1);
        assert!(!outcome.fallback_used);
    }

    #[tokio::test]
    async fn test_failover_counts_attempts() {
        let providers: Vec<Arc<dyn Provider>> =
            vec![Flaky::new("a", 10), Flaky::new("b", 10), Flaky::new("c", 0)];
        let registry = registry(providers.clone(), &[]);

        let outcome = weather(&registry, &providers).await.unwrap();
        assert_eq!(outcome.provider, "c");
        assert_eq!(outcome.attempts, 3);
        assert!(outcome.fallback_used);
        assert_eq!(outcome.data.condition, "from c");
    }

    #[tokio::test]
    async fn test_all_fail_lists_every_provider() {
        let providers: Vec<Arc<dyn Provider>> = vec![Flaky::new("a", 10), Flaky::new("b", 10)];
        let registry = registry(providers.clone(), &[]);

        let err = weather(&registry, &providers).await.unwrap_err();
        match &err {
            FetchError::AllProvidersFailed { failures, .. } => {
                let names: Vec<_> = failures.iter().map(|f| f.provider.as_str()).collect();
                assert_eq!(names, vec!["a", "b"]);
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(err.to_string().starts_with("All providers failed for weather (weather): a: HTTP 503"));
    }

    #[tokio::test]
    async fn test_empty_set() {
        let registry = registry(vec![], &[]);
        let err = weather(&registry, &[]).await.unwrap_err();
        assert!(matches!(err, FetchError::NoProviders { .. }));
    }

    #[tokio::test]
    async fn test_open_circuit_is_attempted_and_fails_fast() {
        let a = Flaky::new("a", u32::MAX);
        let b = Flaky::new("b", 0);
        let providers: Vec<Arc<dyn Provider>> = vec![a.clone(), b];
        let registry = registry(providers.clone(), &[]);

        for _ in 0..3 {
            weather(&registry, &providers).await.unwrap();
        }
        assert!(registry.health().circuit_breaker_status("a").unwrap().is_open);
        assert_eq!(a.calls.load(Ordering::SeqCst), 3);

        let outcome = weather(&registry, &providers).await.unwrap();
        assert_eq!(outcome.attempts, 2);
        assert_eq!(a.calls.load(Ordering::SeqCst), 3, "open circuit must not reach the provider");
    }

    #[tokio::test]
    async fn test_abort_stops_the_walk() {
        let providers: Vec<Arc<dyn Provider>> = vec![Flaky::new("a", 0), Flaky::new("b", 0)];
        let registry = registry(providers.clone(), &[]);
        let calls = &AtomicU32::new(0);

        let err = registry
            .with_failover(
                &providers,
                |_| async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err::<(), _>(FetchError::Aborted)
                },
                "weather",
                "k",
                DataDomain::Weather,
            )
            .await
            .unwrap_err();
        assert!(err.is_abort());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limited_primary_waits_once_then_fails_over() {
        let limited = Arc::new(ScriptedTransport::new(vec![Step::Respond(
            HttpResponse::new(429, "slow down").with_header("Retry-After", "2"),
        )]));
        let healthy = Arc::new(ScriptedTransport::new(vec![Step::Respond(HttpResponse::new(
            200,
            r#"{"temperature_c": 11.0, "condition": "rain"}"#,
        ))]));
        let retry = RetryConfig {
            max_retries: 1,
            max_delay_ms: 5_000,
            ..RetryConfig::default()
        };
        let provider = |name: &str, transport: Arc<ScriptedTransport>| -> Arc<dyn Provider> {
            let config = ProviderConfig {
                name: name.to_string(),
                weather_url: Some(format!("https://{name}.test/now?lat={{lat}}&lon={{lon}}")),
                cameras_url: None,
                traffic_url: None,
                tile_url: None,
                api_key_env: None,
                timeout_ms: None,
                headers: Default::default(),
            };
            Arc::new(HttpProvider::new(config, transport, &retry))
        };

        let registry = ProviderRegistry::new(
            vec![provider("a", limited.clone()), provider("b", healthy.clone())],
            &[route(Region::Eu, DataDomain::Weather, &["a", "b"])],
            health(3),
            HealthRetryOptions::default(),
        );
        let set = registry.for_region(Region::Eu);

        let start = tokio::time::Instant::now();
        let outcome = weather(&registry, set.get(DataDomain::Weather)).await.unwrap();

        let waited = start.elapsed();
        assert!(waited >= Duration::from_secs(2) && waited < Duration::from_millis(2100), "waited {waited:?}");
        assert_eq!(outcome.provider, "b");
        assert!(outcome.fallback_used);
        assert_eq!(limited.calls(), 2);
        assert_eq!(healthy.calls(), 1);
    }
}
