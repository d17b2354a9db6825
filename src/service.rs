//! Service context wiring the data-acquisition layers together.
//!
//! # Data Flow
//! ```text
//! weather_now(lat, lon)
//!     → RegionalCache::get("weather:EU:52.520:13.405", fetcher, ttl)
//!         → ProviderRegistry::with_failover(providers for EU)
//!             → HealthMonitor::execute_with_health(provider)
//!                 → Provider::get_weather_now → resilient_fetch
//! ```
//!
//! # Design Decisions
//! - Built once from config; no global singletons
//! - Cache keys embed the active region, so a migration never serves
//!   another region's entries as fresh
//! - Coordinates in keys are rounded so nearby requests share entries

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::task::JoinHandle;

use crate::cache::RegionalCache;
use crate::config::NavConfig;
use crate::error::FetchResult;
use crate::geo::{Bounds, LatLon, TileCoord};
use crate::health::HealthMonitor;
use crate::lifecycle::Shutdown;
use crate::prefetch::{DiskTileStore, HttpTileFetcher, PrefetchClient, PrefetchWorker};
use crate::provider::{DataDomain, Provider, SpeedCamera, TrafficFlow, WeatherNow};
use crate::region::{Region, RegionRouter};
use crate::registry::ProviderRegistry;
use crate::resilience::{CircuitBreakerRegistry, CircuitStatus, RetryOptions};
use crate::transport::{HttpTransport, ReqwestTransport, TransportError};

/// Origin the in-process prefetch client identifies with.
const LOCAL_ORIGIN: &str = "app://navdata";

pub struct NavDataService {
    config: NavConfig,
    router: Arc<RegionRouter>,
    registry: Arc<ProviderRegistry>,
    transport: Arc<dyn HttpTransport>,
    weather: RegionalCache<WeatherNow>,
    cameras: RegionalCache<Vec<SpeedCamera>>,
    traffic: RegionalCache<TrafficFlow>,
    tiles: RegionalCache<Bytes>,
}

impl NavDataService {
    pub fn new(
        config: NavConfig,
        router: Arc<RegionRouter>,
        registry: Arc<ProviderRegistry>,
        transport: Arc<dyn HttpTransport>,
    ) -> Self {
        let default_ttl = router.default_cache_duration();
        Self {
            weather: RegionalCache::new(Arc::clone(&router), default_ttl),
            cameras: RegionalCache::new(Arc::clone(&router), default_ttl),
            traffic: RegionalCache::new(Arc::clone(&router), default_ttl),
            tiles: RegionalCache::new(Arc::clone(&router), default_ttl),
            config,
            router,
            registry,
            transport,
        }
    }

    /// Wire every layer from configuration over `transport`.
    pub fn from_config(config: NavConfig, transport: Arc<dyn HttpTransport>) -> Self {
        let router = Arc::new(RegionRouter::detect(&config.region, config.cache.clone()));
        let breakers = Arc::new(CircuitBreakerRegistry::from_config(&config.circuit_breaker));
        let health = HealthMonitor::new(breakers);
        let registry = Arc::new(ProviderRegistry::from_config(&config, Arc::clone(&transport), health));
        tracing::info!(
            region = %router.detect_region(),
            providers = config.providers.len(),
            "Data service ready"
        );
        Self::new(config, router, registry, transport)
    }

    /// Like `from_config`, with the production HTTP client.
    pub fn connect(config: NavConfig) -> Result<Self, TransportError> {
        let transport = ReqwestTransport::new(Duration::from_millis(config.retry.connect_timeout_ms))?;
        Ok(Self::from_config(config, Arc::new(transport)))
    }

    pub fn config(&self) -> &NavConfig {
        &self.config
    }

    pub fn region(&self) -> Region {
        self.router.detect_region()
    }

    pub fn router(&self) -> &Arc<RegionRouter> {
        &self.router
    }

    pub fn migrate_region(&self, region: Region) -> Region {
        self.router.migrate(region)
    }

    pub fn health(&self) -> &HealthMonitor {
        self.registry.health()
    }

    pub fn circuit_statuses(&self) -> Vec<(String, CircuitStatus)> {
        self.registry.health().breakers().all_statuses()
    }

    fn providers(&self, domain: DataDomain) -> Vec<Arc<dyn Provider>> {
        self.registry.for_region(self.region()).get(domain).to_vec()
    }

    pub async fn weather_now(&self, lat: f64, lon: f64) -> FetchResult<WeatherNow> {
        let key = format!("weather:{}:{:.3}:{:.3}", self.region(), lat, lon);
        let registry = Arc::clone(&self.registry);
        let providers = self.providers(DataDomain::Weather);
        let fetch_key = key.clone();

        let fetcher = move || async move {
            registry
                .with_failover(
                    &providers,
                    |p| async move { p.get_weather_now(lat, lon).await },
                    "weather",
                    &fetch_key,
                    DataDomain::Weather,
                )
                .await
                .map(|outcome| outcome.data)
        };
        let ttl = self.router.cache_duration(DataDomain::Weather);
        self.weather.get(&key, fetcher, Some(ttl)).await
    }

    pub async fn speed_cameras(&self, a: LatLon, b: LatLon) -> FetchResult<Vec<SpeedCamera>> {
        let key = format!("radar:{}:{}", self.region(), bounds_key(a, b));
        let registry = Arc::clone(&self.registry);
        let providers = self.providers(DataDomain::Radar);
        let fetch_key = key.clone();

        let fetcher = move || async move {
            registry
                .with_failover(
                    &providers,
                    |p| async move { p.get_speed_cameras(a, b).await },
                    "speed cameras",
                    &fetch_key,
                    DataDomain::Radar,
                )
                .await
                .map(|outcome| outcome.data)
        };
        let ttl = self.router.cache_duration(DataDomain::Radar);
        self.cameras.get(&key, fetcher, Some(ttl)).await
    }

    pub async fn traffic_flow(&self, a: LatLon, b: LatLon) -> FetchResult<TrafficFlow> {
        let key = format!("traffic:{}:{}", self.region(), bounds_key(a, b));
        let registry = Arc::clone(&self.registry);
        let providers = self.providers(DataDomain::Traffic);
        let fetch_key = key.clone();

        let fetcher = move || async move {
            registry
                .with_failover(
                    &providers,
                    |p| async move { p.get_traffic_flow(a, b).await },
                    "traffic flow",
                    &fetch_key,
                    DataDomain::Traffic,
                )
                .await
                .map(|outcome| outcome.data)
        };
        let ttl = self.router.cache_duration(DataDomain::Traffic);
        self.traffic.get(&key, fetcher, Some(ttl)).await
    }

    pub async fn tile(&self, coord: TileCoord) -> FetchResult<Bytes> {
        let key = format!("tiles:{}:{}", self.region(), coord);
        let registry = Arc::clone(&self.registry);
        let providers = self.providers(DataDomain::Tiles);
        let fetch_key = key.clone();

        let fetcher = move || async move {
            registry
                .with_failover(
                    &providers,
                    |p| async move { p.get_tile(coord).await },
                    "tile",
                    &fetch_key,
                    DataDomain::Tiles,
                )
                .await
                .map(|outcome| outcome.data)
        };
        let ttl = self.router.cache_duration(DataDomain::Tiles);
        self.tiles.get(&key, fetcher, Some(ttl)).await
    }

    /// Drop entries older than their domain's duration. Returns the count removed.
    pub fn sweep_caches(&self) -> usize {
        self.weather.cleanup(self.router.cache_duration(DataDomain::Weather))
            + self.cameras.cleanup(self.router.cache_duration(DataDomain::Radar))
            + self.traffic.cleanup(self.router.cache_duration(DataDomain::Traffic))
            + self.tiles.cleanup(self.router.cache_duration(DataDomain::Tiles))
    }

    pub fn invalidate_all(&self) {
        self.weather.invalidate_all();
        self.cameras.invalidate_all();
        self.traffic.invalidate_all();
        self.tiles.invalidate_all();
    }

    /// Start the background worker over the on-disk store and return a client.
    pub fn spawn_prefetch(&self, shutdown: Shutdown) -> (PrefetchClient, JoinHandle<()>) {
        let prefetch = &self.config.prefetch;
        let store = Arc::new(DiskTileStore::new(&prefetch.cache_dir));
        let options = RetryOptions::from_config(&self.config.retry, "tiles");
        let fetcher = Arc::new(HttpTileFetcher::new(Arc::clone(&self.transport), options));

        let (tx, handle) = PrefetchWorker::new(prefetch, store, fetcher, shutdown).spawn();
        (PrefetchClient::new(tx, LOCAL_ORIGIN, prefetch.clone()), handle)
    }
}

fn bounds_key(a: LatLon, b: LatLon) -> String {
    let b = Bounds::from_corners(a, b);
    format!("{:.4},{:.4},{:.4},{:.4}", b.south, b.west, b.north, b.east)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CacheConfig;
    use crate::error::FetchError;
    use crate::health::HealthRetryOptions;
    use crate::resilience::retries::tests::{ScriptedTransport, Step};
    use crate::resilience::BreakerSettings;
    use crate::transport::HttpResponse;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

    struct Weather {
        calls: AtomicU32,
        down: AtomicBool,
    }

    #[async_trait]
    impl Provider for Weather {
        fn name(&self) -> &str {
            "wx"
        }

        async fn get_weather_now(&self, lat: f64, _lon: f64) -> FetchResult<WeatherNow> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if self.down.load(Ordering::SeqCst) {
                return Err(FetchError::Network {
                    service: "wx".into(),
                    message: "offline".into(),
                });
            }
            Ok(WeatherNow {
                temperature_c: lat,
                condition: format!("reading {n}"),
                wind_speed_kph: 0.0,
                humidity_pct: None,
                observed_at: None,
            })
        }
    }

    fn service(provider: Arc<Weather>) -> NavDataService {
        let config = NavConfig::default();
        let router = Arc::new(RegionRouter::new(Region::Eu, CacheConfig::default()));
        let health = HealthMonitor::new(Arc::new(CircuitBreakerRegistry::new(BreakerSettings::default())));
        let registry = Arc::new(ProviderRegistry::new(
            vec![provider as Arc<dyn Provider>],
            &[],
            health,
            HealthRetryOptions::no_retries(),
        ));
        let transport = Arc::new(ScriptedTransport::new(vec![Step::Respond(HttpResponse::new(404, ""))]));
        NavDataService::new(config, router, registry, transport)
    }

    fn weather_provider() -> Arc<Weather> {
        Arc::new(Weather {
            calls: AtomicU32::new(0),
            down: AtomicBool::new(false),
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_weather_is_cached_then_served_stale() {
        let provider = weather_provider();
        let service = service(provider.clone());

        let first = service.weather_now(52.52, 13.405).await.unwrap();
        let second = service.weather_now(52.5201, 13.4049).await.unwrap();
        assert_eq!(first, second, "nearby coordinates share an entry");
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);

        tokio::time::advance(Duration::from_secs(601)).await;
        provider.down.store(true, Ordering::SeqCst);
        let stale = service.weather_now(52.52, 13.405).await.unwrap();
        assert_eq!(stale, first);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_migration_changes_cache_key() {
        let provider = weather_provider();
        let service = service(provider.clone());

        service.weather_now(1.0, 1.0).await.unwrap();
        service.migrate_region(Region::Us);
        service.weather_now(1.0, 1.0).await.unwrap();
        assert_eq!(provider.calls.load(Ordering::SeqCst), 2);
        assert_eq!(service.region(), Region::Us);
    }

    #[tokio::test]
    async fn test_unsupported_domain_fails_without_cache_entry() {
        let service = service(weather_provider());
        let err = service
            .traffic_flow(LatLon::new(0.0, 0.0), LatLon::new(1.0, 1.0))
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::AllProvidersFailed { .. }));
        assert_eq!(service.traffic.stats().size, 0);
    }

    #[test]
    fn test_bounds_key_is_order_independent() {
        assert_eq!(
            bounds_key(LatLon::new(1.0, 2.0), LatLon::new(0.5, 3.0)),
            bounds_key(LatLon::new(0.5, 3.0), LatLon::new(1.0, 2.0))
        );
    }
}
