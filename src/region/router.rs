//! Active-region bookkeeping.
//!
//! # Responsibilities
//! - Detect the session region once at startup
//! - Answer per-domain cache durations
//! - Re-run region-scoped work against `Global` when the regional attempt fails
//! - Allow the rare migration to another region
//!
//! # Design Decisions
//! - Detection order: forced region, configured country, locale environment
//!   (`LC_ALL`, `LANG`), then `Global`
//! - Current region lives in an `ArcSwap` so readers never block

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;

use crate::config::{CacheConfig, RegionConfig};
use crate::error::FetchError;
use crate::provider::DataDomain;
use crate::region::Region;

#[derive(Debug)]
pub struct RegionRouter {
    current: ArcSwap<Region>,
    durations: CacheConfig,
}

/// Country part of a POSIX locale such as `de_DE.UTF-8`.
fn locale_country(locale: &str) -> Option<&str> {
    let territory = locale.split(['.', '@']).next()?.split('_').nth(1)?;
    (territory.len() == 2).then_some(territory)
}

impl RegionRouter {
    pub fn new(region: Region, durations: CacheConfig) -> Self {
        Self {
            current: ArcSwap::from_pointee(region),
            durations,
        }
    }

    /// Build a router with the region detected from configuration and locale.
    pub fn detect(config: &RegionConfig, durations: CacheConfig) -> Self {
        let locale = ["LC_ALL", "LANG"]
            .into_iter()
            .find_map(|var| std::env::var(var).ok().filter(|v| !v.is_empty()));
        let region = Self::resolve(config, locale.as_deref());
        tracing::info!(region = %region, "Region detected");
        Self::new(region, durations)
    }

    fn resolve(config: &RegionConfig, locale: Option<&str>) -> Region {
        if let Some(region) = config.force {
            return region;
        }
        if let Some(country) = config.country.as_deref() {
            return Region::from_country_code(country);
        }
        locale
            .and_then(locale_country)
            .map(Region::from_country_code)
            .unwrap_or(Region::Global)
    }

    /// The session's active region.
    pub fn detect_region(&self) -> Region {
        **self.current.load()
    }

    pub fn cache_duration(&self, domain: DataDomain) -> Duration {
        Duration::from_secs(self.durations.secs_for(domain))
    }

    pub fn default_cache_duration(&self) -> Duration {
        Duration::from_secs(self.durations.default_secs)
    }

    /// Switch the active region. Returns the previous one.
    pub fn migrate(&self, region: Region) -> Region {
        let previous = *self.current.swap(Arc::new(region));
        if previous != region {
            tracing::info!(from = %previous, to = %region, "Region migrated");
        }
        previous
    }

    /// Run `work` for the active region, falling back to `Global` on failure.
    ///
    /// Aborts are returned as-is; `Global` sessions get a single attempt.
    pub async fn retry_with_fallback<T, F, Fut>(&self, mut work: F) -> Result<T, FetchError>
    where
        F: FnMut(Region) -> Fut,
        Fut: Future<Output = Result<T, FetchError>>,
    {
        let region = self.detect_region();
        match work(region).await {
            Ok(value) => Ok(value),
            Err(e) if e.is_abort() || region == Region::Global => Err(e),
            Err(e) => {
                tracing::warn!(region = %region, error = %e, "Regional attempt failed, retrying with global");
                work(Region::Global).await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn config(force: Option<Region>, country: Option<&str>) -> RegionConfig {
        RegionConfig {
            force,
            country: country.map(str::to_string),
        }
    }

    #[test]
    fn test_resolution_order() {
        assert_eq!(
            RegionRouter::resolve(&config(Some(Region::Asia), Some("DE")), Some("en_US.UTF-8")),
            Region::Asia
        );
        assert_eq!(RegionRouter::resolve(&config(None, Some("DE")), Some("en_US.UTF-8")), Region::Eu);
        assert_eq!(RegionRouter::resolve(&config(None, None), Some("pt_BR.UTF-8")), Region::Latam);
        assert_eq!(RegionRouter::resolve(&config(None, None), Some("C")), Region::Global);
        assert_eq!(RegionRouter::resolve(&config(None, None), None), Region::Global);
    }

    #[test]
    fn test_locale_country() {
        assert_eq!(locale_country("de_DE.UTF-8"), Some("DE"));
        assert_eq!(locale_country("sr_RS@latin"), Some("RS"));
        assert_eq!(locale_country("POSIX"), None);
    }

    #[test]
    fn test_migrate_and_durations() {
        let router = RegionRouter::new(Region::Eu, CacheConfig::default());
        assert_eq!(router.cache_duration(DataDomain::Weather), Duration::from_secs(600));

        assert_eq!(router.migrate(Region::Us), Region::Eu);
        assert_eq!(router.detect_region(), Region::Us);
    }

    #[tokio::test]
    async fn test_retry_with_fallback() {
        let router = RegionRouter::new(Region::Eu, CacheConfig::default());
        let calls = &AtomicU32::new(0);

        let region = router
            .retry_with_fallback(|region| async move {
                calls.fetch_add(1, Ordering::SeqCst);
                if region == Region::Global {
                    Ok(region)
                } else {
                    Err(FetchError::Network { service: "x".into(), message: "down".into() })
                }
            })
            .await
            .unwrap();
        assert_eq!(region, Region::Global);
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        let err = router
            .retry_with_fallback(|_| async { Err::<(), _>(FetchError::Aborted) })
            .await
            .unwrap_err();
        assert!(err.is_abort());
    }
}
