//! Client side of the prefetch channel.

use tokio::sync::mpsc;
use uuid::Uuid;

use crate::config::PrefetchConfig;
use crate::prefetch::area::TileArea;
use crate::prefetch::estimate::{estimate_download, DownloadEstimate};
use crate::prefetch::messages::{CacheName, ClientMessage, Envelope, WorkerMessage, CANCELLED_BY_USER};
use crate::prefetch::PrefetchError;

/// Counters reported after each batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Progress {
    pub cached: usize,
    pub total: usize,
    pub bytes_downloaded: u64,
}

/// How a session ended. Cancellation is an outcome, not an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PrefetchOutcome {
    Completed(Progress),
    Cancelled,
    Failed(String),
}

/// Sends requests to a running `PrefetchWorker`.
#[derive(Clone)]
pub struct PrefetchClient {
    tx: mpsc::Sender<Envelope>,
    origin: String,
    client_id: String,
    config: PrefetchConfig,
}

impl PrefetchClient {
    pub fn new(tx: mpsc::Sender<Envelope>, origin: impl Into<String>, config: PrefetchConfig) -> Self {
        Self {
            tx,
            origin: origin.into(),
            client_id: Uuid::new_v4().to_string(),
            config,
        }
    }

    async fn send(&self, message: ClientMessage) -> Result<mpsc::UnboundedReceiver<WorkerMessage>, PrefetchError> {
        let (reply, rx) = mpsc::unbounded_channel();
        self.tx
            .send(Envelope {
                origin: self.origin.clone(),
                reply,
                message,
            })
            .await
            .map_err(|_| PrefetchError::WorkerClosed)?;
        Ok(rx)
    }

    /// Estimated size of downloading `area`.
    pub fn estimate(&self, area: &TileArea) -> DownloadEstimate {
        estimate_download(area.radius_km, area.min_zoom, area.max_zoom, self.config.average_tile_bytes)
    }

    /// Start downloading an explicit list of tile URLs.
    pub async fn prefetch_tiles(&self, tiles: Vec<String>) -> Result<SessionHandle, PrefetchError> {
        let session_id = Uuid::new_v4().to_string();
        let events = self
            .send(ClientMessage::PrefetchTiles {
                tiles,
                client_id: self.client_id.clone(),
                session_id: session_id.clone(),
            })
            .await?;

        Ok(SessionHandle {
            aborter: SessionAborter {
                tx: self.tx.clone(),
                origin: self.origin.clone(),
                session_id,
            },
            events,
            outcome: None,
        })
    }

    /// Exact size of downloading `area`, counted from the tile grid.
    pub fn exact_size(&self, area: &TileArea) -> DownloadEstimate {
        DownloadEstimate::for_tiles(area.tile_count(), self.config.average_tile_bytes)
    }

    /// Enforce the cap on both the estimate and the exact tile count, then
    /// download every tile of `area`.
    pub async fn prefetch_area(&self, area: &TileArea) -> Result<SessionHandle, PrefetchError> {
        self.estimate(area).check_cap(self.config.max_download_bytes)?;
        // The heuristic undercounts near the poles.
        let exact = self.exact_size(area);
        exact.check_cap(self.config.max_download_bytes)?;
        tracing::info!(
            tiles = exact.tiles,
            megabytes = exact.megabytes(),
            "Submitting area prefetch"
        );
        self.prefetch_tiles(area.urls(&self.config.tile_url_template)).await
    }

    pub async fn clear_cache(&self, cache: CacheName) -> Result<(), PrefetchError> {
        let mut rx = self
            .send(ClientMessage::ClearCache {
                cache_name: cache.to_string(),
            })
            .await?;
        match rx.recv().await {
            Some(WorkerMessage::CacheCleared { .. }) => Ok(()),
            _ => Err(PrefetchError::NoReply),
        }
    }

    /// Bytes held across all named caches.
    pub async fn cache_size(&self) -> Result<u64, PrefetchError> {
        let mut rx = self.send(ClientMessage::GetCacheSize).await?;
        match rx.recv().await {
            Some(WorkerMessage::CacheSize { size }) => Ok(size),
            _ => Err(PrefetchError::NoReply),
        }
    }
}

/// Cancels one session; cheap to clone and usable while the handle is borrowed.
#[derive(Debug, Clone)]
pub struct SessionAborter {
    tx: mpsc::Sender<Envelope>,
    origin: String,
    session_id: String,
}

impl SessionAborter {
    pub async fn abort(&self) -> Result<(), PrefetchError> {
        // The worker never replies to aborts.
        let (reply, _) = mpsc::unbounded_channel();
        self.tx
            .send(Envelope {
                origin: self.origin.clone(),
                reply,
                message: ClientMessage::AbortPrefetch {
                    session_id: self.session_id.clone(),
                },
            })
            .await
            .map_err(|_| PrefetchError::WorkerClosed)
    }
}

/// A running download session.
pub struct SessionHandle {
    aborter: SessionAborter,
    events: mpsc::UnboundedReceiver<WorkerMessage>,
    outcome: Option<PrefetchOutcome>,
}

impl SessionHandle {
    pub fn session_id(&self) -> &str {
        &self.aborter.session_id
    }

    pub fn aborter(&self) -> SessionAborter {
        self.aborter.clone()
    }

    pub async fn abort(&self) -> Result<(), PrefetchError> {
        self.aborter.abort().await
    }

    /// Next progress report, or `None` once the session has ended.
    pub async fn progress(&mut self) -> Option<Progress> {
        if self.outcome.is_some() {
            return None;
        }
        loop {
            let outcome = match self.events.recv().await {
                Some(WorkerMessage::PrefetchProgress {
                    cached,
                    total,
                    bytes_downloaded,
                    ..
                }) => {
                    return Some(Progress {
                        cached,
                        total,
                        bytes_downloaded,
                    })
                }
                Some(WorkerMessage::PrefetchComplete {
                    cached,
                    total,
                    bytes_downloaded,
                    ..
                }) => PrefetchOutcome::Completed(Progress {
                    cached,
                    total,
                    bytes_downloaded,
                }),
                Some(WorkerMessage::PrefetchFailed { error, .. }) if error == CANCELLED_BY_USER => {
                    PrefetchOutcome::Cancelled
                }
                Some(WorkerMessage::PrefetchFailed { error, .. }) => PrefetchOutcome::Failed(error),
                Some(other) => {
                    tracing::debug!(message = ?other, "Ignoring unrelated worker message");
                    continue;
                }
                None => PrefetchOutcome::Failed("Prefetch worker closed the session".to_string()),
            };
            self.outcome = Some(outcome);
            return None;
        }
    }

    /// Wait for the session to end, discarding progress.
    pub async fn wait(mut self) -> PrefetchOutcome {
        while self.progress().await.is_some() {}
        self.outcome
            .unwrap_or_else(|| PrefetchOutcome::Failed("Prefetch worker closed the session".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FetchError;
    use crate::geo::LatLon;
    use crate::lifecycle::Shutdown;
    use crate::prefetch::fetcher::TileFetcher;
    use crate::prefetch::store::MemoryTileStore;
    use crate::prefetch::PrefetchWorker;
    use async_trait::async_trait;
    use bytes::Bytes;
    use std::sync::Arc;

    struct EchoFetcher;

    #[async_trait]
    impl TileFetcher for EchoFetcher {
        async fn fetch(&self, url: &str) -> Result<Bytes, FetchError> {
            Ok(Bytes::copy_from_slice(url.as_bytes()))
        }
    }

    fn client(config: PrefetchConfig) -> PrefetchClient {
        let worker = PrefetchWorker::new(
            &config,
            Arc::new(MemoryTileStore::new()),
            Arc::new(EchoFetcher),
            Shutdown::new(),
        );
        let (tx, _handle) = worker.spawn();
        PrefetchClient::new(tx, "app://navigator", config)
    }

    #[tokio::test]
    async fn test_session_completes_with_progress() {
        let client = client(PrefetchConfig {
            batch_size: 2,
            ..PrefetchConfig::default()
        });
        let tiles: Vec<String> = (0..5).map(|i| format!("https://t/{i}")).collect();
        let mut handle = client.prefetch_tiles(tiles).await.unwrap();

        let mut seen = Vec::new();
        while let Some(p) = handle.progress().await {
            seen.push(p.cached);
        }
        assert_eq!(seen, vec![2, 4, 5]);

        let outcome = handle.wait().await;
        assert!(matches!(outcome, PrefetchOutcome::Completed(Progress { cached: 5, total: 5, .. })));
        assert!(client.cache_size().await.unwrap() > 0);

        client.clear_cache(CacheName::Tiles).await.unwrap();
        assert_eq!(client.cache_size().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_area_over_cap_is_rejected_before_submission() {
        let client = client(PrefetchConfig {
            max_download_bytes: 1024,
            ..PrefetchConfig::default()
        });
        let area = TileArea::new(LatLon::new(52.5, 13.4), 10.0, 10, 14).unwrap();

        let err = client.prefetch_area(&area).await.err().unwrap();
        assert!(matches!(err, PrefetchError::TooLarge { .. }));
        assert_eq!(client.cache_size().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_polar_area_checked_against_exact_count() {
        let config = PrefetchConfig::default();
        let client = client(config.clone());
        let area = TileArea::new(LatLon::new(84.0, 10.0), 2.0, 15, 17).unwrap();

        let estimate = client.estimate(&area);
        assert!(estimate.check_cap(config.max_download_bytes).is_ok());
        assert!(client.exact_size(&area).tiles > estimate.tiles * 3);

        let err = client.prefetch_area(&area).await.err().unwrap();
        assert!(matches!(err, PrefetchError::TooLarge { .. }));
        assert_eq!(client.cache_size().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_area_download_uses_template() {
        let client = client(PrefetchConfig {
            tile_url_template: "https://tiles.test/{z}/{x}/{y}.png".into(),
            ..PrefetchConfig::default()
        });
        let area = TileArea::new(LatLon::new(52.5, 13.4), 1.0, 8, 9).unwrap();
        let expected = area.tiles().len();

        let outcome = client.prefetch_area(&area).await.unwrap().wait().await;
        match outcome {
            PrefetchOutcome::Completed(p) => assert_eq!(p.cached, expected),
            other => panic!("unexpected outcome: {other:?}"),
        }
    }
}
