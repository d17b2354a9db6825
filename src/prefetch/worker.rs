//! Long-lived background worker for tile downloads.
//!
//! # Responsibilities
//! - Process channel messages strictly in arrival order on one task
//! - Run each download session on its own task, batch by batch
//! - Report progress after every batch and a terminal message per session
//! - Manage the named persistent caches (clear, size)
//!
//! # Session Lifecycle
//! ```text
//! PREFETCH_TILES → downloading ─┬─ all batches done  → PREFETCH_COMPLETE
//!                               ├─ aborted           → PREFETCH_FAILED (cancelled)
//!                               ├─ worker shutdown   → PREFETCH_FAILED (shutting down)
//!                               ├─ task panicked     → PREFETCH_FAILED
//!                               └─ duplicate id      → PREFETCH_FAILED
//! ```
//!
//! # Design Decisions
//! - Cancellation is batch-granular: the token is checked before each batch
//!   and after the last one, never inside a batch
//! - A failed tile is counted and skipped; it never aborts its batch
//! - No pre-check of the store: re-running a session re-downloads and
//!   overwrites identical entries

use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures_util::future::join_all;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::config::PrefetchConfig;
use crate::error::FetchError;
use crate::lifecycle::Shutdown;
use crate::observability::metrics;
use crate::prefetch::fetcher::TileFetcher;
use crate::prefetch::messages::{
    CacheName, ClientMessage, Envelope, WorkerMessage, CANCELLED_BY_USER, WORKER_SHUTTING_DOWN,
};
use crate::prefetch::store::TileStore;

/// Inbound queue depth before senders wait.
const INBOX_CAPACITY: usize = 64;

pub struct PrefetchWorker {
    store: Arc<dyn TileStore>,
    fetcher: Arc<dyn TileFetcher>,
    batch_size: usize,
    allowed_schemes: Vec<String>,
    sessions: Arc<DashMap<String, CancellationToken>>,
    shutdown: Shutdown,
}

/// Everything a session task needs, detached from the worker.
struct SessionTask {
    session_id: String,
    client_id: String,
    tiles: Vec<String>,
    token: CancellationToken,
    reply: mpsc::UnboundedSender<WorkerMessage>,
    store: Arc<dyn TileStore>,
    fetcher: Arc<dyn TileFetcher>,
    batch_size: usize,
    shutdown: Shutdown,
}

impl PrefetchWorker {
    pub fn new(
        config: &PrefetchConfig,
        store: Arc<dyn TileStore>,
        fetcher: Arc<dyn TileFetcher>,
        shutdown: Shutdown,
    ) -> Self {
        Self {
            store,
            fetcher,
            batch_size: config.batch_size.max(1),
            allowed_schemes: config.allowed_origin_schemes.clone(),
            sessions: Arc::new(DashMap::new()),
            shutdown,
        }
    }

    /// Start the worker loop on its own task.
    pub fn spawn(self) -> (mpsc::Sender<Envelope>, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(INBOX_CAPACITY);
        let handle = tokio::spawn(self.run(rx));
        (tx, handle)
    }

    /// Process messages until shutdown or until every sender is gone.
    pub async fn run(self, mut inbox: mpsc::Receiver<Envelope>) {
        let mut shutdown_rx = self.shutdown.subscribe();
        tracing::info!(batch_size = self.batch_size, "Prefetch worker started");

        loop {
            tokio::select! {
                biased;

                _ = shutdown_rx.recv() => {
                    tracing::info!("Prefetch worker shutting down");
                    break;
                }
                envelope = inbox.recv() => match envelope {
                    Some(envelope) => self.handle(envelope).await,
                    None => break,
                },
            }
        }

        for session in self.sessions.iter() {
            session.value().cancel();
        }
        tracing::info!(active_sessions = self.sessions.len(), "Prefetch worker stopped");
    }

    fn origin_allowed(&self, origin: &str) -> bool {
        Url::parse(origin)
            .map(|url| self.allowed_schemes.iter().any(|s| s == url.scheme()))
            .unwrap_or(false)
    }

    async fn handle(&self, envelope: Envelope) {
        let Envelope { origin, reply, message } = envelope;
        if !self.origin_allowed(&origin) {
            tracing::warn!(origin = %origin, "Dropping message from disallowed origin");
            return;
        }

        match message {
            ClientMessage::PrefetchTiles {
                tiles,
                client_id,
                session_id,
            } => self.start_session(tiles, client_id, session_id, reply),
            ClientMessage::AbortPrefetch { session_id } => match self.sessions.get(&session_id) {
                Some(token) => {
                    tracing::info!(session_id = %session_id, "Abort requested");
                    token.cancel();
                }
                None => tracing::warn!(session_id = %session_id, "Abort for unknown session ignored"),
            },
            ClientMessage::ClearCache { cache_name } => match cache_name.parse::<CacheName>() {
                Ok(name) => match self.store.clear(name).await {
                    Ok(()) => {
                        tracing::info!(cache = %name, "Cache cleared");
                        let _ = reply.send(WorkerMessage::CacheCleared { cache_name });
                    }
                    Err(e) => tracing::error!(cache = %name, error = %e, "Failed to clear cache"),
                },
                Err(_) => tracing::warn!(cache = %cache_name, "Refusing to clear unknown cache"),
            },
            ClientMessage::GetCacheSize => match self.store.total_size().await {
                Ok(size) => {
                    let _ = reply.send(WorkerMessage::CacheSize { size });
                }
                Err(e) => tracing::error!(error = %e, "Failed to measure cache size"),
            },
        }
    }

    fn start_session(
        &self,
        tiles: Vec<String>,
        client_id: String,
        session_id: String,
        reply: mpsc::UnboundedSender<WorkerMessage>,
    ) {
        if tiles.is_empty() {
            let _ = reply.send(WorkerMessage::PrefetchComplete {
                session_id,
                cached: 0,
                total: 0,
                bytes_downloaded: 0,
            });
            return;
        }

        let token = match self.sessions.entry(session_id.clone()) {
            Entry::Occupied(_) => {
                tracing::warn!(session_id = %session_id, "Duplicate session rejected");
                let _ = reply.send(WorkerMessage::PrefetchFailed {
                    error: format!("Session {} is already active", session_id),
                    session_id,
                });
                return;
            }
            Entry::Vacant(slot) => slot.insert(self.shutdown.child_token()).clone(),
        };

        let task = SessionTask {
            session_id,
            client_id,
            tiles,
            token,
            reply,
            store: Arc::clone(&self.store),
            fetcher: Arc::clone(&self.fetcher),
            batch_size: self.batch_size,
            shutdown: self.shutdown.clone(),
        };
        let sessions = Arc::clone(&self.sessions);
        tokio::spawn(async move {
            let session_id = task.session_id.clone();
            let reply = task.reply.clone();
            // The session always ends with a terminal message and frees its id.
            let outcome = match tokio::spawn(task.run()).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    tracing::error!(session_id = %session_id, error = %e, "Prefetch session task failed");
                    WorkerMessage::PrefetchFailed {
                        session_id: session_id.clone(),
                        error: format!("Prefetch session failed: {}", e),
                    }
                }
            };
            sessions.remove(&session_id);
            let _ = reply.send(outcome);
        });
    }
}

impl SessionTask {
    async fn run(self) -> WorkerMessage {
        let total = self.tiles.len();
        let mut cached = 0;
        let mut bytes_downloaded = 0u64;
        tracing::info!(
            session_id = %self.session_id,
            client_id = %self.client_id,
            total,
            "Prefetch session started"
        );

        for batch in self.tiles.chunks(self.batch_size) {
            if self.token.is_cancelled() {
                return self.cancelled(cached);
            }

            let results = join_all(batch.iter().map(|url| self.fetch_and_store(url))).await;
            for (url, result) in batch.iter().zip(results) {
                match result {
                    Ok(bytes) => {
                        cached += 1;
                        bytes_downloaded += bytes;
                        metrics::record_prefetch_tile(true);
                        metrics::record_prefetch_bytes(bytes);
                    }
                    Err(e) => {
                        metrics::record_prefetch_tile(false);
                        tracing::debug!(session_id = %self.session_id, url = %url, error = %e, "Tile failed");
                    }
                }
            }

            let _ = self.reply.send(WorkerMessage::PrefetchProgress {
                session_id: self.session_id.clone(),
                cached,
                total,
                bytes_downloaded,
            });
        }

        if self.token.is_cancelled() {
            return self.cancelled(cached);
        }

        tracing::info!(session_id = %self.session_id, cached, total, bytes_downloaded, "Prefetch session complete");
        WorkerMessage::PrefetchComplete {
            session_id: self.session_id.clone(),
            cached,
            total,
            bytes_downloaded,
        }
    }

    fn cancelled(&self, cached: usize) -> WorkerMessage {
        let error = if self.shutdown.is_triggered() {
            WORKER_SHUTTING_DOWN
        } else {
            CANCELLED_BY_USER
        };
        tracing::info!(session_id = %self.session_id, cached, reason = %error, "Prefetch session cancelled");
        WorkerMessage::PrefetchFailed {
            session_id: self.session_id.clone(),
            error: error.to_string(),
        }
    }

    async fn fetch_and_store(&self, url: &str) -> Result<u64, FetchError> {
        let data = self.fetcher.fetch(url).await?;
        let len = data.len() as u64;
        self.store
            .put(CacheName::Tiles, url, data)
            .await
            .map_err(|e| FetchError::Storage(e.to_string()))?;
        Ok(len)
    }
}
