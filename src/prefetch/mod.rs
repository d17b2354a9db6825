//! Background prefetch channel.
//!
//! # Data Flow
//! ```text
//! PrefetchClient ──Envelope{origin, reply, ClientMessage}──▶ mpsc ──▶ PrefetchWorker
//!       ▲                                                              │
//!       │                                                    spawn per session
//!       │                                                              ▼
//!  SessionHandle ◀──────── WorkerMessage (progress, result) ──── batch loop
//!                                                                      │
//!                                                 TileFetcher ──▶ TileStore("tiles")
//! ```

pub mod area;
pub mod client;
pub mod estimate;
pub mod fetcher;
pub mod messages;
pub mod store;
pub mod worker;

use thiserror::Error;

pub use area::TileArea;
pub use client::{PrefetchClient, PrefetchOutcome, Progress, SessionAborter, SessionHandle};
pub use estimate::{estimate_download, estimate_tile_count, DownloadEstimate};
pub use fetcher::{HttpTileFetcher, TileFetcher};
pub use messages::{CacheName, ClientMessage, Envelope, WorkerMessage, CANCELLED_BY_USER, WORKER_SHUTTING_DOWN};
pub use store::{DiskTileStore, MemoryTileStore, StoreError, TileStore};
pub use worker::PrefetchWorker;

/// Errors surfaced to prefetch callers.
#[derive(Debug, Error)]
pub enum PrefetchError {
    #[error("Estimated download of {estimated_bytes} bytes exceeds the {max_bytes} byte limit")]
    TooLarge { estimated_bytes: u64, max_bytes: u64 },

    #[error("Invalid area: {0}")]
    InvalidArea(String),

    #[error("Prefetch worker is not running")]
    WorkerClosed,

    #[error("Prefetch worker did not reply")]
    NoReply,
}
