//! Worker channel protocol.
//!
//! Messages are plain serde enums tagged by `type` so they can cross a
//! process boundary unchanged:
//!
//! ```text
//! {"type":"PREFETCH_TILES","tiles":[…],"clientId":"c1","sessionId":"s1"}
//! {"type":"PREFETCH_PROGRESS","sessionId":"s1","cached":50,"total":120,"bytesDownloaded":761234}
//! ```

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// `PREFETCH_FAILED` error text for a session stopped by an abort.
pub const CANCELLED_BY_USER: &str = "Prefetch cancelled by user";

/// `PREFETCH_FAILED` error text for a session stopped by worker shutdown.
pub const WORKER_SHUTTING_DOWN: &str = "Prefetch worker shutting down";

/// Requests from a client to the worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClientMessage {
    #[serde(rename_all = "camelCase")]
    PrefetchTiles {
        tiles: Vec<String>,
        client_id: String,
        session_id: String,
    },
    #[serde(rename_all = "camelCase")]
    AbortPrefetch { session_id: String },
    #[serde(rename_all = "camelCase")]
    ClearCache { cache_name: String },
    GetCacheSize,
}

/// Notifications from the worker to a client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkerMessage {
    #[serde(rename_all = "camelCase")]
    PrefetchProgress {
        session_id: String,
        cached: usize,
        total: usize,
        bytes_downloaded: u64,
    },
    #[serde(rename_all = "camelCase")]
    PrefetchComplete {
        session_id: String,
        cached: usize,
        total: usize,
        bytes_downloaded: u64,
    },
    #[serde(rename_all = "camelCase")]
    PrefetchFailed { session_id: String, error: String },
    #[serde(rename_all = "camelCase")]
    CacheCleared { cache_name: String },
    #[serde(rename_all = "camelCase")]
    CacheSize { size: u64 },
}

impl WorkerMessage {
    /// Session the message belongs to, if any.
    pub fn session_id(&self) -> Option<&str> {
        match self {
            WorkerMessage::PrefetchProgress { session_id, .. }
            | WorkerMessage::PrefetchComplete { session_id, .. }
            | WorkerMessage::PrefetchFailed { session_id, .. } => Some(session_id),
            _ => None,
        }
    }
}

/// A request with its origin and the channel replies go to.
#[derive(Debug)]
pub struct Envelope {
    /// URL of the sender, checked against the allowed schemes.
    pub origin: String,
    pub reply: mpsc::UnboundedSender<WorkerMessage>,
    pub message: ClientMessage,
}

/// Named persistent caches the worker manages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheName {
    Tiles,
    Static,
    Api,
}

impl CacheName {
    pub const ALL: [CacheName; 3] = [CacheName::Tiles, CacheName::Static, CacheName::Api];

    pub fn as_str(&self) -> &'static str {
        match self {
            CacheName::Tiles => "tiles",
            CacheName::Static => "static",
            CacheName::Api => "api",
        }
    }
}

impl fmt::Display for CacheName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CacheName {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CacheName::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| format!("unknown cache '{}'", s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_wire_format() {
        let json = r#"{"type":"PREFETCH_TILES","tiles":["https://t/1/0/0.png"],"clientId":"c1","sessionId":"s1"}"#;
        let msg: ClientMessage = serde_json::from_str(json).unwrap();
        assert_eq!(
            msg,
            ClientMessage::PrefetchTiles {
                tiles: vec!["https://t/1/0/0.png".into()],
                client_id: "c1".into(),
                session_id: "s1".into(),
            }
        );

        let msg: ClientMessage = serde_json::from_str(r#"{"type":"GET_CACHE_SIZE"}"#).unwrap();
        assert_eq!(msg, ClientMessage::GetCacheSize);
    }

    #[test]
    fn test_worker_wire_format() {
        let msg = WorkerMessage::PrefetchProgress {
            session_id: "s1".into(),
            cached: 50,
            total: 120,
            bytes_downloaded: 1024,
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "PREFETCH_PROGRESS");
        assert_eq!(json["bytesDownloaded"], 1024);
        assert_eq!(json["sessionId"], "s1");
        assert_eq!(msg.session_id(), Some("s1"));

        let json = serde_json::to_value(WorkerMessage::CacheCleared { cache_name: "tiles".into() }).unwrap();
        assert_eq!(json["cacheName"], "tiles");
    }

    #[test]
    fn test_cache_names() {
        assert_eq!("static".parse::<CacheName>().unwrap(), CacheName::Static);
        assert!("secrets".parse::<CacheName>().is_err());
    }
}
