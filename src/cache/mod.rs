//! In-memory caching of provider results.
//!
//! # Data Flow
//! ```text
//! get(key, fetcher)
//!     → fresh entry?          → return (hit)
//!     → fetch in flight?      → await the same shared future (dedup)
//!     → otherwise             → run fetcher, store {data, now, region}
//!     → fetch failed?         → any entry for key, even expired (stale)
//! ```

pub mod regional;

pub use regional::{CacheEntry, CacheStats, RegionalCache};
