//! Download size estimation.
//!
//! A closed-form heuristic, not a tile-grid computation:
//! `tiles ≈ Σ_z 2^(z−10) × (2 × radius_km)²`. Results are surfaced as
//! estimates and checked against an advisory byte cap before submission.

use serde::Serialize;

use crate::prefetch::PrefetchError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DownloadEstimate {
    pub tiles: u64,
    pub bytes: u64,
}

impl DownloadEstimate {
    /// Size of downloading exactly `tiles` tiles.
    pub fn for_tiles(tiles: u64, average_tile_bytes: u64) -> Self {
        Self {
            tiles,
            bytes: tiles.saturating_mul(average_tile_bytes),
        }
    }

    pub fn megabytes(&self) -> f64 {
        self.bytes as f64 / (1024.0 * 1024.0)
    }

    /// Reject estimates above `max_bytes`.
    pub fn check_cap(&self, max_bytes: u64) -> Result<(), PrefetchError> {
        if self.bytes > max_bytes {
            return Err(PrefetchError::TooLarge {
                estimated_bytes: self.bytes,
                max_bytes,
            });
        }
        Ok(())
    }
}

pub fn estimate_tile_count(radius_km: f64, min_zoom: u8, max_zoom: u8) -> u64 {
    let side = 2.0 * radius_km.max(0.0);
    let total: f64 = (min_zoom..=max_zoom)
        .map(|z| 2.0_f64.powi(z as i32 - 10) * side * side)
        .sum();
    total.ceil() as u64
}

pub fn estimate_download(radius_km: f64, min_zoom: u8, max_zoom: u8, average_tile_bytes: u64) -> DownloadEstimate {
    DownloadEstimate::for_tiles(estimate_tile_count(radius_km, min_zoom, max_zoom), average_tile_bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_formula() {
        // z10: 1 × 10² = 100, z11: 2 × 100 = 200
        assert_eq!(estimate_tile_count(5.0, 10, 11), 300);
        // z9 contributes half a tile per km², rounded up at the end.
        assert_eq!(estimate_tile_count(0.5, 9, 9), 1);
        assert_eq!(estimate_tile_count(5.0, 12, 11), 0);
    }

    #[test]
    fn test_cap() {
        let estimate = estimate_download(5.0, 10, 11, 15 * 1024);
        assert_eq!(estimate.bytes, 300 * 15 * 1024);
        assert!(estimate.check_cap(100 * 1024 * 1024).is_ok());

        let big = estimate_download(50.0, 10, 16, 15 * 1024);
        assert!(matches!(big.check_cap(100 * 1024 * 1024), Err(PrefetchError::TooLarge { .. })));
    }
}
