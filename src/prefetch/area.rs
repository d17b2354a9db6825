//! Exact tile enumeration for a circular-ish download area.

use serde::{Deserialize, Serialize};

use crate::geo::{Bounds, LatLon, TileCoord, MAX_ZOOM};
use crate::prefetch::PrefetchError;
use crate::provider::http::expand_template;

/// Square area of `radius_km` around `center`, over a zoom range.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TileArea {
    pub center: LatLon,
    pub radius_km: f64,
    pub min_zoom: u8,
    pub max_zoom: u8,
}

impl TileArea {
    pub fn new(center: LatLon, radius_km: f64, min_zoom: u8, max_zoom: u8) -> Result<Self, PrefetchError> {
        if !(radius_km > 0.0 && radius_km.is_finite()) {
            return Err(PrefetchError::InvalidArea(format!("radius must be positive, got {}", radius_km)));
        }
        if min_zoom > max_zoom || max_zoom > MAX_ZOOM {
            return Err(PrefetchError::InvalidArea(format!(
                "zoom range {}..={} must be ordered and at most {}",
                min_zoom, max_zoom, MAX_ZOOM
            )));
        }
        Ok(Self {
            center,
            radius_km,
            min_zoom,
            max_zoom,
        })
    }

    /// North-west and south-east corner tiles for each zoom.
    fn corners(&self) -> impl Iterator<Item = (TileCoord, TileCoord)> {
        let bounds = Bounds::around(self.center, self.radius_km);
        (self.min_zoom..=self.max_zoom).map(move |z| {
            (
                TileCoord::containing(LatLon::new(bounds.north, bounds.west), z),
                TileCoord::containing(LatLon::new(bounds.south, bounds.east), z),
            )
        })
    }

    /// Exact number of tiles `tiles()` would return, without enumerating them.
    pub fn tile_count(&self) -> u64 {
        self.corners().fold(0u64, |total, (nw, se)| {
            let cols = u64::from(se.x.saturating_sub(nw.x)) + 1;
            let rows = u64::from(se.y.saturating_sub(nw.y)) + 1;
            total.saturating_add(cols.saturating_mul(rows))
        })
    }

    /// Every tile covering the area, zoom by zoom, row-major.
    ///
    /// Allocates one entry per tile; bound the area with `tile_count` first.
    pub fn tiles(&self) -> Vec<TileCoord> {
        let mut tiles = Vec::new();
        for (nw, se) in self.corners() {
            let z = nw.z;
            for y in nw.y..=se.y {
                for x in nw.x..=se.x {
                    tiles.push(TileCoord { z, x, y });
                }
            }
        }
        tiles
    }

    /// Tile URLs from a `{z}`/`{x}`/`{y}` template.
    pub fn urls(&self, template: &str) -> Vec<String> {
        self.tiles()
            .into_iter()
            .map(|t| {
                expand_template(
                    template,
                    &[("z", t.z.to_string()), ("x", t.x.to_string()), ("y", t.y.to_string())],
                )
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_small_area_single_tile_at_low_zoom() {
        let area = TileArea::new(LatLon::new(52.52, 13.405), 1.0, 5, 5).unwrap();
        let tiles = area.tiles();
        assert_eq!(tiles, vec![TileCoord::containing(LatLon::new(52.52, 13.405), 5)]);
    }

    #[test]
    fn test_tiles_grow_with_zoom_and_cover_center() {
        let center = LatLon::new(48.8566, 2.3522);
        let area = TileArea::new(center, 5.0, 10, 13).unwrap();
        let tiles = area.tiles();

        let at = |z: u8| tiles.iter().filter(|t| t.z == z).count();
        assert!(at(13) > at(10));
        for z in 10..=13 {
            assert!(tiles.contains(&TileCoord::containing(center, z)));
        }
    }

    #[test]
    fn test_tile_count_matches_enumeration() {
        for (lat, radius, min, max) in [(52.52, 5.0, 10, 13), (84.0, 2.0, 12, 14), (-33.9, 0.5, 3, 16)] {
            let area = TileArea::new(LatLon::new(lat, 18.4), radius, min, max).unwrap();
            assert_eq!(area.tile_count(), area.tiles().len() as u64);
        }
    }

    #[test]
    fn test_tile_count_of_whole_world_without_enumerating() {
        let area = TileArea::new(LatLon::new(0.0, 0.0), 20_000.0, 0, MAX_ZOOM).unwrap();
        // Σ 4^z for z in 0..=22
        let world: u64 = (0..=u32::from(MAX_ZOOM)).map(|z| 4u64.pow(z)).sum();
        assert_eq!(area.tile_count(), world);
    }

    #[test]
    fn test_urls_and_validation() {
        let area = TileArea::new(LatLon::new(0.1, 0.1), 1.0, 1, 1).unwrap();
        assert_eq!(area.urls("https://t/{z}/{x}/{y}.png"), vec!["https://t/1/1/0.png"]);

        assert!(TileArea::new(LatLon::new(0.0, 0.0), 0.0, 1, 2).is_err());
        assert!(TileArea::new(LatLon::new(0.0, 0.0), 1.0, 9, 3).is_err());
        assert!(TileArea::new(LatLon::new(0.0, 0.0), 1.0, 1, 30).is_err());
    }
}
