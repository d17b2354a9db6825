//! Geographic primitives: points, bounding boxes, Web Mercator tiles.

use std::f64::consts::PI;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Web Mercator latitude limit.
pub const MAX_LAT: f64 = 85.051_128_78;

/// Highest zoom level accepted for tile math.
pub const MAX_ZOOM: u8 = 22;

const EARTH_RADIUS_KM: f64 = 6371.0;

/// A WGS84 point in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLon {
    pub lat: f64,
    pub lon: f64,
}

impl LatLon {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }
}

/// Axis-aligned bounding box, normalised so south <= north and west <= east.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub south: f64,
    pub west: f64,
    pub north: f64,
    pub east: f64,
}

impl Bounds {
    /// Build from any two opposite corners.
    pub fn from_corners(a: LatLon, b: LatLon) -> Self {
        Self {
            south: a.lat.min(b.lat),
            west: a.lon.min(b.lon),
            north: a.lat.max(b.lat),
            east: a.lon.max(b.lon),
        }
    }

    /// Box of `radius_km` around `center`, clamped to the Mercator range.
    pub fn around(center: LatLon, radius_km: f64) -> Self {
        let dlat = (radius_km / EARTH_RADIUS_KM).to_degrees();
        let cos_lat = center.lat.to_radians().cos().max(1e-6);
        let dlon = (radius_km / (EARTH_RADIUS_KM * cos_lat)).to_degrees();
        Self {
            south: (center.lat - dlat).max(-MAX_LAT),
            west: (center.lon - dlon).max(-180.0),
            north: (center.lat + dlat).min(MAX_LAT),
            east: (center.lon + dlon).min(180.0),
        }
    }
}

/// A slippy-map tile address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TileCoord {
    pub z: u8,
    pub x: u32,
    pub y: u32,
}

impl TileCoord {
    /// Tile containing the given point at `zoom`.
    pub fn containing(point: LatLon, zoom: u8) -> Self {
        let zoom = zoom.min(MAX_ZOOM);
        let n = 2.0_f64.powi(zoom as i32);
        let max_index = (n as u32).saturating_sub(1);

        let lat = point.lat.clamp(-MAX_LAT, MAX_LAT);
        let lon = point.lon.clamp(-180.0, 180.0);

        let x = ((lon + 180.0) / 360.0 * n) as u32;
        let lat_rad = lat * PI / 180.0;
        let y = ((1.0 - lat_rad.tan().asinh() / PI) / 2.0 * n) as u32;

        Self {
            z: zoom,
            x: x.min(max_index),
            y: y.min(max_index),
        }
    }

    /// North-west corner of this tile.
    pub fn north_west(&self) -> LatLon {
        let n = 2.0_f64.powi(self.z as i32);
        let lon = self.x as f64 / n * 360.0 - 180.0;
        let lat = (PI * (1.0 - 2.0 * self.y as f64 / n)).sinh().atan().to_degrees();
        LatLon { lat, lon }
    }
}

impl fmt::Display for TileCoord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.z, self.x, self.y)
    }
}
