//! Upstream data providers.
//!
//! # Responsibilities
//! - Define the `Provider` capability trait (one fetch per data domain)
//! - Define the domain payloads (weather, cameras, traffic, tiles)
//! - Provide a configuration-driven HTTP/JSON adapter
//!
//! # Design Decisions
//! - Providers are stateless request adapters; they own no cache state
//! - A provider that does not serve a domain answers `Unsupported`,
//!   which the failover walk treats as "try the next one"

pub mod http;
pub mod models;

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::{FetchError, FetchResult};
use crate::geo::{LatLon, TileCoord};

pub use http::HttpProvider;
pub use models::{CameraKind, SpeedCamera, TrafficFlow, TrafficSegment, WeatherNow};

/// The fixed set of data domains the layer serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataDomain {
    Tiles,
    Traffic,
    Radar,
    Weather,
}

impl DataDomain {
    pub const ALL: [DataDomain; 4] = [
        DataDomain::Tiles,
        DataDomain::Traffic,
        DataDomain::Radar,
        DataDomain::Weather,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DataDomain::Tiles => "tiles",
            DataDomain::Traffic => "traffic",
            DataDomain::Radar => "radar",
            DataDomain::Weather => "weather",
        }
    }
}

impl fmt::Display for DataDomain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DataDomain {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "tiles" => Ok(DataDomain::Tiles),
            "traffic" => Ok(DataDomain::Traffic),
            "radar" => Ok(DataDomain::Radar),
            "weather" => Ok(DataDomain::Weather),
            other => Err(format!("unknown data domain '{}'", other)),
        }
    }
}

/// A named upstream source.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Stable identity; circuit state is keyed by it.
    fn name(&self) -> &str;

    /// Whether the provider serves `domain` at all.
    fn supports(&self, _domain: DataDomain) -> bool {
        true
    }

    /// Current conditions at a point.
    async fn get_weather_now(&self, _lat: f64, _lon: f64) -> FetchResult<WeatherNow> {
        Err(self.unsupported(DataDomain::Weather))
    }

    /// Speed cameras and hazards inside the box spanned by two corners.
    async fn get_speed_cameras(&self, _a: LatLon, _b: LatLon) -> FetchResult<Vec<SpeedCamera>> {
        Err(self.unsupported(DataDomain::Radar))
    }

    /// Traffic flow inside the box spanned by two corners.
    async fn get_traffic_flow(&self, _a: LatLon, _b: LatLon) -> FetchResult<TrafficFlow> {
        Err(self.unsupported(DataDomain::Traffic))
    }

    /// Raw map tile bytes.
    async fn get_tile(&self, _coord: TileCoord) -> FetchResult<Bytes> {
        Err(self.unsupported(DataDomain::Tiles))
    }

    fn unsupported(&self, domain: DataDomain) -> FetchError {
        FetchError::Unsupported {
            provider: self.name().to_string(),
            domain,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct WeatherOnly;

    #[async_trait]
    impl Provider for WeatherOnly {
        fn name(&self) -> &str {
            "weather-only"
        }

        async fn get_weather_now(&self, _lat: f64, _lon: f64) -> FetchResult<WeatherNow> {
            Ok(WeatherNow {
                temperature_c: 21.0,
                condition: "clear".into(),
                wind_speed_kph: 4.0,
                humidity_pct: None,
                observed_at: None,
            })
        }
    }

    #[tokio::test]
    async fn test_default_methods_are_unsupported() {
        let p = WeatherOnly;
        assert!(p.get_weather_now(0.0, 0.0).await.is_ok());

        let err = p.get_tile(TileCoord { z: 1, x: 0, y: 0 }).await.unwrap_err();
        assert!(matches!(
            err,
            FetchError::Unsupported { domain: DataDomain::Tiles, .. }
        ));
    }

    #[test]
    fn test_domain_parse() {
        assert_eq!("Radar".parse::<DataDomain>().unwrap(), DataDomain::Radar);
        assert!("ferries".parse::<DataDomain>().is_err());
        assert_eq!(DataDomain::Weather.to_string(), "weather");
    }
}
