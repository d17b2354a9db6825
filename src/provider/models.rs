//! Domain payloads returned by providers.

use serde::{Deserialize, Serialize};

use crate::geo::LatLon;

/// Current weather conditions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherNow {
    pub temperature_c: f64,
    pub condition: String,
    #[serde(default)]
    pub wind_speed_kph: f64,
    #[serde(default)]
    pub humidity_pct: Option<f64>,
    #[serde(default)]
    pub observed_at: Option<String>,
}

/// Kind of enforcement point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CameraKind {
    Fixed,
    Mobile,
    RedLight,
    Section,
    #[serde(other)]
    Other,
}

/// A speed camera or hazard report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpeedCamera {
    pub id: String,
    pub position: LatLon,
    pub kind: CameraKind,
    #[serde(default)]
    pub speed_limit_kph: Option<u32>,
}

/// Flow on one road segment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrafficSegment {
    pub start: LatLon,
    pub end: LatLon,
    pub current_speed_kph: f64,
    pub free_flow_speed_kph: f64,
}

impl TrafficSegment {
    /// Current over free-flow speed; 1.0 means no congestion.
    pub fn flow_ratio(&self) -> f64 {
        if self.free_flow_speed_kph <= 0.0 {
            return 1.0;
        }
        (self.current_speed_kph / self.free_flow_speed_kph).clamp(0.0, 1.0)
    }
}

/// Traffic flow for an area.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TrafficFlow {
    #[serde(default)]
    pub segments: Vec<TrafficSegment>,
}

impl TrafficFlow {
    /// Mean flow ratio across segments, or `None` when empty.
    pub fn average_flow_ratio(&self) -> Option<f64> {
        if self.segments.is_empty() {
            return None;
        }
        let sum: f64 = self.segments.iter().map(TrafficSegment::flow_ratio).sum();
        Some(sum / self.segments.len() as f64)
    }
}
