//! Feature styling: marker radius, fill color, and popup payload.
//!
//! Everything here is a pure function of its arguments. No I/O, no clock.

use chrono::{DateTime, TimeZone, Utc};
use serde::Serialize;

use crate::config::RenderConfig;
use crate::models::EarthquakeFeature;
use crate::scale::{ColorToken, compute_color};

/// Smallest radius a marker is ever drawn with.
pub const MIN_RADIUS: f64 = 1.0;

/// Radius for a magnitude, never below [`MIN_RADIUS`].
///
/// Micro-quakes report zero or negative magnitudes; scaling those linearly
/// would give invisible markers, so the result is clamped.
#[must_use]
pub fn compute_radius(magnitude: f64, scale_factor: f64) -> f64 {
    (magnitude * scale_factor).max(MIN_RADIUS)
}

/// Data shown when a marker is clicked. Rendering it is up to the consumer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Popup {
    pub place: String,
    pub time_millis: i64,
    pub magnitude: f64,
}

impl Popup {
    /// Event time in UTC.
    #[must_use]
    pub fn time(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_millis_opt(self.time_millis).single()
    }

    /// `YYYY-MM-DD HH:MM:SS UTC`, or "unknown" for out-of-range timestamps.
    #[must_use]
    pub fn time_label(&self) -> String {
        self.time()
            .map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
            .unwrap_or_else(|| "unknown".into())
    }
}

#[must_use]
pub fn popup_for(feature: &EarthquakeFeature) -> Popup {
    Popup {
        place: feature.place.clone(),
        time_millis: feature.time_millis,
        magnitude: feature.magnitude,
    }
}

/// A feature ready to be drawn.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StyledMarker {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// (latitude, longitude)
    pub position: (f64, f64),
    #[serde(skip_serializing_if = "Option::is_none")]
    pub depth: Option<f64>,
    pub radius: f64,
    pub fill_color: ColorToken,
    pub popup: Popup,
}

/// Style one feature under the given configuration.
#[must_use]
pub fn style_feature(feature: &EarthquakeFeature, config: &RenderConfig) -> StyledMarker {
    StyledMarker {
        id: feature.id.clone(),
        position: (feature.latitude, feature.longitude),
        depth: feature.depth,
        radius: compute_radius(feature.magnitude, config.scale_factor),
        fill_color: compute_color(feature.magnitude, &config.scale).clone(),
        popup: popup_for(feature),
    }
}
