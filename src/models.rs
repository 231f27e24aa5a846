//! Data models for USGS earthquake GeoJSON feeds.
//!
//! The raw structures are deliberately lenient: a feed is accepted as long as
//! it is a `FeatureCollection`, and each feature is validated on its own so
//! one bad record never costs the whole layer.

use chrono::{DateTime, TimeZone, Utc};
use serde::Deserialize;

use crate::errors::SeismomapError;

/// Top-level GeoJSON response from USGS feeds.
#[derive(Debug, Clone, Deserialize)]
pub struct FeatureCollection {
    /// Always "FeatureCollection"
    #[serde(rename = "type")]
    pub type_: String,

    /// Feed metadata (absent in hand-built collections)
    #[serde(default)]
    pub metadata: Option<Metadata>,

    /// Raw feature records, validated individually during ingestion
    #[serde(default)]
    pub features: Vec<serde_json::Value>,
}

impl FeatureCollection {
    /// Validate the response structure.
    pub fn validate(&self) -> Result<(), SeismomapError> {
        if self.type_ != "FeatureCollection" {
            return Err(SeismomapError::InvalidResponse(format!(
                "expected type 'FeatureCollection', got '{}'",
                self.type_
            )));
        }
        Ok(())
    }

    /// One-line description for logs: title, feature count, generation time.
    #[must_use]
    pub fn describe(&self) -> String {
        let meta = self.metadata.as_ref();
        let title = meta.and_then(|m| m.title.as_deref()).unwrap_or("untitled feed");
        let mut line = format!("'{title}': {} features", self.features.len());
        let listed = self.features.len();
        if let Some(count) = meta.and_then(|m| m.count).filter(|&c| c != listed) {
            line.push_str(&format!(" (metadata says {count})"));
        }
        if let Some(generated) = meta.and_then(Metadata::generated_at) {
            line.push_str(&format!(", generated {}", generated.format("%Y-%m-%d %H:%M:%S UTC")));
        }
        line
    }
}

/// Metadata about the feed response.
#[derive(Debug, Clone, Deserialize)]
pub struct Metadata {
    /// When this feed was generated (ms since epoch)
    pub generated: Option<i64>,

    /// Human-readable title
    pub title: Option<String>,

    /// Number of events in response
    pub count: Option<usize>,
}

impl Metadata {
    /// When the feed was generated, as a `DateTime<Utc>`.
    #[must_use]
    pub fn generated_at(&self) -> Option<DateTime<Utc>> {
        self.generated.and_then(|ms| Utc.timestamp_millis_opt(ms).single())
    }
}

/// A single raw feature as it appears in the feed.
#[derive(Debug, Clone, Deserialize)]
pub struct Feature {
    /// Unique event ID
    #[serde(default)]
    pub id: Option<String>,

    /// Geographic location
    pub geometry: Option<Geometry>,

    /// Event properties
    #[serde(default)]
    pub properties: Properties,
}

/// Geographic geometry for an event.
#[derive(Debug, Clone, Deserialize)]
pub struct Geometry {
    /// Coordinates: [longitude, latitude, depth_km]
    #[serde(default)]
    pub coordinates: Vec<f64>,
}

/// The subset of USGS event properties the styler consumes.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Properties {
    /// Magnitude value
    pub mag: Option<f64>,

    /// Human-readable place description
    pub place: Option<String>,

    /// Event time (ms since epoch)
    pub time: Option<i64>,
}

/// Fallback place name when the feed leaves it out.
pub const UNKNOWN_PLACE: &str = "Unknown location";

/// A validated earthquake, ready for styling.
#[derive(Debug, Clone, PartialEq)]
pub struct EarthquakeFeature {
    pub id: Option<String>,
    pub magnitude: f64,
    pub place: String,
    pub time_millis: i64,
    pub longitude: f64,
    pub latitude: f64,
    pub depth: Option<f64>,
}

impl EarthquakeFeature {
    /// Parse and validate one raw feature record.
    ///
    /// # Errors
    ///
    /// Returns [`SeismomapError::MalformedFeature`] if the record is not a
    /// feature or lacks a finite magnitude, a time, or a finite position.
    pub fn from_value(value: &serde_json::Value) -> Result<Self, SeismomapError> {
        let feature = Feature::deserialize(value)
            .map_err(|e| SeismomapError::MalformedFeature(e.to_string()))?;
        Self::try_from(feature)
    }
}

impl TryFrom<Feature> for EarthquakeFeature {
    type Error = SeismomapError;

    fn try_from(f: Feature) -> Result<Self, Self::Error> {
        let label = f.id.as_deref().unwrap_or("<no id>").to_string();
        let malformed = |what: &str| SeismomapError::MalformedFeature(format!("{label}: {what}"));

        let magnitude = match f.properties.mag {
            Some(m) if m.is_finite() => m,
            Some(_) => return Err(malformed("non-finite magnitude")),
            None => return Err(malformed("missing magnitude")),
        };
        let time_millis = f.properties.time.ok_or_else(|| malformed("missing time"))?;

        let coords = f.geometry.map(|g| g.coordinates).unwrap_or_default();
        let (longitude, latitude) = match coords.as_slice() {
            [lon, lat, ..] if lon.is_finite() && lat.is_finite() => (*lon, *lat),
            [_, _, ..] => return Err(malformed("non-finite coordinates")),
            _ => {
                return Err(malformed(&format!(
                    "expected at least 2 coordinates, got {}",
                    coords.len()
                )));
            }
        };
        let depth = coords.get(2).copied().filter(|d| d.is_finite());

        Ok(Self {
            id: f.id,
            magnitude,
            place: f.properties.place.unwrap_or_else(|| UNKNOWN_PLACE.into()),
            time_millis,
            longitude,
            latitude,
            depth,
        })
    }
}
