//! Render configuration.
//!
//! Values come from three places, highest priority first: command-line
//! flags, an optional TOML file, built-in defaults. The merged result is
//! validated once into an immutable [`RenderConfig`].

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::client::{FeedClass, FeedType, FeedWindow, USGS_BASE_URL};
use crate::errors::SeismomapError;
use crate::scale::{ColorScale, ColorToken, Preset, ScaleStep};

/// Default radius multiplier.
pub const DEFAULT_SCALE_FACTOR: f64 = 3.0;

/// Default base map tiles.
pub const DEFAULT_TILE_URL: &str = "https://tile.openstreetmap.org/{z}/{x}/{y}.png";

/// Default overlay control group title.
pub const DEFAULT_OVERLAY_GROUP: &str = "Earthquake types";

/// Where a layer's features come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LayerSource {
    Summary(FeedType),
    Url(String),
}

impl LayerSource {
    /// Resolve to a fetchable URL.
    #[must_use]
    pub fn url(&self, base_url: &str) -> String {
        match self {
            Self::Summary(feed) => feed.url(base_url),
            Self::Url(url) => url.clone(),
        }
    }

    fn default_name(&self) -> String {
        match self {
            Self::Summary(feed) => feed.title(),
            Self::Url(url) => url.clone(),
        }
    }
}

fn is_url(s: &str) -> bool {
    s.starts_with("http://") || s.starts_with("https://")
}

impl std::str::FromStr for LayerSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err("layer source is empty".into());
        }
        if is_url(s) {
            return Ok(Self::Url(s.to_string()));
        }
        s.parse::<FeedType>()
            .map(Self::Summary)
            .map_err(|e| format!("{e} (expected a summary feed like 4.5_month or an http(s) URL)"))
    }
}

/// One overlay layer: a display name and a feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayerSpec {
    pub name: String,
    pub source: LayerSource,
}

impl LayerSpec {
    fn summary(class: FeedClass, window: FeedWindow) -> Self {
        let feed = FeedType::new(class, window);
        Self {
            name: feed.title(),
            source: LayerSource::Summary(feed),
        }
    }

    /// M4.5+ and significant events over 30 days, plus everything from the
    /// last day.
    #[must_use]
    pub fn defaults() -> Vec<Self> {
        vec![
            Self::summary(FeedClass::Mag45, FeedWindow::Month),
            Self::summary(FeedClass::Significant, FeedWindow::Month),
            Self::summary(FeedClass::All, FeedWindow::Day),
        ]
    }
}

/// Parses `[NAME=]SOURCE`.
///
/// A bare URL is always taken whole, whatever its query string holds.
/// Otherwise a split only counts when the part after the first `=` is
/// itself a valid source.
impl std::str::FromStr for LayerSpec {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let named = s.split_once('=').filter(|_| !is_url(s.trim()));
        if let Some((name, source)) = named {
            if let Ok(source) = source.parse::<LayerSource>() {
                let name = name.trim();
                if name.is_empty() {
                    return Err(format!("layer name is empty in '{s}'"));
                }
                return Ok(Self {
                    name: name.to_string(),
                    source,
                });
            }
        }
        let source: LayerSource = s.parse()?;
        Ok(Self {
            name: source.default_name(),
            source,
        })
    }
}

/// Initial map view handed to the renderer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MapView {
    /// (latitude, longitude)
    pub center: (f64, f64),
    pub zoom: f64,
}

impl Default for MapView {
    fn default() -> Self {
        Self {
            center: (37.09, -95.71),
            zoom: 3.5,
        }
    }
}

/// Circle outline and fill opacity, passed through to the renderer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MarkerStyle {
    pub weight: f64,
    pub opacity: f64,
    pub fill_opacity: f64,
}

impl Default for MarkerStyle {
    fn default() -> Self {
        Self {
            weight: 2.0,
            opacity: 1.0,
            fill_opacity: 0.7,
        }
    }
}

/// Fully validated settings for one render pass.
#[derive(Debug, Clone)]
pub struct RenderConfig {
    pub layers: Vec<LayerSpec>,
    pub base_url: String,
    pub scale_factor: f64,
    /// `None` when a custom scale from the config file is in use
    pub preset: Option<Preset>,
    pub scale: ColorScale,
    /// Opaque; never inspected
    pub tile_url: String,
    pub overlay_group: String,
    pub view: MapView,
    pub marker: MarkerStyle,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            layers: LayerSpec::defaults(),
            base_url: USGS_BASE_URL.to_string(),
            scale_factor: DEFAULT_SCALE_FACTOR,
            preset: Some(Preset::Classic),
            scale: Preset::Classic.scale(),
            tile_url: DEFAULT_TILE_URL.to_string(),
            overlay_group: DEFAULT_OVERLAY_GROUP.to_string(),
            view: MapView::default(),
            marker: MarkerStyle::default(),
        }
    }
}

impl RenderConfig {
    /// Name of the active scale, for display.
    #[must_use]
    pub fn scale_name(&self) -> &'static str {
        self.preset.map_or("custom", Preset::as_str)
    }

    /// Layer names paired with resolved URLs, in display order.
    #[must_use]
    pub fn layer_urls(&self) -> Vec<(String, String)> {
        self.layers
            .iter()
            .map(|l| (l.name.clone(), l.source.url(&self.base_url)))
            .collect()
    }

    /// Check invariants the rest of the crate relies on.
    ///
    /// # Errors
    ///
    /// Returns [`SeismomapError::Config`] describing the first problem.
    pub fn validate(&self) -> Result<(), SeismomapError> {
        if self.layers.is_empty() {
            return Err(SeismomapError::Config("at least one layer is required".into()));
        }
        let mut names = HashSet::new();
        for layer in &self.layers {
            if layer.name.trim().is_empty() {
                return Err(SeismomapError::Config("layer name is empty".into()));
            }
            if let LayerSource::Url(url) = &layer.source {
                if url.trim().is_empty() {
                    return Err(SeismomapError::Config(format!(
                        "layer '{}' has an empty URL",
                        layer.name
                    )));
                }
            }
            if !names.insert(layer.name.as_str()) {
                return Err(SeismomapError::Config(format!(
                    "duplicate layer name '{}'",
                    layer.name
                )));
            }
        }
        if !self.scale_factor.is_finite() || self.scale_factor <= 0.0 {
            return Err(SeismomapError::Config(format!(
                "scale factor must be a positive number, got {}",
                self.scale_factor
            )));
        }
        if self.base_url.trim().is_empty() {
            return Err(SeismomapError::Config("feed base URL is empty".into()));
        }
        Ok(())
    }
}

/// `[[layers]]` entry in the config file.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LayerEntry {
    pub name: Option<String>,
    pub source: String,
}

/// `[scale]` table: a custom palette replacing the preset.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScaleEntry {
    pub floor: ColorToken,
    #[serde(default)]
    pub legend_floor: f64,
    #[serde(default)]
    pub steps: Vec<ScaleStep>,
}

/// On-disk configuration. Every field is optional.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConfigFile {
    pub base_url: Option<String>,
    pub scale_factor: Option<f64>,
    pub preset: Option<Preset>,
    pub tile_url: Option<String>,
    pub overlay_group: Option<String>,
    pub layers: Vec<LayerEntry>,
    pub scale: Option<ScaleEntry>,
    pub view: Option<MapView>,
    pub marker: Option<MarkerStyle>,
}

impl ConfigFile {
    /// Read and parse a TOML config file.
    ///
    /// # Errors
    ///
    /// Returns [`SeismomapError::Config`] if the file cannot be read or is
    /// not valid TOML for this schema.
    pub fn load(path: &Path) -> Result<Self, SeismomapError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            SeismomapError::Config(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::parse(&content)
            .map_err(|e| SeismomapError::Config(format!("{}: {e}", path.display())))
    }

    /// Parse TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`SeismomapError::Config`] on syntax or schema errors.
    pub fn parse(content: &str) -> Result<Self, SeismomapError> {
        toml::from_str(content).map_err(|e| SeismomapError::Config(e.to_string()))
    }
}

/// Command-line values that override the file.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub layers: Vec<LayerSpec>,
    pub base_url: Option<String>,
    pub scale_factor: Option<f64>,
    pub preset: Option<Preset>,
    pub tile_url: Option<String>,
}

/// Merge flags, file and defaults, then validate.
///
/// A `--preset` flag wins over a custom `[scale]` table in the file.
///
/// # Errors
///
/// Returns [`SeismomapError::Config`] if any merged value is invalid.
pub fn resolve(
    file: ConfigFile,
    overrides: ConfigOverrides,
) -> Result<RenderConfig, SeismomapError> {
    let defaults = RenderConfig::default();

    let layers = if overrides.layers.is_empty() {
        if file.layers.is_empty() {
            defaults.layers
        } else {
            file.layers
                .into_iter()
                .map(|entry| {
                    let source: LayerSource =
                        entry.source.parse().map_err(SeismomapError::Config)?;
                    let name = entry.name.unwrap_or_else(|| source.default_name());
                    Ok(LayerSpec { name, source })
                })
                .collect::<Result<Vec<_>, SeismomapError>>()?
        }
    } else {
        overrides.layers
    };

    let (preset, scale) = match (overrides.preset, file.scale, file.preset) {
        (Some(preset), _, _) => (Some(preset), preset.scale()),
        (None, Some(custom), _) => (
            None,
            ColorScale::new(custom.steps, custom.floor, custom.legend_floor)?,
        ),
        (None, None, Some(preset)) => (Some(preset), preset.scale()),
        (None, None, None) => (defaults.preset, defaults.scale),
    };

    let config = RenderConfig {
        layers,
        base_url: overrides
            .base_url
            .or(file.base_url)
            .unwrap_or(defaults.base_url),
        scale_factor: overrides
            .scale_factor
            .or(file.scale_factor)
            .unwrap_or(defaults.scale_factor),
        preset,
        scale,
        tile_url: overrides
            .tile_url
            .or(file.tile_url)
            .unwrap_or(defaults.tile_url),
        overlay_group: file.overlay_group.unwrap_or(defaults.overlay_group),
        view: file.view.unwrap_or(defaults.view),
        marker: file.marker.unwrap_or(defaults.marker),
    };

    config.validate()?;
    Ok(config)
}
