//! Fetch, ingest and style every configured layer.
//!
//! All feeds are fetched concurrently on a `JoinSet`; the pass waits for
//! every fetch before styling. A failed feed or a bad feature produces a
//! [`Diagnostic`] and is left out; nothing short of a configuration error
//! stops a render.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::task::JoinSet;
use tracing::{info, warn};

use crate::client::FeedSource;
use crate::config::{MapView, MarkerStyle, RenderConfig};
use crate::errors::SeismomapError;
use crate::models::{EarthquakeFeature, FeatureCollection};
use crate::scale::{LegendEntry, build_legend_entries};
use crate::styler::{StyledMarker, style_feature};

/// What went wrong.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticKind {
    FetchFailure,
    MalformedFeature,
}

/// A recoverable problem met during a render pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub layer: String,
    pub kind: DiagnosticKind,
    /// Position of the feature within its feed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub index: Option<usize>,
    pub message: String,
}

/// Markers for one successfully fetched feed.
#[derive(Debug, Clone, Serialize)]
pub struct StyledLayer {
    pub name: String,
    pub source: String,
    pub markers: Vec<StyledMarker>,
    /// Features dropped as malformed
    pub skipped: usize,
}

/// Everything a renderer needs for one frame.
#[derive(Debug, Clone, Serialize)]
pub struct RenderDocument {
    pub generated: DateTime<Utc>,
    pub tile_url: String,
    pub overlay_group: String,
    pub view: MapView,
    pub marker_style: MarkerStyle,
    pub scale: &'static str,
    pub layers: Vec<StyledLayer>,
    pub legend: Vec<LegendEntry>,
    pub diagnostics: Vec<Diagnostic>,
}

impl RenderDocument {
    /// Total markers across layers.
    #[must_use]
    pub fn marker_count(&self) -> usize {
        self.layers.iter().map(|l| l.markers.len()).sum()
    }

    #[must_use]
    pub fn layer(&self, name: &str) -> Option<&StyledLayer> {
        self.layers.iter().find(|l| l.name == name)
    }

    /// Every marker paired with its layer name, in layer order.
    #[must_use]
    pub fn markers(&self) -> Vec<(&str, &StyledMarker)> {
        self.layers
            .iter()
            .flat_map(|l| l.markers.iter().map(move |m| (l.name.as_str(), m)))
            .collect()
    }

    /// Markers of all layers as one set, dropping repeated event ids.
    ///
    /// The first layer listing an event keeps it. Markers without an id are
    /// always kept.
    #[must_use]
    pub fn union(&self) -> Vec<(&str, &StyledMarker)> {
        let mut seen = HashSet::new();
        self.markers()
            .into_iter()
            .filter(|&(_, m)| m.id.as_deref().is_none_or(|id| seen.insert(id)))
            .collect()
    }
}

/// Convert and style one feed's features, collecting skips.
#[must_use]
pub fn style_collection(
    layer: &str,
    feed: &FeatureCollection,
    config: &RenderConfig,
    diagnostics: &mut Vec<Diagnostic>,
) -> Vec<StyledMarker> {
    let mut markers = Vec::with_capacity(feed.features.len());
    for (index, raw) in feed.features.iter().enumerate() {
        match EarthquakeFeature::from_value(raw) {
            Ok(feature) => markers.push(style_feature(&feature, config)),
            Err(e) => {
                warn!("layer '{}': skipping feature #{}: {}", layer, index, e);
                diagnostics.push(Diagnostic {
                    layer: layer.to_string(),
                    kind: DiagnosticKind::MalformedFeature,
                    index: Some(index),
                    message: e.to_string(),
                });
            }
        }
    }
    markers
}

/// Runs render passes against a feed source.
pub struct Pipeline<S> {
    source: Arc<S>,
    config: Arc<RenderConfig>,
}

impl<S> Clone for Pipeline<S> {
    fn clone(&self) -> Self {
        Self {
            source: Arc::clone(&self.source),
            config: Arc::clone(&self.config),
        }
    }
}

impl<S: FeedSource> Pipeline<S> {
    #[must_use]
    pub fn new(source: S, config: RenderConfig) -> Self {
        Self {
            source: Arc::new(source),
            config: Arc::new(config),
        }
    }

    #[must_use]
    pub fn config(&self) -> &RenderConfig {
        &self.config
    }

    /// Fetch every layer concurrently and wait for all of them.
    ///
    /// Results come back in configured layer order regardless of which
    /// request finished first.
    pub async fn fetch_all(&self) -> Vec<(usize, Result<FeatureCollection, SeismomapError>)> {
        let mut tasks = JoinSet::new();
        for (index, (_, url)) in self.config.layer_urls().into_iter().enumerate() {
            let source = Arc::clone(&self.source);
            tasks.spawn(async move { (index, source.fetch(&url).await) });
        }

        let mut results = Vec::with_capacity(self.config.layers.len());
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(result) => results.push(result),
                Err(e) => warn!("fetch task aborted: {}", e),
            }
        }
        results.sort_by_key(|(index, _)| *index);

        // Fill any slot lost to an aborted task.
        let mut complete = Vec::with_capacity(self.config.layers.len());
        let mut results = results.into_iter().peekable();
        for index in 0..self.config.layers.len() {
            match results.next_if(|(i, _)| *i == index) {
                Some(entry) => complete.push(entry),
                None => complete.push((
                    index,
                    Err(SeismomapError::InvalidResponse("fetch task aborted".into())),
                )),
            }
        }
        complete
    }

    /// One full pass: fetch, ingest, style, build the legend.
    pub async fn render(&self) -> RenderDocument {
        let fetched = self.fetch_all().await;
        let config = &*self.config;

        let mut layers = Vec::with_capacity(fetched.len());
        let mut diagnostics = Vec::new();

        for ((name, url), (_, result)) in config.layer_urls().into_iter().zip(fetched) {
            match result {
                Ok(feed) => {
                    let before = diagnostics.len();
                    let markers = style_collection(&name, &feed, config, &mut diagnostics);
                    let skipped = diagnostics.len() - before;
                    info!(
                        "layer '{}': {} markers ({} skipped)",
                        name,
                        markers.len(),
                        skipped
                    );
                    layers.push(StyledLayer {
                        name,
                        source: url,
                        markers,
                        skipped,
                    });
                }
                Err(e) => {
                    warn!("layer '{}' omitted: {}", name, e);
                    diagnostics.push(Diagnostic {
                        layer: name,
                        kind: DiagnosticKind::FetchFailure,
                        index: None,
                        message: e.to_string(),
                    });
                }
            }
        }

        RenderDocument {
            generated: Utc::now(),
            tile_url: config.tile_url.clone(),
            overlay_group: config.overlay_group.clone(),
            view: config.view,
            marker_style: config.marker,
            scale: config.scale_name(),
            layers,
            legend: build_legend_entries(&config.scale),
            diagnostics,
        }
    }
}
