//! HTTP API serving render documents to map front-ends.
//!
//! Provides:
//! - a background task that re-renders every refresh interval
//! - JSON and GeoJSON endpoints over the latest document, per layer or
//!   as a de-duplicated union
//! - SSE (Server-Sent Events) notifications after each refresh

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::{
        IntoResponse, Response,
        sse::{Event, KeepAlive, Sse},
    },
    routing::get,
};
use serde_json::json;
use tokio::net::TcpListener;
use tokio::sync::{RwLock, broadcast};
use tokio_stream::StreamExt;
use tokio_stream::wrappers::BroadcastStream;

use crate::client::FeedSource;
use crate::output::feature_collection;
use crate::pipeline::{Pipeline, RenderDocument};

/// Lower bound on the refresh interval, in seconds. USGS regenerates
/// summary feeds about once a minute.
pub const MIN_REFRESH_SECS: u64 = 30;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub host: String,
    pub refresh_interval: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            host: "127.0.0.1".to_string(),
            refresh_interval: 60,
        }
    }
}

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Channel for broadcasting refresh summaries to SSE clients
    tx: broadcast::Sender<String>,
    /// Latest completed render, `None` until the first one lands
    latest: Arc<RwLock<Option<Arc<RenderDocument>>>>,
}

impl AppState {
    #[must_use]
    pub fn new() -> Self {
        let (tx, _rx) = broadcast::channel::<String>(16);
        Self {
            tx,
            latest: Arc::new(RwLock::new(None)),
        }
    }

    /// Install a new document and notify subscribers.
    pub async fn publish(&self, doc: RenderDocument) {
        let summary = json!({
            "generated": doc.generated,
            "markers": doc.marker_count(),
            "layers": doc.layers.iter().map(|l| &l.name).collect::<Vec<_>>(),
            "diagnostics": doc.diagnostics.len(),
        })
        .to_string();

        *self.latest.write().await = Some(Arc::new(doc));

        // No receivers is fine
        let _ = self.tx.send(summary);
    }

    async fn snapshot(&self) -> Option<Arc<RenderDocument>> {
        self.latest.read().await.clone()
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}

/// Create the Axum router with all routes.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/api/render", get(render_handler))
        .route("/api/legend", get(legend_handler))
        .route("/api/layers/{name}", get(layer_handler))
        .route("/api/union", get(union_handler))
        .route("/stream", get(sse_handler))
        .with_state(state)
}

/// Start the server and its refresh task.
pub async fn run_server<S: FeedSource>(
    config: ServerConfig,
    pipeline: Pipeline<S>,
) -> anyhow::Result<()> {
    let state = AppState::new();

    let refresh_state = state.clone();
    let interval = Duration::from_secs(config.refresh_interval.max(MIN_REFRESH_SECS));
    tokio::spawn(async move {
        refresh_loop(refresh_state, pipeline, interval).await;
    });

    let addr = format!("{}:{}", config.host, config.port);
    tracing::info!("🌍 seismomap API listening on http://{}", addr);

    let listener = TcpListener::bind(&addr).await?;
    serve(listener, state).await
}

/// Serve an already-bound listener.
pub async fn serve(listener: TcpListener, state: AppState) -> anyhow::Result<()> {
    axum::serve(listener, create_router(state)).await?;
    Ok(())
}

/// Background task that re-renders and publishes.
async fn refresh_loop<S: FeedSource>(state: AppState, pipeline: Pipeline<S>, interval: Duration) {
    loop {
        let doc = pipeline.render().await;
        tracing::info!(
            "refreshed: {} markers in {} layers",
            doc.marker_count(),
            doc.layers.len()
        );
        state.publish(doc).await;

        tokio::time::sleep(interval).await;
    }
}

fn not_ready() -> Response {
    (
        StatusCode::SERVICE_UNAVAILABLE,
        Json(json!({ "error": "first render still in progress" })),
    )
        .into_response()
}

// ============================================================================
// Route Handlers
// ============================================================================

/// Health check endpoint.
async fn health_handler() -> &'static str {
    "OK"
}

/// Latest full render document.
async fn render_handler(State(state): State<AppState>) -> Response {
    match state.snapshot().await {
        Some(doc) => Json(&*doc).into_response(),
        None => not_ready(),
    }
}

/// Legend of the latest render.
async fn legend_handler(State(state): State<AppState>) -> Response {
    match state.snapshot().await {
        Some(doc) => Json(&doc.legend).into_response(),
        None => not_ready(),
    }
}

/// One layer as a GeoJSON FeatureCollection.
async fn layer_handler(State(state): State<AppState>, Path(name): Path<String>) -> Response {
    let Some(doc) = state.snapshot().await else {
        return not_ready();
    };
    match doc.layer(&name) {
        Some(layer) => {
            let rows: Vec<_> = layer.markers.iter().map(|m| (layer.name.as_str(), m)).collect();
            Json(feature_collection(&rows, &doc.legend)).into_response()
        }
        None => (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": format!("no layer named '{name}'") })),
        )
            .into_response(),
    }
}

/// All layers as one GeoJSON FeatureCollection, repeated events collapsed.
async fn union_handler(State(state): State<AppState>) -> Response {
    match state.snapshot().await {
        Some(doc) => Json(feature_collection(&doc.union(), &doc.legend)).into_response(),
        None => not_ready(),
    }
}

/// SSE stream: one `render` event per refresh.
async fn sse_handler(
    State(state): State<AppState>,
) -> Sse<impl tokio_stream::Stream<Item = Result<Event, Infallible>>> {
    let rx = state.tx.subscribe();
    let stream = BroadcastStream::new(rx).filter_map(|result| match result {
        Ok(summary) => Some(Ok(Event::default().event("render").data(summary))),
        Err(_) => None,
    });

    Sse::new(stream).keep_alive(KeepAlive::default())
}
