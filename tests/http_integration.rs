//! End-to-end tests against local HTTP servers.
//!
//! A small axum app stands in for the USGS feed host so the real
//! `FeedClient` is exercised over TCP.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use axum::{Router, http::StatusCode, routing::get};
use serde_json::{Value, json};
use tokio::net::TcpListener;

use seismomap::client::{FeedClient, FeedSource, RetryConfig};
use seismomap::config::{LayerSource, LayerSpec, RenderConfig};
use seismomap::errors::SeismomapError;
use seismomap::pipeline::{DiagnosticKind, Pipeline};
use seismomap::server::{self, AppState};

fn feed(features: &[(&str, Option<f64>)]) -> String {
    let features: Vec<Value> = features
        .iter()
        .map(|(id, mag)| {
            json!({
                "type": "Feature",
                "id": id,
                "properties": { "mag": mag, "place": "Off the coast of Oregon", "time": 1_650_000_000_000_i64 },
                "geometry": { "type": "Point", "coordinates": [-127.5, 43.9, 10.0] }
            })
        })
        .collect();
    json!({
        "type": "FeatureCollection",
        "metadata": { "generated": 1_650_000_000_000_i64, "title": "test", "count": features.len() },
        "features": features
    })
    .to_string()
}

/// Serve `app` on an ephemeral port and return its base URL.
async fn spawn(app: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

async fn feed_host(flaky_hits: Arc<AtomicUsize>) -> String {
    let a = feed(&[("or1", Some(4.7)), ("or2", None), ("or3", Some(-0.3))]);
    let c = feed(&[("or4", Some(5.9))]);
    let app = Router::new()
        .route("/a.geojson", get(move || async move { a }))
        .route("/c.geojson", get(move || async move { c }))
        .route(
            "/broken.geojson",
            get(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "boom") }),
        )
        .route("/garbage.geojson", get(|| async { "<html>not json</html>" }))
        .route(
            "/flaky.geojson",
            get(move || {
                let hits = Arc::clone(&flaky_hits);
                async move {
                    if hits.fetch_add(1, Ordering::SeqCst) == 0 {
                        (StatusCode::SERVICE_UNAVAILABLE, String::from("busy"))
                    } else {
                        (StatusCode::OK, feed(&[("fl1", Some(2.2))]))
                    }
                }
            }),
        );
    spawn(app).await
}

fn client(retries: u32) -> FeedClient {
    let retry = RetryConfig {
        max_retries: retries,
        initial_delay: Duration::from_millis(10),
        ..RetryConfig::default()
    };
    FeedClient::with_options(Duration::from_secs(5), retry).unwrap()
}

fn layer(name: &str, url: String) -> LayerSpec {
    LayerSpec {
        name: name.into(),
        source: LayerSource::Url(url),
    }
}

#[tokio::test]
async fn test_client_reports_status_and_parse_errors() {
    let base = feed_host(Arc::new(AtomicUsize::new(0))).await;
    let client = client(0);

    let ok = client.fetch(&format!("{base}/a.geojson")).await.unwrap();
    assert_eq!(ok.features.len(), 3);

    let err = client.fetch(&format!("{base}/broken.geojson")).await.unwrap_err();
    assert!(matches!(err, SeismomapError::Api { status: 500, .. }));

    let err = client.fetch(&format!("{base}/garbage.geojson")).await.unwrap_err();
    assert!(matches!(err, SeismomapError::Parse(_)));

    let err = client.fetch(&format!("{base}/missing.geojson")).await.unwrap_err();
    assert!(matches!(err, SeismomapError::Api { status: 404, .. }));
}

#[tokio::test]
async fn test_client_retries_transient_status() {
    let hits = Arc::new(AtomicUsize::new(0));
    let base = feed_host(Arc::clone(&hits)).await;

    let feed = client(2).fetch(&format!("{base}/flaky.geojson")).await.unwrap();
    assert_eq!(feed.features.len(), 1);
    assert_eq!(hits.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_client_without_retries_gives_up() {
    let hits = Arc::new(AtomicUsize::new(0));
    let base = feed_host(Arc::clone(&hits)).await;

    let err = client(0).fetch(&format!("{base}/flaky.geojson")).await.unwrap_err();
    assert!(matches!(err, SeismomapError::Api { status: 503, .. }));
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_render_survives_one_failed_feed() {
    let base = feed_host(Arc::new(AtomicUsize::new(0))).await;
    let config = RenderConfig {
        layers: vec![
            layer("Mag 4.5+: 30 days", format!("{base}/a.geojson")),
            layer("Significant: 30 days", format!("{base}/broken.geojson")),
            layer("All: 1 day", format!("{base}/c.geojson")),
        ],
        ..RenderConfig::default()
    };
    let doc = Pipeline::new(client(0), config).render().await;

    let names: Vec<&str> = doc.layers.iter().map(|l| l.name.as_str()).collect();
    assert_eq!(names, ["Mag 4.5+: 30 days", "All: 1 day"]);

    let ids: Vec<&str> = doc
        .layers
        .iter()
        .flat_map(|l| &l.markers)
        .filter_map(|m| m.id.as_deref())
        .collect();
    assert_eq!(ids, ["or1", "or3", "or4"]);

    let fetch_failures: Vec<&str> = doc
        .diagnostics
        .iter()
        .filter(|d| d.kind == DiagnosticKind::FetchFailure)
        .map(|d| d.layer.as_str())
        .collect();
    assert_eq!(fetch_failures, ["Significant: 30 days"]);
    assert_eq!(doc.layers[0].skipped, 1);
}

#[tokio::test]
async fn test_api_serves_latest_document() {
    let feeds = feed_host(Arc::new(AtomicUsize::new(0))).await;
    let state = AppState::new();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let api = format!("http://{}", listener.local_addr().unwrap());
    let serve_state = state.clone();
    tokio::spawn(async move {
        server::serve(listener, serve_state).await.unwrap();
    });

    let http = reqwest::Client::new();
    let health = http.get(format!("{api}/health")).send().await.unwrap();
    assert_eq!(health.text().await.unwrap(), "OK");

    let early = http.get(format!("{api}/api/render")).send().await.unwrap();
    assert_eq!(early.status(), reqwest::StatusCode::SERVICE_UNAVAILABLE);

    let config = RenderConfig {
        layers: vec![layer("Oregon", format!("{feeds}/a.geojson"))],
        ..RenderConfig::default()
    };
    state
        .publish(Pipeline::new(client(0), config).render().await)
        .await;

    let render: Value = http
        .get(format!("{api}/api/render"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(render["layers"][0]["name"], "Oregon");
    assert_eq!(render["layers"][0]["markers"][0]["fill_color"], "#F0A76B");

    let legend: Value = http
        .get(format!("{api}/api/legend"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(legend.as_array().unwrap().len(), 6);

    let layer: Value = http
        .get(format!("{api}/api/layers/Oregon"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(layer["type"], "FeatureCollection");
    assert_eq!(layer["features"].as_array().unwrap().len(), 2);

    let missing = http
        .get(format!("{api}/api/layers/Nowhere"))
        .send()
        .await
        .unwrap();
    assert_eq!(missing.status(), reqwest::StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_api_union_collapses_shared_events() {
    let feeds = feed_host(Arc::new(AtomicUsize::new(0))).await;
    let state = AppState::new();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let api = format!("http://{}", listener.local_addr().unwrap());
    let serve_state = state.clone();
    tokio::spawn(async move {
        server::serve(listener, serve_state).await.unwrap();
    });

    let http = reqwest::Client::new();
    let early = http.get(format!("{api}/api/union")).send().await.unwrap();
    assert_eq!(early.status(), reqwest::StatusCode::SERVICE_UNAVAILABLE);

    // The first two layers list the same events.
    let config = RenderConfig {
        layers: vec![
            layer("Oregon", format!("{feeds}/a.geojson")),
            layer("Oregon again", format!("{feeds}/a.geojson")),
            layer("Coast", format!("{feeds}/c.geojson")),
        ],
        ..RenderConfig::default()
    };
    let doc = Pipeline::new(client(0), config).render().await;
    assert_eq!(doc.marker_count(), 5);
    state.publish(doc).await;

    let union: Value = http
        .get(format!("{api}/api/union"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let features = union["features"].as_array().unwrap();
    let rows: Vec<(&str, &str)> = features
        .iter()
        .map(|f| {
            (
                f["id"].as_str().unwrap(),
                f["properties"]["layer"].as_str().unwrap(),
            )
        })
        .collect();
    assert_eq!(
        rows,
        [("or1", "Oregon"), ("or3", "Oregon"), ("or4", "Coast")]
    );
    assert_eq!(union["legend"].as_array().unwrap().len(), 6);
}
