//! USGS earthquake feed client.
//!
//! Provides async HTTP access to GeoJSON feeds, with bounded retries.
//! Uses reqwest with rustls for TLS.

use std::future::Future;
use std::time::Duration;

use reqwest::Client;
use tracing::{debug, instrument, warn};

use crate::errors::SeismomapError;
use crate::models::FeatureCollection;

/// Default request timeout in seconds. Month-long feeds run to several MB.
pub const REQUEST_TIMEOUT_SECS: u64 = 30;

/// User agent string for API requests.
const USER_AGENT: &str = concat!("seismomap/", env!("CARGO_PKG_VERSION"));

/// USGS base URL for earthquake feeds.
pub const USGS_BASE_URL: &str = "https://earthquake.usgs.gov";

/// Magnitude class of a summary feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedClass {
    All,
    Mag1,
    Mag25,
    Mag45,
    Significant,
}

/// Time window of a summary feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedWindow {
    Hour,
    Day,
    Week,
    Month,
}

/// A USGS summary feed, e.g. `4.5_month`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeedType {
    pub class: FeedClass,
    pub window: FeedWindow,
}

impl FeedClass {
    const fn as_str(self) -> &'static str {
        match self {
            Self::All => "all",
            Self::Mag1 => "1.0",
            Self::Mag25 => "2.5",
            Self::Mag45 => "4.5",
            Self::Significant => "significant",
        }
    }

    const fn title(self) -> &'static str {
        match self {
            Self::All => "All",
            Self::Mag1 => "Mag 1.0+",
            Self::Mag25 => "Mag 2.5+",
            Self::Mag45 => "Mag 4.5+",
            Self::Significant => "Significant",
        }
    }
}

impl FeedWindow {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Hour => "hour",
            Self::Day => "day",
            Self::Week => "week",
            Self::Month => "month",
        }
    }

    const fn title(self) -> &'static str {
        match self {
            Self::Hour => "1 hour",
            Self::Day => "1 day",
            Self::Week => "7 days",
            Self::Month => "30 days",
        }
    }
}

impl FeedType {
    #[must_use]
    pub const fn new(class: FeedClass, window: FeedWindow) -> Self {
        Self { class, window }
    }

    /// Get the URL path segment for this feed type.
    #[must_use]
    pub fn as_str(self) -> String {
        format!("{}_{}", self.class.as_str(), self.window.as_str())
    }

    /// Layer title, e.g. "Mag 4.5+: 30 days".
    #[must_use]
    pub fn title(self) -> String {
        format!("{}: {}", self.class.title(), self.window.title())
    }

    /// Full feed URL under `base_url`.
    #[must_use]
    pub fn url(self, base_url: &str) -> String {
        format!(
            "{}/earthquakes/feed/v1.0/summary/{}.geojson",
            base_url.trim_end_matches('/'),
            self.as_str()
        )
    }
}

impl std::str::FromStr for FeedType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.to_lowercase();
        let (class, window) = lower
            .rsplit_once('_')
            .ok_or_else(|| format!("unknown feed type: {s}"))?;
        let class = match class {
            "all" => FeedClass::All,
            "1.0" => FeedClass::Mag1,
            "2.5" => FeedClass::Mag25,
            "4.5" => FeedClass::Mag45,
            "significant" => FeedClass::Significant,
            _ => return Err(format!("unknown feed type: {s}")),
        };
        let window = match window {
            "hour" => FeedWindow::Hour,
            "day" => FeedWindow::Day,
            "week" => FeedWindow::Week,
            "month" => FeedWindow::Month,
            _ => return Err(format!("unknown feed type: {s}")),
        };
        Ok(Self { class, window })
    }
}

/// Retry behavior for feed requests.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Retry attempts after the initial request.
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub backoff_factor: f64,
    /// HTTP status codes that trigger a retry.
    pub retryable_statuses: Vec<u16>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            initial_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(5),
            backoff_factor: 2.0,
            retryable_statuses: vec![429, 502, 503, 504],
        }
    }
}

impl RetryConfig {
    /// No retries at all.
    #[must_use]
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Calculate delay for a given attempt (0-indexed).
    #[must_use]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exp = i32::try_from(attempt).unwrap_or(i32::MAX);
        let base = self.initial_delay.as_secs_f64() * self.backoff_factor.powi(exp);
        Duration::from_secs_f64(base.min(self.max_delay.as_secs_f64()))
    }
}

/// Anything that can produce a feature collection for a URL.
///
/// The pipeline fans out over this trait, so tests can substitute an
/// in-memory source for the network.
pub trait FeedSource: Send + Sync + 'static {
    fn fetch(
        &self,
        url: &str,
    ) -> impl Future<Output = Result<FeatureCollection, SeismomapError>> + Send;
}

/// HTTP client for GeoJSON earthquake feeds.
#[derive(Debug, Clone)]
pub struct FeedClient {
    client: Client,
    retry: RetryConfig,
}

impl FeedClient {
    /// Create a new client with the default timeout and retry policy.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be initialized.
    pub fn new() -> Result<Self, SeismomapError> {
        Self::with_options(
            Duration::from_secs(REQUEST_TIMEOUT_SECS),
            RetryConfig::default(),
        )
    }

    /// Create a client with an explicit timeout and retry policy.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be initialized.
    pub fn with_options(timeout: Duration, retry: RetryConfig) -> Result<Self, SeismomapError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()?;

        Ok(Self { client, retry })
    }

    /// Single attempt: GET, check status, parse, validate.
    async fn fetch_once(&self, url: &str) -> Result<FeatureCollection, SeismomapError> {
        let response = self.client.get(url).send().await?;

        // Check status before parsing
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SeismomapError::Api {
                status: status.as_u16(),
                message: body,
            });
        }

        let bytes = response.bytes().await?;
        let feed: FeatureCollection = serde_json::from_slice(&bytes)?;

        // Validate response structure
        feed.validate()?;

        Ok(feed)
    }
}

impl FeedSource for FeedClient {
    #[instrument(skip(self))]
    async fn fetch(&self, url: &str) -> Result<FeatureCollection, SeismomapError> {
        debug!("fetching feed from {}", url);

        let mut attempt = 0;
        loop {
            match self.fetch_once(url).await {
                Ok(feed) => {
                    debug!("fetched {}", feed.describe());
                    return Ok(feed);
                }
                Err(e)
                    if attempt < self.retry.max_retries
                        && e.is_transient(&self.retry.retryable_statuses) =>
                {
                    let delay = self.retry.delay_for_attempt(attempt);
                    warn!("attempt {} failed ({}), retrying in {:?}", attempt + 1, e, delay);
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
