//! Nominatim geocoding client
//!
//! Nominatim's usage policy allows one request per second and requires an
//! identifying User-Agent. One client (and its limiter) is shared by the
//! whole process.

use crate::geo::Coordinate;
use crate::types::{DetectionError, Geocoder, PlaceMatch};
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

const NOMINATIM_SEARCH_URL: &str = "https://nominatim.openstreetmap.org/search";
const RATE_LIMIT_MS: u64 = 1000;

/// Search hit; Nominatim returns coordinates as strings
#[derive(Debug, Clone, Deserialize)]
pub struct SearchHit {
    pub lat: String,
    pub lon: String,
    #[serde(default)]
    pub display_name: String,
}

impl SearchHit {
    pub fn coordinate(&self) -> Option<Coordinate> {
        let lat = self.lat.trim().parse().ok()?;
        let lon = self.lon.trim().parse().ok()?;
        Some(Coordinate::new(lat, lon)).filter(Coordinate::is_valid)
    }
}

/// Minimum spacing between requests
pub struct RateLimiter {
    last_request: Mutex<Option<Instant>>,
    min_interval: Duration,
}

impl RateLimiter {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            last_request: Mutex::new(None),
            min_interval,
        }
    }

    /// Wait until the next request is allowed
    pub async fn wait(&self) {
        let mut last = self.last_request.lock().await;

        if let Some(last_time) = *last {
            let elapsed = last_time.elapsed();
            if elapsed < self.min_interval {
                let wait_time = self.min_interval - elapsed;
                tracing::debug!("Nominatim rate limiting: waiting {:?}", wait_time);
                tokio::time::sleep(wait_time).await;
            }
        }

        *last = Some(Instant::now());
    }
}

/// Nominatim client
pub struct NominatimClient {
    http_client: reqwest::Client,
    rate_limiter: Arc<RateLimiter>,
}

impl NominatimClient {
    pub fn new(timeout: Duration, user_agent: &str) -> Result<Self, DetectionError> {
        let http_client = reqwest::Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .build()
            .map_err(|e| DetectionError::Network(e.to_string()))?;

        Ok(Self {
            http_client,
            rate_limiter: Arc::new(RateLimiter::new(Duration::from_millis(RATE_LIMIT_MS))),
        })
    }
}

#[async_trait]
impl Geocoder for NominatimClient {
    async fn geocode(&self, text: &str) -> Result<Option<PlaceMatch>, DetectionError> {
        self.rate_limiter.wait().await;

        tracing::debug!(query = %text, "Querying Nominatim");

        let response = self
            .http_client
            .get(NOMINATIM_SEARCH_URL)
            .query(&[("q", text), ("format", "json"), ("limit", "1")])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(DetectionError::Api(format!(
                "HTTP {}: {}",
                status.as_u16(),
                error_text
            )));
        }

        let hits: Vec<SearchHit> = response
            .json()
            .await
            .map_err(|e| DetectionError::Parse(e.to_string()))?;

        Ok(first_place(text, &hits))
    }
}

/// First parseable hit, labelled with the query text
pub fn first_place(query: &str, hits: &[SearchHit]) -> Option<PlaceMatch> {
    let coordinate = hits.iter().find_map(SearchHit::coordinate)?;
    Some(PlaceMatch {
        coordinate,
        label: query.to_string(),
        provider: "nominatim".to_string(),
    })
}
