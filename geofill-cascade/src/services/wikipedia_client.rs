//! Wikipedia topic lookup
//!
//! MediaWiki search with coordinates, one language edition at a time.

use crate::geo::Coordinate;
use crate::types::{DetectionError, EncyclopediaLookup, Topic};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;

/// Search results considered per language
const SEARCH_LIMIT: &str = "3";

#[derive(Debug, Default, Deserialize)]
pub struct QueryResponse {
    #[serde(default)]
    pub query: Option<QueryPages>,
}

#[derive(Debug, Default, Deserialize)]
pub struct QueryPages {
    /// Keyed by page id; order is given by `index`
    #[serde(default)]
    pub pages: HashMap<String, Page>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Page {
    pub title: String,
    /// Search rank, 1-based
    pub index: u32,
    pub coordinates: Vec<PageCoordinate>,
    /// Plain-text intro from `prop=extracts`
    pub extract: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct PageCoordinate {
    pub lat: f64,
    pub lon: f64,
}

impl QueryResponse {
    /// Best-ranked page with coordinates, else the best-ranked page
    pub fn best_topic(self, provider: &str) -> Option<Topic> {
        let mut pages: Vec<Page> = self.query?.pages.into_values().collect();
        pages.sort_by_key(|p| p.index);

        let with_coordinates = pages.iter().position(|p| {
            p.coordinates
                .first()
                .is_some_and(|c| Coordinate::new(c.lat, c.lon).is_valid())
        });

        let page = match with_coordinates {
            Some(i) => pages.swap_remove(i),
            None if !pages.is_empty() => pages.swap_remove(0),
            None => return None,
        };

        Some(Topic {
            coordinate: page.coordinates.first().map(|c| Coordinate::new(c.lat, c.lon)),
            title: page.title,
            summary: page.extract,
            provider: provider.to_string(),
        })
    }
}

/// Wikipedia client over several language editions
pub struct WikipediaClient {
    http_client: reqwest::Client,
    languages: Vec<String>,
}

impl WikipediaClient {
    pub fn new(
        languages: Vec<String>,
        timeout: Duration,
        user_agent: &str,
    ) -> Result<Self, DetectionError> {
        let http_client = reqwest::Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .build()
            .map_err(|e| DetectionError::Network(e.to_string()))?;

        Ok(Self {
            http_client,
            languages,
        })
    }

    async fn search(&self, language: &str, text: &str) -> Result<Option<Topic>, DetectionError> {
        let url = format!("https://{}.wikipedia.org/w/api.php", language);

        tracing::debug!(language = %language, query = %text, "Querying Wikipedia");

        let response = self
            .http_client
            .get(&url)
            .query(&[
                ("action", "query"),
                ("format", "json"),
                ("generator", "search"),
                ("gsrsearch", text),
                ("gsrlimit", SEARCH_LIMIT),
                ("prop", "coordinates|extracts"),
                ("coprimary", "primary"),
                ("exintro", "1"),
                ("explaintext", "1"),
                ("exlimit", SEARCH_LIMIT),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(DetectionError::Api(format!("HTTP {}", status.as_u16())));
        }

        let parsed: QueryResponse = response
            .json()
            .await
            .map_err(|e| DetectionError::Parse(e.to_string()))?;

        Ok(parsed.best_topic(&format!("wikipedia-{}", language)))
    }
}

#[async_trait]
impl EncyclopediaLookup for WikipediaClient {
    /// First topic with coordinates across languages, else the first topic found
    async fn lookup_topic(&self, text: &str) -> Result<Option<Topic>, DetectionError> {
        let mut fallback = None;
        let mut last_error = None;

        for language in &self.languages {
            match self.search(language, text).await {
                Ok(Some(topic)) if topic.coordinate.is_some() => return Ok(Some(topic)),
                Ok(Some(topic)) => {
                    fallback.get_or_insert(topic);
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::debug!(language = %language, error = %e, "Wikipedia search failed");
                    last_error = Some(e);
                }
            }
        }

        match (fallback, last_error) {
            (Some(topic), _) => Ok(Some(topic)),
            (None, Some(e)) => Err(e),
            (None, None) => Ok(None),
        }
    }
}
