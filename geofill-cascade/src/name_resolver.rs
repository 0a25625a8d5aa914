//! Free text → coordinate resolution
//!
//! Text is first looked up as an encyclopedia topic so that ambiguous names
//! ("Kyoto") resolve to the place rather than a namesake, then geocoded.
//!
//! With an active bias the hint is appended to the query ("Golden Pavilion
//! Kyoto, Japan") and an encyclopedia topic must mention one of the hint's
//! tokens in its title or summary. The lookup outcome is memoized per exact
//! query for the whole run; the bias radius is checked on every call.

use crate::geo::{within_radius, Coordinate};
use crate::plan::BiasContext;
use crate::types::{EncyclopediaLookup, Geocoder, PlaceMatch, Topic};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::debug;

/// Words that name a kind of place rather than a place
const GENERIC_LABELS: &[&str] = &[
    "summit", "viewpoint", "overlook", "entrance", "exit", "ticket", "gate", "temple",
    "pagoda", "church", "cathedral", "museum", "station", "bridge", "castle", "palace",
    "plaza", "square", "park", "garden", "street", "city", "town", "village", "market",
    "waterfall", "beach", "mountain", "river", "lake", "island", "tower", "monument",
    "memorial", "statue", "building", "university", "campus", "airport", "harbor", "port",
];

/// Multi-word labels that are generic only as a whole
const GENERIC_PHRASES: &[&str] = &["bus station", "train station"];

/// True for labels too generic to geocode ("Temple", "Bus station", "Gate")
pub fn is_generic_label(text: &str) -> bool {
    let lowered = text.trim().to_lowercase();
    if lowered.chars().count() < 4 {
        return true;
    }

    let words: Vec<&str> = lowered
        .split(|c: char| !(c.is_alphabetic() || c == '\''))
        .filter(|w| !w.is_empty())
        .collect();
    if words.is_empty() {
        return true;
    }

    GENERIC_PHRASES.contains(&words.join(" ").as_str())
        || words.iter().all(|w| GENERIC_LABELS.contains(w))
}

/// Words dropped from hint tokens
const HINT_STOP_WORDS: &[&str] = &[
    "the", "of", "de", "la", "el", "los", "las", "y", "and", "en", "do", "da",
];

/// Lowercased hint words a matching topic must mention
///
/// "Kyoto, Japan" gives `["kyoto", "japan"]`; stop words and words shorter
/// than three letters are dropped.
pub fn hint_tokens(hint: &str) -> Vec<String> {
    hint.to_lowercase()
        .split(|c: char| !(c.is_alphabetic() || c == '\''))
        .filter(|t| t.chars().count() >= 3 && !HINT_STOP_WORDS.contains(t))
        .map(str::to_string)
        .collect()
}

/// True when `topic` mentions any of `tokens`, or `tokens` is empty
pub fn topic_mentions_hint(topic: &Topic, tokens: &[String]) -> bool {
    if tokens.is_empty() {
        return true;
    }
    let title = topic.title.to_lowercase();
    let summary = topic.summary.to_lowercase();
    tokens
        .iter()
        .any(|t| title.contains(t.as_str()) || summary.contains(t.as_str()))
}

/// Query and topic filter for one lookup
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct LookupKey {
    query: String,
    tokens: Vec<String>,
}

impl LookupKey {
    /// The hint applies only when it geocoded; an unresolved hint is no bias
    fn new(text: &str, bias: Option<&BiasContext>) -> Self {
        match bias.filter(|b| b.center().is_some()) {
            Some(bias) => Self {
                query: format!("{} {}", text, bias.hint).trim().to_string(),
                tokens: hint_tokens(&bias.hint),
            },
            None => Self {
                query: text.to_string(),
                tokens: Vec::new(),
            },
        }
    }
}

/// Name-to-coordinate resolver with run-scoped memoization
pub struct NameResolver {
    encyclopedia: Arc<dyn EncyclopediaLookup>,
    geocoder: Arc<dyn Geocoder>,
    timeout: Duration,
    memo: Mutex<HashMap<LookupKey, Option<PlaceMatch>>>,
}

impl NameResolver {
    pub fn new(
        encyclopedia: Arc<dyn EncyclopediaLookup>,
        geocoder: Arc<dyn Geocoder>,
        timeout: Duration,
    ) -> Self {
        Self {
            encyclopedia,
            geocoder,
            timeout,
            memo: Mutex::new(HashMap::new()),
        }
    }

    /// Resolve `text` under `bias`
    ///
    /// Matches farther than the bias name radius are rejected. Every failure
    /// mode (generic text, no match, service error, timeout, bias rejection)
    /// is `None`.
    pub async fn resolve(&self, text: &str, bias: Option<&BiasContext>) -> Option<PlaceMatch> {
        if is_generic_label(text) {
            debug!(text = %text, "Skipping generic label");
            return None;
        }

        let key = LookupKey::new(text, bias);
        let place = {
            // Held across the lookup so a query is never sent twice,
            // even by concurrently running folders
            let mut memo = self.memo.lock().await;
            match memo.get(&key) {
                Some(cached) => cached.clone(),
                None => {
                    let outcome = self.lookup(&key).await;
                    memo.insert(key.clone(), outcome.clone());
                    outcome
                }
            }
        }?;

        let center = bias.and_then(BiasContext::center);
        let radius_km = bias.map_or(f64::INFINITY, |b| b.name_radius_km);
        if !within_radius(&place.coordinate, center, radius_km) {
            debug!(
                query = %key.query,
                label = %place.label,
                coordinate = %place.coordinate,
                radius_km,
                "Name resolution outside bias radius"
            );
            return None;
        }

        Some(place)
    }

    /// Distinct queries looked up so far
    pub async fn memo_len(&self) -> usize {
        self.memo.lock().await.len()
    }

    async fn lookup(&self, key: &LookupKey) -> Option<PlaceMatch> {
        let query = key.query.as_str();
        let topic =
            match tokio::time::timeout(self.timeout, self.encyclopedia.lookup_topic(query)).await {
                Ok(Ok(topic)) => topic,
                Ok(Err(e)) => {
                    debug!(query = %query, error = %e, "Encyclopedia lookup failed");
                    None
                }
                Err(_) => {
                    debug!(query = %query, "Encyclopedia lookup timed out");
                    None
                }
            };

        // The geocoder query carries the hint itself, so it needs no token check
        let geocode_query = match topic {
            Some(topic) if topic_mentions_hint(&topic, &key.tokens) => match topic.coordinate {
                Some(coordinate) => {
                    return Some(PlaceMatch {
                        coordinate,
                        label: topic.title,
                        provider: topic.provider,
                    });
                }
                None => topic.title,
            },
            Some(topic) => {
                debug!(query = %query, title = %topic.title, "Topic does not mention the hint");
                query.to_string()
            }
            None => query.to_string(),
        };

        match tokio::time::timeout(self.timeout, self.geocoder.geocode(&geocode_query)).await {
            Ok(Ok(place)) => place,
            Ok(Err(e)) => {
                debug!(query = %geocode_query, error = %e, "Geocoding failed");
                None
            }
            Err(_) => {
                debug!(query = %geocode_query, "Geocoding timed out");
                None
            }
        }
    }
}
