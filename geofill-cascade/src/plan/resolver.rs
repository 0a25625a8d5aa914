//! Index → bias resolution

use super::model::PlanEntry;
use crate::geo::Coordinate;
use crate::types::Geocoder;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, warn};

/// Where a bias hint came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HintOrigin {
    /// A plan range (or the last plan entry for out-of-range indices)
    Plan,
    /// The operator's global `--hint`
    Global,
}

/// Bias in effect for one photo
#[derive(Debug, Clone, PartialEq)]
pub struct BiasContext {
    pub hint: String,
    pub origin: HintOrigin,
    /// Geocoded hint; `None` when the hint did not resolve
    pub coordinate: Option<Coordinate>,
    /// Radius for landmark, pHash and last-known candidates
    pub detect_radius_km: f64,
    /// Radius for name-resolution candidates
    pub name_radius_km: f64,
}

impl BiasContext {
    /// Center used for radius validation
    pub fn center(&self) -> Option<&Coordinate> {
        self.coordinate.as_ref()
    }
}

/// First entry containing `index`, else the last entry
///
/// Returns `None` only for an empty plan.
pub fn hint_for_index(entries: &[PlanEntry], index: usize) -> Option<&str> {
    entries
        .iter()
        .find(|e| e.contains(index))
        .or_else(|| entries.last())
        .map(|e| e.hint.as_str())
}

/// Folder-scoped hint → coordinate memo
///
/// Each distinct hint string is geocoded at most once per folder run.
#[derive(Debug, Default)]
pub struct HintCache {
    entries: HashMap<String, Option<Coordinate>>,
    warnings: Vec<String>,
}

impl HintCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Geocode `hint`, memoizing successes and failures alike
    pub async fn resolve(
        &mut self,
        hint: &str,
        geocoder: &dyn Geocoder,
        timeout: Duration,
    ) -> Option<Coordinate> {
        if let Some(cached) = self.entries.get(hint) {
            return *cached;
        }

        let coordinate = match tokio::time::timeout(timeout, geocoder.geocode(hint)).await {
            Ok(Ok(Some(place))) => {
                debug!(hint = %hint, coordinate = %place.coordinate, "Hint geocoded");
                Some(place.coordinate)
            }
            Ok(Ok(None)) => {
                warn!(hint = %hint, "Hint did not geocode");
                self.warnings.push(format!("hint_unresolved:{}", hint));
                None
            }
            Ok(Err(e)) => {
                warn!(hint = %hint, error = %e, "Hint geocoding failed");
                self.warnings.push(format!("hint_geocode_error:{}:{}", hint, e));
                None
            }
            Err(_) => {
                warn!(hint = %hint, "Hint geocoding timed out");
                self.warnings.push(format!("hint_geocode_error:{}:timeout", hint));
                None
            }
        };

        self.entries.insert(hint.to_string(), coordinate);
        coordinate
    }

    /// Number of distinct hints looked up so far
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drain warnings collected since the last call
    pub fn take_warnings(&mut self) -> Vec<String> {
        std::mem::take(&mut self.warnings)
    }
}

/// Maps photo indices of one folder to bias contexts
pub struct PlanResolver<'a> {
    entries: &'a [PlanEntry],
    global_hints: &'a [String],
    detect_radius_km: f64,
    name_radius_km: f64,
}

impl<'a> PlanResolver<'a> {
    pub fn new(
        entries: &'a [PlanEntry],
        global_hints: &'a [String],
        detect_radius_km: f64,
        name_radius_km: f64,
    ) -> Self {
        Self {
            entries,
            global_hints,
            detect_radius_km,
            name_radius_km,
        }
    }

    /// Bias context for `index`
    ///
    /// Plan hints are geocoded as-is. With an empty plan, the first global
    /// hint that geocodes wins. `None` means no bias at all.
    pub async fn bias_for(
        &self,
        index: usize,
        hints: &mut HintCache,
        geocoder: &dyn Geocoder,
        timeout: Duration,
    ) -> Option<BiasContext> {
        let (hint, origin, coordinate) = match hint_for_index(self.entries, index) {
            Some(hint) => {
                let coordinate = hints.resolve(hint, geocoder, timeout).await;
                (hint, HintOrigin::Plan, coordinate)
            }
            None => {
                let first = self.global_hints.first()?;
                let mut chosen = (first.as_str(), None);
                for hint in self.global_hints {
                    if let Some(c) = hints.resolve(hint, geocoder, timeout).await {
                        chosen = (hint.as_str(), Some(c));
                        break;
                    }
                }
                (chosen.0, HintOrigin::Global, chosen.1)
            }
        };

        Some(BiasContext {
            hint: hint.to_string(),
            origin,
            coordinate,
            detect_radius_km: self.detect_radius_km,
            name_radius_km: self.name_radius_km,
        })
    }
}

/// Split a comma-separated `--hint` value
pub fn split_global_hints(raw: Option<&str>) -> Vec<String> {
    raw.map(|s| {
        s.split(',')
            .map(str::trim)
            .filter(|h| !h.is_empty())
            .map(str::to_string)
            .collect()
    })
    .unwrap_or_default()
}
