//! Folder-scoped similarity cache

use super::phash::hamming_distance;
use crate::geo::Coordinate;

/// Resolved photo remembered for reuse
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub hash: u64,
    pub coordinate: Coordinate,
    /// Place label the coordinate was resolved under
    pub label: String,
    /// Provider that produced it ("gcv", "wikipedia-en", "nominatim", ...)
    pub provider: String,
    /// Insertion order, 0-based
    pub order: usize,
}

/// Best match for a queried hash
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CacheHit<'a> {
    pub entry: &'a CacheEntry,
    pub distance: u32,
}

/// Append-only store of resolved hashes
///
/// Never evicts: it lives for one folder run and holds at most one entry per
/// photo of that folder.
#[derive(Debug)]
pub struct SimilarityCache {
    entries: Vec<CacheEntry>,
    threshold: u32,
}

impl SimilarityCache {
    pub fn new(threshold: u32) -> Self {
        Self {
            entries: Vec::new(),
            threshold,
        }
    }

    /// Closest entry within the threshold; ties go to the earliest insertion
    pub fn lookup(&self, hash: u64) -> Option<CacheHit<'_>> {
        let mut best: Option<CacheHit<'_>> = None;
        for entry in &self.entries {
            let distance = hamming_distance(hash, entry.hash);
            if distance > self.threshold {
                continue;
            }
            if best.map_or(true, |b| distance < b.distance) {
                best = Some(CacheHit { entry, distance });
            }
        }
        best
    }

    pub fn record(
        &mut self,
        hash: u64,
        coordinate: Coordinate,
        label: impl Into<String>,
        provider: impl Into<String>,
    ) {
        let order = self.entries.len();
        self.entries.push(CacheEntry {
            hash,
            coordinate,
            label: label.into(),
            provider: provider.into(),
            order,
        });
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
