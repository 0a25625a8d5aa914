//! Perceptual-similarity reuse
//!
//! Photos shot seconds apart of the same scene hash to nearby values; once
//! one of them is resolved by detection, the others can reuse its coordinate.

pub mod cache;
pub mod phash;

pub use cache::{CacheEntry, CacheHit, SimilarityCache};
pub use phash::{hamming_distance, DctHasher};
