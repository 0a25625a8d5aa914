//! Core types and collaborator traits
//!
//! The cascade never talks to a network or a filesystem directly. Every
//! external capability is one of the traits below, so stages can be driven
//! by the HTTP clients in [`crate::services`] or by in-memory fakes in tests.

use crate::geo::Coordinate;
use async_trait::async_trait;
use chrono::NaiveDateTime;
use std::path::PathBuf;
use thiserror::Error;

// ============================================================================
// Photo descriptor
// ============================================================================

/// One photo of a folder, as produced by the photo scanner
#[derive(Debug, Clone, PartialEq)]
pub struct PhotoDescriptor {
    /// Path to the image file
    pub path: PathBuf,
    /// Capture time (DateTimeOriginal → DateTime → mtime)
    pub captured_at: NaiveDateTime,
    /// 1-based position in capture order within the folder
    pub index: usize,
    /// GPS already embedded in the file
    pub existing: Option<Coordinate>,
    /// Re-resolve even when `existing` is set
    pub force: bool,
}

impl PhotoDescriptor {
    /// File name for logging
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| self.path.to_string_lossy().to_string())
    }
}

// ============================================================================
// Collaborator payloads
// ============================================================================

/// Landmark returned by a landmark detector
#[derive(Debug, Clone, PartialEq)]
pub struct Landmark {
    pub name: String,
    pub coordinate: Coordinate,
    /// Detector score (0.0-1.0)
    pub confidence: f32,
}

/// Encyclopedia topic matched for a free-text query
#[derive(Debug, Clone, PartialEq)]
pub struct Topic {
    /// Page title, used as a best-effort place name
    pub title: String,
    /// Coordinates published on the page, if any
    pub coordinate: Option<Coordinate>,
    /// Plain-text introduction; empty when the provider has none
    pub summary: String,
    /// Provider tag, e.g. "wikipedia-en"
    pub provider: String,
}

/// Geocoded place
#[derive(Debug, Clone, PartialEq)]
pub struct PlaceMatch {
    pub coordinate: Coordinate,
    /// Name the coordinate was found under
    pub label: String,
    /// Provider tag, e.g. "nominatim"
    pub provider: String,
}

/// Collaborator failure
///
/// Never fatal for a run: the cascade records it and advances.
#[derive(Debug, Error)]
pub enum DetectionError {
    /// Network communication error
    #[error("Network error: {0}")]
    Network(String),

    /// Service answered with an error (quota, auth, bad request)
    #[error("API error: {0}")]
    Api(String),

    /// Response could not be parsed
    #[error("Parse error: {0}")]
    Parse(String),
}

impl From<reqwest::Error> for DetectionError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            DetectionError::Parse(e.to_string())
        } else {
            DetectionError::Network(e.to_string())
        }
    }
}

// ============================================================================
// Collaborator traits
// ============================================================================

/// Landmark recognition
#[async_trait]
pub trait LandmarkDetector: Send + Sync {
    /// Landmarks found in the image, any order
    async fn detect_landmarks(&self, image: &[u8]) -> Result<Vec<Landmark>, DetectionError>;
}

/// Web entity / best-guess label detection
#[async_trait]
pub trait WebLabelDetector: Send + Sync {
    /// Labels ordered most-relevant first
    async fn detect_web_labels(&self, image: &[u8]) -> Result<Vec<String>, DetectionError>;
}

/// Text recognition
#[async_trait]
pub trait TextDetector: Send + Sync {
    /// Full extracted text, possibly empty
    async fn detect_text(&self, image: &[u8]) -> Result<String, DetectionError>;
}

/// Encyclopedia topic lookup used to disambiguate place names
#[async_trait]
pub trait EncyclopediaLookup: Send + Sync {
    async fn lookup_topic(&self, text: &str) -> Result<Option<Topic>, DetectionError>;
}

/// Place-name geocoding
#[async_trait]
pub trait Geocoder: Send + Sync {
    async fn geocode(&self, text: &str) -> Result<Option<PlaceMatch>, DetectionError>;
}

/// Perceptual image fingerprint
pub trait PerceptualHasher: Send + Sync {
    /// 64-bit hash, or `None` when the image cannot be decoded
    fn hash(&self, image: &[u8]) -> Option<u64>;
}
