//! Offline collaborators
//!
//! Stand-ins that never touch the network: detectors find nothing and the
//! geocoder knows no place. Used for `--offline` plan previews.

use crate::types::{
    DetectionError, EncyclopediaLookup, Geocoder, Landmark, LandmarkDetector, PlaceMatch,
    TextDetector, Topic, WebLabelDetector,
};
use async_trait::async_trait;

/// Detector that never detects anything
#[derive(Debug, Default, Clone, Copy)]
pub struct NullDetector;

#[async_trait]
impl LandmarkDetector for NullDetector {
    async fn detect_landmarks(&self, _image: &[u8]) -> Result<Vec<Landmark>, DetectionError> {
        Ok(Vec::new())
    }
}

#[async_trait]
impl WebLabelDetector for NullDetector {
    async fn detect_web_labels(&self, _image: &[u8]) -> Result<Vec<String>, DetectionError> {
        Ok(Vec::new())
    }
}

#[async_trait]
impl TextDetector for NullDetector {
    async fn detect_text(&self, _image: &[u8]) -> Result<String, DetectionError> {
        Ok(String::new())
    }
}

#[async_trait]
impl EncyclopediaLookup for NullDetector {
    async fn lookup_topic(&self, _text: &str) -> Result<Option<Topic>, DetectionError> {
        Ok(None)
    }
}

#[async_trait]
impl Geocoder for NullDetector {
    async fn geocode(&self, _text: &str) -> Result<Option<PlaceMatch>, DetectionError> {
        Ok(None)
    }
}
