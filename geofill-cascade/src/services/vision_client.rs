//! Google Cloud Vision REST client
//!
//! One `images:annotate` request per feature. Implements the landmark,
//! web-label and text detector traits.

use crate::geo::Coordinate;
use crate::types::{DetectionError, Landmark, LandmarkDetector, TextDetector, WebLabelDetector};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const VISION_ANNOTATE_URL: &str = "https://vision.googleapis.com/v1/images:annotate";
const MAX_RESULTS: u32 = 10;

/// Vision feature requested per call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Feature {
    Landmark,
    Web,
    Text,
}

impl Feature {
    fn api_name(&self) -> &'static str {
        match self {
            Feature::Landmark => "LANDMARK_DETECTION",
            Feature::Web => "WEB_DETECTION",
            Feature::Text => "TEXT_DETECTION",
        }
    }
}

// ============================================================================
// Wire format
// ============================================================================

#[derive(Debug, Serialize)]
struct AnnotateRequest<'a> {
    requests: [ImageRequest<'a>; 1],
}

#[derive(Debug, Serialize)]
struct ImageRequest<'a> {
    image: ImageContent,
    features: [FeatureRequest<'a>; 1],
}

#[derive(Debug, Serialize)]
struct ImageContent {
    content: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct FeatureRequest<'a> {
    #[serde(rename = "type")]
    feature_type: &'a str,
    max_results: u32,
}

/// `images:annotate` response
#[derive(Debug, Default, Deserialize)]
pub struct AnnotateResponse {
    #[serde(default)]
    pub responses: Vec<ImageResponse>,
}

/// Per-image response
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ImageResponse {
    pub landmark_annotations: Vec<LandmarkAnnotation>,
    pub web_detection: Option<WebDetection>,
    pub text_annotations: Vec<TextAnnotation>,
    pub error: Option<Status>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LandmarkAnnotation {
    pub description: String,
    pub score: f32,
    pub locations: Vec<LocationInfo>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LocationInfo {
    pub lat_lng: Option<LatLng>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct LatLng {
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WebDetection {
    pub web_entities: Vec<WebEntity>,
    pub best_guess_labels: Vec<BestGuessLabel>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct WebEntity {
    pub description: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct BestGuessLabel {
    pub label: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct TextAnnotation {
    pub description: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Status {
    pub code: i32,
    pub message: String,
}

// ============================================================================
// Response interpretation
// ============================================================================

impl ImageResponse {
    /// Per-image API error, if the service reported one
    fn check(self) -> Result<Self, DetectionError> {
        if let Some(status) = &self.error {
            if !status.message.is_empty() {
                return Err(DetectionError::Api(status.message.clone()));
            }
        }
        Ok(self)
    }

    /// Landmarks with at least one location, in response order
    pub fn landmarks(&self) -> Vec<Landmark> {
        self.landmark_annotations
            .iter()
            .filter_map(|a| {
                let lat_lng = a.locations.iter().find_map(|l| l.lat_lng.as_ref())?;
                Some(Landmark {
                    name: a.description.trim().to_string(),
                    coordinate: Coordinate::new(lat_lng.latitude, lat_lng.longitude),
                    confidence: a.score,
                })
            })
            .collect()
    }

    /// Best-guess labels first, then web entities
    pub fn web_labels(&self) -> Vec<String> {
        let Some(web) = &self.web_detection else {
            return Vec::new();
        };
        web.best_guess_labels
            .iter()
            .filter_map(|l| l.label.as_deref())
            .chain(web.web_entities.iter().filter_map(|e| e.description.as_deref()))
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect()
    }

    /// Full text (the first annotation holds the whole block)
    pub fn full_text(&self) -> String {
        self.text_annotations
            .first()
            .map(|a| a.description.trim().to_string())
            .unwrap_or_default()
    }
}

// ============================================================================
// Client
// ============================================================================

/// Vision API client
pub struct VisionClient {
    http_client: reqwest::Client,
    api_key: String,
    endpoint: String,
}

impl VisionClient {
    pub fn new(api_key: String, timeout: Duration, user_agent: &str) -> Result<Self, DetectionError> {
        let http_client = reqwest::Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .build()
            .map_err(|e| DetectionError::Network(e.to_string()))?;

        Ok(Self {
            http_client,
            api_key,
            endpoint: VISION_ANNOTATE_URL.to_string(),
        })
    }

    /// Annotate one image with one feature
    pub async fn annotate(&self, image: &[u8], feature: Feature) -> Result<ImageResponse, DetectionError> {
        let body = AnnotateRequest {
            requests: [ImageRequest {
                image: ImageContent {
                    content: BASE64.encode(image),
                },
                features: [FeatureRequest {
                    feature_type: feature.api_name(),
                    max_results: MAX_RESULTS,
                }],
            }],
        };

        tracing::debug!(feature = feature.api_name(), bytes = image.len(), "Querying Vision API");

        let response = self
            .http_client
            .post(&self.endpoint)
            .query(&[("key", self.api_key.as_str())])
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(DetectionError::Api(format!("HTTP {}: {}", status.as_u16(), error_text)));
        }

        let parsed: AnnotateResponse = response
            .json()
            .await
            .map_err(|e| DetectionError::Parse(e.to_string()))?;

        parsed
            .responses
            .into_iter()
            .next()
            .unwrap_or_default()
            .check()
    }
}

#[async_trait]
impl LandmarkDetector for VisionClient {
    async fn detect_landmarks(&self, image: &[u8]) -> Result<Vec<Landmark>, DetectionError> {
        Ok(self.annotate(image, Feature::Landmark).await?.landmarks())
    }
}

#[async_trait]
impl WebLabelDetector for VisionClient {
    async fn detect_web_labels(&self, image: &[u8]) -> Result<Vec<String>, DetectionError> {
        Ok(self.annotate(image, Feature::Web).await?.web_labels())
    }
}

#[async_trait]
impl TextDetector for VisionClient {
    async fn detect_text(&self, image: &[u8]) -> Result<String, DetectionError> {
        Ok(self.annotate(image, Feature::Text).await?.full_text())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn first(json: &str) -> ImageResponse {
        let parsed: AnnotateResponse = serde_json::from_str(json).unwrap();
        parsed.responses.into_iter().next().unwrap()
    }

    #[test]
    fn test_landmarks_parsed() {
        let response = first(
            r#"{"responses":[{"landmarkAnnotations":[
                {"mid":"/m/0","description":"Kinkaku-ji","score":0.91,
                 "locations":[{"latLng":{"latitude":35.0394,"longitude":135.7292}}]},
                {"description":"No location","score":0.99,"locations":[]}
            ]}]}"#,
        );
        let landmarks = response.landmarks();
        assert_eq!(landmarks.len(), 1);
        assert_eq!(landmarks[0].name, "Kinkaku-ji");
        assert_eq!(landmarks[0].coordinate, Coordinate::new(35.0394, 135.7292));
        assert!((landmarks[0].confidence - 0.91).abs() < 1e-6);
    }

    #[test]
    fn test_web_labels_best_guess_first() {
        let response = first(
            r#"{"responses":[{"webDetection":{
                "webEntities":[{"entityId":"x","description":"Fushimi Inari-taisha","score":1.2},{"score":0.3}],
                "bestGuessLabels":[{"label":"fushimi inari shrine"}]
            }}]}"#,
        );
        assert_eq!(
            response.web_labels(),
            vec!["fushimi inari shrine", "Fushimi Inari-taisha"]
        );
    }

    #[test]
    fn test_full_text_uses_first_annotation() {
        let response = first(
            r#"{"responses":[{"textAnnotations":[
                {"locale":"ja","description":"清水寺\nKIYOMIZU-DERA\n"},
                {"description":"KIYOMIZU-DERA"}
            ]}]}"#,
        );
        assert_eq!(response.full_text(), "清水寺\nKIYOMIZU-DERA");
    }

    #[test]
    fn test_empty_response_is_empty() {
        let response = first(r#"{"responses":[{}]}"#);
        assert!(response.landmarks().is_empty());
        assert!(response.web_labels().is_empty());
        assert_eq!(response.full_text(), "");
    }

    #[test]
    fn test_per_image_error_surfaces_as_api_error() {
        let response = first(
            r#"{"responses":[{"error":{"code":7,"message":"billing disabled"}}]}"#,
        );
        match response.check() {
            Err(DetectionError::Api(message)) => assert_eq!(message, "billing disabled"),
            other => panic!("expected API error, got {:?}", other),
        }
    }

    #[test]
    fn test_request_body_shape() {
        let body = AnnotateRequest {
            requests: [ImageRequest {
                image: ImageContent {
                    content: BASE64.encode(b"abc"),
                },
                features: [FeatureRequest {
                    feature_type: Feature::Text.api_name(),
                    max_results: MAX_RESULTS,
                }],
            }],
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["requests"][0]["image"]["content"], "YWJj");
        assert_eq!(json["requests"][0]["features"][0]["type"], "TEXT_DETECTION");
        assert_eq!(json["requests"][0]["features"][0]["maxResults"], 10);
    }
}
