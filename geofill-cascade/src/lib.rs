//! geofill: location resolution cascade for photo batches
//!
//! Assigns coordinates to photos by asking, in order: landmark detection,
//! perceptual-similarity reuse, web labels, OCR text and finally the
//! operator's bias hints or the folder's last known coordinate.

pub mod cascade;
pub mod error;
pub mod geo;
pub mod name_resolver;
pub mod plan;
pub mod record;
pub mod runner;
pub mod services;
pub mod similarity;
pub mod types;

pub use error::RunError;
pub use geo::Coordinate;
pub use record::{Action, ResolutionRecord};
