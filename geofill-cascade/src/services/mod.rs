//! Collaborator implementations
//!
//! HTTP clients for the detection and lookup traits, the photo scanner, the
//! exiftool sink and the CSV result log.

pub mod metadata_writer;
pub mod nominatim_client;
pub mod null_detector;
pub mod photo_scanner;
pub mod result_log;
pub mod vision_client;
pub mod wikipedia_client;

pub use metadata_writer::{exiftool_available, ExifToolSink};
pub use nominatim_client::NominatimClient;
pub use null_detector::NullDetector;
pub use photo_scanner::{PhotoScanner, ScanError};
pub use result_log::{result_log_path, write_result_log};
pub use vision_client::VisionClient;
pub use wikipedia_client::WikipediaClient;
