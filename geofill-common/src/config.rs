//! Configuration loading and credential resolution
//!
//! Resolution priority for every tunable:
//! 1. Command-line flag (applied by the binary)
//! 2. TOML config file
//! 3. Compiled default
//!
//! The Vision API key is resolved ENV → TOML.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable holding an explicit config file path
pub const CONFIG_PATH_ENV: &str = "GEOFILL_CONFIG";

/// Environment variable holding the Vision API key
pub const VISION_API_KEY_ENV: &str = "GEOFILL_VISION_API_KEY";

/// Top-level TOML configuration
///
/// Every section is optional; missing sections take compiled defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TomlConfig {
    /// Google Cloud Vision API key
    pub vision_api_key: Option<String>,
    /// Logging settings
    pub logging: LoggingConfig,
    /// Cascade thresholds and limits
    pub cascade: CascadeSettings,
    /// External service and tool settings
    pub services: ServiceSettings,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default log level when RUST_LOG is unset ("trace" .. "error")
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Cascade thresholds
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CascadeSettings {
    /// Minimum landmark confidence accepted (0.0-1.0)
    pub min_landmark_confidence: f32,
    /// Radius around the bias for automatically detected candidates
    pub detect_radius_km: f64,
    /// Radius around the bias for name-resolution candidates
    pub name_radius_km: f64,
    /// Timeout applied to every external call, fractional seconds allowed
    pub call_timeout_secs: f64,
    /// Maximum Hamming distance for perceptual-hash reuse
    pub phash_threshold: u32,
    /// Web labels tried per photo
    pub max_web_labels: usize,
    /// OCR lines tried per photo
    pub max_ocr_lines: usize,
    /// Folders processed concurrently in multi-folder mode
    pub max_concurrent_folders: usize,
}

impl Default for CascadeSettings {
    fn default() -> Self {
        Self {
            min_landmark_confidence: 0.60,
            detect_radius_km: 20.0,
            name_radius_km: 50.0,
            call_timeout_secs: 20.0,
            phash_threshold: 5,
            max_web_labels: 8,
            max_ocr_lines: 5,
            max_concurrent_folders: 1,
        }
    }
}

impl CascadeSettings {
    /// Reject settings that break cascade invariants
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.min_landmark_confidence) {
            return Err(Error::Config(format!(
                "min_landmark_confidence must be within 0.0-1.0, got {}",
                self.min_landmark_confidence
            )));
        }
        if !(self.detect_radius_km > 0.0 && self.name_radius_km > 0.0) {
            return Err(Error::Config(format!(
                "bias radii must be positive (detect={}, name={})",
                self.detect_radius_km, self.name_radius_km
            )));
        }
        if self.detect_radius_km > self.name_radius_km {
            return Err(Error::Config(format!(
                "detect_radius_km ({}) must not exceed name_radius_km ({})",
                self.detect_radius_km, self.name_radius_km
            )));
        }
        if !(self.call_timeout_secs > 0.0 && self.call_timeout_secs.is_finite()) {
            return Err(Error::Config(format!(
                "call_timeout_secs must be a positive number of seconds, got {}",
                self.call_timeout_secs
            )));
        }
        if self.phash_threshold > 64 {
            return Err(Error::Config(format!(
                "phash_threshold must be within 0-64, got {}",
                self.phash_threshold
            )));
        }
        if self.max_concurrent_folders == 0 {
            return Err(Error::Config("max_concurrent_folders must be at least 1".to_string()));
        }
        Ok(())
    }
}

/// External services and tools
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServiceSettings {
    /// Path to the exiftool binary
    pub exiftool_path: String,
    /// User-Agent sent to Nominatim and Wikipedia
    pub user_agent: String,
    /// Wikipedia languages tried in order
    pub wikipedia_languages: Vec<String>,
    /// Directory receiving result CSV files (default: working directory)
    pub output_dir: Option<PathBuf>,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            exiftool_path: "exiftool".to_string(),
            user_agent: concat!("geofill/", env!("CARGO_PKG_VERSION")).to_string(),
            wikipedia_languages: vec!["es".to_string(), "en".to_string()],
            output_dir: None,
        }
    }
}

/// Locate the config file
///
/// **Priority:** CLI path → `GEOFILL_CONFIG` → `<config_dir>/geofill/config.toml`
///
/// Returns `None` when nothing was requested and no default file exists.
pub fn config_file_path(cli_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = cli_path {
        return Some(path.to_path_buf());
    }

    if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
        if !path.trim().is_empty() {
            return Some(PathBuf::from(path));
        }
    }

    dirs::config_dir()
        .map(|d| d.join("geofill").join("config.toml"))
        .filter(|p| p.exists())
}

/// Load TOML configuration
///
/// A missing default file is not an error: compiled defaults are used.
/// An explicitly requested file that does not exist is a configuration error.
pub fn load_toml_config(cli_path: Option<&Path>) -> Result<TomlConfig> {
    let explicit = cli_path.is_some() || std::env::var(CONFIG_PATH_ENV).is_ok();

    let Some(path) = config_file_path(cli_path) else {
        info!("No config file found, using compiled defaults");
        return Ok(TomlConfig::default());
    };

    if !path.exists() {
        if explicit {
            return Err(Error::NotFound(format!("config file {}", path.display())));
        }
        warn!("Config file {} vanished, using compiled defaults", path.display());
        return Ok(TomlConfig::default());
    }

    let content = std::fs::read_to_string(&path)?;
    let config: TomlConfig = toml::from_str(&content)?;
    config.cascade.validate()?;

    info!("Loaded config from {}", path.display());
    Ok(config)
}

/// Resolve the Vision API key
///
/// **Priority:** ENV → TOML
pub fn resolve_vision_api_key(toml_config: &TomlConfig) -> Result<String> {
    let env_key = std::env::var(VISION_API_KEY_ENV)
        .ok()
        .filter(|k| is_valid_key(k));
    let toml_key = toml_config
        .vision_api_key
        .as_ref()
        .filter(|k| is_valid_key(k));

    if env_key.is_some() && toml_key.is_some() {
        warn!("Vision API key found in both environment and TOML. Using environment.");
    }

    if let Some(key) = env_key {
        info!("Vision API key loaded from environment variable");
        return Ok(key.trim().to_string());
    }

    if let Some(key) = toml_key {
        info!("Vision API key loaded from TOML config");
        return Ok(key.trim().to_string());
    }

    Err(Error::Config(format!(
        "Vision API key not configured. Please configure using one of:\n\
         1. Environment: {}=your-key-here\n\
         2. TOML config: vision_api_key = \"your-key\"",
        VISION_API_KEY_ENV
    )))
}

/// Validate API key (non-empty, non-whitespace)
pub fn is_valid_key(key: &str) -> bool {
    !key.trim().is_empty()
}
