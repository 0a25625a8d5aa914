//! Common error types for geofill

use thiserror::Error;

/// Common result type for geofill operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types across geofill crates
#[derive(Error, Debug)]
pub enum Error {
    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// TOML parse error
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Explicitly requested file does not exist
    #[error("Not found: {0}")]
    NotFound(String),
}
