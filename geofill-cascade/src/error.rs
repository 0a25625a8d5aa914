//! Run-level errors
//!
//! Per-photo problems never surface here: they become diagnostics or
//! `error_write` records. A [`RunError`] stops the whole run.

use crate::plan::PlanError;
use crate::services::ScanError;
use crate::types::DetectionError;
use std::path::PathBuf;
use thiserror::Error;

/// Fatal run error
#[derive(Debug, Error)]
pub enum RunError {
    /// Invalid configuration or missing credentials
    #[error(transparent)]
    Config(#[from] geofill_common::Error),

    /// exiftool missing while writes are enabled
    #[error("exiftool is not available at '{0}'. Install it or pass --exiftool-path")]
    ExifToolUnavailable(String),

    /// Plan file unreadable or of unknown shape
    #[error(transparent)]
    Plan(#[from] PlanError),

    /// Single-folder path missing or not a directory
    #[error(transparent)]
    Scan(#[from] ScanError),

    /// Neither a folder nor a plan was given
    #[error("Nothing to process: pass a folder path, --file or --multi-plan")]
    NoInput,

    /// Result log could not be written
    #[error("Cannot write result log {}: {source}", .path.display())]
    ResultLog {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    /// HTTP client construction failed
    #[error("Cannot create service client: {0}")]
    Client(#[from] DetectionError),

    /// Blocking task panicked or was aborted
    #[error("Background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}
