//! GPS metadata writer
//!
//! Writes EXIF and XMP GPS tags losslessly through `exiftool`, then touches
//! the file so photo libraries notice the change and reindex it.

use crate::cascade::{ResolutionSink, SinkError};
use crate::geo::Coordinate;
use crate::record::ResolutionRecord;
use async_trait::async_trait;
use std::fs::{File, FileTimes};
use std::path::Path;
use std::process::Stdio;
use std::time::SystemTime;
use tokio::process::Command;

/// True when `exiftool -ver` runs successfully
pub async fn exiftool_available(exiftool_path: &str) -> bool {
    match Command::new(exiftool_path)
        .arg("-ver")
        .stdin(Stdio::null())
        .output()
        .await
    {
        Ok(output) if output.status.success() => {
            tracing::debug!(
                version = %String::from_utf8_lossy(&output.stdout).trim(),
                "exiftool available"
            );
            true
        }
        Ok(output) => {
            tracing::debug!(status = %output.status, "exiftool -ver failed");
            false
        }
        Err(e) => {
            tracing::debug!(error = %e, "exiftool not runnable");
            false
        }
    }
}

/// exiftool arguments for writing `coordinate` with `note` as user comment
pub fn exiftool_args(coordinate: &Coordinate, note: &str) -> Vec<String> {
    let lat_ref = if coordinate.lat >= 0.0 { "N" } else { "S" };
    let lon_ref = if coordinate.lon >= 0.0 { "E" } else { "W" };

    vec![
        "-overwrite_original".to_string(),
        "-P".to_string(),
        "-n".to_string(),
        format!("-GPSLatitude={}", coordinate.lat.abs()),
        format!("-GPSLongitude={}", coordinate.lon.abs()),
        format!("-GPSLatitudeRef={}", lat_ref),
        format!("-GPSLongitudeRef={}", lon_ref),
        "-GPSVersionID=2.3.0.0".to_string(),
        format!("-XMP:GPSLatitude={}", coordinate.lat),
        format!("-XMP:GPSLongitude={}", coordinate.lon),
        format!("-EXIF:UserComment={}", note),
    ]
}

/// Set access and modification time to now
///
/// Opens read-only: setting times needs ownership, not write access.
pub fn touch(path: &Path) -> std::io::Result<()> {
    let now = SystemTime::now();
    let file = File::open(path)?;
    file.set_times(FileTimes::new().set_accessed(now).set_modified(now))
}

/// Sink writing through exiftool
pub struct ExifToolSink {
    exiftool_path: String,
}

impl ExifToolSink {
    pub fn new(exiftool_path: impl Into<String>) -> Self {
        Self {
            exiftool_path: exiftool_path.into(),
        }
    }
}

#[async_trait]
impl ResolutionSink for ExifToolSink {
    async fn apply(&self, record: &ResolutionRecord) -> Result<(), SinkError> {
        let Some(coordinate) = record.coordinate else {
            return Ok(());
        };

        let output = Command::new(&self.exiftool_path)
            .args(exiftool_args(&coordinate, &record.source))
            .arg(&record.path)
            .stdin(Stdio::null())
            .output()
            .await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let message = stderr.lines().next().unwrap_or("").trim().to_string();
            return Err(SinkError::Tool(if message.is_empty() {
                format!("exit status {}", output.status)
            } else {
                message
            }));
        }

        // GPS is already on disk; a stale mtime only delays reindexing
        if let Err(e) = touch(&record.path) {
            tracing::warn!(
                file = %record.path.display(),
                error = %e,
                "Failed to update file times"
            );
        }

        tracing::info!(
            file = %record.path.display(),
            coordinate = %coordinate,
            action = %record.action,
            "GPS written"
        );
        Ok(())
    }
}
