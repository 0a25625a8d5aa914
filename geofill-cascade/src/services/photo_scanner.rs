//! Photo scanner
//!
//! Lists the photos directly inside a folder (no recursion), orders them by
//! capture time and reads any GPS coordinate already embedded.

use crate::geo::Coordinate;
use crate::types::PhotoDescriptor;
use chrono::{DateTime, Local, NaiveDateTime};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use thiserror::Error;

/// Extensions treated as photos (compared lowercase)
pub const PHOTO_EXTENSIONS: &[&str] = &[
    "jpg", "jpeg", "heic", "heif", "tif", "tiff", "png", "dng", "nef", "cr2", "arw", "rw2", "orf",
    "raf", "srw",
];

const EXIF_DATETIME_FORMAT: &str = "%Y:%m:%d %H:%M:%S";

/// Scanner errors
#[derive(Debug, Error)]
pub enum ScanError {
    /// Specified path does not exist
    #[error("Path not found: {0}")]
    PathNotFound(PathBuf),

    /// Path exists but is not a directory
    #[error("Not a directory: {0}")]
    NotADirectory(PathBuf),

    /// Directory could not be listed
    #[error("I/O error reading {0}: {1}")]
    Io(PathBuf, std::io::Error),
}

/// Metadata read from one file
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PhotoMetadata {
    pub captured_at: Option<NaiveDateTime>,
    pub gps: Option<Coordinate>,
}

/// Non-recursive photo scanner
#[derive(Debug, Clone, Copy, Default)]
pub struct PhotoScanner {
    force: bool,
}

impl PhotoScanner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark every photo for re-resolution even when it already has GPS
    pub fn with_force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    /// Photos of `dir` sorted by (capture time, lowercase file name), indexed from 1
    pub fn scan(&self, dir: &Path) -> Result<Vec<PhotoDescriptor>, ScanError> {
        if !dir.exists() {
            return Err(ScanError::PathNotFound(dir.to_path_buf()));
        }
        if !dir.is_dir() {
            return Err(ScanError::NotADirectory(dir.to_path_buf()));
        }

        let entries = std::fs::read_dir(dir).map_err(|e| ScanError::Io(dir.to_path_buf(), e))?;

        let mut found: Vec<(NaiveDateTime, String, PathBuf, Option<Coordinate>)> = Vec::new();
        for entry in entries {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::warn!("Error accessing entry in {}: {}", dir.display(), e);
                    continue;
                }
            };

            let path = entry.path();
            if !path.is_file() || !is_photo(&path) {
                continue;
            }

            let metadata = read_metadata(&path);
            let captured_at = metadata
                .captured_at
                .unwrap_or_else(|| modified_time(&path));
            let sort_name = entry.file_name().to_string_lossy().to_lowercase();
            found.push((captured_at, sort_name, path, metadata.gps));
        }

        found.sort_by(|a, b| (a.0, &a.1).cmp(&(b.0, &b.1)));

        let photos: Vec<PhotoDescriptor> = found
            .into_iter()
            .enumerate()
            .map(|(i, (captured_at, _, path, existing))| PhotoDescriptor {
                path,
                captured_at,
                index: i + 1,
                existing,
                force: self.force,
            })
            .collect();

        tracing::debug!(
            dir = %dir.display(),
            photos = photos.len(),
            with_gps = photos.iter().filter(|p| p.existing.is_some()).count(),
            "Folder scanned"
        );

        Ok(photos)
    }
}

/// True for files with a known photo extension
pub fn is_photo(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| PHOTO_EXTENSIONS.contains(&e.to_lowercase().as_str()))
        .unwrap_or(false)
}

/// Capture time and GPS from EXIF; missing or unreadable EXIF yields empty metadata
pub fn read_metadata(path: &Path) -> PhotoMetadata {
    let exif = match File::open(path).map(BufReader::new).and_then(|mut reader| {
        exif::Reader::new()
            .read_from_container(&mut reader)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string()))
    }) {
        Ok(exif) => exif,
        Err(e) => {
            tracing::trace!(file = %path.display(), error = %e, "No EXIF");
            return PhotoMetadata::default();
        }
    };

    let captured_at = [exif::Tag::DateTimeOriginal, exif::Tag::DateTime]
        .into_iter()
        .find_map(|tag| ascii_field(&exif, tag).and_then(|s| parse_exif_datetime(&s)));

    let gps = coordinate_from_fields(
        exif.get_field(exif::Tag::GPSLatitude, exif::In::PRIMARY),
        exif.get_field(exif::Tag::GPSLatitudeRef, exif::In::PRIMARY),
        exif.get_field(exif::Tag::GPSLongitude, exif::In::PRIMARY),
        exif.get_field(exif::Tag::GPSLongitudeRef, exif::In::PRIMARY),
    );

    PhotoMetadata { captured_at, gps }
}

fn ascii_field(exif: &exif::Exif, tag: exif::Tag) -> Option<String> {
    match &exif.get_field(tag, exif::In::PRIMARY)?.value {
        exif::Value::Ascii(parts) => parts
            .first()
            .map(|bytes| String::from_utf8_lossy(bytes).trim().to_string()),
        _ => None,
    }
}

/// Parse "YYYY:MM:DD HH:MM:SS"
pub fn parse_exif_datetime(raw: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(raw.trim(), EXIF_DATETIME_FORMAT).ok()
}

/// Decimal coordinate from GPS DMS rationals and N/S/E/W references
pub fn coordinate_from_fields(
    lat: Option<&exif::Field>,
    lat_ref: Option<&exif::Field>,
    lon: Option<&exif::Field>,
    lon_ref: Option<&exif::Field>,
) -> Option<Coordinate> {
    let mut latitude = dms_degrees(lat?)?;
    let mut longitude = dms_degrees(lon?)?;

    if lat_ref.and_then(reference_letter) == Some(b'S') {
        latitude = -latitude;
    }
    if lon_ref.and_then(reference_letter) == Some(b'W') {
        longitude = -longitude;
    }

    Some(Coordinate::new(latitude, longitude)).filter(Coordinate::is_valid)
}

fn dms_degrees(field: &exif::Field) -> Option<f64> {
    match &field.value {
        exif::Value::Rational(parts) if !parts.is_empty() => {
            let part = |i: usize| parts.get(i).map(|r| r.to_f64()).unwrap_or(0.0);
            Some(part(0) + part(1) / 60.0 + part(2) / 3600.0)
        }
        _ => None,
    }
}

fn reference_letter(field: &exif::Field) -> Option<u8> {
    match &field.value {
        exif::Value::Ascii(parts) => parts
            .first()
            .and_then(|s| s.first())
            .map(|b| b.to_ascii_uppercase()),
        _ => None,
    }
}

fn modified_time(path: &Path) -> NaiveDateTime {
    let modified = std::fs::metadata(path)
        .and_then(|m| m.modified())
        .unwrap_or(SystemTime::UNIX_EPOCH);
    DateTime::<Local>::from(modified).naive_local()
}
