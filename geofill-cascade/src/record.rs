//! Resolution records
//!
//! One [`ResolutionRecord`] is emitted per photo. It is the only thing the
//! metadata writer and the result log ever see.

use crate::geo::Coordinate;
use crate::types::PhotoDescriptor;
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;

/// Terminal action taken for a photo
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    /// Landmark detection
    WriteGcv,
    /// Reused from a perceptually similar photo
    WritePhash,
    /// Web label resolved to a place
    WriteWeb,
    /// OCR text resolved to a place
    WriteOcr,
    /// Plan range hint
    WriteHintSeedFile,
    /// Global operator hint
    WriteHintSeed,
    /// Most recent coordinate of the folder
    WriteLastKnown,
    /// Existing GPS replaced by a forced resolution
    ForceOverwriteHasGps,
    SkipHasGps,
    SkipStartIndex,
    SkipEndIndex,
    SkipNoSource,
    /// Sink rejected the resolution
    ErrorWrite,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::WriteGcv => "write_gcv",
            Action::WritePhash => "write_phash",
            Action::WriteWeb => "write_web",
            Action::WriteOcr => "write_ocr",
            Action::WriteHintSeedFile => "write_hint_seed_file",
            Action::WriteHintSeed => "write_hint_seed",
            Action::WriteLastKnown => "write_last_known",
            Action::ForceOverwriteHasGps => "force_overwrite_has_gps",
            Action::SkipHasGps => "skip_has_gps",
            Action::SkipStartIndex => "skip_start_index",
            Action::SkipEndIndex => "skip_end_index",
            Action::SkipNoSource => "skip_no_source",
            Action::ErrorWrite => "error_write",
        }
    }

    /// Whether a record with this action carries a coordinate
    ///
    /// `SkipHasGps` carries the coordinate already in the file.
    pub fn carries_coordinate(&self) -> bool {
        !matches!(
            self,
            Action::SkipStartIndex | Action::SkipEndIndex | Action::SkipNoSource | Action::ErrorWrite
        )
    }

    /// Whether the action means "a new coordinate must be written"
    pub fn is_write(&self) -> bool {
        self.carries_coordinate() && *self != Action::SkipHasGps
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Non-terminal stage observation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticTag {
    GcvEmpty,
    GcvError,
    GcvTooFar,
    PhashTooFar,
    WebError,
    OcrError,
}

impl DiagnosticTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            DiagnosticTag::GcvEmpty => "gcv_empty",
            DiagnosticTag::GcvError => "gcv_error",
            DiagnosticTag::GcvTooFar => "gcv_too_far",
            DiagnosticTag::PhashTooFar => "phash_too_far",
            DiagnosticTag::WebError => "web_error",
            DiagnosticTag::OcrError => "ocr_error",
        }
    }
}

impl fmt::Display for DiagnosticTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Diagnostic attached to a record
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Diagnostic {
    pub tag: DiagnosticTag,
    /// Rejected candidate, when there was one
    pub coordinate: Option<Coordinate>,
    pub detail: String,
}

impl Diagnostic {
    pub fn new(tag: DiagnosticTag, detail: impl Into<String>) -> Self {
        Self {
            tag,
            coordinate: None,
            detail: detail.into(),
        }
    }

    pub fn with_coordinate(mut self, coordinate: Coordinate) -> Self {
        self.coordinate = Some(coordinate);
        self
    }
}

/// Outcome for one photo
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolutionRecord {
    pub path: PathBuf,
    pub index: usize,
    pub coordinate: Option<Coordinate>,
    pub action: Action,
    /// Stage-specific write action when resolved (differs from `action` under force)
    pub resolved_by: Option<Action>,
    /// Provenance, also written into the EXIF user comment
    pub source: String,
    /// An existing GPS coordinate was replaced
    pub overwrote_existing: bool,
    pub diagnostics: Vec<Diagnostic>,
}

impl ResolutionRecord {
    /// Record for a photo the cascade never ran on
    pub fn skipped(photo: &PhotoDescriptor, action: Action) -> Self {
        Self {
            path: photo.path.clone(),
            index: photo.index,
            coordinate: None,
            action,
            resolved_by: None,
            source: String::new(),
            overwrote_existing: false,
            diagnostics: Vec::new(),
        }
    }

    /// Photo keeps its embedded GPS
    pub fn has_gps(photo: &PhotoDescriptor, existing: Coordinate) -> Self {
        Self {
            coordinate: Some(existing),
            source: format!("[exif:{}]", photo.file_name()),
            ..Self::skipped(photo, Action::SkipHasGps)
        }
    }

    /// Every stage exhausted
    pub fn unresolved(photo: &PhotoDescriptor, diagnostics: Vec<Diagnostic>) -> Self {
        Self {
            diagnostics,
            ..Self::skipped(photo, Action::SkipNoSource)
        }
    }

    /// Resolved by `stage_action`; forced photos with GPS are re-tagged
    pub fn resolved(
        photo: &PhotoDescriptor,
        coordinate: Coordinate,
        stage_action: Action,
        source: String,
        diagnostics: Vec<Diagnostic>,
    ) -> Self {
        let overwrote_existing = photo.force && photo.existing.is_some();
        let (action, source) = if overwrote_existing {
            (
                Action::ForceOverwriteHasGps,
                format!("{}:{}", stage_action.as_str(), source),
            )
        } else {
            (stage_action, source)
        };

        Self {
            path: photo.path.clone(),
            index: photo.index,
            coordinate: Some(coordinate),
            action,
            resolved_by: Some(stage_action),
            source,
            overwrote_existing,
            diagnostics,
        }
    }

    /// Downgrade a resolution the sink failed to persist
    pub fn into_write_error(self, message: impl fmt::Display) -> Self {
        Self {
            coordinate: None,
            action: Action::ErrorWrite,
            overwrote_existing: false,
            source: format!("exiftool:{}", message),
            ..self
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.action.is_write()
    }
}
