//! Cascade stages
//!
//! One handler per [`Stage`]. Handlers only read folder state; the fold
//! commits a [`Candidate`] after the sink accepts it.

use super::{CascadeConfig, Collaborators, FolderState};
use crate::geo::{within_radius, Coordinate};
use crate::plan::{BiasContext, HintOrigin};
use crate::record::{Action, Diagnostic, DiagnosticTag};
use crate::types::{Landmark, PerceptualHasher, PhotoDescriptor};
use std::collections::HashSet;
use tracing::debug;

/// Cascade position, in evaluation order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Landmark,
    PHashReuse,
    WebLabels,
    Ocr,
    BiasFallback,
}

impl Stage {
    pub const FIRST: Stage = Stage::Landmark;

    pub fn next(self) -> Option<Stage> {
        match self {
            Stage::Landmark => Some(Stage::PHashReuse),
            Stage::PHashReuse => Some(Stage::WebLabels),
            Stage::WebLabels => Some(Stage::Ocr),
            Stage::Ocr => Some(Stage::BiasFallback),
            Stage::BiasFallback => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Stage::Landmark => "landmark",
            Stage::PHashReuse => "phash_reuse",
            Stage::WebLabels => "web_labels",
            Stage::Ocr => "ocr",
            Stage::BiasFallback => "bias_fallback",
        }
    }
}

/// Coordinate proposed by a stage
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub coordinate: Coordinate,
    pub stage: Stage,
    pub action: Action,
    /// Provenance note written with the coordinate
    pub source: String,
    /// Provenance carried by last known when this candidate is committed
    pub last_known_source: String,
    /// Label/provider remembered in the similarity cache
    pub label: String,
    pub provider: String,
    /// Whether the similarity cache should learn this photo
    pub cacheable: bool,
}

/// Result of one stage
#[derive(Debug, Clone, PartialEq)]
pub enum StageOutcome {
    Resolved(Candidate),
    Continue,
}

/// Per-photo scratch space
pub struct PhotoWork<'a> {
    pub photo: &'a PhotoDescriptor,
    /// Image bytes; `None` when the file could not be read
    pub image: Option<Vec<u8>>,
    hash: Option<Option<u64>>,
    pub diagnostics: Vec<Diagnostic>,
}

impl<'a> PhotoWork<'a> {
    /// Read the photo; an unreadable file disables the detection stages
    pub async fn load(photo: &'a PhotoDescriptor) -> PhotoWork<'a> {
        let mut diagnostics = Vec::new();
        let image = match tokio::fs::read(&photo.path).await {
            Ok(bytes) => Some(bytes),
            Err(e) => {
                tracing::warn!(file = %photo.path.display(), error = %e, "Cannot read photo");
                diagnostics.push(Diagnostic::new(
                    DiagnosticTag::GcvError,
                    format!("unreadable image: {}", e),
                ));
                None
            }
        };
        Self::with_image(photo, image, diagnostics)
    }

    pub fn with_image(
        photo: &'a PhotoDescriptor,
        image: Option<Vec<u8>>,
        diagnostics: Vec<Diagnostic>,
    ) -> PhotoWork<'a> {
        PhotoWork {
            photo,
            image,
            hash: None,
            diagnostics,
        }
    }

    /// Perceptual hash, computed at most once per photo
    pub fn hash(&mut self, hasher: &dyn PerceptualHasher) -> Option<u64> {
        if let Some(hash) = self.hash {
            return hash;
        }
        let hash = self.image.as_deref().and_then(|bytes| hasher.hash(bytes));
        self.hash = Some(hash);
        hash
    }

    fn note(&mut self, tag: DiagnosticTag, detail: impl Into<String>) {
        self.diagnostics.push(Diagnostic::new(tag, detail));
    }
}

/// Read-only view handed to stage handlers
pub struct StageContext<'a> {
    pub collaborators: &'a Collaborators,
    pub config: &'a CascadeConfig,
    pub bias: Option<&'a BiasContext>,
    pub state: &'a FolderState,
}

impl StageContext<'_> {
    fn center(&self) -> Option<&Coordinate> {
        self.bias.and_then(BiasContext::center)
    }
}

/// Run one stage
pub async fn run_stage(
    stage: Stage,
    ctx: &StageContext<'_>,
    work: &mut PhotoWork<'_>,
) -> StageOutcome {
    let outcome = match stage {
        Stage::Landmark => try_landmark(ctx, work).await,
        Stage::PHashReuse => try_phash_reuse(ctx, work),
        Stage::WebLabels => try_web_labels(ctx, work).await,
        Stage::Ocr => try_ocr(ctx, work).await,
        Stage::BiasFallback => try_bias_fallback(ctx),
    };

    debug!(
        file = %work.photo.file_name(),
        stage = stage.name(),
        resolved = matches!(outcome, StageOutcome::Resolved(_)),
        "Stage finished"
    );
    outcome
}

async fn try_landmark(ctx: &StageContext<'_>, work: &mut PhotoWork<'_>) -> StageOutcome {
    let Some(image) = work.image.as_deref() else {
        return StageOutcome::Continue;
    };

    let detected = tokio::time::timeout(
        ctx.config.call_timeout,
        ctx.collaborators.landmarks.detect_landmarks(image),
    )
    .await;

    let landmarks = match detected {
        Ok(Ok(landmarks)) => landmarks,
        Ok(Err(e)) => {
            work.note(DiagnosticTag::GcvError, e.to_string());
            return StageOutcome::Continue;
        }
        Err(_) => {
            work.note(DiagnosticTag::GcvEmpty, "timeout");
            return StageOutcome::Continue;
        }
    };

    let Some(best) = best_landmark(landmarks) else {
        work.note(DiagnosticTag::GcvEmpty, "no landmark");
        return StageOutcome::Continue;
    };

    if best.confidence < ctx.config.min_landmark_confidence {
        work.note(
            DiagnosticTag::GcvEmpty,
            format!(
                "{} below minimum confidence ({:.2} < {:.2})",
                best.name, best.confidence, ctx.config.min_landmark_confidence
            ),
        );
        return StageOutcome::Continue;
    }

    if !within_radius(&best.coordinate, ctx.center(), ctx.config.detect_radius_km) {
        work.diagnostics.push(
            Diagnostic::new(DiagnosticTag::GcvTooFar, best.name.clone())
                .with_coordinate(best.coordinate),
        );
        return StageOutcome::Continue;
    }

    StageOutcome::Resolved(Candidate {
        coordinate: best.coordinate,
        stage: Stage::Landmark,
        action: Action::WriteGcv,
        source: format!("detected:gcv:{}:{:.2}", best.name, best.confidence),
        last_known_source: format!("[gcv:{}]", best.name),
        label: best.name,
        provider: "gcv".to_string(),
        cacheable: true,
    })
}

/// Highest confidence valid landmark; ties keep the detector's order
fn best_landmark(landmarks: Vec<Landmark>) -> Option<Landmark> {
    landmarks
        .into_iter()
        .filter(|l| l.coordinate.is_valid())
        .reduce(|best, l| if l.confidence > best.confidence { l } else { best })
}

fn try_phash_reuse(ctx: &StageContext<'_>, work: &mut PhotoWork<'_>) -> StageOutcome {
    let Some(hash) = work.hash(ctx.collaborators.hasher.as_ref()) else {
        return StageOutcome::Continue;
    };
    let Some(hit) = ctx.state.cache.lookup(hash) else {
        return StageOutcome::Continue;
    };

    let entry = hit.entry;
    if !within_radius(&entry.coordinate, ctx.center(), ctx.config.detect_radius_km) {
        work.diagnostics.push(
            Diagnostic::new(
                DiagnosticTag::PhashTooFar,
                format!("{} (distance {})", entry.label, hit.distance),
            )
            .with_coordinate(entry.coordinate),
        );
        return StageOutcome::Continue;
    }

    StageOutcome::Resolved(Candidate {
        coordinate: entry.coordinate,
        stage: Stage::PHashReuse,
        action: Action::WritePhash,
        source: format!("reused_from_phash:{}:{}", entry.label, entry.provider),
        last_known_source: "[phash]".to_string(),
        label: entry.label.clone(),
        provider: entry.provider.clone(),
        cacheable: false,
    })
}

async fn try_web_labels(ctx: &StageContext<'_>, work: &mut PhotoWork<'_>) -> StageOutcome {
    let Some(image) = work.image.as_deref() else {
        return StageOutcome::Continue;
    };

    let detected = tokio::time::timeout(
        ctx.config.call_timeout,
        ctx.collaborators.web.detect_web_labels(image),
    )
    .await;

    let labels = match detected {
        Ok(Ok(labels)) => web_label_queries(labels, ctx.config.max_web_labels),
        Ok(Err(e)) => {
            work.note(DiagnosticTag::WebError, e.to_string());
            return StageOutcome::Continue;
        }
        Err(_) => return StageOutcome::Continue,
    };

    for label in labels {
        if let Some(place) = ctx
            .collaborators
            .names
            .resolve(&label, ctx.bias)
            .await
        {
            return StageOutcome::Resolved(Candidate {
                coordinate: place.coordinate,
                stage: Stage::WebLabels,
                action: Action::WriteWeb,
                source: format!("derived_from_web:{}:{}", place.label, place.provider),
                last_known_source: format!("[web:{}]", place.label),
                label: place.label,
                provider: place.provider,
                cacheable: true,
            });
        }
    }

    StageOutcome::Continue
}

async fn try_ocr(ctx: &StageContext<'_>, work: &mut PhotoWork<'_>) -> StageOutcome {
    let Some(image) = work.image.as_deref() else {
        return StageOutcome::Continue;
    };

    let detected = tokio::time::timeout(
        ctx.config.call_timeout,
        ctx.collaborators.text.detect_text(image),
    )
    .await;

    let lines = match detected {
        Ok(Ok(text)) => ocr_queries(&text, ctx.config.max_ocr_lines),
        Ok(Err(e)) => {
            work.note(DiagnosticTag::OcrError, e.to_string());
            return StageOutcome::Continue;
        }
        Err(_) => return StageOutcome::Continue,
    };

    for line in lines {
        if let Some(place) = ctx
            .collaborators
            .names
            .resolve(&line, ctx.bias)
            .await
        {
            return StageOutcome::Resolved(Candidate {
                coordinate: place.coordinate,
                stage: Stage::Ocr,
                action: Action::WriteOcr,
                source: format!("derived_from_ocr:{}:{}", place.label, place.provider),
                last_known_source: format!("[ocr:{}]", place.label),
                label: place.label,
                provider: place.provider,
                cacheable: true,
            });
        }
    }

    StageOutcome::Continue
}

fn try_bias_fallback(ctx: &StageContext<'_>) -> StageOutcome {
    if let Some(bias) = ctx.bias {
        if let Some(coordinate) = bias.coordinate {
            let (action, source, last_known_source) = match bias.origin {
                HintOrigin::Plan => (
                    Action::WriteHintSeedFile,
                    format!("assigned_hint_seed_file:{}", bias.hint),
                    format!("[seed-hint-file:{}]", bias.hint),
                ),
                HintOrigin::Global => (
                    Action::WriteHintSeed,
                    format!("assigned_hint_seed:{}", bias.hint),
                    format!("[seed-hint:{}]", bias.hint),
                ),
            };
            return StageOutcome::Resolved(Candidate {
                coordinate,
                stage: Stage::BiasFallback,
                action,
                source,
                last_known_source,
                label: bias.hint.clone(),
                provider: "hint".to_string(),
                cacheable: false,
            });
        }
    }

    if let Some((coordinate, source)) = &ctx.state.last_known {
        return StageOutcome::Resolved(Candidate {
            coordinate: *coordinate,
            stage: Stage::BiasFallback,
            action: Action::WriteLastKnown,
            source: format!("assigned_last_known:{}", source),
            last_known_source: source.clone(),
            label: source.clone(),
            provider: "last_known".to_string(),
            cacheable: false,
        });
    }

    StageOutcome::Continue
}

/// Trimmed, case-insensitively de-duplicated labels, capped at `max`
pub fn web_label_queries(labels: Vec<String>, max: usize) -> Vec<String> {
    let mut seen = HashSet::new();
    labels
        .into_iter()
        .map(|l| l.trim().to_string())
        .filter(|l| !l.is_empty() && seen.insert(l.to_lowercase()))
        .take(max)
        .collect()
}

/// Non-empty lines, longest first, capped at `max`, with stray symbols blanked
pub fn ocr_queries(text: &str, max: usize) -> Vec<String> {
    let mut lines: Vec<&str> = text
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect();
    // Stable: equal lengths keep reading order
    lines.sort_by(|a, b| b.chars().count().cmp(&a.chars().count()));

    lines
        .into_iter()
        .take(max)
        .map(sanitize_ocr_line)
        .filter(|l| !l.is_empty())
        .collect()
}

fn sanitize_ocr_line(line: &str) -> String {
    let blanked: String = line
        .chars()
        .map(|c| {
            let keep = c.is_ascii_alphanumeric()
                || ('\u{C0}'..='\u{FF}').contains(&c)
                || " '\u{2019}&-,.".contains(c);
            if keep {
                c
            } else {
                ' '
            }
        })
        .collect();
    blanked.split_whitespace().collect::<Vec<_>>().join(" ")
}
