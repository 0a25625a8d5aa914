//! Location resolution cascade
//!
//! A folder is resolved as a sequential fold over its photos in index order,
//! carrying a [`FolderState`]. Each photo walks the [`Stage`] machine until a
//! stage resolves it or every stage is exhausted.

pub mod sink;
pub mod stages;

pub use sink::{DryRunSink, ResolutionSink, SinkError};
pub use stages::{Candidate, PhotoWork, Stage, StageContext, StageOutcome};

use crate::geo::Coordinate;
use crate::name_resolver::NameResolver;
use crate::plan::{HintCache, PlanResolver};
use crate::record::{Action, ResolutionRecord};
use crate::similarity::SimilarityCache;
use crate::types::{
    Geocoder, LandmarkDetector, PerceptualHasher, PhotoDescriptor, TextDetector, WebLabelDetector,
};
use geofill_common::config::CascadeSettings;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Effective cascade parameters for one run
#[derive(Debug, Clone, PartialEq)]
pub struct CascadeConfig {
    pub min_landmark_confidence: f32,
    pub detect_radius_km: f64,
    pub name_radius_km: f64,
    pub call_timeout: Duration,
    pub phash_threshold: u32,
    pub max_web_labels: usize,
    pub max_ocr_lines: usize,
    /// Photos below this index are skipped
    pub start_index: Option<usize>,
    /// Photos above this index are skipped
    pub end_index: Option<usize>,
}

impl From<&CascadeSettings> for CascadeConfig {
    fn from(settings: &CascadeSettings) -> Self {
        Self {
            min_landmark_confidence: settings.min_landmark_confidence,
            detect_radius_km: settings.detect_radius_km,
            name_radius_km: settings.name_radius_km,
            call_timeout: Duration::from_secs_f64(settings.call_timeout_secs),
            phash_threshold: settings.phash_threshold,
            max_web_labels: settings.max_web_labels,
            max_ocr_lines: settings.max_ocr_lines,
            start_index: None,
            end_index: None,
        }
    }
}

impl Default for CascadeConfig {
    fn default() -> Self {
        Self::from(&CascadeSettings::default())
    }
}

/// External capabilities used by the cascade
#[derive(Clone)]
pub struct Collaborators {
    pub landmarks: Arc<dyn LandmarkDetector>,
    pub web: Arc<dyn WebLabelDetector>,
    pub text: Arc<dyn TextDetector>,
    pub hasher: Arc<dyn PerceptualHasher>,
    /// Geocoder for plan and global hints
    pub geocoder: Arc<dyn Geocoder>,
    /// Run-scoped name resolver shared by every folder
    pub names: Arc<NameResolver>,
}

/// State threaded through one folder's fold
#[derive(Debug)]
pub struct FolderState {
    pub cache: SimilarityCache,
    /// Most recent committed coordinate and its provenance
    pub last_known: Option<(Coordinate, String)>,
    pub hints: HintCache,
}

impl FolderState {
    pub fn new(phash_threshold: u32) -> Self {
        Self {
            cache: SimilarityCache::new(phash_threshold),
            last_known: None,
            hints: HintCache::new(),
        }
    }
}

/// Everything a folder run produced
#[derive(Debug, Default)]
pub struct FolderOutcome {
    /// One record per processed photo, in index order
    pub records: Vec<ResolutionRecord>,
    /// Hint geocoding problems, reported once each
    pub plan_warnings: Vec<String>,
    /// The run stopped early on cancellation
    pub cancelled: bool,
}

impl FolderOutcome {
    /// Records per final action
    pub fn counts(&self) -> BTreeMap<Action, usize> {
        let mut counts = BTreeMap::new();
        for record in &self.records {
            *counts.entry(record.action).or_insert(0) += 1;
        }
        counts
    }
}

/// Resolve every photo of one folder
///
/// `photos` must be in ascending index order. Cancellation is checked before
/// each photo; records already emitted are kept.
pub async fn run_folder(
    photos: &[PhotoDescriptor],
    plan: &PlanResolver<'_>,
    collaborators: &Collaborators,
    config: &CascadeConfig,
    sink: &dyn ResolutionSink,
    cancel: &CancellationToken,
) -> FolderOutcome {
    let mut state = FolderState::new(config.phash_threshold);
    let mut outcome = FolderOutcome::default();

    for photo in photos {
        if cancel.is_cancelled() {
            info!(
                processed = outcome.records.len(),
                remaining = photos.len() - outcome.records.len(),
                "Cancelled, stopping folder"
            );
            outcome.cancelled = true;
            break;
        }

        let record = resolve_photo(photo, &mut state, plan, collaborators, config, sink).await;
        debug!(
            file = %photo.file_name(),
            index = photo.index,
            action = %record.action,
            source = %record.source,
            "Photo resolved"
        );
        outcome.records.push(record);
    }

    outcome.plan_warnings = state.hints.take_warnings();
    outcome
}

async fn resolve_photo(
    photo: &PhotoDescriptor,
    state: &mut FolderState,
    plan: &PlanResolver<'_>,
    collaborators: &Collaborators,
    config: &CascadeConfig,
    sink: &dyn ResolutionSink,
) -> ResolutionRecord {
    if config.start_index.is_some_and(|start| photo.index < start) {
        return ResolutionRecord::skipped(photo, Action::SkipStartIndex);
    }
    if config.end_index.is_some_and(|end| photo.index > end) {
        return ResolutionRecord::skipped(photo, Action::SkipEndIndex);
    }

    if let Some(existing) = photo.existing {
        if !photo.force {
            let record = ResolutionRecord::has_gps(photo, existing);
            state.last_known = Some((existing, record.source.clone()));
            return record;
        }
    }

    let bias = plan
        .bias_for(
            photo.index,
            &mut state.hints,
            collaborators.geocoder.as_ref(),
            config.call_timeout,
        )
        .await;

    let mut work = PhotoWork::load(photo).await;
    let mut candidate = None;
    {
        let ctx = StageContext {
            collaborators,
            config,
            bias: bias.as_ref(),
            state,
        };
        let mut stage = Some(Stage::FIRST);
        while let Some(current) = stage {
            match stages::run_stage(current, &ctx, &mut work).await {
                StageOutcome::Resolved(found) => {
                    candidate = Some(found);
                    break;
                }
                StageOutcome::Continue => stage = current.next(),
            }
        }
    }

    match candidate {
        Some(candidate) => commit(candidate, work, state, collaborators, sink).await,
        None => ResolutionRecord::unresolved(photo, work.diagnostics),
    }
}

/// Persist a candidate, then fold it into the folder state
async fn commit(
    candidate: Candidate,
    mut work: PhotoWork<'_>,
    state: &mut FolderState,
    collaborators: &Collaborators,
    sink: &dyn ResolutionSink,
) -> ResolutionRecord {
    let diagnostics = std::mem::take(&mut work.diagnostics);
    let record = ResolutionRecord::resolved(
        work.photo,
        candidate.coordinate,
        candidate.action,
        candidate.source,
        diagnostics,
    );

    if let Err(e) = sink.apply(&record).await {
        warn!(
            file = %work.photo.path.display(),
            action = %record.action,
            error = %e,
            "Failed to write coordinate"
        );
        return record.into_write_error(e);
    }

    debug!(
        file = %work.photo.file_name(),
        stage = candidate.stage.name(),
        "Candidate committed"
    );
    state.last_known = Some((candidate.coordinate, candidate.last_known_source));
    if candidate.cacheable {
        if let Some(hash) = work.hash(collaborators.hasher.as_ref()) {
            state.cache.record(
                hash,
                candidate.coordinate,
                candidate.label,
                candidate.provider,
            );
        }
    }

    record
}
