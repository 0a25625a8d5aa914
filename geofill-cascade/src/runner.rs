//! Run orchestration
//!
//! Turns the command line into folder jobs, drives the cascade fold for each
//! folder and writes one result log per folder.

use crate::cascade::{self, CascadeConfig, Collaborators, ResolutionSink};
use crate::error::RunError;
use crate::name_resolver::NameResolver;
use crate::plan::{load_plan, LoadedPlan, Plan, PlanEntry, PlanError, PlanResolver};
use crate::record::Action;
use crate::services::result_log::{result_log_path, sanitize_folder_name, write_result_log};
use crate::services::{NominatimClient, NullDetector, PhotoScanner, VisionClient, WikipediaClient};
use crate::similarity::DctHasher;
use crate::types::{EncyclopediaLookup, Geocoder};
use futures::stream::{self, StreamExt, TryStreamExt};
use geofill_common::config::ServiceSettings;
use std::collections::{BTreeMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// What to process
#[derive(Debug, Clone, Default)]
pub struct RunRequest {
    /// Folder for single-folder runs
    pub path: Option<PathBuf>,
    /// Plan file of either shape
    pub plan_file: Option<PathBuf>,
    /// Plan file that must be multi-folder
    pub multi_plan: Option<PathBuf>,
    /// Base for multi-folder entries without an explicit path
    pub base_path: Option<PathBuf>,
    /// Operator hints, used only when a folder has no plan entries
    pub global_hints: Vec<String>,
}

/// One folder to resolve
#[derive(Debug, Clone, PartialEq)]
pub struct FolderJob {
    pub path: PathBuf,
    /// Name used in the result log file name, unique within a run; `None`
    /// writes `result.csv`
    pub log_name: Option<String>,
    pub entries: Vec<PlanEntry>,
    pub global_hints: Vec<String>,
    /// Warnings from plan loading that belong to this folder
    pub plan_warnings: Vec<String>,
    /// A missing folder is fatal rather than skipped
    pub required: bool,
}

/// Build folder jobs from the request
pub fn plan_jobs(request: &RunRequest) -> Result<Vec<FolderJob>, RunError> {
    let plan_path = request.multi_plan.as_ref().or(request.plan_file.as_ref());
    let loaded = match plan_path {
        Some(path) => Some(load_plan(path, request.base_path.as_deref())?),
        None => None,
    };

    if let Some(loaded) = &loaded {
        info!(
            format = loaded.plan.format_name(),
            warnings = loaded.warnings.len(),
            "Plan loaded"
        );
    }

    match loaded {
        Some(LoadedPlan {
            plan: Plan::Multi(folders),
            warnings,
        }) => {
            info!(folders = folders.len(), "Multi-folder plan");

            let mut log_names = HashSet::new();
            let jobs: Vec<FolderJob> = folders
                .into_iter()
                .map(|folder| {
                    let prefix = format!("{}:", folder.name);
                    let plan_warnings = warnings
                        .iter()
                        .filter(|w| w.starts_with(&prefix))
                        .cloned()
                        .collect();
                    let log_name = unique_log_name(&folder.name, &mut log_names);
                    FolderJob {
                        path: folder.path,
                        log_name: Some(log_name),
                        entries: folder.entries,
                        global_hints: Vec::new(),
                        plan_warnings,
                        required: false,
                    }
                })
                .collect();

            for warning in warnings.iter().filter(|w| w.starts_with("folder_")) {
                warn!(warning = %warning, "Plan folder skipped");
            }
            Ok(jobs)
        }
        Some(LoadedPlan {
            plan: Plan::Single(entries),
            warnings,
        }) => {
            if request.multi_plan.is_some() {
                return Err(PlanError::UnknownFormat(
                    "--multi-plan expects name/tags elements".to_string(),
                )
                .into());
            }
            let path = request.path.clone().ok_or(RunError::NoInput)?;
            info!(entries = entries.len(), "Single-folder plan");
            Ok(vec![FolderJob {
                path,
                log_name: None,
                entries,
                global_hints: request.global_hints.clone(),
                plan_warnings: warnings,
                required: true,
            }])
        }
        None => {
            let path = request.path.clone().ok_or(RunError::NoInput)?;
            Ok(vec![FolderJob {
                path,
                log_name: None,
                entries: Vec::new(),
                global_hints: request.global_hints.clone(),
                plan_warnings: Vec::new(),
                required: true,
            }])
        }
    }
}

/// Sanitized plan name, suffixed `_2`, `_3`, ... when already taken
fn unique_log_name(name: &str, taken: &mut HashSet<String>) -> String {
    let base = sanitize_folder_name(name);
    let mut candidate = base.clone();
    let mut n = 1;
    while !taken.insert(candidate.clone()) {
        n += 1;
        candidate = format!("{}_{}", base, n);
    }
    if n > 1 {
        warn!(plan = %name, log_name = %candidate, "Duplicate plan name, result log renamed");
    }
    candidate
}

/// Outcome of one processed folder
#[derive(Debug, Clone, PartialEq)]
pub struct FolderReport {
    pub path: PathBuf,
    pub log_path: PathBuf,
    pub photo_count: usize,
    pub counts: BTreeMap<Action, usize>,
    pub cancelled: bool,
}

impl FolderReport {
    fn log_summary(&self) {
        let events: usize = self.counts.values().sum();
        info!(
            folder = %self.path.display(),
            photos = self.photo_count,
            events,
            log = %self.log_path.display(),
            cancelled = self.cancelled,
            "Folder summary"
        );
        for (action, count) in &self.counts {
            info!("  {:5} {}", count, action);
        }
    }
}

/// Outcome of a whole run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunSummary {
    /// Processed folders, in job order
    pub folders: Vec<FolderReport>,
    /// Folders not processed (missing, or the run was cancelled first)
    pub skipped: Vec<PathBuf>,
}

impl RunSummary {
    /// Per-action totals across folders
    pub fn totals(&self) -> BTreeMap<Action, usize> {
        let mut totals = BTreeMap::new();
        for report in &self.folders {
            for (action, count) in &report.counts {
                *totals.entry(*action).or_insert(0) += count;
            }
        }
        totals
    }
}

/// Drives folder jobs through the cascade
pub struct Runner {
    collaborators: Collaborators,
    config: CascadeConfig,
    sink: Arc<dyn ResolutionSink>,
    scanner: PhotoScanner,
    output_dir: PathBuf,
    max_concurrent_folders: usize,
    cancel: CancellationToken,
}

impl Runner {
    pub fn new(
        collaborators: Collaborators,
        config: CascadeConfig,
        sink: Arc<dyn ResolutionSink>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            collaborators,
            config,
            sink,
            scanner: PhotoScanner::new(),
            output_dir: PathBuf::from("."),
            max_concurrent_folders: 1,
            cancel,
        }
    }

    pub fn with_output_dir(mut self, output_dir: PathBuf) -> Self {
        self.output_dir = output_dir;
        self
    }

    pub fn with_max_concurrent_folders(mut self, max: usize) -> Self {
        self.max_concurrent_folders = max.max(1);
        self
    }

    /// Re-resolve photos that already carry GPS
    pub fn with_force(mut self, force: bool) -> Self {
        self.scanner = self.scanner.with_force(force);
        self
    }

    /// Process every job; folders run concurrently up to the configured limit
    pub async fn run(&self, jobs: Vec<FolderJob>) -> Result<RunSummary, RunError> {
        let total = jobs.len();
        let job_paths: Vec<PathBuf> = jobs.iter().map(|j| j.path.clone()).collect();

        let results: Vec<Option<FolderReport>> = stream::iter(jobs.into_iter().enumerate())
            .map(|(i, job)| self.run_job(i + 1, total, job))
            .buffered(self.max_concurrent_folders)
            .try_collect()
            .await?;

        let mut summary = RunSummary::default();
        for (result, path) in results.into_iter().zip(job_paths) {
            match result {
                Some(report) => summary.folders.push(report),
                None => summary.skipped.push(path),
            }
        }
        Ok(summary)
    }

    async fn run_job(
        &self,
        position: usize,
        total: usize,
        job: FolderJob,
    ) -> Result<Option<FolderReport>, RunError> {
        if self.cancel.is_cancelled() {
            return Ok(None);
        }

        info!(folder = %job.path.display(), "[{}/{}] Processing folder", position, total);

        let scanner = self.scanner;
        let scan_path = job.path.clone();
        let scanned = tokio::task::spawn_blocking(move || scanner.scan(&scan_path)).await?;
        let photos = match scanned {
            Ok(photos) => photos,
            Err(e) if !job.required => {
                warn!(folder = %job.path.display(), error = %e, "Folder does not exist, skipping");
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };

        let resolver = PlanResolver::new(
            &job.entries,
            &job.global_hints,
            self.config.detect_radius_km,
            self.config.name_radius_km,
        );
        let outcome = cascade::run_folder(
            &photos,
            &resolver,
            &self.collaborators,
            &self.config,
            self.sink.as_ref(),
            &self.cancel,
        )
        .await;

        let mut plan_warnings = job.plan_warnings.clone();
        plan_warnings.extend(outcome.plan_warnings.iter().cloned());

        let log_path = result_log_path(&self.output_dir, job.log_name.as_deref());
        write_result_log(&log_path, &plan_warnings, &outcome.records).map_err(|source| {
            RunError::ResultLog {
                path: log_path.clone(),
                source,
            }
        })?;

        let report = FolderReport {
            path: job.path,
            log_path,
            photo_count: photos.len(),
            counts: outcome.counts(),
            cancelled: outcome.cancelled,
        };
        report.log_summary();
        Ok(Some(report))
    }
}

/// Collaborators backed by Vision, Wikipedia and Nominatim
pub fn online_collaborators(
    api_key: String,
    services: &ServiceSettings,
    timeout: Duration,
) -> Result<Collaborators, RunError> {
    let vision = Arc::new(VisionClient::new(api_key, timeout, &services.user_agent)?);
    let geocoder: Arc<dyn Geocoder> = Arc::new(NominatimClient::new(timeout, &services.user_agent)?);
    let encyclopedia: Arc<dyn EncyclopediaLookup> = Arc::new(WikipediaClient::new(
        services.wikipedia_languages.clone(),
        timeout,
        &services.user_agent,
    )?);

    Ok(Collaborators {
        landmarks: vision.clone(),
        web: vision.clone(),
        text: vision,
        hasher: Arc::new(DctHasher),
        geocoder: geocoder.clone(),
        names: Arc::new(NameResolver::new(encyclopedia, geocoder, timeout)),
    })
}

/// Collaborators that detect nothing; hints still geocode when `geocode_hints`
pub fn offline_collaborators(
    services: &ServiceSettings,
    timeout: Duration,
    geocode_hints: bool,
) -> Result<Collaborators, RunError> {
    let geocoder: Arc<dyn Geocoder> = if geocode_hints {
        Arc::new(NominatimClient::new(timeout, &services.user_agent)?)
    } else {
        Arc::new(NullDetector)
    };

    Ok(Collaborators {
        landmarks: Arc::new(NullDetector),
        web: Arc::new(NullDetector),
        text: Arc::new(NullDetector),
        hasher: Arc::new(DctHasher),
        geocoder: geocoder.clone(),
        names: Arc::new(NameResolver::new(Arc::new(NullDetector), geocoder, timeout)),
    })
}
