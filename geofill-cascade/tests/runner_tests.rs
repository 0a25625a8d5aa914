//! Folder jobs, runner and result logs end to end, without network access

use async_trait::async_trait;
use geofill_cascade::cascade::{
    CascadeConfig, Collaborators, DryRunSink, ResolutionSink, SinkError,
};
use geofill_cascade::geo::Coordinate;
use geofill_cascade::name_resolver::NameResolver;
use geofill_cascade::plan::PlanEntry;
use geofill_cascade::record::{Action, Diagnostic, DiagnosticTag, ResolutionRecord};
use geofill_cascade::runner::{offline_collaborators, plan_jobs, RunRequest, Runner};
use geofill_cascade::services::result_log::write_result_log;
use geofill_cascade::services::NullDetector;
use geofill_cascade::types::{DetectionError, Landmark, LandmarkDetector, PerceptualHasher};
use geofill_cascade::RunError;
use geofill_common::config::ServiceSettings;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

fn read_rows(path: &Path) -> Vec<Vec<String>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .from_path(path)
        .unwrap();
    reader
        .records()
        .map(|r| r.unwrap().iter().map(str::to_string).collect())
        .collect()
}

fn write_plan(dir: &Path, json: &str) -> PathBuf {
    let path = dir.join("plan.json");
    fs::write(&path, json).unwrap();
    path
}

fn offline_runner(output_dir: &Path, cancel: CancellationToken) -> Runner {
    let collaborators =
        offline_collaborators(&ServiceSettings::default(), Duration::from_secs(1), false).unwrap();
    Runner::new(
        collaborators,
        CascadeConfig::default(),
        Arc::new(DryRunSink),
        cancel,
    )
    .with_output_dir(output_dir.to_path_buf())
}

// ============================================================================
// plan_jobs
// ============================================================================

#[test]
fn test_no_plan_single_job_with_global_hints() {
    let request = RunRequest {
        path: Some(PathBuf::from("/photos/trip")),
        global_hints: vec!["Kyoto".to_string()],
        ..Default::default()
    };

    let jobs = plan_jobs(&request).unwrap();

    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].path, PathBuf::from("/photos/trip"));
    assert!(jobs[0].entries.is_empty());
    assert_eq!(jobs[0].global_hints, vec!["Kyoto"]);
    assert!(jobs[0].log_name.is_none());
    assert!(jobs[0].required);
}

#[test]
fn test_nothing_to_process() {
    let result = plan_jobs(&RunRequest::default());
    assert!(matches!(result, Err(RunError::NoInput)));
}

#[test]
fn test_single_plan_file() {
    let dir = TempDir::new().unwrap();
    let plan = write_plan(
        dir.path(),
        r#"[{"range":[1,10],"hint":"Tokyo"},{"range":[5],"hint":"x"}]"#,
    );
    let request = RunRequest {
        path: Some(dir.path().to_path_buf()),
        plan_file: Some(plan),
        ..Default::default()
    };

    let jobs = plan_jobs(&request).unwrap();

    assert_eq!(jobs[0].entries, vec![PlanEntry::new(1, 10, "Tokyo")]);
    assert_eq!(jobs[0].plan_warnings, vec!["plan_item_1_invalid_range"]);
}

#[test]
fn test_multi_plan_jobs_ignore_global_hints() {
    let dir = TempDir::new().unwrap();
    let plan = write_plan(
        dir.path(),
        r#"[
            {"name":"day1","path":"","tags":[{"range":[1,5],"hint":"Osaka"},{"hint":"bad"}]},
            {"name":"day2","path":"","tags":[]}
        ]"#,
    );
    let request = RunRequest {
        plan_file: Some(plan),
        base_path: Some(dir.path().to_path_buf()),
        global_hints: vec!["Kyoto".to_string()],
        ..Default::default()
    };

    let jobs = plan_jobs(&request).unwrap();

    assert_eq!(jobs.len(), 2);
    assert_eq!(jobs[0].path, dir.path().join("day1"));
    assert_eq!(jobs[0].log_name.as_deref(), Some("day1"));
    assert_eq!(jobs[0].plan_warnings, vec!["day1:plan_item_1_invalid_range"]);
    assert!(jobs[0].global_hints.is_empty());
    assert!(jobs[1].plan_warnings.is_empty());
    assert!(!jobs[1].required);
}

#[test]
fn test_colliding_plan_names_get_distinct_log_names() {
    let dir = TempDir::new().unwrap();
    let plan = write_plan(
        dir.path(),
        r#"[
            {"name":"day 1","path":"/a/day1","tags":[]},
            {"name":"day_1","path":"/b/day1","tags":[]},
            {"name":"day/1","path":"/c/day1","tags":[]}
        ]"#,
    );

    let jobs = plan_jobs(&RunRequest {
        multi_plan: Some(plan),
        ..Default::default()
    })
    .unwrap();

    let names: Vec<_> = jobs.iter().map(|j| j.log_name.as_deref().unwrap()).collect();
    assert_eq!(names, vec!["day_1", "day_1_2", "day_1_3"]);
}

#[test]
fn test_multi_plan_flag_rejects_single_shape() {
    let dir = TempDir::new().unwrap();
    let plan = write_plan(dir.path(), r#"[{"range":[1,2],"hint":"Tokyo"}]"#);
    let request = RunRequest {
        path: Some(dir.path().to_path_buf()),
        multi_plan: Some(plan),
        ..Default::default()
    };

    assert!(matches!(plan_jobs(&request), Err(RunError::Plan(_))));
}

// ============================================================================
// Runner
// ============================================================================

#[tokio::test]
async fn test_multi_folder_run_skips_missing_folder() {
    let photos = TempDir::new().unwrap();
    let out = TempDir::new().unwrap();
    let day1 = photos.path().join("day1");
    fs::create_dir(&day1).unwrap();
    fs::write(day1.join("a.jpg"), "a").unwrap();
    fs::write(day1.join("b.jpg"), "b").unwrap();

    let plan = write_plan(
        photos.path(),
        r#"[
            {"name":"day1","path":"","tags":[{"range":[1,5],"hint":"Osaka"}]},
            {"name":"day2","path":"","tags":[]}
        ]"#,
    );
    let jobs = plan_jobs(&RunRequest {
        multi_plan: Some(plan),
        base_path: Some(photos.path().to_path_buf()),
        ..Default::default()
    })
    .unwrap();

    let summary = offline_runner(out.path(), CancellationToken::new())
        .with_max_concurrent_folders(2)
        .run(jobs)
        .await
        .unwrap();

    assert_eq!(summary.folders.len(), 1);
    assert_eq!(summary.skipped, vec![photos.path().join("day2")]);

    let report = &summary.folders[0];
    assert_eq!(report.photo_count, 2);
    assert_eq!(report.counts.get(&Action::SkipNoSource), Some(&2));
    assert_eq!(report.log_path, out.path().join("result_day1.csv"));

    let rows = read_rows(&report.log_path);
    assert_eq!(rows[0], vec!["file", "action", "lat", "lon", "source"]);
    assert_eq!(
        rows[1],
        vec!["(plan)", "plan_error", "", "", "hint_unresolved:Osaka"]
    );
    // Each photo: its diagnostic row, then its final row
    let actions: Vec<&str> = rows[2..].iter().map(|r| r[1].as_str()).collect();
    assert_eq!(
        actions,
        vec!["gcv_empty", "skip_no_source", "gcv_empty", "skip_no_source"]
    );
    assert!(!out.path().join("result_day2.csv").exists());
}

#[tokio::test]
async fn test_single_folder_missing_is_fatal() {
    let out = TempDir::new().unwrap();
    let jobs = plan_jobs(&RunRequest {
        path: Some(out.path().join("nope")),
        ..Default::default()
    })
    .unwrap();

    let result = offline_runner(out.path(), CancellationToken::new())
        .run(jobs)
        .await;

    assert!(matches!(result, Err(RunError::Scan(_))));
}

#[tokio::test]
async fn test_cancelled_run_processes_no_folder() {
    let photos = TempDir::new().unwrap();
    fs::write(photos.path().join("a.jpg"), "a").unwrap();
    let jobs = plan_jobs(&RunRequest {
        path: Some(photos.path().to_path_buf()),
        ..Default::default()
    })
    .unwrap();

    let cancel = CancellationToken::new();
    cancel.cancel();
    let summary = offline_runner(photos.path(), cancel).run(jobs).await.unwrap();

    assert!(summary.folders.is_empty());
    assert_eq!(summary.skipped, vec![photos.path().to_path_buf()]);
    assert!(!photos.path().join("result.csv").exists());
}

#[tokio::test]
async fn test_same_basename_folders_keep_separate_logs() {
    let photos = TempDir::new().unwrap();
    let out = TempDir::new().unwrap();
    let first = photos.path().join("2023").join("day1");
    let second = photos.path().join("2024").join("day1");
    fs::create_dir_all(&first).unwrap();
    fs::create_dir_all(&second).unwrap();
    fs::write(first.join("a1.jpg"), "a1").unwrap();
    fs::write(first.join("a2.jpg"), "a2").unwrap();
    fs::write(second.join("b1.jpg"), "b1").unwrap();

    let plan = write_plan(
        photos.path(),
        &serde_json::json!([
            {"name": "trip2023", "path": first, "tags": []},
            {"name": "trip2024", "path": second, "tags": []},
        ])
        .to_string(),
    );
    let jobs = plan_jobs(&RunRequest {
        multi_plan: Some(plan),
        ..Default::default()
    })
    .unwrap();

    let summary = offline_runner(out.path(), CancellationToken::new())
        .with_max_concurrent_folders(2)
        .run(jobs)
        .await
        .unwrap();

    let logs: Vec<&PathBuf> = summary.folders.iter().map(|f| &f.log_path).collect();
    assert_eq!(
        logs,
        vec![
            &out.path().join("result_trip2023.csv"),
            &out.path().join("result_trip2024.csv")
        ]
    );

    let files = |path: &Path| -> Vec<String> {
        read_rows(path)[1..]
            .iter()
            .filter(|r| r[1] == "skip_no_source")
            .map(|r| Path::new(&r[0]).file_name().unwrap().to_string_lossy().to_string())
            .collect()
    };
    assert_eq!(files(logs[0].as_path()), vec!["a1.jpg", "a2.jpg"]);
    assert_eq!(files(logs[1].as_path()), vec!["b1.jpg"]);
}

// ============================================================================
// Folder independence
// ============================================================================

const SHARED_HASH: u64 = 0x5A5A_0F0F_1234_ABCD;

/// Landmark only for `a.jpg`; `b.jpg` waits until `a.jpg` was written
struct TwoFolderWorld {
    written: Arc<Notify>,
}

#[async_trait]
impl LandmarkDetector for TwoFolderWorld {
    async fn detect_landmarks(&self, image: &[u8]) -> Result<Vec<Landmark>, DetectionError> {
        match image {
            b"a" => Ok(vec![Landmark {
                name: "Kinkaku-ji".to_string(),
                coordinate: Coordinate::new(35.0394, 135.7292),
                confidence: 0.95,
            }]),
            _ => {
                self.written.notified().await;
                Ok(Vec::new())
            }
        }
    }
}

impl PerceptualHasher for TwoFolderWorld {
    fn hash(&self, _image: &[u8]) -> Option<u64> {
        Some(SHARED_HASH)
    }
}

struct NotifyingSink {
    written: Arc<Notify>,
}

#[async_trait]
impl ResolutionSink for NotifyingSink {
    async fn apply(&self, _record: &ResolutionRecord) -> Result<(), SinkError> {
        self.written.notify_one();
        Ok(())
    }
}

#[tokio::test]
async fn test_folders_do_not_share_cache_or_last_known() {
    let photos = TempDir::new().unwrap();
    let out = TempDir::new().unwrap();
    for (folder, photo) in [("a", "a"), ("b", "b")] {
        let dir = photos.path().join(folder);
        fs::create_dir(&dir).unwrap();
        fs::write(dir.join(format!("{}.jpg", photo)), photo).unwrap();
    }

    let plan = write_plan(
        photos.path(),
        r#"[{"name":"a","path":"","tags":[]},{"name":"b","path":"","tags":[]}]"#,
    );
    let jobs = plan_jobs(&RunRequest {
        multi_plan: Some(plan),
        base_path: Some(photos.path().to_path_buf()),
        ..Default::default()
    })
    .unwrap();

    let written = Arc::new(Notify::new());
    let world = Arc::new(TwoFolderWorld {
        written: written.clone(),
    });
    let collaborators = Collaborators {
        landmarks: world.clone(),
        web: Arc::new(NullDetector),
        text: Arc::new(NullDetector),
        hasher: world,
        geocoder: Arc::new(NullDetector),
        names: Arc::new(NameResolver::new(
            Arc::new(NullDetector),
            Arc::new(NullDetector),
            Duration::from_secs(1),
        )),
    };

    let summary = Runner::new(
        collaborators,
        CascadeConfig::default(),
        Arc::new(NotifyingSink { written }),
        CancellationToken::new(),
    )
    .with_output_dir(out.path().to_path_buf())
    .with_max_concurrent_folders(2)
    .run(jobs)
    .await
    .unwrap();

    assert_eq!(summary.folders.len(), 2);
    assert_eq!(summary.folders[0].counts.get(&Action::WriteGcv), Some(&1));
    assert_eq!(
        summary.folders[1].counts.keys().collect::<Vec<_>>(),
        vec![&Action::SkipNoSource]
    );
}

// ============================================================================
// Result log
// ============================================================================

#[test]
fn test_result_log_rows() {
    let out = TempDir::new().unwrap();
    let log = out.path().join("result.csv");

    let resolved = ResolutionRecord {
        path: PathBuf::from("/trip/IMG_0002.jpg"),
        index: 2,
        coordinate: Some(Coordinate::new(35.0116, 135.7681)),
        action: Action::WriteHintSeedFile,
        resolved_by: Some(Action::WriteHintSeedFile),
        source: "assigned_hint_seed_file:Kyoto, Japan".to_string(),
        overwrote_existing: false,
        diagnostics: vec![
            Diagnostic::new(DiagnosticTag::GcvTooFar, "Tokyo Tower")
                .with_coordinate(Coordinate::new(35.6586, 139.7454)),
            Diagnostic::new(DiagnosticTag::OcrError, "timeout"),
        ],
    };

    write_result_log(&log, &["hint_unresolved:Atlantis".to_string()], &[resolved]).unwrap();

    let rows = read_rows(&log);
    assert_eq!(rows.len(), 5);
    assert_eq!(rows[1][0], "(plan)");
    assert_eq!(
        rows[2],
        vec!["/trip/IMG_0002.jpg", "gcv_too_far", "35.658600", "139.745400", "Tokyo Tower"]
    );
    assert_eq!(rows[3], vec!["/trip/IMG_0002.jpg", "ocr_error", "", "", "timeout"]);
    assert_eq!(
        rows[4],
        vec![
            "/trip/IMG_0002.jpg",
            "write_hint_seed_file",
            "35.011600",
            "135.768100",
            "assigned_hint_seed_file:Kyoto, Japan"
        ]
    );
}
