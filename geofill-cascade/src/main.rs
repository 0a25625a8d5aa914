//! geofill - geotag photos through the location resolution cascade

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use geofill_cascade::cascade::{CascadeConfig, DryRunSink, ResolutionSink};
use geofill_cascade::plan::split_global_hints;
use geofill_cascade::runner::{
    offline_collaborators, online_collaborators, plan_jobs, RunRequest, Runner,
};
use geofill_cascade::services::{exiftool_available, ExifToolSink};
use geofill_cascade::RunError;
use geofill_common::config::{load_toml_config, resolve_vision_api_key, CascadeSettings};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command-line arguments for geofill
#[derive(Parser, Debug)]
#[command(name = "geofill")]
#[command(about = "Assign GPS coordinates to photos using detection, similarity and plan hints")]
#[command(version)]
struct Args {
    /// Folder with photos (not recursive). Required unless a multi-folder plan is given
    path: Option<PathBuf>,

    /// Comma-separated place hints; the first one that geocodes is used when there is no plan
    #[arg(long)]
    hint: Option<String>,

    /// Plan JSON (single range/hint or multi name/tags, detected automatically)
    #[arg(long = "file")]
    plan_file: Option<PathBuf>,

    /// Multi-folder plan JSON
    #[arg(long)]
    multi_plan: Option<PathBuf>,

    /// Base directory for multi-folder entries with an empty path
    #[arg(long)]
    base_path: Option<PathBuf>,

    /// Resolve and log, but write nothing
    #[arg(long)]
    dry_run: bool,

    /// First photo index to process (1-based)
    #[arg(long)]
    start_index: Option<usize>,

    /// Last photo index to process (inclusive)
    #[arg(long)]
    end_index: Option<usize>,

    /// Minimum landmark confidence
    #[arg(long)]
    gcv_minconf: Option<f32>,

    /// Timeout per external call, in seconds (e.g. 7.5)
    #[arg(long)]
    gcv_timeout: Option<f64>,

    /// Bias radius for detected candidates, km
    #[arg(long)]
    detect_radius_km: Option<f64>,

    /// Bias radius for name-resolved candidates, km
    #[arg(long)]
    name_radius_km: Option<f64>,

    /// Maximum Hamming distance for perceptual-hash reuse
    #[arg(long)]
    phash_threshold: Option<u32>,

    /// Folders processed concurrently
    #[arg(long)]
    max_concurrent_folders: Option<usize>,

    /// Path to the exiftool binary
    #[arg(long)]
    exiftool_path: Option<String>,

    /// Directory for result CSV files
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Config file (default: $GEOFILL_CONFIG or <config dir>/geofill/config.toml)
    #[arg(long, env = "GEOFILL_CONFIG")]
    config: Option<PathBuf>,

    /// Re-resolve photos that already have GPS
    #[arg(long)]
    force: bool,

    /// Debug logging for geofill crates
    #[arg(short, long)]
    verbose: bool,

    /// Skip every detection service; only plan hints and last known apply
    #[arg(long)]
    offline: bool,

    /// With --offline, do not geocode hints either
    #[arg(long)]
    no_geocode: bool,
}

impl Args {
    /// CLI flags override TOML values
    fn apply_overrides(&self, settings: &mut CascadeSettings) {
        if let Some(v) = self.gcv_minconf {
            settings.min_landmark_confidence = v;
        }
        if let Some(v) = self.gcv_timeout {
            settings.call_timeout_secs = v;
        }
        if let Some(v) = self.detect_radius_km {
            settings.detect_radius_km = v;
        }
        if let Some(v) = self.name_radius_km {
            settings.name_radius_km = v;
        }
        if let Some(v) = self.phash_threshold {
            settings.phash_threshold = v;
        }
        if let Some(v) = self.max_concurrent_folders {
            settings.max_concurrent_folders = v;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Config is loaded first so its log level can seed the filter
    let toml_config = load_toml_config(args.config.as_deref());
    let default_filter = if args.verbose {
        "geofill=debug,geofill_cascade=debug,geofill_common=debug".to_string()
    } else {
        toml_config
            .as_ref()
            .map(|c| c.logging.level.clone())
            .unwrap_or_else(|_| "info".to_string())
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let toml_config = toml_config.context("Failed to load configuration")?;

    let mut settings = toml_config.cascade.clone();
    args.apply_overrides(&mut settings);
    settings.validate().map_err(RunError::from)?;

    let mut config = CascadeConfig::from(&settings);
    config.start_index = args.start_index;
    config.end_index = args.end_index;

    let exiftool_path = args
        .exiftool_path
        .clone()
        .unwrap_or_else(|| toml_config.services.exiftool_path.clone());
    if !args.dry_run && !exiftool_available(&exiftool_path).await {
        return Err(RunError::ExifToolUnavailable(exiftool_path).into());
    }

    let collaborators = if args.offline {
        info!("Offline mode: detection services disabled");
        offline_collaborators(&toml_config.services, config.call_timeout, !args.no_geocode)?
    } else {
        let api_key = resolve_vision_api_key(&toml_config).map_err(RunError::from)?;
        online_collaborators(api_key, &toml_config.services, config.call_timeout)?
    };

    let sink: Arc<dyn ResolutionSink> = if args.dry_run {
        info!("Dry run: no metadata will be written");
        Arc::new(DryRunSink)
    } else {
        Arc::new(ExifToolSink::new(exiftool_path))
    };

    let request = RunRequest {
        path: args.path.clone(),
        plan_file: args.plan_file.clone(),
        multi_plan: args.multi_plan.clone(),
        base_path: args.base_path.clone(),
        global_hints: split_global_hints(args.hint.as_deref()),
    };
    let jobs = plan_jobs(&request)?;

    let output_dir = args
        .output_dir
        .clone()
        .or_else(|| toml_config.services.output_dir.clone())
        .unwrap_or_else(|| PathBuf::from("."));

    let cancel = CancellationToken::new();
    tokio::spawn(cancel_on_ctrl_c(cancel.clone()));

    let runner = Runner::new(collaborators, config, sink, cancel)
        .with_output_dir(output_dir)
        .with_max_concurrent_folders(settings.max_concurrent_folders)
        .with_force(args.force);

    let summary = runner.run(jobs).await?;

    for path in &summary.skipped {
        warn!(folder = %path.display(), "Folder not processed");
    }
    let totals = summary.totals();
    info!(
        folders = summary.folders.len(),
        events = totals.values().sum::<usize>(),
        "Run complete"
    );

    Ok(())
}

/// Cancel the run on Ctrl+C; the current photo finishes first
async fn cancel_on_ctrl_c(cancel: CancellationToken) {
    match signal::ctrl_c().await {
        Ok(()) => {
            warn!("Received Ctrl+C, stopping after the current photo");
            cancel.cancel();
        }
        Err(e) => warn!("Failed to install Ctrl+C handler: {}", e),
    }
}
