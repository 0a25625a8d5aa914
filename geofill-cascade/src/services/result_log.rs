//! CSV result log
//!
//! One file per folder with header `file,action,lat,lon,source`. Plan
//! warnings come first as `plan_error` rows, then for every photo its
//! diagnostic rows followed by its final row.

use crate::geo::Coordinate;
use crate::record::ResolutionRecord;
use std::path::{Path, PathBuf};

pub const HEADER: [&str; 5] = ["file", "action", "lat", "lon", "source"];

/// File column value for plan warnings
pub const PLAN_ROW_FILE: &str = "(plan)";

/// `result.csv` for single-folder runs, `result_<folder>.csv` otherwise
pub fn result_log_path(output_dir: &Path, folder_name: Option<&str>) -> PathBuf {
    match folder_name {
        Some(name) => output_dir.join(format!("result_{}.csv", sanitize_folder_name(name))),
        None => output_dir.join("result.csv"),
    }
}

/// Replace anything but word characters, `-` and `.` with `_`
pub fn sanitize_folder_name(name: &str) -> String {
    name.trim_end_matches(['/', '\\'])
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '_' || c == '-' || c == '.' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

fn coordinate_cells(coordinate: Option<&Coordinate>) -> (String, String) {
    match coordinate {
        Some(c) => (format!("{:.6}", c.lat), format!("{:.6}", c.lon)),
        None => (String::new(), String::new()),
    }
}

/// Write the log for one folder, replacing any previous file
pub fn write_result_log(
    path: &Path,
    plan_warnings: &[String],
    records: &[ResolutionRecord],
) -> Result<(), csv::Error> {
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(HEADER)?;

    for warning in plan_warnings {
        writer.write_record([PLAN_ROW_FILE, "plan_error", "", "", warning.as_str()])?;
    }

    for record in records {
        let file = record.path.display().to_string();

        for diagnostic in &record.diagnostics {
            let (lat, lon) = coordinate_cells(diagnostic.coordinate.as_ref());
            writer.write_record([
                file.as_str(),
                diagnostic.tag.as_str(),
                lat.as_str(),
                lon.as_str(),
                diagnostic.detail.as_str(),
            ])?;
        }

        let (lat, lon) = coordinate_cells(record.coordinate.as_ref());
        writer.write_record([
            file.as_str(),
            record.action.as_str(),
            lat.as_str(),
            lon.as_str(),
            record.source.as_str(),
        ])?;
    }

    writer.flush()?;
    tracing::info!(path = %path.display(), rows = records.len(), "Result log written");
    Ok(())
}
