//! Plan file model and shape detection

use serde_json::Value;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Plan loading errors
#[derive(Debug, Error)]
pub enum PlanError {
    #[error("Cannot read plan {0}: {1}")]
    Read(PathBuf, std::io::Error),

    #[error("Invalid plan JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Plan root must be a JSON array")]
    NotAnArray,

    /// Elements match neither the single nor the multi shape
    #[error("Unrecognized plan format: {0}")]
    UnknownFormat(String),
}

/// Inclusive 1-based index range with its hint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanEntry {
    pub start: usize,
    pub end: usize,
    pub hint: String,
}

impl PlanEntry {
    /// Reversed bounds are swapped
    pub fn new(start: usize, end: usize, hint: impl Into<String>) -> Self {
        let (start, end) = if end < start { (end, start) } else { (start, end) };
        Self {
            start,
            end,
            hint: hint.into(),
        }
    }

    pub fn contains(&self, index: usize) -> bool {
        self.start <= index && index <= self.end
    }
}

/// One folder of a multi-folder plan
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FolderPlan {
    pub name: String,
    /// Effective folder path (explicit, or derived from base path + name)
    pub path: PathBuf,
    pub entries: Vec<PlanEntry>,
}

/// Parsed plan
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Plan {
    Single(Vec<PlanEntry>),
    Multi(Vec<FolderPlan>),
}

impl Plan {
    pub fn format_name(&self) -> &'static str {
        match self {
            Plan::Single(_) => "single",
            Plan::Multi(_) => "multi",
        }
    }
}

/// Plan plus the elements that were skipped while loading it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedPlan {
    pub plan: Plan,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Shape {
    Single,
    Multi,
}

fn shape_of(element: &Value) -> Option<Shape> {
    let obj = element.as_object()?;
    if obj.contains_key("name") && obj.contains_key("tags") {
        Some(Shape::Multi)
    } else if obj.contains_key("range") && obj.contains_key("hint") {
        Some(Shape::Single)
    } else {
        None
    }
}

/// Read and parse a plan file
pub fn load_plan(path: &Path, base_path: Option<&Path>) -> Result<LoadedPlan, PlanError> {
    let content =
        std::fs::read_to_string(path).map_err(|e| PlanError::Read(path.to_path_buf(), e))?;
    parse_plan(&content, base_path)
}

/// Parse plan JSON, detecting its shape from element structure
///
/// Every element must share one shape. An empty array is an empty single plan.
pub fn parse_plan(json: &str, base_path: Option<&Path>) -> Result<LoadedPlan, PlanError> {
    let root: Value = serde_json::from_str(json)?;
    let elements = root.as_array().ok_or(PlanError::NotAnArray)?;

    let mut shape = None;
    for (i, element) in elements.iter().enumerate() {
        let this = shape_of(element).ok_or_else(|| {
            PlanError::UnknownFormat(format!(
                "element {} has neither range/hint nor name/tags",
                i
            ))
        })?;
        match shape {
            None => shape = Some(this),
            Some(s) if s != this => {
                return Err(PlanError::UnknownFormat(format!(
                    "element {} mixes single and multi shapes",
                    i
                )));
            }
            Some(_) => {}
        }
    }

    let mut warnings = Vec::new();
    let plan = match shape {
        None | Some(Shape::Single) => Plan::Single(parse_entries(elements, "", &mut warnings)),
        Some(Shape::Multi) => Plan::Multi(parse_folders(elements, base_path, &mut warnings)),
    };

    Ok(LoadedPlan { plan, warnings })
}

fn parse_entries(elements: &[Value], prefix: &str, warnings: &mut Vec<String>) -> Vec<PlanEntry> {
    let mut entries = Vec::with_capacity(elements.len());

    for (i, element) in elements.iter().enumerate() {
        let range = element.get("range").and_then(Value::as_array);
        let bounds = match range.map(|r| r.as_slice()) {
            Some([a, b]) => a.as_u64().zip(b.as_u64()),
            _ => None,
        };
        let Some((start, end)) = bounds else {
            warnings.push(format!("{}plan_item_{}_invalid_range", prefix, i));
            continue;
        };

        let hint = element
            .get("hint")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|h| !h.is_empty());
        let Some(hint) = hint else {
            warnings.push(format!("{}plan_item_{}_parse_error", prefix, i));
            continue;
        };

        entries.push(PlanEntry::new(start as usize, end as usize, hint));
    }

    entries
}

fn parse_folders(
    elements: &[Value],
    base_path: Option<&Path>,
    warnings: &mut Vec<String>,
) -> Vec<FolderPlan> {
    let mut folders = Vec::with_capacity(elements.len());

    for (i, element) in elements.iter().enumerate() {
        let name = element
            .get("name")
            .and_then(Value::as_str)
            .map(str::trim)
            .unwrap_or_default();
        if name.is_empty() {
            warnings.push(format!("folder_{}_missing_name", i));
            continue;
        }

        let explicit = element
            .get("path")
            .and_then(Value::as_str)
            .map(str::trim)
            .unwrap_or_default();
        let path = resolve_folder_path(name, explicit, base_path);

        let tags = element
            .get("tags")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default();
        let entries = parse_entries(tags, &format!("{}:", name), warnings);

        folders.push(FolderPlan {
            name: name.to_string(),
            path,
            entries,
        });
    }

    folders
}

/// Explicit path verbatim, else `base_path/name`, else `name`
pub fn resolve_folder_path(name: &str, explicit: &str, base_path: Option<&Path>) -> PathBuf {
    if !explicit.is_empty() {
        return PathBuf::from(explicit);
    }
    match base_path {
        Some(base) => base.join(name),
        None => PathBuf::from(name),
    }
}
