use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Normalized boundary positions: left trim, left page end, right page start,
/// right trim, each in `[0, 1]` of the source width.
pub type Lines = [f64; 4];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ImageKind {
    Content,
    Cover,
    Spread,
}

impl Default for ImageKind {
    fn default() -> Self {
        ImageKind::Content
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AcceleratorPreference {
    Cpu,
    Gpu,
    Auto,
}

impl Default for AcceleratorPreference {
    fn default() -> Self {
        AcceleratorPreference::Auto
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Accelerator {
    Cpu,
    Gpu,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceEntry {
    pub source_path: PathBuf,
    pub display_name: String,
    pub width: u32,
    pub height: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[serde(default)]
    pub recommended_lines: Option<Lines>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[serde(default)]
    pub existing_lines: Option<Lines>,
    #[serde(default)]
    pub locked: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[serde(default)]
    pub last_applied_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[serde(default)]
    pub image_kind: Option<ImageKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[serde(default)]
    pub rotate90: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportSummary {
    pub generated_at: String,
    pub total: u32,
    pub applied: u32,
    pub skipped: u32,
}

/// Hydration payload shared by `prepare_manual_split_workspace` and
/// `load_manual_split_context`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceContext {
    pub workspace: PathBuf,
    pub entries: Vec<WorkspaceEntry>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[serde(default)]
    pub manual_split_report_path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[serde(default)]
    pub manual_split_report_summary: Option<ReportSummary>,
    #[serde(default)]
    pub has_revert_history: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewRequest {
    pub workspace: PathBuf,
    pub source_path: PathBuf,
    pub lines: Lines,
    #[serde(default)]
    pub target_width: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewResponse {
    pub source_path: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[serde(default)]
    pub left_preview_path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[serde(default)]
    pub right_preview_path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[serde(default)]
    pub gutter_preview_path: Option<PathBuf>,
    pub generated_at: String,
}

/// One staged geometry submitted to `apply_manual_splits`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SplitOverride {
    pub source: PathBuf,
    pub left_trim: f64,
    pub left_page_end: f64,
    pub right_page_start: f64,
    pub right_trim: f64,
    #[serde(default)]
    pub gutter_ratio: Option<f64>,
    #[serde(default)]
    pub locked: bool,
    #[serde(default)]
    pub image_kind: ImageKind,
    #[serde(default)]
    pub rotate90: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplyRequest {
    pub workspace: PathBuf,
    #[serde(default)]
    pub overrides: Vec<SplitOverride>,
    #[serde(default)]
    pub accelerator: AcceleratorPreference,
    #[serde(default)]
    pub generate_preview: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplyEntry {
    pub source_path: PathBuf,
    pub outputs: Vec<PathBuf>,
    pub applied_at: String,
    pub lines: Lines,
    pub pixels: [u32; 4],
    pub accelerator: Accelerator,
    pub width: u32,
    pub height: u32,
    pub image_kind: ImageKind,
    pub rotate90: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplyOutcome {
    pub workspace: PathBuf,
    pub applied: Vec<ApplyEntry>,
    pub skipped: Vec<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[serde(default)]
    pub manual_split_report_path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[serde(default)]
    pub manual_split_report_summary: Option<ReportSummary>,
    #[serde(default)]
    pub can_revert: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RevertOutcome {
    pub workspace: PathBuf,
    pub restored_outputs: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[serde(default)]
    pub manual_split_report_path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[serde(default)]
    pub manual_split_report_summary: Option<ReportSummary>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplyProgress {
    pub workspace: PathBuf,
    pub total: usize,
    pub completed: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[serde(default)]
    pub current: Option<PathBuf>,
}
