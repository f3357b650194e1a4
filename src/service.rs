use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{SecondsFormat, Utc};

use crate::types::{
    Accelerator, AcceleratorPreference, ApplyEntry, ApplyOutcome, ApplyProgress, ApplyRequest,
    ImageKind, PreviewRequest, PreviewResponse, ReportSummary, RevertOutcome, WorkspaceContext,
    WorkspaceEntry,
};

/// The remote rendering/apply service behind the draft engine.
///
/// Implementations own all pixel-level work, acceleration selection and
/// workspace persistence; the engine only speaks these request/response
/// shapes.
pub trait SplitBackend: Send + Sync {
    fn prepare_manual_split_workspace(
        &self,
        source_directory: &Path,
        overwrite: bool,
    ) -> Result<WorkspaceContext, String>;

    fn load_manual_split_context(&self, workspace: &Path) -> Result<WorkspaceContext, String>;

    fn render_manual_split_preview(
        &self,
        request: &PreviewRequest,
    ) -> Result<PreviewResponse, String>;

    fn apply_manual_splits(
        &self,
        request: &ApplyRequest,
        progress: Option<&mut dyn FnMut(ApplyProgress)>,
    ) -> Result<ApplyOutcome, String>;

    fn revert_manual_splits(&self, workspace: &Path) -> Result<RevertOutcome, String>;
}

#[derive(Debug, Default)]
struct MockState {
    render_calls: usize,
    applied_batches: Vec<Vec<PathBuf>>,
    can_revert: bool,
    fail_next_apply: Option<String>,
}

/// A backend that performs no image work. It fabricates deterministic
/// workspace entries and preview paths so the engine can be wired and tested
/// without touching the filesystem.
#[derive(Debug, Default)]
pub struct MockSplitBackend {
    state: Mutex<MockState>,
    page_count: usize,
}

impl MockSplitBackend {
    pub fn new() -> Self {
        Self::with_pages(4)
    }

    pub fn with_pages(page_count: usize) -> Self {
        Self {
            state: Mutex::new(MockState::default()),
            page_count,
        }
    }

    pub fn render_calls(&self) -> usize {
        self.state.lock().expect("poisoned").render_calls
    }

    pub fn applied_batches(&self) -> Vec<Vec<PathBuf>> {
        self.state.lock().expect("poisoned").applied_batches.clone()
    }

    pub fn fail_next_apply(&self, message: impl Into<String>) {
        self.state.lock().expect("poisoned").fail_next_apply = Some(message.into());
    }

    fn entries(&self, root: &Path) -> Vec<WorkspaceEntry> {
        (1..=self.page_count)
            .map(|index| {
                let name = format!("page_{index:03}.png");
                WorkspaceEntry {
                    source_path: root.join(&name),
                    display_name: name,
                    width: 2048,
                    height: 1440,
                    recommended_lines: Some([0.02, 0.48, 0.52, 0.98]),
                    existing_lines: None,
                    locked: false,
                    last_applied_at: None,
                    image_kind: Some(ImageKind::Content),
                    rotate90: Some(false),
                }
            })
            .collect()
    }
}

fn now_stamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn preview_digest(source: &Path, lines: &[f64; 4]) -> u64 {
    let mut hasher = DefaultHasher::new();
    source.hash(&mut hasher);
    for value in lines {
        hasher.write_u64(value.to_bits());
    }
    hasher.finish()
}

impl SplitBackend for MockSplitBackend {
    fn prepare_manual_split_workspace(
        &self,
        source_directory: &Path,
        _overwrite: bool,
    ) -> Result<WorkspaceContext, String> {
        let workspace = source_directory.join("split-manual");
        Ok(WorkspaceContext {
            entries: self.entries(source_directory),
            workspace,
            manual_split_report_path: None,
            manual_split_report_summary: None,
            has_revert_history: self.state.lock().expect("poisoned").can_revert,
        })
    }

    fn load_manual_split_context(&self, workspace: &Path) -> Result<WorkspaceContext, String> {
        let root = workspace.parent().unwrap_or(workspace).to_path_buf();
        Ok(WorkspaceContext {
            entries: self.entries(&root),
            workspace: workspace.to_path_buf(),
            manual_split_report_path: None,
            manual_split_report_summary: None,
            has_revert_history: self.state.lock().expect("poisoned").can_revert,
        })
    }

    fn render_manual_split_preview(
        &self,
        request: &PreviewRequest,
    ) -> Result<PreviewResponse, String> {
        self.state.lock().expect("poisoned").render_calls += 1;

        let base_name = request
            .source_path
            .file_stem()
            .and_then(|value| value.to_str())
            .unwrap_or("page");
        let digest = preview_digest(&request.source_path, &request.lines);
        let previews_dir = request.workspace.join("manual-overrides").join("previews");
        let named = |suffix: &str| previews_dir.join(format!("{base_name}-{digest:x}-{suffix}.png"));

        let has_gutter = request.lines[2] > request.lines[1];
        Ok(PreviewResponse {
            source_path: request.source_path.clone(),
            left_preview_path: Some(named("left")),
            right_preview_path: Some(named("right")),
            gutter_preview_path: has_gutter.then(|| named("gutter")),
            generated_at: now_stamp(),
        })
    }

    fn apply_manual_splits(
        &self,
        request: &ApplyRequest,
        mut progress: Option<&mut dyn FnMut(ApplyProgress)>,
    ) -> Result<ApplyOutcome, String> {
        if request.overrides.is_empty() {
            return Err("no overrides provided".to_string());
        }
        if let Some(message) = self
            .state
            .lock()
            .expect("poisoned")
            .fail_next_apply
            .take()
        {
            return Err(message);
        }

        let total = request.overrides.len();
        let mut emit = |completed: usize, current: Option<&Path>| {
            if let Some(callback) = progress.as_mut() {
                callback(ApplyProgress {
                    workspace: request.workspace.clone(),
                    total,
                    completed,
                    current: current.map(|path| path.to_path_buf()),
                });
            }
        };
        emit(0, None);

        let accelerator = match request.accelerator {
            AcceleratorPreference::Gpu => Accelerator::Gpu,
            _ => Accelerator::Cpu,
        };
        let width = 2048u32;
        let height = 1440u32;

        let mut applied = Vec::with_capacity(total);
        for (index, item) in request.overrides.iter().enumerate() {
            emit(index, Some(&item.source));

            let lines = [
                item.left_trim,
                item.left_page_end,
                item.right_page_start,
                item.right_trim,
            ];
            let to_px = |value: f64| ((value * width as f64).round() as u32).min(width);
            let pixels = [
                to_px(lines[0]),
                to_px(lines[1]),
                to_px(lines[2]),
                to_px(lines[3]),
            ];

            let stem = item
                .source
                .file_stem()
                .and_then(|value| value.to_str())
                .unwrap_or("page");
            let parent = item.source.parent().unwrap_or(&request.workspace);
            let outputs = match item.image_kind {
                ImageKind::Content => vec![
                    parent.join(format!("{stem}_R.png")),
                    parent.join(format!("{stem}_L.png")),
                ],
                ImageKind::Cover => vec![parent.join(format!("{stem}_cover.png"))],
                ImageKind::Spread => vec![parent.join(format!("{stem}_spread.png"))],
            };

            applied.push(ApplyEntry {
                source_path: item.source.clone(),
                outputs,
                applied_at: now_stamp(),
                lines,
                pixels,
                accelerator,
                width,
                height,
                image_kind: item.image_kind,
                rotate90: item.rotate90,
            });
            emit(index + 1, Some(&item.source));
        }
        emit(total, None);

        let summary = ReportSummary {
            generated_at: now_stamp(),
            total: total as u32,
            applied: applied.len() as u32,
            skipped: 0,
        };

        {
            let mut state = self.state.lock().expect("poisoned");
            state.can_revert = true;
            state.applied_batches.push(
                applied
                    .iter()
                    .map(|entry| entry.source_path.clone())
                    .collect(),
            );
        }

        Ok(ApplyOutcome {
            workspace: request.workspace.clone(),
            applied,
            skipped: Vec::new(),
            manual_split_report_path: Some(request.workspace.join("manual_split_report.json")),
            manual_split_report_summary: Some(summary),
            can_revert: true,
        })
    }

    fn revert_manual_splits(&self, workspace: &Path) -> Result<RevertOutcome, String> {
        let mut state = self.state.lock().expect("poisoned");
        if !state.can_revert {
            return Err("no revert history for workspace".to_string());
        }
        state.can_revert = false;
        let restored = state
            .applied_batches
            .last()
            .map(|batch| batch.len())
            .unwrap_or(0);
        Ok(RevertOutcome {
            workspace: workspace.to_path_buf(),
            restored_outputs: restored,
            manual_split_report_path: None,
            manual_split_report_summary: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mock_prepare_yields_ordered_entries() {
        let backend = MockSplitBackend::with_pages(3);
        let context = backend
            .prepare_manual_split_workspace(Path::new("/scans"), false)
            .unwrap();
        assert_eq!(context.workspace, PathBuf::from("/scans/split-manual"));
        assert_eq!(context.entries.len(), 3);
        assert!(!context.has_revert_history);
    }

    #[test]
    fn mock_preview_paths_depend_on_geometry() {
        let backend = MockSplitBackend::new();
        let request = |lines| PreviewRequest {
            workspace: PathBuf::from("/scans/split-manual"),
            source_path: PathBuf::from("/scans/page_001.png"),
            lines,
            target_width: Some(640),
        };
        let first = backend
            .render_manual_split_preview(&request([0.02, 0.48, 0.52, 0.98]))
            .unwrap();
        let second = backend
            .render_manual_split_preview(&request([0.05, 0.45, 0.55, 0.95]))
            .unwrap();
        assert_ne!(first.left_preview_path, second.left_preview_path);
        assert_eq!(backend.render_calls(), 2);
    }

    #[test]
    fn mock_apply_streams_progress_and_enables_revert() {
        let backend = MockSplitBackend::new();
        let request = ApplyRequest {
            workspace: PathBuf::from("/scans/split-manual"),
            overrides: vec![crate::types::SplitOverride {
                source: PathBuf::from("/scans/page_001.png"),
                left_trim: 0.05,
                left_page_end: 0.45,
                right_page_start: 0.55,
                right_trim: 0.95,
                gutter_ratio: Some(0.1),
                locked: true,
                image_kind: ImageKind::Content,
                rotate90: false,
            }],
            accelerator: AcceleratorPreference::Auto,
            generate_preview: false,
        };

        let mut events = Vec::new();
        let mut on_progress = |payload: ApplyProgress| events.push(payload);
        let outcome = backend
            .apply_manual_splits(&request, Some(&mut on_progress))
            .unwrap();

        assert_eq!(outcome.applied.len(), 1);
        assert_eq!(outcome.applied[0].outputs.len(), 2);
        assert!(outcome.can_revert);
        assert!(events.iter().any(|event| event.completed == 1));

        let revert = backend
            .revert_manual_splits(Path::new("/scans/split-manual"))
            .unwrap();
        assert_eq!(revert.restored_outputs, 1);
        assert!(backend
            .revert_manual_splits(Path::new("/scans/split-manual"))
            .is_err());
    }
}
