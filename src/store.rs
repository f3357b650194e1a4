use std::collections::VecDeque;
use std::path::{Path, PathBuf};

use natord::compare;
use thiserror::Error;

use crate::geometry::{lines_equal, solve_lines, SplitLayout, LINE_EPSILON};
use crate::types::{
    ApplyEntry, ImageKind, Lines, ReportSummary, SplitOverride, WorkspaceContext, WorkspaceEntry,
};

/// Bounded depth of the per-draft undo and redo stacks.
pub const HISTORY_LIMIT: usize = 20;

/// Working geometry assigned to a draft that arrives with neither prior nor
/// recommended lines.
const DEFAULT_LINES: Lines = [0.02, 0.48, 0.52, 0.98];

const DEFAULT_GUTTER_WIDTH_RATIO: f64 = 0.01;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("unknown draft: {0}")]
    DraftNotFound(PathBuf),
}

/// Editable split state for one source image.
#[derive(Debug, Clone)]
pub struct Draft {
    pub source_path: PathBuf,
    pub display_name: String,
    pub width: u32,
    pub height: u32,
    pub lines: Lines,
    pub image_kind: ImageKind,
    pub rotate90: bool,
    pub baseline_lines: Lines,
    pub baseline_image_kind: ImageKind,
    pub baseline_rotate90: bool,
    pub staged_lines: Lines,
    pub staged_image_kind: ImageKind,
    pub staged_rotate90: bool,
    pub staged: bool,
    pub locked: bool,
    pub has_pending_changes: bool,
    pub recommended_lines: Option<Lines>,
    pub last_applied_at: Option<String>,
    history: VecDeque<Lines>,
    redo_stack: VecDeque<Lines>,
}

impl Draft {
    pub fn history_depth(&self) -> usize {
        self.history.len()
    }

    pub fn redo_depth(&self) -> usize {
        self.redo_stack.len()
    }

    fn layout(&self) -> SplitLayout {
        SplitLayout::for_kind(self.image_kind)
    }

    fn refresh_pending(&mut self) {
        self.has_pending_changes = !lines_equal(self.lines, self.staged_lines)
            || self.image_kind != self.staged_image_kind
            || self.rotate90 != self.staged_rotate90;
    }

    fn push_history(&mut self, snapshot: Lines) {
        if self.history.len() == HISTORY_LIMIT {
            self.history.pop_front();
        }
        self.history.push_back(snapshot);
    }

    fn push_redo(&mut self, snapshot: Lines) {
        if self.redo_stack.len() == HISTORY_LIMIT {
            self.redo_stack.pop_front();
        }
        self.redo_stack.push_back(snapshot);
    }

    fn clear_stacks(&mut self) {
        self.history.clear();
        self.redo_stack.clear();
    }
}

/// Owns the draft collection and the shared editing configuration.
///
/// All mutation goes through methods here; every stored geometry is the
/// output of the line solver for the draft's image kind.
#[derive(Debug, Default)]
pub struct DraftStore {
    workspace: Option<PathBuf>,
    drafts: Vec<Draft>,
    selected: Option<PathBuf>,
    gutter_width_ratio: f64,
    initialized: bool,
    report_path: Option<PathBuf>,
    report_summary: Option<ReportSummary>,
    has_revert_history: bool,
}

impl DraftStore {
    pub fn new() -> Self {
        Self {
            gutter_width_ratio: DEFAULT_GUTTER_WIDTH_RATIO,
            ..Self::default()
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn workspace(&self) -> Option<&Path> {
        self.workspace.as_deref()
    }

    pub fn drafts(&self) -> &[Draft] {
        &self.drafts
    }

    pub fn draft(&self, id: &Path) -> Option<&Draft> {
        self.drafts.iter().find(|draft| draft.source_path == id)
    }

    pub fn selected(&self) -> Option<&Path> {
        self.selected.as_deref()
    }

    pub fn select(&mut self, id: &Path) -> Result<(), StoreError> {
        if self.draft(id).is_none() {
            return Err(StoreError::DraftNotFound(id.to_path_buf()));
        }
        self.selected = Some(id.to_path_buf());
        Ok(())
    }

    pub fn gutter_width_ratio(&self) -> f64 {
        self.gutter_width_ratio
    }

    pub fn report_path(&self) -> Option<&Path> {
        self.report_path.as_deref()
    }

    pub fn report_summary(&self) -> Option<&ReportSummary> {
        self.report_summary.as_ref()
    }

    pub fn has_revert_history(&self) -> bool {
        self.has_revert_history
    }

    pub fn set_revert_history(&mut self, value: bool) {
        self.has_revert_history = value;
    }

    pub fn set_report(&mut self, path: Option<PathBuf>, summary: Option<ReportSummary>) {
        self.report_path = path;
        self.report_summary = summary;
    }

    /// Rebuilds the whole collection from a backend-supplied context.
    ///
    /// Drafts are ordered naturally by source path and the first one is
    /// selected. Existing lines win over recommended ones; a draft with
    /// neither starts from the default working geometry.
    pub fn hydrate(&mut self, context: WorkspaceContext) {
        let WorkspaceContext {
            workspace,
            entries,
            manual_split_report_path,
            manual_split_report_summary,
            has_revert_history,
        } = context;

        let gutter = self.gutter_width_ratio;
        let mut drafts: Vec<Draft> = entries
            .into_iter()
            .map(|entry| build_draft(entry, gutter))
            .collect();
        drafts.sort_by(|a, b| {
            compare(
                a.source_path.to_string_lossy().as_ref(),
                b.source_path.to_string_lossy().as_ref(),
            )
        });

        self.selected = drafts.first().map(|draft| draft.source_path.clone());
        self.drafts = drafts;
        self.workspace = Some(workspace);
        self.report_path = manual_split_report_path;
        self.report_summary = manual_split_report_summary;
        self.has_revert_history = has_revert_history;
        self.initialized = true;
        log::debug!(
            "hydrated {} draft(s), gutter ratio {}",
            self.drafts.len(),
            gutter
        );
    }

    /// Normalizes and installs a new working geometry. Returns `false` when
    /// the normalized result matches the current lines within tolerance.
    pub fn update_lines(&mut self, id: &Path, raw: Lines) -> Result<bool, StoreError> {
        let gutter = self.gutter_width_ratio;
        let draft = self.draft_mut(id)?;
        let next = solve_lines(raw, gutter, draft.layout());
        if lines_equal(next, draft.lines) {
            return Ok(false);
        }
        let previous = draft.lines;
        draft.push_history(previous);
        draft.redo_stack.clear();
        draft.lines = next;
        draft.refresh_pending();
        Ok(true)
    }

    /// Switches the split layout for a draft. History is cleared because the
    /// stack snapshots were normalized for the previous mode.
    pub fn set_image_kind(&mut self, id: &Path, kind: ImageKind) -> Result<bool, StoreError> {
        let gutter = self.gutter_width_ratio;
        let draft = self.draft_mut(id)?;
        if draft.image_kind == kind {
            return Ok(false);
        }
        let layout = SplitLayout::for_kind(kind);
        draft.image_kind = kind;
        if kind == ImageKind::Spread {
            draft.rotate90 = true;
        }
        draft.lines = solve_lines(draft.lines, gutter, layout);
        draft.baseline_lines = solve_lines(draft.baseline_lines, gutter, layout);
        draft.staged_lines = solve_lines(draft.staged_lines, gutter, layout);
        if let Some(recommended) = draft.recommended_lines {
            draft.recommended_lines = Some(solve_lines(recommended, gutter, layout));
        }
        draft.clear_stacks();
        draft.refresh_pending();
        Ok(true)
    }

    /// Spread drafts are always rotated; requests to clear the flag on a
    /// spread are ignored.
    pub fn set_rotate90(&mut self, id: &Path, value: bool) -> Result<bool, StoreError> {
        let draft = self.draft_mut(id)?;
        let effective = if draft.image_kind == ImageKind::Spread {
            true
        } else {
            value
        };
        if draft.rotate90 == effective {
            return Ok(false);
        }
        draft.rotate90 = effective;
        draft.refresh_pending();
        Ok(true)
    }

    /// Snapshots the working state for the next batch commit and locks the
    /// draft. A locked draft stages nothing.
    pub fn stage_draft(&mut self, id: &Path) -> Result<bool, StoreError> {
        let draft = self.draft_mut(id)?;
        if draft.locked {
            return Ok(false);
        }
        draft.staged_lines = draft.lines;
        draft.staged_image_kind = draft.image_kind;
        draft.staged_rotate90 = draft.rotate90;
        draft.staged = true;
        draft.locked = true;
        draft.refresh_pending();
        Ok(true)
    }

    /// Propagates the base draft's working geometry to every other unlocked,
    /// unstaged draft, re-normalized for each target's own image kind, then
    /// stages and locks them all. Returns the number of drafts staged.
    pub fn apply_current_to_all_unlocked(&mut self, base_id: &Path) -> Result<usize, StoreError> {
        let base = self
            .draft(base_id)
            .ok_or_else(|| StoreError::DraftNotFound(base_id.to_path_buf()))?;
        let base_lines = base.lines;
        let gutter = self.gutter_width_ratio;

        let mut staged = 0usize;
        for draft in &mut self.drafts {
            if draft.source_path == base_id || draft.locked || draft.staged {
                continue;
            }
            let next = solve_lines(base_lines, gutter, draft.layout());
            if !lines_equal(next, draft.lines) {
                let previous = draft.lines;
                draft.push_history(previous);
                draft.redo_stack.clear();
                draft.lines = next;
            }
            draft.staged_lines = draft.lines;
            draft.staged_image_kind = draft.image_kind;
            draft.staged_rotate90 = draft.rotate90;
            draft.staged = true;
            draft.locked = true;
            draft.refresh_pending();
            staged += 1;
        }
        Ok(staged)
    }

    /// Reverts the staged snapshot to the baseline. The lock is deliberately
    /// left as-is; unlocking stays a separate, manual step.
    pub fn clear_stage(&mut self, id: &Path) -> Result<(), StoreError> {
        let draft = self.draft_mut(id)?;
        clear_stage_inner(draft);
        Ok(())
    }

    pub fn clear_all_stages(&mut self) {
        for draft in &mut self.drafts {
            clear_stage_inner(draft);
        }
    }

    pub fn toggle_lock(&mut self, id: &Path) -> Result<bool, StoreError> {
        let draft = self.draft_mut(id)?;
        draft.locked = !draft.locked;
        Ok(draft.locked)
    }

    pub fn set_lock_state(&mut self, id: &Path, locked: bool) -> Result<(), StoreError> {
        let draft = self.draft_mut(id)?;
        draft.locked = locked;
        Ok(())
    }

    pub fn undo_lines(&mut self, id: &Path) -> Result<bool, StoreError> {
        let draft = self.draft_mut(id)?;
        let Some(previous) = draft.history.pop_back() else {
            return Ok(false);
        };
        let current = draft.lines;
        draft.push_redo(current);
        draft.lines = previous;
        draft.refresh_pending();
        Ok(true)
    }

    pub fn redo_lines(&mut self, id: &Path) -> Result<bool, StoreError> {
        let draft = self.draft_mut(id)?;
        let Some(next) = draft.redo_stack.pop_back() else {
            return Ok(false);
        };
        let current = draft.lines;
        draft.push_history(current);
        draft.lines = next;
        draft.refresh_pending();
        Ok(true)
    }

    /// Restores the working lines to the (re-normalized) baseline, keeping
    /// the discarded value reachable through undo.
    pub fn reset_lines(&mut self, id: &Path) -> Result<bool, StoreError> {
        let gutter = self.gutter_width_ratio;
        let draft = self.draft_mut(id)?;
        Ok(reset_lines_inner(draft, gutter))
    }

    pub fn reset_all_lines(&mut self) -> usize {
        let gutter = self.gutter_width_ratio;
        self.drafts
            .iter_mut()
            .map(|draft| reset_lines_inner(draft, gutter))
            .filter(|changed| *changed)
            .count()
    }

    /// Backend-confirmed commit: promotes each entry to the baseline and the
    /// staged snapshot, clears history and records the applied timestamp.
    pub fn mark_applied(&mut self, entries: &[ApplyEntry]) {
        let gutter = self.gutter_width_ratio;
        for entry in entries {
            let Some(draft) = self
                .drafts
                .iter_mut()
                .find(|draft| draft.source_path == entry.source_path)
            else {
                log::warn!(
                    "apply confirmation for unknown draft {}",
                    entry.source_path.display()
                );
                continue;
            };
            let layout = SplitLayout::for_kind(entry.image_kind);
            let confirmed = solve_lines(entry.lines, gutter, layout);
            draft.lines = confirmed;
            draft.image_kind = entry.image_kind;
            draft.rotate90 = entry.rotate90;
            draft.baseline_lines = confirmed;
            draft.baseline_image_kind = entry.image_kind;
            draft.baseline_rotate90 = entry.rotate90;
            draft.staged_lines = confirmed;
            draft.staged_image_kind = entry.image_kind;
            draft.staged_rotate90 = entry.rotate90;
            draft.staged = false;
            draft.has_pending_changes = false;
            draft.last_applied_at = Some(entry.applied_at.clone());
            draft.clear_stacks();
        }
    }

    /// Changes the shared minimum-gap ratio and re-normalizes every stored
    /// geometry under it, undo and redo snapshots included.
    pub fn set_gutter_width_ratio(&mut self, ratio: f64) -> bool {
        let ratio = if ratio.is_finite() {
            ratio.clamp(0.0, 0.5)
        } else {
            return false;
        };
        if (ratio - self.gutter_width_ratio).abs() <= LINE_EPSILON {
            return false;
        }
        self.gutter_width_ratio = ratio;
        for draft in &mut self.drafts {
            let layout = draft.layout();
            draft.lines = solve_lines(draft.lines, ratio, layout);
            draft.baseline_lines = solve_lines(
                draft.baseline_lines,
                ratio,
                SplitLayout::for_kind(draft.baseline_image_kind),
            );
            draft.staged_lines = solve_lines(
                draft.staged_lines,
                ratio,
                SplitLayout::for_kind(draft.staged_image_kind),
            );
            if let Some(recommended) = draft.recommended_lines {
                draft.recommended_lines = Some(solve_lines(recommended, ratio, layout));
            }
            for snapshot in draft.history.iter_mut() {
                *snapshot = solve_lines(*snapshot, ratio, layout);
            }
            for snapshot in draft.redo_stack.iter_mut() {
                *snapshot = solve_lines(*snapshot, ratio, layout);
            }
            draft.refresh_pending();
        }
        true
    }

    /// Derives the batch submission payload from every staged draft.
    pub fn build_overrides(&self) -> Vec<SplitOverride> {
        self.drafts
            .iter()
            .filter(|draft| draft.staged)
            .map(|draft| {
                let lines = draft.staged_lines;
                SplitOverride {
                    source: draft.source_path.clone(),
                    left_trim: lines[0],
                    left_page_end: lines[1],
                    right_page_start: lines[2],
                    right_trim: lines[3],
                    gutter_ratio: Some((lines[2] - lines[1]).max(0.0)),
                    locked: draft.locked,
                    image_kind: draft.staged_image_kind,
                    rotate90: draft.staged_rotate90,
                }
            })
            .collect()
    }

    pub fn staged_count(&self) -> usize {
        self.drafts.iter().filter(|draft| draft.staged).count()
    }

    fn draft_mut(&mut self, id: &Path) -> Result<&mut Draft, StoreError> {
        self.drafts
            .iter_mut()
            .find(|draft| draft.source_path == id)
            .ok_or_else(|| StoreError::DraftNotFound(id.to_path_buf()))
    }
}

fn clear_stage_inner(draft: &mut Draft) {
    draft.staged_lines = draft.baseline_lines;
    draft.staged_image_kind = draft.baseline_image_kind;
    draft.staged_rotate90 = draft.baseline_rotate90;
    draft.staged = false;
    draft.refresh_pending();
}

fn reset_lines_inner(draft: &mut Draft, gutter: f64) -> bool {
    let restored = solve_lines(draft.baseline_lines, gutter, draft.layout());
    if lines_equal(restored, draft.lines) {
        return false;
    }
    let previous = draft.lines;
    draft.push_history(previous);
    draft.redo_stack.clear();
    draft.lines = restored;
    draft.refresh_pending();
    true
}

fn build_draft(entry: WorkspaceEntry, gutter: f64) -> Draft {
    let kind = entry.image_kind.unwrap_or_default();
    let layout = SplitLayout::for_kind(kind);
    let rotate90 = kind == ImageKind::Spread || entry.rotate90.unwrap_or(false);
    let initial = entry
        .existing_lines
        .or(entry.recommended_lines)
        .unwrap_or(DEFAULT_LINES);
    let lines = solve_lines(initial, gutter, layout);
    let recommended = entry
        .recommended_lines
        .map(|raw| solve_lines(raw, gutter, layout));

    Draft {
        source_path: entry.source_path,
        display_name: entry.display_name,
        width: entry.width,
        height: entry.height,
        lines,
        image_kind: kind,
        rotate90,
        baseline_lines: lines,
        baseline_image_kind: kind,
        baseline_rotate90: rotate90,
        staged_lines: lines,
        staged_image_kind: kind,
        staged_rotate90: rotate90,
        staged: false,
        locked: entry.locked,
        has_pending_changes: false,
        recommended_lines: recommended,
        last_applied_at: entry.last_applied_at,
        history: VecDeque::new(),
        redo_stack: VecDeque::new(),
    }
}
