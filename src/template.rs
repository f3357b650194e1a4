//! Template export/import: a portable JSON snapshot of a workspace's draft
//! geometry that can be replayed onto another hydration of the same book.

use std::path::{Path, PathBuf};

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::store::DraftStore;
use crate::types::{AcceleratorPreference, ImageKind, Lines};

#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("template is not valid JSON: {0}")]
    Malformed(String),
    #[error("template entry {0} has no source path")]
    MissingSource(usize),
    #[error("template contains no entries")]
    Empty,
    #[error("no workspace hydrated")]
    NotHydrated,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateEntry {
    pub source: PathBuf,
    pub lines: Lines,
    #[serde(default)]
    pub locked: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[serde(default)]
    pub width: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[serde(default)]
    pub height: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[serde(default)]
    pub image_kind: Option<ImageKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[serde(default)]
    pub rotate90: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateDocument {
    pub generated_at: String,
    pub workspace: PathBuf,
    #[serde(default)]
    pub accelerator: AcceleratorPreference,
    pub gutter_ratio: f64,
    pub entry_count: usize,
    pub entries: Vec<TemplateEntry>,
}

/// Outcome of replaying a template onto a hydrated store.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImportSummary {
    pub matched: usize,
    pub skipped_locked: usize,
    pub unmatched: Vec<PathBuf>,
}

pub fn export_template(
    store: &DraftStore,
    accelerator: AcceleratorPreference,
) -> Result<TemplateDocument, TemplateError> {
    let workspace = store
        .workspace()
        .ok_or(TemplateError::NotHydrated)?
        .to_path_buf();
    let entries: Vec<TemplateEntry> = store
        .drafts()
        .iter()
        .map(|draft| TemplateEntry {
            source: draft.source_path.clone(),
            lines: draft.lines,
            locked: draft.locked,
            display_name: Some(draft.display_name.clone()),
            width: Some(draft.width),
            height: Some(draft.height),
            image_kind: Some(draft.image_kind),
            rotate90: Some(draft.rotate90),
        })
        .collect();
    if entries.is_empty() {
        return Err(TemplateError::Empty);
    }
    Ok(TemplateDocument {
        generated_at: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        workspace,
        accelerator,
        gutter_ratio: store.gutter_width_ratio(),
        entry_count: entries.len(),
        entries,
    })
}

pub fn encode_template(document: &TemplateDocument) -> Result<String, TemplateError> {
    serde_json::to_string_pretty(document).map_err(|error| TemplateError::Malformed(error.to_string()))
}

/// Parses and validates a template document without touching any store.
pub fn parse_template(payload: &str) -> Result<TemplateDocument, TemplateError> {
    let document: TemplateDocument =
        serde_json::from_str(payload).map_err(|error| TemplateError::Malformed(error.to_string()))?;
    validate(&document)?;
    Ok(document)
}

fn validate(document: &TemplateDocument) -> Result<(), TemplateError> {
    if document.entries.is_empty() {
        return Err(TemplateError::Empty);
    }
    if document.entry_count != document.entries.len() {
        return Err(TemplateError::Malformed(format!(
            "entryCount {} does not match {} entries",
            document.entry_count,
            document.entries.len()
        )));
    }
    for (index, entry) in document.entries.iter().enumerate() {
        if entry.source.as_os_str().is_empty() {
            return Err(TemplateError::MissingSource(index));
        }
    }
    Ok(())
}

fn normalized(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

/// Resolves one template entry to a draft currently in the store.
///
/// Tier 1 is an exact path match, tier 2 a separator-normalized lexical
/// match (templates move between platforms), tier 3 a basename match with
/// width/height used to break ties. Ambiguous basenames stay unmatched.
fn reconcile(store: &DraftStore, entry: &TemplateEntry) -> Option<PathBuf> {
    if store.draft(&entry.source).is_some() {
        return Some(entry.source.clone());
    }

    let wanted = normalized(&entry.source);
    if let Some(draft) = store
        .drafts()
        .iter()
        .find(|draft| normalized(&draft.source_path) == wanted)
    {
        return Some(draft.source_path.clone());
    }

    let base = entry.source.file_name()?;
    let candidates: Vec<&crate::store::Draft> = store
        .drafts()
        .iter()
        .filter(|draft| draft.source_path.file_name() == Some(base))
        .collect();
    match candidates.as_slice() {
        [] => None,
        [only] => Some(only.source_path.clone()),
        many => {
            let (width, height) = (entry.width?, entry.height?);
            let mut hits = many
                .iter()
                .filter(|draft| draft.width == width && draft.height == height);
            let first = hits.next()?;
            if hits.next().is_some() {
                return None;
            }
            Some(first.source_path.clone())
        }
    }
}

/// Replays a validated template onto the store.
///
/// The gutter ratio lands first so entry geometry normalizes against it.
/// Locked drafts keep their geometry and are counted as skipped.
pub fn import_template(
    store: &mut DraftStore,
    document: &TemplateDocument,
) -> Result<ImportSummary, TemplateError> {
    if !store.is_initialized() {
        return Err(TemplateError::NotHydrated);
    }
    validate(document)?;

    store.set_gutter_width_ratio(document.gutter_ratio);

    let mut summary = ImportSummary::default();
    for entry in &document.entries {
        let Some(id) = reconcile(store, entry) else {
            summary.unmatched.push(entry.source.clone());
            continue;
        };
        let locked = store.draft(&id).map(|draft| draft.locked).unwrap_or(false);
        if locked {
            summary.skipped_locked += 1;
            continue;
        }

        if let Some(kind) = entry.image_kind {
            let _ = store.set_image_kind(&id, kind);
        }
        if let Some(rotate) = entry.rotate90 {
            let _ = store.set_rotate90(&id, rotate);
        }
        let _ = store.update_lines(&id, entry.lines);
        let _ = store.set_lock_state(&id, entry.locked);
        summary.matched += 1;
    }
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{WorkspaceContext, WorkspaceEntry};

    fn entry(path: &str, width: u32) -> WorkspaceEntry {
        WorkspaceEntry {
            source_path: PathBuf::from(path),
            display_name: Path::new(path)
                .file_name()
                .unwrap()
                .to_string_lossy()
                .into_owned(),
            width,
            height: 1440,
            recommended_lines: Some([0.02, 0.48, 0.52, 0.98]),
            existing_lines: None,
            locked: false,
            last_applied_at: None,
            image_kind: Some(ImageKind::Content),
            rotate90: Some(false),
        }
    }

    fn hydrated_store(paths: &[&str]) -> DraftStore {
        let mut store = DraftStore::new();
        store.hydrate(WorkspaceContext {
            workspace: PathBuf::from("/scans/split-manual"),
            entries: paths.iter().map(|path| entry(path, 2048)).collect(),
            manual_split_report_path: None,
            manual_split_report_summary: None,
            has_revert_history: false,
        });
        store
    }

    fn template_entry(source: &str, lines: Lines) -> TemplateEntry {
        TemplateEntry {
            source: PathBuf::from(source),
            lines,
            locked: false,
            display_name: None,
            width: None,
            height: None,
            image_kind: None,
            rotate90: None,
        }
    }

    fn document(entries: Vec<TemplateEntry>) -> TemplateDocument {
        TemplateDocument {
            generated_at: "2026-08-23T00:00:00.000Z".into(),
            workspace: PathBuf::from("/scans/split-manual"),
            accelerator: AcceleratorPreference::Auto,
            gutter_ratio: 0.02,
            entry_count: entries.len(),
            entries,
        }
    }

    #[test]
    fn export_captures_current_geometry_and_gutter() {
        let mut store = hydrated_store(&["/scans/page_001.png", "/scans/page_002.png"]);
        store
            .update_lines(Path::new("/scans/page_001.png"), [0.05, 0.45, 0.55, 0.95])
            .unwrap();
        let exported = export_template(&store, AcceleratorPreference::Gpu).unwrap();
        assert_eq!(exported.entry_count, 2);
        assert_eq!(exported.entries[0].lines, [0.05, 0.45, 0.55, 0.95]);
        assert_eq!(exported.gutter_ratio, store.gutter_width_ratio());
        assert_eq!(exported.workspace, PathBuf::from("/scans/split-manual"));
    }

    #[test]
    fn export_requires_a_hydrated_store() {
        let store = DraftStore::new();
        assert!(matches!(
            export_template(&store, AcceleratorPreference::Auto),
            Err(TemplateError::NotHydrated)
        ));
    }

    #[test]
    fn parse_rejects_invalid_documents() {
        assert!(matches!(
            parse_template("not json"),
            Err(TemplateError::Malformed(_))
        ));

        let empty = document(Vec::new());
        let payload = encode_template(&empty).unwrap();
        assert!(matches!(parse_template(&payload), Err(TemplateError::Empty)));

        let mut missing = document(vec![
            template_entry("/scans/page_001.png", [0.02, 0.48, 0.52, 0.98]),
            template_entry("", [0.02, 0.48, 0.52, 0.98]),
        ]);
        missing.entry_count = 2;
        let payload = encode_template(&missing).unwrap();
        assert!(matches!(
            parse_template(&payload),
            Err(TemplateError::MissingSource(1))
        ));

        let mut mismatched =
            document(vec![template_entry("/scans/page_001.png", [0.02, 0.48, 0.52, 0.98])]);
        mismatched.entry_count = 5;
        let payload = encode_template(&mismatched).unwrap();
        assert!(matches!(
            parse_template(&payload),
            Err(TemplateError::Malformed(_))
        ));
    }

    #[test]
    fn import_matches_exact_paths() {
        let mut store = hydrated_store(&["/scans/page_001.png", "/scans/page_002.png"]);
        let doc = document(vec![template_entry(
            "/scans/page_001.png",
            [0.1, 0.4, 0.6, 0.9],
        )]);
        let summary = import_template(&mut store, &doc).unwrap();
        assert_eq!(summary.matched, 1);
        assert!(summary.unmatched.is_empty());
        assert_eq!(
            store.draft(Path::new("/scans/page_001.png")).unwrap().lines,
            [0.1, 0.4, 0.6, 0.9]
        );
        assert_eq!(store.gutter_width_ratio(), 0.02);
    }

    #[test]
    fn import_matches_across_path_separators() {
        let mut store = hydrated_store(&["/scans/page_001.png"]);
        let doc = document(vec![template_entry(
            r"\scans\page_001.png",
            [0.1, 0.4, 0.6, 0.9],
        )]);
        let summary = import_template(&mut store, &doc).unwrap();
        assert_eq!(summary.matched, 1);
    }

    #[test]
    fn import_falls_back_to_basename_with_dimension_tiebreak() {
        let mut store = DraftStore::new();
        store.hydrate(WorkspaceContext {
            workspace: PathBuf::from("/scans/split-manual"),
            entries: vec![
                entry("/scans/vol1/page_001.png", 2048),
                entry("/scans/vol2/page_001.png", 1600),
            ],
            manual_split_report_path: None,
            manual_split_report_summary: None,
            has_revert_history: false,
        });

        let mut tiebreak = template_entry("/elsewhere/page_001.png", [0.1, 0.4, 0.6, 0.9]);
        tiebreak.width = Some(1600);
        tiebreak.height = Some(1440);
        let summary = import_template(&mut store, &document(vec![tiebreak])).unwrap();
        assert_eq!(summary.matched, 1);
        assert_eq!(
            store
                .draft(Path::new("/scans/vol2/page_001.png"))
                .unwrap()
                .lines,
            [0.1, 0.4, 0.6, 0.9]
        );

        // Without dimensions the basename is ambiguous and stays unmatched.
        let ambiguous = template_entry("/elsewhere/page_001.png", [0.2, 0.4, 0.6, 0.8]);
        let summary = import_template(&mut store, &document(vec![ambiguous])).unwrap();
        assert_eq!(summary.matched, 0);
        assert_eq!(summary.unmatched.len(), 1);
    }

    #[test]
    fn import_skips_locked_drafts() {
        let mut store = hydrated_store(&["/scans/page_001.png"]);
        store
            .set_lock_state(Path::new("/scans/page_001.png"), true)
            .unwrap();
        let before = store.draft(Path::new("/scans/page_001.png")).unwrap().lines;

        let doc = document(vec![template_entry(
            "/scans/page_001.png",
            [0.1, 0.4, 0.6, 0.9],
        )]);
        let summary = import_template(&mut store, &doc).unwrap();
        assert_eq!(summary.skipped_locked, 1);
        assert_eq!(summary.matched, 0);
        assert_eq!(
            store.draft(Path::new("/scans/page_001.png")).unwrap().lines,
            before
        );
    }

    #[test]
    fn import_reports_unknown_sources() {
        let mut store = hydrated_store(&["/scans/page_001.png"]);
        let doc = document(vec![template_entry(
            "/scans/page_099.png",
            [0.1, 0.4, 0.6, 0.9],
        )]);
        let summary = import_template(&mut store, &doc).unwrap();
        assert_eq!(summary.matched, 0);
        assert_eq!(summary.unmatched, vec![PathBuf::from("/scans/page_099.png")]);
    }

    #[test]
    fn import_applies_kind_rotation_and_lock() {
        let mut store = hydrated_store(&["/scans/page_001.png"]);
        let mut spread = template_entry("/scans/page_001.png", [0.1, 0.0, 0.0, 0.9]);
        spread.image_kind = Some(ImageKind::Spread);
        spread.locked = true;
        let summary = import_template(&mut store, &document(vec![spread])).unwrap();
        assert_eq!(summary.matched, 1);

        let draft = store.draft(Path::new("/scans/page_001.png")).unwrap();
        assert_eq!(draft.image_kind, ImageKind::Spread);
        assert!(draft.rotate90);
        assert!(draft.locked);
        assert_eq!(draft.lines[0], draft.lines[1]);
        assert_eq!(draft.lines[2], draft.lines[3]);
    }
}
