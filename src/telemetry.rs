//! Append-only JSONL telemetry for draft-engine actions.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{SecondsFormat, Utc};
use serde_json::{json, Value};
use thiserror::Error;

const TELEMETRY_FILE: &str = "manual_split_telemetry.jsonl";

#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("failed to write telemetry: {0}")]
    Io(#[from] std::io::Error),
}

/// Writes one JSON object per line under the workspace's override directory.
///
/// Recording is best-effort; callers ignore the result so a read-only
/// workspace never blocks an edit.
#[derive(Debug, Clone)]
pub struct TelemetrySink {
    path: PathBuf,
}

impl TelemetrySink {
    pub fn for_workspace(workspace: &Path) -> Self {
        Self {
            path: workspace.join("manual-overrides").join(TELEMETRY_FILE),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn record(&self, event: &str, properties: Value) -> Result<(), TelemetryError> {
        if event.trim().is_empty() {
            return Ok(());
        }
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let line = json!({
            "timestamp": Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            "event": event,
            "properties": properties,
        });
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{line}")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_appends_one_json_line_per_event() {
        let workspace = tempfile::tempdir().unwrap();
        let sink = TelemetrySink::for_workspace(workspace.path());

        sink.record("manual-split/stage", json!({"source": "page_001.png"}))
            .unwrap();
        sink.record("manual-split/apply", json!({"total": 3}))
            .unwrap();

        let contents = fs::read_to_string(sink.path()).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);

        let first: Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["event"], "manual-split/stage");
        assert_eq!(first["properties"]["source"], "page_001.png");
        assert!(first["timestamp"].as_str().unwrap().ends_with('Z'));
    }

    #[test]
    fn blank_event_names_are_dropped() {
        let workspace = tempfile::tempdir().unwrap();
        let sink = TelemetrySink::for_workspace(workspace.path());
        sink.record("  ", json!({})).unwrap();
        assert!(!sink.path().exists());
    }
}
