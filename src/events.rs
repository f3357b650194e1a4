//! Event payloads emitted while an apply batch runs.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::types::{ApplyOutcome, ApplyProgress};

pub const EVENT_APPLY_STARTED: &str = "manual-split/apply-started";
pub const EVENT_APPLY_PROGRESS: &str = "manual-split/apply-progress";
pub const EVENT_APPLY_SUCCEEDED: &str = "manual-split/apply-succeeded";
pub const EVENT_APPLY_FAILED: &str = "manual-split/apply-failed";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum ApplyEvent {
    #[serde(rename = "manual-split/apply-started")]
    Started { workspace: PathBuf, total: usize },
    #[serde(rename = "manual-split/apply-progress")]
    Progress(ApplyProgress),
    #[serde(rename = "manual-split/apply-succeeded")]
    Succeeded(ApplyOutcome),
    #[serde(rename = "manual-split/apply-failed")]
    Failed { workspace: PathBuf, message: String },
}

impl ApplyEvent {
    pub fn name(&self) -> &'static str {
        match self {
            ApplyEvent::Started { .. } => EVENT_APPLY_STARTED,
            ApplyEvent::Progress(_) => EVENT_APPLY_PROGRESS,
            ApplyEvent::Succeeded(_) => EVENT_APPLY_SUCCEEDED,
            ApplyEvent::Failed { .. } => EVENT_APPLY_FAILED,
        }
    }

    /// The workspace the event belongs to; consumers drop events from other
    /// workspaces before reacting.
    pub fn workspace(&self) -> &Path {
        match self {
            ApplyEvent::Started { workspace, .. } => workspace,
            ApplyEvent::Progress(progress) => &progress.workspace,
            ApplyEvent::Succeeded(outcome) => &outcome.workspace,
            ApplyEvent::Failed { workspace, .. } => workspace,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_tag_with_their_channel_name() {
        let event = ApplyEvent::Started {
            workspace: PathBuf::from("/scans/split-manual"),
            total: 3,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "manual-split/apply-started");
        assert_eq!(event.name(), EVENT_APPLY_STARTED);
        assert_eq!(event.workspace(), Path::new("/scans/split-manual"));
    }

    #[test]
    fn progress_events_expose_their_workspace() {
        let event = ApplyEvent::Progress(ApplyProgress {
            workspace: PathBuf::from("/scans/split-manual"),
            total: 4,
            completed: 2,
            current: None,
        });
        assert_eq!(event.workspace(), Path::new("/scans/split-manual"));
        assert_eq!(event.name(), EVENT_APPLY_PROGRESS);
    }
}
