//! Draft engine for manually splitting scanned double-page spreads.
//!
//! The crate keeps per-page boundary drafts (with undo, staging and locks),
//! renders debounced previews through a pluggable backend, and orchestrates
//! batch apply/revert runs against that backend.

pub mod apply;
pub mod events;
pub mod geometry;
pub mod preview;
pub mod service;
pub mod store;
pub mod telemetry;
pub mod template;
pub mod types;

pub use apply::{ApplyOrchestrator, ApplyPhase, ApplyRunner, OrchestratorError};
pub use events::ApplyEvent;
pub use geometry::{lines_equal, solve_lines, SplitLayout, LINE_EPSILON};
pub use preview::{geometry_signature, PreviewConfig, PreviewHit, PreviewPipeline, PreviewUpdate};
pub use service::{MockSplitBackend, SplitBackend};
pub use store::{Draft, DraftStore, StoreError};
pub use telemetry::TelemetrySink;
pub use template::{
    export_template, import_template, parse_template, ImportSummary, TemplateDocument,
    TemplateEntry, TemplateError,
};
pub use types::{
    Accelerator, AcceleratorPreference, ApplyEntry, ApplyOutcome, ApplyProgress, ApplyRequest,
    ImageKind, Lines, PreviewRequest, PreviewResponse, ReportSummary, RevertOutcome, SplitOverride,
    WorkspaceContext, WorkspaceEntry,
};
