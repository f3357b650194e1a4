//! Apply/revert orchestration: drives staged geometry through the backend,
//! tracks batch lifecycle state and folds results back into the draft store.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{SecondsFormat, Utc};
use thiserror::Error;

use crate::events::ApplyEvent;
use crate::service::SplitBackend;
use crate::store::DraftStore;
use crate::types::{
    AcceleratorPreference, ApplyOutcome, ApplyProgress, ApplyRequest, ReportSummary, RevertOutcome,
};

#[derive(Debug, Error, PartialEq)]
pub enum OrchestratorError {
    #[error("no workspace hydrated")]
    NotHydrated,
    #[error("no staged drafts to apply")]
    NothingStaged,
    #[error("an apply batch is already running")]
    AlreadyRunning,
    #[error("backend error: {0}")]
    Backend(String),
}

/// Lifecycle of the current (or most recent) apply batch.
#[derive(Debug, Clone, PartialEq)]
pub enum ApplyPhase {
    Idle,
    Running {
        total: usize,
        completed: usize,
        current: Option<PathBuf>,
    },
    Succeeded {
        total: usize,
        completed: usize,
        summary: Option<ReportSummary>,
        finished_at: String,
    },
    Failed {
        message: String,
        finished_at: String,
    },
}

fn now_stamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Progress tracker for one batch at a time.
///
/// Completed counts never move backwards and an implausible total reported
/// mid-batch is ignored in favor of the one the batch started with.
#[derive(Debug, Default)]
pub struct ApplyRunner {
    phase: Option<ApplyPhase>,
}

impl ApplyRunner {
    pub fn new() -> Self {
        Self {
            phase: Some(ApplyPhase::Idle),
        }
    }

    pub fn phase(&self) -> &ApplyPhase {
        self.phase.as_ref().unwrap_or(&ApplyPhase::Idle)
    }

    pub fn is_running(&self) -> bool {
        matches!(self.phase(), ApplyPhase::Running { .. })
    }

    pub fn begin_apply(&mut self, total: usize) -> Result<(), OrchestratorError> {
        if self.is_running() {
            return Err(OrchestratorError::AlreadyRunning);
        }
        self.phase = Some(ApplyPhase::Running {
            total,
            completed: 0,
            current: None,
        });
        Ok(())
    }

    pub fn update_progress(&mut self, progress: &ApplyProgress) {
        let Some(ApplyPhase::Running {
            total,
            completed,
            current,
        }) = self.phase.as_mut()
        else {
            return;
        };
        if progress.total > 0 && progress.total >= progress.completed {
            *total = progress.total;
        }
        if progress.completed > *completed {
            *completed = progress.completed.min(*total);
        }
        *current = progress.current.clone();
    }

    /// Terminal success transition. Callers that know better counts than the
    /// streamed progress reported can override them; `None` keeps the counts
    /// the run accumulated.
    pub fn resolve_succeeded(
        &mut self,
        summary: Option<ReportSummary>,
        completed: Option<usize>,
        total: Option<usize>,
    ) {
        let (run_total, run_completed) = match self.phase() {
            ApplyPhase::Running {
                total, completed, ..
            } => (*total, *completed),
            _ => (0, 0),
        };
        let total = total.unwrap_or(run_total);
        let completed = completed.unwrap_or_else(|| run_completed.max(total));
        self.phase = Some(ApplyPhase::Succeeded {
            total,
            completed,
            summary,
            finished_at: now_stamp(),
        });
    }

    pub fn resolve_failed(&mut self, message: String) {
        self.phase = Some(ApplyPhase::Failed {
            message,
            finished_at: now_stamp(),
        });
    }
}

/// Couples a [`DraftStore`] with the backend that executes its staged drafts.
pub struct ApplyOrchestrator {
    backend: Arc<dyn SplitBackend>,
    store: DraftStore,
    runner: ApplyRunner,
    pub accelerator: AcceleratorPreference,
}

impl ApplyOrchestrator {
    pub fn new(backend: Arc<dyn SplitBackend>, store: DraftStore) -> Self {
        Self {
            backend,
            store,
            runner: ApplyRunner::new(),
            accelerator: AcceleratorPreference::default(),
        }
    }

    pub fn store(&self) -> &DraftStore {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut DraftStore {
        &mut self.store
    }

    pub fn phase(&self) -> &ApplyPhase {
        self.runner.phase()
    }

    /// Submits every staged draft as one batch.
    ///
    /// Validation errors surface before any store mutation; a backend failure
    /// leaves the store exactly as it was so the batch can be retried.
    pub fn submit_staged(
        &mut self,
        mut emit: impl FnMut(ApplyEvent),
    ) -> Result<ApplyOutcome, OrchestratorError> {
        let workspace = self
            .store
            .workspace()
            .ok_or(OrchestratorError::NotHydrated)?
            .to_path_buf();
        let overrides = self.store.build_overrides();
        if overrides.is_empty() {
            return Err(OrchestratorError::NothingStaged);
        }

        let total = overrides.len();
        self.runner.begin_apply(total)?;
        emit(ApplyEvent::Started {
            workspace: workspace.clone(),
            total,
        });

        let request = ApplyRequest {
            workspace: workspace.clone(),
            overrides,
            accelerator: self.accelerator,
            generate_preview: false,
        };

        let runner = &mut self.runner;
        let mut on_progress = |progress: ApplyProgress| {
            if progress.workspace != workspace {
                return;
            }
            runner.update_progress(&progress);
            emit(ApplyEvent::Progress(progress));
        };
        let result = self
            .backend
            .apply_manual_splits(&request, Some(&mut on_progress));

        match result {
            Ok(outcome) => {
                self.store.mark_applied(&outcome.applied);
                self.store.set_report(
                    outcome.manual_split_report_path.clone(),
                    outcome.manual_split_report_summary.clone(),
                );
                self.store.set_revert_history(outcome.can_revert);
                self.runner.resolve_succeeded(
                    outcome.manual_split_report_summary.clone(),
                    None,
                    None,
                );
                emit(ApplyEvent::Succeeded(outcome.clone()));
                Ok(outcome)
            }
            Err(message) => {
                self.runner.resolve_failed(message.clone());
                emit(ApplyEvent::Failed {
                    workspace,
                    message: message.clone(),
                });
                Err(OrchestratorError::Backend(message))
            }
        }
    }

    /// Reverts the workspace's last applied batch and re-hydrates the store
    /// from the backend's post-revert context.
    pub fn revert(&mut self) -> Result<RevertOutcome, OrchestratorError> {
        if self.runner.is_running() {
            return Err(OrchestratorError::AlreadyRunning);
        }
        let workspace = self
            .store
            .workspace()
            .ok_or(OrchestratorError::NotHydrated)?
            .to_path_buf();

        let outcome = self
            .backend
            .revert_manual_splits(&workspace)
            .map_err(OrchestratorError::Backend)?;

        let context = self
            .backend
            .load_manual_split_context(&workspace)
            .map_err(OrchestratorError::Backend)?;
        self.store.hydrate(context);
        self.store.set_report(
            outcome.manual_split_report_path.clone(),
            outcome.manual_split_report_summary.clone(),
        );
        self.store.set_revert_history(false);
        Ok(outcome)
    }

    /// Feeds an externally observed event into the lifecycle tracker, dropping
    /// events that belong to another workspace.
    pub fn handle_event(&mut self, event: &ApplyEvent) {
        let Some(workspace) = self.store.workspace() else {
            return;
        };
        if event.workspace() != workspace {
            return;
        }
        match event {
            ApplyEvent::Started { total, .. } => {
                let _ = self.runner.begin_apply(*total);
            }
            ApplyEvent::Progress(progress) => self.runner.update_progress(progress),
            ApplyEvent::Succeeded(outcome) => self.runner.resolve_succeeded(
                outcome.manual_split_report_summary.clone(),
                None,
                None,
            ),
            ApplyEvent::Failed { message, .. } => self.runner.resolve_failed(message.clone()),
        }
    }
}
