//! Preview pipeline: bounded-concurrency rendering with a signature-keyed
//! cache and stale-result suppression.

use std::collections::{HashMap, VecDeque};
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use lru::LruCache;

use crate::service::SplitBackend;
use crate::types::{Lines, PreviewRequest, PreviewResponse};

const DEFAULT_MAX_IN_FLIGHT: usize = 6;
const DEFAULT_CACHE_CAPACITY: usize = 64;
const DEFAULT_POLL_INTERVAL_MS: u64 = 200;

/// Rounded, string-encoded fingerprint of a geometry, used for cache and
/// dedup keys.
pub fn geometry_signature(lines: Lines) -> String {
    format!(
        "{:.4}:{:.4}:{:.4}:{:.4}",
        lines[0], lines[1], lines[2], lines[3]
    )
}

#[derive(Clone)]
pub struct PreviewConfig {
    pub max_in_flight: usize,
    pub cache_capacity: usize,
    pub target_width: Option<u32>,
    pub poll_interval: Duration,
}

impl Default for PreviewConfig {
    fn default() -> Self {
        Self {
            max_in_flight: DEFAULT_MAX_IN_FLIGHT,
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            target_width: None,
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
        }
    }
}

/// A cache hit returned synchronously from [`PreviewPipeline::request_preview`].
#[derive(Debug, Clone)]
pub struct PreviewHit {
    pub response: PreviewResponse,
    pub age: Duration,
}

#[derive(Debug, Clone)]
pub enum PreviewUpdate {
    Rendered {
        source_path: PathBuf,
        signature: String,
        response: PreviewResponse,
    },
    Failed {
        source_path: PathBuf,
        signature: String,
        message: String,
    },
}

struct CachedPreview {
    response: PreviewResponse,
    rendered_at: Instant,
}

struct PendingJob {
    workspace: PathBuf,
    source_path: PathBuf,
    lines: Lines,
    signature: String,
}

struct PreviewShared {
    cache: LruCache<(PathBuf, String), CachedPreview>,
    last_requested: HashMap<PathBuf, String>,
    queued: VecDeque<PendingJob>,
    in_flight: usize,
}

enum PreviewCommand {
    Pump,
    Finished {
        source_path: PathBuf,
        signature: String,
        token: u64,
        result: Result<PreviewResponse, String>,
    },
    Shutdown,
}

struct PreviewCore {
    config: PreviewConfig,
    backend: Arc<dyn SplitBackend>,
    shared: Arc<Mutex<PreviewShared>>,
    command_tx: mpsc::Sender<PreviewCommand>,
    updates: mpsc::Sender<PreviewUpdate>,
    dispatch_counter: u64,
    latest_token: u64,
}

impl PreviewCore {
    fn handle_command(&mut self, command: PreviewCommand) -> bool {
        match command {
            PreviewCommand::Pump => {
                self.pump();
                false
            }
            PreviewCommand::Finished {
                source_path,
                signature,
                token,
                result,
            } => {
                self.finish(source_path, signature, token, result);
                self.pump();
                false
            }
            PreviewCommand::Shutdown => true,
        }
    }

    fn pump(&mut self) {
        loop {
            let job = {
                let mut shared = self.shared.lock().expect("poisoned");
                if shared.in_flight >= self.config.max_in_flight {
                    return;
                }
                let Some(job) = shared.queued.pop_front() else {
                    return;
                };
                shared.in_flight += 1;
                job
            };

            self.dispatch_counter += 1;
            let token = self.dispatch_counter;
            self.latest_token = token;

            let request = PreviewRequest {
                workspace: job.workspace,
                source_path: job.source_path,
                lines: job.lines,
                target_width: self.config.target_width,
            };
            let signature = job.signature;
            let backend = Arc::clone(&self.backend);
            let command_tx = self.command_tx.clone();
            thread::Builder::new()
                .name("preview-worker".into())
                .spawn(move || {
                    let result = backend.render_manual_split_preview(&request);
                    let _ = command_tx.send(PreviewCommand::Finished {
                        source_path: request.source_path,
                        signature,
                        token,
                        result,
                    });
                })
                .expect("spawn preview worker");
        }
    }

    fn finish(
        &mut self,
        source_path: PathBuf,
        signature: String,
        token: u64,
        result: Result<PreviewResponse, String>,
    ) {
        {
            let mut shared = self.shared.lock().expect("poisoned");
            shared.in_flight = shared.in_flight.saturating_sub(1);

            // A newer dispatch supersedes this result, whichever source it
            // belongs to; stale arrivals are dropped without comment.
            if token != self.latest_token {
                log::debug!(
                    "discarding stale preview for {} ({})",
                    source_path.display(),
                    signature
                );
                return;
            }

            match &result {
                Ok(response) => {
                    shared.cache.put(
                        (source_path.clone(), signature.clone()),
                        CachedPreview {
                            response: response.clone(),
                            rendered_at: Instant::now(),
                        },
                    );
                }
                Err(_) => {
                    // Nothing was cached, so keeping the dedup entry would
                    // suppress retries of this geometry forever.
                    if shared.last_requested.get(&source_path) == Some(&signature) {
                        shared.last_requested.remove(&source_path);
                    }
                }
            }
        }

        let update = match result {
            Ok(response) => PreviewUpdate::Rendered {
                source_path,
                signature,
                response,
            },
            Err(message) => PreviewUpdate::Failed {
                source_path,
                signature,
                message,
            },
        };
        let _ = self.updates.send(update);
    }
}

/// Handle to the pipeline's dispatcher loop. Dropping it shuts the loop down.
pub struct PreviewPipeline {
    sender: mpsc::Sender<PreviewCommand>,
    shared: Arc<Mutex<PreviewShared>>,
    join_handle: Mutex<Option<thread::JoinHandle<()>>>,
}

impl PreviewPipeline {
    pub fn spawn(
        config: PreviewConfig,
        backend: Arc<dyn SplitBackend>,
    ) -> (Self, mpsc::Receiver<PreviewUpdate>) {
        let (command_tx, command_rx) = mpsc::channel::<PreviewCommand>();
        let (update_tx, update_rx) = mpsc::channel::<PreviewUpdate>();
        let shared = Arc::new(Mutex::new(PreviewShared {
            cache: LruCache::new(
                NonZeroUsize::new(config.cache_capacity.max(1)).expect("cache capacity"),
            ),
            last_requested: HashMap::new(),
            queued: VecDeque::new(),
            in_flight: 0,
        }));

        let poll_interval = config.poll_interval;
        let mut core = PreviewCore {
            config,
            backend,
            shared: Arc::clone(&shared),
            command_tx: command_tx.clone(),
            updates: update_tx,
            dispatch_counter: 0,
            latest_token: 0,
        };
        let handle = thread::Builder::new()
            .name("preview-pipeline".into())
            .spawn(move || loop {
                match command_rx.recv_timeout(poll_interval) {
                    Ok(command) => {
                        if core.handle_command(command) {
                            break;
                        }
                    }
                    Err(RecvTimeoutError::Disconnected) => break,
                    Err(RecvTimeoutError::Timeout) => core.pump(),
                }
            })
            .expect("spawn preview pipeline");

        (
            Self {
                sender: command_tx,
                shared,
                join_handle: Mutex::new(Some(handle)),
            },
            update_rx,
        )
    }

    /// Requests a preview for a candidate geometry.
    ///
    /// A cache hit is returned synchronously and nothing is queued. A miss
    /// queues a render job, replacing any not-yet-started job for the same
    /// source; re-requesting a source's unchanged geometry is suppressed.
    pub fn request_preview(
        &self,
        workspace: &Path,
        source_path: &Path,
        lines: Lines,
    ) -> Option<PreviewHit> {
        let signature = geometry_signature(lines);
        let mut shared = self.shared.lock().expect("poisoned");

        if let Some(cached) = shared
            .cache
            .get(&(source_path.to_path_buf(), signature.clone()))
        {
            let hit = PreviewHit {
                response: cached.response.clone(),
                age: cached.rendered_at.elapsed(),
            };
            shared
                .last_requested
                .insert(source_path.to_path_buf(), signature);
            return Some(hit);
        }

        if shared.last_requested.get(source_path) == Some(&signature) {
            // Already queued or in flight for this exact geometry.
            return None;
        }
        shared
            .last_requested
            .insert(source_path.to_path_buf(), signature.clone());

        let job = PendingJob {
            workspace: workspace.to_path_buf(),
            source_path: source_path.to_path_buf(),
            lines,
            signature,
        };
        if let Some(existing) = shared
            .queued
            .iter_mut()
            .find(|queued| queued.source_path == job.source_path)
        {
            *existing = job;
        } else {
            shared.queued.push_back(job);
        }
        drop(shared);

        let _ = self.sender.send(PreviewCommand::Pump);
        None
    }

    /// True while any job is queued or in flight.
    pub fn is_loading(&self) -> bool {
        let shared = self.shared.lock().expect("poisoned");
        !shared.queued.is_empty() || shared.in_flight > 0
    }

    pub fn queued_jobs(&self) -> Vec<(PathBuf, String)> {
        let shared = self.shared.lock().expect("poisoned");
        shared
            .queued
            .iter()
            .map(|job| (job.source_path.clone(), job.signature.clone()))
            .collect()
    }

    pub fn shutdown(&self) {
        if self.sender.send(PreviewCommand::Shutdown).is_ok() {
            if let Ok(mut guard) = self.join_handle.lock() {
                if let Some(handle) = guard.take() {
                    let _ = handle.join();
                }
            }
        }
    }
}

impl Drop for PreviewPipeline {
    fn drop(&mut self) {
        self.shutdown();
    }
}
