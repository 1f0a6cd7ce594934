//! Id-set diffing that moves large lists off the calling task.
//!
//! Small lists are diffed inline. Lists longer than the configured threshold
//! are snapshotted into a [`DiffRequest`] and handed to a [`DiffWorker`]; any
//! worker failure falls back to the inline computation, so callers always get
//! the same [`DiffResult`] for the same inputs.

use listcore::Identified;
use listcore::config::ListConfig;
use listcore::diff::{DiffRequest, DiffResponse, DiffResult, diff_items};
use log::{debug, warn};
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use thiserror::Error;
use tokio::runtime::Handle;
use tokio::sync::oneshot;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("no tokio runtime available for background work")]
    NoRuntime,

    #[error("failed to start diff worker: {0}")]
    Spawn(String),

    #[error("diff worker went away without replying")]
    ChannelClosed,

    #[error("diff worker did not reply within {0:?}")]
    Timeout(Duration),

    #[error("diff worker replied to generation {received}, expected {expected}")]
    GenerationMismatch { expected: u64, received: u64 },
}

/// Executes [`DiffRequest`]s away from the caller.
///
/// `dispatch` must not block. It hands the request off and returns the
/// receiving end of a single-use reply channel.
pub trait DiffWorker: Send + Sync {
    fn dispatch(&self, request: DiffRequest)
    -> Result<oneshot::Receiver<DiffResponse>, WorkerError>;
}

/// Runs diffs on tokio's blocking thread pool.
#[derive(Debug, Default, Clone, Copy)]
pub struct BlockingDiffWorker;

impl DiffWorker for BlockingDiffWorker {
    fn dispatch(
        &self,
        request: DiffRequest,
    ) -> Result<oneshot::Receiver<DiffResponse>, WorkerError> {
        let handle = Handle::try_current().map_err(|_| WorkerError::NoRuntime)?;
        let (tx, rx) = oneshot::channel();
        handle.spawn_blocking(move || {
            // The caller may have given up waiting; nothing to do then.
            let _ = tx.send(request.compute());
        });
        Ok(rx)
    }
}

/// Which path produced each diff so far.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DiffEngineStats {
    pub inline_runs: u64,
    pub worker_runs: u64,
    pub fallback_runs: u64,
}

/// A diff result tagged with the generation it was computed for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackedDiff {
    pub generation: u64,
    pub result: DiffResult,
}

pub struct DiffEngine {
    threshold: usize,
    background: bool,
    worker: Arc<dyn DiffWorker>,
    worker_timeout: Option<Duration>,
    generation: AtomicU64,
    inline_runs: AtomicU64,
    worker_runs: AtomicU64,
    fallback_runs: AtomicU64,
}

impl std::fmt::Debug for DiffEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiffEngine")
            .field("threshold", &self.threshold)
            .field("background", &self.background)
            .field("worker_timeout", &self.worker_timeout)
            .field("generation", &self.current_generation())
            .finish_non_exhaustive()
    }
}

impl Default for DiffEngine {
    fn default() -> Self {
        Self::from_config(&ListConfig::default())
    }
}

impl DiffEngine {
    pub fn new(threshold: usize, background: bool) -> Self {
        Self {
            threshold,
            background,
            worker: Arc::new(BlockingDiffWorker),
            worker_timeout: None,
            generation: AtomicU64::new(0),
            inline_runs: AtomicU64::new(0),
            worker_runs: AtomicU64::new(0),
            fallback_runs: AtomicU64::new(0),
        }
    }

    pub fn from_config(config: &ListConfig) -> Self {
        Self::new(config.diff_threshold, config.background_diff)
            .with_worker_timeout(config.diff_worker_timeout())
    }

    pub fn with_worker(mut self, worker: Arc<dyn DiffWorker>) -> Self {
        self.worker = worker;
        self
    }

    pub fn with_worker_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.worker_timeout = timeout;
        self
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }

    /// Whether a list of `len` items would be sent to the worker.
    pub fn uses_worker_for(&self, len: usize) -> bool {
        self.background && len > self.threshold
    }

    pub async fn diff<A, B>(&self, old: &[A], new: &[B]) -> DiffResult
    where
        A: Identified,
        B: Identified,
    {
        self.diff_tracked(old, new).await.result
    }

    /// Diff and report the generation assigned to this call.
    ///
    /// Generations increase by one per call. Compare against
    /// [`is_latest`](Self::is_latest) before acting on a result when calls
    /// may overlap.
    pub async fn diff_tracked<A, B>(&self, old: &[A], new: &[B]) -> TrackedDiff
    where
        A: Identified,
        B: Identified,
    {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;

        if !self.uses_worker_for(new.len()) {
            self.inline_runs.fetch_add(1, Ordering::Relaxed);
            return TrackedDiff {
                generation,
                result: diff_items(old, new),
            };
        }

        let request = DiffRequest::from_items(generation, old, new);
        let result = match self.run_on_worker(request).await {
            Ok(result) => {
                self.worker_runs.fetch_add(1, Ordering::Relaxed);
                result
            }
            Err(e) => {
                warn!(
                    target: "ChatList/Diff",
                    "Background diff of {} items failed: {e}. Computing inline.",
                    new.len()
                );
                self.fallback_runs.fetch_add(1, Ordering::Relaxed);
                diff_items(old, new)
            }
        };

        TrackedDiff { generation, result }
    }

    async fn run_on_worker(&self, request: DiffRequest) -> Result<DiffResult, WorkerError> {
        let expected = request.generation;
        let reply = self.worker.dispatch(request)?;
        debug!(target: "ChatList/Diff", "Dispatched diff generation {expected} to worker");

        let response = match self.worker_timeout {
            Some(limit) if Handle::try_current().is_ok() => tokio::time::timeout(limit, reply)
                .await
                .map_err(|_| WorkerError::Timeout(limit))?,
            _ => reply.await,
        }
        .map_err(|_| WorkerError::ChannelClosed)?;

        if response.generation != expected {
            return Err(WorkerError::GenerationMismatch {
                expected,
                received: response.generation,
            });
        }
        Ok(response.result)
    }

    pub fn current_generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// True if no diff was started after `generation`.
    pub fn is_latest(&self, generation: u64) -> bool {
        self.current_generation() == generation
    }

    pub fn stats(&self) -> DiffEngineStats {
        DiffEngineStats {
            inline_runs: self.inline_runs.load(Ordering::Relaxed),
            worker_runs: self.worker_runs.load(Ordering::Relaxed),
            fallback_runs: self.fallback_runs.load(Ordering::Relaxed),
        }
    }
}
