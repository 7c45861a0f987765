use futures::FutureExt;
use indicatif::ProgressBar;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, info};

use super::postprocess::{PathTrim, TrimError};
use super::worker::ScanWorker;
use crate::model::{Candidate, ScanFailure, ScanOutcome, ScanResult};

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("concurrency ceiling must be at least 1")]
    InvalidCeiling,

    #[error("post-processing result for {host}")]
    PostProcess {
        host: String,
        #[source]
        source: TrimError,
    },

    #[error("completion queue closed with {0} results outstanding")]
    Disconnected(usize),
}

/// Fans candidates out to workers with at most `ceiling` in flight.
///
/// Workers run as independent tokio tasks and report through a completion
/// queue; the coordinator alone owns the aggregate. Results come back in
/// the order they were aggregated, which follows completion and not
/// submission order.
pub struct Dispatcher {
    ceiling: usize,
    trim: PathTrim,
    progress: Option<ProgressBar>,
}

impl Dispatcher {
    pub fn new(ceiling: usize) -> Self {
        Self {
            ceiling,
            trim: PathTrim::default(),
            progress: None,
        }
    }

    pub fn with_trim(mut self, trim: PathTrim) -> Self {
        self.trim = trim;
        self
    }

    /// Advances `progress` once per aggregated result.
    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Scans every candidate and returns exactly one result per candidate.
    ///
    /// Per-candidate failures are part of the returned results. The run only
    /// fails as a whole when post-processing rejects a result path; workers
    /// still in flight are aborted in that case.
    pub async fn run(
        &self,
        candidates: Vec<Candidate>,
        worker: Arc<dyn ScanWorker>,
    ) -> Result<Vec<ScanResult>, DispatchError> {
        if self.ceiling == 0 {
            return Err(DispatchError::InvalidCeiling);
        }

        let total = candidates.len();
        let (tx, mut rx) = mpsc::channel::<ScanOutcome>(self.ceiling);
        // Dropping the set on an early return aborts the remaining workers.
        let mut workers = JoinSet::new();
        let mut results = Vec::with_capacity(total);
        let mut in_flight = 0usize;
        let mut remaining = total;

        for (index, candidate) in candidates.into_iter().enumerate() {
            while let Ok(outcome) = rx.try_recv() {
                self.accept(outcome, &mut results)?;
                in_flight -= 1;
                remaining -= 1;
            }

            reap_finished(&mut workers);
            debug!(host = %candidate.host, left = total - index, "new worker");
            spawn_worker(&mut workers, Arc::clone(&worker), candidate, tx.clone());
            in_flight += 1;

            if in_flight == self.ceiling {
                let outcome = rx
                    .recv()
                    .await
                    .ok_or(DispatchError::Disconnected(remaining))?;
                self.accept(outcome, &mut results)?;
                in_flight -= 1;
                remaining -= 1;
            }
        }
        drop(tx);

        while remaining > 0 {
            let outcome = rx
                .recv()
                .await
                .ok_or(DispatchError::Disconnected(remaining))?;
            self.accept(outcome, &mut results)?;
            remaining -= 1;
        }
        while workers.join_next().await.is_some() {}

        let failed = results.iter().filter(|r| !r.outcome.is_ok()).count();
        info!(total, failed, "scan complete");
        Ok(results)
    }

    fn accept(&self, outcome: ScanOutcome, results: &mut Vec<ScanResult>) -> Result<(), DispatchError> {
        let result_path =
            self.trim
                .apply(&outcome.path)
                .map_err(|source| DispatchError::PostProcess {
                    host: outcome.host.clone(),
                    source,
                })?;
        results.push(ScanResult::new(outcome, result_path));
        if let Some(pb) = &self.progress {
            pb.inc(1);
        }
        Ok(())
    }
}

fn spawn_worker(
    workers: &mut JoinSet<()>,
    worker: Arc<dyn ScanWorker>,
    candidate: Candidate,
    tx: mpsc::Sender<ScanOutcome>,
) {
    workers.spawn(async move {
        let outcome = match AssertUnwindSafe(worker.scan(&candidate)).catch_unwind().await {
            Ok(outcome) => outcome,
            Err(panic) => ScanOutcome::failed(&candidate, ScanFailure::Aborted(panic_message(&*panic))),
        };
        // The receiver is only gone when the coordinator abandoned the run.
        let _ = tx.send(outcome).await;
    });
}

/// Drops finished worker tasks from the set without waiting; returns how many.
fn reap_finished(workers: &mut JoinSet<()>) -> usize {
    let mut reaped = 0;
    while let Some(joined) = workers.try_join_next() {
        if let Err(e) = joined {
            debug!(error = %e, "worker task did not complete");
        }
        reaped += 1;
    }
    reaped
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "worker panicked".to_string()
    }
}
