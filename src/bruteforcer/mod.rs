mod queue;

use std::sync::Arc;

use futures::stream::FuturesUnordered;
use futures::StreamExt;
use tokio::sync::{mpsc, watch};
use tokio::task;
use tracing::{debug, error, info};

use crate::probe::{ProbeExecutor, ProbeOutcome};
use crate::runner::{ScanSession, ScanTarget};

pub use queue::TargetWorkQueue;

/// Header record written ahead of every result set.
pub const RESULT_HEADER: [&str; 4] = ["URL", "Response Code", "Response Length", "Redirect URL"];

/// Raised to stop a scan early; workers watch it between and during probes.
pub type CancelSignal = watch::Receiver<bool>;

// the outcomes for one target, in the order the workers completed them
#[derive(Clone, Debug)]
pub struct TargetResultSet {
    pub target: ScanTarget,
    pub outcomes: Vec<ProbeOutcome>,
    pub abandoned: usize,
}

impl TargetResultSet {
    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    pub fn is_complete(&self) -> bool {
        self.abandoned == 0
    }

    pub fn failures(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_failure()).count()
    }
}

/// Drains the full wordlist against one base url with a fixed pool of workers.
pub struct TargetScanner {
    target: ScanTarget,
    executor: Arc<ProbeExecutor>,
    workers: usize,
    cancel: CancelSignal,
}

impl TargetScanner {
    pub fn new(
        target: ScanTarget,
        executor: Arc<ProbeExecutor>,
        session: &ScanSession,
        cancel: CancelSignal,
    ) -> Self {
        Self {
            target,
            executor,
            workers: session.threads_per_target.max(1),
            cancel,
        }
    }

    /// Panics with the worker's payload if a worker panicked; the rest of the
    /// queue is abandoned first so no task is left waiting on the drain barrier.
    pub async fn scan(self, wordlist: Arc<[String]>) -> TargetResultSet {
        let TargetScanner {
            target,
            executor,
            workers,
            cancel,
        } = self;
        info!(url = %target, words = wordlist.len(), workers, "scanning target");

        let queue = Arc::new(TargetWorkQueue::preload(&wordlist));
        let (result_tx, mut result_rx) = mpsc::channel::<ProbeOutcome>(workers);

        // a single collector owns the accumulator
        let collect_handle = task::spawn(async move {
            let mut out: Vec<ProbeOutcome> = Vec::new();
            while let Some(outcome) = result_rx.recv().await {
                out.push(outcome);
            }
            out
        });

        let mut handles = FuturesUnordered::new();
        for _ in 0..workers {
            let queue = queue.clone();
            let executor = executor.clone();
            let base = target.as_str().to_string();
            let tx = result_tx.clone();
            let cancel = cancel.clone();
            handles.push(task::spawn(async move {
                run_worker(base, queue, executor, tx, cancel).await
            }));
        }
        drop(result_tx);

        // a worker that dies mid-probe never marks its segment done, so the
        // drain barrier is raced against the workers themselves
        let mut watcher = cancel.clone();
        let mut crashed: Option<task::JoinError> = None;
        loop {
            tokio::select! {
                _ = queue.join() => break,
                _ = cancelled(&mut watcher) => {
                    let dropped = queue.abandon().await;
                    debug!(url = %target, dropped, "scan cancelled, queue abandoned");
                    break;
                }
                Some(joined) = handles.next() => {
                    if let Err(e) = joined {
                        error!(url = %target, error = %e, "worker failed, abandoning target");
                        crashed = Some(e);
                        queue.abandon().await;
                        break;
                    }
                }
            }
        }

        while let Some(joined) = handles.next().await {
            if let Err(e) = joined {
                error!(url = %target, error = %e, "worker failed");
                if crashed.is_none() {
                    crashed = Some(e);
                }
            }
        }
        if let Some(e) = crashed {
            if e.is_panic() {
                // rethrown so the orchestrator records the target as failed
                std::panic::resume_unwind(e.into_panic());
            }
        }
        let outcomes = collect_handle.await.unwrap_or_default();
        // counts both never-dequeued segments and probes cut off mid-flight
        let abandoned = wordlist.len().saturating_sub(outcomes.len());

        debug!(
            url = %target,
            outcomes = outcomes.len(),
            abandoned,
            "target scan finished"
        );
        TargetResultSet {
            target,
            outcomes,
            abandoned,
        }
    }
}

async fn run_worker(
    base: String,
    queue: Arc<TargetWorkQueue>,
    executor: Arc<ProbeExecutor>,
    tx: mpsc::Sender<ProbeOutcome>,
    mut cancel: CancelSignal,
) {
    loop {
        let segment = tokio::select! {
            biased;
            _ = cancelled(&mut cancel) => break,
            segment = queue.dequeue() => match segment {
                Some(segment) => segment,
                None => break,
            },
        };

        let url = crate::utils::join_url(&base, &segment);
        let outcome = tokio::select! {
            biased;
            _ = cancelled(&mut cancel) => {
                queue.mark_done();
                break;
            }
            outcome = executor.probe(&url) => outcome,
        };

        let sent = tx.send(outcome).await;
        queue.mark_done();
        if sent.is_err() {
            break;
        }
    }
}

// resolves once the flag is raised; never resolves if the sender is gone without raising it
pub async fn cancelled(cancel: &mut CancelSignal) {
    let raised = cancel.wait_for(|raised| *raised).await.is_ok();
    if !raised {
        std::future::pending::<()>().await;
    }
}
