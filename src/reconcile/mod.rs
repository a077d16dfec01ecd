//! Level-triggered reconciler runner
//!
//! A reconciler is handed a record name, reads the current state of the
//! world, writes the delta and returns a requeue hint. The runner
//! guarantees that at most one reconcile per record name is in flight at
//! any time; names enqueued while their reconcile runs collapse into a
//! single follow-up pass. Errors requeue with bounded exponential backoff.

use crate::error::Error;
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Semaphore, mpsc, watch};
use tracing::{debug, warn};

const BACKOFF_BASE: Duration = Duration::from_millis(500);
const BACKOFF_MAX: Duration = Duration::from_secs(30);

/// Outcome of a successful reconcile pass
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReconcileStatus {
    pub requeue_after: Option<Duration>,
}

impl ReconcileStatus {
    pub fn done() -> Self {
        Self::default()
    }

    pub fn requeue_after(duration: Duration) -> Self {
        Self {
            requeue_after: Some(duration),
        }
    }
}

/// A level-triggered reconcile callback
pub trait Reconciler: Send + Sync + 'static {
    fn reconcile(
        &self,
        name: String,
    ) -> impl Future<Output = Result<ReconcileStatus, Error>> + Send;
}

/// Handle for watch-mapping tasks to enqueue reconcile requests
#[derive(Clone)]
pub struct EnqueueHandle {
    tx: mpsc::UnboundedSender<String>,
}

impl EnqueueHandle {
    pub fn enqueue(&self, name: impl Into<String>) {
        // Runner gone means we are shutting down
        let _ = self.tx.send(name.into());
    }
}

/// Drives one reconciler with a bounded worker pool
pub struct Runner<R: Reconciler> {
    reconciler: Arc<R>,
    workers: usize,
    tx: mpsc::UnboundedSender<String>,
    rx: mpsc::UnboundedReceiver<String>,
}

impl<R: Reconciler> Runner<R> {
    pub fn new(reconciler: R, workers: usize) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            reconciler: Arc::new(reconciler),
            workers: workers.max(1),
            tx,
            rx,
        }
    }

    pub fn handle(&self) -> EnqueueHandle {
        EnqueueHandle {
            tx: self.tx.clone(),
        }
    }

    /// Dispatch loop; returns once the shutdown signal flips and all
    /// in-flight reconciles have drained
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let Runner {
            reconciler,
            workers,
            tx,
            mut rx,
        } = self;

        let semaphore = Arc::new(Semaphore::new(workers));
        let (done_tx, mut done_rx) =
            mpsc::unbounded_channel::<(String, Result<ReconcileStatus, Error>)>();

        let mut inflight: HashSet<String> = HashSet::new();
        let mut dirty: HashSet<String> = HashSet::new();
        let mut failures: HashMap<String, u32> = HashMap::new();

        let requeue_later = |name: String, delay: Duration| {
            let tx = tx.clone();
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                let _ = tx.send(name);
            });
        };

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                Some(name) = rx.recv() => {
                    if inflight.contains(&name) {
                        dirty.insert(name);
                        continue;
                    }
                    inflight.insert(name.clone());
                    let reconciler = reconciler.clone();
                    let semaphore = semaphore.clone();
                    let done = done_tx.clone();
                    tokio::spawn(async move {
                        let _permit = semaphore.acquire_owned().await;
                        let result = reconciler.reconcile(name.clone()).await;
                        let _ = done.send((name, result));
                    });
                }
                Some((name, result)) = done_rx.recv() => {
                    inflight.remove(&name);
                    match result {
                        Ok(status) => {
                            failures.remove(&name);
                            if dirty.remove(&name) {
                                let _ = tx.send(name);
                            } else if let Some(delay) = status.requeue_after {
                                debug!(name = %name, ?delay, "requeue after");
                                requeue_later(name, delay);
                            }
                        }
                        Err(err) => {
                            let attempts = failures.entry(name.clone()).or_insert(0);
                            *attempts += 1;
                            let delay = BACKOFF_BASE
                                .saturating_mul(1u32 << (*attempts - 1).min(16))
                                .min(BACKOFF_MAX);
                            warn!(name = %name, %err, ?delay, "reconcile failed, requeueing");
                            dirty.remove(&name);
                            requeue_later(name, delay);
                        }
                    }
                }
            }
        }

        // Drain in-flight reconciles before returning
        while !inflight.is_empty() {
            match done_rx.recv().await {
                Some((name, _)) => {
                    inflight.remove(&name);
                }
                None => break,
            }
        }
    }
}
