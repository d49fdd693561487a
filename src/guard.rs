//! Concurrency Guard
//!
//! In-flight deduplication per fingerprint plus a bounded worker pool. Distinct fingerprints
//! are admitted in arrival order by a single dispatcher task; requests for a fingerprint that
//! already has a run attach to it as additional subscribers.

use crate::cache::Fingerprint;
use crate::error::PipelineError;
use crate::types::RunId;
use futures::FutureExt;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, oneshot, Semaphore};
use tracing::{debug, error, info, warn};

pub type RunOutcome<T> = Result<T, PipelineError>;
pub type RunFuture<T> = Pin<Box<dyn Future<Output = RunOutcome<T>> + Send + 'static>>;

/// Default global bound on concurrently executing runs
pub const DEFAULT_POOL_SIZE: usize = 3;

/// Shared completion for one fingerprint
struct InFlightEntry<T> {
    run_id: RunId,
    waiters: Vec<oneshot::Sender<RunOutcome<T>>>,
    submitted_at: Instant,
    started: bool,
}

impl<T> InFlightEntry<T> {
    fn new(run_id: RunId) -> Self {
        Self {
            run_id,
            waiters: Vec::new(),
            submitted_at: Instant::now(),
            started: false,
        }
    }
}

struct Admission<T> {
    fingerprint: Fingerprint,
    run_id: RunId,
    run: RunFuture<T>,
}

type InFlightMap<T> = Arc<Mutex<HashMap<Fingerprint, InFlightEntry<T>>>>;

/// Snapshot of one in-flight run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveRun {
    pub fingerprint: Fingerprint,
    pub run_id: RunId,
    pub subscribers: usize,
    pub started: bool,
    pub age: Duration,
}

pub struct ConcurrencyGuard<T> {
    in_flight: InFlightMap<T>,
    admissions: mpsc::UnboundedSender<Admission<T>>,
    executing: Arc<AtomicUsize>,
    pool_size: usize,
}

impl<T: Clone + Send + 'static> ConcurrencyGuard<T> {
    /// Start the dispatcher on the current tokio runtime
    pub fn start(pool_size: usize) -> Result<Self, PipelineError> {
        if pool_size == 0 {
            return Err(PipelineError::Config(
                "pool size must be at least 1".to_string(),
            ));
        }
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| {
            PipelineError::Internal("concurrency guard requires a tokio runtime".to_string())
        })?;

        let in_flight: InFlightMap<T> = Arc::new(Mutex::new(HashMap::new()));
        let executing = Arc::new(AtomicUsize::new(0));
        let (tx, rx) = mpsc::unbounded_channel();

        runtime.spawn(Self::dispatch_loop(
            rx,
            Arc::new(Semaphore::new(pool_size)),
            Arc::clone(&in_flight),
            Arc::clone(&executing),
        ));

        info!(pool_size, "Started concurrency guard");

        Ok(Self {
            in_flight,
            admissions: tx,
            executing,
            pool_size,
        })
    }

    /// Join the run for `fingerprint`, or create one from `make_run`.
    ///
    /// `make_run` is only invoked when no run is in flight. The returned subscription
    /// resolves to the run's single terminal outcome.
    pub fn acquire_or_join<F>(
        &self,
        fingerprint: Fingerprint,
        make_run: F,
    ) -> Result<Subscription<T>, PipelineError>
    where
        F: FnOnce(RunId) -> RunFuture<T>,
    {
        let (tx, rx) = oneshot::channel();
        let mut in_flight = self.in_flight.lock();

        if let Some(entry) = in_flight.get_mut(&fingerprint) {
            entry.waiters.push(tx);
            debug!(
                fingerprint = %fingerprint.short(),
                run_id = %entry.run_id,
                subscribers = entry.waiters.len(),
                "Joined in-flight run"
            );
            return Ok(Subscription {
                run_id: entry.run_id,
                joined: true,
                receiver: rx,
            });
        }

        let run_id = RunId::next();
        let mut entry = InFlightEntry::new(run_id);
        entry.waiters.push(tx);
        in_flight.insert(fingerprint, entry);

        let admission = Admission {
            fingerprint,
            run_id,
            run: make_run(run_id),
        };
        if self.admissions.send(admission).is_err() {
            in_flight.remove(&fingerprint);
            return Err(PipelineError::Internal(
                "concurrency guard dispatcher has stopped".to_string(),
            ));
        }

        debug!(
            fingerprint = %fingerprint.short(),
            run_id = %run_id,
            "Queued new run"
        );
        Ok(Subscription {
            run_id,
            joined: false,
            receiver: rx,
        })
    }

    async fn dispatch_loop(
        mut rx: mpsc::UnboundedReceiver<Admission<T>>,
        semaphore: Arc<Semaphore>,
        in_flight: InFlightMap<T>,
        executing: Arc<AtomicUsize>,
    ) {
        while let Some(admission) = rx.recv().await {
            let Admission {
                fingerprint,
                run_id,
                run,
            } = admission;

            let permit = match Arc::clone(&semaphore).acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => {
                    Self::complete(
                        &in_flight,
                        &fingerprint,
                        Err(PipelineError::Internal("worker pool closed".to_string())),
                    );
                    continue;
                }
            };

            if let Some(entry) = in_flight.lock().get_mut(&fingerprint) {
                entry.started = true;
                debug!(
                    run_id = %run_id,
                    queued_ms = entry.submitted_at.elapsed().as_millis() as u64,
                    "Run admitted"
                );
            }

            let in_flight = Arc::clone(&in_flight);
            let executing = Arc::clone(&executing);
            executing.fetch_add(1, Ordering::SeqCst);
            tokio::spawn(async move {
                let outcome = AssertUnwindSafe(run)
                    .catch_unwind()
                    .await
                    .unwrap_or_else(|panic| {
                        let message = panic
                            .downcast_ref::<&str>()
                            .map(|s| s.to_string())
                            .or_else(|| panic.downcast_ref::<String>().cloned())
                            .unwrap_or_else(|| "unknown panic".to_string());
                        error!(run_id = %run_id, panic = %message, "Run panicked");
                        Err(PipelineError::Internal(format!("run panicked: {}", message)))
                    });

                Self::complete(&in_flight, &fingerprint, outcome);
                executing.fetch_sub(1, Ordering::SeqCst);
                drop(permit);
            });
        }
        debug!("Concurrency guard dispatcher stopped");
    }

    /// Remove the entry, then broadcast to every subscriber
    fn complete(in_flight: &InFlightMap<T>, fingerprint: &Fingerprint, outcome: RunOutcome<T>) {
        let entry = in_flight.lock().remove(fingerprint);
        let Some(entry) = entry else {
            warn!(fingerprint = %fingerprint.short(), "Completed run had no in-flight entry");
            return;
        };

        let mut delivered = 0usize;
        for tx in entry.waiters {
            if tx.send(outcome.clone()).is_ok() {
                delivered += 1;
            }
        }
        debug!(
            run_id = %entry.run_id,
            delivered,
            success = outcome.is_ok(),
            "Broadcast run outcome"
        );
    }

    /// Subscribers attached to the run for `fingerprint` (0 when none is in flight)
    pub fn subscriber_count(&self, fingerprint: &Fingerprint) -> usize {
        self.in_flight
            .lock()
            .get(fingerprint)
            .map_or(0, |entry| entry.waiters.len())
    }

    pub fn is_in_flight(&self, fingerprint: &Fingerprint) -> bool {
        self.in_flight.lock().contains_key(fingerprint)
    }

    /// Runs queued or executing
    pub fn in_flight_count(&self) -> usize {
        self.in_flight.lock().len()
    }

    /// Runs currently holding a pool slot
    pub fn executing_count(&self) -> usize {
        self.executing.load(Ordering::SeqCst)
    }

    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    pub fn active_runs(&self) -> Vec<ActiveRun> {
        let mut runs: Vec<ActiveRun> = self
            .in_flight
            .lock()
            .iter()
            .map(|(fingerprint, entry)| ActiveRun {
                fingerprint: *fingerprint,
                run_id: entry.run_id,
                subscribers: entry.waiters.len(),
                started: entry.started,
                age: entry.submitted_at.elapsed(),
            })
            .collect();
        runs.sort_by_key(|run| run.run_id.as_u64());
        runs
    }
}

/// One caller's view of a run's completion
pub struct Subscription<T> {
    run_id: RunId,
    joined: bool,
    receiver: oneshot::Receiver<RunOutcome<T>>,
}

impl<T> Subscription<T> {
    pub fn run_id(&self) -> RunId {
        self.run_id
    }

    /// True when this caller attached to a run started by someone else
    pub fn joined(&self) -> bool {
        self.joined
    }

    pub async fn wait(self) -> RunOutcome<T> {
        self.receiver.await.map_err(|_| {
            PipelineError::Internal("run ended without delivering an outcome".to_string())
        })?
    }

    /// Wait at most `timeout`; `None` means the caller detached and the run continues
    pub async fn wait_timeout(self, timeout: Duration) -> Option<RunOutcome<T>> {
        match tokio::time::timeout(timeout, self.receiver).await {
            Ok(received) => Some(received.unwrap_or_else(|_| {
                Err(PipelineError::Internal(
                    "run ended without delivering an outcome".to_string(),
                ))
            })),
            Err(_) => None,
        }
    }
}
