//! The dispatcher: job intake, ready-worker pool and match loop.
//!
//! Workers announce themselves by sending a [`ReadyToken`] into a bounded
//! ready pool. The match loop waits for a token, then for a job, and hands
//! that job to that worker. Both waits also watch the run's
//! [`CancellationToken`], so the loop exits as soon as the scope fires.
//!
//! Cancellation stops scheduling; it does not drain. Jobs still in the
//! intake are dropped and calls already in flight finish on their own.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, OnceLock, PoisonError};

use fanout_core::{DispatcherConfig, JobId};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::arena::{ArenaStats, BufferArena};
use crate::client::{default_client, HttpClient};
use crate::envelope::Envelope;
use crate::error::DispatchError;
use crate::request::Request;
use crate::sink::{forward_to_handler, ResultHandler, Responses};
use crate::worker::{Job, ReadyToken, Worker};

/// Channel ends allocated by the constructor and consumed by the first run.
struct Pending {
    intake_rx: mpsc::Receiver<Job>,
    ready_tx: mpsc::Sender<ReadyToken>,
    ready_rx: mpsc::Receiver<ReadyToken>,
    results_tx: mpsc::Sender<Envelope>,
    results_rx: mpsc::Receiver<Envelope>,
}

/// Bounded-concurrency HTTP dispatcher.
///
/// Construct once with a fixed worker count, start it with
/// [`run`](Self::run) or [`run_with_handler`](Self::run_with_handler)
/// inside a Tokio runtime, then feed it with [`add`](Self::add). At most
/// `worker_size` calls are in flight at any time.
pub struct Dispatcher {
    config: DispatcherConfig,
    intake: mpsc::Sender<Job>,
    pending: Mutex<Option<Pending>>,
    scope: OnceLock<CancellationToken>,
    next_id: AtomicU64,
    arena: Arc<BufferArena>,
    tasks: TaskTracker,
}

impl Dispatcher {
    /// Create a dispatcher with `worker_size` workers and default settings.
    pub fn new(worker_size: usize) -> Result<Self, DispatchError> {
        if worker_size == 0 {
            return Err(DispatchError::InvalidWorkerSize(worker_size));
        }
        Self::with_config(DispatcherConfig::new(worker_size))
    }

    pub fn with_config(config: DispatcherConfig) -> Result<Self, DispatchError> {
        config.validate()?;

        let (intake, intake_rx) = mpsc::channel(config.intake_capacity);
        let (ready_tx, ready_rx) = mpsc::channel(config.worker_size);
        let (results_tx, results_rx) = mpsc::channel(config.worker_size);
        let arena = Arc::new(BufferArena::from_config(&config));

        Ok(Self {
            config,
            intake,
            pending: Mutex::new(Some(Pending {
                intake_rx,
                ready_tx,
                ready_rx,
                results_tx,
                results_rx,
            })),
            scope: OnceLock::new(),
            next_id: AtomicU64::new(0),
            arena,
            tasks: TaskTracker::new(),
        })
    }

    /// Start the workers and the match loop, delivering results through
    /// the returned pull handle.
    ///
    /// Uses `client` for every call, or a `reqwest::Client` built from the
    /// configuration when `None`. Must be called from within a Tokio
    /// runtime. Fails with [`DispatchError::AlreadyRunning`] on a second call.
    pub fn run(
        &self,
        cancel: CancellationToken,
        client: Option<Arc<dyn HttpClient>>,
    ) -> Result<Responses, DispatchError> {
        let results = self.start(cancel, client)?;
        Ok(Responses::new(results))
    }

    /// Start the dispatcher and invoke `handler` for every envelope.
    ///
    /// Each invocation runs on its own task, so a slow handler does not
    /// hold back delivery of other results.
    pub fn run_with_handler<F>(
        &self,
        cancel: CancellationToken,
        client: Option<Arc<dyn HttpClient>>,
        handler: F,
    ) -> Result<(), DispatchError>
    where
        F: Fn(Envelope) + Send + Sync + 'static,
    {
        let results = self.start(cancel, client)?;
        let handler: ResultHandler = Arc::new(handler);
        self.tasks
            .spawn(forward_to_handler(results, handler, self.tasks.clone()));
        Ok(())
    }

    /// Queue a request for execution.
    ///
    /// Waits while the intake is full. Once the run's cancellation scope
    /// has fired the request is not accepted and
    /// [`DispatchError::Cancelled`] is returned.
    pub async fn add(&self, request: Request) -> Result<JobId, DispatchError> {
        let scope = self.scope.get();
        if scope.is_some_and(CancellationToken::is_cancelled) {
            return Err(DispatchError::Cancelled);
        }

        let id = JobId(self.next_id.fetch_add(1, Ordering::Relaxed) + 1);
        let job = Job::new(id, request);

        let sent = match scope {
            Some(scope) => tokio::select! {
                biased;
                _ = scope.cancelled() => return Err(DispatchError::Cancelled),
                sent = self.intake.send(job) => sent,
            },
            None => self.intake.send(job).await,
        };
        sent.map_err(|_| DispatchError::Closed)?;

        tracing::debug!(job_id = %id, "Job accepted");
        Ok(id)
    }

    /// Resolve once the match loop, every worker and every result handler
    /// task have exited.
    ///
    /// Only completes after the run's cancellation scope has fired (or the
    /// dispatcher was never started) and in-flight calls have returned.
    pub async fn wait_stopped(&self) {
        self.tasks.close();
        self.tasks.wait().await;
    }

    pub fn worker_size(&self) -> usize {
        self.config.worker_size
    }

    pub fn config(&self) -> &DispatcherConfig {
        &self.config
    }

    /// `true` between a successful `run` and the cancellation of its scope.
    pub fn is_running(&self) -> bool {
        self.scope.get().is_some_and(|scope| !scope.is_cancelled())
    }

    pub fn arena_stats(&self) -> ArenaStats {
        self.arena.stats()
    }

    fn start(
        &self,
        cancel: CancellationToken,
        client: Option<Arc<dyn HttpClient>>,
    ) -> Result<mpsc::Receiver<Envelope>, DispatchError> {
        let client: Arc<dyn HttpClient> = match client {
            Some(client) => client,
            None => Arc::new(default_client(&self.config)?),
        };

        let Pending {
            intake_rx,
            ready_tx,
            ready_rx,
            results_tx,
            results_rx,
        } = self
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or(DispatchError::AlreadyRunning)?;

        let _ = self.scope.set(cancel.clone());

        for worker_id in 0..self.config.worker_size {
            let worker = Worker::new(
                worker_id,
                ready_tx.clone(),
                results_tx.clone(),
                Arc::clone(&client),
                Arc::clone(&self.arena),
            );
            self.tasks.spawn(worker.run(cancel.clone()));
        }
        // Only workers may hold these, so the result stream ends when they all exit.
        drop(ready_tx);
        drop(results_tx);

        self.tasks.spawn(match_loop(ready_rx, intake_rx, cancel));

        tracing::info!(
            worker_size = self.config.worker_size,
            intake_capacity = self.config.intake_capacity,
            "Dispatcher started",
        );
        Ok(results_rx)
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("config", &self.config)
            .field("running", &self.is_running())
            .field("arena", &self.arena)
            .finish_non_exhaustive()
    }
}

/// Pair each ready worker with the next queued job until cancelled.
async fn match_loop(
    mut ready: mpsc::Receiver<ReadyToken>,
    mut intake: mpsc::Receiver<Job>,
    cancel: CancellationToken,
) {
    loop {
        let token = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            token = ready.recv() => match token {
                Some(token) => token,
                None => break,
            },
        };

        let job = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            job = intake.recv() => match job {
                Some(job) => job,
                // Dispatcher dropped: no more work can arrive.
                None => break,
            },
        };

        let job_id = job.id;
        let worker_id = token.worker_id();
        match token.assign(job) {
            Ok(()) => tracing::debug!(%job_id, worker_id, "Job assigned"),
            Err(job) => tracing::warn!(
                job_id = %job.id,
                worker_id,
                "Worker exited before taking its job, dropping it",
            ),
        }
    }

    let abandoned = intake.len();
    if abandoned > 0 {
        tracing::warn!(abandoned, "Match loop stopped with jobs still queued");
    }
    tracing::info!("Dispatcher stopped");
}
