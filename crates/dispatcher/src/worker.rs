//! A single call slot in the dispatcher's worker pool.
//!
//! Each [`Worker`] runs as one long-lived Tokio task. While idle it has
//! exactly one [`ReadyToken`] sitting in the shared ready pool; the match
//! loop consumes that token to hand over a job, so a worker is never both
//! announced and busy. After a call the worker publishes its [`Envelope`]
//! and only then announces itself again, so a slow result consumer holds
//! workers back instead of letting results pile up.

use std::sync::Arc;
use std::time::Instant;

use fanout_core::JobId;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use crate::arena::BufferArena;
use crate::client::HttpClient;
use crate::envelope::Envelope;
use crate::error::CallError;
use crate::request::Request;
use crate::snapshot::{detach, ResponseSnapshot};

/// An accepted request waiting for, or assigned to, a worker.
#[derive(Debug)]
pub struct Job {
    pub id: JobId,
    pub request: Request,
}

impl Job {
    pub fn new(id: JobId, request: Request) -> Self {
        Self { id, request }
    }
}

/// An idle worker's single-use job slot.
///
/// Present in the ready pool only while its worker is idle. Assigning a
/// job consumes the token.
#[derive(Debug)]
pub struct ReadyToken {
    worker_id: usize,
    slot: oneshot::Sender<Job>,
}

impl ReadyToken {
    pub fn worker_id(&self) -> usize {
        self.worker_id
    }

    /// Hand `job` to the worker. Gives the job back if the worker has exited.
    pub fn assign(self, job: Job) -> Result<(), Job> {
        self.slot.send(job)
    }
}

pub struct Worker {
    id: usize,
    ready: mpsc::Sender<ReadyToken>,
    results: mpsc::Sender<Envelope>,
    client: Arc<dyn HttpClient>,
    arena: Arc<BufferArena>,
}

impl Worker {
    pub fn new(
        id: usize,
        ready: mpsc::Sender<ReadyToken>,
        results: mpsc::Sender<Envelope>,
        client: Arc<dyn HttpClient>,
        arena: Arc<BufferArena>,
    ) -> Self {
        Self {
            id,
            ready,
            results,
            client,
            arena,
        }
    }

    /// Serve jobs until `cancel` fires.
    ///
    /// Cancellation is observed between calls only: a call already in
    /// progress runs to completion unless its request carries its own token.
    pub async fn run(self, cancel: CancellationToken) {
        tracing::debug!(worker_id = self.id, "Worker started");

        loop {
            let (slot, mut inbox) = oneshot::channel();
            let token = ReadyToken {
                worker_id: self.id,
                slot,
            };

            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                sent = self.ready.send(token) => {
                    if sent.is_err() {
                        break;
                    }
                }
            }

            // A job already in the slot is served even if the scope fired.
            let job = tokio::select! {
                biased;
                received = &mut inbox => match received {
                    Ok(job) => job,
                    // The match loop dropped our token, so it has exited.
                    Err(_) => break,
                },
                _ = cancel.cancelled() => match inbox.try_recv() {
                    Ok(job) => job,
                    Err(_) => break,
                },
            };

            let envelope = self.process(job).await;
            let job_id = envelope.job_id();

            // Publish if there is room right away; once cancelled, never wait.
            tokio::select! {
                biased;
                sent = self.results.send(envelope) => {
                    if sent.is_err() {
                        tracing::warn!(worker_id = self.id, %job_id, "Result sink closed, dropping envelope");
                        break;
                    }
                }
                _ = cancel.cancelled() => {
                    tracing::warn!(worker_id = self.id, %job_id, "Dispatcher cancelled, dropping envelope");
                    break;
                }
            }
        }

        tracing::debug!(worker_id = self.id, "Worker stopped");
    }

    async fn process(&self, job: Job) -> Envelope {
        let Job { id, request } = job;
        let (request, request_cancel) = request.into_parts();

        tracing::debug!(
            worker_id = self.id,
            job_id = %id,
            method = %request.method(),
            url = %request.url(),
            "Executing request",
        );

        let started = Instant::now();
        let outcome = match request_cancel {
            Some(token) => tokio::select! {
                _ = token.cancelled() => Err(CallError::Cancelled),
                outcome = self.call(request) => outcome,
            },
            None => self.call(request).await,
        };
        let elapsed = started.elapsed();

        match &outcome {
            Ok(snapshot) => tracing::debug!(
                worker_id = self.id,
                job_id = %id,
                status = snapshot.status().as_u16(),
                bytes = snapshot.body().len(),
                elapsed_ms = elapsed.as_millis() as u64,
                "Request completed",
            ),
            Err(e) => tracing::debug!(
                worker_id = self.id,
                job_id = %id,
                error = %e,
                elapsed_ms = elapsed.as_millis() as u64,
                "Request failed",
            ),
        }

        Envelope::new(id, self.id, elapsed, outcome)
    }

    async fn call(&self, request: reqwest::Request) -> Result<ResponseSnapshot, CallError> {
        let response = self.client.execute(request).await?;
        detach(response, &self.arena).await
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use async_trait::async_trait;
    use tokio::time::timeout;

    use super::*;

    /// Replies `200` with the request path as the body.
    struct PathEcho;

    #[async_trait]
    impl HttpClient for PathEcho {
        async fn execute(&self, request: reqwest::Request) -> Result<reqwest::Response, CallError> {
            Ok(http::Response::builder()
                .status(200)
                .body(request.url().path().to_string())
                .unwrap()
                .into())
        }
    }

    /// Never answers.
    struct Hang;

    #[async_trait]
    impl HttpClient for Hang {
        async fn execute(&self, _request: reqwest::Request) -> Result<reqwest::Response, CallError> {
            std::future::pending().await
        }
    }

    struct Harness {
        ready_rx: mpsc::Receiver<ReadyToken>,
        results_rx: mpsc::Receiver<Envelope>,
        cancel: CancellationToken,
        handle: tokio::task::JoinHandle<()>,
    }

    fn spawn_worker(client: Arc<dyn HttpClient>, result_capacity: usize) -> Harness {
        let (ready_tx, ready_rx) = mpsc::channel(1);
        let (results_tx, results_rx) = mpsc::channel(result_capacity);
        let arena = Arc::new(BufferArena::new(64, 1, 4096));
        let cancel = CancellationToken::new();
        let worker = Worker::new(7, ready_tx, results_tx, client, arena);
        let handle = tokio::spawn(worker.run(cancel.clone()));
        Harness {
            ready_rx,
            results_rx,
            cancel,
            handle,
        }
    }

    fn job(id: u64, path: &str) -> Job {
        let request = Request::get(&format!("http://worker.test{path}")).unwrap();
        Job::new(JobId(id), request)
    }

    #[tokio::test]
    async fn worker_processes_job_and_reannounces() {
        let mut h = spawn_worker(Arc::new(PathEcho), 1);

        let token = h.ready_rx.recv().await.expect("worker should announce itself");
        assert_eq!(token.worker_id(), 7);
        token.assign(job(1, "/first")).unwrap();

        let envelope = h.results_rx.recv().await.expect("envelope");
        assert_eq!(envelope.job_id(), JobId(1));
        assert_eq!(envelope.worker_id(), 7);
        assert_eq!(envelope.snapshot().unwrap().body().text().unwrap(), "/first");

        let again = timeout(Duration::from_secs(1), h.ready_rx.recv())
            .await
            .expect("worker should re-announce")
            .unwrap();
        assert_eq!(again.worker_id(), 7);

        h.cancel.cancel();
        timeout(Duration::from_secs(1), h.handle).await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn cancelled_worker_exits_without_announcing() {
        let (ready_tx, mut ready_rx) = mpsc::channel(1);
        let (results_tx, _results_rx) = mpsc::channel(1);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let worker = Worker::new(
            0,
            ready_tx,
            results_tx,
            Arc::new(PathEcho),
            Arc::new(BufferArena::new(64, 1, 4096)),
        );
        worker.run(cancel).await;

        assert!(ready_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn dropped_token_stops_worker() {
        let mut h = spawn_worker(Arc::new(PathEcho), 1);
        let token = h.ready_rx.recv().await.unwrap();
        drop(token);

        timeout(Duration::from_secs(1), h.handle).await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn request_token_aborts_in_flight_call() {
        let mut h = spawn_worker(Arc::new(Hang), 1);

        let request_cancel = CancellationToken::new();
        let request = Request::get("http://worker.test/slow")
            .unwrap()
            .with_cancellation(request_cancel.clone());

        let token = h.ready_rx.recv().await.unwrap();
        token.assign(Job::new(JobId(9), request)).unwrap();
        request_cancel.cancel();

        let envelope = timeout(Duration::from_secs(1), h.results_rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(envelope.job_id(), JobId(9));
        assert!(matches!(envelope.error(), Some(CallError::Cancelled)));

        h.cancel.cancel();
    }

    #[tokio::test]
    async fn run_scope_does_not_abort_in_flight_call() {
        let mut h = spawn_worker(Arc::new(Hang), 1);
        let token = h.ready_rx.recv().await.unwrap();
        token.assign(job(1, "/stuck")).unwrap();

        h.cancel.cancel();
        // The call never returns, so neither does the worker.
        assert!(timeout(Duration::from_millis(200), &mut h.handle).await.is_err());
        h.handle.abort();
    }

    /// Counts calls, otherwise behaves like [`PathEcho`].
    #[derive(Default)]
    struct Counting(std::sync::atomic::AtomicUsize);

    #[async_trait]
    impl HttpClient for Counting {
        async fn execute(&self, request: reqwest::Request) -> Result<reqwest::Response, CallError> {
            self.0.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            PathEcho.execute(request).await
        }
    }

    #[tokio::test]
    async fn job_delivered_before_cancellation_is_still_served() {
        let client = Arc::new(Counting::default());
        let mut h = spawn_worker(client.clone(), 1);

        let token = h.ready_rx.recv().await.unwrap();
        token.assign(job(3, "/late")).unwrap();
        h.cancel.cancel();

        timeout(Duration::from_secs(1), h.handle).await.unwrap().unwrap();
        assert_eq!(client.0.load(std::sync::atomic::Ordering::SeqCst), 1);

        let envelope = h.results_rx.try_recv().expect("envelope for the taken job");
        assert_eq!(envelope.job_id(), JobId(3));
        assert!(envelope.is_ok());
        // Cancelled: the worker must not announce itself again.
        assert!(h.ready_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn full_result_sink_holds_back_readiness() {
        let mut h = spawn_worker(Arc::new(PathEcho), 1);

        h.ready_rx.recv().await.unwrap().assign(job(1, "/a")).unwrap();
        // First envelope fits in the sink; the worker announces again.
        h.ready_rx.recv().await.unwrap().assign(job(2, "/b")).unwrap();

        // Second envelope is stuck behind the unread first one.
        assert!(timeout(Duration::from_millis(200), h.ready_rx.recv()).await.is_err());

        let first = h.results_rx.recv().await.unwrap();
        assert_eq!(first.job_id(), JobId(1));

        let token = timeout(Duration::from_secs(1), h.ready_rx.recv())
            .await
            .expect("worker should announce once its result is taken")
            .unwrap();
        assert_eq!(token.worker_id(), 7);

        h.cancel.cancel();
    }
}
