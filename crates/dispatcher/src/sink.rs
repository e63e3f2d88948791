//! Result delivery: the pull handle and the callback forwarder.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use tokio::sync::mpsc;
use tokio_util::task::TaskTracker;

use crate::envelope::Envelope;

/// Callback invoked once per delivered envelope.
pub type ResultHandler = Arc<dyn Fn(Envelope) + Send + Sync + 'static>;

/// Pull handle returned by [`Dispatcher::run`](crate::Dispatcher::run).
///
/// Yields envelopes in completion order. Ends (`None`) once every worker
/// has exited, i.e. after the run's cancellation scope fires and in-flight
/// calls have returned. Also usable as a [`futures::Stream`].
#[derive(Debug)]
pub struct Responses {
    rx: mpsc::Receiver<Envelope>,
}

impl Responses {
    pub(crate) fn new(rx: mpsc::Receiver<Envelope>) -> Self {
        Self { rx }
    }

    /// Wait for the next completed job.
    pub async fn recv(&mut self) -> Option<Envelope> {
        self.rx.recv().await
    }

    /// Take a completed job if one is already waiting.
    pub fn try_recv(&mut self) -> Option<Envelope> {
        self.rx.try_recv().ok()
    }
}

impl futures::Stream for Responses {
    type Item = Envelope;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Envelope>> {
        self.rx.poll_recv(cx)
    }
}

/// Drain `results`, running `handler` for each envelope on its own task.
///
/// Returns when the result channel closes, after handing off every
/// envelope that was published before the workers exited.
pub(crate) async fn forward_to_handler(
    mut results: mpsc::Receiver<Envelope>,
    handler: ResultHandler,
    tasks: TaskTracker,
) {
    let mut delivered = 0u64;
    while let Some(envelope) = results.recv().await {
        let handler = Arc::clone(&handler);
        tasks.spawn(async move { handler(envelope) });
        delivered += 1;
    }
    tracing::debug!(delivered, "Result forwarder stopped");
}
