//! Per-job results handed to the result sink.

use std::time::Duration;

use fanout_core::JobId;

use crate::error::CallError;
use crate::snapshot::ResponseSnapshot;

/// The delivered result of one job: a detached response or the error that
/// prevented one.
#[derive(Debug)]
pub struct Envelope {
    job_id: JobId,
    worker_id: usize,
    elapsed: Duration,
    outcome: Result<ResponseSnapshot, CallError>,
}

impl Envelope {
    pub(crate) fn new(
        job_id: JobId,
        worker_id: usize,
        elapsed: Duration,
        outcome: Result<ResponseSnapshot, CallError>,
    ) -> Self {
        Self {
            job_id,
            worker_id,
            elapsed,
            outcome,
        }
    }

    /// Id returned by [`Dispatcher::add`](crate::Dispatcher::add) for this job.
    pub fn job_id(&self) -> JobId {
        self.job_id
    }

    /// Index of the worker that executed the call.
    pub fn worker_id(&self) -> usize {
        self.worker_id
    }

    /// Time from the start of the call until the body was detached.
    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    pub fn is_ok(&self) -> bool {
        self.outcome.is_ok()
    }

    pub fn snapshot(&self) -> Option<&ResponseSnapshot> {
        self.outcome.as_ref().ok()
    }

    pub fn snapshot_mut(&mut self) -> Option<&mut ResponseSnapshot> {
        self.outcome.as_mut().ok()
    }

    pub fn error(&self) -> Option<&CallError> {
        self.outcome.as_ref().err()
    }

    pub fn into_result(self) -> Result<ResponseSnapshot, CallError> {
        self.outcome
    }
}
