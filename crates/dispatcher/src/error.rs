//! Error types for the dispatcher and for individual calls.
//!
//! [`DispatchError`] is returned by the dispatcher's own operations
//! (`new`, `run`, `add`). [`CallError`] never crosses that boundary as a
//! return value: it travels inside an [`Envelope`](crate::Envelope) as the
//! failed outcome of one job.

use fanout_core::ConfigError;

/// Errors from constructing, starting or feeding a dispatcher.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("Worker size must be at least 1, got {0}")]
    InvalidWorkerSize(usize),

    #[error("Dispatcher is already running")]
    AlreadyRunning,

    /// The run's cancellation scope has fired; the request was not accepted.
    #[error("Dispatcher cancelled")]
    Cancelled,

    /// The job intake is gone because the match loop has exited.
    #[error("Dispatcher job intake is closed")]
    Closed,

    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    /// The default HTTP client could not be built.
    #[error("Failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

/// Failure outcome of a single HTTP call.
///
/// The underlying transport error is carried as-is; no classification or
/// retry happens inside the dispatcher.
#[derive(Debug, thiserror::Error)]
pub enum CallError {
    /// The request failed before a response was received.
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// A response arrived but its body could not be read to the end.
    #[error("Failed to read response body: {0}")]
    Body(#[source] reqwest::Error),

    /// Failure reported by a caller-supplied [`HttpClient`](crate::HttpClient).
    #[error("Transport error: {0}")]
    Transport(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// The request's own cancellation token fired during the call.
    #[error("Request cancelled")]
    Cancelled,
}

impl CallError {
    /// Wrap an arbitrary transport error from a custom client.
    pub fn transport<E>(err: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::Transport(err.into())
    }

    /// Returns `true` if the underlying failure was a timeout.
    pub fn is_timeout(&self) -> bool {
        match self {
            Self::Request(e) | Self::Body(e) => e.is_timeout(),
            _ => false,
        }
    }
}
