//! The HTTP call capability workers execute requests through.
//!
//! Any type implementing [`HttpClient`] can back a dispatcher. The crate
//! implements it for [`reqwest::Client`]; callers that need connection-pool
//! or TLS tuning build their own `reqwest::Client` and pass it to
//! [`Dispatcher::run`](crate::Dispatcher::run).

use async_trait::async_trait;
use fanout_core::DispatcherConfig;

use crate::error::{CallError, DispatchError};

/// Executes one HTTP request.
///
/// Implementations must not retry; each call corresponds to exactly one
/// accepted job.
#[async_trait]
pub trait HttpClient: Send + Sync + 'static {
    async fn execute(&self, request: reqwest::Request) -> Result<reqwest::Response, CallError>;
}

#[async_trait]
impl HttpClient for reqwest::Client {
    async fn execute(&self, request: reqwest::Request) -> Result<reqwest::Response, CallError> {
        Ok(reqwest::Client::execute(self, request).await?)
    }
}

/// Build the client used when `run` is not given one.
pub fn default_client(config: &DispatcherConfig) -> Result<reqwest::Client, DispatchError> {
    let mut builder = reqwest::Client::builder().pool_max_idle_per_host(config.pool_max_idle_per_host);
    if let Some(timeout) = config.request_timeout {
        builder = builder.timeout(timeout);
    }
    Ok(builder.build()?)
}
