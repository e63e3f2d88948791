//! Outbound call descriptor accepted by [`Dispatcher::add`](crate::Dispatcher::add).

use std::time::Duration;

use reqwest::header::{HeaderName, HeaderValue};
use reqwest::{Method, Url};
use tokio_util::sync::CancellationToken;

use crate::error::DispatchError;

/// An outbound HTTP request plus optional per-request cancellation.
///
/// The dispatcher never inspects the request; it is handed to the
/// [`HttpClient`](crate::HttpClient) unchanged. A cancellation token set via
/// [`with_cancellation`](Request::with_cancellation) aborts the call while
/// it is in flight; the dispatcher's own run scope does not.
#[derive(Debug)]
pub struct Request {
    inner: reqwest::Request,
    cancel: Option<CancellationToken>,
}

impl Request {
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            inner: reqwest::Request::new(method, url),
            cancel: None,
        }
    }

    /// Build a `GET` request, parsing `url`.
    pub fn get(url: &str) -> Result<Self, DispatchError> {
        let url = Url::parse(url).map_err(|e| DispatchError::InvalidRequest(format!("{url}: {e}")))?;
        Ok(Self::new(Method::GET, url))
    }

    /// Build a `POST` request with the given body.
    pub fn post(url: &str, body: impl Into<reqwest::Body>) -> Result<Self, DispatchError> {
        let url = Url::parse(url).map_err(|e| DispatchError::InvalidRequest(format!("{url}: {e}")))?;
        let mut request = Self::new(Method::POST, url);
        *request.inner.body_mut() = Some(body.into());
        Ok(request)
    }

    /// Add a header, replacing any existing value for the same name.
    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.inner.headers_mut().insert(name, value);
        self
    }

    /// Per-request total timeout, honoured by `reqwest` clients.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        *self.inner.timeout_mut() = Some(timeout);
        self
    }

    /// Abort the call when `token` is cancelled.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn method(&self) -> &Method {
        self.inner.method()
    }

    pub fn url(&self) -> &Url {
        self.inner.url()
    }

    pub fn cancellation(&self) -> Option<&CancellationToken> {
        self.cancel.as_ref()
    }

    pub fn into_parts(self) -> (reqwest::Request, Option<CancellationToken>) {
        (self.inner, self.cancel)
    }
}

impl From<reqwest::Request> for Request {
    fn from(inner: reqwest::Request) -> Self {
        Self {
            inner,
            cancel: None,
        }
    }
}
