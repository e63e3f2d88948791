//! Detached copies of HTTP responses.
//!
//! A `reqwest::Response` body is tied to a live connection. [`detach`]
//! drains it through an arena scratch buffer into owned memory, releases
//! the connection, and returns a [`ResponseSnapshot`] that can be consumed
//! later on any task.

use std::io;
use std::net::SocketAddr;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use http_body_util::BodyExt;
use reqwest::header::{HeaderMap, TRANSFER_ENCODING};
use reqwest::{StatusCode, Url, Version};
use tokio::io::{AsyncRead, ReadBuf};

use crate::arena::BufferArena;
use crate::error::CallError;

/// Owned response metadata and body, independent of any connection.
#[derive(Debug)]
pub struct ResponseSnapshot {
    status: StatusCode,
    version: Version,
    headers: HeaderMap,
    trailers: HeaderMap,
    url: Url,
    remote_addr: Option<SocketAddr>,
    content_length: Option<u64>,
    transfer_encoding: Vec<String>,
    body: DetachedBody,
}

impl ResponseSnapshot {
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Status line in `"200 OK"` form.
    pub fn status_line(&self) -> String {
        match self.status.canonical_reason() {
            Some(reason) => format!("{} {}", self.status.as_u16(), reason),
            None => self.status.as_u16().to_string(),
        }
    }

    pub fn version(&self) -> Version {
        self.version
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Trailer fields sent after the body, empty when the server sent none.
    pub fn trailers(&self) -> &HeaderMap {
        &self.trailers
    }

    /// Final URL of the response, after any redirects.
    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn remote_addr(&self) -> Option<SocketAddr> {
        self.remote_addr
    }

    /// Content length as reported by the original response, if known.
    pub fn content_length(&self) -> Option<u64> {
        self.content_length
    }

    /// Transfer codings listed in the original `Transfer-Encoding` header.
    pub fn transfer_encoding(&self) -> &[String] {
        &self.transfer_encoding
    }

    pub fn body(&self) -> &DetachedBody {
        &self.body
    }

    pub fn body_mut(&mut self) -> &mut DetachedBody {
        &mut self.body
    }

    pub fn into_body(self) -> DetachedBody {
        self.body
    }
}

/// Drain `response` into owned memory and release its connection.
///
/// The body is accumulated in a scratch buffer checked out of `arena`,
/// then copied into an exactly-sized allocation. The scratch buffer goes
/// back to the arena on every path, including read failures.
pub async fn detach(response: reqwest::Response, arena: &BufferArena) -> Result<ResponseSnapshot, CallError> {
    let url = response.url().clone();
    let remote_addr = response.remote_addr();
    let content_length = response.content_length();
    let transfer_encoding = transfer_codings(response.headers());

    let (parts, mut body) = http::Response::<reqwest::Body>::from(response).into_parts();

    let mut scratch = arena.checkout();
    let mut trailers = HeaderMap::new();
    while let Some(frame) = body.frame().await {
        let frame = frame.map_err(CallError::Body)?;
        match frame.into_data() {
            Ok(data) => scratch.extend_from_slice(&data),
            Err(frame) => {
                if let Ok(fields) = frame.into_trailers() {
                    trailers.extend(fields);
                }
            }
        }
    }
    // Body fully read: hand the connection back to the transport.
    drop(body);

    let data = Bytes::copy_from_slice(&scratch);
    drop(scratch);

    Ok(ResponseSnapshot {
        status: parts.status,
        version: parts.version,
        headers: parts.headers,
        trailers,
        url,
        remote_addr,
        content_length,
        transfer_encoding,
        body: DetachedBody::new(data),
    })
}

fn transfer_codings(headers: &HeaderMap) -> Vec<String> {
    headers
        .get_all(TRANSFER_ENCODING)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .map(str::trim)
        .filter(|coding| !coding.is_empty())
        .map(str::to_owned)
        .collect()
}

/// A single-pass reader over a response body held in owned memory.
///
/// Reads through [`io::Read`] or [`AsyncRead`] advance a cursor until the
/// end; re-reading from the start is up to the consumer. The full content
/// stays available through [`as_bytes`](DetachedBody::as_bytes).
#[derive(Debug, Clone, Default)]
pub struct DetachedBody {
    data: Bytes,
    pos: usize,
}

impl DetachedBody {
    pub fn new(data: Bytes) -> Self {
        Self { data, pos: 0 }
    }

    /// The complete body, regardless of how much has been read.
    pub fn as_bytes(&self) -> &Bytes {
        &self.data
    }

    pub fn into_bytes(self) -> Bytes {
        self.data
    }

    /// The complete body as UTF-8.
    pub fn text(&self) -> Result<&str, std::str::Utf8Error> {
        std::str::from_utf8(&self.data)
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Bytes not yet consumed by the reader.
    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    fn take_into(&mut self, dst: &mut [u8]) -> usize {
        let n = dst.len().min(self.remaining());
        dst[..n].copy_from_slice(&self.data[self.pos..self.pos + n]);
        self.pos += n;
        n
    }
}

impl io::Read for DetachedBody {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        Ok(self.take_into(buf))
    }
}

impl AsyncRead for DetachedBody {
    fn poll_read(self: Pin<&mut Self>, _cx: &mut Context<'_>, buf: &mut ReadBuf<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        let n = buf.remaining().min(this.remaining());
        buf.put_slice(&this.data[this.pos..this.pos + n]);
        this.pos += n;
        Poll::Ready(Ok(()))
    }
}
