#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path, State};
use axum::routing::get;
use axum::Router;
use tokio::task::JoinHandle;

/// Size of the body served by `/large` (256 KB).
pub const LARGE_BODY_LEN: usize = 256 * 1024;

/// Install a test-friendly tracing subscriber once per test binary.
///
/// Honours `RUST_LOG`, e.g. `RUST_LOG=fanout_dispatcher=debug`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Request counters shared with the server's handlers.
#[derive(Default)]
pub struct ServerStats {
    hits: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl ServerStats {
    /// Requests that reached a handler.
    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }

    /// Highest number of handlers that were running at the same time.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn enter(self: &Arc<Self>) -> InFlightGuard {
        self.hits.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        InFlightGuard(Arc::clone(self))
    }
}

/// Decrements the in-flight count even when the client hangs up mid-request.
struct InFlightGuard(Arc<ServerStats>);

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

#[derive(Clone)]
struct AppState {
    delay: Duration,
    stats: Arc<ServerStats>,
}

/// A local HTTP server that answers every route after a fixed delay.
///
/// Routes:
/// * `GET /` - `hello`
/// * `GET /path/{id}` - `path:{id}`
/// * `GET /large` - [`LARGE_BODY_LEN`] bytes of [`large_body`]
pub struct TestServer {
    pub addr: SocketAddr,
    pub stats: Arc<ServerStats>,
    handle: JoinHandle<()>,
}

impl TestServer {
    pub async fn start(delay: Duration) -> Self {
        let stats = Arc::new(ServerStats::default());
        let state = AppState {
            delay,
            stats: Arc::clone(&stats),
        };

        let app = Router::new()
            .route("/", get(hello))
            .route("/path/{id}", get(path_echo))
            .route("/large", get(large))
            .with_state(state);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind test listener");
        let addr = listener.local_addr().expect("listener address");
        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.expect("test server failed");
        });

        Self {
            addr,
            stats,
            handle,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn hello(State(state): State<AppState>) -> &'static str {
    let _guard = state.stats.enter();
    tokio::time::sleep(state.delay).await;
    "hello"
}

async fn path_echo(State(state): State<AppState>, Path(id): Path<String>) -> String {
    let _guard = state.stats.enter();
    tokio::time::sleep(state.delay).await;
    format!("path:{id}")
}

async fn large(State(state): State<AppState>) -> Vec<u8> {
    let _guard = state.stats.enter();
    tokio::time::sleep(state.delay).await;
    large_body()
}

/// Deterministic payload for detachment checks.
pub fn large_body() -> Vec<u8> {
    (0..LARGE_BODY_LEN).map(|i| (i % 251) as u8).collect()
}

/// A local address with nothing listening on it.
pub fn closed_port_url() -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind probe listener");
    let addr = listener.local_addr().expect("probe address");
    drop(listener);
    format!("http://{addr}/")
}
