//! Coverage Collector
//!
//! HTTP endpoint that browsers post their coverage objects to.
//!
//! ## Behavior
//!
//! - Any method, any path: the request body is streamed to a fresh
//!   `coverage-<number>.json` in the coverage directory
//! - The empty `200 OK` is sent once the body has ended
//! - No validation, no content-type check, no size limit
//!
//! Each request owns its file, so concurrent clients never share state
//! beyond the fragment counter.

use crate::error::{HarnessError, HarnessResult};
use axum::{
    body::Body,
    extract::{DefaultBodyLimit, State},
    http::{Method, StatusCode, Uri},
    Router,
};
use futures::StreamExt;
use std::io;
use socket2::{Domain, Protocol, Socket, Type};
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tower_http::cors::{Any, CorsLayer};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Prefix of every fragment file name
pub const FRAGMENT_PREFIX: &str = "coverage-";

/// Extension of every fragment file name
pub const FRAGMENT_EXTENSION: &str = "json";

/// Fresh fragment file name with a random numeric discriminator
#[must_use]
pub fn fragment_file_name() -> String {
    format!(
        "{FRAGMENT_PREFIX}{}.{FRAGMENT_EXTENSION}",
        Uuid::new_v4().as_u128()
    )
}

/// Whether `name` looks like a fragment written by the collector
#[must_use]
pub fn is_fragment_file_name(name: &str) -> bool {
    name.strip_prefix(FRAGMENT_PREFIX)
        .and_then(|rest| rest.strip_suffix(".json"))
        .is_some_and(|n| !n.is_empty() && n.bytes().all(|b| b.is_ascii_digit()))
}

/// Collector configuration
#[derive(Debug, Clone)]
pub struct CollectorConfig {
    /// Directory receiving fragment files
    pub coverage_dir: PathBuf,
    /// Port to bind on all IPv4 and IPv6 interfaces (0 picks a free port)
    pub port: u16,
    /// Allow cross-origin posts
    pub cors: bool,
    /// How long `close` waits for in-flight uploads
    pub shutdown_grace: Duration,
}

impl CollectorConfig {
    /// Create a config for `coverage_dir` and `port`
    #[must_use]
    pub fn new(coverage_dir: impl Into<PathBuf>, port: u16) -> Self {
        Self {
            coverage_dir: coverage_dir.into(),
            port,
            cors: false,
            shutdown_grace: Duration::from_secs(5),
        }
    }

    /// Enable CORS
    #[must_use]
    pub fn cors(mut self, enabled: bool) -> Self {
        self.cors = enabled;
        self
    }

    /// Set shutdown grace period
    #[must_use]
    pub fn shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = grace;
        self
    }
}

#[derive(Debug, Clone)]
struct CollectorState {
    coverage_dir: Arc<PathBuf>,
    fragments: Arc<AtomicUsize>,
}

/// Build the collector router
///
/// Exposed so the handler can be driven without a socket.
pub fn router(
    coverage_dir: impl Into<PathBuf>,
    fragments: Arc<AtomicUsize>,
    cors: bool,
) -> Router {
    let state = CollectorState {
        coverage_dir: Arc::new(coverage_dir.into()),
        fragments,
    };

    let app = Router::new()
        .fallback(receive_fragment)
        .with_state(state)
        .layer(DefaultBodyLimit::disable());

    if cors {
        app.layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
    } else {
        app
    }
}

async fn receive_fragment(
    State(state): State<CollectorState>,
    method: Method,
    uri: Uri,
    body: Body,
) -> StatusCode {
    let path = state.coverage_dir.join(fragment_file_name());

    match write_fragment(&path, body).await {
        Ok(bytes) => {
            let total = state.fragments.fetch_add(1, Ordering::SeqCst) + 1;
            debug!(%method, %uri, bytes, file = %path.display(), total, "received coverage");
            StatusCode::OK
        }
        Err(error) => {
            warn!(%method, %uri, file = %path.display(), %error, "failed to store coverage");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

async fn write_fragment(path: &Path, body: Body) -> io::Result<u64> {
    let mut file = tokio::fs::File::create(path).await?;
    let mut stream = body.into_data_stream();
    let mut written = 0u64;

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(io::Error::other)?;
        file.write_all(&chunk).await?;
        written += chunk.len() as u64;
    }

    file.flush().await?;
    Ok(written)
}

/// Coverage collector, not yet listening
#[derive(Debug)]
pub struct CoverageCollector {
    config: CollectorConfig,
}

impl CoverageCollector {
    /// Create a collector
    #[must_use]
    pub fn new(config: CollectorConfig) -> Self {
        Self { config }
    }

    /// Bind the listener and start serving in the background
    ///
    /// Returns once the port is bound, so a bind failure is reported here.
    pub async fn start(self) -> HarnessResult<CollectorHandle> {
        tokio::fs::create_dir_all(&self.config.coverage_dir).await?;

        let fragments = Arc::new(AtomicUsize::new(0));
        let app = router(
            self.config.coverage_dir.clone(),
            fragments.clone(),
            self.config.cors,
        );

        let listener = bind_listener(self.config.port).await?;
        let local_addr = listener.local_addr()?;

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let task = tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    let _ = shutdown_rx.await;
                })
                .await
        });

        info!(
            addr = %local_addr,
            dir = %self.config.coverage_dir.display(),
            "Listening for coverage"
        );

        Ok(CollectorHandle {
            local_addr,
            coverage_dir: self.config.coverage_dir,
            fragments,
            shutdown_tx: Some(shutdown_tx),
            task,
            grace: self.config.shutdown_grace,
        })
    }
}

/// Bind `[::]:port` accepting IPv4 and IPv6, or `0.0.0.0:port` when the
/// host has no IPv6
///
/// Browsers proxied to `localhost` may resolve it to `::1` or `127.0.0.1`.
async fn bind_listener(port: u16) -> HarnessResult<tokio::net::TcpListener> {
    let v6 = SocketAddr::from((Ipv6Addr::UNSPECIFIED, port));
    match bind_dual_stack(v6) {
        Ok(listener) => Ok(listener),
        Err(source) if is_port_conflict(&source) => Err(HarnessError::Bind { addr: v6, source }),
        Err(error) => {
            debug!(%error, "IPv6 unavailable, binding IPv4 only");
            let v4 = SocketAddr::from((Ipv4Addr::UNSPECIFIED, port));
            tokio::net::TcpListener::bind(v4)
                .await
                .map_err(|source| HarnessError::Bind { addr: v4, source })
        }
    }
}

fn is_port_conflict(error: &io::Error) -> bool {
    matches!(
        error.kind(),
        io::ErrorKind::AddrInUse | io::ErrorKind::PermissionDenied
    )
}

fn bind_dual_stack(addr: SocketAddr) -> io::Result<tokio::net::TcpListener> {
    let socket = Socket::new(Domain::IPV6, Type::STREAM, Some(Protocol::TCP))?;
    socket.set_only_v6(false)?;
    #[cfg(unix)]
    socket.set_reuse_address(true)?;
    socket.bind(&addr.into())?;
    socket.listen(1024)?;
    socket.set_nonblocking(true)?;
    tokio::net::TcpListener::from_std(socket.into())
}

/// A running collector
///
/// Dropping the handle without [`close`](Self::close) stops accepting
/// connections but does not wait for in-flight uploads.
#[derive(Debug)]
pub struct CollectorHandle {
    local_addr: SocketAddr,
    coverage_dir: PathBuf,
    fragments: Arc<AtomicUsize>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    task: JoinHandle<io::Result<()>>,
    grace: Duration,
}

impl CollectorHandle {
    /// Address the listener is bound to
    #[must_use]
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Port the listener is bound to
    #[must_use]
    pub fn port(&self) -> u16 {
        self.local_addr.port()
    }

    /// Directory fragments are written to
    #[must_use]
    pub fn coverage_dir(&self) -> &Path {
        &self.coverage_dir
    }

    /// Number of fragments stored so far
    #[must_use]
    pub fn fragments_written(&self) -> usize {
        self.fragments.load(Ordering::SeqCst)
    }

    /// Stop accepting connections and wait up to the grace period for
    /// in-flight uploads
    ///
    /// Uploads still running when the grace period ends are abandoned and
    /// their fragments may be truncated. Returns the number of fragments
    /// stored.
    pub async fn close(mut self) -> HarnessResult<usize> {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }

        match tokio::time::timeout(self.grace, &mut self.task).await {
            Ok(Ok(result)) => result?,
            Ok(Err(join_error)) => {
                warn!(error = %join_error, "coverage collector task failed");
            }
            Err(_) => {
                self.task.abort();
                warn!(
                    grace_ms = self.grace.as_millis() as u64,
                    "in-flight coverage uploads abandoned at shutdown"
                );
            }
        }

        let total = self.fragments_written();
        info!(addr = %self.local_addr, fragments = total, "Coverage collector stopped");
        Ok(total)
    }
}

impl Drop for CollectorHandle {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}
