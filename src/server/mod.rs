//! Remote execution endpoint.
//!
//! | Route | Body | Reply |
//! |---|---|---|
//! | `POST /` | multipart `input` + `options` | buffer or metadata envelope |
//! | `GET /health` | | status, version, cache counters |
//!
//! Request bodies are checked against the aggregate upload bound via
//! `Content-Length` before any byte is read, then part by part while the
//! multipart stream is consumed. Engine work runs on a dedicated rayon pool
//! so the async reactor only ever shuffles bytes.
//!
//! Servers are started with [`spawn`], which returns a [`RunningServer`]
//! handle. Dropping the handle stops the server.

mod error;
mod handler;
mod upload;

pub use error::ServerError;
pub use handler::render;
pub use upload::{Upload, parse_options};

use crate::cache::{CacheStats, ResultCache};
use crate::config::{ServerConfig, effective_threads};
use crate::imaging::RustBackend;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{error, info};
use warp::Filter;

/// State shared by every request.
pub struct AppState {
    pub config: ServerConfig,
    pub backend: RustBackend,
    pub pool: rayon::ThreadPool,
    pub cache: ResultCache,
}

impl AppState {
    pub fn new(config: ServerConfig) -> Result<Self, ServerError> {
        config.validate()?;
        let threads = effective_threads(&config.processing);
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("lipo-engine-{i}"))
            .panic_handler(|_| error!("engine worker panicked"))
            .build()?;
        Ok(Self {
            backend: RustBackend::with_limits(config.processing.size_limits()),
            cache: ResultCache::new(&config.cache),
            pool,
            config,
        })
    }
}

/// All routes, with warp rejections rendered as JSON errors.
pub fn routes(
    state: Arc<AppState>,
) -> impl Filter<Extract = (impl warp::Reply,), Error = Infallible> + Clone {
    let max_body = state.config.limits.max_body_size();
    let with_state = warp::any().map(move || Arc::clone(&state));

    let process = warp::post()
        .and(warp::path::end())
        .and(warp::multipart::form().max_length(max_body))
        .and(with_state.clone())
        .and_then(handler::process);

    let health = warp::get()
        .and(warp::path("health"))
        .and(warp::path::end())
        .and(with_state)
        .map(handler::health);

    process.or(health).recover(handler::rejection)
}

/// Handle to a server started by [`spawn`].
pub struct RunningServer {
    addr: SocketAddr,
    state: Arc<AppState>,
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl RunningServer {
    /// The bound address (with the real port when `bind` used port 0).
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Base URI for [`ClientConfig`](crate::client::ClientConfig).
    pub fn base_uri(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.state.cache.stats()
    }

    /// Stop accepting connections and wait for in-flight requests.
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
        info!(addr = %self.addr, "server stopped");
    }
}

impl Drop for RunningServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}

/// Bind and start a server on the current tokio runtime.
pub async fn spawn(config: ServerConfig) -> Result<RunningServer, ServerError> {
    let addr = config.bind_addr()?;
    let state = Arc::new(AppState::new(config)?);
    let (tx, rx) = oneshot::channel::<()>();

    let (bound, server) = warp::serve(routes(Arc::clone(&state)))
        .try_bind_with_graceful_shutdown(addr, async {
            rx.await.ok();
        })
        .map_err(|source| ServerError::Bind { addr, source })?;

    let task = tokio::spawn(server);
    info!(
        addr = %bound,
        max_upload = %state.config.limits.file_size,
        cache_entries = state.config.cache.entries,
        cache_size = %state.config.cache.size,
        "listening"
    );

    Ok(RunningServer {
        addr: bound,
        state,
        shutdown: Some(tx),
        task: Some(task),
    })
}
