//! Client side: builder, transport and materializer.
//!
//! A [`Lipo`] owns an HTTP client and a small tokio runtime dedicated to
//! transport. Every terminal call builds one future and hands it to that
//! runtime; the three calling conventions only differ in how they wait:
//!
//! | Convention | Wait |
//! |---|---|
//! | `async fn` | awaits the spawned task's `JoinHandle` (any executor) |
//! | `*_sync` | blocks the calling thread on a std channel |
//! | `*_callback` | the callback runs on a transport thread |
//!
//! A pending callback keeps the transport runtime alive, so the caller may
//! drop its `Lipo` and pipelines right after a `*_callback` call.
//!
//! Calling a `*_sync` method from inside a callback blocks a transport
//! worker; with `workers = 1` that deadlocks.

mod error;
mod materialize;
mod pipeline;
mod transport;

pub use error::LipoError;
pub use materialize::Output;
pub use pipeline::{Pipeline, Source};

use futures::future::BoxFuture;
use reqwest::Url;
use std::sync::Arc;
use std::sync::mpsc;
use std::time::Duration;
use tokio::runtime::{Builder, Handle, Runtime};
use tracing::debug;
use transport::Transport;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_WORKERS: usize = 2;

/// Immutable client settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Endpoint root, e.g. `http://127.0.0.1:3000`.
    pub base_uri: String,
    /// Per-request timeout, covering connect, upload and response.
    pub timeout: Duration,
    /// Threads of the transport runtime.
    pub workers: usize,
}

impl ClientConfig {
    pub fn new(base_uri: impl Into<String>) -> Self {
        Self {
            base_uri: base_uri.into(),
            timeout: DEFAULT_TIMEOUT,
            workers: DEFAULT_WORKERS,
        }
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }
}

/// Endpoint URL for `base_uri`: http(s) only, path ending in `/`.
fn endpoint_url(base_uri: &str) -> Result<Url, LipoError> {
    let mut url = Url::parse(base_uri)
        .map_err(|e| LipoError::InvalidConfig(format!("invalid base URI '{base_uri}': {e}")))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(LipoError::InvalidConfig(format!(
            "base URI must be http or https, got '{}'",
            url.scheme()
        )));
    }
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}

/// Runtime that may be dropped from inside another runtime.
struct TransportRuntime(Option<Runtime>);

impl Drop for TransportRuntime {
    fn drop(&mut self) {
        if let Some(runtime) = self.0.take() {
            runtime.shutdown_background();
        }
    }
}

struct Inner {
    transport: Transport,
    handle: Handle,
    _runtime: TransportRuntime,
}

/// Entry point: holds the connection pool and the transport runtime.
///
/// Cheap to clone; clones share both.
#[derive(Clone)]
pub struct Lipo {
    inner: Arc<Inner>,
}

impl Lipo {
    pub fn new(config: ClientConfig) -> Result<Self, LipoError> {
        let endpoint = endpoint_url(&config.base_uri)?;
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| LipoError::InvalidConfig(format!("cannot build HTTP client: {e}")))?;
        let runtime = Builder::new_multi_thread()
            .worker_threads(config.workers.max(1))
            .thread_name("lipo-transport")
            .enable_all()
            .build()?;
        debug!(
            %endpoint,
            timeout_ms = config.timeout.as_millis() as u64,
            workers = config.workers,
            "client ready"
        );

        Ok(Self {
            inner: Arc::new(Inner {
                transport: Transport::new(http, endpoint),
                handle: runtime.handle().clone(),
                _runtime: TransportRuntime(Some(runtime)),
            }),
        })
    }

    /// Start a pipeline from a path, an encoded buffer or a [`CreateSpec`](crate::protocol::CreateSpec).
    pub fn input(&self, source: impl Into<Source>) -> Pipeline {
        Pipeline::new(self.clone(), source.into())
    }

    pub fn endpoint(&self) -> &Url {
        self.inner.transport.endpoint()
    }

    pub(crate) fn transport(&self) -> Transport {
        self.inner.transport.clone()
    }

    /// The async primitive: run `job` on the transport runtime.
    pub(crate) async fn run<T>(
        &self,
        job: BoxFuture<'static, Result<T, LipoError>>,
    ) -> Result<T, LipoError>
    where
        T: Send + 'static,
    {
        self.inner
            .handle
            .spawn(job)
            .await
            .map_err(|e| LipoError::Network(format!("transport task failed: {e}")))?
    }

    pub(crate) fn run_blocking<T>(
        &self,
        job: BoxFuture<'static, Result<T, LipoError>>,
    ) -> Result<T, LipoError>
    where
        T: Send + 'static,
    {
        let (tx, rx) = mpsc::channel();
        self.inner.handle.spawn(async move {
            let _ = tx.send(job.await);
        });
        rx.recv()
            .map_err(|_| LipoError::Network("transport runtime stopped".to_string()))?
    }

    pub(crate) fn run_callback<T, F>(
        &self,
        job: BoxFuture<'static, Result<T, LipoError>>,
        callback: F,
    ) where
        T: Send + 'static,
        F: FnOnce(Result<T, LipoError>) + Send + 'static,
    {
        // The task owns a client handle so dropping every other handle
        // cannot shut the runtime down before the callback runs.
        let keep_alive = Arc::clone(&self.inner);
        self.inner.handle.spawn(async move {
            let result = job.await;
            callback(result);
            drop(keep_alive);
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_gets_trailing_slash() {
        assert_eq!(
            endpoint_url("http://127.0.0.1:3000").unwrap().as_str(),
            "http://127.0.0.1:3000/"
        );
        assert_eq!(
            endpoint_url("https://img.example.com/lipo").unwrap().as_str(),
            "https://img.example.com/lipo/"
        );
    }

    #[test]
    fn bad_base_uri_is_invalid_config() {
        assert!(matches!(
            Lipo::new(ClientConfig::new("not a uri")),
            Err(LipoError::InvalidConfig(_))
        ));
        assert!(matches!(
            Lipo::new(ClientConfig::new("ftp://host/")),
            Err(LipoError::InvalidConfig(_))
        ));
    }

    #[test]
    fn config_builder_overrides_defaults() {
        let config = ClientConfig::new("http://localhost:1")
            .timeout(Duration::from_millis(250))
            .workers(1);
        assert_eq!(config.timeout, Duration::from_millis(250));
        assert_eq!(config.workers, 1);
        assert_eq!(ClientConfig::new("x").timeout, DEFAULT_TIMEOUT);
    }

    #[test]
    fn blocking_and_callback_share_the_primitive() {
        let lipo = Lipo::new(ClientConfig::new("http://127.0.0.1:1").workers(1)).unwrap();
        let value = lipo.run_blocking(Box::pin(async { Ok::<_, LipoError>(7) })).unwrap();
        assert_eq!(value, 7);

        let (tx, rx) = mpsc::channel();
        lipo.run_callback(Box::pin(async { Ok::<_, LipoError>(8) }), move |r| {
            let _ = tx.send(r.ok());
        });
        assert_eq!(rx.recv().unwrap(), Some(8));
    }

    #[test]
    fn callback_runs_after_last_client_handle_is_dropped() {
        let lipo = Lipo::new(ClientConfig::new("http://127.0.0.1:1")).unwrap();
        let (tx, rx) = mpsc::channel();
        let job = Box::pin(async {
            tokio::time::sleep(Duration::from_millis(100)).await;
            Ok::<_, LipoError>(9)
        });
        lipo.run_callback(job, move |r| {
            let _ = tx.send(r.ok());
        });
        drop(lipo);
        assert_eq!(rx.recv_timeout(Duration::from_secs(10)).unwrap(), Some(9));
    }

    #[tokio::test]
    async fn async_run_works_from_another_runtime() {
        let lipo = Lipo::new(ClientConfig::new("http://127.0.0.1:1")).unwrap();
        let value = lipo.run(Box::pin(async { Ok::<_, LipoError>("done") })).await.unwrap();
        assert_eq!(value, "done");
    }
}
