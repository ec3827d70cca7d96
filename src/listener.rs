//! Local HTTP listener raced against a build
//!
//! The fetch stage of every build downloads from `localhost:<port>`. While a
//! build runs, a listener owns that port and either refuses the download
//! (hit-check) or serves the serialized outcome (save). The builder only
//! contacts the listener when the fetch layer is not cached, which is how a
//! hit is told apart from a miss without running the task.
//!
//! The port is arbitrated by the OS: whoever binds it first owns it, everyone
//! else backs off and retries. This holds across processes.

use crate::config::ListenerConfig;
use crate::error::{DkrError, DkrResult};
use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Router;
use std::future::Future;
use std::io::ErrorKind;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tracing::debug;

/// What the listener answers to every request
#[derive(Debug, Clone)]
pub enum Reply {
    /// 503 with an empty body, failing the fetch
    Miss,
    /// 200 with the given body
    Payload(Bytes),
}

/// How a raced build ended
#[derive(Debug)]
pub struct Race<R> {
    /// Value produced by the build future
    pub build: R,
    /// Number of requests the listener answered
    pub requests: usize,
}

impl<R> Race<R> {
    /// Whether the builder contacted the listener at all
    pub fn fetched(&self) -> bool {
        self.requests > 0
    }
}

struct ReplyState {
    reply: Reply,
    requests: AtomicUsize,
}

async fn answer(State(state): State<Arc<ReplyState>>) -> Response {
    let n = state.requests.fetch_add(1, Ordering::SeqCst) + 1;
    match &state.reply {
        Reply::Miss => {
            debug!("Answering fetch #{} with cache miss", n);
            StatusCode::SERVICE_UNAVAILABLE.into_response()
        }
        Reply::Payload(body) => {
            debug!("Answering fetch #{} with {} byte outcome", n, body.len());
            (StatusCode::OK, body.clone()).into_response()
        }
    }
}

/// Owner of the listening port, retrying binds while another caller holds it
#[derive(Debug, Clone)]
pub struct PortArbiter {
    bind_address: String,
    port: u16,
    backoff: Duration,
}

impl PortArbiter {
    /// Create an arbiter. Port 0 picks an ephemeral port on each bind.
    pub fn new(bind_address: impl Into<String>, port: u16, backoff: Duration) -> Self {
        Self {
            bind_address: bind_address.into(),
            port,
            backoff,
        }
    }

    pub fn from_config(config: &ListenerConfig) -> Self {
        Self::new(config.bind_address.clone(), config.port, config.backoff())
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Bind the port, sleeping `backoff` after every address-in-use failure
    pub async fn bind(&self) -> DkrResult<TcpListener> {
        loop {
            match TcpListener::bind((self.bind_address.as_str(), self.port)).await {
                Ok(listener) => return Ok(listener),
                Err(e) if e.kind() == ErrorKind::AddrInUse => {
                    debug!(
                        "Port {} unavailable, sleep for {:?}.",
                        self.port, self.backoff
                    );
                    tokio::time::sleep(self.backoff).await;
                }
                Err(source) => {
                    return Err(DkrError::Listener {
                        port: self.port,
                        source,
                    })
                }
            }
        }
    }

    /// Serve `reply` on the port for exactly as long as `build` runs.
    ///
    /// `build` receives the bound port. Its completion, success or failure,
    /// shuts the listener down, and the port is released before this returns.
    pub async fn race<F, Fut, R>(&self, reply: Reply, build: F) -> DkrResult<Race<R>>
    where
        F: FnOnce(u16) -> Fut,
        Fut: Future<Output = R>,
    {
        let listener = self.bind().await?;
        let port = listener
            .local_addr()
            .map_err(|source| DkrError::Listener {
                port: self.port,
                source,
            })?
            .port();
        debug!("Listening on port {}", port);

        let state = Arc::new(ReplyState {
            reply,
            requests: AtomicUsize::new(0),
        });
        let app = Router::new()
            .fallback(answer)
            .with_state(Arc::clone(&state));

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let serve = async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    let _ = shutdown_rx.await;
                })
                .await
        };
        let build = async move {
            let result = build(port).await;
            let _ = shutdown_tx.send(());
            result
        };

        let (served, built) = tokio::join!(serve, build);
        served.map_err(|source| DkrError::Listener { port, source })?;

        Ok(Race {
            build: built,
            requests: state.requests.load(Ordering::SeqCst),
        })
    }
}

impl Default for PortArbiter {
    fn default() -> Self {
        Self::from_config(&ListenerConfig::default())
    }
}
