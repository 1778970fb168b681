//! HTTP listener - POST ingestion
//!
//! Request bodies are streamed chunk by chunk into a per-request session,
//! so JSON values may span chunks and several values may share one chunk.
//! Any path accepts POST; paths other than the rbdata route ingest the way
//! `/` does. Other methods get 405.
//!
//! The server runs on a dedicated thread driving a multi-threaded tokio
//! runtime sized to the listener's worker count.
//!
//! # Example
//!
//! ```ignore
//! use sluice_sources::http::{HttpListener, HttpListenerConfig};
//!
//! let config = HttpListenerConfig::with_port(8080);
//! let mut listener = HttpListener::start(config, pipeline)?;
//! // ...
//! listener.shutdown();
//! ```

mod handlers;
mod session;


use std::net::SocketAddr;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use axum::Router;
use axum::routing::post;
use sluice_pipeline::Pipeline;
use tokio_util::sync::CancellationToken;

use handlers::{HandlerState, ingest_any, ingest_rbdata, ingest_root};

use crate::common::{ListenerState, ReactorMode, SourceMetrics, StateCell, clamp_workers};
use crate::error::ListenerError;
use crate::socket;

/// Default HTTP port
const DEFAULT_PORT: u16 = 8080;

/// How request bodies are decoded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BodyFormat {
    /// Concatenated JSON values, decoded incrementally
    #[default]
    Json,
    /// Cisco MSE streaming notification document
    Mse,
}

/// HTTP listener configuration
#[derive(Debug, Clone)]
pub struct HttpListenerConfig {
    /// Listener name for logs and metrics
    pub id: String,

    /// Bind address (e.g., "0.0.0.0")
    pub address: String,

    /// Listen port (0 picks an ephemeral port)
    pub port: u16,

    /// Runtime worker threads
    pub num_threads: usize,

    /// Requested mode, logged only; the runtime schedules connections
    pub mode: ReactorMode,

    /// Body decoding
    pub format: BodyFormat,
}

impl Default for HttpListenerConfig {
    fn default() -> Self {
        Self {
            id: "http".into(),
            address: "0.0.0.0".into(),
            port: DEFAULT_PORT,
            num_threads: 1,
            mode: ReactorMode::default(),
            format: BodyFormat::default(),
        }
    }
}

impl HttpListenerConfig {
    /// Create config with a specific port
    pub fn with_port(port: u16) -> Self {
        Self {
            port,
            ..Default::default()
        }
    }
}

/// A running HTTP listener
#[derive(Debug)]
pub struct HttpListener {
    id: String,
    local_addr: SocketAddr,
    state: Arc<StateCell>,
    cancel: CancellationToken,
    server: Option<JoinHandle<()>>,
    metrics: Arc<SourceMetrics>,
}

impl HttpListener {
    /// Bind and start serving on a dedicated runtime thread
    ///
    /// # Errors
    ///
    /// Fails for an unresolvable or busy address, or when the runtime or
    /// its thread cannot be created.
    pub fn start(config: HttpListenerConfig, pipeline: Arc<Pipeline>) -> Result<Self, ListenerError> {
        let state = Arc::new(StateCell::new());
        let num_threads = clamp_workers(&config.id, config.num_threads);

        let addr = socket::resolve(&config.address, config.port)?;
        let std_listener = socket::bind_tcp(addr)?;
        let local_addr = std_listener.local_addr()?;

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(num_threads)
            .thread_name(format!("{}-worker", config.id))
            .enable_all()
            .build()?;

        let metrics = Arc::new(SourceMetrics::new());
        let handler_state = Arc::new(HandlerState {
            pipeline,
            metrics: Arc::clone(&metrics),
            format: config.format,
        });

        let cancel = CancellationToken::new();
        let server_cancel = cancel.clone();
        let id = config.id.clone();

        let server = thread::Builder::new()
            .name(format!("{}-server", config.id))
            .spawn(move || {
                runtime.block_on(async move {
                    let listener = match tokio::net::TcpListener::from_std(std_listener) {
                        Ok(listener) => listener,
                        Err(e) => {
                            tracing::error!(listener = %id, error = %e, "failed to register HTTP listener");
                            return;
                        }
                    };

                    let app = build_router(handler_state)
                        .into_make_service_with_connect_info::<SocketAddr>();
                    let served = axum::serve(listener, app)
                        .with_graceful_shutdown(shutdown_signal(server_cancel))
                        .await;

                    if let Err(e) = served {
                        tracing::error!(listener = %id, error = %e, "HTTP server failed");
                    }
                });
            })?;

        state.set(ListenerState::Listening);
        tracing::info!(
            listener = %config.id,
            address = %local_addr,
            workers = num_threads,
            mode = %config.mode,
            format = ?config.format,
            "HTTP listener listening"
        );

        Ok(Self {
            id: config.id,
            local_addr,
            state,
            cancel,
            server: Some(server),
            metrics,
        })
    }

    /// Address the listener is bound to
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Current lifecycle state
    pub fn state(&self) -> ListenerState {
        self.state.get()
    }

    /// Listener counters; connections are requests
    pub fn metrics(&self) -> &Arc<SourceMetrics> {
        &self.metrics
    }

    /// Stop accepting, let in-flight requests finish, and join the server
    pub fn shutdown(&mut self) {
        let Some(server) = self.server.take() else {
            return;
        };

        self.state.set(ListenerState::ShuttingDown);
        self.cancel.cancel();
        if server.join().is_err() {
            tracing::error!(listener = %self.id, "HTTP server thread panicked");
        }

        self.state.set(ListenerState::Stopped);
        tracing::info!(listener = %self.id, "HTTP listener stopped");
    }
}

impl Drop for HttpListener {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Build the axum router
fn build_router(state: Arc<HandlerState>) -> Router {
    Router::new()
        .route("/", post(ingest_root))
        .route("/rbdata/{uuid}/{topic}", post(ingest_rbdata))
        .fallback(ingest_any)
        .with_state(state)
}

/// Shutdown signal future
async fn shutdown_signal(cancel: CancellationToken) {
    cancel.cancelled().await;
}
