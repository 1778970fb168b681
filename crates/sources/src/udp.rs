//! UDP listener
//!
//! Each worker thread owns its own socket bound to the listener address
//! with `SO_REUSEPORT`, so the kernel spreads datagrams across workers
//! and no lock serializes receipt. Receives wait at most one second so
//! workers notice shutdown.
//!
//! UDP has no sessions: every datagram is decoded on its own, enriched by
//! the sender's address and published, then forgotten.

use std::io;
use std::net::{SocketAddr, UdpSocket};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use sluice_pipeline::{Pipeline, SessionIdentity};

use crate::common::{ListenerState, ReactorMode, SourceMetrics, StateCell, clamp_workers};
use crate::error::ListenerError;
use crate::socket;

/// Default UDP port
const DEFAULT_PORT: u16 = 2056;

/// Largest datagram accepted
const MAX_DATAGRAM_SIZE: usize = 65_535;

/// Receive wait bound, and so the shutdown latency
pub const RECV_TIMEOUT: Duration = Duration::from_secs(1);

/// UDP listener configuration
#[derive(Debug, Clone)]
pub struct UdpListenerConfig {
    /// Listener name for logs and metrics
    pub id: String,

    /// Bind address (e.g., "0.0.0.0")
    pub address: String,

    /// Listen port (0 picks an ephemeral port)
    pub port: u16,

    /// Number of receiving threads
    pub num_threads: usize,

    /// Requested readiness strategy
    pub mode: ReactorMode,
}

impl Default for UdpListenerConfig {
    fn default() -> Self {
        Self {
            id: "udp".into(),
            address: "0.0.0.0".into(),
            port: DEFAULT_PORT,
            num_threads: 1,
            mode: ReactorMode::default(),
        }
    }
}

impl UdpListenerConfig {
    /// Create config with a specific port
    pub fn with_port(port: u16) -> Self {
        Self {
            port,
            ..Default::default()
        }
    }
}

/// A running UDP listener
#[derive(Debug)]
pub struct UdpListener {
    id: String,
    local_addr: SocketAddr,
    state: Arc<StateCell>,
    shutdown: Arc<AtomicBool>,
    workers: Vec<JoinHandle<()>>,
    metrics: Arc<SourceMetrics>,
}

impl UdpListener {
    /// Bind one socket per worker and start receiving
    ///
    /// # Errors
    ///
    /// Fails for thread-per-connection mode, an unresolvable or busy
    /// address, or when a thread cannot be spawned.
    pub fn start(config: UdpListenerConfig, pipeline: Arc<Pipeline>) -> Result<Self, ListenerError> {
        if config.mode == ReactorMode::ThreadPerConnection {
            return Err(ListenerError::UnsupportedMode {
                protocol: "udp",
                mode: config.mode,
            });
        }

        let state = Arc::new(StateCell::new());
        let num_workers = clamp_workers(&config.id, config.num_threads);

        // The first socket fixes the port when an ephemeral one was asked for.
        let requested = socket::resolve(&config.address, config.port)?;
        let first = socket::bind_udp(requested, RECV_TIMEOUT)?;
        let local_addr = first.local_addr()?;

        let mut sockets = Vec::with_capacity(num_workers);
        sockets.push(first);
        for _ in 1..num_workers {
            sockets.push(socket::bind_udp(local_addr, RECV_TIMEOUT)?);
        }

        let shutdown = Arc::new(AtomicBool::new(false));
        let metrics = Arc::new(SourceMetrics::new());

        let mut workers = Vec::with_capacity(num_workers);
        for (id, socket) in sockets.into_iter().enumerate() {
            let worker = UdpWorker {
                id,
                listener: config.id.clone(),
                socket,
                pipeline: Arc::clone(&pipeline),
                metrics: Arc::clone(&metrics),
                shutdown: Arc::clone(&shutdown),
            };

            match thread::Builder::new()
                .name(format!("{}-worker-{id}", config.id))
                .spawn(move || worker.run())
            {
                Ok(handle) => workers.push(handle),
                Err(e) => {
                    shutdown.store(true, Ordering::Release);
                    join_all(workers);
                    return Err(e.into());
                }
            }
        }

        state.set(ListenerState::Listening);
        tracing::info!(
            listener = %config.id,
            address = %local_addr,
            workers = num_workers,
            "UDP listener listening"
        );

        Ok(Self {
            id: config.id,
            local_addr,
            state,
            shutdown,
            workers,
            metrics,
        })
    }

    /// Address the sockets are bound to
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Current lifecycle state
    pub fn state(&self) -> ListenerState {
        self.state.get()
    }

    /// Listener counters; `connections_active` counts running workers
    pub fn metrics(&self) -> &Arc<SourceMetrics> {
        &self.metrics
    }

    /// Stop every worker, waiting at most one receive timeout
    pub fn shutdown(&mut self) {
        if self.workers.is_empty() {
            return;
        }

        self.state.set(ListenerState::ShuttingDown);
        self.shutdown.store(true, Ordering::Release);
        join_all(std::mem::take(&mut self.workers));

        self.state.set(ListenerState::Stopped);
        tracing::info!(listener = %self.id, "UDP listener stopped");
    }
}

impl Drop for UdpListener {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn join_all(workers: Vec<JoinHandle<()>>) {
    for handle in workers {
        if handle.join().is_err() {
            tracing::error!("UDP worker thread panicked");
        }
    }
}

struct UdpWorker {
    id: usize,
    listener: String,
    socket: UdpSocket,
    pipeline: Arc<Pipeline>,
    metrics: Arc<SourceMetrics>,
    shutdown: Arc<AtomicBool>,
}

impl UdpWorker {
    fn run(self) {
        let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];
        self.metrics.connection_opened();
        tracing::debug!(listener = %self.listener, worker = self.id, "UDP worker started");

        while !self.shutdown.load(Ordering::Acquire) {
            match self.socket.recv_from(&mut buf) {
                Ok((len, peer)) => {
                    self.metrics.message_received(len);
                    let identity = SessionIdentity::client(peer.ip().to_canonical().to_string());
                    self.pipeline.process_datagram(identity, &buf[..len]);
                }
                Err(e)
                    if matches!(
                        e.kind(),
                        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut | io::ErrorKind::Interrupted
                    ) => {}
                Err(e) => {
                    tracing::warn!(
                        listener = %self.listener,
                        worker = self.id,
                        error = %e,
                        "UDP receive error"
                    );
                    self.metrics.error();
                }
            }
        }

        self.metrics.connection_closed();
        tracing::debug!(listener = %self.listener, worker = self.id, "UDP worker stopped");
    }
}
