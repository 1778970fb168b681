//! TCP listener - connection distributor
//!
//! One acceptor thread watches the listening socket with its own `mio`
//! reactor. Accepted connections are checked against the blacklist, then
//! handed round-robin to a fixed pool of [worker](crate::worker) reactors
//! through bounded per-worker queues.
//!
//! # Lifecycle
//!
//! ```text
//! INIT ──start()──→ LISTENING ──shutdown()──→ SHUTTING_DOWN ──join──→ STOPPED
//! ```
//!
//! Shutdown sets a shared flag and wakes the acceptor, which breaks out of
//! its loop. Every worker is then woken once more so idle workers observe
//! the flag, and all threads are joined.
//!
//! # Backpressure
//!
//! Handoff queues are bounded. When the chosen worker's queue is full the
//! new connection is closed at the acceptor and counted as rejected.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use bytes::Bytes;
use mio::net::TcpListener;
use mio::{Events, Interest, Poll, Token, Waker};
use sluice_pipeline::Pipeline;

use crate::blacklist::Blacklist;
use crate::common::{ListenerState, ReactorMode, SourceMetrics, StateCell, clamp_workers};
use crate::error::ListenerError;
use crate::socket;
use crate::worker::{GREETING_TIMEOUT, Handoff, Worker, WorkerContext, WorkerLink};

/// Token for the TCP listener
const LISTENER_TOKEN: Token = Token(0);

/// Token for the acceptor's waker
const WAKER_TOKEN: Token = Token(1);

/// Maximum events to process per poll
const MAX_EVENTS: usize = 128;

/// Default TCP port
const DEFAULT_PORT: u16 = 2056;

/// Default per-worker handoff queue bound
const DEFAULT_HANDOFF_CAPACITY: usize = 1024;

/// Default per-read buffer size
const DEFAULT_READ_BUFFER_SIZE: usize = 4096;

/// TCP listener configuration
#[derive(Debug, Clone)]
pub struct TcpListenerConfig {
    /// Listener name for logs and metrics
    pub id: String,

    /// Bind address (e.g., "0.0.0.0")
    pub address: String,

    /// Listen port (0 picks an ephemeral port)
    pub port: u16,

    /// Number of worker reactors
    pub num_threads: usize,

    /// Requested readiness strategy
    pub mode: ReactorMode,

    /// Enable SO_KEEPALIVE on accepted connections
    pub keepalive: bool,

    /// Per-worker handoff queue bound
    pub handoff_capacity: usize,

    /// Bytes read per receive call
    pub read_buffer_size: usize,

    /// Payload sent once to every accepted connection
    pub greeting: Option<Bytes>,

    /// Bound on the greeting write; the connection is dropped past it
    pub greeting_timeout: Duration,
}

impl Default for TcpListenerConfig {
    fn default() -> Self {
        Self {
            id: "tcp".into(),
            address: "0.0.0.0".into(),
            port: DEFAULT_PORT,
            num_threads: 1,
            mode: ReactorMode::default(),
            keepalive: false,
            handoff_capacity: DEFAULT_HANDOFF_CAPACITY,
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
            greeting: None,
            greeting_timeout: GREETING_TIMEOUT,
        }
    }
}

impl TcpListenerConfig {
    /// Create config with a specific port
    pub fn with_port(port: u16) -> Self {
        Self {
            port,
            ..Default::default()
        }
    }
}

/// Hands out worker indices `0, 1, .., n-1, 0, ..`
#[derive(Debug)]
pub(crate) struct RoundRobin {
    next: usize,
    n: usize,
}

impl RoundRobin {
    pub(crate) fn new(n: usize) -> Self {
        Self { next: 0, n: n.max(1) }
    }

    pub(crate) fn next_index(&mut self) -> usize {
        let index = self.next;
        self.next = (self.next + 1) % self.n;
        index
    }
}

/// A running TCP listener
#[derive(Debug)]
pub struct TcpDistributor {
    id: String,
    local_addr: SocketAddr,
    state: Arc<StateCell>,
    shutdown: Arc<AtomicBool>,
    acceptor_waker: Arc<Waker>,
    acceptor: Option<JoinHandle<()>>,
    links: Arc<Vec<Arc<WorkerLink>>>,
    workers: Vec<JoinHandle<()>>,
    metrics: Arc<SourceMetrics>,
}

impl TcpDistributor {
    /// Bind, start the workers and the acceptor
    ///
    /// # Errors
    ///
    /// Fails for thread-per-connection mode, an unresolvable or busy
    /// address, or when a reactor or thread cannot be created.
    pub fn start(
        config: TcpListenerConfig,
        pipeline: Arc<Pipeline>,
        blacklist: Arc<Blacklist>,
    ) -> Result<Self, ListenerError> {
        if config.mode == ReactorMode::ThreadPerConnection {
            return Err(ListenerError::UnsupportedMode {
                protocol: "tcp",
                mode: config.mode,
            });
        }

        let state = Arc::new(StateCell::new());
        let num_workers = clamp_workers(&config.id, config.num_threads);

        let addr = socket::resolve(&config.address, config.port)?;
        let std_listener = socket::bind_tcp(addr)?;
        let local_addr = std_listener.local_addr()?;
        let mut listener = TcpListener::from_std(std_listener);

        let poll = Poll::new()?;
        poll.registry()
            .register(&mut listener, LISTENER_TOKEN, Interest::READABLE)?;
        let acceptor_waker = Arc::new(Waker::new(poll.registry(), WAKER_TOKEN)?);

        let shutdown = Arc::new(AtomicBool::new(false));
        let metrics = Arc::new(SourceMetrics::new());
        let ctx = WorkerContext {
            listener: config.id.clone(),
            pipeline,
            metrics: Arc::clone(&metrics),
            shutdown: Arc::clone(&shutdown),
            greeting: config.greeting.clone(),
            greeting_timeout: config.greeting_timeout,
            keepalive: config.keepalive,
            read_buffer_size: config.read_buffer_size,
        };

        let mut links = Vec::with_capacity(num_workers);
        let mut workers = Vec::with_capacity(num_workers);
        for id in 0..num_workers {
            let spawned =
                Worker::new(id, config.handoff_capacity, ctx.clone()).and_then(|(worker, link)| {
                    thread::Builder::new()
                        .name(format!("{}-worker-{id}", config.id))
                        .spawn(move || worker.run())
                        .map(|handle| (handle, link))
                });

            match spawned {
                Ok((handle, link)) => {
                    links.push(link);
                    workers.push(handle);
                }
                Err(e) => {
                    stop_workers(&shutdown, &links, workers);
                    return Err(e.into());
                }
            }
        }
        let links = Arc::new(links);

        let acceptor = Acceptor {
            id: config.id.clone(),
            poll,
            listener,
            links: Arc::clone(&links),
            blacklist,
            shutdown: Arc::clone(&shutdown),
            metrics: Arc::clone(&metrics),
            round_robin: RoundRobin::new(num_workers),
        };
        let acceptor = match thread::Builder::new()
            .name(format!("{}-acceptor", config.id))
            .spawn(move || acceptor.run())
        {
            Ok(handle) => handle,
            Err(e) => {
                stop_workers(&shutdown, &links, workers);
                return Err(e.into());
            }
        };

        state.set(ListenerState::Listening);
        tracing::info!(
            listener = %config.id,
            address = %local_addr,
            workers = num_workers,
            mode = %config.mode,
            "TCP listener listening"
        );

        Ok(Self {
            id: config.id,
            local_addr,
            state,
            shutdown,
            acceptor_waker,
            acceptor: Some(acceptor),
            links,
            workers,
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

    /// Listener counters
    pub fn metrics(&self) -> &Arc<SourceMetrics> {
        &self.metrics
    }

    /// Number of worker reactors
    pub fn num_workers(&self) -> usize {
        self.links.len()
    }

    /// Connections handed to each worker so far
    pub fn worker_assignments(&self) -> Vec<u64> {
        self.links
            .iter()
            .map(|link| link.assigned.load(Ordering::Relaxed))
            .collect()
    }

    /// Stop accepting, stop every worker and join all threads
    ///
    /// Idempotent. Open connections are flushed and closed by their workers.
    pub fn shutdown(&mut self) {
        let Some(acceptor) = self.acceptor.take() else {
            return;
        };

        self.state.set(ListenerState::ShuttingDown);
        self.shutdown.store(true, Ordering::Release);
        if let Err(e) = self.acceptor_waker.wake() {
            tracing::warn!(listener = %self.id, error = %e, "failed to wake acceptor");
        }
        if acceptor.join().is_err() {
            tracing::error!(listener = %self.id, "acceptor thread panicked");
        }

        stop_workers(&self.shutdown, &self.links, std::mem::take(&mut self.workers));

        self.state.set(ListenerState::Stopped);
        tracing::info!(listener = %self.id, "TCP listener stopped");
    }
}

impl Drop for TcpDistributor {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Wake every worker with the shutdown flag set and join them
fn stop_workers(shutdown: &AtomicBool, links: &[Arc<WorkerLink>], workers: Vec<JoinHandle<()>>) {
    shutdown.store(true, Ordering::Release);
    for link in links {
        if let Err(e) = link.waker.wake() {
            tracing::warn!(error = %e, "failed to wake worker");
        }
    }
    for handle in workers {
        if handle.join().is_err() {
            tracing::error!("worker thread panicked");
        }
    }
}

/// Acceptor thread state
struct Acceptor {
    id: String,
    poll: Poll,
    listener: TcpListener,
    links: Arc<Vec<Arc<WorkerLink>>>,
    blacklist: Arc<Blacklist>,
    shutdown: Arc<AtomicBool>,
    metrics: Arc<SourceMetrics>,
    round_robin: RoundRobin,
}

impl Acceptor {
    fn run(mut self) {
        let mut events = Events::with_capacity(MAX_EVENTS);

        loop {
            if let Err(e) = self.poll.poll(&mut events, None) {
                if e.kind() == io::ErrorKind::Interrupted {
                    continue;
                }
                tracing::error!(listener = %self.id, error = %e, "acceptor poll failed");
                self.metrics.error();
                break;
            }

            if self.shutdown.load(Ordering::Acquire) {
                break;
            }

            for event in events.iter() {
                if event.token() == LISTENER_TOKEN {
                    self.accept_ready();
                }
            }
        }

        let _ = self.poll.registry().deregister(&mut self.listener);
        tracing::debug!(listener = %self.id, "acceptor stopped");
    }

    /// Accept until the socket would block
    fn accept_ready(&mut self) {
        loop {
            match self.listener.accept() {
                Ok((stream, peer)) => self.dispatch(stream, peer),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    tracing::warn!(listener = %self.id, error = %e, "accept error");
                    self.metrics.error();
                    return;
                }
            }
        }
    }

    fn dispatch(&mut self, stream: mio::net::TcpStream, peer: SocketAddr) {
        if self.blacklist.contains(peer.ip()) {
            tracing::debug!(listener = %self.id, peer = %peer, "blacklisted client rejected");
            self.metrics.connection_rejected();
            return;
        }

        let index = self.round_robin.next_index();
        let handoff = Handoff {
            stream,
            peer,
            client: peer.ip().to_canonical().to_string(),
        };

        if let Err(handoff) = self.links[index].hand_off(handoff) {
            tracing::warn!(
                listener = %self.id,
                worker = index,
                peer = %handoff.peer,
                "handoff queue full, closing connection"
            );
            self.metrics.connection_rejected();
        }
    }
}
