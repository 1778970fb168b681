//! Worker event loop
//!
//! Each worker owns one `mio` reactor watching its waker and the client
//! sockets handed to it. All decode/enrich/publish work for a connection
//! runs on its worker's thread, so sessions need no locking.

use std::collections::{HashMap, HashSet};
use std::io::{self, Read};
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use bytes::Bytes;
use crossbeam::queue::ArrayQueue;
use mio::net::TcpStream;
use mio::{Events, Interest, Poll, Token, Waker};
use sluice_pipeline::{Pipeline, SessionIdentity, SessionStore};

use crate::common::SourceMetrics;
use crate::socket;

/// Token for the worker's waker
const WAKER_TOKEN: Token = Token(0);

/// Starting token for connections
const CONNECTION_TOKEN_START: usize = 1;

/// Maximum events to process per poll
const MAX_EVENTS: usize = 256;

/// Reads per connection before yielding back to the reactor
const READ_BUDGET: usize = 16;

/// Default bound on the blocking greeting write
pub(crate) const GREETING_TIMEOUT: Duration = Duration::from_secs(5);

/// A newly accepted connection on its way from the acceptor to a worker
#[derive(Debug)]
pub(crate) struct Handoff {
    pub(crate) stream: TcpStream,
    pub(crate) peer: SocketAddr,
    /// Client address string, resolved once at accept
    pub(crate) client: String,
}

/// Acceptor-side view of a worker: its queue and how to wake it
#[derive(Debug)]
pub(crate) struct WorkerLink {
    pub(crate) queue: ArrayQueue<Handoff>,
    pub(crate) waker: Waker,
    pub(crate) assigned: AtomicU64,
}

impl WorkerLink {
    /// Queue `handoff` and wake the worker
    ///
    /// Returns the handoff back when the queue is full.
    pub(crate) fn hand_off(&self, handoff: Handoff) -> Result<(), Handoff> {
        self.queue.push(handoff)?;
        self.assigned.fetch_add(1, Ordering::Relaxed);
        if let Err(e) = self.waker.wake() {
            tracing::warn!(error = %e, "failed to wake worker");
        }
        Ok(())
    }
}

/// Settings a worker needs besides its queue
#[derive(Clone)]
pub(crate) struct WorkerContext {
    pub(crate) listener: String,
    pub(crate) pipeline: Arc<Pipeline>,
    pub(crate) metrics: Arc<SourceMetrics>,
    pub(crate) shutdown: Arc<AtomicBool>,
    pub(crate) greeting: Option<Bytes>,
    pub(crate) greeting_timeout: Duration,
    pub(crate) keepalive: bool,
    pub(crate) read_buffer_size: usize,
}

/// Why a connection is being closed
enum CloseReason {
    Peer,
    Failed(io::Error),
    Shutdown,
}

struct Connection {
    stream: TcpStream,
    peer: SocketAddr,
}

/// A worker's reactor and the connections it owns
pub(crate) struct Worker {
    id: usize,
    poll: Poll,
    link: Arc<WorkerLink>,
    ctx: WorkerContext,
    connections: HashMap<Token, Connection>,
    /// Connections that used up their read budget while still readable
    backlog: HashSet<Token>,
    sessions: SessionStore<Token>,
    next_token: usize,
    read_buf: Vec<u8>,
}

impl Worker {
    /// Create the worker's reactor and the link the acceptor hands off through
    pub(crate) fn new(
        id: usize,
        handoff_capacity: usize,
        ctx: WorkerContext,
    ) -> io::Result<(Self, Arc<WorkerLink>)> {
        let poll = Poll::new()?;
        let waker = Waker::new(poll.registry(), WAKER_TOKEN)?;
        let link = Arc::new(WorkerLink {
            queue: ArrayQueue::new(handoff_capacity.max(1)),
            waker,
            assigned: AtomicU64::new(0),
        });

        let worker = Self {
            id,
            poll,
            link: Arc::clone(&link),
            sessions: ctx.pipeline.session_store(),
            read_buf: vec![0u8; ctx.read_buffer_size.max(1)],
            ctx,
            connections: HashMap::new(),
            backlog: HashSet::new(),
            next_token: CONNECTION_TOKEN_START,
        };
        Ok((worker, link))
    }

    /// Run until the shutdown flag is observed
    pub(crate) fn run(mut self) {
        let mut events = Events::with_capacity(MAX_EVENTS);

        tracing::debug!(listener = %self.ctx.listener, worker = self.id, "worker started");

        loop {
            // readable sockets are edge-triggered; don't block while some are owed a read
            let timeout = if self.backlog.is_empty() {
                None
            } else {
                Some(Duration::ZERO)
            };
            if let Err(e) = self.poll.poll(&mut events, timeout) {
                if e.kind() == io::ErrorKind::Interrupted {
                    continue;
                }
                tracing::error!(
                    listener = %self.ctx.listener,
                    worker = self.id,
                    error = %e,
                    "worker poll failed"
                );
                self.ctx.metrics.error();
                break;
            }

            let mut ready: Vec<Token> = self.backlog.drain().collect();
            ready.extend(
                events
                    .iter()
                    .map(|event| event.token())
                    .filter(|token| *token != WAKER_TOKEN),
            );
            for token in ready {
                if self.ctx.shutdown.load(Ordering::Acquire) {
                    break;
                }
                if self.read_ready(token) {
                    self.backlog.insert(token);
                }
            }

            if self.ctx.shutdown.load(Ordering::Acquire) {
                break;
            }
            self.drain_handoffs();
        }

        self.close_all();
        tracing::debug!(listener = %self.ctx.listener, worker = self.id, "worker stopped");
    }

    fn drain_handoffs(&mut self) {
        while !self.ctx.shutdown.load(Ordering::Acquire)
            && let Some(handoff) = self.link.queue.pop()
        {
            self.register(handoff);
        }
    }

    fn register(&mut self, handoff: Handoff) {
        let Handoff {
            mut stream,
            peer,
            client,
        } = handoff;

        if self.ctx.keepalive {
            socket::enable_keepalive(&stream);
        }

        if let Some(greeting) = &self.ctx.greeting
            && let Err(e) = socket::send_blocking(&stream, greeting, self.ctx.greeting_timeout)
        {
            tracing::debug!(peer = %peer, error = %e, "greeting failed, dropping connection");
            self.ctx.metrics.error();
            return;
        }

        let token = Token(self.next_token);
        self.next_token = self.next_token.wrapping_add(1).max(CONNECTION_TOKEN_START);

        if let Err(e) = self
            .poll
            .registry()
            .register(&mut stream, token, Interest::READABLE)
        {
            tracing::warn!(peer = %peer, error = %e, "failed to register connection");
            self.ctx.metrics.error();
            return;
        }

        self.sessions
            .get_or_create(token, || SessionIdentity::client(client));
        self.ctx.pipeline.metrics().record_session_opened();
        self.connections.insert(token, Connection { stream, peer });
        self.ctx.metrics.connection_opened();

        tracing::debug!(listener = %self.ctx.listener, worker = self.id, peer = %peer, "connection registered");
    }

    /// Read until the socket would block or the budget runs out
    ///
    /// Returns true when the connection may still have data waiting.
    fn read_ready(&mut self, token: Token) -> bool {
        let mut reads = 0;
        while reads < READ_BUDGET {
            let Some(conn) = self.connections.get_mut(&token) else {
                return false;
            };

            match conn.stream.read(&mut self.read_buf) {
                Ok(0) => {
                    self.close(token, CloseReason::Peer);
                    return false;
                }
                Ok(n) => {
                    reads += 1;
                    self.ctx.metrics.message_received(n);
                    if let Some(session) = self.sessions.get_mut(&token) {
                        self.ctx.pipeline.process(session, &self.read_buf[..n]);
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return false,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    self.close(token, CloseReason::Failed(e));
                    return false;
                }
            }

            if self.ctx.shutdown.load(Ordering::Acquire) {
                return false;
            }
        }
        true
    }

    /// Unregister, close and flush one connection
    fn close(&mut self, token: Token, reason: CloseReason) {
        let Some(mut conn) = self.connections.remove(&token) else {
            return;
        };
        self.backlog.remove(&token);
        let _ = self.poll.registry().deregister(&mut conn.stream);

        match reason {
            CloseReason::Peer => tracing::debug!(peer = %conn.peer, "connection closed by peer"),
            CloseReason::Failed(e) => {
                self.ctx.metrics.error();
                tracing::debug!(peer = %conn.peer, error = %e, "connection failed");
            }
            CloseReason::Shutdown => tracing::debug!(peer = %conn.peer, "connection closed at shutdown"),
        }

        if let Some(mut session) = self.sessions.destroy(&token) {
            self.ctx.pipeline.finish(&mut session);
        }
        self.ctx.metrics.connection_closed();
    }

    fn close_all(&mut self) {
        let tokens: Vec<Token> = self.connections.keys().copied().collect();
        for token in tokens {
            self.close(token, CloseReason::Shutdown);
        }

        // Connections handed off but never registered are closed by drop.
        let mut dropped = 0usize;
        while self.link.queue.pop().is_some() {
            dropped += 1;
        }
        if dropped > 0 {
            tracing::debug!(
                listener = %self.ctx.listener,
                worker = self.id,
                dropped,
                "closed queued connections at shutdown"
            );
        }
    }
}
