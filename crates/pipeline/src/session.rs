//! Sessions and the per-worker session store
//!
//! A session holds the decode state of one logical byte stream: a TCP
//! connection, an HTTP request body or a single UDP datagram. Each session is
//! owned by exactly one thread, so nothing here is synchronized. Stores are
//! sharded per worker instead of shared.

use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;

use sluice_sinks::Message;

use crate::buffer::{DecodeBuffer, GrowthPolicy};
use crate::decoder::Scanner;

/// Key used for session and enrichment lookup
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionIdentity {
    /// Client address string
    pub client: String,
    /// Sensor UUID taken from the request, if any
    pub sensor_uuid: Option<String>,
    /// Topic taken from the request, if any
    pub topic: Option<String>,
}

impl SessionIdentity {
    /// Identity of a raw socket client
    pub fn client(client: impl Into<String>) -> Self {
        Self {
            client: client.into(),
            sensor_uuid: None,
            topic: None,
        }
    }

    /// Identity of a sensor posting to a topic
    pub fn sensor(
        client: impl Into<String>,
        sensor_uuid: impl Into<String>,
        topic: impl Into<String>,
    ) -> Self {
        Self {
            client: client.into(),
            sensor_uuid: Some(sensor_uuid.into()),
            topic: Some(topic.into()),
        }
    }

    /// Key into the enrichment database: the sensor UUID, else the client
    pub fn enrichment_key(&self) -> &str {
        self.sensor_uuid.as_deref().unwrap_or(&self.client)
    }
}

impl fmt::Display for SessionIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.sensor_uuid, &self.topic) {
            (Some(uuid), Some(topic)) => write!(f, "{}/{}@{}", uuid, topic, self.client),
            (Some(uuid), None) => write!(f, "{}@{}", uuid, self.client),
            _ => f.write_str(&self.client),
        }
    }
}

/// Session lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Accepting bytes
    Active,
    /// Buffer growth failed; input is ignored until the session is destroyed
    Faulted,
}

/// Decode state of one stream
#[derive(Debug)]
pub struct Session {
    identity: SessionIdentity,
    buffer: DecodeBuffer,
    scanner: Scanner,
    state: SessionState,
    batch: Vec<Message>,
}

impl Session {
    /// Create an active session with an empty buffer
    pub fn new(identity: SessionIdentity, policy: GrowthPolicy) -> Self {
        Self {
            identity,
            buffer: DecodeBuffer::new(policy),
            scanner: Scanner::default(),
            state: SessionState::Active,
            batch: Vec::new(),
        }
    }

    /// The session identity
    #[inline]
    pub fn identity(&self) -> &SessionIdentity {
        &self.identity
    }

    /// Current state
    #[inline]
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Whether the session has faulted
    #[inline]
    pub fn is_faulted(&self) -> bool {
        self.state == SessionState::Faulted
    }

    /// The decode buffer
    #[inline]
    pub fn buffer(&self) -> &DecodeBuffer {
        &self.buffer
    }

    #[inline]
    pub(crate) fn buffer_mut(&mut self) -> &mut DecodeBuffer {
        &mut self.buffer
    }

    /// Buffer and scan position, borrowed together by the decoder
    #[inline]
    pub(crate) fn decode_parts(&mut self) -> (&mut DecodeBuffer, &mut Scanner) {
        (&mut self.buffer, &mut self.scanner)
    }

    /// Mark the session faulted and free everything it holds
    pub fn fault(&mut self) {
        self.state = SessionState::Faulted;
        self.buffer.release();
        self.scanner.reset();
        self.batch.clear();
    }

    pub(crate) fn queue(&mut self, message: Message) {
        self.batch.push(message);
    }

    /// Take the output batch, leaving it empty
    pub fn take_batch(&mut self) -> Vec<Message> {
        std::mem::take(&mut self.batch)
    }
}

/// Sessions owned by one worker, keyed by connection
#[derive(Debug)]
pub struct SessionStore<K> {
    sessions: HashMap<K, Session>,
    policy: GrowthPolicy,
}

impl<K: Hash + Eq> SessionStore<K> {
    /// Create an empty store whose sessions use `policy`
    pub fn new(policy: GrowthPolicy) -> Self {
        Self {
            sessions: HashMap::new(),
            policy,
        }
    }

    /// Return the live session for `key`, creating it on first use
    pub fn get_or_create(
        &mut self,
        key: K,
        identity: impl FnOnce() -> SessionIdentity,
    ) -> &mut Session {
        let policy = self.policy;
        self.sessions
            .entry(key)
            .or_insert_with(|| Session::new(identity(), policy))
    }

    /// Live session for `key`
    pub fn get_mut(&mut self, key: &K) -> Option<&mut Session> {
        self.sessions.get_mut(key)
    }

    /// Remove a session, returning it so the caller can flush it
    pub fn destroy(&mut self, key: &K) -> Option<Session> {
        self.sessions.remove(key)
    }

    /// Number of live sessions
    #[inline]
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Whether no session is live
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
