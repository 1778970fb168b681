//! TCP listener tests

use std::io::{ErrorKind, Read, Write};
use std::net::{Shutdown, TcpStream};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use bytes::Bytes;
use crossbeam::channel::Receiver;
use serde_json::{Value, json};
use sluice_pipeline::{EnrichmentDb, Pipeline, PipelineConfig, SharedEnrichment};
use sluice_sinks::{ChannelSink, Message, NullSink};

use crate::blacklist::Blacklist;
use crate::common::{ListenerState, ReactorMode};
use crate::error::ListenerError;
use crate::tcp::{TcpDistributor, TcpListenerConfig};

// ============================================================================
// Helper Functions
// ============================================================================

const RECV_TIMEOUT: Duration = Duration::from_secs(5);

fn test_pipeline() -> (Arc<Pipeline>, Receiver<Message>) {
    let db = EnrichmentDb::from_value(json!({
        "uuids": {"127.0.0.1": {"site": "lab"}}
    }))
    .unwrap();
    let (sink, rx) = ChannelSink::unbounded();
    let pipeline = Pipeline::new(
        PipelineConfig::default(),
        SharedEnrichment::new(db),
        Arc::new(sink),
    );
    (Arc::new(pipeline), rx)
}

fn local_config(num_threads: usize) -> TcpListenerConfig {
    TcpListenerConfig {
        id: "tcp-test".into(),
        address: "127.0.0.1".into(),
        num_threads,
        ..TcpListenerConfig::with_port(0)
    }
}

fn start(config: TcpListenerConfig, blacklist: Blacklist) -> (TcpDistributor, Receiver<Message>) {
    let (pipeline, rx) = test_pipeline();
    let listener = TcpDistributor::start(config, pipeline, Arc::new(blacklist)).unwrap();
    (listener, rx)
}

fn wait_until(cond: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + RECV_TIMEOUT;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    cond()
}

fn payload(message: &Message) -> Value {
    serde_json::from_slice(&message.payload).unwrap()
}

/// Read until the server side closes; fails on timeout
fn assert_closed(stream: &mut TcpStream) {
    stream.set_read_timeout(Some(RECV_TIMEOUT)).unwrap();
    let mut buf = [0u8; 4096];
    loop {
        match stream.read(&mut buf) {
            Ok(0) => return,
            Ok(_) => continue,
            Err(e) if matches!(e.kind(), ErrorKind::ConnectionReset | ErrorKind::ConnectionAborted) => {
                return;
            }
            Err(e) => panic!("connection still open: {e}"),
        }
    }
}

/// Client threads writing complete records as fast as the socket allows
fn flood(addr: std::net::SocketAddr, clients: usize, stop: &Arc<AtomicBool>) -> Vec<JoinHandle<()>> {
    let batch = br#"{"a":1}"#.repeat(8192);
    (0..clients)
        .map(|_| {
            let stop = Arc::clone(stop);
            let batch = batch.clone();
            thread::spawn(move || {
                let Ok(mut stream) = TcpStream::connect(addr) else {
                    return;
                };
                while !stop.load(Ordering::Relaxed) {
                    if stream.write_all(&batch).is_err() {
                        return;
                    }
                }
            })
        })
        .collect()
}

/// Listener whose single worker stalls on a greeting the client never reads
fn stalled_worker(greeting_timeout: Duration) -> (TcpDistributor, TcpStream) {
    let config = TcpListenerConfig {
        handoff_capacity: 1,
        greeting: Some(Bytes::from(vec![b'g'; 32 << 20])),
        greeting_timeout,
        ..local_config(1)
    };
    let (listener, _rx) = start(config, Blacklist::new());

    let mut first = TcpStream::connect(listener.local_addr()).unwrap();
    first.set_read_timeout(Some(RECV_TIMEOUT)).unwrap();
    let mut byte = [0u8; 1];
    first.read_exact(&mut byte).unwrap();
    assert_eq!(&byte, b"g");

    (listener, first)
}

// ============================================================================
// Startup
// ============================================================================

#[test]
fn test_start_reports_listening() {
    let (mut listener, _rx) = start(local_config(2), Blacklist::new());

    assert_eq!(listener.state(), ListenerState::Listening);
    assert_eq!(listener.num_workers(), 2);
    assert_ne!(listener.local_addr().port(), 0);

    listener.shutdown();
    assert_eq!(listener.state(), ListenerState::Stopped);
}

#[test]
fn test_thread_per_connection_fails_fast() {
    let (pipeline, _rx) = test_pipeline();
    let config = TcpListenerConfig {
        mode: ReactorMode::ThreadPerConnection,
        ..local_config(1)
    };

    let result = TcpDistributor::start(config, pipeline, Arc::new(Blacklist::new()));
    assert!(matches!(
        result,
        Err(ListenerError::UnsupportedMode { protocol: "tcp", .. })
    ));
}

#[test]
fn test_port_in_use() {
    let (first, _rx) = start(local_config(1), Blacklist::new());
    let (pipeline, _rx2) = test_pipeline();
    let config = TcpListenerConfig {
        port: first.local_addr().port(),
        ..local_config(1)
    };

    let result = TcpDistributor::start(config, pipeline, Arc::new(Blacklist::new()));
    assert!(matches!(result, Err(ListenerError::Bind { .. })));
}

#[test]
fn test_worker_count_clamped() {
    let (listener, _rx) = start(local_config(0), Blacklist::new());
    assert_eq!(listener.num_workers(), 1);
}

// ============================================================================
// Distribution
// ============================================================================

#[test]
fn test_round_robin_assignment() {
    let (listener, _rx) = start(local_config(3), Blacklist::new());
    let mut order = Vec::new();
    let mut clients = Vec::new();

    for i in 0..7u64 {
        let before = listener.worker_assignments();
        clients.push(TcpStream::connect(listener.local_addr()).unwrap());
        assert!(wait_until(|| listener.worker_assignments().iter().sum::<u64>() == i + 1));

        let after = listener.worker_assignments();
        let worker = (0..after.len()).find(|&w| after[w] > before[w]).unwrap();
        order.push(worker);
    }

    assert_eq!(order, vec![0, 1, 2, 0, 1, 2, 0]);
    assert_eq!(listener.worker_assignments(), vec![3, 2, 2]);
    assert!(wait_until(|| listener.metrics().snapshot().connections_active == 7));
}

#[test]
fn test_blacklisted_client_rejected() {
    let blacklist: Blacklist = ["127.0.0.0/8".parse().unwrap()].into_iter().collect();
    let (listener, rx) = start(local_config(2), blacklist);

    let mut client = TcpStream::connect(listener.local_addr()).unwrap();
    client.set_read_timeout(Some(RECV_TIMEOUT)).unwrap();
    let _ = client.write_all(br#"{"a":1}"#);

    let mut buf = [0u8; 16];
    match client.read(&mut buf) {
        Ok(n) => assert_eq!(n, 0),
        Err(e) => assert!(
            matches!(e.kind(), ErrorKind::ConnectionReset | ErrorKind::ConnectionAborted),
            "{e}"
        ),
    }

    assert!(wait_until(|| listener.metrics().snapshot().connections_rejected == 1));
    assert_eq!(listener.worker_assignments(), vec![0, 0]);
    assert_eq!(listener.metrics().snapshot().connections_total, 0);
    assert!(rx.try_recv().is_err());
}

#[test]
fn test_full_handoff_queue_rejects_connection() {
    let (listener, _first) = stalled_worker(Duration::from_secs(3));

    // the worker is busy greeting `first`; this one waits in the queue
    let _queued = TcpStream::connect(listener.local_addr()).unwrap();
    assert!(wait_until(|| listener.worker_assignments() == vec![2]));

    let mut overflow = TcpStream::connect(listener.local_addr()).unwrap();
    assert!(wait_until(|| listener.metrics().snapshot().connections_rejected == 1));
    assert_closed(&mut overflow);
    assert_eq!(listener.worker_assignments(), vec![2]);
}

// ============================================================================
// Worker I/O
// ============================================================================

#[test]
fn test_values_split_across_reads() {
    let (listener, rx) = start(local_config(2), Blacklist::new());

    let mut client = TcpStream::connect(listener.local_addr()).unwrap();
    client.write_all(br#"{"a":"#).unwrap();
    client.flush().unwrap();
    std::thread::sleep(Duration::from_millis(50));
    client.write_all(br#"1}{"b":"x"}"#).unwrap();

    let first = rx.recv_timeout(RECV_TIMEOUT).unwrap();
    let second = rx.recv_timeout(RECV_TIMEOUT).unwrap();
    assert_eq!(first.topic, "sluice");
    assert_eq!(payload(&first), json!({"a": 1, "site": "lab"}));
    assert_eq!(payload(&second), json!({"b": "x", "site": "lab"}));
}

#[test]
fn test_peer_close_flushes_session() {
    let (listener, rx) = start(local_config(1), Blacklist::new());

    let mut client = TcpStream::connect(listener.local_addr()).unwrap();
    client.write_all(b"42").unwrap();
    client.shutdown(Shutdown::Write).unwrap();

    let message = rx.recv_timeout(RECV_TIMEOUT).unwrap();
    assert_eq!(message.payload, b"42");

    assert!(wait_until(|| {
        let snapshot = listener.metrics().snapshot();
        snapshot.connections_total == 1 && snapshot.connections_active == 0
    }));
}

#[test]
fn test_incomplete_tail_discarded_on_close() {
    let (listener, rx) = start(local_config(1), Blacklist::new());

    let mut client = TcpStream::connect(listener.local_addr()).unwrap();
    client.write_all(br#"{"done":true}{"half":"#).unwrap();
    drop(client);

    assert_eq!(payload(&rx.recv_timeout(RECV_TIMEOUT).unwrap())["done"], true);
    assert!(wait_until(|| listener.metrics().snapshot().connections_active == 0
        && listener.metrics().snapshot().connections_total == 1));
    assert!(rx.try_recv().is_err());
}

#[test]
fn test_greeting_sent_once() {
    let config = TcpListenerConfig {
        greeting: Some(Bytes::from_static(b"hello\n")),
        ..local_config(1)
    };
    let (listener, rx) = start(config, Blacklist::new());

    let mut client = TcpStream::connect(listener.local_addr()).unwrap();
    client.set_read_timeout(Some(RECV_TIMEOUT)).unwrap();
    let mut greeting = [0u8; 6];
    client.read_exact(&mut greeting).unwrap();
    assert_eq!(&greeting, b"hello\n");

    client.write_all(br#"{"after":"greeting"}"#).unwrap();
    assert_eq!(
        payload(&rx.recv_timeout(RECV_TIMEOUT).unwrap())["after"],
        "greeting"
    );
}

#[test]
fn test_busy_connection_does_not_starve_others() {
    let (mut listener, rx) = start(local_config(1), Blacklist::new());
    let stop = Arc::new(AtomicBool::new(false));
    let writers = flood(listener.local_addr(), 1, &stop);
    assert!(rx.recv_timeout(RECV_TIMEOUT).is_ok());

    let mut quiet = TcpStream::connect(listener.local_addr()).unwrap();
    quiet.write_all(br#"{"quiet":true}"#).unwrap();
    let registered = wait_until(|| listener.metrics().snapshot().connections_active == 2);

    let deadline = Instant::now() + RECV_TIMEOUT;
    let mut seen = false;
    while registered && !seen && Instant::now() < deadline {
        if let Ok(message) = rx.recv_timeout(Duration::from_millis(100)) {
            seen = message.payload.windows(7).any(|w| w == b"\"quiet\"");
        }
    }

    stop.store(true, Ordering::Relaxed);
    listener.shutdown();
    for writer in writers {
        writer.join().unwrap();
    }
    assert!(registered, "second connection was never registered");
    assert!(seen, "second connection was never read");
}

// ============================================================================
// Shutdown
// ============================================================================

#[test]
fn test_shutdown_closes_connections_and_joins() {
    let (mut listener, rx) = start(local_config(2), Blacklist::new());

    let mut a = TcpStream::connect(listener.local_addr()).unwrap();
    let mut b = TcpStream::connect(listener.local_addr()).unwrap();
    a.write_all(br#"{"a":1}"#).unwrap();
    b.write_all(br#"{"b":"#).unwrap();

    assert_eq!(payload(&rx.recv_timeout(RECV_TIMEOUT).unwrap())["a"], 1);
    assert!(wait_until(|| listener.metrics().snapshot().connections_active == 2));

    let started = Instant::now();
    listener.shutdown();
    assert!(started.elapsed() < Duration::from_secs(2));
    assert_eq!(listener.state(), ListenerState::Stopped);
    assert_eq!(listener.metrics().snapshot().connections_active, 0);

    // The half-written value on `b` was discarded, not published.
    assert!(rx.try_recv().is_err());

    b.set_read_timeout(Some(RECV_TIMEOUT)).unwrap();
    let mut buf = [0u8; 1];
    assert!(matches!(b.read(&mut buf), Ok(0) | Err(_)));

    // Idempotent
    listener.shutdown();
    assert_eq!(listener.state(), ListenerState::Stopped);
}

#[test]
fn test_shutdown_bounded_under_continuous_writes() {
    let pipeline = Arc::new(Pipeline::new(
        PipelineConfig::default(),
        SharedEnrichment::new(EnrichmentDb::new()),
        Arc::new(NullSink::new()),
    ));
    let mut listener =
        TcpDistributor::start(local_config(1), pipeline, Arc::new(Blacklist::new())).unwrap();

    let stop = Arc::new(AtomicBool::new(false));
    let writers = flood(listener.local_addr(), 4, &stop);
    assert!(wait_until(|| listener.metrics().snapshot().messages_received > 64));

    let (done_tx, done_rx) = crossbeam::channel::bounded(1);
    let stopper = thread::spawn(move || {
        listener.shutdown();
        let _ = done_tx.send(listener.state());
        listener
    });

    let state = done_rx.recv_timeout(RECV_TIMEOUT);
    stop.store(true, Ordering::Relaxed);
    assert_eq!(state, Ok(ListenerState::Stopped));

    let listener = stopper.join().unwrap();
    assert_eq!(listener.metrics().snapshot().connections_active, 0);
    for writer in writers {
        writer.join().unwrap();
    }
}

#[test]
fn test_queued_handoffs_closed_at_shutdown() {
    let (mut listener, _first) = stalled_worker(Duration::from_secs(2));

    let mut queued = TcpStream::connect(listener.local_addr()).unwrap();
    assert!(wait_until(|| listener.worker_assignments() == vec![2]));

    let started = Instant::now();
    listener.shutdown();
    assert!(started.elapsed() < RECV_TIMEOUT);
    assert_eq!(listener.state(), ListenerState::Stopped);

    assert_closed(&mut queued);
    assert_eq!(listener.metrics().snapshot().connections_active, 0);
}

#[test]
fn test_shutdown_stops_accepting() {
    let (mut listener, _rx) = start(local_config(1), Blacklist::new());
    let addr = listener.local_addr();
    listener.shutdown();

    assert!(TcpStream::connect_timeout(&addr, Duration::from_millis(500)).is_err());
}
