//! Socket setup shared by the listeners

use std::io::{self, Write};
use std::net::{SocketAddr, ToSocketAddrs};
use std::time::Duration;

use socket2::{Domain, Protocol, SockRef, Socket, TcpKeepalive, Type};

use crate::error::ListenerError;

/// Backlog passed to `listen(2)`
const LISTEN_BACKLOG: i32 = 1024;

/// Resolve `address:port` to the first socket address
pub(crate) fn resolve(address: &str, port: u16) -> Result<SocketAddr, ListenerError> {
    (address, port)
        .to_socket_addrs()
        .ok()
        .and_then(|mut addrs| addrs.next())
        .ok_or_else(|| ListenerError::InvalidAddress(format!("{address}:{port}")))
}

/// Bind a non-blocking TCP listening socket with `SO_REUSEADDR`
pub(crate) fn bind_tcp(addr: SocketAddr) -> Result<std::net::TcpListener, ListenerError> {
    let bind_err = |source| ListenerError::Bind {
        address: addr.to_string(),
        source,
    };

    let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))?;
    socket.set_reuse_address(true)?;
    socket.bind(&addr.into()).map_err(bind_err)?;
    socket.listen(LISTEN_BACKLOG).map_err(bind_err)?;
    socket.set_nonblocking(true)?;

    Ok(socket.into())
}

/// Bind a UDP socket with a receive timeout
///
/// Every worker binds its own socket to the same address; `SO_REUSEPORT`
/// lets the kernel spread datagrams across them.
pub(crate) fn bind_udp(
    addr: SocketAddr,
    read_timeout: Duration,
) -> Result<std::net::UdpSocket, ListenerError> {
    let socket = Socket::new(Domain::for_address(addr), Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_reuse_address(true)?;
    #[cfg(all(unix, not(any(target_os = "solaris", target_os = "illumos"))))]
    socket.set_reuse_port(true)?;
    socket.set_read_timeout(Some(read_timeout))?;
    socket
        .bind(&addr.into())
        .map_err(|source| ListenerError::Bind {
            address: addr.to_string(),
            source,
        })?;

    Ok(socket.into())
}

/// Enable TCP keepalive probes on an accepted connection
pub(crate) fn enable_keepalive<S>(stream: &S)
where
    for<'a> SockRef<'a>: From<&'a S>,
{
    let keepalive = TcpKeepalive::new()
        .with_time(Duration::from_secs(60))
        .with_interval(Duration::from_secs(10));

    if let Err(e) = SockRef::from(stream).set_tcp_keepalive(&keepalive) {
        tracing::debug!(error = %e, "failed to set TCP keepalive");
    }
}

/// Write `payload` fully, blocking for at most `timeout`
///
/// The socket is switched to blocking mode for the write and restored to
/// non-blocking afterwards.
pub(crate) fn send_blocking<S>(stream: &S, payload: &[u8], timeout: Duration) -> io::Result<()>
where
    for<'a> SockRef<'a>: From<&'a S>,
{
    let socket = SockRef::from(stream);
    socket.set_nonblocking(false)?;
    socket.set_write_timeout(Some(timeout))?;

    let mut writer: &Socket = &socket;
    let written = writer.write_all(payload);

    socket.set_write_timeout(None)?;
    socket.set_nonblocking(true)?;
    written
}
