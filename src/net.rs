//! Socket helpers
//!
//! Thin wrappers over `socket2` and `nix::poll` shared by the client and the
//! server: connecting and listening with the options FTP needs, bounded
//! readiness waits, type-of-service marking and urgent data.

use std::io;
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::os::fd::{AsFd, BorrowedFd};
use std::time::Duration;

use log::{debug, warn};
use nix::errno::Errno;
use nix::poll::{PollFd, PollFlags, PollTimeout, poll};
use socket2::{Domain, Protocol, SockAddr, SockRef, Socket, Type};

pub const IPTOS_LOWDELAY: u32 = 0x10;
pub const IPTOS_THROUGHPUT: u32 = 0x08;

fn stream_socket(addr: &SocketAddr) -> io::Result<Socket> {
    Socket::new(Domain::for_address(*addr), Type::STREAM, Some(Protocol::TCP))
}

/// Connects to `remote`, optionally binding `local` first.
///
/// `reuse` sets `SO_REUSEADDR` before binding so the local port can be
/// shared with a listener (default data port mode).
pub fn connect(
    remote: SocketAddr,
    local: Option<SocketAddr>,
    timeout: Option<Duration>,
    reuse: bool,
) -> io::Result<TcpStream> {
    let socket = stream_socket(&remote)?;
    if reuse {
        socket.set_reuse_address(true)?;
    }
    if let Some(local) = local {
        socket.bind(&SockAddr::from(local))?;
    }

    let target = SockAddr::from(remote);
    match timeout {
        Some(limit) => socket.connect_timeout(&target, limit)?,
        None => socket.connect(&target)?,
    }

    Ok(socket.into())
}

/// Binds and listens on `addr` (port 0 lets the system pick).
pub fn listen(addr: SocketAddr, reuse: bool, backlog: i32) -> io::Result<TcpListener> {
    let socket = stream_socket(&addr)?;
    if reuse {
        socket.set_reuse_address(true)?;
    }
    socket.bind(&SockAddr::from(addr))?;
    socket.listen(backlog)?;
    Ok(socket.into())
}

/// Waits until any of `fds` is readable or `timeout` elapses.
///
/// Returns one flag per descriptor; all false means the wait timed out.
/// Hang-up and error conditions count as readable so the caller's next read
/// observes them.
pub fn wait_readable(fds: &[BorrowedFd<'_>], timeout: Duration) -> io::Result<Vec<bool>> {
    let mut pollfds: Vec<PollFd<'_>> = fds
        .iter()
        .map(|fd| PollFd::new(*fd, PollFlags::POLLIN | PollFlags::POLLPRI))
        .collect();
    let millis = timeout.as_millis().min(i32::MAX as u128) as i32;

    loop {
        let limit = PollTimeout::try_from(millis).unwrap_or(PollTimeout::MAX);
        match poll(&mut pollfds, limit) {
            Ok(_) => break,
            Err(Errno::EINTR) => continue,
            Err(e) => return Err(io::Error::from(e)),
        }
    }

    let mask = PollFlags::POLLIN | PollFlags::POLLPRI | PollFlags::POLLHUP | PollFlags::POLLERR;
    Ok(pollfds
        .iter()
        .map(|p| p.revents().is_some_and(|r| r.intersects(mask)))
        .collect())
}

/// Accepts exactly one connection, giving up after `timeout`.
pub fn accept_timeout(
    listener: &TcpListener,
    timeout: Duration,
) -> io::Result<(TcpStream, SocketAddr)> {
    let ready = wait_readable(&[listener.as_fd()], timeout)?;
    if !ready.first().copied().unwrap_or(false) {
        return Err(io::Error::new(
            io::ErrorKind::TimedOut,
            "timed out waiting for data connection",
        ));
    }
    listener.accept()
}

/// Marks an IPv4 socket with the given type of service. Failures are only
/// logged.
pub fn set_type_of_service(stream: &TcpStream, tos: u32) {
    let is_v4 = matches!(stream.peer_addr(), Ok(SocketAddr::V4(_)));
    if !is_v4 {
        return;
    }
    if let Err(e) = SockRef::from(stream).set_tos_v4(tos) {
        warn!("setsockopt TOS (ignored): {}", e);
    }
}

/// Prepares an established data connection: throughput TOS, keepalive and
/// short I/O timeouts so blocking transfers can notice interrupts.
pub fn tune_data_stream(stream: &TcpStream, poll_interval: Duration) -> io::Result<()> {
    set_type_of_service(stream, IPTOS_THROUGHPUT);
    if let Err(e) = SockRef::from(stream).set_keepalive(true) {
        debug!("setsockopt SO_KEEPALIVE (ignored): {}", e);
    }
    stream.set_read_timeout(Some(poll_interval))?;
    stream.set_write_timeout(Some(poll_interval))?;
    Ok(())
}

/// Keeps urgent data inline so an interrupt sequence stays in command order.
pub fn set_oob_inline(stream: &TcpStream) -> io::Result<()> {
    SockRef::from(stream).set_out_of_band_inline(true)
}

/// Sends `buf` as TCP urgent data.
pub fn send_urgent(stream: &TcpStream, buf: &[u8]) -> io::Result<usize> {
    SockRef::from(stream).send_out_of_band(buf)
}

/// True for the error kinds a socket timeout produces.
pub fn is_timeout(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
    )
}
