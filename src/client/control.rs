//! Client control connection
//!
//! Owns the command socket: writes commands (logged with secrets masked),
//! reads replies through the reply parser and tracks whether a reply is
//! still outstanding.

use std::borrow::Cow;
use std::io::{self, BufReader, Write};
use std::net::{SocketAddr, TcpStream};
use std::os::fd::{AsFd, BorrowedFd};
use std::time::Duration;

use log::debug;

use crate::net;
use crate::protocol::address::canonical;
use crate::protocol::{Reply, ReplyClass, read_reply};

/// Hides the argument of commands that carry secrets.
fn masked(line: &str) -> Cow<'_, str> {
    let verb = line.split(' ').next().unwrap_or("");
    if verb.eq_ignore_ascii_case("PASS") || verb.eq_ignore_ascii_case("ACCT") {
        Cow::Owned(format!("{} XXXX", verb))
    } else {
        Cow::Borrowed(line)
    }
}

pub struct ControlConnection {
    reader: BufReader<TcpStream>,
    writer: TcpStream,
    peer: SocketAddr,
    local: SocketAddr,
    pending: bool,
}

impl ControlConnection {
    /// Connects to a server's command port.
    ///
    /// The socket allows address reuse so a data listener can later share
    /// its local port (default data port mode).
    pub fn connect(addr: SocketAddr, timeout: Duration) -> io::Result<Self> {
        let stream = net::connect(addr, None, Some(timeout), true)?;
        Self::from_stream(stream)
    }

    pub fn from_stream(stream: TcpStream) -> io::Result<Self> {
        net::set_type_of_service(&stream, net::IPTOS_LOWDELAY);
        let peer = canonical(stream.peer_addr()?);
        let local = canonical(stream.local_addr()?);
        let writer = stream.try_clone()?;
        Ok(ControlConnection {
            reader: BufReader::new(stream),
            writer,
            peer,
            local,
            pending: false,
        })
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local
    }

    /// A command was sent and its final reply has not been read yet.
    pub fn is_pending(&self) -> bool {
        self.pending
    }

    pub fn send_command(&mut self, line: &str) -> io::Result<()> {
        debug!("---> {}", masked(line));
        self.writer.write_all(line.as_bytes())?;
        self.writer.write_all(b"\r\n")?;
        self.writer.flush()?;
        self.pending = true;
        Ok(())
    }

    pub fn write_raw(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.writer.write_all(bytes)
    }

    pub fn send_urgent(&self, bytes: &[u8]) -> io::Result<usize> {
        net::send_urgent(&self.writer, bytes)
    }

    pub fn read_reply(&mut self, expect_eof: bool) -> io::Result<Reply> {
        let reply = read_reply(&mut self.reader, &mut self.writer, expect_eof)?;
        for line in &reply.lines {
            debug!("<--- {}", line);
        }
        if !reply.is(ReplyClass::Preliminary) {
            self.pending = false;
        }
        Ok(reply)
    }

    /// Reply bytes already read from the socket but not yet parsed.
    pub fn has_buffered_input(&self) -> bool {
        !self.reader.buffer().is_empty()
    }

    /// True when a reply can be read without blocking.
    pub fn reply_ready(&self) -> io::Result<bool> {
        if self.has_buffered_input() {
            return Ok(true);
        }
        let ready = net::wait_readable(&[self.as_fd()], Duration::ZERO)?;
        Ok(ready.first().copied().unwrap_or(false))
    }
}

impl AsFd for ControlConnection {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.writer.as_fd()
    }
}
