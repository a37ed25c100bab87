//! Server control channel
//!
//! Reads command lines from the client (stripping Telnet commands and
//! refusing option negotiation) and writes replies.

use std::io::{self, BufRead, BufReader, Write};
use std::net::{SocketAddr, TcpStream};
use std::os::fd::{AsFd, BorrowedFd};
use std::time::Duration;

use log::debug;

use crate::net;
use crate::protocol::address::canonical;
use crate::protocol::telnet::{Telnet, TelnetDecoder};

/// One read from the control connection.
#[derive(Debug, PartialEq, Eq)]
pub enum Incoming {
    Line(String),
    /// The line exceeded the limit; it was consumed and dropped.
    TooLong,
    Closed,
}

pub struct ControlChannel {
    reader: BufReader<TcpStream>,
    writer: TcpStream,
    decoder: TelnetDecoder,
    peer: SocketAddr,
    local: SocketAddr,
    idle: Duration,
    /// Bytes of a line whose end has not arrived yet.
    partial: Vec<u8>,
    overflow: bool,
}

impl ControlChannel {
    /// Wraps an accepted control connection. `idle` bounds how long a read
    /// may wait for the next command.
    pub fn new(stream: TcpStream, idle: Duration) -> io::Result<Self> {
        net::set_oob_inline(&stream)?;
        net::set_type_of_service(&stream, net::IPTOS_LOWDELAY);
        if !idle.is_zero() {
            stream.set_read_timeout(Some(idle))?;
        }
        let peer = canonical(stream.peer_addr()?);
        let local = canonical(stream.local_addr()?);
        let writer = stream.try_clone()?;
        Ok(ControlChannel {
            reader: BufReader::new(stream),
            writer,
            decoder: TelnetDecoder::new(),
            peer,
            local,
            idle,
            partial: Vec::new(),
            overflow: false,
        })
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local
    }

    /// Writes a complete, CRLF terminated reply.
    pub fn reply(&mut self, text: &str) -> io::Result<()> {
        for line in text.lines() {
            debug!("<--- {}", line);
        }
        self.writer.write_all(text.as_bytes())?;
        self.writer.flush()
    }

    /// Reads the next command line, without its line terminator.
    ///
    /// A read that fails midway (a timeout, say) keeps what it has, and the
    /// next call carries on with the same line.
    pub fn read_command(&mut self, max_len: usize) -> io::Result<Incoming> {
        loop {
            let byte = {
                let buf = match self.reader.fill_buf() {
                    Ok(buf) => buf,
                    Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                    Err(e) => return Err(e),
                };
                let Some(&byte) = buf.first() else {
                    return Ok(Incoming::Closed);
                };
                self.reader.consume(1);
                byte
            };

            let c = match self.decoder.feed(byte) {
                Telnet::Data(c) => c,
                Telnet::Respond(answer) => {
                    self.writer.write_all(&answer)?;
                    continue;
                }
                Telnet::Skip => continue,
            };

            match c {
                b'\n' => break,
                b'\r' | 0 => {}
                _ if self.partial.len() >= max_len => self.overflow = true,
                _ => self.partial.push(c),
            }
        }

        let line = std::mem::take(&mut self.partial);
        if std::mem::take(&mut self.overflow) {
            return Ok(Incoming::TooLong);
        }
        let text = String::from_utf8_lossy(&line).into_owned();
        if line.get(..4).is_some_and(|verb| verb.eq_ignore_ascii_case(b"PASS")) {
            debug!("---> PASS XXXX");
        } else {
            debug!("---> {}", text);
        }
        Ok(Incoming::Line(text))
    }

    /// Like `read_command`, but gives up after `wait` with `None` when no
    /// complete line has arrived. The idle timeout is restored afterwards.
    pub fn poll_command(&mut self, max_len: usize, wait: Duration) -> io::Result<Option<Incoming>> {
        self.reader.get_ref().set_read_timeout(Some(wait))?;
        let result = self.read_command(max_len);
        let idle = (!self.idle.is_zero()).then_some(self.idle);
        self.reader.get_ref().set_read_timeout(idle)?;
        match result {
            Ok(incoming) => Ok(Some(incoming)),
            Err(e) if net::is_timeout(&e) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// True when a command can be read without waiting.
    pub fn has_input(&self) -> io::Result<bool> {
        if !self.reader.buffer().is_empty() {
            return Ok(true);
        }
        let ready = net::wait_readable(&[self.as_fd()], Duration::ZERO)?;
        Ok(ready.first().copied().unwrap_or(false))
    }
}

impl AsFd for ControlChannel {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.writer.as_fd()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::telnet::{DM, IAC, IP, WILL};
    use std::io::Read;
    use std::net::TcpListener;

    fn pair() -> (ControlChannel, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let client = TcpStream::connect(listener.local_addr().unwrap()).unwrap();
        let (server, _) = listener.accept().unwrap();
        (
            ControlChannel::new(server, Duration::from_secs(5)).unwrap(),
            client,
        )
    }

    #[test]
    fn test_reads_lines_and_strips_interrupt_sequence() {
        let (mut control, mut client) = pair();
        client.write_all(b"NOOP\r\n").unwrap();
        client.write_all(&[IAC, IP, IAC, DM]).unwrap();
        client.write_all(b"ABOR\r\n").unwrap();

        assert_eq!(control.read_command(512).unwrap(), Incoming::Line("NOOP".into()));
        assert_eq!(control.read_command(512).unwrap(), Incoming::Line("ABOR".into()));
    }

    #[test]
    fn test_refuses_options_and_limits_length() {
        let (mut control, mut client) = pair();
        client.write_all(&[IAC, WILL, 1]).unwrap();
        client.write_all(b"XXXXXXXXXXXXXXXXXXXX\r\nPWD\r\n").unwrap();

        assert_eq!(control.read_command(8).unwrap(), Incoming::TooLong);
        assert_eq!(control.read_command(8).unwrap(), Incoming::Line("PWD".into()));

        let mut answer = [0u8; 3];
        client.read_exact(&mut answer).unwrap();
        assert_eq!(answer, [IAC, crate::protocol::telnet::DONT, 1]);
    }

    #[test]
    fn test_non_ascii_lines_are_read_whole() {
        let (mut control, mut client) = pair();
        client.write_all("abcé\r\n".as_bytes()).unwrap();
        client.write_all(b"ab\xfeS\r\nPAS\r\n").unwrap();

        assert_eq!(control.read_command(512).unwrap(), Incoming::Line("abcé".into()));
        assert_eq!(
            control.read_command(512).unwrap(),
            Incoming::Line("ab\u{fffd}S".into())
        );
        assert_eq!(control.read_command(512).unwrap(), Incoming::Line("PAS".into()));
    }

    #[test]
    fn test_poll_keeps_partial_line() {
        let (mut control, mut client) = pair();
        client.write_all(b"AB").unwrap();
        let wait = Duration::from_millis(20);

        assert_eq!(control.poll_command(512, wait).unwrap(), None);
        client.write_all(b"OR\r\n").unwrap();
        let mut read = None;
        for _ in 0..50 {
            read = control.poll_command(512, wait).unwrap();
            if read.is_some() {
                break;
            }
        }
        assert_eq!(read, Some(Incoming::Line("ABOR".into())));
    }

    #[test]
    fn test_closed_connection() {
        let (mut control, client) = pair();
        drop(client);
        assert_eq!(control.read_command(512).unwrap(), Incoming::Closed);
    }
}
