//! Transfer engine
//!
//! Moves bytes between a local reader/writer and a data connection, applying
//! the ASCII representation when asked, printing hash marks and watching for
//! interrupts between blocks. Both the client and the server drive their
//! transfers through `send` and `receive`.
//!
//! Data sockets are expected to carry short read/write timeouts: a timeout is
//! not an error here but a chance to poll the interrupt source.

use std::io::{self, Read, Write};
use std::time::{Duration, Instant};

use log::{debug, warn};

use crate::error::TransferError;
use crate::net;
use crate::transfer::ascii::{self, AsciiDecoder};
use crate::transfer::modes::TransferType;
use crate::transfer::results::{Outcome, TransferReport};

/// Something that can ask a running transfer to stop.
pub trait Interrupt {
    /// Called between blocks and whenever the data socket times out.
    /// `transferred` is the number of wire bytes moved so far.
    fn interrupted(&mut self, transferred: u64) -> bool;
}

/// Never interrupts.
pub struct NoInterrupt;

impl Interrupt for NoInterrupt {
    fn interrupted(&mut self, _transferred: u64) -> bool {
        false
    }
}

/// Progress marks: one `#` per `step` bytes.
pub struct HashMarks<'a> {
    step: u64,
    next: u64,
    out: &'a mut dyn Write,
}

impl<'a> HashMarks<'a> {
    pub fn new(step: u64, out: &'a mut dyn Write) -> Self {
        let step = step.max(1);
        HashMarks {
            step,
            next: step,
            out,
        }
    }

    fn advance(&mut self, total: u64) {
        let mut printed = false;
        while total >= self.next {
            let _ = self.out.write_all(b"#");
            self.next += self.step;
            printed = true;
        }
        if printed {
            let _ = self.out.flush();
        }
    }

    fn finish(&mut self, total: u64) {
        if total < self.step {
            let _ = self.out.write_all(b"#");
        }
        let _ = self.out.write_all(b"\n");
        let _ = self.out.flush();
    }
}

/// Per-transfer knobs.
pub struct TransferOptions<'a> {
    pub transfer_type: TransferType,
    pub block_size: usize,
    /// Keep `\r\n` intact when receiving in ASCII.
    pub keep_cr: bool,
    /// Give up when the data connection makes no progress for this long.
    pub stall_timeout: Option<Duration>,
    pub hash: Option<HashMarks<'a>>,
}

impl<'a> TransferOptions<'a> {
    pub fn new(transfer_type: TransferType, block_size: usize) -> Self {
        TransferOptions {
            transfer_type,
            block_size: block_size.max(1),
            keep_cr: false,
            stall_timeout: None,
            hash: None,
        }
    }

    fn finish_hash(&mut self, bytes: u64) {
        let ascii = self.transfer_type.is_ascii();
        if let Some(hash) = self.hash.as_mut() {
            if ascii || bytes > 0 {
                hash.finish(bytes);
            }
        }
    }
}

enum Flow {
    Continue,
    Stop(Outcome),
}

fn is_peer_closed(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::BrokenPipe
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
    )
}

/// Tracks how long the data connection has gone without progress.
struct Stall {
    limit: Option<Duration>,
    since: Option<Instant>,
}

impl Stall {
    fn new(limit: Option<Duration>) -> Self {
        Stall { limit, since: None }
    }

    fn progress(&mut self) {
        self.since = None;
    }

    fn check(&mut self) -> Result<(), TransferError> {
        let since = *self.since.get_or_insert_with(Instant::now);
        match self.limit {
            Some(limit) if since.elapsed() >= limit => Err(TransferError::Network(
                io::Error::new(io::ErrorKind::TimedOut, "data connection timed out"),
            )),
            _ => Ok(()),
        }
    }
}

fn write_to_network<W: Write>(
    data: &mut W,
    block: &[u8],
    transferred: u64,
    stall: &mut Stall,
    interrupt: &mut dyn Interrupt,
) -> Result<Flow, TransferError> {
    let mut written = 0;
    while written < block.len() {
        match data.write(&block[written..]) {
            Ok(0) => {
                return Err(TransferError::ShortWrite {
                    written,
                    expected: block.len(),
                });
            }
            Ok(n) => {
                written += n;
                stall.progress();
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) if net::is_timeout(&e) => {
                if interrupt.interrupted(transferred + written as u64) {
                    return Ok(Flow::Stop(Outcome::Aborted));
                }
                stall.check()?;
            }
            Err(e) if is_peer_closed(&e) => {
                debug!("data connection closed by peer: {}", e);
                return Ok(Flow::Stop(Outcome::PeerClosed));
            }
            Err(e) => return Err(TransferError::Network(e)),
        }
    }
    Ok(Flow::Continue)
}

fn write_to_local<W: Write>(sink: &mut W, block: &[u8]) -> Result<(), TransferError> {
    let mut written = 0;
    while written < block.len() {
        match sink.write(&block[written..]) {
            Ok(0) => {
                return Err(TransferError::ShortWrite {
                    written,
                    expected: block.len(),
                });
            }
            Ok(n) => written += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(TransferError::Local(e)),
        }
    }
    Ok(())
}

/// Copies `source` to the data connection.
///
/// In ASCII every local `\n` goes out as `\r\n`; the report counts wire
/// bytes. The engine stops early on interrupt (`Outcome::Aborted`) or when
/// the peer drops the connection (`Outcome::PeerClosed`).
pub fn send<R: Read, W: Write>(
    source: &mut R,
    data: &mut W,
    opts: &mut TransferOptions<'_>,
    interrupt: &mut dyn Interrupt,
) -> Result<TransferReport, TransferError> {
    let started = Instant::now();
    let ascii = opts.transfer_type.is_ascii();
    let mut buf = vec![0u8; opts.block_size];
    let mut wire = Vec::with_capacity(if ascii { opts.block_size * 2 } else { 0 });
    let mut stall = Stall::new(opts.stall_timeout);
    let mut bytes = 0u64;
    let mut outcome = Outcome::Complete;

    loop {
        if interrupt.interrupted(bytes) {
            outcome = Outcome::Aborted;
            break;
        }

        let n = match source.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(TransferError::Local(e)),
        };

        let block: &[u8] = if ascii {
            wire.clear();
            ascii::encode_into(&buf[..n], &mut wire);
            &wire
        } else {
            &buf[..n]
        };

        if let Flow::Stop(stop) = write_to_network(data, block, bytes, &mut stall, interrupt)? {
            outcome = stop;
            break;
        }
        bytes += block.len() as u64;
        if let Some(hash) = opts.hash.as_mut() {
            hash.advance(bytes);
        }
    }

    if outcome == Outcome::Complete {
        match data.flush() {
            Ok(()) => {}
            Err(e) if is_peer_closed(&e) => outcome = Outcome::PeerClosed,
            Err(e) => return Err(TransferError::Network(e)),
        }
    }
    if outcome == Outcome::Complete {
        opts.finish_hash(bytes);
    }

    Ok(TransferReport {
        bytes,
        elapsed: started.elapsed(),
        outcome,
        bare_lfs: 0,
    })
}

/// Copies the data connection into `sink` until end of stream.
///
/// In ASCII `\r\n` is folded to `\n` (unless `keep_cr`) and linefeeds that
/// arrive without a carriage return are counted in the report.
pub fn receive<R: Read, W: Write>(
    data: &mut R,
    sink: &mut W,
    opts: &mut TransferOptions<'_>,
    interrupt: &mut dyn Interrupt,
) -> Result<TransferReport, TransferError> {
    let started = Instant::now();
    let ascii = opts.transfer_type.is_ascii();
    let mut buf = vec![0u8; opts.block_size];
    let mut local = Vec::with_capacity(if ascii { opts.block_size } else { 0 });
    let mut decoder = AsciiDecoder::new(opts.keep_cr);
    let mut stall = Stall::new(opts.stall_timeout);
    let mut bytes = 0u64;
    let mut outcome = Outcome::Complete;

    loop {
        if interrupt.interrupted(bytes) {
            outcome = Outcome::Aborted;
            break;
        }

        let n = match data.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            // the interrupt is polled again at the top of the loop
            Err(e) if net::is_timeout(&e) => {
                stall.check()?;
                continue;
            }
            Err(e) => return Err(TransferError::Network(e)),
        };
        stall.progress();
        bytes += n as u64;

        if ascii {
            local.clear();
            decoder.decode_into(&buf[..n], &mut local);
            write_to_local(sink, &local)?;
        } else {
            write_to_local(sink, &buf[..n])?;
        }
        if let Some(hash) = opts.hash.as_mut() {
            hash.advance(bytes);
        }
    }

    if ascii {
        local.clear();
        decoder.finish(&mut local);
        write_to_local(sink, &local)?;
    }
    sink.flush().map_err(TransferError::Local)?;

    if outcome == Outcome::Complete {
        opts.finish_hash(bytes);
    }
    if decoder.bare_lfs() > 0 {
        warn!(
            "{} bare linefeeds received in ASCII mode",
            decoder.bare_lfs()
        );
    }

    Ok(TransferReport {
        bytes,
        elapsed: started.elapsed(),
        outcome,
        bare_lfs: decoder.bare_lfs(),
    })
}
