//! Interrupting a transfer in progress
//!
//! `SIGINT` only raises an `AbortFlag`. The transfer engine polls the flag
//! between blocks and on socket timeouts, returns `Outcome::Aborted`, and the
//! session then runs the RFC 959 abort sequence here in ordinary code.

use std::io::{self, Read};
use std::net::TcpStream;
use std::os::fd::AsFd;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use log::{debug, info, warn};
use signal_hook::SigId;
use signal_hook::consts::SIGINT;

use crate::client::session::{Session, SessionState};
use crate::error::FtpError;
use crate::net;
use crate::protocol::ReplyClass;
use crate::protocol::telnet::{DM, INTERRUPT};
use crate::transfer::Interrupt;

/// Shared interrupt flag.
#[derive(Debug, Clone, Default)]
pub struct AbortFlag(Arc<AtomicBool>);

impl AbortFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes `SIGINT` raise this flag instead of terminating the process.
    pub fn register_sigint(&self) -> io::Result<SigId> {
        signal_hook::flag::register(SIGINT, Arc::clone(&self.0))
    }

    pub fn raise(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn clear(&self) {
        self.0.store(false, Ordering::SeqCst);
    }

    pub fn is_raised(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

impl Interrupt for AbortFlag {
    fn interrupted(&mut self, _transferred: u64) -> bool {
        self.is_raised()
    }
}

/// Reads and discards whatever the peer still sends on the data connection,
/// until it closes it or `limit` passes.
fn drain(data: &mut TcpStream, limit: std::time::Duration) {
    let started = Instant::now();
    let mut buf = [0u8; 8192];
    let mut discarded = 0u64;
    loop {
        match data.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => discarded += n as u64,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) if net::is_timeout(&e) => {
                if started.elapsed() >= limit {
                    warn!("data connection still open after abort; giving up");
                    break;
                }
            }
            Err(_) => break,
        }
    }
    debug!("discarded {} bytes after abort", discarded);
}

impl Session {
    /// Tells the server to abandon the current transfer.
    ///
    /// Sends Telnet IP as urgent data followed by the synch mark and `ABOR`,
    /// waits for the server to react on either connection, drains the data
    /// connection and reads the replies. If the server does not react within
    /// the abort timeout the control connection is dropped.
    pub(crate) fn abort_remote(&mut self, data: Option<&mut TcpStream>) -> Result<(), FtpError> {
        let timeout = self.settings().abort_timeout();
        let control = self.control_mut()?;
        info!("aborting transfer with {}", control.peer_addr());

        // 1. Interrupt process, sent urgent
        if let Err(e) = control.send_urgent(&INTERRUPT) {
            warn!("abort: urgent send failed: {}", e);
        }

        // 2. Synch mark and the command itself
        let sent = control
            .write_raw(&[DM])
            .and_then(|_| control.send_command("ABOR"));
        if let Err(e) = sent {
            return Err(self.lose_peer(&e.to_string()));
        }

        // 3. Wait for the server to answer on either connection
        let control = self.control_mut()?;
        let mut ready = control.has_buffered_input();
        if !ready {
            let mut fds = vec![control.as_fd()];
            if let Some(d) = data.as_ref() {
                fds.push(d.as_fd());
            }
            let flags = net::wait_readable(&fds, timeout).map_err(FtpError::Network)?;
            ready = flags.iter().any(|f| *f);
        }
        if !ready {
            warn!("no answer to ABOR within {:?}", timeout);
            return Err(self.lose_peer("Lost peer during abort"));
        }

        // 4. Discard pending data
        if let Some(d) = data {
            drain(d, timeout);
        }

        // 5. Replies: the transfer's own, possibly a 552, then ABOR's
        let first = self.read_reply(false)?;
        if first.is(ReplyClass::Error) && first.code == 552 {
            self.read_reply(false)?;
        }
        self.read_reply(false)?;

        self.abort_flag().clear();
        self.set_state(SessionState::Connected);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flag_is_shared_between_clones() {
        let flag = AbortFlag::new();
        let mut other = flag.clone();
        assert!(!other.interrupted(0));
        flag.raise();
        assert!(other.interrupted(0));
        other.clear();
        assert!(!flag.is_raised());
    }
}
