//! Client session
//!
//! A `Session` is everything one connection to a server needs: the control
//! connection, the (at most one) data connection being negotiated, the
//! representation type the server currently has, a pending restart offset
//! and the abort flag. Every client operation takes `&mut Session`.

use std::io;
use std::net::{SocketAddr, ToSocketAddrs};
use std::time::Duration;

use log::{info, warn};

use crate::client::abort::AbortFlag;
use crate::client::console::Console;
use crate::client::control::ControlConnection;
use crate::client::dataconn::DataChannel;
use crate::config::ClientConfig;
use crate::error::FtpError;
use crate::protocol::address::Family;
use crate::protocol::{Reply, ReplyClass};
use crate::transfer::TransferType;

/// Where a session is in its connection lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Connected,
    /// A data connection has been negotiated but not yet used.
    DataPending,
    Transferring,
}

pub struct Session {
    control: Option<ControlConnection>,
    pub(crate) data: Option<DataChannel>,
    settings: ClientConfig,
    pub(crate) console: Console,
    /// Type the server has been told about.
    curtype: TransferType,
    /// Type the user asked for.
    transfer_type: TransferType,
    restart_point: Option<u64>,
    extended_v4: bool,
    extended_v6: bool,
    abort: AbortFlag,
    state: SessionState,
}

impl Session {
    pub fn new(settings: ClientConfig, console: Console) -> Self {
        let extended_v4 = settings.epsv4;
        Session {
            control: None,
            data: None,
            settings,
            console,
            curtype: TransferType::Ascii,
            transfer_type: TransferType::Ascii,
            restart_point: None,
            extended_v4,
            extended_v6: true,
            abort: AbortFlag::new(),
            state: SessionState::Disconnected,
        }
    }

    /// Creates a session and connects it.
    pub fn connect(
        host: &str,
        port: u16,
        settings: ClientConfig,
        console: Console,
    ) -> Result<Session, FtpError> {
        let mut session = Session::new(settings, console);
        session.open(host, port)?;
        Ok(session)
    }

    /// Connects to `host`, trying every address it resolves to, and reads
    /// the greeting.
    pub fn open(&mut self, host: &str, port: u16) -> Result<Reply, FtpError> {
        if self.control.is_some() {
            self.disconnect();
        }
        self.state = SessionState::Connecting;

        let addrs: Vec<SocketAddr> = match (host, port).to_socket_addrs() {
            Ok(addrs) => addrs.collect(),
            Err(e) => {
                self.state = SessionState::Disconnected;
                return Err(FtpError::Network(io::Error::new(
                    e.kind(),
                    format!("{}: {}", host, e),
                )));
            }
        };

        let timeout = self.settings.connect_timeout();
        let mut last_error = io::Error::new(io::ErrorKind::NotFound, format!("{}: no address", host));
        for addr in addrs {
            self.console.note(&format!("Trying {}...", addr));
            match ControlConnection::connect(addr, timeout) {
                Ok(control) => {
                    info!("Connected to {} ({})", host, addr);
                    self.control = Some(control);
                    break;
                }
                Err(e) => {
                    self.console
                        .error(&format!("ftp: connect to address {}: {}", addr, e));
                    last_error = e;
                }
            }
        }
        if self.control.is_none() {
            self.state = SessionState::Disconnected;
            return Err(FtpError::Network(last_error));
        }

        self.console.note(&format!("Connected to {}.", host));
        let banner = self.read_reply(false)?;
        if !banner.is(ReplyClass::Complete) {
            self.disconnect();
            return Err(FtpError::Refused(banner));
        }

        self.curtype = TransferType::Ascii;
        self.extended_v4 = self.settings.epsv4;
        self.extended_v6 = true;
        self.state = SessionState::Connected;
        Ok(banner)
    }

    /// USER, then PASS and ACCT when the server asks for them.
    pub fn login(
        &mut self,
        user: &str,
        password: Option<&str>,
        account: Option<&str>,
    ) -> Result<Reply, FtpError> {
        let mut reply = self.command(&format!("USER {}", user))?;
        if reply.is(ReplyClass::Continue) {
            reply = self.command(&format!("PASS {}", password.unwrap_or("")))?;
        }
        if reply.is(ReplyClass::Continue) {
            reply = self.command(&format!("ACCT {}", account.unwrap_or("")))?;
        }
        if !reply.is(ReplyClass::Complete) {
            self.console.error("Login failed.");
            return Err(FtpError::Refused(reply));
        }
        Ok(reply)
    }

    /// Sends one command and reads its reply.
    pub fn command(&mut self, line: &str) -> Result<Reply, FtpError> {
        let control = self.control_mut()?;
        if let Err(e) = control.send_command(line) {
            return Err(self.lose_peer(&e.to_string()));
        }
        self.read_reply(false)
    }

    /// Sends a raw command, following preliminary replies to the final one.
    pub fn quote(&mut self, line: &str) -> Result<Reply, FtpError> {
        let mut reply = self.command(line)?;
        while reply.is(ReplyClass::Preliminary) {
            reply = self.read_reply(false)?;
        }
        Ok(reply)
    }

    /// Reads one reply, echoing it to the console. A lost peer tears the
    /// session down.
    pub(crate) fn read_reply(&mut self, expect_eof: bool) -> Result<Reply, FtpError> {
        let control = self.control_mut()?;
        let reply = match control.read_reply(expect_eof) {
            Ok(reply) => reply,
            Err(e) => return Err(self.lose_peer(&e.to_string())),
        };
        self.console.reply(&reply);
        if reply.lost_peer {
            return Err(self.lose_peer(reply.message()));
        }
        Ok(reply)
    }

    /// Tells the server about a representation type.
    pub fn set_type(&mut self, transfer_type: TransferType) -> Result<Reply, FtpError> {
        let reply = self.command(&format!("TYPE {}", transfer_type.type_arg()))?;
        if !reply.is(ReplyClass::Complete) {
            return Err(FtpError::Refused(reply));
        }
        self.curtype = transfer_type;
        self.transfer_type = transfer_type;
        Ok(reply)
    }

    /// Makes sure the server has `wanted` before a transfer, without
    /// changing what the user asked for.
    pub(crate) fn ensure_type(&mut self, wanted: TransferType) -> Result<(), FtpError> {
        if self.curtype == wanted {
            return Ok(());
        }
        let reply = self.command(&format!("TYPE {}", wanted.type_arg()))?;
        if !reply.is(ReplyClass::Complete) {
            return Err(FtpError::Refused(reply));
        }
        self.curtype = wanted;
        Ok(())
    }

    /// Reads any replies the server sent unprompted, without blocking.
    pub fn reset(&mut self) -> Result<usize, FtpError> {
        let mut drained = 0;
        loop {
            let ready = self
                .control_mut()?
                .reply_ready()
                .map_err(FtpError::Network)?;
            if !ready {
                return Ok(drained);
            }
            self.read_reply(false)?;
            drained += 1;
        }
    }

    /// Sends QUIT and closes the connection.
    pub fn quit(&mut self) -> Result<(), FtpError> {
        if self.control.is_none() {
            return Ok(());
        }
        let sent = self.control_mut()?.send_command("QUIT");
        let result = match sent {
            Ok(()) => self.read_reply(true).map(|_| ()),
            Err(e) => Err(FtpError::Network(e)),
        };
        self.disconnect();
        result
    }

    /// Drops the connections without talking to the server.
    pub fn disconnect(&mut self) {
        if let Some(control) = self.control.take() {
            info!("Disconnected from {}", control.peer_addr());
        }
        self.data = None;
        self.restart_point = None;
        self.curtype = TransferType::Ascii;
        self.state = SessionState::Disconnected;
    }

    pub(crate) fn lose_peer(&mut self, reason: &str) -> FtpError {
        warn!("Lost connection to peer: {}", reason);
        self.disconnect();
        FtpError::LostPeer(reason.to_string())
    }

    pub(crate) fn control_mut(&mut self) -> Result<&mut ControlConnection, FtpError> {
        self.control.as_mut().ok_or(FtpError::NotConnected)
    }

    pub(crate) fn control(&self) -> Result<&ControlConnection, FtpError> {
        self.control.as_ref().ok_or(FtpError::NotConnected)
    }

    /// Whether the extended (EPSV/EPRT) forms are still worth trying.
    pub(crate) fn extended_enabled(&self, family: Family) -> bool {
        match family {
            Family::V4 => self.extended_v4,
            Family::V6 => self.extended_v6,
        }
    }

    /// Stops trying EPSV/EPRT for the rest of the session.
    pub(crate) fn disable_extended(&mut self, family: Family) {
        match family {
            Family::V4 => self.extended_v4 = false,
            Family::V6 => self.extended_v6 = false,
        }
    }

    // --------------------
    // Getter methods
    // --------------------

    pub fn is_connected(&self) -> bool {
        self.control.is_some()
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.control.as_ref().map(ControlConnection::peer_addr)
    }

    pub fn settings(&self) -> &ClientConfig {
        &self.settings
    }

    pub fn transfer_type(&self) -> TransferType {
        self.transfer_type
    }

    pub fn restart_point(&self) -> Option<u64> {
        self.restart_point
    }

    /// True while a data connection is negotiated but not consumed.
    pub fn has_data_channel(&self) -> bool {
        self.data.is_some()
    }

    pub fn abort_flag(&self) -> &AbortFlag {
        &self.abort
    }

    pub fn console_mut(&mut self) -> &mut Console {
        &mut self.console
    }

    // --------------------
    // Setter methods
    // --------------------

    pub fn settings_mut(&mut self) -> &mut ClientConfig {
        &mut self.settings
    }

    /// Offset for the next RETR/STOR/APPE; consumed by that transfer.
    pub fn set_restart_point(&mut self, offset: Option<u64>) {
        self.restart_point = offset;
    }

    pub(crate) fn take_restart_point(&mut self) -> Option<u64> {
        self.restart_point.take()
    }

    /// Shares an externally owned flag, typically the one `SIGINT` raises.
    pub fn set_abort_flag(&mut self, flag: AbortFlag) {
        self.abort = flag;
    }

    pub(crate) fn set_state(&mut self, state: SessionState) {
        self.state = state;
    }

    pub(crate) fn third_party_delay(&self) -> Duration {
        self.settings.third_party_delay()
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if self.control.is_some() {
            self.disconnect();
        }
    }
}
