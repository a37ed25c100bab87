//! Client transfers
//!
//! `send` stores a local source on the server (STOR, STOU, APPE), `receive`
//! retrieves into a local sink (RETR, LIST, NLST). Both negotiate the data
//! connection, honour a pending restart offset, run the transfer engine and
//! read the server's completion reply. An interrupted transfer runs the
//! abort sequence and still returns a report.

use std::fs;
use std::net::TcpStream;

use log::{info, warn};

use crate::client::local::{LocalMode, Sink, Source, unique_local_name};
use crate::client::session::Session;
use crate::error::{FtpError, TransferError};
use crate::protocol::ReplyClass;
use crate::transfer::{self, HashMarks, Outcome, TransferOptions, TransferReport, TransferType};

fn command_line(cmd: &str, remote: Option<&str>) -> String {
    match remote {
        Some(name) => format!("{} {}", cmd, name),
        None => cmd.to_string(),
    }
}

impl Session {
    /// Negotiates the data connection, sends REST (when restarting) and the
    /// transfer command, and returns the connected data stream.
    fn open_transfer(&mut self, line: &str, restart: Option<u64>) -> Result<TcpStream, FtpError> {
        self.initconn()?;

        if let Some(offset) = restart {
            let reply = self.command(&format!("REST {}", offset))?;
            if !reply.is(ReplyClass::Continue) {
                self.release_data();
                return Err(FtpError::Refused(reply));
            }
        }

        let reply = self.command(line)?;
        if !reply.is(ReplyClass::Preliminary) {
            self.release_data();
            return Err(FtpError::Refused(reply));
        }

        match self.dataconn() {
            Ok(stream) => Ok(stream),
            Err(e) => {
                // the server is waiting on a connection that will not come
                let _ = self.read_reply(false);
                self.release_data();
                Err(e)
            }
        }
    }

    fn report(&mut self, report: &TransferReport, direction: &str) {
        if report.bytes > 0 || report.is_complete() {
            let line = report.summary(direction);
            self.console.note(&line);
        }
        if report.bare_lfs > 0 {
            self.console.error(&format!(
                "WARNING! {} bare linefeeds received in ASCII mode",
                report.bare_lfs
            ));
            self.console
                .error("File may not have transferred correctly.");
        }
    }

    /// Stores `local` on the server with `cmd` (`STOR`, `STOU` or `APPE`).
    pub fn send(
        &mut self,
        cmd: &str,
        local: &str,
        remote: Option<&str>,
    ) -> Result<TransferReport, FtpError> {
        self.control()?;

        // 1. Consume the restart offset; only stores can resume
        let restart = self
            .take_restart_point()
            .filter(|_| cmd == "STOR" || cmd == "APPE");
        let cmd = if cmd == "STOR" && self.settings().sunique {
            "STOU"
        } else {
            cmd
        };

        // 2. Open and position the local source
        let mut source = Source::open(local)?;
        let transfer_type = self.transfer_type();
        if let Some(offset) = restart {
            source.seek_restart(local, offset, transfer_type.is_ascii())?;
        }

        if let Some(remote) = remote {
            self.console
                .note(&format!("local: {} remote: {}", local, remote));
        }

        // 3. Type, data connection, REST and the command itself
        let line = command_line(cmd, remote);
        let opened = self
            .ensure_type(transfer_type)
            .and_then(|_| self.open_transfer(&line, restart));
        let mut data = match opened {
            Ok(stream) => stream,
            Err(e) => {
                source.close(local);
                return Err(e);
            }
        };

        // 4. Copy
        self.abort_flag().clear();
        let mut interrupt = self.abort_flag().clone();
        let block_size = source.block_size();
        let hash_bytes = self.settings().hash.then_some(self.settings().hash_bytes);
        let result = {
            let mut opts = TransferOptions::new(transfer_type, block_size);
            if let Some(step) = hash_bytes {
                opts.hash = Some(HashMarks::new(step, self.console.writer()));
            }
            transfer::send(&mut source, &mut data, &mut opts, &mut interrupt)
        };
        source.close(local);

        // 5. Completion
        let outcome = match result {
            Ok(report) => {
                if report.outcome == Outcome::Aborted {
                    info!("send of {} interrupted after {} bytes", local, report.bytes);
                    self.abort_remote(Some(&mut data))?;
                    drop(data);
                } else {
                    if report.outcome == Outcome::PeerClosed {
                        warn!("data connection closed by server during send");
                    }
                    drop(data);
                    self.read_reply(false)?;
                }
                self.report(&report, "sent");
                Ok(report)
            }
            Err(e) => {
                drop(data);
                self.console.error(&e.to_string());
                self.read_reply(false)?;
                Err(FtpError::from(e))
            }
        };
        self.release_data();
        outcome
    }

    /// Retrieves `remote` with `cmd` (`RETR`, `LIST`, `NLST`) into `local`.
    ///
    /// Listings always use ASCII; retrieves use the session's type.
    pub fn receive(
        &mut self,
        cmd: &str,
        remote: Option<&str>,
        local: &str,
        mode: LocalMode,
    ) -> Result<TransferReport, FtpError> {
        self.control()?;
        let is_retr = cmd == "RETR";

        // 1. Consume the restart offset; only RETR can resume
        let restart = self.take_restart_point().filter(|_| is_retr);
        let transfer_type = if is_retr {
            self.transfer_type()
        } else {
            TransferType::Ascii
        };

        // 2. Local sink, unique name and resume position
        let is_file = local != "-" && !local.starts_with('|');
        let local_name = if is_file && is_retr && self.settings().runique && mode == LocalMode::Truncate
        {
            let name = unique_local_name(local)?;
            if name != local {
                self.console.note(&format!("Receiving file as {}", name));
            }
            name
        } else {
            local.to_string()
        };
        let mode = if restart.is_some() {
            LocalMode::Update
        } else {
            mode
        };
        let mut sink = Sink::open(&local_name, mode)?;
        if let Some(offset) = restart {
            if let Err(e) = sink.seek_restart(&local_name, offset, transfer_type.is_ascii()) {
                sink.close(&local_name);
                return Err(e);
            }
        }

        if let Some(remote) = remote {
            if is_retr {
                self.console
                    .note(&format!("local: {} remote: {}", local_name, remote));
            }
        }

        // 3. Type, data connection, REST and the command itself
        let line = command_line(cmd, remote);
        let opened = self
            .ensure_type(transfer_type)
            .and_then(|_| self.open_transfer(&line, restart));
        let mut data = match opened {
            Ok(stream) => stream,
            Err(e) => {
                sink.close(&local_name);
                return Err(e);
            }
        };

        // 4. Copy
        self.abort_flag().clear();
        let mut interrupt = self.abort_flag().clone();
        let block_size = sink.block_size();
        let keep_cr = !self.settings().strip_cr && is_retr;
        let hash_bytes = self.settings().hash.then_some(self.settings().hash_bytes);
        let result = {
            let mut opts = TransferOptions::new(transfer_type, block_size);
            opts.keep_cr = keep_cr;
            if let Some(step) = hash_bytes {
                opts.hash = Some(HashMarks::new(step, self.console.writer()));
            }
            transfer::receive(&mut data, &mut sink, &mut opts, &mut interrupt)
        };
        sink.close(&local_name);

        // 5. Completion
        let outcome = match result {
            Ok(report) => {
                if report.outcome == Outcome::Aborted {
                    info!("receive of {} interrupted after {} bytes", local_name, report.bytes);
                    self.abort_remote(Some(&mut data))?;
                    drop(data);
                } else {
                    drop(data);
                    self.read_reply(false)?;
                }
                self.report(&report, "received");
                Ok(report)
            }
            Err(TransferError::Network(e)) => {
                drop(data);
                self.console.error(&format!("netin: {}", e));
                self.read_reply(false)?;
                Err(FtpError::Network(e))
            }
            Err(e) => {
                // local trouble: stop the server sending before giving up
                self.console.error(&format!("local: {}: {}", local_name, e));
                self.abort_remote(Some(&mut data))?;
                drop(data);
                Err(FtpError::from(e))
            }
        };
        self.release_data();
        outcome
    }

    /// Resumes a retrieve from the size of the local file.
    pub fn reget(&mut self, remote: &str, local: &str) -> Result<TransferReport, FtpError> {
        match fs::metadata(local) {
            Ok(metadata) if metadata.len() > 0 => {
                self.set_restart_point(Some(metadata.len()));
                self.receive("RETR", Some(remote), local, LocalMode::Update)
            }
            _ => self.receive("RETR", Some(remote), local, LocalMode::Truncate),
        }
    }

    /// RETR into `local`.
    pub fn get(&mut self, remote: &str, local: &str) -> Result<TransferReport, FtpError> {
        self.receive("RETR", Some(remote), local, LocalMode::Truncate)
    }

    /// STOR from `local`.
    pub fn put(&mut self, local: &str, remote: &str) -> Result<TransferReport, FtpError> {
        self.send("STOR", local, Some(remote))
    }

    /// Directory listing (`LIST` when `long`, else `NLST`) into `local`.
    pub fn list(
        &mut self,
        path: Option<&str>,
        local: &str,
        long: bool,
    ) -> Result<TransferReport, FtpError> {
        let cmd = if long { "LIST" } else { "NLST" };
        self.receive(cmd, path, local, LocalMode::Truncate)
    }
}
