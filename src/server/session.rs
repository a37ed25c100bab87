//! Server session
//!
//! One `ClientSession` serves one control connection on a blocking thread:
//! greet, read a command, check login, dispatch, reply, repeat until QUIT,
//! EOF or the idle timeout.

use std::collections::VecDeque;
use std::io;
use std::net::TcpStream;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::{info, warn};

use crate::config::ServerConfig;
use crate::error::StorageError;
use crate::net;
use crate::protocol::responses::{AUTH_FAILED, READY, SERVICE_UNAVAILABLE, SYNTAX_ERROR, format_response};
use crate::protocol::{Command, CommandStatus, parse_command};
use crate::server::control::{ControlChannel, Incoming};
use crate::server::data::{DataContext, DataPlan};
use crate::server::handlers::handle_command;
use crate::server::state::ClientState;
use crate::storage::{ensure_within_root, resolve_path};

pub struct ClientSession {
    pub(crate) control: ControlChannel,
    pub(crate) state: ClientState,
    pub(crate) plan: DataPlan,
    pub(crate) config: Arc<ServerConfig>,
    pub(crate) root: PathBuf,
    /// Commands that arrived during a transfer, run once it ends.
    pub(crate) deferred: VecDeque<String>,
}

impl ClientSession {
    pub fn new(stream: TcpStream, config: Arc<ServerConfig>) -> io::Result<Self> {
        let control = ControlChannel::new(stream, config.idle_timeout())?;
        let state = ClientState::new(control.peer_addr());
        let root = config.server_root_path();
        Ok(ClientSession {
            control,
            state,
            plan: DataPlan::Default,
            config,
            root,
            deferred: VecDeque::new(),
        })
    }

    /// Serves the connection until the client leaves.
    pub fn run(mut self) -> io::Result<()> {
        let peer = self.control.peer_addr();
        self.control
            .reply(&format_response(READY, "Welcome to netftp server"))?;

        loop {
            // 1. Next command, queued ones first
            let line = match self.next_line() {
                Ok(Incoming::Line(line)) => line,
                Ok(Incoming::TooLong) => {
                    self.control
                        .reply(&format_response(SYNTAX_ERROR, "Command too long."))?;
                    continue;
                }
                Ok(Incoming::Closed) => {
                    info!("Client {} disconnected", peer);
                    break;
                }
                Err(e) if net::is_timeout(&e) => {
                    let secs = self.config.idle_timeout_secs;
                    warn!("Client {} idle for {} seconds", peer, secs);
                    let text = format!("Timeout ({} seconds): closing control connection.", secs);
                    let _ = self.control.reply(&format_response(SERVICE_UNAVAILABLE, &text));
                    break;
                }
                Err(e) => return Err(e),
            };
            if line.trim().is_empty() {
                continue;
            }
            let command = parse_command(&line);

            // 2. Login gate
            if !self.state.is_logged_in() && !command.allowed_before_login() {
                self.control
                    .reply(&format_response(AUTH_FAILED, "Please login with USER and PASS."))?;
                continue;
            }

            // 3. Dispatch
            let keeps_restart = matches!(command, Command::REST(_));
            let keeps_rename = matches!(command, Command::RNFR(_));
            let result = handle_command(&mut self, command);
            if !keeps_restart {
                self.state.set_restart_point(None);
            }
            if !keeps_rename {
                self.state.set_rename_from(None);
            }

            // 4. Reply
            if let Some(message) = &result.message {
                self.control.reply(message)?;
            }
            match result.status {
                CommandStatus::CloseConnection => break,
                CommandStatus::Failure(reason) => warn!("{}: {}", peer, reason),
                CommandStatus::Success => {}
            }
        }

        if let Some(user) = self.state.username() {
            info!("Session of {} from {} ended", user, peer);
        }
        Ok(())
    }

    fn next_line(&mut self) -> io::Result<Incoming> {
        match self.deferred.pop_front() {
            Some(line) => Ok(Incoming::Line(line)),
            None => self.control.read_command(self.config.max_command_length),
        }
    }

    pub(crate) fn data_context(&self) -> DataContext {
        DataContext {
            peer: self.control.peer_addr(),
            local: self.control.local_addr(),
            allow_foreign: self.config.allow_foreign_data_address,
            timeout: self.config.data_timeout(),
        }
    }

    /// Hands out the data plan for one transfer, leaving the default behind.
    pub(crate) fn take_plan(&mut self) -> DataPlan {
        std::mem::take(&mut self.plan)
    }

    /// Resolves an argument that must name something that exists below the
    /// root.
    pub(crate) fn resolve_existing(&self, target: &str) -> Result<(PathBuf, String), StorageError> {
        let (real, shown) = resolve_path(&self.root, self.state.current_virtual_path(), target)?;
        ensure_within_root(&self.root, &real, &shown)?;
        Ok((real, shown))
    }

    /// Resolves an argument naming something about to be created; its
    /// parent must exist below the root.
    pub(crate) fn resolve_new(&self, target: &str) -> Result<(PathBuf, String), StorageError> {
        let (real, shown) = resolve_path(&self.root, self.state.current_virtual_path(), target)?;
        let parent = real.parent().unwrap_or(Path::new("/"));
        ensure_within_root(&self.root, parent, &shown)?;
        Ok((real, shown))
    }
}
