//! Module `state`
//!
//! Defines the `ClientState` struct holding everything the server remembers
//! about one control connection between commands: login progress, the
//! current virtual directory, the representation type, a pending restart
//! offset and a pending rename.

use std::net::SocketAddr;

use crate::transfer::TransferType;

/// Per-connection state of a logged in (or logging in) client.
pub struct ClientState {
    username: Option<String>,
    client_addr: Option<SocketAddr>,
    current_virtual_path: String,
    is_user_valid: bool,
    is_logged_in: bool,
    transfer_type: TransferType,
    restart_point: Option<u64>,
    rename_from: Option<String>,
    /// Set by `EPSV ALL`: only EPSV may set up data connections from now on.
    epsv_all: bool,
}

impl Default for ClientState {
    fn default() -> Self {
        Self {
            username: None,
            client_addr: None,
            current_virtual_path: "/".to_string(),
            is_user_valid: false,
            is_logged_in: false,
            transfer_type: TransferType::Ascii,
            restart_point: None,
            rename_from: None,
            epsv_all: false,
        }
    }
}

impl ClientState {
    pub fn new(client_addr: SocketAddr) -> Self {
        Self {
            client_addr: Some(client_addr),
            ..Self::default()
        }
    }

    /// Forgets the login and everything tied to it. The address stays.
    pub fn logout(&mut self) {
        self.username = None;
        self.current_virtual_path = "/".to_string();
        self.is_user_valid = false;
        self.is_logged_in = false;
        self.transfer_type = TransferType::Ascii;
        self.restart_point = None;
        self.rename_from = None;
    }

    // --------------------
    // Getter methods
    // --------------------

    /// Returns whether the USER command was accepted.
    pub fn is_user_valid(&self) -> bool {
        self.is_user_valid
    }

    pub fn is_logged_in(&self) -> bool {
        self.is_logged_in
    }

    pub fn username(&self) -> Option<&String> {
        self.username.as_ref()
    }

    pub fn client_addr(&self) -> Option<&SocketAddr> {
        self.client_addr.as_ref()
    }

    pub fn current_virtual_path(&self) -> &str {
        &self.current_virtual_path
    }

    pub fn transfer_type(&self) -> TransferType {
        self.transfer_type
    }

    pub fn restart_point(&self) -> Option<u64> {
        self.restart_point
    }

    pub fn epsv_all(&self) -> bool {
        self.epsv_all
    }

    // --------------------
    // Setter methods
    // --------------------

    pub fn set_user_valid(&mut self, valid: bool) {
        self.is_user_valid = valid;
    }

    pub fn set_logged_in(&mut self, logged_in: bool) {
        self.is_logged_in = logged_in;
    }

    pub fn set_username(&mut self, username: Option<String>) {
        self.username = username;
    }

    pub fn set_current_virtual_path(&mut self, path: String) {
        self.current_virtual_path = path;
    }

    pub fn set_transfer_type(&mut self, transfer_type: TransferType) {
        self.transfer_type = transfer_type;
    }

    /// Offset for the next RETR/STOR/APPE.
    pub fn set_restart_point(&mut self, offset: Option<u64>) {
        self.restart_point = offset;
    }

    pub fn take_restart_point(&mut self) -> Option<u64> {
        self.restart_point.take()
    }

    pub fn set_rename_from(&mut self, path: Option<String>) {
        self.rename_from = path;
    }

    pub fn take_rename_from(&mut self) -> Option<String> {
        self.rename_from.take()
    }

    pub fn set_epsv_all(&mut self, on: bool) {
        self.epsv_all = on;
    }
}
