//! Configuration management for netftp
//!
//! Both binaries read the same layered configuration: built-in defaults, an
//! optional `netftp.toml` and `NETFTP_*` environment overrides
//! (`NETFTP_SERVER__CONTROL_PORT=2121`, `NETFTP_CLIENT__PASSIVE=false`).
//! The server reads the `[server]` table, the client the `[client]` table.

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_CONFIG_PATH: &str = "netftp";

fn load_section<T: DeserializeOwned + Default>(path: &str, section: &str) -> Result<T, ConfigError> {
    let settings = Config::builder()
        .add_source(File::with_name(path).required(false))
        .add_source(
            Environment::with_prefix("NETFTP")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        )
        .build()?;

    match settings.get::<T>(section) {
        Ok(value) => Ok(value),
        Err(ConfigError::NotFound(_)) => Ok(T::default()),
        Err(e) => Err(e),
    }
}

/// Server side settings, `[server]` table
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    /// IP address to bind the FTP control connection
    pub bind_address: String,

    /// Port for FTP control connection (0 picks a free port)
    pub control_port: u16,

    /// Root directory exposed to clients
    pub server_root: String,

    /// Block size for file transfers
    pub buffer_size: usize,

    /// How long a data connection may sit without progress or wait for accept
    pub data_timeout_secs: u64,

    /// Idle time after which the control connection is closed
    pub idle_timeout_secs: u64,

    pub max_clients: usize,

    pub max_command_length: usize,

    /// Pause before answering a failed login
    pub login_failure_delay_ms: u64,

    pub allow_anonymous: bool,

    /// Accept PORT/EPRT addresses other than the client's own host
    /// (needed for third-party transfers)
    pub allow_foreign_data_address: bool,

    /// user name -> password
    pub users: HashMap<String, String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        let users = [("alice", "alice123"), ("bob", "bob123"), ("admin", "admin123")]
            .into_iter()
            .map(|(u, p)| (u.to_string(), p.to_string()))
            .collect();

        ServerConfig {
            bind_address: "127.0.0.1".to_string(),
            control_port: 2121,
            server_root: "server_root".to_string(),
            buffer_size: 8192,
            data_timeout_secs: 30,
            idle_timeout_secs: 900,
            max_clients: 10,
            max_command_length: 512,
            login_failure_delay_ms: 1000,
            allow_anonymous: false,
            allow_foreign_data_address: false,
            users,
        }
    }
}

impl ServerConfig {
    /// Load the `[server]` table from `path` (extension optional) with
    /// environment overrides
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        let config: ServerConfig = load_section(path, "server")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server_root.is_empty() {
            return Err(ConfigError::Message("server_root cannot be empty".into()));
        }

        if self.max_clients == 0 {
            return Err(ConfigError::Message(
                "max_clients must be greater than 0".into(),
            ));
        }

        if self.buffer_size == 0 {
            return Err(ConfigError::Message(
                "buffer_size must be greater than 0".into(),
            ));
        }

        if self.max_command_length < 8 {
            return Err(ConfigError::Message(
                "max_command_length is too small".into(),
            ));
        }

        Ok(())
    }

    /// Get bind address and control port as socket address
    pub fn control_socket(&self) -> String {
        format!("{}:{}", self.bind_address, self.control_port)
    }

    pub fn server_root_path(&self) -> PathBuf {
        PathBuf::from(&self.server_root)
    }

    pub fn data_timeout(&self) -> Duration {
        Duration::from_secs(self.data_timeout_secs)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    pub fn login_failure_delay(&self) -> Duration {
        Duration::from_millis(self.login_failure_delay_ms)
    }
}

/// How data ports are announced in active mode.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum SendPort {
    /// Announce with EPRT/PORT/LPRT, fall back to the default port once if
    /// the server rejects every form.
    #[default]
    Auto,
    Always,
    /// Never announce; listen on the control connection's local port.
    Never,
}

/// How much of the server's replies the client echoes.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
#[serde(rename_all = "lowercase")]
pub enum Verbosity {
    Silent,
    /// Only error replies, without their code.
    Quiet,
    #[default]
    Verbose,
}

/// Client side settings, `[client]` table
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ClientConfig {
    pub passive: bool,
    pub sendport: SendPort,
    pub verbosity: Verbosity,
    pub hash: bool,
    /// Bytes per hash mark
    pub hash_bytes: u64,
    pub connect_timeout_secs: u64,
    /// How long to wait for the server after sending ABOR
    pub abort_timeout_secs: u64,
    /// Read/write timeout on data sockets; bounds how late an interrupt is seen
    pub poll_interval_ms: u64,
    /// Fold CRLF to LF on ASCII retrieves
    pub strip_cr: bool,
    /// Store retrieved files under a unique name instead of overwriting
    pub runique: bool,
    /// Use STOU instead of STOR
    pub sunique: bool,
    /// Pause between starting the source and target of a third-party transfer
    pub third_party_delay_ms: u64,
    /// Try EPSV/EPRT on IPv4 connections
    pub epsv4: bool,
    pub default_port: u16,
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            passive: true,
            sendport: SendPort::Auto,
            verbosity: Verbosity::Verbose,
            hash: false,
            hash_bytes: 1024,
            connect_timeout_secs: 30,
            abort_timeout_secs: 10,
            poll_interval_ms: 200,
            strip_cr: true,
            runique: false,
            sunique: false,
            third_party_delay_ms: 2000,
            epsv4: true,
            default_port: 21,
        }
    }
}

impl ClientConfig {
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        let config: ClientConfig = load_section(path, "client")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.default_port == 0 {
            return Err(ConfigError::Message("default_port cannot be 0".into()));
        }

        if self.hash_bytes == 0 {
            return Err(ConfigError::Message(
                "hash_bytes must be greater than 0".into(),
            ));
        }

        if self.poll_interval_ms == 0 {
            return Err(ConfigError::Message(
                "poll_interval_ms must be greater than 0".into(),
            ));
        }

        Ok(())
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn abort_timeout(&self) -> Duration {
        Duration::from_secs(self.abort_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn third_party_delay(&self) -> Duration {
        Duration::from_millis(self.third_party_delay_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_defaults_are_valid() {
        assert!(ServerConfig::default().validate().is_ok());
        assert!(ClientConfig::default().validate().is_ok());
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent");
        let config = ClientConfig::load(path.to_str().unwrap()).unwrap();
        assert!(config.passive);
        assert_eq!(config.sendport, SendPort::Auto);
    }

    #[test]
    fn test_file_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("netftp.toml");
        fs::write(
            &path,
            "[server]\ncontrol_port = 2200\nserver_root = \"/srv/ftp\"\n\n\
             [server.users]\ncarol = \"secret\"\n\n\
             [client]\npassive = false\nsendport = \"never\"\nverbosity = \"quiet\"\n",
        )
        .unwrap();

        let server = ServerConfig::load(path.to_str().unwrap()).unwrap();
        assert_eq!(server.control_port, 2200);
        assert_eq!(server.server_root, "/srv/ftp");
        assert_eq!(server.users.get("carol").map(String::as_str), Some("secret"));
        assert_eq!(server.buffer_size, 8192);

        let client = ClientConfig::load(path.to_str().unwrap()).unwrap();
        assert!(!client.passive);
        assert_eq!(client.sendport, SendPort::Never);
        assert_eq!(client.verbosity, Verbosity::Quiet);
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let mut server = ServerConfig::default();
        server.max_clients = 0;
        assert!(server.validate().is_err());

        let mut client = ClientConfig::default();
        client.hash_bytes = 0;
        assert!(client.validate().is_err());
    }
}
