//! Error types
//!
//! Defines domain-specific error types for each part of the crate.

use std::fmt;
use std::io;
use std::net::{IpAddr, SocketAddr};

use crate::protocol::reply::Reply;

/// Authentication errors (server side)
#[derive(Debug)]
pub enum AuthError {
    InvalidUsername(String),
    InvalidPassword(String),
    UserNotFound(String),
    MalformedInput(String),
    NotLoggedIn,
    NoUser,
}

impl fmt::Display for AuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthError::InvalidUsername(u) => write!(f, "Invalid username: {}", u),
            AuthError::InvalidPassword(u) => write!(f, "Invalid password for user: {}", u),
            AuthError::UserNotFound(u) => write!(f, "User not found: {}", u),
            AuthError::MalformedInput(s) => write!(f, "Malformed input: {}", s),
            AuthError::NotLoggedIn => write!(f, "User not logged in"),
            AuthError::NoUser => write!(f, "Login with USER first"),
        }
    }
}

impl std::error::Error for AuthError {}

/// Storage errors (server side)
#[derive(Debug)]
pub enum StorageError {
    FileNotFound(String),
    DirectoryNotFound(String),
    PermissionDenied(String),
    InvalidPath(String),
    FileAlreadyExists(String),
    NotADirectory(String),
    NotAPlainFile(String),
    NoUniqueName(String),
    IoError(String, io::Error),
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageError::FileNotFound(p) => write!(f, "{}: No such file or directory", p),
            StorageError::DirectoryNotFound(p) => write!(f, "{}: No such directory", p),
            StorageError::PermissionDenied(p) => write!(f, "{}: Permission denied", p),
            StorageError::InvalidPath(p) => write!(f, "{}: Invalid path", p),
            StorageError::FileAlreadyExists(p) => write!(f, "{}: File exists", p),
            StorageError::NotADirectory(p) => write!(f, "{}: Not a directory", p),
            StorageError::NotAPlainFile(p) => write!(f, "{}: not a plain file", p),
            StorageError::NoUniqueName(_) => write!(f, "Unique file name cannot be created"),
            StorageError::IoError(p, e) => write!(f, "{}: {}", p, e),
        }
    }
}

impl std::error::Error for StorageError {}

impl StorageError {
    /// Classifies an I/O error raised while touching `path`.
    pub fn from_io(path: &str, error: io::Error) -> Self {
        match error.kind() {
            io::ErrorKind::NotFound => StorageError::FileNotFound(path.to_string()),
            io::ErrorKind::PermissionDenied => StorageError::PermissionDenied(path.to_string()),
            io::ErrorKind::AlreadyExists => StorageError::FileAlreadyExists(path.to_string()),
            _ => StorageError::IoError(path.to_string(), error),
        }
    }
}

/// Failures decoding or validating a PORT/LPRT/EPRT style address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddressError {
    Malformed { form: &'static str, input: String },
    UnsupportedFamily(String),
    LengthMismatch { family: u8, addr_len: u8, port_len: u8 },
    FamilyMismatch { control: IpAddr, data: IpAddr },
}

impl fmt::Display for AddressError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AddressError::Malformed { form, input } => {
                write!(f, "malformed {} address: {:?}", form, input)
            }
            AddressError::UnsupportedFamily(fam) => {
                write!(f, "unsupported address family {}", fam)
            }
            AddressError::LengthMismatch {
                family,
                addr_len,
                port_len,
            } => write!(
                f,
                "bad long address: family {} with address length {} and port length {}",
                family, addr_len, port_len
            ),
            AddressError::FamilyMismatch { control, data } => write!(
                f,
                "data address {} does not match control connection family of {}",
                data, control
            ),
        }
    }
}

impl std::error::Error for AddressError {}

/// Server-side data channel errors
#[derive(Debug)]
pub enum DataChannelError {
    PassiveSetupFailed(io::Error),
    ConnectFailed(SocketAddr, io::Error),
    AcceptFailed(io::Error),
    AcceptTimeout,
    IllegalAddress(SocketAddr),
    ForeignPeer(SocketAddr),
    ProtocolNotSupported(u8),
    ExtendedOnly,
}

impl fmt::Display for DataChannelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataChannelError::PassiveSetupFailed(e) => {
                write!(f, "Can't open passive connection: {}", e)
            }
            DataChannelError::ConnectFailed(addr, e) => {
                write!(f, "Can't build data connection to {}: {}", addr, e)
            }
            DataChannelError::AcceptFailed(e) => write!(f, "Can't open data connection: {}", e),
            DataChannelError::AcceptTimeout => write!(f, "Can't open data connection"),
            DataChannelError::IllegalAddress(addr) => write!(f, "Illegal data address {}", addr),
            DataChannelError::ForeignPeer(addr) => {
                write!(f, "Data connection from foreign address {}", addr)
            }
            DataChannelError::ProtocolNotSupported(family) => {
                write!(f, "Network protocol not supported, use ({})", family)
            }
            DataChannelError::ExtendedOnly => write!(f, "EPSV ALL in effect"),
        }
    }
}

impl std::error::Error for DataChannelError {}

/// Transfer engine errors. `Local` is the file/pipe side, `Network` the
/// data connection.
#[derive(Debug)]
pub enum TransferError {
    Local(io::Error),
    Network(io::Error),
    ShortWrite { written: usize, expected: usize },
}

impl fmt::Display for TransferError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransferError::Local(e) => write!(f, "local: {}", e),
            TransferError::Network(e) => write!(f, "network: {}", e),
            TransferError::ShortWrite { written, expected } => {
                write!(f, "short write ({} of {} bytes)", written, expected)
            }
        }
    }
}

impl std::error::Error for TransferError {}

/// General FTP server error that encompasses all server-side error types
#[derive(Debug)]
pub enum FtpServerError {
    Auth(AuthError),
    Storage(StorageError),
    Address(AddressError),
    DataChannel(DataChannelError),
    Transfer(TransferError),
    IoError(io::Error),
}

impl fmt::Display for FtpServerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FtpServerError::Auth(e) => write!(f, "{}", e),
            FtpServerError::Storage(e) => write!(f, "{}", e),
            FtpServerError::Address(e) => write!(f, "{}", e),
            FtpServerError::DataChannel(e) => write!(f, "{}", e),
            FtpServerError::Transfer(e) => write!(f, "{}", e),
            FtpServerError::IoError(e) => write!(f, "I/O error: {}", e),
        }
    }
}

impl std::error::Error for FtpServerError {}

impl From<AuthError> for FtpServerError {
    fn from(error: AuthError) -> Self {
        FtpServerError::Auth(error)
    }
}

impl From<StorageError> for FtpServerError {
    fn from(error: StorageError) -> Self {
        FtpServerError::Storage(error)
    }
}

impl From<AddressError> for FtpServerError {
    fn from(error: AddressError) -> Self {
        FtpServerError::Address(error)
    }
}

impl From<DataChannelError> for FtpServerError {
    fn from(error: DataChannelError) -> Self {
        FtpServerError::DataChannel(error)
    }
}

impl From<TransferError> for FtpServerError {
    fn from(error: TransferError) -> Self {
        FtpServerError::Transfer(error)
    }
}

impl From<io::Error> for FtpServerError {
    fn from(error: io::Error) -> Self {
        FtpServerError::IoError(error)
    }
}

/// Client session errors
#[derive(Debug)]
pub enum FtpError {
    NotConnected,
    /// The control connection is gone (EOF, 421, or no answer to an abort).
    LostPeer(String),
    /// The peer answered with an unexpected reply class.
    Refused(Reply),
    PassiveRefused,
    Protocol(String),
    Address(AddressError),
    Local { path: String, source: io::Error },
    NotPlainFile(String),
    RestartOutOfRange { offset: u64, path: String },
    NoUniqueName(String),
    Network(io::Error),
    Transfer(TransferError),
}

impl fmt::Display for FtpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FtpError::NotConnected => write!(f, "Not connected."),
            FtpError::LostPeer(msg) => write!(f, "Lost connection to peer: {}", msg),
            FtpError::Refused(reply) => write!(f, "{}", reply.text()),
            FtpError::PassiveRefused => write!(f, "Passive mode refused."),
            FtpError::Protocol(msg) => write!(f, "{}", msg),
            FtpError::Address(e) => write!(f, "{}", e),
            FtpError::Local { path, source } => write!(f, "local: {}: {}", path, source),
            FtpError::NotPlainFile(path) => write!(f, "{}: not a plain file.", path),
            FtpError::RestartOutOfRange { offset, path } => {
                write!(f, "Action not taken: offset {} is outside of {}.", offset, path)
            }
            FtpError::NoUniqueName(path) => {
                write!(f, "runique: can't find unique file name for {}.", path)
            }
            FtpError::Network(e) => write!(f, "ftp: {}", e),
            FtpError::Transfer(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for FtpError {}

impl FtpError {
    /// True when the control connection can no longer be used.
    pub fn is_fatal(&self) -> bool {
        matches!(self, FtpError::NotConnected | FtpError::LostPeer(_))
    }

    pub(crate) fn local(path: &str, source: io::Error) -> Self {
        FtpError::Local {
            path: path.to_string(),
            source,
        }
    }
}

impl From<AddressError> for FtpError {
    fn from(error: AddressError) -> Self {
        FtpError::Address(error)
    }
}

impl From<TransferError> for FtpError {
    fn from(error: TransferError) -> Self {
        FtpError::Transfer(error)
    }
}
