//! FTP Transfer modes
//!
//! Representation types (`TYPE`) and data connection direction.

use std::fmt;

/// Representation type negotiated with `TYPE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransferType {
    #[default]
    Ascii,
    Image,
    /// Local byte size; only 8 is supported.
    Local(u8),
    Ebcdic,
}

impl TransferType {
    /// Argument for the `TYPE` command.
    pub fn type_arg(self) -> String {
        match self {
            TransferType::Ascii => "A".to_string(),
            TransferType::Image => "I".to_string(),
            TransferType::Local(size) => format!("L {}", size),
            TransferType::Ebcdic => "E".to_string(),
        }
    }

    /// Name used in `150 Opening ... mode data connection` replies.
    pub fn mode_name(self) -> &'static str {
        match self {
            TransferType::Ascii => "ASCII",
            _ => "BINARY",
        }
    }

    pub fn is_ascii(self) -> bool {
        self == TransferType::Ascii
    }
}

impl fmt::Display for TransferType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransferType::Ascii => write!(f, "ascii"),
            TransferType::Image => write!(f, "binary"),
            TransferType::Local(size) => write!(f, "local {}", size),
            TransferType::Ebcdic => write!(f, "ebcdic"),
        }
    }
}

/// FTP data connection modes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferMode {
    /// We listen, the peer connects (PORT/LPRT/EPRT).
    Active,
    /// The peer listens, we connect (PASV/LPSV/EPSV).
    Passive,
}
