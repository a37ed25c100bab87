//! Error handlers
//!
//! Logging and reply-code mapping for server-side errors.

use crate::error::types::{DataChannelError, FtpServerError, StorageError, TransferError};
use log::error;

/// Handle an FTP server error
pub fn handle_error(err: &FtpServerError) {
    error!("FTP Server Error: {}", err);
}

/// Convert error to FTP response code
pub fn error_to_ftp_code(err: &FtpServerError) -> u16 {
    match err {
        FtpServerError::Auth(_) => 530,
        FtpServerError::Storage(StorageError::NoUniqueName(_)) => 452,
        FtpServerError::Storage(StorageError::NotAPlainFile(_)) => 550,
        FtpServerError::Storage(_) => 550,
        FtpServerError::Address(_) => 501,
        FtpServerError::DataChannel(DataChannelError::IllegalAddress(_)) => 500,
        FtpServerError::DataChannel(DataChannelError::ProtocolNotSupported(_)) => 522,
        FtpServerError::DataChannel(DataChannelError::ExtendedOnly) => 501,
        FtpServerError::DataChannel(_) => 425,
        FtpServerError::Transfer(TransferError::Local(_)) => 451,
        FtpServerError::Transfer(_) => 426,
        FtpServerError::IoError(_) => 451,
    }
}

/// Formats the single-line reply for an error.
pub fn error_reply(err: &FtpServerError) -> String {
    handle_error(err);
    format!("{} {}.\r\n", error_to_ftp_code(err), err)
}
