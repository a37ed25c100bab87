//! netftp
//!
//! FTP control/data connection engine: reply parsing, data address
//! negotiation, transfer loops with restart and abort handling, plus a
//! small server that speaks the same protocol.

pub mod auth;
pub mod client;
pub mod config;
pub mod error;
pub mod net;
pub mod protocol;
pub mod server;
pub mod storage;
pub mod transfer;

pub use client::Session;
pub use config::{ClientConfig, ServerConfig};
pub use error::FtpError;
pub use server::Server;
