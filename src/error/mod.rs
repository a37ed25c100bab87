//! Error handling
//!
//! Defines error types for the client, the server and the shared engine,
//! plus the mapping from server errors to FTP reply codes.

pub mod handlers;
pub mod types;

pub use types::*;
