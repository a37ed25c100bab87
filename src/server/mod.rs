//! Server core functionality
//!
//! The tokio accept loop, one blocking session per control connection,
//! command handlers, data connection setup and server side transfers.

pub mod control;
pub mod core;
pub mod data;
pub mod handlers;
pub mod oob;
pub mod session;
pub mod state;
pub mod transfer;

pub use core::Server;
pub use session::ClientSession;
