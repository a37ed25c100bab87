//! FTP Protocol implementation
//!
//! Wire-level pieces shared by the client and the server: Telnet handling,
//! reply parsing, data address formats, command parsing and the static
//! command table.

pub mod address;
pub mod cmdtab;
pub mod commands;
pub mod reply;
pub mod responses;
pub mod telnet;

pub use commands::{Command, CommandResult, CommandStatus, parse_command};
pub use reply::{Reply, ReplyClass, read_reply};
