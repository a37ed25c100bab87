//! FTP client
//!
//! A blocking, single-threaded client built around `Session`. Interrupts
//! arrive through an `AbortFlag` (usually raised by `SIGINT`) and are turned
//! into the RFC 959 abort sequence.

pub mod abort;
pub mod console;
pub mod control;
pub mod dataconn;
pub mod local;
pub mod proxy;
pub mod session;
pub mod transfer;

pub use abort::AbortFlag;
pub use console::Console;
pub use dataconn::DataChannel;
pub use local::LocalMode;
pub use proxy::transfer_between;
pub use session::{Session, SessionState};
