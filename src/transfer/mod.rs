//! Transfer module
//!
//! Representation types, the ASCII codec and the block copy loop shared by
//! the client and the server, plus transfer reports and throughput lines.

pub mod ascii;
pub mod engine;
pub mod modes;
pub mod results;
pub mod stats;

// Re-export key types and functions
pub use engine::{HashMarks, Interrupt, NoInterrupt, TransferOptions, receive, send};
pub use modes::{TransferMode, TransferType};
pub use results::{Outcome, TransferReport};
