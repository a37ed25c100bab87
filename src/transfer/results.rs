//! Transfer result types
//!
//! Defines what a finished (or interrupted) transfer reports.

use std::time::Duration;

use crate::transfer::stats::throughput_summary;

/// How a transfer loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Complete,
    /// An interrupt was observed; the caller still owes the peer an abort.
    Aborted,
    /// The peer closed the data connection while we were still writing.
    PeerClosed,
}

/// Result of one pass of the transfer engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferReport {
    /// Bytes moved over the data connection.
    pub bytes: u64,
    pub elapsed: Duration,
    pub outcome: Outcome,
    /// Linefeeds received without a carriage return (ASCII receive only).
    pub bare_lfs: u64,
}

impl TransferReport {
    pub fn is_complete(&self) -> bool {
        self.outcome == Outcome::Complete
    }

    pub fn summary(&self, direction: &str) -> String {
        throughput_summary(direction, self.bytes, self.elapsed)
    }
}
