//! User-facing output of the client: echoed replies, hash marks, transfer
//! summaries and error lines. Diagnostics go to the log instead.

use std::io::{self, Write};

use crate::config::Verbosity;
use crate::protocol::{Reply, ReplyClass};

pub struct Console {
    verbosity: Verbosity,
    out: Box<dyn Write + Send>,
}

impl Console {
    pub fn new(verbosity: Verbosity, out: Box<dyn Write + Send>) -> Self {
        Console { verbosity, out }
    }

    pub fn stdout(verbosity: Verbosity) -> Self {
        Console::new(verbosity, Box::new(io::stdout()))
    }

    pub fn verbosity(&self) -> Verbosity {
        self.verbosity
    }

    pub fn set_verbosity(&mut self, verbosity: Verbosity) {
        self.verbosity = verbosity;
    }

    pub fn is_verbose(&self) -> bool {
        self.verbosity == Verbosity::Verbose
    }

    /// Echoes a reply according to the verbosity level.
    pub fn reply(&mut self, reply: &Reply) {
        match self.verbosity {
            Verbosity::Verbose => {
                for line in &reply.lines {
                    let _ = writeln!(self.out, "{}", line);
                }
            }
            Verbosity::Quiet if reply.is(ReplyClass::Error) => {
                for line in &reply.lines {
                    let _ = writeln!(self.out, "{}", line.get(4..).unwrap_or(""));
                }
            }
            _ => {}
        }
        let _ = self.out.flush();
    }

    /// Informational line, shown only in verbose mode.
    pub fn note(&mut self, text: &str) {
        if self.is_verbose() {
            let _ = writeln!(self.out, "{}", text);
            let _ = self.out.flush();
        }
    }

    /// Always shown.
    pub fn error(&mut self, text: &str) {
        let _ = writeln!(self.out, "{}", text);
        let _ = self.out.flush();
    }

    /// Raw sink for hash marks.
    pub fn writer(&mut self) -> &mut dyn Write {
        &mut *self.out
    }
}
