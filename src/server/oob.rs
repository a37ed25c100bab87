//! Control connection watch during transfers
//!
//! The control socket keeps urgent data inline, so a client's interrupt
//! sequence arrives as ordinary (Telnet-stripped) input followed by `ABOR`.
//! While a transfer runs, the engine asks `ControlWatch` between blocks
//! whether to stop; it answers `STAT` on the spot, stops on `ABOR` or a
//! closed control connection, and queues anything else for after the
//! transfer.

use std::collections::VecDeque;
use std::time::Duration;

use log::{info, warn};

use crate::protocol::responses::{FILE_STATUS, SYNTAX_ERROR, format_response};
use crate::protocol::{Command, parse_command};
use crate::server::control::{ControlChannel, Incoming};
use crate::transfer::Interrupt;

/// How long a transfer may wait for the rest of a command line.
const LINE_WAIT: Duration = Duration::from_millis(20);

/// Why a watched transfer was stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stop {
    Abort,
    ControlClosed,
}

pub struct ControlWatch<'a> {
    control: &'a mut ControlChannel,
    deferred: &'a mut VecDeque<String>,
    max_len: usize,
    expected: Option<u64>,
    stop: Option<Stop>,
}

impl<'a> ControlWatch<'a> {
    /// `expected` is the size announced in the opening reply, if any.
    pub fn new(
        control: &'a mut ControlChannel,
        deferred: &'a mut VecDeque<String>,
        max_len: usize,
        expected: Option<u64>,
    ) -> Self {
        ControlWatch {
            control,
            deferred,
            max_len,
            expected,
            stop: None,
        }
    }

    pub fn stop(&self) -> Option<Stop> {
        self.stop
    }

    fn status(&mut self, transferred: u64) {
        let text = match self.expected {
            Some(total) => format!("Status: {} of {} bytes transferred", transferred, total),
            None => format!("Status: {} bytes transferred", transferred),
        };
        if let Err(e) = self.control.reply(&format_response(FILE_STATUS, &text)) {
            warn!("Status reply failed: {}", e);
        }
    }

    /// Handles one command that arrived mid-transfer.
    fn handle(&mut self, line: String, transferred: u64) {
        match parse_command(&line) {
            Command::ABOR => {
                info!("ABOR received after {} bytes", transferred);
                self.stop = Some(Stop::Abort);
            }
            Command::STAT(None) => self.status(transferred),
            _ => self.deferred.push_back(line),
        }
    }
}

impl Interrupt for ControlWatch<'_> {
    fn interrupted(&mut self, transferred: u64) -> bool {
        while self.stop.is_none() {
            match self.control.has_input() {
                Ok(true) => {}
                Ok(false) => return false,
                Err(e) => {
                    warn!("Polling control connection failed: {}", e);
                    return false;
                }
            }
            match self.control.poll_command(self.max_len, LINE_WAIT) {
                // half a line: keep moving data, finish it next time
                Ok(None) => return false,
                Ok(Some(Incoming::Line(line))) => self.handle(line, transferred),
                Ok(Some(Incoming::TooLong)) => {
                    let _ = self
                        .control
                        .reply(&format_response(SYNTAX_ERROR, "Command too long."));
                }
                Ok(Some(Incoming::Closed)) => self.stop = Some(Stop::ControlClosed),
                Err(e) => {
                    warn!("Control connection failed during transfer: {}", e);
                    self.stop = Some(Stop::ControlClosed);
                }
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::telnet::INTERRUPT;
    use crate::protocol::telnet::DM;
    use std::io::{BufRead, BufReader, Write};
    use std::net::{TcpListener, TcpStream};
    use std::time::Duration;

    fn pair() -> (ControlChannel, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let client = TcpStream::connect(listener.local_addr().unwrap()).unwrap();
        let (server, _) = listener.accept().unwrap();
        (
            ControlChannel::new(server, Duration::from_secs(5)).unwrap(),
            client,
        )
    }

    fn wait_for_input(control: &ControlChannel) {
        for _ in 0..100 {
            if control.has_input().unwrap() {
                return;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        panic!("no input arrived");
    }

    #[test]
    fn test_quiet_control_does_not_interrupt() {
        let (mut control, _client) = pair();
        let mut deferred = VecDeque::new();
        let mut watch = ControlWatch::new(&mut control, &mut deferred, 512, None);
        assert!(!watch.interrupted(0));
        assert_eq!(watch.stop(), None);
    }

    #[test]
    fn test_stat_answered_and_others_deferred() {
        let (mut control, client) = pair();
        (&client).write_all(b"STAT\r\nPWD\r\n").unwrap();
        wait_for_input(&control);

        let mut deferred = VecDeque::new();
        {
            let mut watch = ControlWatch::new(&mut control, &mut deferred, 512, Some(100));
            assert!(!watch.interrupted(40));
        }
        assert_eq!(deferred, VecDeque::from(vec!["PWD".to_string()]));

        let mut line = String::new();
        BufReader::new(&client).read_line(&mut line).unwrap();
        assert_eq!(line, "213 Status: 40 of 100 bytes transferred\r\n");
    }

    #[test]
    fn test_partial_command_does_not_stall_transfer() {
        let (mut control, client) = pair();
        (&client).write_all(&INTERRUPT).unwrap();
        (&client).write_all(b"AB").unwrap();
        wait_for_input(&control);

        let mut deferred = VecDeque::new();
        let mut watch = ControlWatch::new(&mut control, &mut deferred, 512, None);
        let started = std::time::Instant::now();
        assert!(!watch.interrupted(10));
        assert!(started.elapsed() < Duration::from_secs(1));

        (&client).write_all(b"OR\r\n").unwrap();
        let mut stopped = false;
        for _ in 0..100 {
            if watch.interrupted(20) {
                stopped = true;
                break;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        assert!(stopped);
        assert_eq!(watch.stop(), Some(Stop::Abort));
    }

    #[test]
    fn test_interrupt_sequence_then_abor_stops() {
        let (mut control, client) = pair();
        (&client).write_all(&INTERRUPT).unwrap();
        (&client).write_all(&[DM]).unwrap();
        (&client).write_all(b"ABOR\r\n").unwrap();
        wait_for_input(&control);

        let mut deferred = VecDeque::new();
        let mut watch = ControlWatch::new(&mut control, &mut deferred, 512, None);
        assert!(watch.interrupted(10));
        assert_eq!(watch.stop(), Some(Stop::Abort));
    }
}
