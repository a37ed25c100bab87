//! Telnet bytes used on the control connection.
//!
//! The control connection is a Telnet NVT stream. Neither side negotiates
//! options: every WILL/WONT is refused with DONT and every DO/DONT with WONT.

pub const IAC: u8 = 255;
pub const DONT: u8 = 254;
pub const DO: u8 = 253;
pub const WONT: u8 = 252;
pub const WILL: u8 = 251;
pub const IP: u8 = 244;
pub const DM: u8 = 242;

/// What a single control byte turned out to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Telnet {
    Data(u8),
    /// Option negotiation that must be answered with these bytes.
    Respond([u8; 3]),
    Skip,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum State {
    #[default]
    Normal,
    Command,
    Option(u8),
}

/// Byte-at-a-time Telnet command stripper.
#[derive(Debug, Default)]
pub struct TelnetDecoder {
    state: State,
}

impl TelnetDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn feed(&mut self, byte: u8) -> Telnet {
        match self.state {
            State::Normal if byte == IAC => {
                self.state = State::Command;
                Telnet::Skip
            }
            State::Normal => Telnet::Data(byte),
            State::Command => match byte {
                WILL | WONT | DO | DONT => {
                    self.state = State::Option(byte);
                    Telnet::Skip
                }
                IAC => {
                    self.state = State::Normal;
                    Telnet::Data(IAC)
                }
                // IP, DM and friends carry no data
                _ => {
                    self.state = State::Normal;
                    Telnet::Skip
                }
            },
            State::Option(verb) => {
                self.state = State::Normal;
                let answer = if verb == WILL || verb == WONT { DONT } else { WONT };
                Telnet::Respond([IAC, answer, byte])
            }
        }
    }
}

/// The interrupt sequence sent as urgent data ahead of `ABOR`.
pub const INTERRUPT: [u8; 3] = [IAC, IP, IAC];

#[cfg(test)]
mod tests {
    use super::*;

    fn run(bytes: &[u8]) -> (Vec<u8>, Vec<[u8; 3]>) {
        let mut decoder = TelnetDecoder::new();
        let mut data = Vec::new();
        let mut answers = Vec::new();
        for &b in bytes {
            match decoder.feed(b) {
                Telnet::Data(d) => data.push(d),
                Telnet::Respond(r) => answers.push(r),
                Telnet::Skip => {}
            }
        }
        (data, answers)
    }

    #[test]
    fn test_refuses_every_option() {
        let (data, answers) = run(&[b'2', IAC, WILL, 1, b'0', IAC, DO, 3, b'0']);
        assert_eq!(data, b"200");
        assert_eq!(answers, vec![[IAC, DONT, 1], [IAC, WONT, 3]]);
    }

    #[test]
    fn test_interrupt_and_sync_are_dropped() {
        let mut stream = vec![IAC, IP, IAC, DM];
        stream.extend_from_slice(b"ABOR\r\n");
        let (data, answers) = run(&stream);
        assert_eq!(data, b"ABOR\r\n");
        assert!(answers.is_empty());
    }

    #[test]
    fn test_escaped_iac_is_data() {
        let (data, _) = run(&[b'a', IAC, IAC, b'b']);
        assert_eq!(data, vec![b'a', IAC, b'b']);
    }
}
