//! Control connection reply reader.
//!
//! Reads one complete, possibly multi-line, reply from the peer. Telnet
//! option negotiation embedded in the stream is answered on `telnet_out` and
//! never reaches the reply text. The address payload of 227/228/229 replies
//! is captured while reading.

use std::io::{self, BufRead, Write};

use crate::protocol::telnet::{Telnet, TelnetDecoder};

/// First digit of a reply code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyClass {
    Preliminary,
    Complete,
    Continue,
    Transient,
    Error,
}

impl ReplyClass {
    pub fn of(code: u16) -> Self {
        match code / 100 {
            1 => ReplyClass::Preliminary,
            2 => ReplyClass::Complete,
            3 => ReplyClass::Continue,
            4 => ReplyClass::Transient,
            _ => ReplyClass::Error,
        }
    }
}

/// A complete reply as read from the control connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub code: u16,
    /// Every line of the reply, without line terminators.
    pub lines: Vec<String>,
    /// Text captured from a 227/228/229 reply, ending before `)` or the
    /// line end. 227 and 228 start at the first digit after the code, 229
    /// right after the `(` (so `|||port|`).
    pub payload: Option<String>,
    /// The peer is gone: EOF where none was expected, or a 421 on any line.
    pub lost_peer: bool,
}

pub const LOST_PEER_TEXT: &str = "Service not available, remote server has closed connection";

impl Reply {
    /// Builds a single-line reply that did not come off the wire.
    pub fn synthetic(code: u16, text: &str) -> Self {
        Reply {
            code,
            lines: vec![format!("{} {}", code, text)],
            payload: None,
            lost_peer: code == 421,
        }
    }

    pub fn class(&self) -> ReplyClass {
        ReplyClass::of(self.code)
    }

    pub fn is(&self, class: ReplyClass) -> bool {
        self.class() == class
    }

    /// The terminal line.
    pub fn text(&self) -> &str {
        self.lines.last().map(String::as_str).unwrap_or("")
    }

    /// The terminal line without its code.
    pub fn message(&self) -> &str {
        let text = self.text();
        text.get(4..).unwrap_or("")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Capture {
    Idle,
    Armed,
    Capturing,
    Done,
}

fn next_byte<R: BufRead>(reader: &mut R) -> io::Result<Option<u8>> {
    loop {
        let buf = match reader.fill_buf() {
            Ok(buf) => buf,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        let Some(&byte) = buf.first() else {
            return Ok(None);
        };
        reader.consume(1);
        return Ok(Some(byte));
    }
}

fn end_of_stream(expect_eof: bool, lines: Vec<String>) -> Reply {
    if expect_eof {
        return Reply {
            code: 221,
            lines,
            payload: None,
            lost_peer: false,
        };
    }
    Reply::synthetic(421, LOST_PEER_TEXT)
}

/// Reads one reply.
///
/// The first three digits of each line form that line's code. A `-` in the
/// fourth column opens a multi-line block, which only ends at a line
/// carrying the opening code without the `-`. A second `-` line discards its
/// own code so it can never close the block.
pub fn read_reply<R: BufRead, W: Write>(
    reader: &mut R,
    telnet_out: &mut W,
    expect_eof: bool,
) -> io::Result<Reply> {
    let mut decoder = TelnetDecoder::new();
    let mut lines = Vec::new();
    let mut original: u16 = 0;
    let mut continuation = false;
    let mut capture = Capture::Idle;
    // 229 payloads start at `(`, the others at their first digit
    let mut extended = false;
    let mut payload = String::new();
    let mut saw_421 = false;

    loop {
        let mut code: u16 = 0;
        let mut column = 0usize;
        let mut line = Vec::new();

        loop {
            let Some(byte) = next_byte(reader)? else {
                return Ok(end_of_stream(expect_eof, lines));
            };
            let c = match decoder.feed(byte) {
                Telnet::Data(c) => c,
                Telnet::Respond(answer) => {
                    telnet_out.write_all(&answer)?;
                    telnet_out.flush()?;
                    continue;
                }
                Telnet::Skip => continue,
            };
            if c == b'\n' {
                break;
            }

            column += 1;
            if column < 4 && c.is_ascii_digit() {
                code = code * 10 + u16::from(c - b'0');
            }
            if column == 3 && code == 421 {
                saw_421 = true;
            }
            if capture == Capture::Idle && matches!(code, 227..=229) {
                capture = Capture::Armed;
                extended = code == 229;
            }
            let mut opening = false;
            if column > 4 && capture == Capture::Armed {
                opening = if extended { c == b'(' } else { c.is_ascii_digit() };
                if opening {
                    capture = Capture::Capturing;
                }
            }
            if capture == Capture::Capturing && !(opening && extended) {
                if c != b'\r' && c != b')' {
                    payload.push(char::from(c));
                } else {
                    capture = Capture::Done;
                }
            }
            if column == 4 && c == b'-' {
                if continuation {
                    code = 0;
                }
                continuation = true;
            }
            if c != b'\r' {
                line.push(c);
            }
        }

        lines.push(String::from_utf8_lossy(&line).into_owned());

        if continuation && code != original {
            if original == 0 {
                original = code;
            }
            continue;
        }

        return Ok(Reply {
            code,
            lines,
            payload: (capture >= Capture::Capturing).then_some(payload),
            lost_peer: saw_421 || code == 421 || original == 421,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::telnet::{DO, DONT, IAC, WILL, WONT};
    use std::io::Cursor;

    fn parse(input: &[u8]) -> (Reply, Vec<u8>) {
        let mut reader = Cursor::new(input.to_vec());
        let mut out = Vec::new();
        let reply = read_reply(&mut reader, &mut out, false).unwrap();
        (reply, out)
    }

    #[test]
    fn test_single_line() {
        let (reply, _) = parse(b"200 Type set to I.\r\n");
        assert_eq!(reply.code, 200);
        assert_eq!(reply.class(), ReplyClass::Complete);
        assert_eq!(reply.message(), "Type set to I.");
        assert!(!reply.lost_peer);
    }

    #[test]
    fn test_multiline_ends_on_matching_code() {
        let (reply, _) = parse(b"150-first\r\n150-second\r\n150 third\r\n200 next\r\n");
        assert_eq!(reply.code, 150);
        assert_eq!(reply.class(), ReplyClass::Preliminary);
        assert_eq!(reply.lines, vec!["150-first", "150-second", "150 third"]);
    }

    #[test]
    fn test_multiline_ignores_other_codes_inside_block() {
        let (reply, _) = parse(b"211-Status\r\n 200 not the end\r\n226 nor this\r\n211 End\r\n");
        assert_eq!(reply.code, 211);
        assert_eq!(reply.lines.len(), 4);
        assert_eq!(reply.text(), "211 End");
    }

    #[test]
    fn test_does_not_read_past_reply() {
        let mut reader = Cursor::new(b"150 Opening\r\n226 Done\r\n".to_vec());
        let mut out = Vec::new();
        let first = read_reply(&mut reader, &mut out, false).unwrap();
        let second = read_reply(&mut reader, &mut out, false).unwrap();
        assert_eq!(first.code, 150);
        assert_eq!(second.code, 226);
    }

    #[test]
    fn test_passive_payload_captured() {
        let (reply, _) = parse(b"227 Entering Passive Mode (10,0,0,1,7,138)\r\n");
        assert_eq!(reply.payload.as_deref(), Some("10,0,0,1,7,138"));

        let (reply, _) = parse(b"229 Entering Extended Passive Mode (|||4021|)\r\n");
        assert_eq!(reply.payload.as_deref(), Some("|||4021|"));

        // digits in the text ahead of the address are not the port
        let (reply, _) = parse(b"229 Entering Passive Mode for IPv6 (|||4021|)\r\n");
        assert_eq!(reply.payload.as_deref(), Some("|||4021|"));

        let (reply, _) = parse(b"228 Entering Long Passive Mode (4,4,127,0,0,1,2,7,138)\r\n");
        assert_eq!(reply.payload.as_deref(), Some("4,4,127,0,0,1,2,7,138"));

        let (reply, _) = parse(b"200 PORT command successful.\r\n");
        assert_eq!(reply.payload, None);
    }

    #[test]
    fn test_421_marks_peer_lost() {
        let (reply, _) = parse(b"421 Timeout (900 seconds): closing control connection.\r\n");
        assert!(reply.lost_peer);
        assert_eq!(reply.class(), ReplyClass::Transient);
    }

    #[test]
    fn test_421_opening_multiline_marks_peer_lost() {
        let (reply, _) = parse(b"421-Shutting down\r\n421 now\r\n");
        assert!(reply.lost_peer);
    }

    #[test]
    fn test_421_inside_multiline_marks_peer_lost() {
        let (reply, _) = parse(b"150-first\r\n421 Service not available\r\n150 third\r\n");
        assert_eq!(reply.code, 150);
        assert!(reply.lost_peer);
    }

    #[test]
    fn test_eof_mid_multiline_is_lost_peer() {
        let (reply, _) = parse(b"150-first\r\n150-sec");
        assert_eq!(reply.code, 421);
        assert!(reply.lost_peer);
        assert_eq!(reply.class(), ReplyClass::Transient);
    }

    #[test]
    fn test_expected_eof_is_goodbye() {
        let mut reader = Cursor::new(Vec::new());
        let mut out = Vec::new();
        let reply = read_reply(&mut reader, &mut out, true).unwrap();
        assert_eq!(reply.code, 221);
        assert!(!reply.lost_peer);
    }

    #[test]
    fn test_option_negotiation_is_refused() {
        let mut input = vec![IAC, WILL, 1];
        input.extend_from_slice(b"220 ");
        input.extend_from_slice(&[IAC, DO, 24]);
        input.extend_from_slice(b"ready\r\n");
        let (reply, out) = parse(&input);
        assert_eq!(reply.text(), "220 ready");
        assert_eq!(out, vec![IAC, DONT, 1, IAC, WONT, 24]);
    }
}
