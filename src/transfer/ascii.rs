//! ASCII representation: local newlines on one side, CRLF on the wire.

use std::io::{self, BufReader, Read};

/// Appends `input` to `out` with every `\n` expanded to `\r\n`.
pub fn encode_into(input: &[u8], out: &mut Vec<u8>) {
    for &byte in input {
        if byte == b'\n' {
            out.push(b'\r');
        }
        out.push(byte);
    }
}

/// Streaming CRLF to newline decoder.
///
/// `\r\n` becomes `\n` (or stays `\r\n` when carriage returns are kept),
/// `\r\0` becomes `\r`, any other `\r` passes through. A `\n` with no `\r`
/// before it is written as is and counted as a bare linefeed.
#[derive(Debug, Default)]
pub struct AsciiDecoder {
    keep_cr: bool,
    pending_cr: bool,
    bare_lfs: u64,
}

impl AsciiDecoder {
    pub fn new(keep_cr: bool) -> Self {
        AsciiDecoder {
            keep_cr,
            ..Default::default()
        }
    }

    pub fn decode_into(&mut self, input: &[u8], out: &mut Vec<u8>) {
        for &byte in input {
            if self.pending_cr {
                self.pending_cr = false;
                match byte {
                    b'\n' if !self.keep_cr => out.push(b'\n'),
                    b'\0' => out.push(b'\r'),
                    b'\r' => {
                        out.push(b'\r');
                        self.pending_cr = true;
                    }
                    other => {
                        out.push(b'\r');
                        out.push(other);
                    }
                }
                continue;
            }

            match byte {
                b'\r' => self.pending_cr = true,
                b'\n' => {
                    self.bare_lfs += 1;
                    out.push(b'\n');
                }
                other => out.push(other),
            }
        }
    }

    /// Flushes a carriage return left hanging at end of stream.
    pub fn finish(&mut self, out: &mut Vec<u8>) {
        if self.pending_cr {
            self.pending_cr = false;
            out.push(b'\r');
        }
    }

    pub fn bare_lfs(&self) -> u64 {
        self.bare_lfs
    }
}

/// Finds the local file position matching an ASCII restart offset.
///
/// The offset counts wire bytes, so every local `\n` accounts for two. The
/// scan is approximate by nature (a file that already contains `\r\n` is
/// over-counted) and returns `None` when the file ends before the offset.
pub fn restart_position<R: Read>(reader: R, wire_offset: u64) -> io::Result<Option<u64>> {
    let mut bytes = BufReader::new(reader).bytes();
    let mut counted = 0u64;
    let mut position = 0u64;

    while counted < wire_offset {
        counted += 1;
        let Some(byte) = bytes.next().transpose()? else {
            return Ok(None);
        };
        position += 1;
        if byte == b'\n' {
            counted += 1;
        }
    }
    Ok(Some(position))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn decode(input: &[u8], keep_cr: bool) -> (Vec<u8>, u64) {
        let mut decoder = AsciiDecoder::new(keep_cr);
        let mut out = Vec::new();
        decoder.decode_into(input, &mut out);
        decoder.finish(&mut out);
        (out, decoder.bare_lfs())
    }

    #[test]
    fn test_encode_expands_newlines() {
        let mut out = Vec::new();
        encode_into(b"a\nb\n", &mut out);
        assert_eq!(out, b"a\r\nb\r\n");
    }

    #[test]
    fn test_newline_only_text_round_trips() {
        let text = b"first line\nsecond\n\nlast without newline";
        let mut wire = Vec::new();
        encode_into(text, &mut wire);
        let (back, bare) = decode(&wire, false);
        assert_eq!(back, text);
        assert_eq!(bare, 0);
    }

    #[test]
    fn test_decode_special_carriage_returns() {
        assert_eq!(decode(b"a\r\0b", false).0, b"a\rb");
        assert_eq!(decode(b"a\rb", false).0, b"a\rb");
        assert_eq!(decode(b"a\r\r\nb", false).0, b"a\r\nb");
        assert_eq!(decode(b"end\r", false).0, b"end\r");
    }

    #[test]
    fn test_keep_cr_preserves_crlf() {
        assert_eq!(decode(b"a\r\nb", true).0, b"a\r\nb");
    }

    #[test]
    fn test_bare_linefeeds_are_counted() {
        let (out, bare) = decode(b"one\ntwo\r\nthree\n", false);
        assert_eq!(out, b"one\ntwo\nthree\n");
        assert_eq!(bare, 2);
    }

    #[test]
    fn test_crlf_split_across_blocks() {
        let mut decoder = AsciiDecoder::new(false);
        let mut out = Vec::new();
        decoder.decode_into(b"ab\r", &mut out);
        decoder.decode_into(b"\ncd", &mut out);
        decoder.finish(&mut out);
        assert_eq!(out, b"ab\ncd");
        assert_eq!(decoder.bare_lfs(), 0);
    }

    #[test]
    fn test_restart_position_counts_newlines_twice() {
        let local = b"ab\ncd\nef";
        // wire form is "ab\r\ncd\r\nef"; offset 4 is just past the first line
        assert_eq!(restart_position(Cursor::new(local), 4).unwrap(), Some(3));
        assert_eq!(restart_position(Cursor::new(local), 0).unwrap(), Some(0));
        assert_eq!(restart_position(Cursor::new(local), 10).unwrap(), Some(8));
        assert_eq!(restart_position(Cursor::new(local), 11).unwrap(), None);
    }
}
