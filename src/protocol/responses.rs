//! FTP Response handling
//!
//! Defines FTP response codes and formatting.

/// Standard FTP response codes
pub const OPENING_DATA: u16 = 150;
pub const OK: u16 = 200;
pub const NOT_IMPLEMENTED_SUPERFLUOUS: u16 = 202;
pub const SYSTEM_STATUS: u16 = 211;
pub const DIRECTORY_STATUS: u16 = 212;
pub const FILE_STATUS: u16 = 213;
pub const HELP: u16 = 214;
pub const SYSTEM_TYPE: u16 = 215;
pub const READY: u16 = 220;
pub const GOODBYE: u16 = 221;
pub const ABORT_OK: u16 = 225;
pub const TRANSFER_COMPLETE: u16 = 226;
pub const PASSIVE: u16 = 227;
pub const LONG_PASSIVE: u16 = 228;
pub const EXTENDED_PASSIVE: u16 = 229;
pub const LOGIN_SUCCESS: u16 = 230;
pub const FILE_ACTION_OK: u16 = 250;
pub const PATH_CREATED: u16 = 257;
pub const PASSWORD_REQUIRED: u16 = 331;
pub const PENDING_FURTHER_INFO: u16 = 350;
pub const SERVICE_UNAVAILABLE: u16 = 421;
pub const CANT_OPEN_DATA: u16 = 425;
pub const TRANSFER_ABORTED: u16 = 426;
pub const LOCAL_ERROR: u16 = 451;
pub const INSUFFICIENT_STORAGE: u16 = 452;
pub const SYNTAX_ERROR: u16 = 500;
pub const BAD_ARGUMENTS: u16 = 501;
pub const NOT_IMPLEMENTED: u16 = 502;
pub const BAD_SEQUENCE: u16 = 503;
pub const PARAMETER_NOT_IMPLEMENTED: u16 = 504;
pub const PROTOCOL_NOT_SUPPORTED: u16 = 522;
pub const AUTH_FAILED: u16 = 530;
pub const FILE_NOT_FOUND: u16 = 550;
pub const INPUT_FILE_ERROR: u16 = 551;
pub const FILE_NAME_NOT_ALLOWED: u16 = 553;
pub const BAD_RESTART: u16 = 554;

/// Format an FTP response message
pub fn format_response(code: u16, message: &str) -> String {
    format!("{} {}\r\n", code, message)
}

/// Format the opening line of a multi-line response
pub fn format_continuation(code: u16, message: &str) -> String {
    format!("{}-{}\r\n", code, message)
}

/// Format a multi-line response: `code-first`, indented body, `code last`.
pub fn format_multiline(code: u16, first: &str, body: &[String], last: &str) -> String {
    let mut out = format_continuation(code, first);
    for line in body {
        out.push_str(line);
        out.push_str("\r\n");
    }
    out.push_str(&format_response(code, last));
    out
}
