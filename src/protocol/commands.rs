//! Module `commands`
//!
//! Server-side command parsing and the result type handlers return.

use crate::protocol::cmdtab;

/// Represents an FTP command parsed from the client input.
///
/// Aliases (`XCWD`, `XPWD`, ...) parse to their RFC 959 variant.
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum Command {
    USER(String),
    PASS(String),
    CWD(Option<String>),
    CDUP,
    QUIT,
    PORT(String),
    PASV,
    LPRT(String),
    LPSV,
    EPRT(String),
    EPSV(Option<String>),
    TYPE(String),
    STRU(String),
    MODE(String),
    RETR(String),
    STOR(String),
    STOU(String),
    APPE(String),
    ALLO(String),
    REST(String),
    RNFR(String),
    RNTO(String),
    ABOR,
    DELE(String),
    RMD(String),
    MKD(String),
    PWD,
    LIST(Option<String>),
    NLST(Option<String>),
    SYST,
    STAT(Option<String>),
    HELP(Option<String>),
    NOOP,
    FEAT,
    OPTS(String),
    SIZE(String),
    MDTM(String),
    /// Listed in the command table but not implemented.
    UNIMPLEMENTED(String),
    /// Known command used with a missing or unexpected argument.
    SYNTAX(String),
    UNKNOWN(String),
}

impl Command {
    /// Commands that may be issued before login.
    pub fn allowed_before_login(&self) -> bool {
        matches!(
            self,
            Command::USER(_)
                | Command::PASS(_)
                | Command::QUIT
                | Command::SYST
                | Command::FEAT
                | Command::HELP(_)
                | Command::NOOP
                | Command::STAT(None)
                | Command::ABOR
                | Command::UNIMPLEMENTED(_)
                | Command::SYNTAX(_)
                | Command::UNKNOWN(_)
        )
    }
}

/// Represents the outcome status of executing a command.
#[derive(Debug, PartialEq, Eq)]
pub enum CommandStatus {
    Success,
    Failure(String),
    CloseConnection,
}

/// Struct encapsulating the full result of a command execution.
///
/// `message` is the complete reply text, terminated with CRLF; `None`
/// when nothing more is to be said (the connection is going away).
#[derive(Debug)]
pub struct CommandResult {
    pub status: CommandStatus,
    pub message: Option<String>,
}

impl CommandResult {
    pub fn success(message: String) -> Self {
        CommandResult {
            status: CommandStatus::Success,
            message: Some(message),
        }
    }

    pub fn failure(reason: &str, message: String) -> Self {
        CommandResult {
            status: CommandStatus::Failure(reason.to_string()),
            message: Some(message),
        }
    }
}

/// Parses a raw command line received from a client into the `Command` enum.
pub fn parse_command(raw: &str) -> Command {
    let trimmed = raw.trim_start().trim_end_matches(['\r', '\n']);
    let mut parts = trimmed.splitn(2, ' ');
    let verb = parts.next().unwrap_or("").to_ascii_uppercase();
    let rest = parts.next().unwrap_or("");
    let arg = Some(rest.trim()).filter(|a| !a.is_empty()).map(str::to_string);

    let name = match verb.as_str() {
        "XCWD" => "CWD",
        "XCUP" => "CDUP",
        "XPWD" => "PWD",
        "XMKD" => "MKD",
        "XRMD" => "RMD",
        other => other,
    };

    match (name, arg) {
        ("USER", Some(a)) => Command::USER(a),
        // Empty passwords are legal
        ("PASS", _) => Command::PASS(rest.trim_end().to_string()),
        ("CWD", a) => Command::CWD(a),
        ("CDUP", None) => Command::CDUP,
        ("QUIT", None) => Command::QUIT,
        ("PORT", Some(a)) => Command::PORT(a),
        ("PASV", None) => Command::PASV,
        ("LPRT", Some(a)) => Command::LPRT(a),
        ("LPSV", None) => Command::LPSV,
        ("EPRT", Some(a)) => Command::EPRT(a),
        ("EPSV", a) => Command::EPSV(a),
        ("TYPE", Some(a)) => Command::TYPE(a),
        ("STRU", Some(a)) => Command::STRU(a),
        ("MODE", Some(a)) => Command::MODE(a),
        ("RETR", Some(a)) => Command::RETR(a),
        ("STOR", Some(a)) => Command::STOR(a),
        ("STOU", Some(a)) => Command::STOU(a),
        ("APPE", Some(a)) => Command::APPE(a),
        ("ALLO", Some(a)) => Command::ALLO(a),
        ("REST", Some(a)) => Command::REST(a),
        ("RNFR", Some(a)) => Command::RNFR(a),
        ("RNTO", Some(a)) => Command::RNTO(a),
        ("ABOR", None) => Command::ABOR,
        ("DELE", Some(a)) => Command::DELE(a),
        ("RMD", Some(a)) => Command::RMD(a),
        ("MKD", Some(a)) => Command::MKD(a),
        ("PWD", None) => Command::PWD,
        ("LIST", a) => Command::LIST(a),
        ("NLST", a) => Command::NLST(a),
        ("SYST", None) => Command::SYST,
        ("STAT", a) => Command::STAT(a),
        ("HELP", a) => Command::HELP(a),
        ("NOOP", None) => Command::NOOP,
        ("FEAT", None) => Command::FEAT,
        ("OPTS", Some(a)) => Command::OPTS(a),
        ("SIZE", Some(a)) => Command::SIZE(a),
        ("MDTM", Some(a)) => Command::MDTM(a),
        (name, _) => match cmdtab::lookup(name) {
            Some(info) if !info.implemented => Command::UNIMPLEMENTED(info.name.to_string()),
            Some(info) => Command::SYNTAX(info.name.to_string()),
            None => Command::UNKNOWN(trimmed.to_string()),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_basic_commands() {
        assert_eq!(parse_command("USER alice\r\n"), Command::USER("alice".into()));
        assert_eq!(parse_command("retr notes.txt"), Command::RETR("notes.txt".into()));
        assert_eq!(parse_command("PASV"), Command::PASV);
        assert_eq!(parse_command("QUIT\r\n"), Command::QUIT);
    }

    #[test]
    fn test_parse_keeps_spaces_in_file_names() {
        assert_eq!(
            parse_command("STOR my file.txt\r\n"),
            Command::STOR("my file.txt".into())
        );
    }

    #[test]
    fn test_aliases_map_to_rfc_959_commands() {
        assert_eq!(parse_command("XPWD"), Command::PWD);
        assert_eq!(parse_command("XMKD dir"), Command::MKD("dir".into()));
        assert_eq!(parse_command("XCUP"), Command::CDUP);
    }

    #[test]
    fn test_optional_arguments() {
        assert_eq!(parse_command("LIST"), Command::LIST(None));
        assert_eq!(parse_command("LIST sub"), Command::LIST(Some("sub".into())));
        assert_eq!(parse_command("EPSV ALL"), Command::EPSV(Some("ALL".into())));
        assert_eq!(parse_command("CWD"), Command::CWD(None));
        assert_eq!(parse_command("PASS"), Command::PASS(String::new()));
    }

    #[test]
    fn test_misuse_and_unknown() {
        assert_eq!(parse_command("RETR"), Command::SYNTAX("RETR".into()));
        assert_eq!(parse_command("PASV now"), Command::SYNTAX("PASV".into()));
        assert_eq!(parse_command("MAIL bob"), Command::UNIMPLEMENTED("MAIL".into()));
        assert_eq!(parse_command("FROB x"), Command::UNKNOWN("FROB x".into()));
    }
}
