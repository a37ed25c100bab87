//! Command handlers for the netftp server.
//!
//! `handle_command` dispatches a parsed command to its `handle_cmd_*`
//! function. Handlers turn every failure into a reply; transfers write their
//! own 150 and return the final reply like everything else.

use std::net::SocketAddr;
use std::thread;

use log::{info, warn};

use crate::auth;
use crate::error::handlers::error_reply;
use crate::error::{AddressError, AuthError, DataChannelError, FtpServerError, StorageError};
use crate::protocol::address::{self, Family};
use crate::protocol::cmdtab;
use crate::protocol::responses::*;
use crate::protocol::{Command, CommandResult, CommandStatus};
use crate::server::data::{DataPlan, is_v4, passive_address};
use crate::server::session::ClientSession;
use crate::server::transfer::{self, Direction};
use crate::storage::operations;
use crate::transfer::TransferType;

/// Dispatches a received FTP command to its corresponding handler.
pub fn handle_command(session: &mut ClientSession, command: Command) -> CommandResult {
    match command {
        Command::USER(username) => handle_cmd_user(session, &username),
        Command::PASS(password) => handle_cmd_pass(session, &password),
        Command::QUIT => handle_cmd_quit(session),
        Command::PORT(arg) => handle_cmd_port(session, &arg),
        Command::LPRT(arg) => handle_cmd_lprt(session, &arg),
        Command::EPRT(arg) => handle_cmd_eprt(session, &arg),
        Command::PASV => handle_cmd_pasv(session),
        Command::LPSV => handle_cmd_lpsv(session),
        Command::EPSV(arg) => handle_cmd_epsv(session, arg.as_deref()),
        Command::TYPE(arg) => handle_cmd_type(session, &arg),
        Command::STRU(arg) => handle_cmd_stru(&arg),
        Command::MODE(arg) => handle_cmd_mode(&arg),
        Command::ALLO(_) => CommandResult::success(format_response(
            NOT_IMPLEMENTED_SUPERFLUOUS,
            "ALLO command ignored.",
        )),
        Command::REST(arg) => handle_cmd_rest(session, &arg),
        Command::RETR(path) => transfer::retrieve(session, &path),
        Command::STOR(path) => transfer::store(session, &path, Direction::Store),
        Command::STOU(path) => transfer::store(session, &path, Direction::StoreUnique),
        Command::APPE(path) => transfer::store(session, &path, Direction::Append),
        Command::LIST(path) => transfer::list(session, path.as_deref(), true),
        Command::NLST(path) => transfer::list(session, path.as_deref(), false),
        Command::RNFR(path) => handle_cmd_rnfr(session, &path),
        Command::RNTO(path) => handle_cmd_rnto(session, &path),
        Command::ABOR => CommandResult::success(format_response(
            ABORT_OK,
            "ABOR command successful.",
        )),
        Command::DELE(path) => handle_cmd_dele(session, &path),
        Command::RMD(path) => handle_cmd_rmd(session, &path),
        Command::MKD(path) => handle_cmd_mkd(session, &path),
        Command::PWD => handle_cmd_pwd(session),
        Command::CWD(path) => handle_cmd_cwd(session, path.as_deref().unwrap_or("/")),
        Command::CDUP => handle_cmd_cwd(session, ".."),
        Command::SYST => CommandResult::success(format_response(SYSTEM_TYPE, "UNIX Type: L8")),
        Command::STAT(None) => handle_cmd_stat(session),
        Command::STAT(Some(path)) => handle_cmd_stat_path(session, &path),
        Command::HELP(topic) => handle_cmd_help(topic.as_deref()),
        Command::NOOP => CommandResult::success(format_response(OK, "NOOP command successful.")),
        Command::FEAT => handle_cmd_feat(),
        Command::OPTS(arg) => CommandResult::failure(
            "unsupported option",
            format_response(BAD_ARGUMENTS, &format!("Option not understood: {}.", arg)),
        ),
        Command::SIZE(path) => handle_cmd_size(session, &path),
        Command::MDTM(path) => handle_cmd_mdtm(session, &path),
        Command::UNIMPLEMENTED(name) => CommandResult::failure(
            "unimplemented command",
            format_response(NOT_IMPLEMENTED, &format!("{} command not implemented.", name)),
        ),
        Command::SYNTAX(name) => CommandResult::failure(
            "syntax error",
            format_response(
                BAD_ARGUMENTS,
                &format!("'{}': syntax error in parameters or arguments.", name),
            ),
        ),
        Command::UNKNOWN(line) => CommandResult::failure(
            "unknown command",
            format_response(SYNTAX_ERROR, &format!("'{}': command not understood.", line)),
        ),
    }
}

pub(crate) fn failed(err: impl Into<FtpServerError>) -> CommandResult {
    let err = err.into();
    let message = error_reply(&err);
    CommandResult {
        status: CommandStatus::Failure(err.to_string()),
        message: Some(message),
    }
}

fn quote_path(path: &str) -> String {
    format!("\"{}\"", path.replace('"', "\"\""))
}

// --------------------
// Login
// --------------------

/// USER: records the name; whether it is known is only revealed at PASS.
fn handle_cmd_user(session: &mut ClientSession, username: &str) -> CommandResult {
    if session.state.is_logged_in() {
        info!("{} logging out to log in again", username);
        session.state.logout();
    }

    // 1. Configuration keys are case-folded, so names are too
    let username = username.to_ascii_lowercase();
    match auth::validate_user(&username, &session.config) {
        Ok(()) => session.state.set_user_valid(true),
        Err(AuthError::MalformedInput(reason)) => {
            session.state.set_user_valid(false);
            session.state.set_username(None);
            return failed(AuthError::MalformedInput(reason));
        }
        Err(e) => {
            warn!("USER rejected: {}", e);
            session.state.set_user_valid(false);
        }
    }

    // 2. Ask for the password either way
    let message = if auth::is_anonymous(&username) && session.state.is_user_valid() {
        "Guest login ok, send your complete e-mail address as password.".to_string()
    } else {
        format!("Password required for {}.", username)
    };
    session.state.set_username(Some(username));
    CommandResult::success(format_response(PASSWORD_REQUIRED, &message))
}

/// PASS: completes the login, pausing before any rejection.
fn handle_cmd_pass(session: &mut ClientSession, password: &str) -> CommandResult {
    // 1. Sequence checks
    if session.state.is_logged_in() {
        return CommandResult::failure(
            "already logged in",
            format_response(BAD_SEQUENCE, "Already logged in."),
        );
    }
    let Some(username) = session.state.username().cloned() else {
        return CommandResult::failure(
            "PASS before USER",
            format_response(BAD_SEQUENCE, "Login with USER first."),
        );
    };

    // 2. Credentials
    let verdict = if session.state.is_user_valid() {
        auth::validate_password(&username, password, &session.config)
    } else {
        Err(AuthError::UserNotFound(username.clone()))
    };

    match verdict {
        Ok(()) => {
            session.state.set_logged_in(true);
            info!("User {} logged in from {}", username, session.control.peer_addr());
            let message = if auth::is_anonymous(&username) {
                "Guest login ok, access restrictions apply.".to_string()
            } else {
                format!("User {} logged in.", username)
            };
            CommandResult::success(format_response(LOGIN_SUCCESS, &message))
        }
        Err(e) => {
            // 3. Slow down guessing before saying no
            warn!("Failed login from {}: {}", session.control.peer_addr(), e);
            thread::sleep(session.config.login_failure_delay());
            session.state.logout();
            CommandResult::failure(&e.to_string(), format_response(AUTH_FAILED, "Login incorrect."))
        }
    }
}

fn handle_cmd_quit(session: &mut ClientSession) -> CommandResult {
    session.state.logout();
    CommandResult {
        status: CommandStatus::CloseConnection,
        message: Some(format_response(GOODBYE, "Goodbye.")),
    }
}

// --------------------
// Data connection setup
// --------------------

/// Shared tail of PORT/LPRT/EPRT: validate and remember the address.
fn set_active(
    session: &mut ClientSession,
    verb: &str,
    decoded: Result<SocketAddr, AddressError>,
) -> CommandResult {
    if session.state.epsv_all() {
        return failed(DataChannelError::ExtendedOnly);
    }

    // 1. Well formed, right family
    let addr = match decoded {
        Ok(addr) => address::canonical(addr),
        Err(AddressError::UnsupportedFamily(_)) | Err(AddressError::FamilyMismatch { .. }) => {
            let ours = Family::of(session.control.local_addr().ip());
            return failed(DataChannelError::ProtocolNotSupported(ours.eprt_code()));
        }
        Err(e) => return failed(e),
    };
    let ctx = session.data_context();
    if let Err(e) = ctx.check_family(Family::of(addr.ip()).eprt_code()) {
        return failed(e);
    }

    // 2. Pointing back at the client
    let addr = match ctx.check_port_address(addr) {
        Ok(addr) => addr,
        Err(e) => return failed(e),
    };

    session.plan = DataPlan::Active(addr);
    CommandResult::success(format_response(OK, &format!("{} command successful.", verb)))
}

fn handle_cmd_port(session: &mut ClientSession, arg: &str) -> CommandResult {
    let decoded = address::decode_port(arg).map(SocketAddr::V4);
    set_active(session, "PORT", decoded)
}

fn handle_cmd_lprt(session: &mut ClientSession, arg: &str) -> CommandResult {
    let decoded = address::decode_lprt(arg);
    set_active(session, "LPRT", decoded)
}

fn handle_cmd_eprt(session: &mut ClientSession, arg: &str) -> CommandResult {
    let decoded = address::decode_eprt(arg);
    set_active(session, "EPRT", decoded)
}

/// Opens a passive listener and returns its address.
fn open_passive(session: &mut ClientSession) -> Result<SocketAddr, DataChannelError> {
    session.plan = DataPlan::Default;
    let listener = session.data_context().open_passive()?;
    let addr = passive_address(&listener)?;
    info!("Passive listener on {} for {}", addr, session.control.peer_addr());
    session.plan = DataPlan::Passive(listener);
    Ok(addr)
}

fn handle_cmd_pasv(session: &mut ClientSession) -> CommandResult {
    if session.state.epsv_all() {
        return failed(DataChannelError::ExtendedOnly);
    }
    if !is_v4(session.control.local_addr().ip()) {
        return failed(DataChannelError::ProtocolNotSupported(Family::V6.eprt_code()));
    }
    let addr = match open_passive(session) {
        Ok(addr) => addr,
        Err(e) => return failed(e),
    };
    match address::as_v4(addr) {
        Some(v4) => CommandResult::success(format_response(PASSIVE, &address::pasv_reply(v4))),
        None => {
            session.plan = DataPlan::Default;
            failed(DataChannelError::ProtocolNotSupported(Family::V6.eprt_code()))
        }
    }
}

fn handle_cmd_lpsv(session: &mut ClientSession) -> CommandResult {
    if session.state.epsv_all() {
        return failed(DataChannelError::ExtendedOnly);
    }
    match open_passive(session) {
        Ok(addr) => CommandResult::success(format_response(LONG_PASSIVE, &address::lpsv_reply(addr))),
        Err(e) => failed(e),
    }
}

fn handle_cmd_epsv(session: &mut ClientSession, arg: Option<&str>) -> CommandResult {
    // 1. EPSV ALL and EPSV <af>
    match arg {
        Some(a) if a.eq_ignore_ascii_case("ALL") => {
            session.state.set_epsv_all(true);
            return CommandResult::success(format_response(OK, "EPSV ALL command successful."));
        }
        Some(a) => {
            let Ok(family) = a.parse::<u8>() else {
                return CommandResult::failure(
                    "bad EPSV argument",
                    format_response(BAD_ARGUMENTS, &format!("Bad EPSV argument: {}.", a)),
                );
            };
            if let Err(e) = session.data_context().check_family(family) {
                return failed(e);
            }
        }
        None => {}
    }

    // 2. Listen
    match open_passive(session) {
        Ok(addr) => CommandResult::success(format_response(
            EXTENDED_PASSIVE,
            &address::epsv_reply(addr.port()),
        )),
        Err(e) => failed(e),
    }
}

// --------------------
// Transfer parameters
// --------------------

fn parse_type(arg: &str) -> Result<TransferType, (u16, &'static str)> {
    let mut words = arg.split_whitespace();
    let kind = words.next().unwrap_or("").to_ascii_uppercase();
    let param = words.next().map(str::to_ascii_uppercase);

    match (kind.as_str(), param.as_deref()) {
        ("A", None) | ("A", Some("N")) => Ok(TransferType::Ascii),
        ("A", Some("T")) | ("A", Some("C")) => Err((PARAMETER_NOT_IMPLEMENTED, "Form must be N.")),
        ("I", None) => Ok(TransferType::Image),
        ("L", Some("8")) => Ok(TransferType::Local(8)),
        ("L", Some(_)) => Err((PARAMETER_NOT_IMPLEMENTED, "Byte size must be 8.")),
        ("E", _) => Err((PARAMETER_NOT_IMPLEMENTED, "Type E not implemented.")),
        _ => Err((BAD_ARGUMENTS, "Unknown type.")),
    }
}

fn handle_cmd_type(session: &mut ClientSession, arg: &str) -> CommandResult {
    match parse_type(arg) {
        Ok(transfer_type) => {
            session.state.set_transfer_type(transfer_type);
            let shown = match transfer_type {
                TransferType::Local(size) => format!("L (byte size {})", size),
                other => other.type_arg(),
            };
            CommandResult::success(format_response(OK, &format!("Type set to {}.", shown)))
        }
        Err((code, text)) => CommandResult::failure(text, format_response(code, text)),
    }
}

fn handle_cmd_stru(arg: &str) -> CommandResult {
    match arg.to_ascii_uppercase().as_str() {
        "F" => CommandResult::success(format_response(OK, "STRU F ok.")),
        "R" | "P" => CommandResult::failure(
            "unsupported structure",
            format_response(PARAMETER_NOT_IMPLEMENTED, "Unimplemented STRU type."),
        ),
        _ => CommandResult::failure(
            "bad structure",
            format_response(BAD_ARGUMENTS, "Unknown STRU type."),
        ),
    }
}

fn handle_cmd_mode(arg: &str) -> CommandResult {
    match arg.to_ascii_uppercase().as_str() {
        "S" => CommandResult::success(format_response(OK, "MODE S ok.")),
        "B" | "C" => CommandResult::failure(
            "unsupported mode",
            format_response(NOT_IMPLEMENTED, "Unimplemented MODE type."),
        ),
        _ => CommandResult::failure("bad mode", format_response(BAD_ARGUMENTS, "Unknown MODE type.")),
    }
}

fn handle_cmd_rest(session: &mut ClientSession, arg: &str) -> CommandResult {
    match arg.trim().parse::<u64>() {
        Ok(offset) => {
            session.state.set_restart_point(Some(offset));
            CommandResult::success(format_response(
                PENDING_FURTHER_INFO,
                &format!(
                    "Restarting at {}. Send STORE or RETRIEVE to initiate transfer.",
                    offset
                ),
            ))
        }
        Err(_) => CommandResult::failure(
            "bad REST value",
            format_response(BAD_ARGUMENTS, &format!("Bad value for REST: {}.", arg)),
        ),
    }
}

// --------------------
// File system
// --------------------

fn handle_cmd_rnfr(session: &mut ClientSession, path: &str) -> CommandResult {
    match session.resolve_existing(path) {
        Ok((_, shown)) => {
            session.state.set_rename_from(Some(shown));
            CommandResult::success(format_response(
                PENDING_FURTHER_INFO,
                "File exists, ready for destination name.",
            ))
        }
        Err(e) => failed(e),
    }
}

fn handle_cmd_rnto(session: &mut ClientSession, path: &str) -> CommandResult {
    // 1. RNFR must come first
    let Some(from) = session.state.take_rename_from() else {
        return CommandResult::failure(
            "RNTO without RNFR",
            format_response(BAD_SEQUENCE, "Bad sequence of commands."),
        );
    };

    // 2. Both ends below the root
    let (from_real, _) = match session.resolve_existing(&from) {
        Ok(resolved) => resolved,
        Err(e) => return failed(e),
    };
    let (to_real, to_shown) = match session.resolve_new(path) {
        Ok(resolved) => resolved,
        Err(e) => return failed(e),
    };

    match operations::rename_path(&from_real, &to_real, &to_shown) {
        Ok(()) => CommandResult::success(format_response(FILE_ACTION_OK, "RNTO command successful.")),
        Err(e) => failed(e),
    }
}

fn handle_cmd_dele(session: &mut ClientSession, path: &str) -> CommandResult {
    let result = session
        .resolve_new(path)
        .and_then(|(real, shown)| operations::delete_file(&real, &shown));
    match result {
        Ok(()) => CommandResult::success(format_response(FILE_ACTION_OK, "DELE command successful.")),
        Err(e) => failed(e),
    }
}

fn handle_cmd_rmd(session: &mut ClientSession, path: &str) -> CommandResult {
    let result = session
        .resolve_existing(path)
        .and_then(|(real, shown)| {
            if shown == "/" {
                return Err(StorageError::PermissionDenied(shown));
            }
            operations::remove_directory(&real, &shown)
        });
    match result {
        Ok(()) => CommandResult::success(format_response(FILE_ACTION_OK, "RMD command successful.")),
        Err(e) => failed(e),
    }
}

fn handle_cmd_mkd(session: &mut ClientSession, path: &str) -> CommandResult {
    let result = session.resolve_new(path).and_then(|(real, shown)| {
        operations::make_directory(&real, &shown)?;
        Ok(shown)
    });
    match result {
        Ok(shown) => CommandResult::success(format_response(
            PATH_CREATED,
            &format!("{} directory created.", quote_path(&shown)),
        )),
        Err(e) => failed(e),
    }
}

fn handle_cmd_pwd(session: &mut ClientSession) -> CommandResult {
    let cwd = quote_path(session.state.current_virtual_path());
    CommandResult::success(format_response(
        PATH_CREATED,
        &format!("{} is current directory.", cwd),
    ))
}

fn handle_cmd_cwd(session: &mut ClientSession, path: &str) -> CommandResult {
    // 1. Resolve and make sure it is a directory below the root
    let (real, shown) = match session.resolve_existing(path) {
        Ok(resolved) => resolved,
        Err(e) => return failed(e),
    };
    if !real.is_dir() {
        return failed(StorageError::NotADirectory(shown));
    }

    // 2. Move
    session.state.set_current_virtual_path(shown);
    CommandResult::success(format_response(FILE_ACTION_OK, "CWD command successful."))
}

fn handle_cmd_size(session: &mut ClientSession, path: &str) -> CommandResult {
    let ascii = session.state.transfer_type().is_ascii();
    let result = session
        .resolve_existing(path)
        .and_then(|(real, shown)| operations::transfer_size(&real, &shown, ascii));
    match result {
        Ok(size) => CommandResult::success(format_response(FILE_STATUS, &size.to_string())),
        Err(e) => failed(e),
    }
}

fn handle_cmd_mdtm(session: &mut ClientSession, path: &str) -> CommandResult {
    let result = session
        .resolve_existing(path)
        .and_then(|(real, shown)| operations::modification_time(&real, &shown));
    match result {
        Ok(stamp) => CommandResult::success(format_response(FILE_STATUS, &stamp)),
        Err(e) => failed(e),
    }
}

// --------------------
// Information
// --------------------

fn handle_cmd_stat(session: &mut ClientSession) -> CommandResult {
    let mut body = vec![format!("     Connected to {}", session.control.peer_addr())];
    match session.state.username() {
        Some(user) if session.state.is_logged_in() => {
            body.push(format!("     Logged in as {}", user));
        }
        _ => body.push("     Waiting for user name".to_string()),
    }
    body.push(format!(
        "     TYPE: {}, FORM: Nonprint; STRUcture: File; transfer MODE: Stream",
        session.state.transfer_type().mode_name()
    ));
    body.push(match &session.plan {
        DataPlan::Default => "     No data connection".to_string(),
        DataPlan::Active(addr) => format!("     Data connection to {}", addr),
        DataPlan::Passive(_) => "     In passive mode".to_string(),
    });

    CommandResult::success(format_multiline(
        SYSTEM_STATUS,
        "netftp server status:",
        &body,
        "End of status",
    ))
}

fn handle_cmd_stat_path(session: &mut ClientSession, path: &str) -> CommandResult {
    let result = session
        .resolve_existing(path)
        .and_then(|(real, shown)| operations::list_directory(&real, &shown, true));
    match result {
        Ok(lines) => CommandResult::success(format_multiline(
            DIRECTORY_STATUS,
            &format!("status of {}:", path),
            &lines,
            "End of Status",
        )),
        Err(e) => failed(e),
    }
}

fn handle_cmd_help(topic: Option<&str>) -> CommandResult {
    match topic {
        None => CommandResult::success(format_multiline(
            HELP,
            "The following commands are recognized (* =>'s unimplemented).",
            &cmdtab::help_table(),
            "Direct comments to the server administrator.",
        )),
        Some(name) => match cmdtab::help_for(name) {
            Some(text) => CommandResult::success(format_response(HELP, &text)),
            None => CommandResult::failure(
                "unknown help topic",
                format_response(
                    NOT_IMPLEMENTED,
                    &format!("Unknown command {}.", name.to_ascii_uppercase()),
                ),
            ),
        },
    }
}

fn handle_cmd_feat() -> CommandResult {
    let body: Vec<String> = cmdtab::FEATURES.iter().map(|f| format!(" {}", f)).collect();
    CommandResult::success(format_multiline(
        SYSTEM_STATUS,
        "Extensions supported:",
        &body,
        "End.",
    ))
}
