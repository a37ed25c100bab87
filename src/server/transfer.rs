//! Server transfers
//!
//! RETR, STOR, STOU, APPE, LIST and NLST: open the local side, honour a
//! pending REST, connect the data plan, announce with 150, run the transfer
//! engine while watching the control connection, then answer 226 or the
//! failure.

use std::fs::{File, OpenOptions};
use std::io::{self, Cursor, Read, Seek, SeekFrom, Write};
use std::net::TcpStream;
use std::path::Path;

use log::{error, info, warn};

use crate::error::{StorageError, TransferError};
use crate::protocol::responses::*;
use crate::protocol::{CommandResult, CommandStatus};
use crate::server::handlers::failed;
use crate::server::oob::{ControlWatch, Stop};
use crate::server::session::ClientSession;
use crate::storage::operations::{self, unique_path};
use crate::storage::resolve_virtual;
use crate::transfer::ascii::restart_position;
use crate::transfer::{self, Outcome, TransferOptions, TransferReport, TransferType};

/// Which store command is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Store,
    StoreUnique,
    Append,
}

fn closed() -> CommandResult {
    CommandResult {
        status: CommandStatus::CloseConnection,
        message: None,
    }
}

fn bad_restart(offset: u64, shown: &str) -> CommandResult {
    CommandResult::failure(
        "restart offset out of range",
        format_response(
            BAD_RESTART,
            &format!("Action not taken: invalid REST value {} for {}.", offset, shown),
        ),
    )
}

/// Local position matching a wire restart offset, or `None` when the file
/// is too short.
fn restart_offset(file: &mut File, offset: u64, ascii: bool) -> io::Result<Option<u64>> {
    if ascii {
        file.seek(SeekFrom::Start(0))?;
        restart_position(&mut *file, offset)
    } else {
        let len = file.metadata()?.len();
        Ok((offset <= len).then_some(offset))
    }
}

/// Connects the data plan and announces the transfer.
fn open_data(
    session: &mut ClientSession,
    name: &str,
    transfer_type: TransferType,
    size: Option<u64>,
) -> Result<TcpStream, CommandResult> {
    // 1. Connect (or accept)
    let plan = session.take_plan();
    let stream = session.data_context().connect(plan).map_err(failed)?;

    // 2. 150
    let suffix = size.map(|n| format!(" ({} bytes)", n)).unwrap_or_default();
    let text = format!(
        "Opening {} mode data connection for '{}'{}.",
        transfer_type.mode_name(),
        name,
        suffix
    );
    session
        .control
        .reply(&format_response(OPENING_DATA, &text))
        .map_err(|e| {
            warn!("Control connection lost before transfer: {}", e);
            closed()
        })?;
    Ok(stream)
}

/// Moves data between `local` and the data connection while watching the
/// control connection for ABOR and STAT.
fn run_engine(
    session: &mut ClientSession,
    data: &mut TcpStream,
    local: Local<'_>,
    transfer_type: TransferType,
    expected: Option<u64>,
) -> (Result<TransferReport, TransferError>, Option<Stop>) {
    let mut opts = TransferOptions::new(transfer_type, session.config.buffer_size);
    opts.stall_timeout = Some(session.config.data_timeout());

    let mut watch = ControlWatch::new(
        &mut session.control,
        &mut session.deferred,
        session.config.max_command_length,
        expected,
    );
    let result = match local {
        Local::Source(mut source) => transfer::send(&mut source, data, &mut opts, &mut watch),
        Local::Sink(mut sink) => transfer::receive(data, &mut sink, &mut opts, &mut watch),
    };
    (result, watch.stop())
}

enum Local<'a> {
    Source(&'a mut dyn Read),
    Sink(&'a mut dyn Write),
}

/// Final replies shared by every transfer.
fn conclude(
    session: &mut ClientSession,
    result: Result<TransferReport, TransferError>,
    stop: Option<Stop>,
    done: &str,
    local_error: u16,
) -> CommandResult {
    match result {
        Ok(report) => match (report.outcome, stop) {
            (Outcome::Complete, _) => {
                info!(
                    "{}: {} bytes in {:.3}s",
                    session.control.peer_addr(),
                    report.bytes,
                    report.elapsed.as_secs_f64()
                );
                let message = if report.bare_lfs > 0 {
                    format_multiline(
                        TRANSFER_COMPLETE,
                        &format!(
                            "WARNING! {} bare linefeeds received in ASCII mode",
                            report.bare_lfs
                        ),
                        &["   File may not have transferred correctly.".to_string()],
                        done,
                    )
                } else {
                    format_response(TRANSFER_COMPLETE, done)
                };
                CommandResult::success(message)
            }
            (Outcome::Aborted, Some(Stop::ControlClosed)) => closed(),
            (Outcome::Aborted, _) => {
                info!("Transfer aborted after {} bytes", report.bytes);
                let message = format!(
                    "{}{}",
                    format_response(TRANSFER_ABORTED, "Transfer aborted. Data connection closed."),
                    format_response(TRANSFER_COMPLETE, "Abort successful")
                );
                CommandResult::success(message)
            }
            (Outcome::PeerClosed, _) => CommandResult::failure(
                "data connection closed by client",
                format_response(TRANSFER_ABORTED, "Data connection: Connection closed by peer."),
            ),
        },
        Err(TransferError::Local(e)) => {
            error!("Local I/O error during transfer: {}", e);
            let text = if local_error == INPUT_FILE_ERROR {
                format!("Error on input file: {}.", e)
            } else {
                format!("Error writing file: {}.", e)
            };
            CommandResult::failure(&e.to_string(), format_response(local_error, &text))
        }
        Err(e @ TransferError::ShortWrite { .. }) => CommandResult::failure(
            &e.to_string(),
            format_response(INSUFFICIENT_STORAGE, &format!("Error writing file: {}.", e)),
        ),
        Err(TransferError::Network(e)) => CommandResult::failure(
            &e.to_string(),
            format_response(TRANSFER_ABORTED, &format!("Data connection: {}.", e)),
        ),
    }
}

/// RETR
pub fn retrieve(session: &mut ClientSession, path: &str) -> CommandResult {
    // 1. Existing plain file below the root
    let (real, shown) = match session.resolve_existing(path) {
        Ok(resolved) => resolved,
        Err(e) => return failed(e),
    };
    let metadata = match operations::plain_file(&real, &shown) {
        Ok(metadata) => metadata,
        Err(e) => return failed(e),
    };
    let mut file = match File::open(&real) {
        Ok(file) => file,
        Err(e) => return failed(StorageError::from_io(&shown, e)),
    };

    // 2. Restart
    let transfer_type = session.state.transfer_type();
    if let Some(offset) = session.state.take_restart_point() {
        match restart_offset(&mut file, offset, transfer_type.is_ascii()) {
            Ok(Some(position)) => {
                if let Err(e) = file.seek(SeekFrom::Start(position)) {
                    return failed(StorageError::from_io(&shown, e));
                }
                info!("RETR {} restarting at {} (local {})", shown, offset, position);
            }
            Ok(None) => return bad_restart(offset, &shown),
            Err(e) => return failed(StorageError::from_io(&shown, e)),
        }
    }

    // 3. Data connection
    let mut data = match open_data(session, path, transfer_type, Some(metadata.len())) {
        Ok(stream) => stream,
        Err(result) => return result,
    };

    // 4. Send
    let (result, stop) = run_engine(
        session,
        &mut data,
        Local::Source(&mut file),
        transfer_type,
        Some(metadata.len()),
    );
    drop(data);
    conclude(session, result, stop, "Transfer complete.", INPUT_FILE_ERROR)
}

/// Virtual path shown for a real path picked by `unique_path`.
fn unique_shown(shown: &str, unique: &Path) -> String {
    let name = unique
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    resolve_virtual(shown, &format!("../{}", name))
}

/// STOR, STOU and APPE
pub fn store(session: &mut ClientSession, path: &str, direction: Direction) -> CommandResult {
    // 1. Target below the root, made unique for STOU
    let (mut real, mut shown) = match session.resolve_new(path) {
        Ok(resolved) => resolved,
        Err(e) => return failed(e),
    };
    if direction == Direction::StoreUnique {
        match unique_path(&real) {
            Some(unique) => {
                shown = unique_shown(&shown, &unique);
                real = unique;
            }
            None => return failed(StorageError::NoUniqueName(shown)),
        }
    }

    // 2. Open; a restart keeps what is there
    let transfer_type = session.state.transfer_type();
    let restart = session
        .state
        .take_restart_point()
        .filter(|_| direction == Direction::Store);
    let mut options = OpenOptions::new();
    options.create(true);
    match (direction, restart) {
        (Direction::Append, _) => options.append(true),
        (_, Some(_)) => options.read(true).write(true),
        _ => options.write(true).truncate(true),
    };
    let mut file = match options.open(&real) {
        Ok(file) => file,
        Err(e) => {
            warn!("Cannot create {}: {}", real.display(), e);
            return CommandResult::failure(
                &e.to_string(),
                format_response(FILE_NAME_NOT_ALLOWED, &format!("{}: {}.", shown, e)),
            );
        }
    };

    if let Some(offset) = restart {
        match restart_offset(&mut file, offset, transfer_type.is_ascii()) {
            Ok(Some(position)) => {
                let positioned = file
                    .set_len(position)
                    .and_then(|_| file.seek(SeekFrom::Start(position)));
                if let Err(e) = positioned {
                    return failed(StorageError::from_io(&shown, e));
                }
                info!("STOR {} restarting at {} (local {})", shown, offset, position);
            }
            Ok(None) => return bad_restart(offset, &shown),
            Err(e) => return failed(StorageError::from_io(&shown, e)),
        }
    }

    // 3. Data connection
    let name = if direction == Direction::StoreUnique {
        shown.as_str()
    } else {
        path
    };
    let mut data = match open_data(session, name, transfer_type, None) {
        Ok(stream) => stream,
        Err(result) => return result,
    };

    // 4. Receive
    let (result, stop) = run_engine(
        session,
        &mut data,
        Local::Sink(&mut file),
        transfer_type,
        None,
    );
    drop(data);
    let result = result.and_then(|report| {
        file.flush().map_err(TransferError::Local)?;
        Ok(report)
    });

    let done = if direction == Direction::StoreUnique {
        format!("Transfer complete (unique file name:{}).", shown)
    } else {
        "Transfer complete.".to_string()
    };
    conclude(session, result, stop, &done, LOCAL_ERROR)
}

/// LIST (long) and NLST
pub fn list(session: &mut ClientSession, path: Option<&str>, long: bool) -> CommandResult {
    // 1. `ls` style options are accepted and ignored
    let target = path.filter(|p| !p.starts_with('-')).unwrap_or(".");
    let (real, shown) = match session.resolve_existing(target) {
        Ok(resolved) => resolved,
        Err(e) => return failed(e),
    };
    let lines = match operations::list_directory(&real, &shown, long) {
        Ok(lines) => lines,
        Err(e) => return failed(e),
    };

    // 2. Listings use the local newline; the engine puts CRLF on the wire
    let mut text = Vec::new();
    for line in &lines {
        text.extend_from_slice(line.as_bytes());
        text.push(b'\n');
    }
    let mut source = Cursor::new(text);

    // 3. Send
    let name = if long { "/bin/ls" } else { "file list" };
    let mut data = match open_data(session, name, TransferType::Ascii, None) {
        Ok(stream) => stream,
        Err(result) => return result,
    };
    let (result, stop) = run_engine(
        session,
        &mut data,
        Local::Source(&mut source),
        TransferType::Ascii,
        None,
    );
    drop(data);
    conclude(session, result, stop, "Transfer complete.", LOCAL_ERROR)
}
