//! Third-party transfers between two servers
//!
//! The target is put in passive mode, the source is told to connect to the
//! target's address with PORT, and the two transfer commands are started.
//! Data flows directly between the servers; this side only reads replies.

use std::os::fd::AsFd;
use std::thread;

use log::{info, warn};

use crate::client::abort::AbortFlag;
use crate::client::session::Session;
use crate::error::FtpError;
use crate::net;
use crate::protocol::ReplyClass;
use crate::transfer::Outcome;

/// Waits until `session` has a reply to read. False means the flag was
/// raised first.
fn wait_for_reply(session: &Session, flag: &AbortFlag) -> Result<bool, FtpError> {
    let interval = session.settings().poll_interval();
    loop {
        let control = session.control()?;
        if control.has_buffered_input() {
            return Ok(true);
        }
        let ready =
            net::wait_readable(&[control.as_fd()], interval).map_err(FtpError::Network)?;
        if ready.first().copied().unwrap_or(false) {
            return Ok(true);
        }
        if flag.is_raised() {
            return Ok(false);
        }
    }
}

/// Withdraws the target's pending PASV when the source side fails.
fn cancel_target(target: &mut Session) {
    if let Err(e) = target.command("ABOR") {
        warn!("ABOR to proxy target failed: {}", e);
    }
}

/// Copies `source_path` on `source` to `target_path` on `target`.
///
/// An interrupt (the source session's abort flag) before the servers
/// finish aborts both sides and yields `Outcome::Aborted`.
pub fn transfer_between(
    source: &mut Session,
    target: &mut Session,
    source_path: &str,
    target_path: &str,
) -> Result<Outcome, FtpError> {
    let flag = source.abort_flag().clone();
    flag.clear();

    // 1. Both sides must use the same representation
    let transfer_type = source.transfer_type();
    target.ensure_type(transfer_type)?;
    source.ensure_type(transfer_type)?;

    // 2. Target listens
    let pasv = target.command("PASV")?;
    if !pasv.is(ReplyClass::Complete) {
        target
            .console_mut()
            .error("proxy server does not support third party transfers.");
        return Err(FtpError::Refused(pasv));
    }
    let Some(address) = pasv.payload.clone() else {
        return Err(FtpError::Protocol(
            "Passive mode address scan failure.".into(),
        ));
    };

    // 3. Source connects there
    let port = source.command(&format!("PORT {}", address))?;
    if !port.is(ReplyClass::Complete) {
        cancel_target(target);
        return Err(FtpError::Refused(port));
    }

    // 4. Start the source, give it time to connect, then the target
    let retr = source.command(&format!("RETR {}", source_path))?;
    if !retr.is(ReplyClass::Preliminary) {
        cancel_target(target);
        return Err(FtpError::Refused(retr));
    }
    thread::sleep(source.third_party_delay());

    let store = if target.settings().runique {
        "STOU"
    } else {
        "STOR"
    };
    let stor = target.command(&format!("{} {}", store, target_path))?;
    if !stor.is(ReplyClass::Preliminary) {
        warn!("target refused {}; aborting source", store);
        source.abort_remote(None)?;
        return Err(FtpError::Refused(stor));
    }
    info!("third party transfer {} -> {} started", source_path, target_path);

    // 5. Wait for both to finish
    if !wait_for_reply(target, &flag)? {
        info!("third party transfer interrupted");
        source.abort_remote(None)?;
        target.abort_remote(None)?;
        return Ok(Outcome::Aborted);
    }
    let target_done = target.read_reply(false)?;
    let source_done = source.read_reply(false)?;

    if !target_done.is(ReplyClass::Complete) {
        return Err(FtpError::Refused(target_done));
    }
    if !source_done.is(ReplyClass::Complete) {
        return Err(FtpError::Refused(source_done));
    }
    Ok(Outcome::Complete)
}
