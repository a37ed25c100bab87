mod common;

use std::fs;
use std::io::{BufRead, BufReader, Write};
use std::net::TcpListener;
use std::thread;

use common::*;
use netftp::client::transfer_between;
use netftp::error::FtpError;
use netftp::transfer::{Outcome, TransferType};

#[test]
fn test_greeting_login_and_quit() {
    let server = start_server();
    let mut control = RawControl::connect(server.addr);

    assert_eq!(control.line(), "220 Welcome to netftp server");
    assert_eq!(control.send("LIST"), "530 Please login with USER and PASS.");
    assert_eq!(control.send("PASS alice123"), "503 Login with USER first.");
    assert_eq!(control.send("USER alice"), "331 Password required for alice.");
    assert_eq!(control.send("PASS wrong"), "530 Login incorrect.");
    assert_eq!(control.send("USER nobody"), "331 Password required for nobody.");
    assert_eq!(control.send("PASS alice123"), "530 Login incorrect.");
    assert_eq!(control.send("USER alice"), "331 Password required for alice.");
    assert_eq!(control.send("PASS alice123"), "230 User alice logged in.");
    assert_eq!(control.send("PWD"), "257 \"/\" is current directory.");
    assert_eq!(control.send("FROB"), "500 'FROB': command not understood.");
    assert_eq!(control.send("MAIL x"), "502 MAIL command not implemented.");
    assert_eq!(control.send("QUIT"), "221 Goodbye.");
}

#[test]
fn test_data_address_checks() {
    let server = start_server();
    let mut control = RawControl::connect(server.addr);
    control.line();
    control.send("USER alice");
    control.send("PASS alice123");

    assert_eq!(
        control.send("PORT 10,0,0,1,7,138"),
        "500 Illegal data address 10.0.0.1:1930."
    );
    assert!(control.send("PORT 1,2,3").starts_with("501 "));
    assert_eq!(control.send("EPRT |1|127.0.0.1|5000|"), "200 EPRT command successful.");
    assert!(control.send("EPSV 2").starts_with("522 "));
    assert!(control.send("PASV").starts_with("227 Entering Passive Mode (127,0,0,1,"));
    assert!(control.send("EPSV").starts_with("229 Entering Extended Passive Mode (|||"));
    assert_eq!(control.send("EPSV ALL"), "200 EPSV ALL command successful.");
    assert_eq!(control.send("PASV"), "501 EPSV ALL in effect.");
}

#[test]
fn test_passive_get_and_put() {
    let server = start_server();
    let local = tempfile::tempdir().unwrap();
    let payload = pattern(200_000);
    fs::write(server.path("remote.bin"), &payload).unwrap();

    let (mut session, output) = login(&server, client_settings());
    session.set_type(TransferType::Image).unwrap();

    let fetched = local.path().join("fetched.bin");
    let report = session.get("remote.bin", path_str(&fetched)).unwrap();
    assert_eq!(report.outcome, Outcome::Complete);
    assert_eq!(report.bytes, payload.len() as u64);
    assert_eq!(fs::read(&fetched).unwrap(), payload);

    let report = session.put(path_str(&fetched), "copy.bin").unwrap();
    assert!(report.is_complete());
    assert_eq!(fs::read(server.path("copy.bin")).unwrap(), payload);

    assert!(!session.has_data_channel());
    assert!(output.text().contains("200000 bytes received in"));
    session.quit().unwrap();
}

#[test]
fn test_active_mode_transfer() {
    let server = start_server();
    let local = tempfile::tempdir().unwrap();
    let payload = pattern(50_000);
    let source = local.path().join("up.bin");
    fs::write(&source, &payload).unwrap();

    let mut settings = client_settings();
    settings.passive = false;
    let (mut session, _) = login(&server, settings);
    session.set_type(TransferType::Image).unwrap();

    session.put(path_str(&source), "up.bin").unwrap();
    assert_eq!(fs::read(server.path("up.bin")).unwrap(), payload);

    let back = local.path().join("back.bin");
    session.get("up.bin", path_str(&back)).unwrap();
    assert_eq!(fs::read(&back).unwrap(), payload);
}

#[test]
fn test_image_restart_both_directions() {
    let server = start_server();
    let local = tempfile::tempdir().unwrap();
    let payload = pattern(100_000);
    fs::write(server.path("big.bin"), &payload).unwrap();

    let (mut session, _) = login(&server, client_settings());
    session.set_type(TransferType::Image).unwrap();

    // resume a retrieve from what is already here
    let partial = local.path().join("big.bin");
    fs::write(&partial, &payload[..30_000]).unwrap();
    let report = session.reget("big.bin", path_str(&partial)).unwrap();
    assert_eq!(report.bytes, 70_000);
    assert_eq!(fs::read(&partial).unwrap(), payload);

    // resume a store from what the server has
    fs::write(server.path("half.bin"), &payload[..40_000]).unwrap();
    session.set_restart_point(Some(40_000));
    let report = session.send("STOR", path_str(&partial), Some("half.bin")).unwrap();
    assert_eq!(report.bytes, 60_000);
    assert_eq!(fs::read(server.path("half.bin")).unwrap(), payload);
    assert_eq!(session.restart_point(), None);
}

#[test]
fn test_restart_beyond_end_is_refused() {
    let server = start_server();
    fs::write(server.path("small.txt"), b"tiny").unwrap();
    let mut control = RawControl::connect(server.addr);
    control.line();
    control.send("USER alice");
    control.send("PASS alice123");
    control.send("TYPE I");

    assert!(control.send("REST 999").starts_with("350 Restarting at 999."));
    assert_eq!(
        control.send("RETR small.txt"),
        "554 Action not taken: invalid REST value 999 for /small.txt."
    );
}

#[test]
fn test_ascii_round_trip() {
    let server = start_server();
    let local = tempfile::tempdir().unwrap();
    let text = b"first line\nsecond line\n\nlast line without newline".to_vec();
    let source = local.path().join("notes.txt");
    fs::write(&source, &text).unwrap();

    let (mut session, output) = login(&server, client_settings());
    assert_eq!(session.transfer_type(), TransferType::Ascii);

    let sent = session.put(path_str(&source), "notes.txt").unwrap();
    // three newlines grew a carriage return on the wire
    assert_eq!(sent.bytes, text.len() as u64 + 3);
    assert_eq!(fs::read(server.path("notes.txt")).unwrap(), text);

    let back = local.path().join("back.txt");
    let received = session.get("notes.txt", path_str(&back)).unwrap();
    assert_eq!(received.bare_lfs, 0);
    assert_eq!(fs::read(&back).unwrap(), text);
    assert!(!output.text().contains("bare linefeeds"));
}

#[test]
fn test_listing_and_directory_commands() {
    let server = start_server();
    let local = tempfile::tempdir().unwrap();
    fs::write(server.path("a.txt"), b"hello").unwrap();

    let (mut session, _) = login(&server, client_settings());
    let reply = session.quote("MKD sub").unwrap();
    assert_eq!(reply.code, 257);
    assert!(server.path("sub").is_dir());

    let names = local.path().join("names");
    session.list(None, path_str(&names), false).unwrap();
    assert_eq!(fs::read_to_string(&names).unwrap(), "a.txt\nsub\n");

    let long = local.path().join("long");
    session.list(None, path_str(&long), true).unwrap();
    let listing = fs::read_to_string(&long).unwrap();
    assert!(listing.lines().any(|l| l.starts_with('d') && l.ends_with(" sub")));
    assert!(listing.lines().any(|l| l.starts_with('-') && l.ends_with(" a.txt")));

    assert_eq!(session.quote("CWD sub").unwrap().code, 250);
    assert_eq!(session.quote("SIZE /a.txt").unwrap().text(), "213 5");
    assert_eq!(session.quote("CDUP").unwrap().code, 250);
    assert_eq!(session.quote("RNFR a.txt").unwrap().code, 350);
    assert_eq!(session.quote("RNTO b.txt").unwrap().code, 250);
    assert!(server.path("b.txt").exists());
    assert_eq!(session.quote("DELE b.txt").unwrap().code, 250);
    assert_eq!(session.quote("RMD sub").unwrap().code, 250);
    assert_eq!(session.quote("DELE missing").unwrap().code, 550);
}

#[test]
fn test_third_party_transfer() {
    let source_server = start_server();
    let target_server = start_server();
    let payload = pattern(120_000);
    fs::write(source_server.path("orig.bin"), &payload).unwrap();

    let (mut source, _) = login(&source_server, client_settings());
    let (mut target, _) = login(&target_server, client_settings());
    source.set_type(TransferType::Image).unwrap();

    let outcome = transfer_between(&mut source, &mut target, "orig.bin", "copy.bin").unwrap();
    assert_eq!(outcome, Outcome::Complete);
    assert_eq!(fs::read(target_server.path("copy.bin")).unwrap(), payload);

    // both control connections are still usable
    assert_eq!(source.command("NOOP").unwrap().code, 200);
    assert_eq!(target.command("NOOP").unwrap().code, 200);
}

#[test]
fn test_too_many_connections() {
    let server = start_server_with(|config| config.max_clients = 1);
    let (_first, _) = login(&server, client_settings());

    let mut second = RawControl::connect(server.addr);
    assert_eq!(second.line(), "421 Too many connections. Try again later.");
}

#[test]
fn test_421_tears_down_the_session() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    thread::spawn(move || {
        let (stream, _) = listener.accept().unwrap();
        let mut writer = stream.try_clone().unwrap();
        let mut reader = BufReader::new(stream);
        writer.write_all(b"220 mock ready\r\n").unwrap();
        let mut line = String::new();
        reader.read_line(&mut line).unwrap();
        writer
            .write_all(b"421-Going down\r\n421 Service closing control connection.\r\n")
            .unwrap();
    });

    let (mut session, _) = connect(addr, client_settings());
    let err = session.command("NOOP").unwrap_err();
    assert!(matches!(err, FtpError::LostPeer(_)));
    assert!(err.is_fatal());
    assert!(!session.is_connected());
    assert!(matches!(session.command("NOOP"), Err(FtpError::NotConnected)));
}
