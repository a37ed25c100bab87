mod common;

use std::fs;
use std::io::{BufRead, BufReader, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::thread::{self, JoinHandle};

use common::{client_settings, connect, path_str};
use netftp::config::SendPort;
use netftp::protocol::address;

/// Where the next RETR's data goes.
enum Pending {
    Listen(TcpListener),
    Connect(SocketAddr),
}

/// A server that refuses the verbs in `refused` with 500, serves `payload`
/// for every RETR and returns every command line it saw once QUIT arrives.
fn scripted_server(
    listener: TcpListener,
    refused: &'static [&'static str],
    payload: &'static [u8],
) -> JoinHandle<Vec<String>> {
    thread::spawn(move || {
        let (stream, peer) = listener.accept().unwrap();
        let mut writer = stream.try_clone().unwrap();
        let mut reader = BufReader::new(stream);
        writer.write_all(b"220 scripted ready\r\n").unwrap();

        let mut seen = Vec::new();
        let mut pending: Option<Pending> = None;
        loop {
            let mut line = String::new();
            if reader.read_line(&mut line).unwrap_or(0) == 0 {
                break;
            }
            let line = line.trim_end().to_string();
            seen.push(line.clone());
            let (verb, arg) = line.split_once(' ').unwrap_or((line.as_str(), ""));

            if refused.contains(&verb) {
                writer.write_all(b"500 Not here.\r\n").unwrap();
                continue;
            }
            match verb {
                "EPSV" | "PASV" | "LPSV" => {
                    let data = TcpListener::bind("127.0.0.1:0").unwrap();
                    let local = data.local_addr().unwrap();
                    let reply = match verb {
                        "EPSV" => format!("229 {}\r\n", address::epsv_reply(local.port())),
                        "PASV" => {
                            let v4 = address::as_v4(local).unwrap();
                            format!("227 {}\r\n", address::pasv_reply(v4))
                        }
                        _ => format!("228 {}\r\n", address::lpsv_reply(local)),
                    };
                    pending = Some(Pending::Listen(data));
                    writer.write_all(reply.as_bytes()).unwrap();
                }
                "EPRT" | "PORT" | "LPRT" => {
                    let addr = match verb {
                        "EPRT" => address::decode_eprt(arg).unwrap(),
                        "PORT" => SocketAddr::V4(address::decode_port(arg).unwrap()),
                        _ => address::decode_lprt(arg).unwrap(),
                    };
                    pending = Some(Pending::Connect(addr));
                    let reply = format!("200 {} command successful.\r\n", verb);
                    writer.write_all(reply.as_bytes()).unwrap();
                }
                "RETR" => {
                    writer
                        .write_all(b"150 Opening ASCII mode data connection.\r\n")
                        .unwrap();
                    // nothing announced: the client waits on its control port
                    let mut data = match pending.take().unwrap_or(Pending::Connect(peer)) {
                        Pending::Listen(data) => data.accept().unwrap().0,
                        Pending::Connect(addr) => TcpStream::connect(addr).unwrap(),
                    };
                    data.write_all(payload).unwrap();
                    drop(data);
                    writer.write_all(b"226 Transfer complete.\r\n").unwrap();
                }
                "QUIT" => {
                    writer.write_all(b"221 Goodbye.\r\n").unwrap();
                    break;
                }
                _ => writer.write_all(b"502 Not implemented.\r\n").unwrap(),
            }
        }
        seen
    })
}

/// Runs two retrieves against a scripted server and returns what it saw.
fn two_gets(refused: &'static [&'static str], passive: bool, sendport: SendPort) -> Vec<String> {
    let local = tempfile::tempdir().unwrap();
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    let server = scripted_server(listener, refused, b"hello\r\n");

    let mut settings = client_settings();
    settings.passive = passive;
    settings.sendport = sendport;
    let (mut session, _) = connect(addr, settings);

    for name in ["first", "second"] {
        let target = local.path().join(name);
        let report = session.get(name, path_str(&target)).unwrap();
        assert!(report.is_complete());
        assert_eq!(fs::read(&target).unwrap(), b"hello\n");
    }
    session.quit().unwrap();
    server.join().unwrap()
}

#[test]
fn test_refused_epsv_falls_back_to_pasv_for_good() {
    let seen = two_gets(&["EPSV"], true, SendPort::Auto);
    assert_eq!(
        seen,
        ["EPSV", "PASV", "RETR first", "PASV", "RETR second", "QUIT"]
    );
}

#[test]
fn test_lpsv_is_the_last_passive_form() {
    let seen = two_gets(&["EPSV", "PASV"], true, SendPort::Auto);
    assert_eq!(
        seen,
        [
            "EPSV",
            "PASV",
            "LPSV",
            "RETR first",
            "PASV",
            "LPSV",
            "RETR second",
            "QUIT"
        ]
    );
}

#[test]
fn test_refused_eprt_falls_back_to_port_for_good() {
    let seen = two_gets(&["EPRT"], false, SendPort::Auto);
    let verbs: Vec<&str> = seen.iter().map(|l| l.split(' ').next().unwrap()).collect();
    assert_eq!(verbs, ["EPRT", "PORT", "RETR", "PORT", "RETR", "QUIT"]);
    assert!(seen[1].starts_with("PORT 127,0,0,1,"));
}

#[test]
fn test_auto_sendport_uses_the_default_port_when_all_refused() {
    let seen = two_gets(&["EPRT", "PORT", "LPRT"], false, SendPort::Auto);
    let verbs: Vec<&str> = seen.iter().map(|l| l.split(' ').next().unwrap()).collect();
    assert_eq!(
        verbs,
        ["EPRT", "PORT", "LPRT", "RETR", "PORT", "LPRT", "RETR", "QUIT"]
    );
}

#[test]
fn test_sendport_never_skips_announcements() {
    let seen = two_gets(&[], false, SendPort::Never);
    assert_eq!(seen, ["RETR first", "RETR second", "QUIT"]);
}
