mod common;

use std::net::TcpListener;
use std::thread;

use common::{Output, client_settings, endless_server};
use netftp::client::{AbortFlag, Console, Session};
use netftp::config::Verbosity;
use netftp::transfer::{Outcome, TransferType};

/// Some servers answer ABOR with 552 before the usual pair.
const STORAGE_EXCEEDED: &[u8] = b"552 Requested file action aborted.\r\n\
426 Transfer aborted. Data connection closed.\r\n\
226 Abort successful\r\n";

#[test]
fn test_abort_reads_past_a_552() {
    let local = tempfile::tempdir().unwrap();
    let target = local.path().join("endless");

    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    let server = thread::spawn(move || endless_server(listener, STORAGE_EXCEEDED));

    let flag = AbortFlag::new();
    flag.register_sigint().unwrap();
    let output = Output::default();
    let console = Console::new(Verbosity::Verbose, Box::new(output.clone()));
    let mut session = Session::connect("127.0.0.1", addr.port(), client_settings(), console).unwrap();
    session.set_abort_flag(flag.clone());
    session.set_type(TransferType::Image).unwrap();

    let report = session.get("endless", target.to_str().unwrap()).unwrap();
    assert_eq!(report.outcome, Outcome::Aborted);
    assert!(session.is_connected());

    let text = output.text();
    assert!(text.contains("552 Requested file action aborted."));
    assert!(text.contains("426 Transfer aborted."));
    assert!(text.contains("226 Abort successful"));

    // all three replies were consumed, so NOOP gets its own answer
    let reply = session.command("NOOP").unwrap();
    assert_eq!(reply.code, 200);
    assert_eq!(reply.text(), "200 NOOP ok.");
    session.quit().unwrap();
    server.join().unwrap();
}
