#![allow(dead_code)]

use std::io::{BufRead, BufReader, ErrorKind, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use netftp::client::{Console, Session};
use netftp::config::{ClientConfig, ServerConfig, Verbosity};
use netftp::server::Server;
use tempfile::TempDir;

/// A server running on its own runtime, serving a scratch root.
pub struct TestServer {
    pub addr: SocketAddr,
    pub root: TempDir,
}

impl TestServer {
    pub fn path(&self, name: &str) -> PathBuf {
        self.root.path().join(name)
    }
}

pub fn start_server() -> TestServer {
    start_server_with(|_| {})
}

pub fn start_server_with(tweak: impl FnOnce(&mut ServerConfig)) -> TestServer {
    let root = tempfile::tempdir().unwrap();
    let mut config = ServerConfig {
        control_port: 0,
        server_root: root.path().to_string_lossy().into_owned(),
        login_failure_delay_ms: 0,
        data_timeout_secs: 5,
        ..ServerConfig::default()
    };
    tweak(&mut config);

    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        runtime.block_on(async move {
            let server = Server::bind(config).await.unwrap();
            tx.send(server.local_addr().unwrap()).unwrap();
            let _ = server.run().await;
        });
    });
    let addr = rx.recv_timeout(Duration::from_secs(5)).unwrap();

    TestServer { addr, root }
}

/// Everything the client printed.
#[derive(Clone, Default)]
pub struct Output(Arc<Mutex<Vec<u8>>>);

impl Output {
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl Write for Output {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

pub fn client_settings() -> ClientConfig {
    ClientConfig {
        connect_timeout_secs: 5,
        abort_timeout_secs: 5,
        poll_interval_ms: 50,
        third_party_delay_ms: 100,
        ..ClientConfig::default()
    }
}

pub fn connect(addr: SocketAddr, settings: ClientConfig) -> (Session, Output) {
    let output = Output::default();
    let console = Console::new(Verbosity::Verbose, Box::new(output.clone()));
    let session = Session::connect("127.0.0.1", addr.port(), settings, console).unwrap();
    (session, output)
}

/// Connected and logged in as alice.
pub fn login(server: &TestServer, settings: ClientConfig) -> (Session, Output) {
    let (mut session, output) = connect(server.addr, settings);
    session.login("alice", Some("alice123"), None).unwrap();
    (session, output)
}

/// Deterministic, non-text payload.
pub fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 31 % 251) as u8).collect()
}

pub fn path_str(path: &Path) -> &str {
    path.to_str().unwrap()
}

/// Raw control connection for checking replies byte for byte.
pub struct RawControl {
    reader: BufReader<TcpStream>,
    writer: TcpStream,
}

impl RawControl {
    pub fn connect(addr: SocketAddr) -> Self {
        let stream = TcpStream::connect(addr).unwrap();
        stream
            .set_read_timeout(Some(Duration::from_secs(5)))
            .unwrap();
        let writer = stream.try_clone().unwrap();
        RawControl {
            reader: BufReader::new(stream),
            writer,
        }
    }

    pub fn line(&mut self) -> String {
        let mut line = String::new();
        self.reader.read_line(&mut line).unwrap();
        line.trim_end().to_string()
    }

    pub fn send(&mut self, command: &str) -> String {
        self.writer
            .write_all(format!("{}\r\n", command).as_bytes())
            .unwrap();
        self.line()
    }
}

/// What an endless server answers to ABOR when the transfer was cut.
pub const ABORTED: &[u8] = b"426 Transfer aborted. Data connection closed.\r\n226 Abort successful\r\n";

/// Streams until told to stop, raising SIGINT once data is flowing.
fn stream_data(listener: TcpListener, go: mpsc::Receiver<()>, stop: Arc<AtomicBool>) {
    let (mut data, _) = listener.accept().unwrap();
    data.set_write_timeout(Some(Duration::from_millis(50))).unwrap();
    if go.recv().is_err() {
        return;
    }

    let chunk = vec![b'x'; 8192];
    let mut sent = 0usize;
    let mut last_raise: Option<Instant> = None;
    while !stop.load(Ordering::SeqCst) {
        match data.write(&chunk) {
            Ok(n) => sent += n,
            Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {}
            Err(_) => break,
        }
        let due = last_raise.is_none_or(|at| at.elapsed() > Duration::from_millis(100));
        if sent >= 256 * 1024 && due {
            signal_hook::low_level::raise(signal_hook::consts::SIGINT).unwrap();
            last_raise = Some(Instant::now());
        }
    }
}

/// A server whose RETR never ends on its own. `abor_replies` is written
/// verbatim once ABOR arrives and the stream has stopped.
pub fn endless_server(listener: TcpListener, abor_replies: &[u8]) {
    let (stream, _) = listener.accept().unwrap();
    let mut writer = stream.try_clone().unwrap();
    let mut reader = BufReader::new(stream);
    writer.write_all(b"220 endless ready\r\n").unwrap();

    let stop = Arc::new(AtomicBool::new(false));
    let mut go: Option<mpsc::Sender<()>> = None;
    let mut streamer: Option<JoinHandle<()>> = None;

    loop {
        let mut raw = Vec::new();
        if reader.read_until(b'\n', &mut raw).unwrap_or(0) == 0 {
            break;
        }
        // Telnet bytes ahead of ABOR are not UTF-8
        let line = String::from_utf8_lossy(&raw).trim_end().to_string();

        if line.starts_with("TYPE") {
            writer.write_all(b"200 Type set.\r\n").unwrap();
        } else if line == "EPSV" || line == "PASV" {
            let data = TcpListener::bind("127.0.0.1:0").unwrap();
            let port = data.local_addr().unwrap().port();
            let reply = if line == "EPSV" {
                format!("229 Entering Extended Passive Mode (|||{}|)\r\n", port)
            } else {
                format!(
                    "227 Entering Passive Mode (127,0,0,1,{},{})\r\n",
                    port >> 8,
                    port & 0xff
                )
            };
            let (tx, rx) = mpsc::channel();
            let flag = stop.clone();
            streamer = Some(thread::spawn(move || stream_data(data, rx, flag)));
            go = Some(tx);
            writer.write_all(reply.as_bytes()).unwrap();
        } else if line.starts_with("RETR") {
            writer
                .write_all(b"150 Opening BINARY mode data connection for endless.\r\n")
                .unwrap();
            if let Some(go) = go.take() {
                go.send(()).unwrap();
            }
        } else if line.ends_with("ABOR") {
            stop.store(true, Ordering::SeqCst);
            if let Some(handle) = streamer.take() {
                handle.join().unwrap();
            }
            writer.write_all(abor_replies).unwrap();
        } else if line == "NOOP" {
            writer.write_all(b"200 NOOP ok.\r\n").unwrap();
        } else if line == "QUIT" {
            writer.write_all(b"221 Goodbye.\r\n").unwrap();
            break;
        } else {
            writer.write_all(b"500 Unknown command.\r\n").unwrap();
        }
    }
}
