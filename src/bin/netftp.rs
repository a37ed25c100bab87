//! netftp - interactive FTP client
//!
//! A small command loop over `netftp::Session`. Ctrl-C interrupts a running
//! transfer (the session runs the abort sequence and stays connected).

use std::io::{self, BufRead, Write};
use std::process;

use clap::Parser;
use log::warn;

use netftp::client::{AbortFlag, Console, Session};
use netftp::config::{ClientConfig, DEFAULT_CONFIG_PATH, SendPort, Verbosity};
use netftp::error::FtpError;
use netftp::transfer::TransferType;

#[derive(Parser, Debug)]
#[command(name = "netftp", about = "File transfer client")]
struct Args {
    /// Host to connect to
    host: Option<String>,

    /// Control port of the host
    port: Option<u16>,

    /// Use passive mode for data connections
    #[arg(short = 'p', long)]
    passive: bool,

    /// Use active mode for data connections
    #[arg(short = 'A', long, conflicts_with = "passive")]
    active: bool,

    /// Echo every server reply
    #[arg(short = 'v', long)]
    verbose: bool,

    /// Only show errors
    #[arg(short = 'q', long, conflicts_with = "verbose")]
    quiet: bool,

    /// Do not log in automatically after connecting
    #[arg(short = 'n', long = "no-login")]
    no_login: bool,

    /// Configuration file (extension optional)
    #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
    config: String,
}

const HELP: &str = "Commands: open user get put append reget restart ls dir binary ascii \
passive sendport hash verbose cr runique sunique quote close quit";

enum Flow {
    Continue,
    Exit,
}

struct Shell<I: Iterator<Item = io::Result<String>>> {
    session: Session,
    input: I,
}

impl<I: Iterator<Item = io::Result<String>>> Shell<I> {
    fn prompt(&mut self, text: &str) -> Option<String> {
        print!("{}", text);
        let _ = io::stdout().flush();
        match self.input.next() {
            Some(Ok(line)) => Some(line.trim_end().to_string()),
            _ => None,
        }
    }

    fn say(&mut self, text: &str) {
        self.session.console_mut().error(text);
    }

    fn on_off(on: bool) -> &'static str {
        if on { "on" } else { "off" }
    }

    /// Connects and, unless told otherwise, logs in.
    fn open(&mut self, host: &str, port: u16, login: bool) -> Result<(), FtpError> {
        self.session.open(host, port)?;
        if login {
            let default = std::env::var("USER").unwrap_or_default();
            let name = self
                .prompt(&format!("Name ({}:{}): ", host, default))
                .filter(|n| !n.is_empty())
                .unwrap_or(default);
            self.login(&name, None)?;
        }
        Ok(())
    }

    fn login(&mut self, name: &str, password: Option<&str>) -> Result<(), FtpError> {
        let password = match password {
            Some(p) => p.to_string(),
            None => self.prompt("Password: ").unwrap_or_default(),
        };
        match self.session.login(name, Some(&password), None) {
            Ok(_) => Ok(()),
            Err(e) if e.is_fatal() => {
                // a server that hangs up during login is not coming back
                eprintln!("{}", e);
                process::exit(1);
            }
            Err(e) => Err(e),
        }
    }

    fn run(&mut self, words: &[&str], line: &str) -> Result<Flow, FtpError> {
        let arg = |i: usize| words.get(i).copied();

        match words[0] {
            "open" => {
                let Some(host) = arg(1) else {
                    self.say("usage: open host-name [port]");
                    return Ok(Flow::Continue);
                };
                let port = arg(2)
                    .and_then(|p| p.parse().ok())
                    .unwrap_or(self.session.settings().default_port);
                self.open(host, port, true)?;
            }
            "user" => match arg(1) {
                Some(name) => self.login(name, arg(2))?,
                None => self.say("usage: user user-name [password]"),
            },
            "get" | "recv" => match arg(1) {
                Some(remote) => {
                    self.session.get(remote, arg(2).unwrap_or(remote))?;
                }
                None => self.say("usage: get remote-file [local-file]"),
            },
            "reget" => match arg(1) {
                Some(remote) => {
                    self.session.reget(remote, arg(2).unwrap_or(remote))?;
                }
                None => self.say("usage: reget remote-file [local-file]"),
            },
            "put" | "send" | "append" => match arg(1) {
                Some(local) => {
                    let cmd = if words[0] == "append" { "APPE" } else { "STOR" };
                    self.session.send(cmd, local, Some(arg(2).unwrap_or(local)))?;
                }
                None => self.say("usage: put local-file [remote-file]"),
            },
            "restart" => match arg(1).map(str::parse::<u64>) {
                Some(Ok(offset)) => {
                    self.session.set_restart_point(Some(offset));
                    self.say(&format!(
                        "restarting at {}. execute get, put or append to initiate transfer",
                        offset
                    ));
                }
                _ => self.say("usage: restart byte-offset"),
            },
            "ls" | "dir" => {
                let long = words[0] == "dir";
                self.session.list(arg(1), arg(2).unwrap_or("-"), long)?;
            }
            "binary" | "image" => {
                self.session.set_type(TransferType::Image)?;
            }
            "ascii" => {
                self.session.set_type(TransferType::Ascii)?;
            }
            "passive" => {
                let on = !self.session.settings().passive;
                self.session.settings_mut().passive = on;
                self.say(&format!("Passive mode {}.", Self::on_off(on)));
            }
            "sendport" => {
                let settings = self.session.settings_mut();
                settings.sendport = match settings.sendport {
                    SendPort::Never => SendPort::Auto,
                    _ => SendPort::Never,
                };
                let on = settings.sendport != SendPort::Never;
                self.say(&format!("Use of PORT cmds {}.", Self::on_off(on)));
            }
            "hash" => {
                let settings = self.session.settings_mut();
                match arg(1).and_then(|b| b.parse::<u64>().ok()) {
                    Some(bytes) if bytes > 0 => {
                        settings.hash = true;
                        settings.hash_bytes = bytes;
                    }
                    _ => settings.hash = !settings.hash,
                }
                let text = if settings.hash {
                    format!("Hash mark printing on ({} bytes/hash mark).", settings.hash_bytes)
                } else {
                    "Hash mark printing off.".to_string()
                };
                self.say(&text);
            }
            "verbose" => {
                let console = self.session.console_mut();
                let on = !console.is_verbose();
                console.set_verbosity(if on { Verbosity::Verbose } else { Verbosity::Quiet });
                self.say(&format!("Verbose mode {}.", Self::on_off(on)));
            }
            "cr" => {
                let on = !self.session.settings().strip_cr;
                self.session.settings_mut().strip_cr = on;
                self.say(&format!("Carriage Return stripping {}.", Self::on_off(on)));
            }
            "runique" => {
                let on = !self.session.settings().runique;
                self.session.settings_mut().runique = on;
                self.say(&format!("Receive unique {}.", Self::on_off(on)));
            }
            "sunique" => {
                let on = !self.session.settings().sunique;
                self.session.settings_mut().sunique = on;
                self.say(&format!("Store unique {}.", Self::on_off(on)));
            }
            "quote" => {
                let raw = line.trim_start()[words[0].len()..].trim();
                if raw.is_empty() {
                    self.say("usage: quote line-to-send");
                } else {
                    self.session.quote(raw)?;
                }
            }
            "close" | "disconnect" => self.session.quit()?,
            "quit" | "bye" | "exit" => {
                let _ = self.session.quit();
                return Ok(Flow::Exit);
            }
            "help" | "?" => self.say(HELP),
            other => self.say(&format!("?Invalid command: {}", other)),
        }
        Ok(Flow::Continue)
    }
}

fn main() {
    env_logger::init();
    let args = Args::parse();

    // 1. Settings, then command line overrides
    let mut settings = match ClientConfig::load(&args.config) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("netftp: invalid configuration: {}", e);
            process::exit(2);
        }
    };
    if args.passive {
        settings.passive = true;
    }
    if args.active {
        settings.passive = false;
    }
    if args.verbose {
        settings.verbosity = Verbosity::Verbose;
    }
    if args.quiet {
        settings.verbosity = Verbosity::Quiet;
    }
    let default_port = settings.default_port;

    // 2. Session and interrupt handling
    let console = Console::stdout(settings.verbosity);
    let mut session = Session::new(settings, console);
    let flag = AbortFlag::new();
    if let Err(e) = flag.register_sigint() {
        warn!("Cannot catch SIGINT, interrupts will end the program: {}", e);
    }
    session.set_abort_flag(flag.clone());

    let stdin = io::stdin();
    let mut shell = Shell {
        session,
        input: stdin.lock().lines(),
    };

    // 3. Optional initial connection
    if let Some(host) = &args.host {
        let port = args.port.unwrap_or(default_port);
        if let Err(e) = shell.open(host, port, !args.no_login) {
            report(&mut shell.session, &e);
        }
    }

    // 4. Command loop
    loop {
        let Some(line) = shell.prompt("ftp> ") else {
            let _ = shell.session.quit();
            break;
        };
        flag.clear();
        let words: Vec<&str> = line.split_whitespace().collect();
        if words.is_empty() {
            continue;
        }
        match shell.run(&words, &line) {
            Ok(Flow::Continue) => {}
            Ok(Flow::Exit) => break,
            Err(e) => report(&mut shell.session, &e),
        }
    }
}

/// Prints an error unless the server's reply already said it.
fn report(session: &mut Session, err: &FtpError) {
    if !matches!(err, FtpError::Refused(_)) || !session.console_mut().is_verbose() {
        session.console_mut().error(&err.to_string());
    }
}
