//! Local ends of a client transfer
//!
//! A local name is `-` (standard input/output), `|command` (a shell pipe) or
//! a file path.

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Stdin, Stdout, Write};
use std::os::unix::fs::MetadataExt;
use std::path::Path;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};

use log::warn;

use crate::error::FtpError;
use crate::storage::unique_path;
use crate::transfer::ascii;

const DEFAULT_BLOCK_SIZE: usize = 8192;

/// How a received file is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocalMode {
    /// Create or truncate.
    Truncate,
    /// Create or append.
    Append,
    /// Create, keep existing contents; used when resuming.
    Update,
}

fn shell(command: &str) -> Command {
    let mut cmd = Command::new("sh");
    cmd.arg("-c").arg(command);
    cmd
}

fn block_size(file: &File) -> usize {
    match file.metadata() {
        Ok(metadata) if metadata.blksize() > 0 => metadata.blksize() as usize,
        _ => DEFAULT_BLOCK_SIZE,
    }
}

fn wait_child(mut child: Child, name: &str) {
    match child.wait() {
        Ok(status) if !status.success() => warn!("{}: exited with {}", name, status),
        Ok(_) => {}
        Err(e) => warn!("{}: {}", name, e),
    }
}

/// Where sent data comes from.
pub enum Source {
    Stdin(Stdin),
    Pipe { child: Child, stdout: ChildStdout },
    File(File),
}

impl Source {
    /// Opens a local name for sending. Files must be regular files.
    pub fn open(name: &str) -> Result<Source, FtpError> {
        if name == "-" {
            return Ok(Source::Stdin(io::stdin()));
        }
        if let Some(command) = name.strip_prefix('|') {
            let mut child = shell(command)
                .stdout(Stdio::piped())
                .spawn()
                .map_err(|e| FtpError::local(command, e))?;
            let stdout = child
                .stdout
                .take()
                .ok_or_else(|| FtpError::local(command, io::Error::other("no pipe")))?;
            return Ok(Source::Pipe { child, stdout });
        }

        let file = File::open(name).map_err(|e| FtpError::local(name, e))?;
        let metadata = file.metadata().map_err(|e| FtpError::local(name, e))?;
        if !metadata.is_file() {
            return Err(FtpError::NotPlainFile(name.to_string()));
        }
        Ok(Source::File(file))
    }

    pub fn block_size(&self) -> usize {
        match self {
            Source::File(file) => block_size(file),
            _ => DEFAULT_BLOCK_SIZE,
        }
    }

    /// Positions the source for a restarted send. Only files can restart.
    pub fn seek_restart(&mut self, name: &str, offset: u64, ascii_type: bool) -> Result<(), FtpError> {
        let Source::File(file) = self else {
            return Err(FtpError::local(
                name,
                io::Error::new(io::ErrorKind::Unsupported, "cannot restart a stream"),
            ));
        };
        seek_file(file, name, offset, ascii_type)
    }

    pub fn close(self, name: &str) {
        if let Source::Pipe { child, stdout } = self {
            drop(stdout);
            wait_child(child, name);
        }
    }
}

impl Read for Source {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Source::Stdin(stdin) => stdin.read(buf),
            Source::Pipe { stdout, .. } => stdout.read(buf),
            Source::File(file) => file.read(buf),
        }
    }
}

/// Seeks to the local position matching a restart offset.
fn seek_file(file: &mut File, name: &str, offset: u64, ascii_type: bool) -> Result<(), FtpError> {
    let position = if ascii_type {
        file.seek(SeekFrom::Start(0))
            .map_err(|e| FtpError::local(name, e))?;
        ascii::restart_position(&mut *file, offset)
            .map_err(|e| FtpError::local(name, e))?
            .ok_or_else(|| FtpError::RestartOutOfRange {
                offset,
                path: name.to_string(),
            })?
    } else {
        offset
    };
    file.seek(SeekFrom::Start(position))
        .map_err(|e| FtpError::local(name, e))?;
    Ok(())
}

/// Where received data goes.
pub enum Sink {
    Stdout(Stdout),
    Pipe { child: Child, stdin: ChildStdin },
    File(File),
}

impl Sink {
    pub fn open(name: &str, mode: LocalMode) -> Result<Sink, FtpError> {
        if name == "-" {
            return Ok(Sink::Stdout(io::stdout()));
        }
        if let Some(command) = name.strip_prefix('|') {
            let mut child = shell(command)
                .stdin(Stdio::piped())
                .spawn()
                .map_err(|e| FtpError::local(command, e))?;
            let stdin = child
                .stdin
                .take()
                .ok_or_else(|| FtpError::local(command, io::Error::other("no pipe")))?;
            return Ok(Sink::Pipe { child, stdin });
        }

        let mut options = OpenOptions::new();
        options.create(true);
        match mode {
            LocalMode::Truncate => options.write(true).truncate(true),
            LocalMode::Append => options.append(true),
            LocalMode::Update => options.read(true).write(true),
        };
        let file = options.open(name).map_err(|e| FtpError::local(name, e))?;
        Ok(Sink::File(file))
    }

    pub fn block_size(&self) -> usize {
        match self {
            Sink::File(file) => block_size(file),
            _ => DEFAULT_BLOCK_SIZE,
        }
    }

    pub fn seek_restart(&mut self, name: &str, offset: u64, ascii_type: bool) -> Result<(), FtpError> {
        let Sink::File(file) = self else {
            return Err(FtpError::local(
                name,
                io::Error::new(io::ErrorKind::Unsupported, "cannot restart a stream"),
            ));
        };
        seek_file(file, name, offset, ascii_type)
    }

    pub fn close(self, name: &str) {
        if let Sink::Pipe { child, stdin } = self {
            drop(stdin);
            wait_child(child, name);
        }
    }
}

impl Write for Sink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Sink::Stdout(out) => out.write(buf),
            Sink::Pipe { stdin, .. } => stdin.write(buf),
            Sink::File(file) => file.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Sink::Stdout(out) => out.flush(),
            Sink::Pipe { stdin, .. } => stdin.flush(),
            Sink::File(file) => file.flush(),
        }
    }
}

/// Picks a receive name that does not clobber an existing file.
pub fn unique_local_name(name: &str) -> Result<String, FtpError> {
    unique_path(Path::new(name))
        .map(|path| path.to_string_lossy().into_owned())
        .ok_or_else(|| FtpError::NoUniqueName(name.to_string()))
}
