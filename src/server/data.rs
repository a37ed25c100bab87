//! Data connection setup (server side)
//!
//! PORT/LPRT/EPRT record where the client listens, PASV/LPSV/EPSV open a
//! listener for the client to connect to, and with neither the server
//! connects back to the client's control address (the default data port).
//! The plan is consumed by the next transfer command.

use std::io;
use std::net::{IpAddr, SocketAddr, TcpListener, TcpStream};
use std::time::Duration;

use log::{debug, info};

use crate::error::DataChannelError;
use crate::net;
use crate::protocol::address::{self, Family};

/// How often a transfer checks the control connection while data flows.
pub const DATA_POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Lowest port a client may announce unless foreign addresses are allowed.
const MIN_CLIENT_PORT: u16 = 1024;

/// The data connection the next transfer will use.
#[derive(Debug, Default)]
pub enum DataPlan {
    /// Connect to the client's control address.
    #[default]
    Default,
    /// Connect to an address announced with PORT/LPRT/EPRT.
    Active(SocketAddr),
    /// Wait for the client on a listener opened by PASV/LPSV/EPSV.
    Passive(TcpListener),
}

/// Addresses and limits a data connection is checked against.
#[derive(Debug, Clone, Copy)]
pub struct DataContext {
    /// Client end of the control connection.
    pub peer: SocketAddr,
    /// Server end of the control connection.
    pub local: SocketAddr,
    pub allow_foreign: bool,
    pub timeout: Duration,
}

impl DataContext {
    /// Accepts an announced address only when it points back at the client
    /// on an unprivileged port.
    pub fn check_port_address(&self, addr: SocketAddr) -> Result<SocketAddr, DataChannelError> {
        let addr = address::canonical(addr);
        if self.allow_foreign {
            return Ok(addr);
        }
        if !address::same_host(addr.ip(), self.peer.ip()) || addr.port() < MIN_CLIENT_PORT {
            return Err(DataChannelError::IllegalAddress(addr));
        }
        Ok(addr)
    }

    /// Checks that a requested EPSV/EPRT family matches the control
    /// connection.
    pub fn check_family(&self, family: u8) -> Result<(), DataChannelError> {
        let ours = Family::of(self.local.ip());
        if family == ours.eprt_code() {
            Ok(())
        } else {
            Err(DataChannelError::ProtocolNotSupported(ours.eprt_code()))
        }
    }

    /// Opens a passive listener on the control connection's local address.
    pub fn open_passive(&self) -> Result<TcpListener, DataChannelError> {
        let listener = net::listen(SocketAddr::new(self.local.ip(), 0), false, 1)
            .map_err(DataChannelError::PassiveSetupFailed)?;
        Ok(listener)
    }

    /// Turns the plan into a connected, tuned data stream.
    pub fn connect(&self, plan: DataPlan) -> Result<TcpStream, DataChannelError> {
        let stream = match plan {
            DataPlan::Default => self.connect_to(self.peer)?,
            DataPlan::Active(addr) => self.connect_to(addr)?,
            DataPlan::Passive(listener) => self.accept_from(&listener)?,
        };
        net::tune_data_stream(&stream, DATA_POLL_INTERVAL)
            .map_err(DataChannelError::AcceptFailed)?;
        Ok(stream)
    }

    fn connect_to(&self, target: SocketAddr) -> Result<TcpStream, DataChannelError> {
        let source = SocketAddr::new(self.local.ip(), 0);
        debug!("Connecting data connection {} -> {}", source, target);
        let stream = net::connect(target, Some(source), Some(self.timeout), true)
            .map_err(|e| DataChannelError::ConnectFailed(target, e))?;
        info!("Data connection to {}", target);
        Ok(stream)
    }

    fn accept_from(&self, listener: &TcpListener) -> Result<TcpStream, DataChannelError> {
        let (stream, from) = match net::accept_timeout(listener, self.timeout) {
            Ok(accepted) => accepted,
            Err(e) if e.kind() == io::ErrorKind::TimedOut => {
                return Err(DataChannelError::AcceptTimeout);
            }
            Err(e) => return Err(DataChannelError::AcceptFailed(e)),
        };
        let from = address::canonical(from);
        if !self.allow_foreign && !address::same_host(from.ip(), self.peer.ip()) {
            return Err(DataChannelError::ForeignPeer(from));
        }
        info!("Data connection from {}", from);
        Ok(stream)
    }
}

/// Local address of a passive listener as the client should see it.
pub fn passive_address(listener: &TcpListener) -> Result<SocketAddr, DataChannelError> {
    listener
        .local_addr()
        .map(address::canonical)
        .map_err(DataChannelError::PassiveSetupFailed)
}

/// True when `ip` can be announced in a PASV reply.
pub fn is_v4(ip: IpAddr) -> bool {
    Family::of(ip) == Family::V4
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use std::thread;

    fn context(allow_foreign: bool) -> DataContext {
        DataContext {
            peer: "127.0.0.1:40000".parse().unwrap(),
            local: "127.0.0.1:2121".parse().unwrap(),
            allow_foreign,
            timeout: Duration::from_secs(5),
        }
    }

    #[test]
    fn test_port_address_must_match_client() {
        let ctx = context(false);
        assert!(ctx.check_port_address("127.0.0.1:5000".parse().unwrap()).is_ok());
        assert!(matches!(
            ctx.check_port_address("10.1.2.3:5000".parse().unwrap()),
            Err(DataChannelError::IllegalAddress(_))
        ));
        assert!(matches!(
            ctx.check_port_address("127.0.0.1:21".parse().unwrap()),
            Err(DataChannelError::IllegalAddress(_))
        ));
        assert!(context(true)
            .check_port_address("10.1.2.3:20".parse().unwrap())
            .is_ok());
    }

    #[test]
    fn test_family_check() {
        let ctx = context(false);
        assert!(ctx.check_family(1).is_ok());
        assert!(matches!(
            ctx.check_family(2),
            Err(DataChannelError::ProtocolNotSupported(1))
        ));
    }

    #[test]
    fn test_passive_plan_accepts_client() {
        let ctx = context(false);
        let listener = ctx.open_passive().unwrap();
        let addr = passive_address(&listener).unwrap();

        let client = thread::spawn(move || {
            let mut stream = TcpStream::connect(addr).unwrap();
            stream.write_all(b"hello").unwrap();
        });

        let mut stream = ctx.connect(DataPlan::Passive(listener)).unwrap();
        let mut got = Vec::new();
        loop {
            let mut buf = [0u8; 16];
            match stream.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => got.extend_from_slice(&buf[..n]),
                Err(e) if net::is_timeout(&e) => continue,
                Err(e) => panic!("read failed: {}", e),
            }
        }
        client.join().unwrap();
        assert_eq!(got, b"hello");
    }

    #[test]
    fn test_active_plan_connects_to_announced_address() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let ctx = context(false);

        let stream = ctx.connect(DataPlan::Active(addr)).unwrap();
        let (_accepted, from) = listener.accept().unwrap();
        assert_eq!(stream.peer_addr().unwrap(), addr);
        assert_eq!(from.ip(), addr.ip());
    }
}
