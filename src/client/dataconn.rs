//! Data connection negotiation (client side)
//!
//! `initconn` prepares a data connection before the transfer command is
//! sent: in passive mode by asking the server for an address and connecting
//! to it, in active mode by listening and announcing the address. `dataconn`
//! turns the prepared channel into a connected stream once the server has
//! accepted the transfer command.

use std::net::{IpAddr, SocketAddr, TcpListener, TcpStream};

use log::{debug, info, warn};

use crate::client::session::{Session, SessionState};
use crate::config::SendPort;
use crate::error::FtpError;
use crate::net;
use crate::protocol::address::{self, Family};
use crate::protocol::{Reply, ReplyClass};

/// A data connection that has been negotiated but not yet used.
#[derive(Debug)]
pub enum DataChannel {
    /// Already connected to the server's passive address.
    Passive(TcpStream),
    /// Listening for the server to connect.
    Active(TcpListener),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PassiveForm {
    Epsv,
    Pasv,
    Lpsv,
}

impl PassiveForm {
    fn verb(self) -> &'static str {
        match self {
            PassiveForm::Epsv => "EPSV",
            PassiveForm::Pasv => "PASV",
            PassiveForm::Lpsv => "LPSV",
        }
    }

    /// Forms to try, best first.
    fn preference(family: Family, extended: bool) -> Vec<PassiveForm> {
        let mut forms = Vec::with_capacity(3);
        if extended {
            forms.push(PassiveForm::Epsv);
        }
        if family == Family::V4 {
            forms.push(PassiveForm::Pasv);
        }
        forms.push(PassiveForm::Lpsv);
        forms
    }

    /// Decodes the address a successful reply points at.
    fn decode(self, reply: &Reply, control_peer: IpAddr) -> Result<SocketAddr, FtpError> {
        let payload = reply.payload.as_deref().unwrap_or("");
        let addr = match self {
            PassiveForm::Epsv => {
                SocketAddr::new(control_peer, address::decode_epsv_port(payload)?)
            }
            PassiveForm::Pasv => SocketAddr::V4(address::decode_port(payload)?),
            PassiveForm::Lpsv => address::decode_lprt(payload)?,
        };
        address::check_family(control_peer, addr.ip())?;
        Ok(address::canonical(addr))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PortForm {
    Eprt,
    Port,
    Lprt,
}

impl PortForm {
    fn preference(family: Family, extended: bool) -> Vec<PortForm> {
        let mut forms = Vec::with_capacity(3);
        if extended {
            forms.push(PortForm::Eprt);
        }
        if family == Family::V4 {
            forms.push(PortForm::Port);
        }
        forms.push(PortForm::Lprt);
        forms
    }

    fn command(self, addr: SocketAddr) -> Option<String> {
        match self {
            PortForm::Eprt => Some(format!("EPRT {}", address::encode_eprt(addr))),
            PortForm::Port => {
                address::as_v4(addr).map(|v4| format!("PORT {}", address::encode_port(v4)))
            }
            PortForm::Lprt => Some(format!("LPRT {}", address::encode_lprt(addr))),
        }
    }
}

impl Session {
    /// Prepares the data connection for the next transfer command.
    pub(crate) fn initconn(&mut self) -> Result<(), FtpError> {
        self.data = None;
        let channel = if self.settings().passive {
            DataChannel::Passive(self.passive_connect()?)
        } else {
            DataChannel::Active(self.active_listen()?)
        };
        self.data = Some(channel);
        self.set_state(SessionState::DataPending);
        Ok(())
    }

    fn passive_connect(&mut self) -> Result<TcpStream, FtpError> {
        let peer = self.control()?.peer_addr();
        let family = Family::of(peer.ip());

        // 1. Ask for an address, best form first
        let mut accepted = None;
        for form in PassiveForm::preference(family, self.extended_enabled(family)) {
            let reply = self.command(form.verb())?;
            if reply.is(ReplyClass::Complete) {
                accepted = Some((form, reply));
                break;
            }
            if form == PassiveForm::Epsv {
                debug!("EPSV refused; not trying it again this session");
                self.disable_extended(family);
            }
        }
        let Some((form, reply)) = accepted else {
            self.console.error("Passive mode refused.");
            return Err(FtpError::PassiveRefused);
        };

        // 2. Decode; a reply we cannot parse means no data connection at all
        let addr = match form.decode(&reply, peer.ip()) {
            Ok(addr) => addr,
            Err(e) => {
                warn!("{} reply not understood: {}", form.verb(), reply.text());
                self.console.error("Passive mode address scan failure.");
                if let Err(e) = self.command("ABOR") {
                    warn!("ABOR after unusable {} reply failed: {}", form.verb(), e);
                }
                return Err(FtpError::Protocol(format!(
                    "Passive mode address scan failure: {}",
                    e
                )));
            }
        };

        // 3. Connect
        let timeout = self.settings().connect_timeout();
        let stream = net::connect(addr, None, Some(timeout), false).map_err(|e| {
            self.console.error(&format!("ftp: connect: {}", e));
            FtpError::Network(e)
        })?;
        info!("Data connection to {} ({})", addr, form.verb());
        Ok(stream)
    }

    fn active_listen(&mut self) -> Result<TcpListener, FtpError> {
        let local = self.control()?.local_addr();
        let sendport = self.settings().sendport;

        if sendport == SendPort::Never {
            return self.default_port_listener(local);
        }

        // 1. Listen on an ephemeral port of the control connection's address
        let listener = net::listen(SocketAddr::new(local.ip(), 0), false, 1)
            .map_err(FtpError::Network)?;
        let data_addr = address::canonical(listener.local_addr().map_err(FtpError::Network)?);
        let family = Family::of(data_addr.ip());

        // 2. Announce it, best form first
        let mut last = None;
        for form in PortForm::preference(family, self.extended_enabled(family)) {
            let Some(command) = form.command(data_addr) else {
                continue;
            };
            let reply = self.command(&command)?;
            if reply.is(ReplyClass::Complete) {
                return Ok(listener);
            }
            if form == PortForm::Eprt && reply.is(ReplyClass::Error) {
                debug!("EPRT refused; not trying it again this session");
                self.disable_extended(family);
            }
            last = Some(reply);
        }

        // 3. Nothing accepted: maybe fall back to the default data port
        match last {
            Some(reply) if sendport == SendPort::Auto && reply.is(ReplyClass::Error) => {
                info!("server refused every port announcement; using the default data port");
                drop(listener);
                self.default_port_listener(local)
            }
            Some(reply) => Err(FtpError::Refused(reply)),
            None => Err(FtpError::Protocol("no usable port announcement".into())),
        }
    }

    /// Listens on the control connection's own local port, where a server
    /// connects when no port was announced.
    fn default_port_listener(&mut self, local: SocketAddr) -> Result<TcpListener, FtpError> {
        net::listen(local, true, 1).map_err(|e| {
            self.console.error(&format!("ftp: bind: {}", e));
            FtpError::Network(e)
        })
    }

    /// Turns the prepared channel into a connected stream. The slot is
    /// emptied whatever happens.
    pub(crate) fn dataconn(&mut self) -> Result<TcpStream, FtpError> {
        let stream = match self.data.take() {
            None => return Err(FtpError::Protocol("no data connection".into())),
            Some(DataChannel::Passive(stream)) => stream,
            Some(DataChannel::Active(listener)) => {
                let timeout = self.settings().connect_timeout();
                let (stream, from) =
                    net::accept_timeout(&listener, timeout).map_err(|e| {
                        self.console.error(&format!("ftp: accept: {}", e));
                        FtpError::Network(e)
                    })?;
                debug!("Data connection accepted from {}", from);
                stream
            }
        };
        net::tune_data_stream(&stream, self.settings().poll_interval())
            .map_err(FtpError::Network)?;
        self.set_state(SessionState::Transferring);
        Ok(stream)
    }

    /// Gives up a negotiated channel that will not be used.
    pub(crate) fn release_data(&mut self) {
        if self.data.take().is_some() {
            debug!("Released unused data connection");
        }
        if self.is_connected() {
            self.set_state(SessionState::Connected);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_passive_preference_order() {
        assert_eq!(
            PassiveForm::preference(Family::V4, true),
            vec![PassiveForm::Epsv, PassiveForm::Pasv, PassiveForm::Lpsv]
        );
        assert_eq!(
            PassiveForm::preference(Family::V4, false),
            vec![PassiveForm::Pasv, PassiveForm::Lpsv]
        );
        assert_eq!(
            PassiveForm::preference(Family::V6, true),
            vec![PassiveForm::Epsv, PassiveForm::Lpsv]
        );
    }

    #[test]
    fn test_port_commands() {
        let v4: SocketAddr = "10.0.0.1:1930".parse().unwrap();
        assert_eq!(
            PortForm::Port.command(v4).as_deref(),
            Some("PORT 10,0,0,1,7,138")
        );
        assert_eq!(
            PortForm::Eprt.command(v4).as_deref(),
            Some("EPRT |1|10.0.0.1|1930|")
        );

        let v6: SocketAddr = "[::1]:4021".parse().unwrap();
        assert_eq!(PortForm::Port.command(v6), None);
        assert_eq!(
            PortForm::preference(Family::V6, false),
            vec![PortForm::Lprt]
        );
    }

    #[test]
    fn test_passive_decode_checks_family() {
        let mut reply = Reply::synthetic(227, "Entering Passive Mode (10,0,0,1,7,138)");
        reply.payload = Some("10,0,0,1,7,138".into());
        let v4_peer: IpAddr = "10.0.0.1".parse().unwrap();
        assert_eq!(
            PassiveForm::Pasv.decode(&reply, v4_peer).unwrap(),
            "10.0.0.1:1930".parse::<SocketAddr>().unwrap()
        );

        let v6_peer: IpAddr = "::1".parse().unwrap();
        assert!(PassiveForm::Pasv.decode(&reply, v6_peer).is_err());

        let mut epsv = Reply::synthetic(229, "Entering Extended Passive Mode (|||4021|)");
        epsv.payload = Some("|||4021|".into());
        assert_eq!(
            PassiveForm::Epsv.decode(&epsv, v6_peer).unwrap(),
            "[::1]:4021".parse::<SocketAddr>().unwrap()
        );

        epsv.payload = Some("|1|4021|".into());
        assert!(PassiveForm::Epsv.decode(&epsv, v6_peer).is_err());
    }
}
