//! Data connection address formats.
//!
//! Encoders and decoders for the address representations carried by
//! PORT/PASV (RFC 959), LPRT/LPSV (RFC 1639) and EPRT/EPSV (RFC 2428).
//! IPv4-mapped IPv6 addresses are treated as their IPv4 form everywhere.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, SocketAddrV4};

use crate::error::AddressError;

/// Address family of a data address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Family {
    V4,
    V6,
}

impl Family {
    /// Family of an address after folding IPv4-mapped IPv6 to IPv4.
    pub fn of(ip: IpAddr) -> Family {
        match ip.to_canonical() {
            IpAddr::V4(_) => Family::V4,
            IpAddr::V6(_) => Family::V6,
        }
    }

    /// Protocol number used by EPRT/EPSV.
    pub fn eprt_code(self) -> u8 {
        match self {
            Family::V4 => 1,
            Family::V6 => 2,
        }
    }

    /// Address family number used by LPRT/LPSV.
    pub fn lprt_code(self) -> u8 {
        match self {
            Family::V4 => 4,
            Family::V6 => 6,
        }
    }
}

/// Folds IPv4-mapped IPv6 socket addresses to plain IPv4.
pub fn canonical(addr: SocketAddr) -> SocketAddr {
    SocketAddr::new(addr.ip().to_canonical(), addr.port())
}

/// True when both addresses name the same host, allowing IPv4-mapped
/// equivalence.
pub fn same_host(a: IpAddr, b: IpAddr) -> bool {
    a.to_canonical() == b.to_canonical()
}

/// Rejects a data address whose family cannot be reached from the control
/// connection.
pub fn check_family(control: IpAddr, data: IpAddr) -> Result<(), AddressError> {
    if Family::of(control) == Family::of(data) {
        Ok(())
    } else {
        Err(AddressError::FamilyMismatch { control, data })
    }
}

fn byte_fields(form: &'static str, input: &str) -> Result<Vec<u8>, AddressError> {
    input
        .split(',')
        .map(|field| field.trim().parse::<u8>())
        .collect::<Result<Vec<u8>, _>>()
        .map_err(|_| AddressError::Malformed {
            form,
            input: input.to_string(),
        })
}

fn port_bytes(port: u16) -> [u8; 2] {
    port.to_be_bytes()
}

/// `h0,h1,h2,h3,p0,p1` for PORT and the 227 reply.
pub fn encode_port(addr: SocketAddrV4) -> String {
    let [h0, h1, h2, h3] = addr.ip().octets();
    let [p0, p1] = port_bytes(addr.port());
    format!("{},{},{},{},{},{}", h0, h1, h2, h3, p0, p1)
}

/// Decodes a PORT argument or a PASV reply payload.
pub fn decode_port(input: &str) -> Result<SocketAddrV4, AddressError> {
    let fields = byte_fields("PORT", input)?;
    let [h0, h1, h2, h3, p0, p1] = fields[..] else {
        return Err(AddressError::Malformed {
            form: "PORT",
            input: input.to_string(),
        });
    };
    Ok(SocketAddrV4::new(
        Ipv4Addr::new(h0, h1, h2, h3),
        u16::from_be_bytes([p0, p1]),
    ))
}

/// `af,hal,h1..hn,pal,p0,p1` for LPRT and the 228 reply.
pub fn encode_lprt(addr: SocketAddr) -> String {
    let addr = canonical(addr);
    let host: Vec<u8> = match addr.ip() {
        IpAddr::V4(ip) => ip.octets().to_vec(),
        IpAddr::V6(ip) => ip.octets().to_vec(),
    };
    let family = Family::of(addr.ip()).lprt_code();
    let [p0, p1] = port_bytes(addr.port());

    let mut fields = vec![family.to_string(), host.len().to_string()];
    fields.extend(host.iter().map(u8::to_string));
    fields.push("2".to_string());
    fields.push(p0.to_string());
    fields.push(p1.to_string());
    fields.join(",")
}

/// Decodes an LPRT argument or an LPSV reply payload. The family, address
/// length and port length must agree exactly.
pub fn decode_lprt(input: &str) -> Result<SocketAddr, AddressError> {
    let fields = byte_fields("LPRT", input)?;
    let malformed = || AddressError::Malformed {
        form: "LPRT",
        input: input.to_string(),
    };
    if fields.len() < 2 {
        return Err(malformed());
    }

    let (family, addr_len) = (fields[0], fields[1]);
    let expected_len = match family {
        4 => 4,
        6 => 16,
        other => return Err(AddressError::UnsupportedFamily(other.to_string())),
    };
    let host_end = 2 + addr_len as usize;
    if addr_len != expected_len || fields.len() <= host_end {
        return Err(AddressError::LengthMismatch {
            family,
            addr_len,
            port_len: fields.get(host_end).copied().unwrap_or(0),
        });
    }
    let port_len = fields[host_end];
    if port_len != 2 {
        return Err(AddressError::LengthMismatch {
            family,
            addr_len,
            port_len,
        });
    }
    if fields.len() != host_end + 3 {
        return Err(malformed());
    }

    let host = &fields[2..host_end];
    let port = u16::from_be_bytes([fields[host_end + 1], fields[host_end + 2]]);
    let ip = if family == 4 {
        IpAddr::V4(Ipv4Addr::new(host[0], host[1], host[2], host[3]))
    } else {
        let mut octets = [0u8; 16];
        octets.copy_from_slice(host);
        IpAddr::V6(Ipv6Addr::from(octets))
    };
    Ok(SocketAddr::new(ip, port))
}

/// `|1|addr|port|` or `|2|addr|port|` for EPRT.
pub fn encode_eprt(addr: SocketAddr) -> String {
    let addr = canonical(addr);
    format!(
        "|{}|{}|{}|",
        Family::of(addr.ip()).eprt_code(),
        addr.ip(),
        addr.port()
    )
}

/// Decodes an EPRT argument. The first character is the delimiter and must
/// be repeated between every field and at the end.
pub fn decode_eprt(input: &str) -> Result<SocketAddr, AddressError> {
    let malformed = || AddressError::Malformed {
        form: "EPRT",
        input: input.to_string(),
    };
    let input_trimmed = input.trim();
    let delim = input_trimmed.chars().next().ok_or_else(malformed)?;
    if !(33..=126).contains(&(delim as u32)) || delim.is_ascii_alphanumeric() {
        return Err(malformed());
    }

    let parts: Vec<&str> = input_trimmed.split(delim).collect();
    // "", proto, addr, port, ""
    let [first, proto, host, port, last] = parts[..] else {
        return Err(malformed());
    };
    if !first.is_empty() || !last.is_empty() {
        return Err(malformed());
    }

    let ip = match proto {
        "1" => host
            .parse::<Ipv4Addr>()
            .map(IpAddr::V4)
            .map_err(|_| malformed())?,
        "2" => host
            .parse::<Ipv6Addr>()
            .map(IpAddr::V6)
            .map_err(|_| malformed())?,
        other => return Err(AddressError::UnsupportedFamily(other.to_string())),
    };
    let port = port.parse::<u16>().map_err(|_| malformed())?;
    Ok(SocketAddr::new(ip, port))
}

/// Port carried by a 229 reply payload (`|||port|`). The same delimiter
/// must appear in all four places.
pub fn decode_epsv_port(payload: &str) -> Result<u16, AddressError> {
    let malformed = || AddressError::Malformed {
        form: "EPSV",
        input: payload.to_string(),
    };
    let delim = payload.chars().next().ok_or_else(malformed)?;
    if !(33..=126).contains(&(delim as u32)) || delim.is_ascii_digit() {
        return Err(malformed());
    }

    let parts: Vec<&str> = payload.split(delim).collect();
    // "", "", "", port, ""
    let ["", "", "", port, ""] = parts[..] else {
        return Err(malformed());
    };
    if port.is_empty() || !port.bytes().all(|b| b.is_ascii_digit()) {
        return Err(malformed());
    }
    port.parse::<u16>()
        .ok()
        .filter(|port| *port != 0)
        .ok_or_else(malformed)
}

/// Text of a 227 reply.
pub fn pasv_reply(addr: SocketAddrV4) -> String {
    format!("Entering Passive Mode ({})", encode_port(addr))
}

/// Text of a 228 reply.
pub fn lpsv_reply(addr: SocketAddr) -> String {
    format!("Entering Long Passive Mode ({})", encode_lprt(addr))
}

/// Text of a 229 reply.
pub fn epsv_reply(port: u16) -> String {
    format!("Entering Extended Passive Mode (|||{}|)", port)
}

/// IPv4 view of an address, if it has one.
pub fn as_v4(addr: SocketAddr) -> Option<SocketAddrV4> {
    match canonical(addr) {
        SocketAddr::V4(v4) => Some(v4),
        SocketAddr::V6(_) => None,
    }
}
