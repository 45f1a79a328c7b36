//! Target addresses carried in the tunnel preamble
//!
//! The first plaintext bytes of every local-to-remote connection are the raw
//! SOCKS address preamble:
//!
//! ```text
//! +------+----------+----------+
//! | ATYP | ADDRESS  |   PORT   |
//! +------+----------+----------+
//! |  1   | variable |    2     |
//! +------+----------+----------+
//! ```
//!
//! [`TargetAddr`] is the decoded form: an IP socket address or a domain name
//! plus port, displayable as `host:port` and dialable over TCP.

use crate::error::{GlintError, SocksError};
use crate::relay::RelayRead;
use std::fmt;
use std::io;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use tokio::net::TcpStream;

/// ATYP byte for an IPv4 address
pub const ATYP_IPV4: u8 = 0x01;
/// ATYP byte for a length-prefixed domain name
pub const ATYP_DOMAIN: u8 = 0x03;
/// ATYP byte for an IPv6 address
pub const ATYP_IPV6: u8 = 0x04;

/// A tunnel destination
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetAddr {
    /// Literal IPv4 or IPv6 socket address
    Ip(SocketAddr),
    /// Domain name and port, resolved at dial time
    Domain(String, u16),
}

impl TargetAddr {
    /// Decode an ATYP-led address from `src`, reading incrementally.
    ///
    /// Domain names containing a NUL byte are rejected before any dial is
    /// attempted; some resolvers crash on them.
    pub async fn read_from<R: RelayRead>(src: &mut R) -> Result<TargetAddr, GlintError> {
        let mut atyp = [0u8; 1];
        src.read_exact(&mut atyp).await?;
        match atyp[0] {
            ATYP_IPV4 => {
                let mut raw = [0u8; 6];
                src.read_exact(&mut raw).await?;
                let ip = Ipv4Addr::new(raw[0], raw[1], raw[2], raw[3]);
                let port = u16::from_be_bytes([raw[4], raw[5]]);
                Ok(TargetAddr::Ip(SocketAddr::from((ip, port))))
            }
            ATYP_DOMAIN => {
                let mut len = [0u8; 1];
                src.read_exact(&mut len).await?;
                let mut raw = vec![0u8; len[0] as usize + 2];
                src.read_exact(&mut raw).await?;
                let (name, port_bytes) = raw.split_at(len[0] as usize);
                if name.contains(&0x00) {
                    return Err(SocksError::InvalidHost.into());
                }
                let domain = String::from_utf8(name.to_vec())
                    .map_err(|_| SocksError::InvalidHost)?;
                let port = u16::from_be_bytes([port_bytes[0], port_bytes[1]]);
                Ok(TargetAddr::Domain(domain, port))
            }
            ATYP_IPV6 => {
                let mut raw = [0u8; 18];
                src.read_exact(&mut raw).await?;
                let mut octets = [0u8; 16];
                octets.copy_from_slice(&raw[..16]);
                let port = u16::from_be_bytes([raw[16], raw[17]]);
                Ok(TargetAddr::Ip(SocketAddr::from((Ipv6Addr::from(octets), port))))
            }
            other => Err(SocksError::AddrType(other).into()),
        }
    }

    /// Dial the destination over TCP, resolving domain names via the system
    /// resolver.
    pub async fn connect(&self) -> io::Result<TcpStream> {
        match self {
            TargetAddr::Ip(addr) => TcpStream::connect(addr).await,
            TargetAddr::Domain(host, port) => TcpStream::connect((host.as_str(), *port)).await,
        }
    }
}

impl fmt::Display for TargetAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TargetAddr::Ip(addr) => write!(f, "{}", addr),
            TargetAddr::Domain(host, port) => write!(f, "{}:{}", host, port),
        }
    }
}
