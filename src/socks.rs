//! Local SOCKS5 frontend
//!
//! Speaks just enough SOCKS5 (RFC 1928) for the local agent: a no-auth
//! greeting and a CONNECT request. The request's address bytes are captured
//! verbatim, ATYP through port, and forwarded as the first plaintext of the
//! encrypted channel; nothing is re-encoded.

use crate::addr::{TargetAddr, ATYP_DOMAIN, ATYP_IPV4, ATYP_IPV6};
use crate::error::{GlintError, SocksError};
use std::io;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// SOCKS protocol version handled here
pub const SOCKS5_VERSION: u8 = 0x05;

/// The only supported command
pub const CMD_CONNECT: u8 = 0x01;

/// "No authentication required" method byte
const METHOD_NONE: u8 = 0x00;

/// Fixed CONNECT reply: success, bound to 0.0.0.0:2115.
///
/// Clients of this protocol never validate BND.ADDR/BND.PORT, so the reply
/// is a constant.
pub const CONNECT_REPLY: [u8; 10] = [
    0x05, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x00, 0x08, 0x43,
];

// VER + NMETHODS + at most 255 method bytes
const GREETING_BUF: usize = 257;
// VER CMD RSV ATYP + length byte + 255-byte domain + 2-byte port
const REQUEST_BUF: usize = 262;

/// A decoded CONNECT request
#[derive(Debug)]
pub struct SocksRequest {
    /// `ATYP || address || port` exactly as received from the client
    pub preamble: Vec<u8>,
    /// Decoded form of the same bytes, for logging
    pub target: TargetAddr,
}

/// Read at least `min` bytes into `buf`, returning how many arrived.
///
/// Mirrors the greeting/request decoding discipline: one buffer, possibly
/// several reads, and whatever the client pipelined beyond the minimum is
/// visible to the caller for extra-data checks.
async fn read_at_least<S: AsyncRead + Unpin>(
    stream: &mut S,
    buf: &mut [u8],
    min: usize,
) -> io::Result<usize> {
    let mut n = 0;
    while n < min {
        let m = stream.read(&mut buf[n..]).await?;
        if m == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "client closed during handshake",
            ));
        }
        n += m;
    }
    Ok(n)
}

/// Run the greeting phase: method negotiation, always answering
/// "no authentication required".
///
/// ```text
/// +----+----------+----------+
/// |VER | NMETHODS | METHODS  |
/// +----+----------+----------+
/// | 1  |    1     | 1 to 255 |
/// +----+----------+----------+
/// ```
pub async fn handshake<S>(stream: &mut S) -> Result<(), GlintError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut buf = [0u8; GREETING_BUF];
    let n = read_at_least(stream, &mut buf, 2).await?;

    if buf[0] != SOCKS5_VERSION {
        return Err(SocksError::Version(buf[0]).into());
    }

    let msg_len = buf[1] as usize + 2;
    if n < msg_len {
        // slow client, remaining method bytes still in flight
        stream.read_exact(&mut buf[n..msg_len]).await?;
    } else if n > msg_len {
        return Err(SocksError::AuthExtraData.into());
    }

    stream.write_all(&[SOCKS5_VERSION, METHOD_NONE]).await?;
    Ok(())
}

/// Read and decode the CONNECT request, capturing the raw address preamble.
///
/// ```text
/// +----+-----+-------+------+----------+----------+
/// |VER | CMD |  RSV  | ATYP | DST.ADDR | DST.PORT |
/// +----+-----+-------+------+----------+----------+
/// | 1  |  1  | X'00' |  1   | Variable |    2     |
/// +----+-----+-------+------+----------+----------+
/// ```
pub async fn read_request<S>(stream: &mut S) -> Result<SocksRequest, GlintError>
where
    S: AsyncRead + Unpin,
{
    let mut buf = [0u8; REQUEST_BUF];
    // 5 bytes cover VER..ATYP plus the domain length byte when present
    let n = read_at_least(stream, &mut buf, 5).await?;

    if buf[0] != SOCKS5_VERSION {
        return Err(SocksError::Version(buf[0]).into());
    }
    if buf[1] != CMD_CONNECT {
        return Err(SocksError::CommandNotSupported(buf[1]).into());
    }

    let req_len = match buf[3] {
        ATYP_IPV4 => 4 + 4 + 2,
        ATYP_IPV6 => 4 + 16 + 2,
        ATYP_DOMAIN => 4 + 1 + buf[4] as usize + 2,
        other => return Err(SocksError::AddrType(other).into()),
    };

    if n < req_len {
        stream.read_exact(&mut buf[n..req_len]).await?;
    } else if n > req_len {
        return Err(SocksError::RequestExtraData.into());
    }

    let preamble = buf[3..req_len].to_vec();
    let mut cursor: &[u8] = &preamble;
    let target = match TargetAddr::read_from(&mut cursor).await {
        Ok(target) => target,
        // the preamble is forwarded verbatim and this form is only logged;
        // host sanitization is the dialing side's job
        Err(GlintError::Socks(SocksError::InvalidHost)) => {
            let name = String::from_utf8_lossy(&preamble[2..preamble.len() - 2]).into_owned();
            let port =
                u16::from_be_bytes([preamble[preamble.len() - 2], preamble[preamble.len() - 1]]);
            TargetAddr::Domain(name, port)
        }
        Err(e) => return Err(e),
    };

    Ok(SocksRequest { preamble, target })
}
