use std::fmt;
use std::net::{IpAddr, SocketAddr};

/// Why a `Transport` request header cannot be served.
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// Only interleaved (RTP over the RTSP connection) transports were offered.
    #[error("interleaved TCP transport is not supported, request RTP/AVP over UDP")]
    Interleaved,
    /// No UDP transport with a usable `client_port`.
    #[error("no UDP transport with a valid client_port")]
    NoClientPort,
}

/// The client half of a `Transport` request header (RFC 2326 §12.39).
///
/// A client may offer several transports separated by commas; the first
/// `RTP/AVP` (UDP) one carrying `client_port` wins:
///
/// ```text
/// Transport: RTP/AVP/TCP;interleaved=0-1, RTP/AVP;unicast;client_port=8000-8001
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientPorts {
    pub rtp: u16,
    pub rtcp: u16,
}

impl ClientPorts {
    pub fn parse(header: &str) -> Result<Self, TransportError> {
        let mut interleaved = false;
        for spec in header.split(',') {
            let mut params = spec.split(';').map(str::trim);
            let profile = params.next().unwrap_or_default();
            if profile.eq_ignore_ascii_case("RTP/AVP/TCP") || spec.contains("interleaved=") {
                interleaved = true;
                continue;
            }
            if let Some(ports) = params.find_map(|p| p.strip_prefix("client_port="))
                && let Some(parsed) = Self::parse_range(ports)
            {
                return Ok(parsed);
            }
        }
        Err(if interleaved {
            TransportError::Interleaved
        } else {
            TransportError::NoClientPort
        })
    }

    /// `8000-8001`, or a lone `8000` with RTCP on the next port.
    fn parse_range(ports: &str) -> Option<Self> {
        let (rtp, rtcp) = match ports.split_once('-') {
            Some((rtp, rtcp)) => (rtp.trim().parse().ok()?, rtcp.trim().parse().ok()?),
            None => {
                let rtp: u16 = ports.trim().parse().ok()?;
                (rtp, rtp.checked_add(1)?)
            }
        };
        Some(Self { rtp, rtcp })
    }
}

/// Where a session's RTP goes, fixed at SETUP.
///
/// The server port pair is only advertised; RTP leaves through the shared
/// socket of [`UdpTransport`](crate::transport::UdpTransport).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transport {
    pub client_rtp: SocketAddr,
    pub client_rtcp_port: u16,
    pub server_ports: (u16, u16),
}

impl Transport {
    pub fn new(client_ip: IpAddr, client: ClientPorts, server_ports: (u16, u16)) -> Self {
        Self {
            client_rtp: SocketAddr::new(client_ip, client.rtp),
            client_rtcp_port: client.rtcp,
            server_ports,
        }
    }
}

/// The `Transport` header value of a SETUP response.
impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "RTP/AVP;unicast;client_port={}-{};server_port={}-{}",
            self.client_rtp.port(),
            self.client_rtcp_port,
            self.server_ports.0,
            self.server_ports.1
        )
    }
}
