use std::io;
use std::net::{SocketAddr, UdpSocket};

/// The one socket all outbound RTP leaves through.
///
/// It only knows addresses. The [`Server`](crate::Server) decides which
/// sessions get which packets.
pub struct UdpTransport {
    socket: UdpSocket,
}

impl UdpTransport {
    /// Bind an ephemeral port on every interface.
    pub fn bind() -> io::Result<Self> {
        let socket = UdpSocket::bind("0.0.0.0:0")?;
        tracing::debug!(local = %socket.local_addr()?, "RTP socket bound");
        Ok(Self { socket })
    }

    /// Send the packets of one frame to `addr`, in order.
    ///
    /// Stops at the first failure. Returns the bytes written.
    pub fn send_all(&self, packets: &[Vec<u8>], addr: SocketAddr) -> io::Result<usize> {
        packets
            .iter()
            .try_fold(0, |sent, packet| -> io::Result<usize> {
                Ok(sent + self.socket.send_to(packet, addr)?)
            })
    }
}
