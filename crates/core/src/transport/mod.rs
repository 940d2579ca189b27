//! Sockets: RTSP signaling over TCP ([`tcp`]), RTP over UDP ([`udp`]).
//!
//! Each RTSP client gets a thread; the number of threads is capped by the
//! runtime worker width. All RTP goes out through one unconnected UDP
//! socket. Interleaved RTP over the RTSP connection (RFC 2326 §10.12) is
//! refused at SETUP.

pub mod tcp;
pub mod udp;

pub use udp::UdpTransport;
