//! Media codecs and RTP packetization.
//!
//! The publisher pushes Annex-B buffers; a [`Packetizer`] per mount turns
//! each one into RTP packets stamped with the frame's presentation time on
//! the codec clock (RFC 3550). [`nal`] holds the byte-stream helpers shared
//! with the publisher and the front-ends.
//!
//! | Codec | Module | RFC |
//! |-------|--------|-----|
//! | H.264 | [`h264`] | [RFC 6184](https://tools.ietf.org/html/rfc6184) |

pub mod h264;
pub mod nal;
pub mod rtp;

pub use rtp::RtpPosition;

/// Video codecs a media source can declare for its track.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoCodec {
    H264,
}

impl VideoCodec {
    /// Build the packetizer for this codec with the given payload type.
    pub fn packetizer(self, payload_type: u8) -> Box<dyn Packetizer> {
        match self {
            Self::H264 => Box::new(h264::H264Packetizer::with_random_ssrc(payload_type)),
        }
    }
}

/// Codec-specific RTP payload format.
pub trait Packetizer: Send {
    /// Turn one Annex-B buffer into complete RTP packets, all carrying
    /// `rtp_timestamp`.
    fn packetize(&mut self, annex_b: &[u8], rtp_timestamp: u32) -> Vec<Vec<u8>>;

    /// RTP clock rate in Hz (90 000 for video, RFC 3551 §4).
    fn clock_rate(&self) -> u32;

    /// Dynamic payload type (96–127).
    fn payload_type(&self) -> u8;

    /// Media-level SDP lines including the `a=` prefix.
    fn sdp_attributes(&self) -> Vec<String>;

    /// Where the next packet will start, for `RTP-Info`.
    fn position(&self) -> RtpPosition;
}

/// Convert a millisecond presentation time to an RTP timestamp at `clock_rate`.
///
/// Wraps modulo 2^32 as RTP timestamps do.
pub fn rtp_timestamp_from_ms(pts_ms: u64, clock_rate: u32) -> u32 {
    (pts_ms.wrapping_mul(u64::from(clock_rate)) / 1000) as u32
}
