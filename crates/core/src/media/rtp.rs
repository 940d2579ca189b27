
/// Length of the fixed RTP header (no CSRCs, no extension).
pub const RTP_HEADER_LEN: usize = 12;

const RTP_VERSION: u8 = 2;

/// Sequence number and timestamp the next packet of a stream will carry,
/// as advertised in the `RTP-Info` header of a PLAY response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RtpPosition {
    pub sequence: u16,
    pub timestamp: u32,
}

/// Sender side of one RTP stream (RFC 3550).
///
/// ```text
///  0                   1                   2                   3
///  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |V=2|P|X|  CC   |M|     PT      |       Sequence Number         |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                           Timestamp                           |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                             SSRC                              |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// ```
///
/// The timestamp is not a running counter: the publisher's presentation
/// time decides it, once per frame, through [`begin_frame`](Self::begin_frame).
/// The sequence number advances on every packet and wraps at 2^16.
#[derive(Debug)]
pub struct RtpStream {
    payload_type: u8,
    ssrc: u32,
    sequence: u16,
    timestamp: u32,
}

impl RtpStream {
    pub fn new(payload_type: u8, ssrc: u32) -> Self {
        tracing::debug!(
            payload_type,
            ssrc = format_args!("{:#010X}", ssrc),
            "RTP stream created"
        );
        Self {
            payload_type: payload_type & 0x7f,
            ssrc,
            sequence: 0,
            timestamp: 0,
        }
    }

    /// New stream with a random SSRC (RFC 3550 §8.1).
    pub fn with_random_ssrc(payload_type: u8) -> Self {
        Self::new(payload_type, rand::random::<u32>())
    }

    pub fn payload_type(&self) -> u8 {
        self.payload_type
    }

    pub fn ssrc(&self) -> u32 {
        self.ssrc
    }

    pub fn position(&self) -> RtpPosition {
        RtpPosition {
            sequence: self.sequence,
            timestamp: self.timestamp,
        }
    }

    /// Stamp every following packet with `timestamp` until the next frame.
    pub fn begin_frame(&mut self, timestamp: u32) {
        self.timestamp = timestamp;
    }

    /// Build one packet: header, then `prefix` and `payload` back to back.
    ///
    /// `prefix` carries payload-format headers such as the two FU-A bytes.
    pub fn packet(&mut self, marker: bool, prefix: &[u8], payload: &[u8]) -> Vec<u8> {
        let mut packet = Vec::with_capacity(RTP_HEADER_LEN + prefix.len() + payload.len());
        packet.push(RTP_VERSION << 6);
        packet.push(u8::from(marker) << 7 | self.payload_type);
        packet.extend_from_slice(&self.sequence.to_be_bytes());
        packet.extend_from_slice(&self.timestamp.to_be_bytes());
        packet.extend_from_slice(&self.ssrc.to_be_bytes());
        packet.extend_from_slice(prefix);
        packet.extend_from_slice(payload);

        self.sequence = self.sequence.wrapping_add(1);
        packet
    }
}
