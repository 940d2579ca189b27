use super::Packetizer;
use super::nal::{self, ParameterSets};
use super::rtp::{RTP_HEADER_LEN, RtpPosition, RtpStream};

/// Largest RTP payload sent in one packet; bigger NAL units are fragmented.
const MAX_PAYLOAD: usize = 1400;

/// RFC 6184 fragmentation unit type A.
const NAL_FU_A: u8 = 28;

const CLOCK_RATE: u32 = 90_000;

/// H.264 RTP payload format (RFC 6184, packetization-mode=1).
///
/// Each call to [`packetize`](Packetizer::packetize) takes one Annex-B
/// buffer and turns every NAL unit in it into RTP packets:
///
/// - NAL units up to [`MAX_PAYLOAD`] bytes travel as **single NAL unit
///   packets** (§5.6): RTP header followed by the NAL bytes.
/// - Larger units are split into **FU-A** fragments (§5.8). The NAL header
///   byte is dropped and rebuilt by the receiver from two bytes in front of
///   every fragment:
///
///   ```text
///   FU indicator:  [F|NRI|Type=28]
///   FU header:     [S|E|R|NAL_Type]
///   ```
///
/// The publisher hands over one NAL per call, so the marker bit closes the
/// access unit on the last packet of a coded slice only. Parameter sets and
/// SEI never carry it.
///
/// SPS and PPS are remembered as they pass (the publisher pushes them on
/// `configure`, encoders repeat them before IDR frames) and advertised in
/// the `fmtp` line as `profile-level-id` and `sprop-parameter-sets`.
#[derive(Debug)]
pub struct H264Packetizer {
    rtp: RtpStream,
    max_payload: usize,
    parameter_sets: ParameterSets,
}

impl H264Packetizer {
    pub fn new(payload_type: u8, ssrc: u32) -> Self {
        Self::with_stream(RtpStream::new(payload_type, ssrc))
    }

    pub fn with_random_ssrc(payload_type: u8) -> Self {
        Self::with_stream(RtpStream::with_random_ssrc(payload_type))
    }

    fn with_stream(rtp: RtpStream) -> Self {
        Self {
            rtp,
            max_payload: MAX_PAYLOAD,
            parameter_sets: ParameterSets::default(),
        }
    }

    /// Append the packets for one NAL unit to `out`.
    fn push_nal(&mut self, nal: &[u8], closes_access_unit: bool, out: &mut Vec<Vec<u8>>) {
        let Some((&header, body)) = nal.split_first() else {
            return;
        };

        if nal.len() <= self.max_payload {
            out.push(self.rtp.packet(closes_access_unit, &[], nal));
            return;
        }

        let indicator = (header & 0xe0) | NAL_FU_A;
        let nal_type = header & 0x1f;
        let fragments = body.chunks(self.max_payload - 2);
        let last = fragments.len() - 1;
        for (i, fragment) in fragments.enumerate() {
            let mut fu_header = nal_type;
            if i == 0 {
                fu_header |= 0x80;
            }
            if i == last {
                fu_header |= 0x40;
            }
            let marker = closes_access_unit && i == last;
            out.push(self.rtp.packet(marker, &[indicator, fu_header], fragment));
        }
        tracing::trace!(nal_type, nal_size = nal.len(), fragments = last + 1, "FU-A");
    }
}

impl Packetizer for H264Packetizer {
    fn packetize(&mut self, annex_b: &[u8], rtp_timestamp: u32) -> Vec<Vec<u8>> {
        let units: Vec<&[u8]> = nal::split_annex_b(annex_b).collect();
        for unit in &units {
            if self.parameter_sets.observe(unit) {
                tracing::debug!(nal_type = ?nal::nal_type(unit), len = unit.len(), "parameter set updated");
            }
        }

        self.rtp.begin_frame(rtp_timestamp);
        let mut packets = Vec::with_capacity(units.len());
        for (i, unit) in units.iter().enumerate() {
            let closes = i + 1 == units.len() && nal::nal_type(unit).is_some_and(nal::is_vcl);
            self.push_nal(unit, closes, &mut packets);
        }

        tracing::trace!(
            nal_count = units.len(),
            rtp_packets = packets.len(),
            frame_bytes = annex_b.len(),
            ts = rtp_timestamp,
            "frame packetized"
        );
        packets
    }

    fn clock_rate(&self) -> u32 {
        CLOCK_RATE
    }

    fn payload_type(&self) -> u8 {
        self.rtp.payload_type()
    }

    /// `rtpmap` before `fmtp`, which refers to its payload type (RFC 6184 §8.2.1).
    fn sdp_attributes(&self) -> Vec<String> {
        let pt = self.rtp.payload_type();
        let mut fmtp = format!("a=fmtp:{pt} packetization-mode=1");
        if let Some(profile) = self.parameter_sets.profile_level_id() {
            fmtp.push_str(&format!(";profile-level-id={profile}"));
        }
        if let Some(sprop) = self.parameter_sets.sprop_parameter_sets() {
            fmtp.push_str(&format!(";sprop-parameter-sets={sprop}"));
        }
        vec![
            format!("a=rtpmap:{pt} H264/{CLOCK_RATE}"),
            fmtp,
            "a=control:track1".to_string(),
        ]
    }

    fn position(&self) -> RtpPosition {
        self.rtp.position()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn packetizer() -> H264Packetizer {
        H264Packetizer::new(96, 0xAABBCCDD)
    }

    fn marker(packet: &[u8]) -> bool {
        packet[1] & 0x80 != 0
    }

    fn timestamp(packet: &[u8]) -> u32 {
        u32::from_be_bytes([packet[4], packet[5], packet[6], packet[7]])
    }

    fn fmtp(p: &H264Packetizer) -> String {
        p.sdp_attributes()
            .into_iter()
            .find(|a| a.starts_with("a=fmtp:"))
            .expect("fmtp line")
    }

    #[test]
    fn small_slice_is_one_packet_with_marker() {
        let mut p = packetizer();
        let packets = p.packetize(&[0, 0, 0, 1, 0x65, 0xaa, 0xbb, 0xcc], 3000);
        assert_eq!(packets.len(), 1);
        assert_eq!(&packets[0][RTP_HEADER_LEN..], &[0x65, 0xaa, 0xbb, 0xcc]);
        assert!(marker(&packets[0]));
        assert_eq!(timestamp(&packets[0]), 3000);
    }

    #[test]
    fn large_slice_is_fragmented() {
        let mut p = packetizer();
        let mut frame = vec![0, 0, 0, 1, 0x65];
        frame.extend(vec![0xaa; MAX_PAYLOAD * 2]);
        let packets = p.packetize(&frame, 90_000);
        assert_eq!(packets.len(), 3);

        for (i, pkt) in packets.iter().enumerate() {
            assert_eq!(timestamp(pkt), 90_000);
            assert_eq!(pkt[RTP_HEADER_LEN], 0x60 | NAL_FU_A, "indicator keeps NRI");
            assert_eq!(pkt[RTP_HEADER_LEN + 1] & 0x1f, 5, "original type in FU header");
            assert_eq!(pkt[RTP_HEADER_LEN + 1] & 0x80 != 0, i == 0, "start bit");
            assert_eq!(pkt[RTP_HEADER_LEN + 1] & 0x40 != 0, i == 2, "end bit");
            assert_eq!(marker(pkt), i == 2);
        }

        let payload: usize = packets.iter().map(|p| p.len() - RTP_HEADER_LEN - 2).sum();
        assert_eq!(payload, MAX_PAYLOAD * 2, "NAL header byte is not repeated");
    }

    #[test]
    fn nal_of_exactly_max_payload_is_not_fragmented() {
        let mut p = packetizer();
        let mut frame = vec![0, 0, 0, 1, 0x41];
        frame.extend(vec![0x11; MAX_PAYLOAD - 1]);
        assert_eq!(p.packetize(&frame, 0).len(), 1);
    }

    #[test]
    fn parameter_sets_have_no_marker() {
        let mut p = packetizer();
        let packets = p.packetize(&[0, 0, 0, 1, 0x67, 0x42, 0x00, 0x1e], 0);
        assert_eq!(packets.len(), 1);
        assert!(!marker(&packets[0]), "SPS must not close an access unit");
    }

    #[test]
    fn only_last_slice_of_a_buffer_closes_it() {
        let mut p = packetizer();
        let packets = p.packetize(
            &[0, 0, 0, 1, 0x67, 0x42, 0, 0, 0, 1, 0x65, 0x88, 0, 0, 1, 0x06, 0x05],
            0,
        );
        assert_eq!(packets.len(), 3);
        assert!(packets.iter().all(|p| !marker(p)), "buffer ends with SEI");
    }

    #[test]
    fn sequence_is_shared_across_frames() {
        let mut p = packetizer();
        p.packetize(&[0, 0, 0, 1, 0x65, 0x88], 0);
        p.packetize(&[0, 0, 0, 1, 0x41, 0x9a], 3000);
        assert_eq!(
            p.position(),
            RtpPosition {
                sequence: 2,
                timestamp: 3000
            }
        );
    }

    #[test]
    fn fmtp_without_parameter_sets() {
        let p = packetizer();
        assert_eq!(fmtp(&p), "a=fmtp:96 packetization-mode=1");
        assert_eq!(p.sdp_attributes()[0], "a=rtpmap:96 H264/90000");
        assert_eq!(p.sdp_attributes()[2], "a=control:track1");
    }

    #[test]
    fn fmtp_advertises_captured_parameter_sets() {
        let mut p = packetizer();
        p.packetize(&[0, 0, 0, 1, 0x67, 0x42, 0xc0, 0x1f], 0);
        p.packetize(&[0, 0, 0, 1, 0x68, 0xce, 0x3c, 0x80], 0);
        assert_eq!(
            fmtp(&p),
            "a=fmtp:96 packetization-mode=1;profile-level-id=42c01f;sprop-parameter-sets=Z0LAHw==,aM48gA=="
        );
    }

    #[test]
    fn newer_sps_replaces_older() {
        let mut p = packetizer();
        p.packetize(&[0, 0, 0, 1, 0x67, 0x42, 0xc0, 0x1f], 0);
        p.packetize(&[0, 0, 0, 1, 0x67, 0x64, 0x00, 0x28], 0);
        assert!(fmtp(&p).contains("profile-level-id=640028"));
    }

    #[test]
    fn buffer_without_start_code_yields_nothing() {
        let mut p = packetizer();
        assert!(p.packetize(&[0x65, 0x88], 0).is_empty());
    }
}
