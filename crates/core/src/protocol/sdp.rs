//! Session description for DESCRIBE (RFC 8866).
//!
//! ```text
//! v=0
//! o=- 0 0 IN IP4 10.0.0.5
//! s=Stream
//! c=IN IP4 10.0.0.5
//! t=0 0
//! a=tool:rtsp-publish
//! a=sendonly
//! m=video 0 RTP/AVP 96
//! b=AS:2000
//! a=rtpmap:96 H264/90000
//! a=fmtp:96 packetization-mode=1;profile-level-id=42c01f;sprop-parameter-sets=...
//! a=control:track1
//! a=framerate:30
//! a=x-dimensions:1280,720
//! ```
//!
//! Origin and session name come from [`ServerConfig`]; bandwidth, frame rate
//! and size from the mount's [`VideoTrackConfig`](crate::engine::VideoTrackConfig).

use std::fmt::Write;

use crate::mount::Mount;
use crate::server::ServerConfig;

/// SDP for `mount`, advertising `host` as origin and connection address.
pub fn generate_sdp(mount: &Mount, host: &str, config: &ServerConfig) -> String {
    let track = mount.track();
    let mut lines = vec![
        "v=0".to_string(),
        format!(
            "o={} {} {} IN IP4 {host}",
            config.sdp_username, config.sdp_session_id, config.sdp_session_version
        ),
        format!("s={}", config.sdp_session_name),
        format!("c=IN IP4 {host}"),
        "t=0 0".to_string(),
        "a=tool:rtsp-publish".to_string(),
        "a=sendonly".to_string(),
        format!("m=video 0 RTP/AVP {}", mount.payload_type()),
    ];
    if track.bitrate > 0 {
        lines.push(format!("b=AS:{}", track.bitrate / 1000));
    }
    lines.extend(mount.sdp_attributes());
    if track.fps > 0.0 {
        lines.push(format!("a=framerate:{}", track.fps));
    }
    lines.push(format!("a=x-dimensions:{},{}", track.width, track.height));

    let sdp = lines.iter().fold(String::new(), |mut out, line| {
        let _ = write!(out, "{line}\r\n");
        out
    });
    tracing::trace!(mount = %mount.path(), %sdp, "session description");
    sdp
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::VideoTrackConfig;
    use crate::media::h264::H264Packetizer;

    fn mount(track: VideoTrackConfig) -> Mount {
        Mount::new("/live/live", Box::new(H264Packetizer::new(96, 7)), track)
    }

    fn index(sdp: &str, needle: &str) -> usize {
        sdp.find(needle).unwrap_or_else(|| panic!("missing {needle}"))
    }

    #[test]
    fn default_track() {
        let config = ServerConfig {
            sdp_username: "server".to_string(),
            sdp_session_id: "1234567890".to_string(),
            sdp_session_version: "1".to_string(),
            sdp_session_name: "Camera".to_string(),
            ..ServerConfig::default()
        };
        let sdp = generate_sdp(&mount(VideoTrackConfig::default()), "192.168.1.100", &config);

        assert_eq!(
            sdp,
            "v=0\r\n\
             o=server 1234567890 1 IN IP4 192.168.1.100\r\n\
             s=Camera\r\n\
             c=IN IP4 192.168.1.100\r\n\
             t=0 0\r\n\
             a=tool:rtsp-publish\r\n\
             a=sendonly\r\n\
             m=video 0 RTP/AVP 96\r\n\
             b=AS:2000\r\n\
             a=rtpmap:96 H264/90000\r\n\
             a=fmtp:96 packetization-mode=1\r\n\
             a=control:track1\r\n\
             a=framerate:30\r\n\
             a=x-dimensions:1280,720\r\n"
        );
    }

    #[test]
    fn parameter_sets_reach_fmtp() {
        let m = mount(VideoTrackConfig::default());
        m.packetize(&[0, 0, 0, 1, 0x67, 0x42, 0xc0, 0x1f, 0, 0, 0, 1, 0x68, 0xce, 0x3c, 0x80], 0);
        let sdp = generate_sdp(&m, "10.0.0.1", &ServerConfig::default());
        assert!(sdp.contains(
            "a=fmtp:96 packetization-mode=1;profile-level-id=42c01f;sprop-parameter-sets=Z0LAHw==,aM48gA==\r\n"
        ));
        assert!(index(&sdp, "a=rtpmap") < index(&sdp, "a=fmtp"));
    }

    #[test]
    fn fractional_rate_without_bitrate() {
        let track = VideoTrackConfig {
            width: 640,
            height: 480,
            fps: 29.97,
            bitrate: 0,
            ..VideoTrackConfig::default()
        };
        let sdp = generate_sdp(&mount(track), "10.0.0.1", &ServerConfig::default());
        assert!(sdp.contains("a=framerate:29.97\r\n"));
        assert!(sdp.contains("a=x-dimensions:640,480\r\n"));
        assert!(!sdp.contains("b=AS"));
        assert!(sdp.contains("o=- 0 0 IN IP4 10.0.0.1\r\ns=Stream\r\n"));
    }
}
