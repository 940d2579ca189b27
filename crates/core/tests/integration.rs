//! End to end: publish through the real engine and watch the stream with a
//! minimal RTSP client, receiving RTP on a local UDP socket.

use std::io::{self, BufRead, BufReader, Read, Write};
use std::net::{TcpStream, UdpSocket};
use std::time::Duration;

use rtsp::{
    LogSink, MediaEngine, PublishError, Publisher, PublisherConfig, RtspEngine, RuntimeConfig,
};

const SPS: &[u8] = &[0x67, 0x42, 0xc0, 0x1f, 0xda, 0x01, 0x40];
const PPS: &[u8] = &[0x68, 0xce, 0x3c, 0x80];
const IDR: &[u8] = &[0x65, 0x88, 0x84, 0x00, 0x33, 0xff];

/// Listener ports are explicit, so every test gets its own.
const PLAY_PORT: u16 = 18554;
const RESTART_PORT: u16 = 18555;
const ANNEX_B_PORT: u16 = 18556;
const RECONFIGURE_PORT: u16 = 18557;

const TIMEOUT: Duration = Duration::from_secs(2);

struct Response {
    status: u16,
    headers: Vec<(String, String)>,
    body: String,
}

impl Response {
    fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    fn session_id(&self) -> String {
        let value = self.header("Session").expect("Session header");
        value.split(';').next().unwrap_or_default().to_string()
    }
}

struct RtspClient {
    reader: BufReader<TcpStream>,
    writer: TcpStream,
    cseq: u32,
}

impl RtspClient {
    fn connect(port: u16) -> io::Result<Self> {
        let stream = TcpStream::connect_timeout(&([127, 0, 0, 1], port).into(), TIMEOUT)?;
        stream.set_read_timeout(Some(TIMEOUT))?;
        stream.set_write_timeout(Some(TIMEOUT))?;
        Ok(Self {
            reader: BufReader::new(stream.try_clone()?),
            writer: stream,
            cseq: 0,
        })
    }

    fn send(&mut self, method: &str, uri: &str, headers: &[(&str, &str)]) -> io::Result<Response> {
        self.cseq += 1;
        let mut request = format!("{method} {uri} RTSP/1.0\r\nCSeq: {}\r\n", self.cseq);
        for (name, value) in headers {
            request.push_str(&format!("{name}: {value}\r\n"));
        }
        request.push_str("\r\n");
        self.writer.write_all(request.as_bytes())?;

        let mut status_line = String::new();
        self.reader.read_line(&mut status_line)?;
        let status = status_line
            .split_whitespace()
            .nth(1)
            .and_then(|code| code.parse().ok())
            .unwrap_or(0);

        let mut headers = Vec::new();
        loop {
            let mut line = String::new();
            if self.reader.read_line(&mut line)? == 0 || line.trim().is_empty() {
                break;
            }
            if let Some((name, value)) = line.split_once(':') {
                headers.push((name.trim().to_string(), value.trim().to_string()));
            }
        }

        let mut response = Response {
            status,
            headers,
            body: String::new(),
        };
        if let Some(len) = response.header("Content-Length").and_then(|v| v.parse().ok()) {
            let mut body = vec![0; len];
            self.reader.read_exact(&mut body)?;
            response.body = String::from_utf8_lossy(&body).into_owned();
        }
        assert_eq!(
            response.header("CSeq"),
            Some(self.cseq.to_string().as_str()),
            "{method} must echo CSeq"
        );
        Ok(response)
    }

    /// SETUP and PLAY towards `rtp`. Returns the session id.
    fn watch(&mut self, uri: &str, rtp: &UdpSocket) -> io::Result<String> {
        let port = rtp.local_addr()?.port();
        let transport = format!("RTP/AVP;unicast;client_port={}-{}", port, port + 1);
        let setup = self.send("SETUP", &format!("{uri}/track1"), &[("Transport", &transport)])?;
        assert_eq!(setup.status, 200, "SETUP");
        let session = setup.session_id();

        let play = self.send("PLAY", uri, &[("Session", &session)])?;
        assert_eq!(play.status, 200, "PLAY");
        assert!(play.header("RTP-Info").is_some());
        Ok(session)
    }
}

fn publisher(port: u16) -> Publisher<RtspEngine> {
    let config = PublisherConfig {
        rtsp_port: port,
        runtime: RuntimeConfig {
            log_sink: LogSink::Disabled,
            ..RuntimeConfig::default()
        },
        ..PublisherConfig::default()
    };
    Publisher::with_config(RtspEngine::new(), config)
}

fn rtp_socket() -> UdpSocket {
    let socket = UdpSocket::bind("127.0.0.1:0").expect("bind client RTP socket");
    socket.set_read_timeout(Some(TIMEOUT)).unwrap();
    socket
}

fn recv_packet(socket: &UdpSocket) -> Vec<u8> {
    let mut buf = [0u8; 2048];
    let n = socket.recv(&mut buf).expect("RTP packet");
    buf[..n].to_vec()
}

fn timestamp(packet: &[u8]) -> u32 {
    u32::from_be_bytes([packet[4], packet[5], packet[6], packet[7]])
}

#[test]
fn publish_and_play_over_udp() {
    let publisher = publisher(PLAY_PORT);
    publisher.start().expect("publisher start");
    let uri = format!("rtsp://127.0.0.1:{PLAY_PORT}/live/live");
    let mut client = RtspClient::connect(PLAY_PORT).expect("connect");

    let options = client.send("OPTIONS", &uri, &[]).unwrap();
    assert_eq!(options.status, 200);
    assert!(options.header("Public").unwrap().contains("DESCRIBE"));

    let accept = [("Accept", "application/sdp")];
    assert_eq!(
        client.send("DESCRIBE", &uri, &accept).unwrap().status,
        404,
        "stream is hidden until configured"
    );

    publisher.configure(SPS, PPS).expect("configure");

    let describe = client.send("DESCRIBE", &uri, &accept).unwrap();
    assert_eq!(describe.status, 200);
    assert_eq!(describe.header("Content-Type"), Some("application/sdp"));
    for line in [
        "m=video 0 RTP/AVP 96",
        "a=rtpmap:96 H264/90000",
        "profile-level-id=42c01f",
        "sprop-parameter-sets=",
        "a=x-dimensions:1280,720",
    ] {
        assert!(describe.body.contains(line), "SDP lacks {line}");
    }

    let rtp = rtp_socket();
    client.watch(&uri, &rtp).unwrap();
    assert_eq!(publisher.engine().viewers().len(), 1);

    publisher.submit_frame(IDR, 1_000_000, true).expect("submit frame");
    let packet = recv_packet(&rtp);
    assert_eq!(packet[0] >> 6, 2, "RTP version");
    assert_eq!(packet[1] & 0x7f, 96, "payload type");
    assert_eq!(packet[1] & 0x80, 0x80, "marker on the IDR slice");
    assert_eq!(timestamp(&packet), 90_000, "1 s at 90 kHz");
    assert_eq!(&packet[12..], IDR, "single NAL unit payload");

    publisher.stop().expect("stop");
    publisher.stop().expect("second stop is a no-op");
    assert!(publisher.engine().viewers().is_empty());
    assert_eq!(client.send("DESCRIBE", &uri, &accept).unwrap().status, 404);
    assert!(matches!(
        publisher.submit_frame(IDR, 2_000_000, true),
        Err(PublishError::NotStarted(_))
    ));

    publisher.engine().stop_rtsp_listener();
}

#[test]
fn repeated_start_keeps_one_listener_and_source() {
    let publisher = publisher(RESTART_PORT);
    publisher.start().expect("first start");
    publisher.start().expect("second start");
    assert_eq!(publisher.engine().listening_port(), Some(RESTART_PORT));

    // The engine refuses a second source for the stream, so the publisher
    // must have reused the first one.
    assert!(
        publisher
            .engine()
            .create_media(&publisher.config().stream)
            .is_err()
    );

    publisher.stop().expect("stop");
    publisher.engine().stop_rtsp_listener();
}

#[test]
fn annex_b_stream_with_fragmented_slice() {
    let publisher = publisher(ANNEX_B_PORT);
    publisher.start().expect("publisher start");
    let uri = format!("rtsp://127.0.0.1:{ANNEX_B_PORT}/live/live");

    // Parameter sets inside the buffer configure the stream.
    let mut header = vec![0, 0, 0, 1];
    header.extend_from_slice(SPS);
    header.extend_from_slice(&[0, 0, 0, 1]);
    header.extend_from_slice(PPS);
    assert_eq!(publisher.submit_annex_b(&header, 0).unwrap(), 0);
    assert!(publisher.state().unwrap().finalized);

    let mut client = RtspClient::connect(ANNEX_B_PORT).expect("connect");
    let rtp = rtp_socket();
    let session = client.watch(&uri, &rtp).unwrap();

    let mut slice = vec![0, 0, 0, 1, 0x65];
    slice.extend((0..3000u32).map(|i| (i % 251) as u8));
    assert_eq!(publisher.submit_annex_b(&slice, 40_000).unwrap(), 1);

    let packets: Vec<Vec<u8>> = (0..3).map(|_| recv_packet(&rtp)).collect();
    for (i, packet) in packets.iter().enumerate() {
        assert_eq!(timestamp(packet), 3600, "40 ms at 90 kHz");
        assert_eq!(packet[12] & 0x1f, 28, "FU-A");
        assert_eq!(packet[13] & 0x1f, 5, "IDR inside");
        assert_eq!(packet[1] & 0x80 != 0, i == 2, "marker on the last fragment");
    }
    let seq: Vec<u16> = packets
        .iter()
        .map(|p| u16::from_be_bytes([p[2], p[3]]))
        .collect();
    assert_eq!(seq[1], seq[0].wrapping_add(1));
    assert_eq!(seq[2], seq[1].wrapping_add(1));

    let teardown = client.send("TEARDOWN", &uri, &[("Session", &session)]).unwrap();
    assert_eq!(teardown.status, 200);
    assert!(publisher.engine().viewers().is_empty());

    publisher.stop().expect("stop");
    publisher.engine().stop_rtsp_listener();
}

#[test]
fn restart_then_configure_serves_the_stream_again() {
    let publisher = publisher(RECONFIGURE_PORT);
    let uri = format!("rtsp://127.0.0.1:{RECONFIGURE_PORT}/live/live");
    let accept = [("Accept", "application/sdp")];

    publisher.start().expect("first start");
    publisher.configure(SPS, PPS).expect("first configure");
    publisher.start().expect("restart");
    publisher.configure(SPS, PPS).expect("configure after restart");
    assert!(publisher.state().unwrap().finalized);

    let mut client = RtspClient::connect(RECONFIGURE_PORT).expect("connect");
    let describe = client.send("DESCRIBE", &uri, &accept).unwrap();
    assert_eq!(describe.status, 200);
    assert!(describe.body.contains("sprop-parameter-sets="));

    // In-band parameter sets after another restart take the same path.
    publisher.start().expect("second restart");
    let mut unit = vec![0, 0, 0, 1];
    unit.extend_from_slice(SPS);
    unit.extend_from_slice(&[0, 0, 0, 1]);
    unit.extend_from_slice(PPS);
    unit.extend_from_slice(&[0, 0, 0, 1]);
    unit.extend_from_slice(IDR);
    assert_eq!(publisher.submit_annex_b(&unit, 80_000).unwrap(), 1);
    assert_eq!(client.send("DESCRIBE", &uri, &accept).unwrap().status, 200);

    publisher.stop().expect("stop");
    publisher.engine().stop_rtsp_listener();
}
