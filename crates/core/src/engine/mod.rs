//! The media-serving engine as seen by the publisher.
//!
//! [`MediaEngine`] is the fixed capability surface the
//! [`Publisher`](crate::Publisher) drives: one-time environment setup, an
//! RTSP listener, handle-based media sources, a single video track per
//! source, Annex-B frame ingestion, and track finalization.
//!
//! [`RtspEngine`] is the in-process implementation backed by the RTSP
//! server in this crate.

pub mod rtsp;

use std::fmt;

use crate::error::Result;
use crate::media::VideoCodec;
use crate::runtime::RuntimeConfig;

pub use self::rtsp::RtspEngine;

pub const DEFAULT_VHOST: &str = "__defaultVhost__";
pub const DEFAULT_APP: &str = "live";
pub const DEFAULT_STREAM: &str = "live";

/// Identifies one publishable stream: `(vhost, app, stream)`.
///
/// The vhost is a namespace inside the engine; clients address the stream
/// as `rtsp://host:port/{app}/{stream}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StreamKey {
    pub vhost: String,
    pub app: String,
    pub stream: String,
}

impl StreamKey {
    pub fn new(vhost: &str, app: &str, stream: &str) -> Self {
        Self {
            vhost: vhost.to_string(),
            app: app.to_string(),
            stream: stream.to_string(),
        }
    }

    /// Mount path clients use to reach this stream.
    pub fn mount_path(&self) -> String {
        format!("/{}/{}", self.app, self.stream)
    }
}

impl Default for StreamKey {
    fn default() -> Self {
        Self::new(DEFAULT_VHOST, DEFAULT_APP, DEFAULT_STREAM)
    }
}

impl fmt::Display for StreamKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.vhost, self.app, self.stream)
    }
}

/// Opaque reference to a media source inside the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MediaHandle(pub u64);

/// Video track description handed to [`MediaEngine::init_video`].
///
/// The defaults are static and not derived from the encoder; callers that
/// know their encoder settings should override them.
#[derive(Debug, Clone, PartialEq)]
pub struct VideoTrackConfig {
    pub codec: VideoCodec,
    pub width: u32,
    pub height: u32,
    pub fps: f32,
    /// Target bitrate in bits per second.
    pub bitrate: u32,
}

impl Default for VideoTrackConfig {
    fn default() -> Self {
        Self {
            codec: VideoCodec::H264,
            width: 1280,
            height: 720,
            fps: 30.0,
            bitrate: 2_000_000,
        }
    }
}

/// Capability surface of a media-serving engine.
///
/// Implementations must be callable from any thread. For each handle the
/// publisher calls `create_media` once, then per `start` at most one
/// `init_video` followed by any number of `input_h264` and at most one
/// `init_complete`, and finally `release_media`. A `start` on a live handle
/// begins a new round: `init_video` then redeclares the track of the same
/// source, and the source stays hidden from new clients until the following
/// `init_complete`.
pub trait MediaEngine: Send + Sync {
    /// Process-wide setup (worker width, log verbosity and sink).
    fn init_environment(&self, config: &RuntimeConfig) -> Result<()>;

    /// Make sure a plain RTSP listener is accepting on `port`.
    fn start_rtsp_listener(&self, port: u16) -> Result<()>;

    /// Create the media source for `key`.
    fn create_media(&self, key: &StreamKey) -> Result<MediaHandle>;

    /// Release a media source and disconnect its clients.
    fn release_media(&self, handle: MediaHandle) -> Result<()>;

    /// Declare the video track of a media source, or replace it when the
    /// source already has one.
    fn init_video(&self, handle: MediaHandle, track: &VideoTrackConfig) -> Result<()>;

    /// Push an Annex-B H.264 buffer with decode/presentation timestamps in ms.
    fn input_h264(&self, handle: MediaHandle, data: &[u8], dts_ms: u64, pts_ms: u64)
    -> Result<()>;

    /// Declare the track set complete so clients can consume the stream.
    fn init_complete(&self, handle: MediaHandle) -> Result<()>;
}
