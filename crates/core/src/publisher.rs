//! Annex-B publishing front door over a [`MediaEngine`].
//!
//! The publisher owns one media session per [`StreamKey`] and enforces the
//! call order the engine needs:
//!
//! ```text
//! ABSENT --start--> ACTIVE(video_configured=false, finalized=false)
//! ACTIVE --configure (first)--> video_configured=true, then finalized=true
//! ACTIVE(finalized) --submit_frame*--> ACTIVE(finalized)
//! ACTIVE --stop--> ABSENT
//! ```
//!
//! Every buffer handed to the engine is `00 00 00 01` followed by the
//! caller's NAL unit, copied before the call returns.

use std::collections::HashMap;

use parking_lot::Mutex;

use crate::engine::{MediaEngine, MediaHandle, StreamKey, VideoTrackConfig};
use crate::error::PublishError;
use crate::media::nal::{NAL_IDR, NAL_PPS, NAL_SPS, nal_type, split_annex_b};
use crate::runtime::RuntimeConfig;

/// Annex-B start code prepended to every forwarded NAL unit.
pub const START_CODE: [u8; 4] = [0x00, 0x00, 0x00, 0x01];

/// Default RTSP listen port.
pub const DEFAULT_RTSP_PORT: u16 = 8554;

/// Settings for a [`Publisher`].
#[derive(Debug, Clone)]
pub struct PublisherConfig {
    /// Port the engine's RTSP listener is started on.
    pub rtsp_port: u16,
    /// Stream used by the keyless operations (`start`, `submit_frame`, ...).
    pub stream: StreamKey,
    /// Track parameters declared on the first `configure`.
    pub video: VideoTrackConfig,
    /// Environment applied once, on the first `start`.
    pub runtime: RuntimeConfig,
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            rtsp_port: DEFAULT_RTSP_PORT,
            stream: StreamKey::default(),
            video: VideoTrackConfig::default(),
            runtime: RuntimeConfig::default(),
        }
    }
}

/// Init progress of one media session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishState {
    pub video_configured: bool,
    pub finalized: bool,
}

#[derive(Debug)]
struct PublishSession {
    handle: MediaHandle,
    state: PublishState,
}

impl PublishSession {
    fn configure<E: MediaEngine>(
        &mut self,
        engine: &E,
        track: &VideoTrackConfig,
        key: &StreamKey,
        sps: &[u8],
        pps: &[u8],
    ) -> Result<(), PublishError> {
        if !self.state.video_configured {
            engine.init_video(self.handle, track)?;
            self.state.video_configured = true;
        }

        for param_set in [sps, pps] {
            if param_set.is_empty() {
                continue;
            }
            engine.input_h264(self.handle, &annex_b(param_set), 0, 0)?;
        }

        if !self.state.finalized {
            engine.init_complete(self.handle)?;
            self.state.finalized = true;
            tracing::info!(
                stream = %key,
                sps_len = sps.len(),
                pps_len = pps.len(),
                "track set finalized"
            );
        }
        Ok(())
    }

    fn forward<E: MediaEngine>(
        &self,
        engine: &E,
        key: &StreamKey,
        nal: &[u8],
        pts_us: i64,
        is_key: bool,
    ) -> Result<(), PublishError> {
        let ts_ms = micros_to_millis(pts_us);
        tracing::trace!(stream = %key, len = nal.len(), ts_ms, is_key, "frame");
        engine.input_h264(self.handle, &annex_b(nal), ts_ms, ts_ms)?;
        Ok(())
    }
}

#[derive(Default)]
struct Inner {
    env_initialized: bool,
    sessions: HashMap<StreamKey, PublishSession>,
}

/// Publishes H.264 NAL units into a [`MediaEngine`].
///
/// All operations are synchronous pass-throughs; concurrent callers are
/// serialized, but the order of frames submitted from different threads is
/// up to the caller.
pub struct Publisher<E: MediaEngine> {
    engine: E,
    config: PublisherConfig,
    inner: Mutex<Inner>,
}

impl<E: MediaEngine> Publisher<E> {
    pub fn new(engine: E) -> Self {
        Self::with_config(engine, PublisherConfig::default())
    }

    pub fn with_config(engine: E, config: PublisherConfig) -> Self {
        Self {
            engine,
            config,
            inner: Mutex::new(Inner::default()),
        }
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn config(&self) -> &PublisherConfig {
        &self.config
    }

    /// Start (or restart) the default stream.
    pub fn start(&self) -> Result<(), PublishError> {
        self.start_stream(&self.config.stream)
    }

    /// Stop the default stream. No-op when it is not running.
    pub fn stop(&self) -> Result<(), PublishError> {
        self.stop_stream(&self.config.stream)
    }

    /// Hand the default stream its SPS/PPS. Empty buffers are skipped.
    pub fn configure(&self, sps: &[u8], pps: &[u8]) -> Result<(), PublishError> {
        self.configure_stream(&self.config.stream, sps, pps)
    }

    /// Forward one coded picture NAL on the default stream.
    pub fn submit_frame(&self, payload: &[u8], pts_us: i64, is_key: bool) -> Result<(), PublishError> {
        self.submit_frame_to(&self.config.stream, payload, pts_us, is_key)
    }

    /// Accept an audio frame for the default stream. Audio is not forwarded.
    pub fn submit_audio(&self, payload: &[u8], pts_us: i64) -> Result<(), PublishError> {
        self.submit_audio_to(&self.config.stream, payload, pts_us)
    }

    /// Publish an Annex-B buffer on the default stream.
    pub fn submit_annex_b(&self, data: &[u8], pts_us: i64) -> Result<usize, PublishError> {
        self.submit_annex_b_to(&self.config.stream, data, pts_us)
    }

    /// Init progress of the default stream, `None` when it is not running.
    pub fn state(&self) -> Option<PublishState> {
        self.stream_state(&self.config.stream)
    }

    /// Init progress of `key`, `None` when it is not running.
    pub fn stream_state(&self, key: &StreamKey) -> Option<PublishState> {
        self.inner.lock().sessions.get(key).map(|s| s.state)
    }

    /// Start `key`: set up the environment once, make sure the listener
    /// runs, create the media source if absent, and reset its init state.
    pub fn start_stream(&self, key: &StreamKey) -> Result<(), PublishError> {
        let mut inner = self.inner.lock();

        if !inner.env_initialized {
            self.engine.init_environment(&self.config.runtime)?;
            inner.env_initialized = true;
        }

        self.engine.start_rtsp_listener(self.config.rtsp_port)?;

        match inner.sessions.get_mut(key) {
            Some(session) => {
                session.state = PublishState::default();
                tracing::debug!(stream = %key, "start on active stream, init state reset");
            }
            None => {
                let handle = self.engine.create_media(key)?;
                inner.sessions.insert(
                    key.clone(),
                    PublishSession {
                        handle,
                        state: PublishState::default(),
                    },
                );
                tracing::info!(stream = %key, port = self.config.rtsp_port, "stream started");
            }
        }
        Ok(())
    }

    /// Release the media source of `key`. No-op when it is not running.
    ///
    /// The stream is only forgotten once the engine has let go of it, so a
    /// failed release can be retried.
    pub fn stop_stream(&self, key: &StreamKey) -> Result<(), PublishError> {
        let mut inner = self.inner.lock();
        let Some(session) = inner.sessions.get(key) else {
            return Ok(());
        };
        self.engine.release_media(session.handle)?;
        inner.sessions.remove(key);
        tracing::info!(stream = %key, "stream stopped");
        Ok(())
    }

    /// Declare the video track on first call, forward the non-empty
    /// parameter sets at timestamp 0, then finalize the track set once.
    pub fn configure_stream(
        &self,
        key: &StreamKey,
        sps: &[u8],
        pps: &[u8],
    ) -> Result<(), PublishError> {
        let mut inner = self.inner.lock();
        let session = inner
            .sessions
            .get_mut(key)
            .ok_or_else(|| PublishError::NotStarted(key.clone()))?;
        session.configure(&self.engine, &self.config.video, key, sps, pps)
    }

    /// Forward one NAL unit with its presentation time in microseconds.
    ///
    /// The time is truncated to milliseconds and used for both DTS and PTS.
    /// `is_key` is carried for callers but the engine finds key frames from
    /// the NAL header itself.
    pub fn submit_frame_to(
        &self,
        key: &StreamKey,
        payload: &[u8],
        pts_us: i64,
        is_key: bool,
    ) -> Result<(), PublishError> {
        let inner = self.inner.lock();
        let session = inner
            .sessions
            .get(key)
            .ok_or_else(|| PublishError::NotStarted(key.clone()))?;
        if payload.is_empty() {
            return Err(PublishError::InvalidInput("empty frame payload"));
        }
        session.forward(&self.engine, key, payload, pts_us, is_key)
    }

    /// Publish a buffer holding any number of start-code delimited NAL
    /// units, the way encoders and `.h264` files produce them.
    ///
    /// Until the stream is finalized, SPS/PPS in the buffer configure it as
    /// [`configure_stream`](Self::configure_stream) does, and slices seen
    /// before that are dropped. Once finalized, every NAL is forwarded in
    /// order at `pts_us`, repeated parameter sets included, with IDR slices
    /// flagged as key frames. The whole buffer is handled under one lock, so
    /// a concurrent `stop` never splits it. Returns how many NALs were
    /// forwarded at `pts_us`.
    pub fn submit_annex_b_to(
        &self,
        key: &StreamKey,
        data: &[u8],
        pts_us: i64,
    ) -> Result<usize, PublishError> {
        let mut inner = self.inner.lock();
        let session = inner
            .sessions
            .get_mut(key)
            .ok_or_else(|| PublishError::NotStarted(key.clone()))?;

        let mut nals: Vec<&[u8]> = split_annex_b(data).collect();
        if !session.state.finalized {
            let mut sps: &[u8] = &[];
            let mut pps: &[u8] = &[];
            nals.retain(|nal| match nal_type(nal) {
                Some(NAL_SPS) => {
                    sps = *nal;
                    false
                }
                Some(NAL_PPS) => {
                    pps = *nal;
                    false
                }
                _ => true,
            });
            if !sps.is_empty() || !pps.is_empty() {
                session.configure(&self.engine, &self.config.video, key, sps, pps)?;
            }
            if !session.state.finalized {
                tracing::debug!(stream = %key, dropped = nals.len(), "frames before parameter sets dropped");
                return Ok(0);
            }
        }

        for nal in &nals {
            session.forward(&self.engine, key, nal, pts_us, nal_type(nal) == Some(NAL_IDR))?;
        }
        Ok(nals.len())
    }

    /// Accept audio for `key` without forwarding it. There is no audio
    /// track yet, so this never reaches the engine.
    pub fn submit_audio_to(
        &self,
        key: &StreamKey,
        payload: &[u8],
        pts_us: i64,
    ) -> Result<(), PublishError> {
        tracing::trace!(stream = %key, len = payload.len(), pts_us, "audio dropped");
        Ok(())
    }
}

/// Prefix a NAL unit with the 4-byte Annex-B start code.
pub fn annex_b(nal: &[u8]) -> Vec<u8> {
    let mut framed = Vec::with_capacity(START_CODE.len() + nal.len());
    framed.extend_from_slice(&START_CODE);
    framed.extend_from_slice(nal);
    framed
}

/// Truncating microsecond → millisecond conversion. Negative times clamp to 0.
fn micros_to_millis(pts_us: i64) -> u64 {
    (pts_us / 1000).max(0) as u64
}
