use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use super::{MediaEngine, MediaHandle, StreamKey, VideoTrackConfig};
use crate::error::{Result, RtspError};
use crate::mount::{Mount, MountRegistry};
use crate::runtime::{self, RuntimeConfig};
use crate::server::{Server, ServerConfig, Viewer};

/// Dynamic RTP payload type used for every video track.
const VIDEO_PAYLOAD_TYPE: u8 = 96;

/// One media source created through [`MediaEngine::create_media`].
struct MediaSource {
    key: StreamKey,
    path: String,
    /// Present once the video track has been initialized.
    mount: Option<Arc<Mount>>,
}

struct EngineState {
    max_connections: usize,
    listener: Option<(u16, Server)>,
    sources: HashMap<MediaHandle, MediaSource>,
    next_handle: u64,
}

/// In-process [`MediaEngine`] backed by this crate's RTSP server.
///
/// Each media source becomes a mount at `/{app}/{stream}` once its video
/// track is declared, and is offered to RTSP clients after
/// [`init_complete`](MediaEngine::init_complete). Frames are packetized
/// per mount and sent to every playing subscriber.
pub struct RtspEngine {
    bind_host: String,
    server_config: ServerConfig,
    mounts: MountRegistry,
    state: Mutex<EngineState>,
}

impl RtspEngine {
    pub fn new() -> Self {
        Self::with_config("0.0.0.0", ServerConfig::default())
    }

    /// Create an engine whose listener binds to `bind_host` and serves
    /// with the given protocol/SDP configuration.
    pub fn with_config(bind_host: &str, server_config: ServerConfig) -> Self {
        let max_connections = server_config.max_connections;
        Self {
            bind_host: bind_host.to_string(),
            server_config,
            mounts: MountRegistry::new(),
            state: Mutex::new(EngineState {
                max_connections,
                listener: None,
                sources: HashMap::new(),
                next_handle: 1,
            }),
        }
    }

    /// Clients currently playing any stream.
    pub fn viewers(&self) -> Vec<Viewer> {
        self.state
            .lock()
            .listener
            .as_ref()
            .map(|(_, server)| server.get_viewers())
            .unwrap_or_default()
    }

    /// Port of the running listener, if any.
    pub fn listening_port(&self) -> Option<u16> {
        self.state.lock().listener.as_ref().map(|(port, _)| *port)
    }

    /// Stop accepting RTSP clients. Media sources stay registered.
    pub fn stop_rtsp_listener(&self) {
        if let Some((port, mut server)) = self.state.lock().listener.take() {
            server.stop();
            tracing::info!(port, "RTSP listener stopped");
        }
    }

    /// Mount registry shared with the listener.
    pub fn mounts(&self) -> &MountRegistry {
        &self.mounts
    }
}

impl Default for RtspEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineState {
    fn source(&self, handle: MediaHandle) -> Result<&MediaSource> {
        self.sources
            .get(&handle)
            .ok_or(RtspError::MediaNotFound(handle.0))
    }

    fn track(&self, handle: MediaHandle) -> Result<Arc<Mount>> {
        let source = self.source(handle)?;
        source
            .mount
            .clone()
            .ok_or_else(|| RtspError::TrackNotInitialized(source.path.clone()))
    }
}

impl MediaEngine for RtspEngine {
    fn init_environment(&self, config: &RuntimeConfig) -> Result<()> {
        runtime::install_logging(config);
        self.state.lock().max_connections = config.worker_threads.max(1);
        tracing::info!(
            worker_threads = config.worker_threads,
            log_level = %config.log_level,
            "engine environment initialized"
        );
        Ok(())
    }

    fn start_rtsp_listener(&self, port: u16) -> Result<()> {
        let mut state = self.state.lock();
        if let Some((running_port, _)) = &state.listener {
            if *running_port == port {
                return Ok(());
            }
            return Err(RtspError::AlreadyRunning(*running_port));
        }

        let config = ServerConfig {
            max_connections: state.max_connections,
            ..self.server_config.clone()
        };
        let bind_addr = format!("{}:{}", self.bind_host, port);
        let mut server = Server::with_config(&bind_addr, self.mounts.clone(), config);
        server.start()?;
        state.listener = Some((port, server));
        Ok(())
    }

    fn create_media(&self, key: &StreamKey) -> Result<MediaHandle> {
        let mut state = self.state.lock();
        let path = key.mount_path();
        if state.sources.values().any(|s| s.path == path) {
            return Err(RtspError::MediaExists(key.to_string()));
        }

        let handle = MediaHandle(state.next_handle);
        state.next_handle += 1;
        state.sources.insert(
            handle,
            MediaSource {
                key: key.clone(),
                path,
                mount: None,
            },
        );
        tracing::info!(stream = %key, handle = handle.0, "media source created");
        Ok(handle)
    }

    fn release_media(&self, handle: MediaHandle) -> Result<()> {
        let mut state = self.state.lock();
        let source = state
            .sources
            .remove(&handle)
            .ok_or(RtspError::MediaNotFound(handle.0))?;

        if let Some(mount) = self.mounts.remove(&source.path) {
            if let Some((_, server)) = &state.listener {
                let dropped = server.drop_mount_sessions(&mount);
                tracing::debug!(path = %source.path, dropped, "sessions dropped with media source");
            }
        }
        tracing::info!(stream = %source.key, handle = handle.0, "media source released");
        Ok(())
    }

    fn init_video(&self, handle: MediaHandle, track: &VideoTrackConfig) -> Result<()> {
        let mut state = self.state.lock();
        let source = state
            .sources
            .get_mut(&handle)
            .ok_or(RtspError::MediaNotFound(handle.0))?;
        if let Some(mount) = &source.mount {
            mount.redeclare(track.clone());
            tracing::info!(path = %source.path, "video track redeclared");
            return Ok(());
        }

        let packetizer = track.codec.packetizer(VIDEO_PAYLOAD_TYPE);
        source.mount = Some(self.mounts.add(&source.path, packetizer, track.clone()));
        tracing::info!(
            path = %source.path,
            codec = ?track.codec,
            width = track.width,
            height = track.height,
            fps = track.fps,
            bitrate = track.bitrate,
            "video track initialized"
        );
        Ok(())
    }

    fn input_h264(
        &self,
        handle: MediaHandle,
        data: &[u8],
        dts_ms: u64,
        pts_ms: u64,
    ) -> Result<()> {
        let state = self.state.lock();
        let mount = state.track(handle)?;

        // RTP carries presentation time only; dts is not needed without reordering.
        let sent = match &state.listener {
            Some((_, server)) => server.send_frame(&mount, data, pts_ms)?,
            None => {
                mount.packetize(data, pts_ms);
                0
            }
        };
        tracing::trace!(
            path = %mount.path(),
            bytes = data.len(),
            dts_ms,
            pts_ms,
            sent,
            "frame ingested"
        );
        Ok(())
    }

    fn init_complete(&self, handle: MediaHandle) -> Result<()> {
        let state = self.state.lock();
        state.track(handle)?.set_ready();
        Ok(())
    }
}
