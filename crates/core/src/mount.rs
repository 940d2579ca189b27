use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::{Mutex, RwLock};

use crate::engine::VideoTrackConfig;
use crate::media::{Packetizer, RtpPosition, rtp_timestamp_from_ms};

/// Path served for requests that carry no path (`rtsp://host:8554`, `*`).
pub const DEFAULT_MOUNT_PATH: &str = "/live/live";

/// The RTSP endpoint of one published stream, e.g. `/live/camera1`.
///
/// A mount exists from the moment its source declares a video track. It is
/// only offered to clients (DESCRIBE, SETUP) after [`set_ready`](Self::set_ready),
/// when the publisher has finalized the track set. Declaring the track again
/// through [`redeclare`](Self::redeclare) hides it until the next `set_ready`.
pub struct Mount {
    path: String,
    track: RwLock<VideoTrackConfig>,
    packetizer: Mutex<Box<dyn Packetizer>>,
    ready: AtomicBool,
    subscribers: RwLock<HashSet<String>>,
}

impl Mount {
    pub fn new(path: &str, packetizer: Box<dyn Packetizer>, track: VideoTrackConfig) -> Self {
        Self {
            path: path.to_string(),
            track: RwLock::new(track),
            packetizer: Mutex::new(packetizer),
            ready: AtomicBool::new(false),
            subscribers: RwLock::new(HashSet::new()),
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn track(&self) -> VideoTrackConfig {
        self.track.read().clone()
    }

    /// Replace the track description and withdraw the mount from new
    /// clients. Playing sessions and the RTP stream carry on.
    pub fn redeclare(&self, track: VideoTrackConfig) {
        *self.track.write() = track;
        if self.ready.swap(false, Ordering::SeqCst) {
            tracing::info!(mount = %self.path, "mount withdrawn until the track set is complete");
        }
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    pub fn set_ready(&self) {
        if !self.ready.swap(true, Ordering::SeqCst) {
            tracing::info!(mount = %self.path, "mount ready for clients");
        }
    }

    /// RTP packets for an Annex-B buffer presented at `pts_ms`.
    pub fn packetize(&self, data: &[u8], pts_ms: u64) -> Vec<Vec<u8>> {
        let mut packetizer = self.packetizer.lock();
        let timestamp = rtp_timestamp_from_ms(pts_ms, packetizer.clock_rate());
        packetizer.packetize(data, timestamp)
    }

    pub fn payload_type(&self) -> u8 {
        self.packetizer.lock().payload_type()
    }

    pub fn sdp_attributes(&self) -> Vec<String> {
        self.packetizer.lock().sdp_attributes()
    }

    pub fn rtp_position(&self) -> RtpPosition {
        self.packetizer.lock().position()
    }

    pub fn subscribe(&self, session_id: &str) {
        if self.subscribers.write().insert(session_id.to_string()) {
            tracing::debug!(mount = %self.path, session_id, "session subscribed");
        }
    }

    pub fn unsubscribe(&self, session_id: &str) {
        if self.subscribers.write().remove(session_id) {
            tracing::debug!(mount = %self.path, session_id, "session unsubscribed");
        }
    }

    pub fn subscribed_session_ids(&self) -> Vec<String> {
        self.subscribers.read().iter().cloned().collect()
    }
}

#[derive(Default)]
struct Mounts {
    by_path: HashMap<String, Arc<Mount>>,
    /// Served when a request names no known path.
    fallback: Option<String>,
}

/// Mounts by path, shared between the engine and the RTSP listener.
///
/// The first mount added becomes the fallback, so `rtsp://host:8554/`
/// reaches a lone stream whatever its name.
#[derive(Clone, Default)]
pub struct MountRegistry {
    inner: Arc<RwLock<Mounts>>,
}

impl MountRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a mount, replacing any mount at the same path.
    pub fn add(
        &self,
        path: &str,
        packetizer: Box<dyn Packetizer>,
        track: VideoTrackConfig,
    ) -> Arc<Mount> {
        let mount = Arc::new(Mount::new(path, packetizer, track));
        let mut inner = self.inner.write();
        inner.by_path.insert(path.to_string(), mount.clone());
        if inner.fallback.is_none() {
            inner.fallback = Some(path.to_string());
        }
        tracing::info!(path, "mount registered");
        mount
    }

    /// Remove a mount. When it was the fallback, there is none afterwards.
    pub fn remove(&self, path: &str) -> Option<Arc<Mount>> {
        let mut inner = self.inner.write();
        if inner.fallback.as_deref() == Some(path) {
            inner.fallback = None;
        }
        let removed = inner.by_path.remove(path);
        if removed.is_some() {
            tracing::info!(path, "mount removed");
        }
        removed
    }

    pub fn get(&self, path: &str) -> Option<Arc<Mount>> {
        self.inner.read().by_path.get(path).cloned()
    }

    /// Mount addressed by a request URI, or the fallback.
    pub fn resolve(&self, uri: &str) -> Option<Arc<Mount>> {
        let inner = self.inner.read();
        inner
            .by_path
            .get(mount_path_from_uri(uri))
            .or_else(|| inner.fallback.as_ref().and_then(|p| inner.by_path.get(p)))
            .cloned()
    }

    /// Drop `session_id` from every mount.
    pub fn unsubscribe_all(&self, session_id: &str) {
        for mount in self.inner.read().by_path.values() {
            mount.unsubscribe(session_id);
        }
    }
}

/// Mount path named by an RTSP request URI.
///
/// ```text
/// rtsp://host:8554/live/cam/track1  -> /live/cam
/// rtsp://host:8554/live/cam/        -> /live/cam
/// rtsp://host:8554/                 -> /
/// rtsp://host:8554, *               -> DEFAULT_MOUNT_PATH
/// ```
pub fn mount_path_from_uri(uri: &str) -> &str {
    let path = match uri.split_once("://") {
        Some((_, rest)) => rest.find('/').map_or(DEFAULT_MOUNT_PATH, |i| &rest[i..]),
        None if uri.starts_with('/') => uri,
        None => DEFAULT_MOUNT_PATH,
    };
    let path = path.split_once('?').map_or(path, |(p, _)| p);
    let path = match path.trim_end_matches('/') {
        "" => "/",
        trimmed => trimmed,
    };

    // SETUP addresses the track control URL below the mount.
    match path.rsplit_once('/') {
        Some((parent, last)) if !parent.is_empty() && last.starts_with("track") => parent,
        _ => path,
    }
}
