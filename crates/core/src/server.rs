use std::net::{SocketAddr, TcpListener};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

use crate::error::{Result, RtspError};
use crate::mount::{Mount, MountRegistry};
use crate::runtime::DEFAULT_WORKER_THREADS;
use crate::session::SessionManager;
use crate::transport::UdpTransport;
use crate::transport::tcp::{self, Shared};

/// Listener settings and the fixed parts of the SDP.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Host written into SDP `o=`/`c=`. Inferred from the request when unset.
    pub public_host: Option<String>,
    pub sdp_username: String,
    pub sdp_session_id: String,
    pub sdp_session_version: String,
    pub sdp_session_name: String,
    /// Connections past this count are closed right after accept.
    pub max_connections: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            public_host: None,
            sdp_username: "-".to_string(),
            sdp_session_id: "0".to_string(),
            sdp_session_version: "0".to_string(),
            sdp_session_name: "Stream".to_string(),
            max_connections: DEFAULT_WORKER_THREADS,
        }
    }
}

/// RTSP listener and RTP fan-out for the mounts of a [`MountRegistry`].
///
/// The registry is shared with the publishing side; sessions belong to the
/// server. Signaling runs on [`transport::tcp`](crate::transport::tcp)
/// threads, media leaves through one [`UdpTransport`].
pub struct Server {
    bind_addr: String,
    local_addr: Option<SocketAddr>,
    shared: Shared,
    udp: Option<UdpTransport>,
}

impl Server {
    pub fn new(bind_addr: &str, mounts: MountRegistry) -> Self {
        Self::with_config(bind_addr, mounts, ServerConfig::default())
    }

    pub fn with_config(bind_addr: &str, mounts: MountRegistry, config: ServerConfig) -> Self {
        Self {
            bind_addr: bind_addr.to_string(),
            local_addr: None,
            shared: Shared {
                sessions: SessionManager::new(),
                mounts,
                config: Arc::new(config),
                running: Arc::new(AtomicBool::new(false)),
            },
            udp: None,
        }
    }

    /// Bind and start accepting. A running server is left alone.
    pub fn start(&mut self) -> Result<()> {
        if self.is_running() {
            return Ok(());
        }

        let udp = UdpTransport::bind()?;
        let listener = TcpListener::bind(&self.bind_addr)?;
        listener.set_nonblocking(true)?;
        let local_addr = listener.local_addr()?;

        self.udp = Some(udp);
        self.local_addr = Some(local_addr);
        self.shared.running.store(true, Ordering::SeqCst);
        tracing::info!(addr = %local_addr, "RTSP server listening");

        let shared = self.shared.clone();
        thread::Builder::new()
            .name("rtsp-accept".to_string())
            .spawn(move || tcp::accept_loop(listener, shared))?;
        Ok(())
    }

    /// Stop accepting. Connection threads exit after their current request.
    pub fn stop(&mut self) {
        if self.shared.running.swap(false, Ordering::SeqCst) {
            tracing::info!(addr = ?self.local_addr, "RTSP server stopping");
        }
    }

    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::SeqCst)
    }

    /// Address the listener is bound to, once started.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    /// Packetize a frame for `mount` and send it to its playing sessions.
    ///
    /// The packetizer advances whether or not anyone watches. Returns the
    /// bytes sent.
    pub fn send_frame(&self, mount: &Mount, data: &[u8], pts_ms: u64) -> Result<usize> {
        let udp = self.udp.as_ref().ok_or(RtspError::NotStarted)?;
        let packets = mount.packetize(data, pts_ms);

        let mut sent = 0;
        for id in mount.subscribed_session_ids() {
            let Some(session) = self.shared.sessions.get(&id).filter(|s| s.is_playing()) else {
                continue;
            };
            match udp.send_all(&packets, session.transport.client_rtp) {
                Ok(n) => sent += n,
                Err(e) => {
                    tracing::warn!(session_id = %id, client = %session.transport.client_rtp, error = %e, "RTP send failed");
                }
            }
        }
        Ok(sent)
    }

    /// End every session watching `mount`, as when its source goes away.
    pub fn drop_mount_sessions(&self, mount: &Mount) -> usize {
        let ids = mount.subscribed_session_ids();
        for id in &ids {
            mount.unsubscribe(id);
        }
        self.shared.sessions.remove_all(&ids)
    }

    pub fn get_viewers(&self) -> Vec<Viewer> {
        self.shared
            .sessions
            .playing()
            .iter()
            .map(|session| Viewer {
                session_id: session.id.clone(),
                uri: session.uri.clone(),
                client_addr: session.transport.client_rtp.ip().to_string(),
                client_rtp_port: session.transport.client_rtp.port(),
            })
            .collect()
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        self.stop();
    }
}

/// A client currently receiving RTP.
#[derive(Debug, Clone)]
pub struct Viewer {
    pub session_id: String,
    pub uri: String,
    pub client_addr: String,
    pub client_rtp_port: u16,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::VideoTrackConfig;
    use crate::media::VideoCodec;

    const IDR: [u8; 6] = [0, 0, 0, 1, 0x65, 0x88];

    fn mounts_with_live() -> (MountRegistry, Arc<Mount>) {
        let mounts = MountRegistry::new();
        let mount = mounts.add(
            "/live/live",
            VideoCodec::H264.packetizer(96),
            VideoTrackConfig::default(),
        );
        (mounts, mount)
    }

    #[test]
    fn send_before_start_is_rejected() {
        let (mounts, mount) = mounts_with_live();
        let server = Server::new("127.0.0.1:0", mounts);
        assert!(!server.is_running());
        assert!(server.local_addr().is_none());
        assert!(matches!(
            server.send_frame(&mount, &IDR, 0),
            Err(RtspError::NotStarted)
        ));
    }

    #[test]
    fn start_is_idempotent_and_stop_clears_running() {
        let (mounts, mount) = mounts_with_live();
        let mut server = Server::new("127.0.0.1:0", mounts);
        server.start().unwrap();
        let addr = server.local_addr().unwrap();
        server.start().unwrap();
        assert_eq!(server.local_addr(), Some(addr));
        assert!(server.is_running());

        // Nobody is subscribed: nothing goes out, but the stream advances.
        assert_eq!(server.send_frame(&mount, &IDR, 40).unwrap(), 0);
        assert_eq!(mount.rtp_position().sequence, 1);
        assert!(server.get_viewers().is_empty());

        server.stop();
        assert!(!server.is_running());
    }
}
