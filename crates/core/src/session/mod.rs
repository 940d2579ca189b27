//! RTSP sessions (RFC 2326 §3, §12.37).
//!
//! A session is created by SETUP and lives until TEARDOWN, until its RTSP
//! connection closes, until its client stays silent past the timeout, or
//! until the stream it watches is withdrawn.
//!
//! ```text
//! SETUP -> Ready -> PLAY -> Playing <-> PAUSE -> Paused
//! ```
//!
//! Only `Playing` sessions receive RTP.

pub mod transport;

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU16, Ordering};
use std::time::{Duration, Instant};

use parking_lot::{Mutex, RwLock};

pub use transport::{ClientPorts, Transport, TransportError};

/// Advertised server port pairs cycle through this range.
const SERVER_PORT_MIN: u16 = 5000;
const SERVER_PORT_MAX: u16 = 65534;

/// Silence after which a session is dropped (§12.37 default).
pub const DEFAULT_SESSION_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Ready,
    Playing,
    Paused,
}

#[derive(Debug)]
pub struct Session {
    /// 16 hex digits, unguessable.
    pub id: String,
    /// Request-URI of the SETUP, echoed in `RTP-Info`.
    pub uri: String,
    pub mount_path: String,
    pub transport: Transport,
    state: Mutex<SessionState>,
    last_seen: Mutex<Instant>,
    timeout: Duration,
}

impl Session {
    fn new(id: String, uri: &str, mount_path: &str, transport: Transport) -> Self {
        Self {
            id,
            uri: uri.to_string(),
            mount_path: mount_path.to_string(),
            transport,
            state: Mutex::new(SessionState::Ready),
            last_seen: Mutex::new(Instant::now()),
            timeout: DEFAULT_SESSION_TIMEOUT,
        }
    }

    pub fn state(&self) -> SessionState {
        *self.state.lock()
    }

    pub fn set_state(&self, state: SessionState) {
        let previous = std::mem::replace(&mut *self.state.lock(), state);
        if previous != state {
            tracing::debug!(session_id = %self.id, ?previous, ?state, "session state changed");
        }
    }

    pub fn is_playing(&self) -> bool {
        self.state() == SessionState::Playing
    }

    /// Any request naming the session keeps it alive.
    pub fn touch(&self) {
        *self.last_seen.lock() = Instant::now();
    }

    pub fn is_expired(&self, now: Instant) -> bool {
        now.saturating_duration_since(*self.last_seen.lock()) > self.timeout
    }

    /// `Session` response header: `<id>;timeout=<secs>`.
    pub fn header_value(&self) -> String {
        format!("{};timeout={}", self.id, self.timeout.as_secs())
    }
}

/// Sessions of one RTSP listener, shared by its connections.
#[derive(Clone)]
pub struct SessionManager {
    sessions: Arc<RwLock<HashMap<String, Arc<Session>>>>,
    next_server_port: Arc<AtomicU16>,
}

impl SessionManager {
    pub fn new() -> Self {
        Self {
            sessions: Arc::default(),
            next_server_port: Arc::new(AtomicU16::new(SERVER_PORT_MIN)),
        }
    }

    /// Even RTP port and the RTCP port above it (RFC 3550 §11), wrapping
    /// back to the bottom of the range.
    pub fn allocate_server_ports(&self) -> (u16, u16) {
        let rtp = self
            .next_server_port
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |port| {
                Some(if port >= SERVER_PORT_MAX {
                    SERVER_PORT_MIN
                } else {
                    port + 2
                })
            })
            .unwrap_or_else(|port| port);
        (rtp, rtp + 1)
    }

    /// Register a session under a fresh random id.
    pub fn create(&self, uri: &str, mount_path: &str, transport: Transport) -> Arc<Session> {
        let mut sessions = self.sessions.write();
        let id = loop {
            let id = format!("{:016X}", rand::random::<u64>());
            if !sessions.contains_key(&id) {
                break id;
            }
        };
        let session = Arc::new(Session::new(id.clone(), uri, mount_path, transport));
        sessions.insert(id, session.clone());
        tracing::debug!(session_id = %session.id, mount_path, total = sessions.len(), "session created");
        session
    }

    pub fn get(&self, id: &str) -> Option<Arc<Session>> {
        self.sessions.read().get(id).cloned()
    }

    pub fn remove(&self, id: &str) -> Option<Arc<Session>> {
        self.sessions.write().remove(id)
    }

    /// Remove every listed session. Returns how many existed.
    pub fn remove_all(&self, ids: &[String]) -> usize {
        let mut sessions = self.sessions.write();
        ids.iter().filter(|id| sessions.remove(*id).is_some()).count()
    }

    /// Take out sessions that went silent past their timeout at `now`.
    pub fn remove_expired(&self, now: Instant) -> Vec<Arc<Session>> {
        let mut sessions = self.sessions.write();
        let mut expired = Vec::new();
        sessions.retain(|_, session| {
            if session.is_expired(now) {
                expired.push(session.clone());
                false
            } else {
                true
            }
        });
        if !expired.is_empty() {
            tracing::info!(
                expired = expired.len(),
                remaining = sessions.len(),
                "timed-out sessions removed"
            );
        }
        expired
    }

    pub fn playing(&self) -> Vec<Arc<Session>> {
        self.sessions
            .read()
            .values()
            .filter(|s| s.is_playing())
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }
}

impl Default for SessionManager {
    fn default() -> Self {
        Self::new()
    }
}
