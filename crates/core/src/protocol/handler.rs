use std::net::SocketAddr;
use std::sync::Arc;

use crate::mount::{Mount, MountRegistry};
use crate::protocol::request::{Method, RtspRequest};
use crate::protocol::response::{RtspResponse, Status};
use crate::protocol::sdp;
use crate::server::ServerConfig;
use crate::session::{ClientPorts, Session, SessionManager, SessionState, Transport, TransportError};

/// A request the handler turns down, with the reason for the log.
#[derive(Debug)]
struct Rejection {
    status: Status,
    reason: &'static str,
}

impl Rejection {
    fn new(status: Status, reason: &'static str) -> Self {
        Self { status, reason }
    }
}

type Outcome = Result<RtspResponse, Rejection>;

/// Answers the RTSP requests of one client connection.
///
/// Remembers the sessions set up over the connection so they can be
/// released when it closes.
pub struct RequestHandler {
    sessions: SessionManager,
    mounts: MountRegistry,
    peer: SocketAddr,
    config: Arc<ServerConfig>,
    owned: Vec<String>,
}

impl RequestHandler {
    pub fn new(
        sessions: SessionManager,
        mounts: MountRegistry,
        peer: SocketAddr,
        config: Arc<ServerConfig>,
    ) -> Self {
        Self {
            sessions,
            mounts,
            peer,
            config,
            owned: Vec::new(),
        }
    }

    /// Sessions created on this connection and not yet torn down.
    pub fn session_ids(&self) -> &[String] {
        &self.owned
    }

    pub fn handle(&mut self, request: &RtspRequest) -> RtspResponse {
        let outcome = match &request.method {
            Method::Options => Ok(self.options()),
            Method::Describe => self.describe(request),
            Method::Setup => self.setup(request),
            Method::Play => self.play(request),
            Method::Pause => self.pause(request),
            Method::Teardown => self.teardown(request),
            Method::GetParameter => Ok(self.get_parameter(request)),
            Method::Other(_) => Err(Rejection::new(Status::NotImplemented, "unsupported method")),
        };

        let response = outcome.unwrap_or_else(|rejection| {
            tracing::warn!(
                peer = %self.peer,
                method = %request.method,
                uri = %request.uri,
                status = rejection.status.code(),
                reason = rejection.reason,
                "request rejected"
            );
            RtspResponse::new(rejection.status)
        });
        response.header("CSeq", request.cseq().unwrap_or("0"))
    }

    fn options(&self) -> RtspResponse {
        let public = Method::SUPPORTED
            .iter()
            .map(Method::as_str)
            .collect::<Vec<_>>()
            .join(", ");
        RtspResponse::ok().header("Public", public)
    }

    /// A published stream that clients may see.
    fn ready_mount(&self, uri: &str) -> Result<Arc<Mount>, Rejection> {
        self.mounts
            .resolve(uri)
            .filter(|m| m.is_ready())
            .ok_or(Rejection::new(Status::NotFound, "no published stream at this path"))
    }

    /// Session named by the request's `Session` header, refreshed.
    fn session(&self, request: &RtspRequest) -> Result<Arc<Session>, Rejection> {
        let id = request
            .session_id()
            .ok_or(Rejection::new(Status::SessionNotFound, "missing Session header"))?;
        let session = self
            .sessions
            .get(id)
            .ok_or(Rejection::new(Status::SessionNotFound, "unknown session"))?;
        session.touch();
        Ok(session)
    }

    /// Host for the SDP origin and connection lines.
    fn advertised_host(&self, uri: &str) -> String {
        if let Some(host) = &self.config.public_host {
            return host.clone();
        }
        let authority = uri
            .split_once("://")
            .and_then(|(_, rest)| rest.split('/').next())
            .map(|a| a.rsplit_once('@').map_or(a, |(_, host)| host))
            .unwrap_or_default();
        let host = match authority.rsplit_once(':') {
            Some((host, port)) if port.chars().all(|c| c.is_ascii_digit()) => host,
            _ => authority,
        };
        if host.is_empty() {
            self.peer.ip().to_string()
        } else {
            host.to_string()
        }
    }

    fn describe(&self, request: &RtspRequest) -> Outcome {
        let mount = self.ready_mount(&request.uri)?;
        let body = sdp::generate_sdp(&mount, &self.advertised_host(&request.uri), &self.config);
        tracing::debug!(peer = %self.peer, mount = %mount.path(), "stream described");

        Ok(RtspResponse::ok()
            .header("Content-Type", "application/sdp")
            .header("Content-Base", request.uri.as_str())
            .body(body))
    }

    fn setup(&mut self, request: &RtspRequest) -> Outcome {
        let mount = self.ready_mount(&request.uri)?;
        let header = request
            .header("Transport")
            .ok_or(Rejection::new(Status::BadRequest, "missing Transport header"))?;
        let ports = ClientPorts::parse(header).map_err(|e| match e {
            TransportError::Interleaved => Rejection::new(
                Status::UnsupportedTransport,
                "interleaved TCP transport requested",
            ),
            TransportError::NoClientPort => {
                Rejection::new(Status::BadRequest, "Transport header has no client_port")
            }
        })?;

        let transport = Transport::new(self.peer.ip(), ports, self.sessions.allocate_server_ports());
        let session = self.sessions.create(&request.uri, mount.path(), transport);
        mount.subscribe(&session.id);
        self.owned.push(session.id.clone());

        tracing::info!(
            session_id = %session.id,
            mount = %mount.path(),
            client_rtp = %transport.client_rtp,
            "session set up"
        );

        Ok(RtspResponse::ok()
            .header("Transport", transport.to_string())
            .header("Session", session.header_value()))
    }

    fn play(&self, request: &RtspRequest) -> Outcome {
        let session = self.session(request)?;
        session.set_state(SessionState::Playing);
        tracing::info!(session_id = %session.id, "session playing");

        let mut response = RtspResponse::ok()
            .header("Session", session.header_value())
            .header("Range", "npt=0.000-");
        if let Some(mount) = self.mounts.get(&session.mount_path) {
            let next = mount.rtp_position();
            response = response.header(
                "RTP-Info",
                format!("url={};seq={};rtptime={}", session.uri, next.sequence, next.timestamp),
            );
        }
        Ok(response)
    }

    fn pause(&self, request: &RtspRequest) -> Outcome {
        let session = self.session(request)?;
        session.set_state(SessionState::Paused);
        tracing::info!(session_id = %session.id, "session paused");
        Ok(RtspResponse::ok().header("Session", session.header_value()))
    }

    fn teardown(&mut self, request: &RtspRequest) -> Outcome {
        let id = request
            .session_id()
            .ok_or(Rejection::new(Status::SessionNotFound, "missing Session header"))?;
        let session = self
            .sessions
            .remove(id)
            .ok_or(Rejection::new(Status::SessionNotFound, "unknown session"))?;
        self.mounts.unsubscribe_all(&session.id);
        self.owned.retain(|owned| *owned != session.id);
        tracing::info!(session_id = %session.id, "session torn down");
        Ok(RtspResponse::ok())
    }

    /// Keepalive (§10.8). Answered even without a session.
    fn get_parameter(&self, request: &RtspRequest) -> RtspResponse {
        match self.session(request) {
            Ok(session) => RtspResponse::ok().header("Session", session.header_value()),
            Err(_) => RtspResponse::ok(),
        }
    }
}
