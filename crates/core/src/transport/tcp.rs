use std::io::{self, BufRead, BufReader, Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use crate::mount::MountRegistry;
use crate::protocol::{RequestHandler, RtspRequest, RtspResponse, Status};
use crate::server::ServerConfig;
use crate::session::SessionManager;

const ACCEPT_POLL: Duration = Duration::from_millis(50);
const REAP_INTERVAL: Duration = Duration::from_secs(1);

/// Everything a connection thread shares with the listener.
#[derive(Clone)]
pub struct Shared {
    pub sessions: SessionManager,
    pub mounts: MountRegistry,
    pub config: Arc<ServerConfig>,
    pub running: Arc<AtomicBool>,
}

impl Shared {
    /// Drop sessions and their mount subscriptions.
    fn release(&self, ids: &[String]) -> usize {
        for id in ids {
            self.mounts.unsubscribe_all(id);
        }
        self.sessions.remove_all(ids)
    }
}

/// Accept RTSP clients until `shared.running` drops.
///
/// The listener is non-blocking and polled so that
/// [`Server::stop`](crate::Server::stop) is noticed quickly. Each client gets
/// a thread, up to `config.max_connections`; silent sessions are reaped
/// between accepts.
pub fn accept_loop(listener: TcpListener, shared: Shared) {
    let active = Arc::new(AtomicUsize::new(0));
    let mut last_reap = Instant::now();

    while shared.running.load(Ordering::SeqCst) {
        if last_reap.elapsed() >= REAP_INTERVAL {
            last_reap = Instant::now();
            let expired: Vec<String> = shared
                .sessions
                .remove_expired(last_reap)
                .into_iter()
                .map(|s| s.id.clone())
                .collect();
            shared.release(&expired);
        }

        let (stream, peer) = match listener.accept() {
            Ok(accepted) => accepted,
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                thread::sleep(ACCEPT_POLL);
                continue;
            }
            Err(e) => {
                tracing::warn!(error = %e, "accept failed");
                continue;
            }
        };

        let limit = shared.config.max_connections;
        if active.load(Ordering::SeqCst) >= limit {
            tracing::warn!(%peer, limit, "too many RTSP connections, closing");
            continue;
        }
        if let Err(e) = stream.set_nonblocking(false) {
            tracing::warn!(%peer, error = %e, "cannot switch connection to blocking mode");
            continue;
        }

        active.fetch_add(1, Ordering::SeqCst);
        let shared = shared.clone();
        let active = active.clone();
        thread::spawn(move || {
            if let Err(e) = serve(stream, peer, &shared) {
                tracing::debug!(%peer, error = %e, "connection ended with error");
            }
            active.fetch_sub(1, Ordering::SeqCst);
        });
    }
    tracing::debug!("accept loop exited");
}

/// Request/response loop of one client.
fn serve(stream: TcpStream, peer: SocketAddr, shared: &Shared) -> io::Result<()> {
    tracing::info!(%peer, "client connected");
    let mut reader = BufReader::new(stream.try_clone()?);
    let mut writer = stream;
    let mut handler = RequestHandler::new(
        shared.sessions.clone(),
        shared.mounts.clone(),
        peer,
        shared.config.clone(),
    );

    let result = exchange(&mut reader, &mut writer, &mut handler, &shared.running);

    let released = shared.release(handler.session_ids());
    tracing::info!(%peer, released, "client disconnected");
    result
}

fn exchange(
    reader: &mut impl BufRead,
    writer: &mut impl Write,
    handler: &mut RequestHandler,
    running: &AtomicBool,
) -> io::Result<()> {
    while running.load(Ordering::SeqCst) {
        let Some(head) = read_head(reader)? else {
            return Ok(());
        };
        let response = match RtspRequest::parse(&head) {
            Ok(mut request) => {
                let len = request.content_length();
                if len > 0 {
                    let mut body = vec![0; len];
                    reader.read_exact(&mut body)?;
                    request.body = Some(String::from_utf8_lossy(&body).into_owned());
                }
                tracing::debug!(method = %request.method, uri = %request.uri, "request");
                handler.handle(&request)
            }
            Err(e) => {
                tracing::warn!(error = %e, "unparsable request");
                RtspResponse::new(Status::BadRequest)
            }
        };
        tracing::debug!(status = response.status_code(), "response");
        writer.write_all(response.to_string().as_bytes())?;
    }
    Ok(())
}

/// Lines up to the blank line ending a request head. Blank lines before a
/// request are skipped. `None` once the peer has closed.
fn read_head(reader: &mut impl BufRead) -> io::Result<Option<String>> {
    let mut head = String::new();
    loop {
        let mut line = String::new();
        if reader.read_line(&mut line)? == 0 {
            return Ok(None);
        }
        if line.trim().is_empty() {
            if !head.is_empty() {
                return Ok(Some(head));
            }
            continue;
        }
        head.push_str(&line);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    use crate::engine::VideoTrackConfig;
    use crate::media::VideoCodec;

    fn handler() -> RequestHandler {
        let mounts = MountRegistry::new();
        mounts
            .add("/live/live", VideoCodec::H264.packetizer(96), VideoTrackConfig::default())
            .set_ready();
        RequestHandler::new(
            SessionManager::new(),
            mounts,
            "127.0.0.1:40000".parse().unwrap(),
            Arc::new(ServerConfig::default()),
        )
    }

    #[test]
    fn heads_are_split_on_blank_lines() {
        let mut input = Cursor::new(
            "\r\nOPTIONS * RTSP/1.0\r\nCSeq: 1\r\n\r\nOPTIONS * RTSP/1.0\r\nCSeq: 2\r\n\r\nPARTIAL",
        );
        assert_eq!(
            read_head(&mut input).unwrap().as_deref(),
            Some("OPTIONS * RTSP/1.0\r\nCSeq: 1\r\n")
        );
        assert!(read_head(&mut input).unwrap().unwrap().ends_with("CSeq: 2\r\n"));
        assert_eq!(read_head(&mut input).unwrap(), None);
    }

    #[test]
    fn exchange_answers_each_request_and_consumes_bodies() {
        let mut input = Cursor::new(
            "GET_PARAMETER rtsp://h/live/live RTSP/1.0\r\nCSeq: 1\r\nContent-Length: 9\r\n\r\n\
             position\n\
             DESCRIBE rtsp://h/live/live RTSP/1.0\r\nCSeq: 2\r\n\r\n\
             garbage\r\n\r\n",
        );
        let mut output = Vec::new();
        let running = AtomicBool::new(true);
        exchange(&mut input, &mut output, &mut handler(), &running).unwrap();

        let text = String::from_utf8(output).unwrap();
        let statuses: Vec<&str> = text
            .lines()
            .filter(|line| line.starts_with("RTSP/1.0"))
            .collect();
        assert_eq!(
            statuses,
            ["RTSP/1.0 200 OK", "RTSP/1.0 200 OK", "RTSP/1.0 400 Bad Request"]
        );
        assert!(text.contains("CSeq: 2\r\n"));
    }

    #[test]
    fn stopped_server_reads_nothing() {
        let mut input = Cursor::new("OPTIONS * RTSP/1.0\r\nCSeq: 1\r\n\r\n");
        let mut output = Vec::new();
        let running = AtomicBool::new(false);
        exchange(&mut input, &mut output, &mut handler(), &running).unwrap();
        assert!(output.is_empty());
    }
}
