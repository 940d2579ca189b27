use std::fmt;

/// Server identification sent with every response (RFC 2326 §12.36).
pub const SERVER_AGENT: &str = concat!("rtsp-publish/", env!("CARGO_PKG_VERSION"));

/// Status codes the publisher answers with (RFC 2326 §7.1.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Ok,
    BadRequest,
    NotFound,
    /// Unknown or missing `Session` header (§11.3.10).
    SessionNotFound,
    /// No acceptable `Transport` option, e.g. interleaved TCP (§11.3.14).
    UnsupportedTransport,
    NotImplemented,
}

impl Status {
    pub fn code(self) -> u16 {
        match self {
            Self::Ok => 200,
            Self::BadRequest => 400,
            Self::NotFound => 404,
            Self::SessionNotFound => 454,
            Self::UnsupportedTransport => 461,
            Self::NotImplemented => 501,
        }
    }

    pub fn reason(self) -> &'static str {
        match self {
            Self::Ok => "OK",
            Self::BadRequest => "Bad Request",
            Self::NotFound => "Not Found",
            Self::SessionNotFound => "Session Not Found",
            Self::UnsupportedTransport => "Unsupported Transport",
            Self::NotImplemented => "Not Implemented",
        }
    }
}

/// An RTSP response (RFC 2326 §7), written out through [`Display`](fmt::Display).
///
/// `Server` is always the first header. `Content-Length` is derived from
/// the body when there is one.
#[must_use]
#[derive(Debug)]
pub struct RtspResponse {
    pub status: Status,
    headers: Vec<(&'static str, String)>,
    pub body: Option<String>,
}

impl RtspResponse {
    pub fn new(status: Status) -> Self {
        Self {
            status,
            headers: vec![("Server", SERVER_AGENT.to_string())],
            body: None,
        }
    }

    pub fn ok() -> Self {
        Self::new(Status::Ok)
    }

    pub fn header(mut self, name: &'static str, value: impl Into<String>) -> Self {
        self.headers.push((name, value.into()));
        self
    }

    pub fn body(mut self, body: String) -> Self {
        self.body = Some(body);
        self
    }

    pub fn status_code(&self) -> u16 {
        self.status.code()
    }

    pub fn get_header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

impl fmt::Display for RtspResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RTSP/1.0 {} {}\r\n", self.status.code(), self.status.reason())?;
        for (name, value) in &self.headers {
            write!(f, "{name}: {value}\r\n")?;
        }
        match &self.body {
            Some(body) => write!(f, "Content-Length: {}\r\n\r\n{body}", body.len()),
            None => f.write_str("\r\n"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn headers_only() {
        let text = RtspResponse::ok()
            .header("CSeq", "1")
            .header("Public", "OPTIONS")
            .to_string();
        assert_eq!(
            text,
            format!("RTSP/1.0 200 OK\r\nServer: {SERVER_AGENT}\r\nCSeq: 1\r\nPublic: OPTIONS\r\n\r\n")
        );
    }

    #[test]
    fn body_gets_content_length() {
        let text = RtspResponse::ok()
            .header("CSeq", "2")
            .body("v=0\r\n".to_string())
            .to_string();
        assert!(text.contains("Content-Length: 5\r\n\r\nv=0\r\n"));
        assert!(text.ends_with("v=0\r\n"));
    }

    #[test]
    fn status_lines() {
        let cases = [
            (Status::NotFound, "RTSP/1.0 404 Not Found\r\n"),
            (Status::SessionNotFound, "RTSP/1.0 454 Session Not Found\r\n"),
            (Status::UnsupportedTransport, "RTSP/1.0 461 Unsupported Transport\r\n"),
            (Status::NotImplemented, "RTSP/1.0 501 Not Implemented\r\n"),
        ];
        for (status, line) in cases {
            assert!(RtspResponse::new(status).to_string().starts_with(line));
        }
    }

    #[test]
    fn header_lookup_ignores_case() {
        let resp = RtspResponse::ok().header("CSeq", "9");
        assert_eq!(resp.get_header("cseq"), Some("9"));
        assert_eq!(resp.get_header("server"), Some(SERVER_AGENT));
        assert!(SERVER_AGENT.starts_with("rtsp-publish/"));
    }
}
