use std::fmt;

use crate::error::{ParseError, Result};

/// RTSP request methods (RFC 2326 §10).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Method {
    Options,
    Describe,
    Setup,
    Play,
    Pause,
    Teardown,
    GetParameter,
    /// Anything else; answered with 501.
    Other(String),
}

impl Method {
    /// Methods advertised in the `Public` header of an OPTIONS response.
    pub const SUPPORTED: [Method; 7] = [
        Method::Options,
        Method::Describe,
        Method::Setup,
        Method::Play,
        Method::Pause,
        Method::Teardown,
        Method::GetParameter,
    ];

    fn from_token(token: &str) -> Self {
        match token {
            "OPTIONS" => Self::Options,
            "DESCRIBE" => Self::Describe,
            "SETUP" => Self::Setup,
            "PLAY" => Self::Play,
            "PAUSE" => Self::Pause,
            "TEARDOWN" => Self::Teardown,
            "GET_PARAMETER" => Self::GetParameter,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Options => "OPTIONS",
            Self::Describe => "DESCRIBE",
            Self::Setup => "SETUP",
            Self::Play => "PLAY",
            Self::Pause => "PAUSE",
            Self::Teardown => "TEARDOWN",
            Self::GetParameter => "GET_PARAMETER",
            Self::Other(token) => token,
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A parsed RTSP request (RFC 2326 §6).
///
/// ```text
/// Method SP Request-URI SP RTSP-Version CRLF
/// *(Header: Value CRLF)
/// CRLF
/// [body]
/// ```
///
/// Header names compare case-insensitively (§4.2).
#[derive(Debug)]
pub struct RtspRequest {
    pub method: Method,
    pub uri: String,
    pub version: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
}

impl RtspRequest {
    /// Parse a request head, optionally followed by its body.
    pub fn parse(raw: &str) -> Result<Self> {
        let (head, body) = raw
            .split_once("\r\n\r\n")
            .or_else(|| raw.split_once("\n\n"))
            .unwrap_or((raw, ""));
        let mut lines = head.lines();

        let request_line = lines.next().ok_or(ParseError::EmptyRequest)?;
        let mut tokens = request_line.split_whitespace();
        let (Some(method), Some(uri), Some(version), None) =
            (tokens.next(), tokens.next(), tokens.next(), tokens.next())
        else {
            return Err(ParseError::RequestLine(request_line.to_string()).into());
        };
        if version != "RTSP/1.0" {
            tracing::debug!(version, "request with unexpected protocol version");
        }

        let headers = lines
            .take_while(|line| !line.is_empty())
            .map(|line| {
                line.split_once(':')
                    .map(|(name, value)| (name.trim().to_string(), value.trim().to_string()))
                    .ok_or_else(|| ParseError::Header(line.to_string()).into())
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            method: Method::from_token(method),
            uri: uri.to_string(),
            version: version.to_string(),
            headers,
            body: (!body.is_empty()).then(|| body.to_string()),
        })
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Sequence number the response has to echo (§12.17).
    pub fn cseq(&self) -> Option<&str> {
        self.header("CSeq")
    }

    /// Session id without the `;timeout=` parameter (§12.37).
    pub fn session_id(&self) -> Option<&str> {
        self.header("Session")
            .and_then(|value| value.split(';').next())
            .map(str::trim)
            .filter(|id| !id.is_empty())
    }

    /// Declared body length, 0 when absent or unparsable.
    pub fn content_length(&self) -> usize {
        self.header("Content-Length")
            .and_then(|v| v.parse().ok())
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RtspError;

    #[test]
    fn options_request() {
        let req =
            RtspRequest::parse("OPTIONS rtsp://localhost:8554/live/live RTSP/1.0\r\nCSeq: 1\r\n\r\n")
                .unwrap();
        assert_eq!(req.method, Method::Options);
        assert_eq!(req.uri, "rtsp://localhost:8554/live/live");
        assert_eq!(req.version, "RTSP/1.0");
        assert_eq!(req.cseq(), Some("1"));
        assert!(req.body.is_none());
    }

    #[test]
    fn unknown_method_is_kept() {
        let req = RtspRequest::parse("RECORD rtsp://h/live/live RTSP/1.0\r\nCSeq: 4\r\n\r\n").unwrap();
        assert_eq!(req.method, Method::Other("RECORD".to_string()));
        assert_eq!(req.method.to_string(), "RECORD");
    }

    fn parse_error(raw: &str) -> ParseError {
        match RtspRequest::parse(raw) {
            Err(RtspError::Parse(err)) => err,
            other => panic!("expected a parse error, got {other:?}"),
        }
    }

    #[test]
    fn malformed_requests() {
        assert_eq!(parse_error(""), ParseError::EmptyRequest);
        assert_eq!(
            parse_error("DESCRIBE\r\n\r\n"),
            ParseError::RequestLine("DESCRIBE".to_string())
        );
        assert!(matches!(
            parse_error("PLAY rtsp://h/x RTSP/1.0 extra\r\n\r\n"),
            ParseError::RequestLine(_)
        ));
        assert_eq!(
            parse_error("PLAY rtsp://h/x RTSP/1.0\r\nno colon here\r\n\r\n"),
            ParseError::Header("no colon here".to_string())
        );
    }

    #[test]
    fn headers_ignore_case() {
        let req = RtspRequest::parse(
            "SETUP rtsp://h/live/live/track1 RTSP/1.0\r\ncseq: 42\r\n\
             transport: RTP/AVP;unicast;client_port=8000-8001\r\n\r\n",
        )
        .unwrap();
        assert_eq!(req.cseq(), Some("42"));
        assert_eq!(
            req.header("TRANSPORT"),
            Some("RTP/AVP;unicast;client_port=8000-8001")
        );
    }

    #[test]
    fn session_id_drops_timeout() {
        let req = RtspRequest::parse(
            "PLAY rtsp://h/live/live RTSP/1.0\r\nCSeq: 5\r\nSession: 00AB12;timeout=60\r\n\r\n",
        )
        .unwrap();
        assert_eq!(req.session_id(), Some("00AB12"));

        let bare = RtspRequest::parse("PLAY rtsp://h/live/live RTSP/1.0\r\nSession: \r\n\r\n").unwrap();
        assert_eq!(bare.session_id(), None);
    }

    #[test]
    fn body_follows_blank_line() {
        let req = RtspRequest::parse(
            "GET_PARAMETER rtsp://h/live/live RTSP/1.0\r\nCSeq: 7\r\nContent-Length: 9\r\n\r\nposition\n",
        )
        .unwrap();
        assert_eq!(req.method, Method::GetParameter);
        assert_eq!(req.content_length(), 9);
        assert_eq!(req.body.as_deref(), Some("position\n"));
    }
}
