//! Error types, one per layer.
//!
//! [`RtspError`] comes out of the embedded engine and its server.
//! [`PublishError`] is what callers of [`Publisher`](crate::Publisher) see;
//! engine failures reach them wrapped in [`PublishError::Engine`].

use crate::engine::StreamKey;

/// Failure inside the RTSP engine.
#[derive(Debug, thiserror::Error)]
pub enum RtspError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Media was pushed before the listener came up.
    #[error("server not started")]
    NotStarted,

    /// One engine runs one listener; asking for another port fails.
    #[error("listener already running on port {0}")]
    AlreadyRunning(u16),

    #[error("bad RTSP request: {0}")]
    Parse(#[from] ParseError),

    #[error("no media source with handle {0}")]
    MediaNotFound(u64),

    #[error("stream {0} already has a media source")]
    MediaExists(String),

    #[error("{0}: no video track yet")]
    TrackNotInitialized(String),
}

/// Why an RTSP request head was rejected (RFC 2326 §6).
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("empty request")]
    EmptyRequest,
    /// The first line is not `Method Request-URI RTSP-Version`.
    #[error("malformed request line {0:?}")]
    RequestLine(String),
    #[error("header line without ':' {0:?}")]
    Header(String),
}

pub type Result<T> = std::result::Result<T, RtspError>;

/// Why a [`Publisher`](crate::Publisher) call did not go through.
#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    /// `start` has not been called for the stream, or it was stopped.
    #[error("stream {0} is not started")]
    NotStarted(StreamKey),

    #[error("invalid input: {0}")]
    InvalidInput(&'static str),

    #[error(transparent)]
    Engine(#[from] RtspError),
}
