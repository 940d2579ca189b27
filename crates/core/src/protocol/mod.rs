//! RTSP signaling (RFC 2326) for published streams.
//!
//! Requests are parsed into [`RtspRequest`], answered by a per-connection
//! [`RequestHandler`] and written back as [`RtspResponse`]. DESCRIBE carries
//! an SDP built by [`sdp`]. A stream is invisible to DESCRIBE and SETUP until
//! its publisher has finalized the track set.
//!
//! | Method | RFC 2326 | Behaviour |
//! |--------|----------|-----------|
//! | OPTIONS | §10.1 | lists the methods below |
//! | DESCRIBE | §10.2 | SDP of a ready stream, else 404 |
//! | SETUP | §10.4 | RTP/AVP over UDP only, interleaved gets 461 |
//! | PLAY | §10.5 | starts delivery, reports `RTP-Info` |
//! | PAUSE | §10.6 | suspends delivery |
//! | TEARDOWN | §10.7 | ends the session |
//! | GET_PARAMETER | §10.8 | keepalive |

pub mod handler;
pub mod request;
pub mod response;
pub mod sdp;

pub use handler::RequestHandler;
pub use request::{Method, RtspRequest};
pub use response::{RtspResponse, Status};
