//! Publish raw H.264 NAL units as a live RTSP stream.
//!
//! A [`Publisher`] takes parameter sets and coded pictures from an encoder,
//! frames them as Annex-B and forwards them to a [`MediaEngine`]. The
//! bundled [`RtspEngine`] serves them to RTSP clients over RTP/UDP.
//!
//! ```no_run
//! use rtsp::{Publisher, RtspEngine};
//!
//! # fn main() -> Result<(), rtsp::PublishError> {
//! let publisher = Publisher::new(RtspEngine::new());
//! publisher.start()?;
//! # let (sps, pps, idr) = (vec![0x67], vec![0x68], vec![0x65]);
//! publisher.configure(&sps, &pps)?;
//! publisher.submit_frame(&idr, 0, true)?;
//! publisher.stop()?;
//! # Ok(())
//! # }
//! ```

pub mod engine;
pub mod error;
pub mod media;
pub mod mount;
pub mod protocol;
pub mod publisher;
pub mod runtime;
pub mod server;
pub mod session;
pub mod transport;

pub use engine::{MediaEngine, MediaHandle, RtspEngine, StreamKey, VideoTrackConfig};
pub use error::{PublishError, Result, RtspError};
pub use media::{Packetizer, VideoCodec};
pub use publisher::{PublishState, Publisher, PublisherConfig};
pub use runtime::{LogSink, RuntimeConfig};
pub use server::{Server, ServerConfig, Viewer};
