//! GStreamer sink element for RTSP publishing.
//!
//! Registers `rtsppublishsink`, a `BaseSink` that takes H.264 Annex-B
//! buffers and serves them at `rtsp://<host>:<port>/<app>/<stream>`.
//! Parameter sets in the stream configure it; slices before the first
//! SPS/PPS are dropped.
//!
//! ## Usage with gst-launch
//!
//! ```text
//! gst-launch-1.0 videotestsrc ! x264enc ! rtsppublishsink port=8554 app=live stream=cam
//! ```
//!
//! ## Properties
//!
//! | Property      | Type   | Default   | Description                       |
//! |---------------|--------|-----------|-----------------------------------|
//! | `address`     | String | `0.0.0.0` | Address to bind the RTSP listener |
//! | `port`        | u32    | `8554`    | Port for the RTSP listener        |
//! | `app`         | String | `live`    | First path segment of the stream  |
//! | `stream`      | String | `live`    | Second path segment of the stream |
//! | `public-host` | String | unset     | Host advertised in the SDP        |

mod imp;

use gst::glib;
use gst::prelude::*;

glib::wrapper! {
    pub struct RtspPublishSink(ObjectSubclass<imp::RtspPublishSink>)
        @extends gst_base::BaseSink, gst::Element, gst::Object;
}

fn plugin_init(plugin: &gst::Plugin) -> Result<(), glib::BoolError> {
    gst::Element::register(
        Some(plugin),
        "rtsppublishsink",
        gst::Rank::NONE,
        RtspPublishSink::static_type(),
    )
}

gst::plugin_define!(
    rtsppublishsink,
    "Publish H.264 byte-stream buffers as a live RTSP stream",
    plugin_init,
    env!("CARGO_PKG_VERSION"),
    "MIT",
    "gst-rtsp-publish-sink",
    "rtsp-publish",
    env!("CARGO_PKG_REPOSITORY"),
    "2026-02-21"
);
