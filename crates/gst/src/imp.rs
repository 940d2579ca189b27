use std::sync::{LazyLock, Mutex};

use gst::glib;
use gst::prelude::*;
use gst::subclass::prelude::*;
use gst_base::subclass::prelude::*;

use rtsp::engine::{DEFAULT_APP, DEFAULT_STREAM, DEFAULT_VHOST};
use rtsp::runtime::LogSink;
use rtsp::{Publisher, PublisherConfig, RtspEngine, RuntimeConfig, ServerConfig, StreamKey};

static CAT: LazyLock<gst::DebugCategory> = LazyLock::new(|| {
    gst::DebugCategory::new(
        "rtsppublishsink",
        gst::DebugColorFlags::empty(),
        Some("RTSP Publish Sink"),
    )
});

const DEFAULT_ADDRESS: &str = "0.0.0.0";
const DEFAULT_PORT: u32 = 8554;

#[derive(Debug, Clone)]
struct Settings {
    address: String,
    port: u32,
    app: String,
    stream: String,
    public_host: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            address: DEFAULT_ADDRESS.into(),
            port: DEFAULT_PORT,
            app: DEFAULT_APP.into(),
            stream: DEFAULT_STREAM.into(),
            public_host: None,
        }
    }
}

impl Settings {
    /// Publisher for these settings. Logs stay in the GStreamer debug
    /// system, so the engine installs no subscriber of its own.
    fn publisher(&self) -> Result<Publisher<RtspEngine>, gst::ErrorMessage> {
        let rtsp_port = u16::try_from(self.port).map_err(|_| {
            gst::error_msg!(
                gst::ResourceError::Settings,
                ["Port {} out of range", self.port]
            )
        })?;
        let server = ServerConfig {
            public_host: self.public_host.clone(),
            ..ServerConfig::default()
        };
        let config = PublisherConfig {
            rtsp_port,
            stream: StreamKey::new(DEFAULT_VHOST, &self.app, &self.stream),
            runtime: RuntimeConfig {
                log_sink: LogSink::Disabled,
                ..RuntimeConfig::default()
            },
            ..PublisherConfig::default()
        };
        Ok(Publisher::with_config(
            RtspEngine::with_config(&self.address, server),
            config,
        ))
    }
}

#[derive(Default)]
pub struct RtspPublishSink {
    settings: Mutex<Settings>,
    publisher: Mutex<Option<Publisher<RtspEngine>>>,
}

#[glib::object_subclass]
impl ObjectSubclass for RtspPublishSink {
    const NAME: &'static str = "GstRtspPublishSink";
    type Type = super::RtspPublishSink;
    type ParentType = gst_base::BaseSink;
}

impl ObjectImpl for RtspPublishSink {
    fn properties() -> &'static [glib::ParamSpec] {
        static PROPERTIES: LazyLock<Vec<glib::ParamSpec>> = LazyLock::new(|| {
            vec![
                glib::ParamSpecString::builder("address")
                    .nick("Address")
                    .blurb("Local address the RTSP listener binds to")
                    .default_value(Some(DEFAULT_ADDRESS))
                    .mutable_ready()
                    .build(),
                glib::ParamSpecUInt::builder("port")
                    .nick("Port")
                    .blurb("TCP port of the RTSP listener")
                    .minimum(1)
                    .maximum(u16::MAX.into())
                    .default_value(DEFAULT_PORT)
                    .mutable_ready()
                    .build(),
                glib::ParamSpecString::builder("app")
                    .nick("Application")
                    .blurb("First segment of the stream path, rtsp://host:port/<app>/<stream>")
                    .default_value(Some(DEFAULT_APP))
                    .mutable_ready()
                    .build(),
                glib::ParamSpecString::builder("stream")
                    .nick("Stream")
                    .blurb("Second segment of the stream path, rtsp://host:port/<app>/<stream>")
                    .default_value(Some(DEFAULT_STREAM))
                    .mutable_ready()
                    .build(),
                glib::ParamSpecString::builder("public-host")
                    .nick("Public Host")
                    .blurb("Host advertised in the SDP (default: the host clients connected to)")
                    .mutable_ready()
                    .build(),
            ]
        });

        PROPERTIES.as_ref()
    }

    fn set_property(&self, _id: usize, value: &glib::Value, pspec: &glib::ParamSpec) {
        let mut settings = self.settings.lock().unwrap();
        match pspec.name() {
            "address" => {
                settings.address = value
                    .get::<Option<String>>()
                    .expect("type checked upstream")
                    .unwrap_or_else(|| DEFAULT_ADDRESS.into());
            }
            "port" => settings.port = value.get().expect("type checked upstream"),
            "app" => {
                settings.app = value
                    .get::<Option<String>>()
                    .expect("type checked upstream")
                    .unwrap_or_else(|| DEFAULT_APP.into());
            }
            "stream" => {
                settings.stream = value
                    .get::<Option<String>>()
                    .expect("type checked upstream")
                    .unwrap_or_else(|| DEFAULT_STREAM.into());
            }
            "public-host" => {
                settings.public_host = value
                    .get::<Option<String>>()
                    .expect("type checked upstream")
                    .filter(|host| !host.is_empty());
            }
            name => unimplemented!("Property '{name}'"),
        }
        gst::debug!(CAT, imp = self, "Set {} to {:?}", pspec.name(), value);
    }

    fn property(&self, _id: usize, pspec: &glib::ParamSpec) -> glib::Value {
        let settings = self.settings.lock().unwrap();
        match pspec.name() {
            "address" => settings.address.to_value(),
            "port" => settings.port.to_value(),
            "app" => settings.app.to_value(),
            "stream" => settings.stream.to_value(),
            "public-host" => settings.public_host.to_value(),
            name => unimplemented!("Property '{name}'"),
        }
    }
}

impl GstObjectImpl for RtspPublishSink {}

impl ElementImpl for RtspPublishSink {
    fn metadata() -> Option<&'static gst::subclass::ElementMetadata> {
        static ELEMENT_METADATA: LazyLock<gst::subclass::ElementMetadata> = LazyLock::new(|| {
            gst::subclass::ElementMetadata::new(
                "RTSP Publish Sink",
                "Sink/Network",
                "Publishes an H.264 byte-stream as a live RTSP stream",
                "rtsp-publish developers",
            )
        });

        Some(&*ELEMENT_METADATA)
    }

    fn pad_templates() -> &'static [gst::PadTemplate] {
        static PAD_TEMPLATES: LazyLock<Vec<gst::PadTemplate>> = LazyLock::new(|| {
            let caps = gst::Caps::builder("video/x-h264")
                .field("stream-format", "byte-stream")
                .field("alignment", gst::List::new(["au", "nal"]))
                .build();
            let sink_pad_template = gst::PadTemplate::new(
                "sink",
                gst::PadDirection::Sink,
                gst::PadPresence::Always,
                &caps,
            )
            .unwrap();

            vec![sink_pad_template]
        });

        PAD_TEMPLATES.as_ref()
    }
}

impl BaseSinkImpl for RtspPublishSink {
    fn start(&self) -> Result<(), gst::ErrorMessage> {
        let settings = self.settings.lock().unwrap().clone();
        let publisher = settings.publisher()?;
        publisher.start().map_err(|err| {
            gst::error_msg!(
                gst::ResourceError::OpenWrite,
                ["Failed to publish on {}:{}: {}", settings.address, settings.port, err]
            )
        })?;

        gst::info!(
            CAT,
            imp = self,
            "Publishing rtsp://{}:{}{}",
            settings.public_host.as_deref().unwrap_or(&settings.address),
            settings.port,
            publisher.config().stream.mount_path()
        );
        *self.publisher.lock().unwrap() = Some(publisher);

        Ok(())
    }

    fn stop(&self) -> Result<(), gst::ErrorMessage> {
        let Some(publisher) = self.publisher.lock().unwrap().take() else {
            return Ok(());
        };
        if let Err(err) = publisher.stop() {
            gst::warning!(CAT, imp = self, "Failed to release stream: {err}");
        }
        publisher.engine().stop_rtsp_listener();
        gst::info!(CAT, imp = self, "Stopped publishing");

        Ok(())
    }

    fn render(&self, buffer: &gst::Buffer) -> Result<gst::FlowSuccess, gst::FlowError> {
        let publisher = self.publisher.lock().unwrap();
        let Some(publisher) = publisher.as_ref() else {
            gst::element_imp_error!(self, gst::CoreError::Failed, ["Not started yet"]);
            return Err(gst::FlowError::Error);
        };

        let map = buffer.map_readable().map_err(|_| {
            gst::element_imp_error!(self, gst::CoreError::Failed, ["Failed to map buffer"]);
            gst::FlowError::Error
        })?;

        // Running without timestamps still works; the stream starts at zero.
        let pts_us = buffer
            .pts()
            .or(buffer.dts())
            .map_or(0, |ts| i64::try_from(ts.useconds()).unwrap_or(i64::MAX));

        match publisher.submit_annex_b(map.as_slice(), pts_us) {
            Ok(frames) => gst::trace!(CAT, imp = self, "Forwarded {frames} NAL units at {pts_us} us"),
            Err(err) => gst::warning!(CAT, imp = self, "Dropping buffer: {err}"),
        }

        Ok(gst::FlowSuccess::Ok)
    }
}
