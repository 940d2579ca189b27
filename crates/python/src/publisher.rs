use pyo3::exceptions::{PyRuntimeError, PyValueError};
use pyo3::prelude::*;

use crate::types::{PyPublishState, PyViewer};
use rtsp::engine::DEFAULT_VHOST;
use rtsp::runtime::parse_level;
use rtsp::{
    PublishError, Publisher, PublisherConfig, RtspEngine, RuntimeConfig, ServerConfig, StreamKey,
    VideoTrackConfig,
};

fn to_py_err(e: PublishError) -> PyErr {
    PyRuntimeError::new_err(e.to_string())
}

/// H.264 publisher serving one stream at `rtsp://<host>:<port>/<app>/<stream>`.
#[pyclass(name = "Publisher")]
pub struct PyPublisher {
    inner: Publisher<RtspEngine>,
}

#[pymethods]
impl PyPublisher {
    #[new]
    #[pyo3(signature = (
        port = 8554,
        app = "live",
        stream = "live",
        width = 1280,
        height = 720,
        fps = 30.0,
        bitrate = 2_000_000,
        log_level = "info",
        bind_host = "0.0.0.0",
        public_host = None,
    ))]
    #[allow(clippy::too_many_arguments)]
    fn new(
        port: u16,
        app: &str,
        stream: &str,
        width: u32,
        height: u32,
        fps: f32,
        bitrate: u32,
        log_level: &str,
        bind_host: &str,
        public_host: Option<&str>,
    ) -> PyResult<Self> {
        let log_level = parse_level(log_level)
            .ok_or_else(|| PyValueError::new_err(format!("unknown log level: {log_level}")))?;

        let server_config = ServerConfig {
            public_host: public_host.map(std::string::ToString::to_string),
            ..ServerConfig::default()
        };
        let config = PublisherConfig {
            rtsp_port: port,
            stream: StreamKey::new(DEFAULT_VHOST, app, stream),
            video: VideoTrackConfig {
                width,
                height,
                fps,
                bitrate,
                ..VideoTrackConfig::default()
            },
            runtime: RuntimeConfig {
                log_level,
                ..RuntimeConfig::default()
            },
        };
        Ok(PyPublisher {
            inner: Publisher::with_config(RtspEngine::with_config(bind_host, server_config), config),
        })
    }

    /// Start the RTSP listener and (re)create the stream.
    fn start(&self) -> PyResult<()> {
        self.inner.start().map_err(to_py_err)
    }

    fn stop(&self) -> PyResult<()> {
        self.inner.stop().map_err(to_py_err)
    }

    /// Hand over SPS/PPS NAL units (without start code). The stream is
    /// offered to clients after the first call.
    #[pyo3(signature = (sps = None, pps = None))]
    fn configure(&self, sps: Option<&[u8]>, pps: Option<&[u8]>) -> PyResult<()> {
        self.inner
            .configure(sps.unwrap_or_default(), pps.unwrap_or_default())
            .map_err(to_py_err)
    }

    /// Send one NAL unit (without start code) with its presentation time
    /// in microseconds.
    #[pyo3(signature = (data, pts_us, is_key = false))]
    fn submit_frame(&self, data: &[u8], pts_us: i64, is_key: bool) -> PyResult<()> {
        self.inner
            .submit_frame(data, pts_us, is_key)
            .map_err(to_py_err)
    }

    /// Send a start-code delimited buffer as produced by an encoder.
    /// Returns how many NAL units were forwarded as frames.
    fn submit_annex_b(&self, data: &[u8], pts_us: i64) -> PyResult<usize> {
        self.inner.submit_annex_b(data, pts_us).map_err(to_py_err)
    }

    /// Accepted and dropped; audio is not published.
    fn submit_audio(&self, data: &[u8], pts_us: i64) -> PyResult<()> {
        self.inner.submit_audio(data, pts_us).map_err(to_py_err)
    }

    /// `None` while the stream is not running.
    fn state(&self) -> Option<PyPublishState> {
        self.inner.state().map(PyPublishState::from)
    }

    fn viewers(&self) -> Vec<PyViewer> {
        self.inner
            .engine()
            .viewers()
            .into_iter()
            .map(PyViewer::from)
            .collect()
    }

    fn __repr__(&self) -> String {
        let config = self.inner.config();
        format!(
            "Publisher(port={}, path='{}')",
            config.rtsp_port,
            config.stream.mount_path()
        )
    }
}
