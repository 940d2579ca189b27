use pyo3::prelude::*;

use rtsp::{PublishState, Viewer};

fn py_bool(value: bool) -> &'static str {
    if value { "True" } else { "False" }
}

/// A client receiving the stream over RTP.
#[pyclass(name = "Viewer", frozen, get_all, skip_from_py_object)]
pub struct PyViewer {
    session_id: String,
    uri: String,
    client_addr: String,
    client_rtp_port: u16,
}

impl From<Viewer> for PyViewer {
    fn from(viewer: Viewer) -> Self {
        let Viewer {
            session_id,
            uri,
            client_addr,
            client_rtp_port,
        } = viewer;
        Self {
            session_id,
            uri,
            client_addr,
            client_rtp_port,
        }
    }
}

#[pymethods]
impl PyViewer {
    fn __repr__(&self) -> String {
        format!(
            "Viewer(session_id={:?}, uri={:?}, client={}:{})",
            self.session_id, self.uri, self.client_addr, self.client_rtp_port
        )
    }
}

/// How far a running stream has come: track declared, track set finalized.
#[pyclass(name = "PublishState", frozen, get_all, eq, skip_from_py_object)]
#[derive(PartialEq)]
pub struct PyPublishState {
    video_configured: bool,
    finalized: bool,
}

impl From<PublishState> for PyPublishState {
    fn from(state: PublishState) -> Self {
        Self {
            video_configured: state.video_configured,
            finalized: state.finalized,
        }
    }
}

#[pymethods]
impl PyPublishState {
    fn __repr__(&self) -> String {
        format!(
            "PublishState(video_configured={}, finalized={})",
            py_bool(self.video_configured),
            py_bool(self.finalized)
        )
    }
}
