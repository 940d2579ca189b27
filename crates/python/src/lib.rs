mod publisher;
mod types;

use pyo3::prelude::*;

#[pymodule]
#[pyo3(name = "rtsp_publish")]
fn rtsp_publish_module(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_class::<publisher::PyPublisher>()?;
    m.add_class::<types::PyPublishState>()?;
    m.add_class::<types::PyViewer>()?;
    Ok(())
}
