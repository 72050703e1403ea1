use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;

static HANDLE: OnceCell<PrometheusHandle> = OnceCell::new();

/// Install the process-wide Prometheus recorder.
///
/// Safe to call more than once; later calls return the handle of the first
/// installation, which keeps test binaries that build several routers working.
pub fn init_metrics() -> PrometheusHandle {
    HANDLE
        .get_or_init(|| match PrometheusBuilder::new().install_recorder() {
            Ok(handle) => handle,
            Err(e) => {
                tracing::warn!(error = %e, "Prometheus recorder already installed, using a detached one");
                PrometheusBuilder::new().build_recorder().handle()
            }
        })
        .clone()
}
