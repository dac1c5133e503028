// Diarization API metrics for monitoring and observability
//
// Backends: "prometheus" (text exposition served on /metrics) and "none"/"disabled".

use log::{debug, warn};
use std::sync::Arc;

pub mod error;
#[allow(clippy::module_inception)]
pub mod metrics;
pub mod null;
pub mod prometheus;


pub use error::MetricsError;
pub use metrics::{Metrics, MetricsExporter};
pub use null::NullExporter;
pub use prometheus::PrometheusExporter;

/// Create the exporter named by the metrics backend setting
pub fn create_metrics_exporter(backend: &str) -> Arc<dyn MetricsExporter> {
    match backend.to_lowercase().as_str() {
        "prometheus" => {
            debug!("Initializing Prometheus metrics exporter");
            create_prometheus_exporter()
        }
        "none" | "null" | "disabled" => {
            debug!("Metrics disabled, using null exporter");
            create_null_exporter()
        }
        other => {
            warn!("Unknown metrics backend '{}', using null exporter", other);
            create_null_exporter()
        }
    }
}

pub fn create_prometheus_exporter() -> Arc<dyn MetricsExporter> {
    Arc::new(PrometheusExporter::new())
}

pub fn create_null_exporter() -> Arc<dyn MetricsExporter> {
    Arc::new(NullExporter)
}
