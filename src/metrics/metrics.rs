//! Metrics exporter trait and application facade
//!
//! Backends implement [`MetricsExporter`]; the rest of the crate talks to the cloneable
//! [`Metrics`] facade. The facade's domain methods (`record_*`) never fail: metric errors
//! are logged and dropped so they cannot affect job processing or HTTP responses. The raw
//! `increment` / `set_gauge` / `observe_histogram` calls return the backend error.
//!
//! Exported series (prefixed by the backend namespace):
//!
//! | name | type | labels |
//! |------|------|--------|
//! | `jobs_submitted_total` | counter | |
//! | `queue_size` | gauge | |
//! | `jobs_processing` | gauge | |
//! | `jobs_finished_total` | counter | `status` |
//! | `job_duration_seconds` | histogram | `status` |
//! | `callbacks_total` | counter | `outcome` |
//! | `callback_attempts` | histogram | `outcome` |
//! | `http_requests_total` | counter | `endpoint`, `method`, `status` |
//! | `http_request_duration_seconds` | histogram | `endpoint`, `method`, `status` |
//! | `auth_attempts_total` | counter | `status` |

use async_trait::async_trait;
use log::warn;
use std::sync::Arc;

use crate::metrics::error::{validation, MetricsError};

/// Metrics exporter trait for pluggable monitoring systems
#[async_trait]
pub trait MetricsExporter: Send + Sync {
    /// Increment a counter by one
    async fn increment(&self, name: &str, labels: &[(&str, &str)]) -> Result<(), MetricsError>;

    /// Set a gauge to a point-in-time value
    async fn set_gauge(
        &self,
        name: &str,
        value: f64,
        labels: &[(&str, &str)],
    ) -> Result<(), MetricsError>;

    /// Record one observation in a histogram
    async fn observe_histogram(
        &self,
        name: &str,
        value: f64,
        labels: &[(&str, &str)],
    ) -> Result<(), MetricsError>;

    /// Render all metrics in the backend's wire format
    async fn export(&self) -> Result<Vec<u8>, MetricsError>;
}

/// Metrics facade for the application
#[derive(Clone)]
pub struct Metrics {
    exporter: Arc<dyn MetricsExporter>,
}

impl Metrics {
    pub fn new(exporter: Arc<dyn MetricsExporter>) -> Self {
        Self { exporter }
    }

    pub async fn increment(&self, name: &str, labels: &[(&str, &str)]) -> Result<(), MetricsError> {
        self.exporter.increment(name, labels).await
    }

    pub async fn set_gauge(
        &self,
        name: &str,
        value: f64,
        labels: &[(&str, &str)],
    ) -> Result<(), MetricsError> {
        self.exporter.set_gauge(name, value, labels).await
    }

    pub async fn observe_histogram(
        &self,
        name: &str,
        value: f64,
        labels: &[(&str, &str)],
    ) -> Result<(), MetricsError> {
        self.exporter.observe_histogram(name, value, labels).await
    }

    pub async fn export(&self) -> Result<Vec<u8>, MetricsError> {
        self.exporter.export().await
    }

    // Domain methods

    /// Record an HTTP request and its duration in seconds
    pub async fn record_http_request(
        &self,
        endpoint: &str,
        method: &str,
        status: &str,
        duration: f64,
    ) {
        let labels = [("endpoint", endpoint), ("method", method), ("status", status)];
        self.observe_quietly("http_request_duration_seconds", duration, &labels)
            .await;
        self.increment_quietly("http_requests_total", &labels).await;
    }

    pub async fn record_job_submitted(&self) {
        self.increment_quietly("jobs_submitted_total", &[]).await;
    }

    /// Record a job reaching a terminal status after `duration` seconds of processing
    pub async fn record_job_finished(&self, status: &str, duration: f64) {
        let labels = [("status", status)];
        self.observe_quietly("job_duration_seconds", duration, &labels)
            .await;
        self.increment_quietly("jobs_finished_total", &labels).await;
    }

    pub async fn record_queue_size(&self, size: usize) {
        self.set_count_quietly("queue_size", size).await;
    }

    pub async fn record_jobs_processing(&self, count: usize) {
        self.set_count_quietly("jobs_processing", count).await;
    }

    /// Record the outcome of a callback attempt-sequence
    pub async fn record_callback(&self, outcome: &str, attempts: u32) {
        let labels = [("outcome", outcome)];
        self.observe_quietly("callback_attempts", f64::from(attempts), &labels)
            .await;
        self.increment_quietly("callbacks_total", &labels).await;
    }

    pub async fn record_auth_attempt(&self, status: &str) {
        self.increment_quietly("auth_attempts_total", &[("status", status)])
            .await;
    }

    async fn set_count_quietly(&self, name: &str, count: usize) {
        match validation::validate_usize_conversion(count) {
            Ok(value) => {
                if let Err(e) = self.set_gauge(name, value, &[]).await {
                    warn!("Failed to set gauge '{}': {}", name, e);
                }
            }
            Err(e) => warn!("Failed to record {} {}: {}", name, count, e),
        }
    }

    async fn increment_quietly(&self, name: &str, labels: &[(&str, &str)]) {
        if let Err(e) = self.increment(name, labels).await {
            warn!("Failed to increment metric '{}': {}", name, e);
        }
    }

    async fn observe_quietly(&self, name: &str, value: f64, labels: &[(&str, &str)]) {
        if let Err(e) = self.observe_histogram(name, value, labels).await {
            warn!("Failed to observe histogram '{}': {}", name, e);
        }
    }
}
