//! Prometheus metrics exporter
//!
//! Metric families are created lazily on first use and registered in a private registry;
//! `export` renders the registry in the Prometheus text exposition format.

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use log::debug;
use prometheus::{
    CounterVec, Encoder, GaugeVec, HistogramOpts, HistogramVec, Opts, Registry, TextEncoder,
};
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::metrics::error::{validation, MetricsError};
use crate::metrics::metrics::MetricsExporter;

const DEFAULT_NAMESPACE: &str = "diarization";
const DEFAULT_MAX_METRICS: usize = 256;

/// Prometheus implementation of MetricsExporter
pub struct PrometheusExporter {
    registry: Registry,
    counters: DashMap<String, CounterVec>,
    gauges: DashMap<String, GaugeVec>,
    histograms: DashMap<String, HistogramVec>,
    namespace: String,
    /// Upper bound on distinct metric families
    max_metrics: usize,
    metric_count: AtomicUsize,
}

impl Default for PrometheusExporter {
    fn default() -> Self {
        Self::new()
    }
}

impl PrometheusExporter {
    pub fn new() -> Self {
        Self {
            registry: Registry::new(),
            counters: DashMap::new(),
            gauges: DashMap::new(),
            histograms: DashMap::new(),
            namespace: DEFAULT_NAMESPACE.to_string(),
            max_metrics: DEFAULT_MAX_METRICS,
            metric_count: AtomicUsize::new(0),
        }
    }

    /// Exporter with a custom namespace prefix
    pub fn with_namespace(namespace: &str) -> Result<Self, MetricsError> {
        validation::validate_metric_name(namespace)?;
        Ok(Self {
            namespace: namespace.to_string(),
            ..Self::new()
        })
    }

    pub fn metric_count(&self) -> usize {
        self.metric_count.load(Ordering::SeqCst)
    }

    fn full_name(&self, name: &str) -> String {
        format!("{}_{}", self.namespace, name)
    }

    /// "jobs_submitted_total" -> "Jobs submitted total"
    fn help_text(name: &str) -> String {
        let text = name.replace('_', " ");
        let mut chars = text.chars();
        match chars.next() {
            Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
            None => String::new(),
        }
    }

    fn reserve_slot(&self) -> Result<(), MetricsError> {
        let mut current = self.metric_count.load(Ordering::Relaxed);
        loop {
            if current >= self.max_metrics {
                return Err(MetricsError::resource_limit_exceeded(format!(
                    "Maximum number of metrics ({}) exceeded",
                    self.max_metrics
                )));
            }
            match self.metric_count.compare_exchange_weak(
                current,
                current + 1,
                Ordering::SeqCst,
                Ordering::Relaxed,
            ) {
                Ok(_) => return Ok(()),
                Err(actual) => current = actual,
            }
        }
    }

    fn release_slot(&self) {
        self.metric_count.fetch_sub(1, Ordering::SeqCst);
    }

    /// Buckets in seconds for durations, small counts otherwise
    fn buckets_for(name: &str) -> Vec<f64> {
        if name.contains("seconds") {
            vec![0.05, 0.1, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0, 600.0]
        } else {
            vec![1.0, 2.0, 3.0, 5.0, 10.0]
        }
    }

    fn check_type_conflict(&self, full_name: &str, kind: &str) -> Result<(), MetricsError> {
        let existing = [
            (self.counters.contains_key(full_name), "counter"),
            (self.gauges.contains_key(full_name), "gauge"),
            (self.histograms.contains_key(full_name), "histogram"),
        ];
        for (exists, existing_kind) in existing {
            if exists && existing_kind != kind {
                return Err(MetricsError::registration_failed(
                    full_name,
                    format!("already registered as {}, not {}", existing_kind, kind),
                ));
            }
        }
        Ok(())
    }

    /// Label names sorted so label order at the call site does not matter
    fn split_labels<'a>(labels: &[(&'a str, &'a str)]) -> (Vec<&'a str>, Vec<&'a str>) {
        let mut sorted = labels.to_vec();
        sorted.sort_by(|a, b| a.0.cmp(b.0));
        sorted.into_iter().unzip()
    }

    fn register<C>(&self, name: &str, collector: C) -> Result<C, MetricsError>
    where
        C: prometheus::core::Collector + Clone + 'static,
    {
        self.registry
            .register(Box::new(collector.clone()))
            .map_err(|e| {
                self.release_slot();
                MetricsError::registration_failed(name, e.to_string())
            })?;
        Ok(collector)
    }

    fn counter(&self, name: &str, label_names: &[&str]) -> Result<CounterVec, MetricsError> {
        let full_name = self.full_name(name);
        self.check_type_conflict(&full_name, "counter")?;

        match self.counters.entry(full_name.clone()) {
            Entry::Occupied(e) => Ok(e.get().clone()),
            Entry::Vacant(e) => {
                self.reserve_slot()?;
                let counter = CounterVec::new(Opts::new(&full_name, Self::help_text(name)), label_names)
                    .map_err(|err| {
                        self.release_slot();
                        MetricsError::registration_failed(name, err.to_string())
                    })?;
                let counter = self.register(name, counter)?;
                Ok(e.insert(counter).clone())
            }
        }
    }

    fn gauge(&self, name: &str, label_names: &[&str]) -> Result<GaugeVec, MetricsError> {
        let full_name = self.full_name(name);
        self.check_type_conflict(&full_name, "gauge")?;

        match self.gauges.entry(full_name.clone()) {
            Entry::Occupied(e) => Ok(e.get().clone()),
            Entry::Vacant(e) => {
                self.reserve_slot()?;
                let gauge = GaugeVec::new(Opts::new(&full_name, Self::help_text(name)), label_names)
                    .map_err(|err| {
                        self.release_slot();
                        MetricsError::registration_failed(name, err.to_string())
                    })?;
                let gauge = self.register(name, gauge)?;
                Ok(e.insert(gauge).clone())
            }
        }
    }

    fn histogram(&self, name: &str, label_names: &[&str]) -> Result<HistogramVec, MetricsError> {
        let full_name = self.full_name(name);
        self.check_type_conflict(&full_name, "histogram")?;

        match self.histograms.entry(full_name.clone()) {
            Entry::Occupied(e) => Ok(e.get().clone()),
            Entry::Vacant(e) => {
                self.reserve_slot()?;
                let opts = HistogramOpts::new(&full_name, Self::help_text(name))
                    .buckets(Self::buckets_for(name));
                let histogram = HistogramVec::new(opts, label_names).map_err(|err| {
                    self.release_slot();
                    MetricsError::registration_failed(name, err.to_string())
                })?;
                let histogram = self.register(name, histogram)?;
                Ok(e.insert(histogram).clone())
            }
        }
    }

    fn validate(name: &str, labels: &[(&str, &str)]) -> Result<(), MetricsError> {
        validation::validate_metric_name(name)?;
        validation::validate_labels(labels)
    }
}

#[async_trait]
impl MetricsExporter for PrometheusExporter {
    async fn increment(&self, name: &str, labels: &[(&str, &str)]) -> Result<(), MetricsError> {
        Self::validate(name, labels)?;
        let (names, values) = Self::split_labels(labels);
        self.counter(name, &names)?.with_label_values(&values).inc();
        debug!("Incremented counter {} with labels {:?}", name, labels);
        Ok(())
    }

    async fn set_gauge(
        &self,
        name: &str,
        value: f64,
        labels: &[(&str, &str)],
    ) -> Result<(), MetricsError> {
        Self::validate(name, labels)?;
        validation::validate_numeric_value(value)?;
        let (names, values) = Self::split_labels(labels);
        self.gauge(name, &names)?.with_label_values(&values).set(value);
        Ok(())
    }

    async fn observe_histogram(
        &self,
        name: &str,
        value: f64,
        labels: &[(&str, &str)],
    ) -> Result<(), MetricsError> {
        Self::validate(name, labels)?;
        validation::validate_numeric_value(value)?;
        let (names, values) = Self::split_labels(labels);
        self.histogram(name, &names)?
            .with_label_values(&values)
            .observe(value);
        Ok(())
    }

    async fn export(&self) -> Result<Vec<u8>, MetricsError> {
        let mut buffer = Vec::new();
        TextEncoder::new()
            .encode(&self.registry.gather(), &mut buffer)
            .map_err(|e| MetricsError::export_failed(format!("Failed to encode metrics: {}", e)))?;
        Ok(buffer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_metrics_are_namespaced_in_export() {
        let exporter = PrometheusExporter::new();
        exporter
            .increment("jobs_submitted_total", &[])
            .await
            .expect("increment");
        exporter
            .set_gauge("queue_size", 3.0, &[])
            .await
            .expect("gauge");

        let text = String::from_utf8(exporter.export().await.expect("export")).expect("utf8");
        assert!(text.contains("diarization_jobs_submitted_total 1"));
        assert!(text.contains("diarization_queue_size 3"));
        assert_eq!(exporter.metric_count(), 2);
    }

    #[tokio::test]
    async fn test_label_order_does_not_matter() {
        let exporter = PrometheusExporter::new();
        exporter
            .increment("callbacks_total", &[("outcome", "delivered"), ("attempts", "1")])
            .await
            .expect("first order");
        exporter
            .increment("callbacks_total", &[("attempts", "1"), ("outcome", "delivered")])
            .await
            .expect("second order");

        let text = String::from_utf8(exporter.export().await.expect("export")).expect("utf8");
        assert!(text.contains(r#"diarization_callbacks_total{attempts="1",outcome="delivered"} 2"#));
        assert_eq!(exporter.metric_count(), 1);
    }

    #[tokio::test]
    async fn test_type_conflict_is_rejected() {
        let exporter = PrometheusExporter::new();
        exporter.increment("jobs", &[]).await.expect("counter");
        assert!(matches!(
            exporter.set_gauge("jobs", 1.0, &[]).await,
            Err(MetricsError::RegistrationFailed { .. })
        ));
    }

    #[tokio::test]
    async fn test_invalid_inputs_are_rejected() {
        let exporter = PrometheusExporter::new();
        assert!(matches!(
            exporter.increment("", &[]).await,
            Err(MetricsError::InvalidName { .. })
        ));
        assert!(matches!(
            exporter.set_gauge("queue_size", f64::INFINITY, &[]).await,
            Err(MetricsError::InvalidValue { .. })
        ));
        assert!(matches!(
            exporter.increment("jobs_total", &[("", "x")]).await,
            Err(MetricsError::InvalidLabel { .. })
        ));
    }

    #[test]
    fn test_invalid_namespace_is_rejected() {
        assert!(PrometheusExporter::with_namespace("bad-namespace").is_err());
        assert!(PrometheusExporter::with_namespace("salon").is_ok());
    }
}
