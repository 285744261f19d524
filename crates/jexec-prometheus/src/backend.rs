use std::sync::Arc;

use prometheus::{
    CounterVec, Encoder, HistogramOpts, HistogramVec, Opts, Registry, TextEncoder,
    proto::MetricFamily,
};

use jexec_core::{JobOutcome, MetricsBackend};

const NAMESPACE: &str = "jexec";

/// Prometheus metrics backend.
///
/// Label values are bounded: `backend` is the backend name, `outcome` one of
/// `success|failure|canceled|timeout`, `error_kind` one of `connect|create|logs`.
#[derive(Clone)]
pub struct PrometheusMetrics {
    jobs_started: CounterVec,
    jobs_completed: CounterVec,
    job_duration: HistogramVec,
    backend_errors: CounterVec,
    registry: Arc<Registry>,
}

impl PrometheusMetrics {
    /// Register the job metrics in `registry`.
    pub fn new_with_registry(registry: Arc<Registry>) -> Result<Self, prometheus::Error> {
        let jobs_started = CounterVec::new(
            Opts::new("jobs_started_total", "Total number of jobs submitted").namespace(NAMESPACE),
            &["backend"],
        )?;
        registry.register(Box::new(jobs_started.clone()))?;

        let jobs_completed = CounterVec::new(
            Opts::new("jobs_completed_total", "Total number of jobs that terminated")
                .namespace(NAMESPACE),
            &["backend", "outcome"],
        )?;
        registry.register(Box::new(jobs_completed.clone()))?;

        // Jobs run from seconds to the poll ceiling (minutes).
        let job_duration = HistogramVec::new(
            HistogramOpts::new("job_duration_seconds", "Job wall time from submission to end")
                .namespace(NAMESPACE)
                .buckets(vec![1.0, 5.0, 15.0, 30.0, 60.0, 120.0, 300.0, 600.0, 1800.0]),
            &["backend"],
        )?;
        registry.register(Box::new(job_duration.clone()))?;

        let backend_errors = CounterVec::new(
            Opts::new("backend_errors_total", "Backend failures outside job execution")
                .namespace(NAMESPACE),
            &["backend", "error_kind"],
        )?;
        registry.register(Box::new(backend_errors.clone()))?;

        Ok(Self {
            jobs_started,
            jobs_completed,
            job_duration,
            backend_errors,
            registry,
        })
    }

    /// Backend with its own registry.
    pub fn new() -> Result<Self, prometheus::Error> {
        Self::new_with_registry(Arc::new(Registry::new()))
    }

    pub fn gather(&self) -> Vec<MetricFamily> {
        self.registry.gather()
    }

    /// Current values in the text exposition format.
    pub fn encode_text(&self) -> Result<String, prometheus::Error> {
        let mut buf = Vec::new();
        TextEncoder::new().encode(&self.gather(), &mut buf)?;
        String::from_utf8(buf).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }
}

impl MetricsBackend for PrometheusMetrics {
    fn record_job_started(&self, backend: &str) {
        self.jobs_started.with_label_values(&[backend]).inc();
    }

    fn record_job_completed(&self, backend: &str, outcome: JobOutcome, duration_ms: u64) {
        self.jobs_completed
            .with_label_values(&[backend, outcome.as_label()])
            .inc();
        self.job_duration
            .with_label_values(&[backend])
            .observe(duration_ms as f64 / 1000.0);
    }

    fn record_backend_error(&self, backend: &str, error_kind: &str) {
        self.backend_errors
            .with_label_values(&[backend, error_kind])
            .inc();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn family<'a>(families: &'a [MetricFamily], name: &str) -> &'a MetricFamily {
        families
            .iter()
            .find(|f| f.name() == name)
            .unwrap_or_else(|| panic!("metric {name} not found"))
    }

    #[test]
    fn started_jobs_are_counted_per_backend() {
        let metrics = PrometheusMetrics::new().unwrap();

        metrics.record_job_started("kubernetes");
        metrics.record_job_started("kubernetes");
        metrics.record_job_started("fake");

        let families = metrics.gather();
        assert_eq!(
            family(&families, "jexec_jobs_started_total").get_metric().len(),
            2
        );
    }

    #[test]
    fn completion_feeds_counter_and_histogram() {
        let metrics = PrometheusMetrics::new().unwrap();

        metrics.record_job_completed("kubernetes", JobOutcome::Success, 12_000);
        metrics.record_job_completed("kubernetes", JobOutcome::Timeout, 300_000);

        let families = metrics.gather();
        assert_eq!(
            family(&families, "jexec_jobs_completed_total").get_metric().len(),
            2
        );
        assert_eq!(
            family(&families, "jexec_job_duration_seconds").get_metric().len(),
            1
        );
    }

    #[test]
    fn backend_errors_by_kind() {
        let metrics = PrometheusMetrics::new().unwrap();

        metrics.record_backend_error("kubernetes", "create");
        metrics.record_backend_error("connector", "connect");

        let families = metrics.gather();
        assert_eq!(
            family(&families, "jexec_backend_errors_total").get_metric().len(),
            2
        );
    }

    #[test]
    fn text_exposition_contains_samples() {
        let metrics = PrometheusMetrics::new().unwrap();
        metrics.record_job_started("kubernetes");

        let text = metrics.encode_text().unwrap();
        assert!(text.contains(r#"jexec_jobs_started_total{backend="kubernetes"} 1"#));
    }

    #[test]
    fn shared_registry_sees_metrics() {
        let registry = Arc::new(Registry::new());
        let metrics = PrometheusMetrics::new_with_registry(registry.clone()).unwrap();

        metrics.record_job_started("kubernetes");
        assert!(!registry.gather().is_empty());
    }
}
