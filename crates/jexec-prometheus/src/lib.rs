//! Prometheus implementation of [`jexec_core::MetricsBackend`].
//!
//! ## Metrics
//! - `jexec_jobs_started_total{backend}` - Counter
//! - `jexec_jobs_completed_total{backend, outcome}` - Counter
//! - `jexec_job_duration_seconds{backend}` - Histogram
//! - `jexec_backend_errors_total{backend, error_kind}` - Counter
//!
//! No HTTP endpoint is served here; [`PrometheusMetrics::encode_text`] renders the
//! exposition format for whatever transport the host process uses.
mod backend;
pub use backend::PrometheusMetrics;
