use std::sync::Arc;

use crate::error::JobError;

/// How a job terminated, for metrics classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    Success,
    Failure,
    Canceled,
    Timeout,
}

impl JobOutcome {
    /// Label value for metrics.
    #[inline]
    pub fn as_label(&self) -> &'static str {
        match self {
            JobOutcome::Success => "success",
            JobOutcome::Failure => "failure",
            JobOutcome::Canceled => "canceled",
            JobOutcome::Timeout => "timeout",
        }
    }

    /// Classify the result of a completion wait.
    pub fn of(result: &Result<(), JobError>) -> Self {
        match result {
            Ok(()) => JobOutcome::Success,
            Err(JobError::TimedOut { .. }) => JobOutcome::Timeout,
            Err(JobError::Canceled { .. }) => JobOutcome::Canceled,
            Err(_) => JobOutcome::Failure,
        }
    }
}

/// Backend metrics collection interface.
pub trait MetricsBackend: Send + Sync + 'static {
    /// Record a job submitted to `backend`.
    fn record_job_started(&self, backend: &str);

    /// Record job termination with outcome and wall time since submission.
    fn record_job_completed(&self, backend: &str, outcome: JobOutcome, duration_ms: u64);

    /// Record a backend failure outside the job itself (connect, create, status lookup).
    ///
    /// Job failures are recorded through `record_job_completed` with `Failure`.
    fn record_backend_error(&self, backend: &str, error_kind: &str);
}

/// Shared handle to metrics backend.
pub type MetricsHandle = Arc<dyn MetricsBackend>;
