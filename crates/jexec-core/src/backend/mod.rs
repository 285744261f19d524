//! Execution backend abstraction used by the engine to run one task as one job.
//!
//! Concrete backends implement [`JobBackend`] and are obtained per action dispatch
//! through a [`Connector`].
mod naming;
pub use naming::job_name;

mod poll;
pub use poll::poll_until_terminal;

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use jexec_model::{CloudEvent, EventIdentity, Task};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::{
    error::{CoreError, JobError},
    settings::JobSettings,
};

/// Identifies which configured task a job executes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobDetails {
    pub action: String,
    pub task: Task,
    /// Zero-based position of the action in the configuration.
    pub action_index: usize,
    /// Zero-based position of the task in its action.
    pub task_index: usize,
    /// Revision hash of the configuration the task came from.
    pub config_revision_hash: String,
    /// Revision marker of the triggering event, if any.
    pub revision_id: Option<String>,
}

/// Everything a backend needs to build and submit one job.
#[derive(Debug, Clone)]
pub struct JobRequest {
    pub name: String,
    pub details: JobDetails,
    pub event: Arc<CloudEvent>,
    pub identity: EventIdentity,
    /// Flattened event projection used for `valueFrom: event` lookups.
    pub payload: Arc<Value>,
    pub settings: Arc<JobSettings>,
}

impl JobRequest {
    /// Namespace the job runs in: the task override or the default.
    pub fn namespace(&self) -> &str {
        self.settings
            .namespace_for(self.details.task.namespace.as_deref())
    }
}

/// Observed state of a submitted job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobPhase {
    Pending,
    Completed,
    Failed { reason: String, message: String },
    Suspended,
}

impl JobPhase {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, JobPhase::Pending)
    }
}

/// Bounds of one completion wait.
#[derive(Debug, Clone)]
pub struct WaitOptions {
    pub max_duration: Duration,
    pub poll_interval: Duration,
    pub cancel: CancellationToken,
}

/// Lifecycle operations for jobs on one execution backend.
#[async_trait]
pub trait JobBackend: Send + Sync {
    /// Backend name used in logs and metric labels.
    fn name(&self) -> &'static str;

    /// Build and submit the job described by `req`. Never retried.
    async fn create_job(&self, req: &JobRequest) -> Result<(), JobError>;

    /// Current phase of job `name`.
    async fn job_phase(&self, name: &str, namespace: &str) -> Result<JobPhase, JobError>;

    /// Block until job `name` terminates, the wait bound is hit or `opts.cancel` fires.
    ///
    /// Returns `Ok(())` only for a completed job.
    async fn await_completion(
        &self,
        name: &str,
        namespace: &str,
        opts: &WaitOptions,
    ) -> Result<(), JobError> {
        poll_until_terminal(name, opts, || self.job_phase(name, namespace)).await
    }

    /// Concatenated main-container logs of every pod of job `name`.
    async fn job_logs(&self, name: &str, namespace: &str) -> Result<String, JobError>;

    /// Human-readable warnings recorded for job `name` and its pods.
    async fn failed_diagnostics(&self, name: &str, namespace: &str) -> Result<String, JobError>;
}

/// Opens a backend session for one action dispatch.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self) -> Result<Arc<dyn JobBackend>, CoreError>;
}
