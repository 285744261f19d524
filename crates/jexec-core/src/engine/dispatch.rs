use std::sync::Arc;

use jexec_model::{Action, CloudEvent, EventIdentity};
use serde_json::Value;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
    backend::{JobBackend, JobDetails, JobRequest, WaitOptions, job_name},
    error::CoreError,
    metrics::{JobOutcome, MetricsHandle},
    settings::JobSettings,
};

/// Logs of a task whose job completed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskLog {
    pub task: String,
    pub job: String,
    pub logs: String,
}

/// The task that stopped the dispatch.
#[derive(Debug)]
pub struct TaskFailure {
    /// Zero-based task position.
    pub index: usize,
    pub task: String,
    pub job: String,
    pub error: CoreError,
    pub logs: String,
    pub diagnostics: String,
}

/// Result of running the tasks of one action in order.
#[derive(Debug, Default)]
pub struct DispatchReport {
    /// Completed tasks, in execution order.
    pub logs: Vec<TaskLog>,
    /// First failure; no later task was started.
    pub failure: Option<TaskFailure>,
}

impl DispatchReport {
    pub fn is_success(&self) -> bool {
        self.failure.is_none()
    }

    /// Name-tagged log blocks of every completed task.
    pub fn success_message(&self) -> String {
        self.logs
            .iter()
            .map(|l| {
                format!(
                    "Task '{}' (job {}) finished successfully.\nLogs:\n{}",
                    l.task, l.job, l.logs
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl TaskFailure {
    /// Failure description with whatever logs and diagnostics could be collected.
    pub fn message(&self) -> String {
        let mut msg = format!("Task '{}' (job {}) failed: {}", self.task, self.job, self.error);
        if !self.logs.is_empty() {
            msg.push_str("\n\nLogs:\n");
            msg.push_str(&self.logs);
        }
        if !self.diagnostics.is_empty() {
            msg.push_str("\n\nEvents:\n");
            msg.push_str(&self.diagnostics);
        }
        msg
    }
}

struct Failed {
    error: CoreError,
    logs: String,
    diagnostics: String,
}

impl From<CoreError> for Failed {
    fn from(error: CoreError) -> Self {
        Self {
            error,
            logs: String::new(),
            diagnostics: String::new(),
        }
    }
}

/// Shared inputs of one action dispatch.
pub(crate) struct Dispatch<'a> {
    pub backend: &'a dyn JobBackend,
    pub settings: &'a Arc<JobSettings>,
    pub metrics: &'a MetricsHandle,
    pub cancel: &'a CancellationToken,
    pub event: Arc<CloudEvent>,
    pub identity: EventIdentity,
    pub payload: Arc<Value>,
    pub revision_hash: &'a str,
}

impl Dispatch<'_> {
    /// Run every task of `action` sequentially, stopping at the first failure.
    pub async fn run(&self, action_index: usize, action: &Action) -> DispatchReport {
        let mut report = DispatchReport::default();

        for (index, task) in action.tasks.iter().enumerate() {
            let job = job_name(&self.event.id, action_index + 1, index + 1);
            let req = JobRequest {
                name: job.clone(),
                details: JobDetails {
                    action: action.name.clone(),
                    task: task.clone(),
                    action_index,
                    task_index: index,
                    config_revision_hash: self.revision_hash.to_string(),
                    revision_id: self.event.revision().map(str::to_string),
                },
                event: self.event.clone(),
                identity: self.identity.clone(),
                payload: self.payload.clone(),
                settings: self.settings.clone(),
            };

            match self.run_task(&req).await {
                Ok(logs) => report.logs.push(TaskLog {
                    task: task.name.clone(),
                    job,
                    logs,
                }),
                Err(failed) => {
                    warn!(task = %task.name, job = %job, error = %failed.error, "task failed, skipping remaining tasks");
                    report.failure = Some(TaskFailure {
                        index,
                        task: task.name.clone(),
                        job,
                        error: failed.error,
                        logs: failed.logs,
                        diagnostics: failed.diagnostics,
                    });
                    break;
                }
            }
        }

        report
    }

    async fn run_task(&self, req: &JobRequest) -> Result<String, Failed> {
        let backend = self.backend.name();
        let task = req.details.task.name.clone();
        let namespace = req.namespace().to_string();

        if let Err(source) = self.backend.create_job(req).await {
            self.metrics.record_backend_error(backend, "create");
            return Err(CoreError::JobCreation { task, source }.into());
        }
        self.metrics.record_job_started(backend);
        info!(job = %req.name, namespace = %namespace, "job created");

        let opts = WaitOptions {
            max_duration: req
                .details
                .task
                .max_poll()
                .unwrap_or(self.settings.max_poll_duration),
            poll_interval: self.settings.poll_interval,
            cancel: self.cancel.clone(),
        };
        let started = Instant::now();
        let waited = self
            .backend
            .await_completion(&req.name, &namespace, &opts)
            .await;
        self.metrics.record_job_completed(
            backend,
            JobOutcome::of(&waited),
            started.elapsed().as_millis() as u64,
        );

        match waited {
            Ok(()) => match self.backend.job_logs(&req.name, &namespace).await {
                Ok(logs) => {
                    debug!(job = %req.name, bytes = logs.len(), "job logs retrieved");
                    Ok(logs)
                }
                Err(source) => {
                    self.metrics.record_backend_error(backend, "logs");
                    Err(CoreError::JobRun { task, source }.into())
                }
            },
            Err(source) => {
                let logs = self.best_effort_logs(&req.name, &namespace).await;
                let diagnostics = self.best_effort_diagnostics(&req.name, &namespace).await;
                Err(Failed {
                    error: CoreError::JobRun { task, source },
                    logs,
                    diagnostics,
                })
            }
        }
    }

    async fn best_effort_logs(&self, job: &str, namespace: &str) -> String {
        self.backend
            .job_logs(job, namespace)
            .await
            .unwrap_or_else(|e| {
                warn!(job, error = %e, "cannot retrieve logs of failed job");
                String::new()
            })
    }

    async fn best_effort_diagnostics(&self, job: &str, namespace: &str) -> String {
        self.backend
            .failed_diagnostics(job, namespace)
            .await
            .unwrap_or_else(|e| {
                warn!(job, error = %e, "cannot retrieve diagnostics of failed job");
                String::new()
            })
    }
}
