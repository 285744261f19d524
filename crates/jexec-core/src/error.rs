use std::time::Duration;

use jexec_model::{JsonPathError, ModelError};
use thiserror::Error;

/// Failure of the orchestration of one event.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("policy violation: {0}")]
    Policy(#[from] PolicyError),

    #[error("cannot connect to execution backend: {0}")]
    Connection(String),

    #[error("failed to create job for task '{task}': {source}")]
    JobCreation {
        task: String,
        #[source]
        source: JobError,
    },

    #[error("task '{task}' failed: {source}")]
    JobRun {
        task: String,
        #[source]
        source: JobError,
    },

    #[error("integration registry error: {0}")]
    Registry(String),

    #[error("outcome delivery failed: {0}")]
    Delivery(String),
}

impl From<ModelError> for CoreError {
    fn from(e: ModelError) -> Self {
        CoreError::Configuration(e.to_string())
    }
}

/// Rejection by the image allowlist.
#[derive(Debug, Error)]
pub enum PolicyError {
    #[error("image '{image}' of task '{task}' is not allowed")]
    ImageNotAllowed { task: String, image: String },

    #[error("invalid image pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },
}

/// Failure while resolving a task environment.
#[derive(Debug, Error)]
pub enum EnvError {
    #[error("env '{name}': {source}")]
    EventValue {
        name: String,
        #[source]
        source: JsonPathError,
    },

    #[error("env '{name}' has an unusable declaration: {reason}")]
    InvalidSource { name: String, reason: String },

    #[error("secret '{name}' not found in namespace '{namespace}'")]
    SecretNotFound { name: String, namespace: String },

    #[error("secret lookup failed: {0}")]
    SecretLookup(String),
}

/// Failure of one job against the execution backend.
#[derive(Debug, Error)]
pub enum JobError {
    #[error("failed to resolve environment: {0}")]
    Env(#[from] EnvError),

    #[error("job rejected: {0}")]
    Rejected(String),

    #[error("job '{name}' failed: {reason}: {message}")]
    Failed {
        name: String,
        reason: String,
        message: String,
    },

    #[error("job '{name}' was suspended")]
    Suspended { name: String },

    #[error("job '{name}' did not finish within {after:?}")]
    TimedOut { name: String, after: Duration },

    #[error("waiting for job '{name}' was canceled")]
    Canceled { name: String },

    #[error("backend error: {0}")]
    Backend(String),
}
