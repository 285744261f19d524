//! Kubernetes execution backend: one `batch/v1` Job per task.
mod error;
pub use error::KubeError;

mod backend;
pub use backend::{KubeBackend, KubeConnector};

mod diagnostics;
mod spec;
pub use spec::build_job;

mod status;
pub use status::job_phase;

/// Backend name used in logs and metric labels.
pub const BACKEND_NAME: &str = "kubernetes";
