use jexec_core::error::{CoreError, JobError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum KubeError {
    #[error("kubernetes api error: {0}")]
    Api(#[from] kube::Error),

    #[error("cannot reach the api server: {0}")]
    Unreachable(String),
}

impl From<KubeError> for JobError {
    fn from(e: KubeError) -> Self {
        JobError::Backend(e.to_string())
    }
}

impl From<KubeError> for CoreError {
    fn from(e: KubeError) -> Self {
        CoreError::Connection(e.to_string())
    }
}
