use thiserror::Error;

use crate::jsonpath::JsonPathError;

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("failed to parse configuration: {0}")]
    Parse(String),

    #[error("unsupported apiVersion '{0}' (expected: v2)")]
    UnsupportedApiVersion(String),

    #[error("unknown value source '{value_from}' for env '{name}'")]
    UnknownValueSource { name: String, value_from: String },

    #[error("unknown image pull policy: {0}")]
    UnknownPullPolicy(String),

    #[error("invalid jsonpath: {0}")]
    JsonPath(#[from] JsonPathError),

    #[error("invalid event: {0}")]
    InvalidEvent(String),

    #[error("invalid model: {0}")]
    Invalid(String),
}

impl From<serde_yaml::Error> for ModelError {
    fn from(e: serde_yaml::Error) -> Self {
        ModelError::Parse(e.to_string())
    }
}

pub type ModelResult<T> = Result<T, ModelError>;
