//! Resolution of a task's declared environment into concrete variables.
use async_trait::async_trait;
use jexec_model::{
    ENV_EVENT_PROJECT, ENV_EVENT_SERVICE, ENV_EVENT_STAGE, EventIdentity, Task, ValueSource,
};
use serde_json::Value;
use tracing::trace;

use crate::error::EnvError;

/// A variable ready to be placed into a container spec.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedEnv {
    /// Inline value.
    Value { name: String, value: String },
    /// Value read by the runtime from `key` of `secret`; never copied inline.
    SecretKey {
        name: String,
        secret: String,
        key: String,
    },
}

impl ResolvedEnv {
    pub fn value(name: impl Into<String>, value: impl Into<String>) -> Self {
        ResolvedEnv::Value {
            name: name.into(),
            value: value.into(),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            ResolvedEnv::Value { name, .. } | ResolvedEnv::SecretKey { name, .. } => name,
        }
    }
}

/// Read access to cluster secrets.
#[async_trait]
pub trait SecretSource: Send + Sync {
    /// Key names of secret `name` in `namespace`, or `None` if it does not exist.
    async fn secret_keys(&self, name: &str, namespace: &str)
    -> Result<Option<Vec<String>>, EnvError>;
}

/// Build the runtime environment of `task`.
///
/// Declared entries come first, in declaration order; the identity variables are
/// appended last. Any unresolvable entry aborts the whole resolution.
pub async fn resolve_env(
    task: &Task,
    identity: &EventIdentity,
    payload: &Value,
    namespace: &str,
    secrets: &dyn SecretSource,
) -> Result<Vec<ResolvedEnv>, EnvError> {
    let mut out = Vec::with_capacity(task.env.len() + 3);

    for entry in &task.env {
        match entry.source() {
            ValueSource::Event(path) => {
                let value = path
                    .select_string(payload)
                    .map_err(|source| EnvError::EventValue {
                        name: entry.name().to_string(),
                        source,
                    })?;
                out.push(ResolvedEnv::value(entry.name(), value));
            }
            ValueSource::Secret => {
                let keys = secrets
                    .secret_keys(entry.name(), namespace)
                    .await?
                    .ok_or_else(|| EnvError::SecretNotFound {
                        name: entry.name().to_string(),
                        namespace: namespace.to_string(),
                    })?;
                out.extend(keys.into_iter().map(|key| ResolvedEnv::SecretKey {
                    name: key.clone(),
                    secret: entry.name().to_string(),
                    key,
                }));
            }
            ValueSource::Literal(value) => out.push(ResolvedEnv::value(entry.name(), value)),
            ValueSource::Invalid { reason, .. } => {
                return Err(EnvError::InvalidSource {
                    name: entry.name().to_string(),
                    reason: reason.clone(),
                });
            }
        }
    }

    out.extend(identity_env(identity));
    trace!(task = %task.name, vars = out.len(), "task environment resolved");
    Ok(out)
}

/// Identity variables of the triggering event.
pub fn identity_env(identity: &EventIdentity) -> [ResolvedEnv; 3] {
    [
        ResolvedEnv::value(ENV_EVENT_PROJECT, &identity.project),
        ResolvedEnv::value(ENV_EVENT_STAGE, &identity.stage),
        ResolvedEnv::value(ENV_EVENT_SERVICE, &identity.service),
    ]
}
