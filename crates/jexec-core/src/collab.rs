//! External collaborators of the engine: configuration retrieval, outcome delivery
//! and the error-log side channel.
use async_trait::async_trait;
use jexec_model::{Configuration, EventIdentity, OutcomeEvent};
use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Configuration resolved for one event.
#[derive(Debug, Clone)]
pub struct FetchedConfig {
    pub config: Configuration,
    /// Revision the configuration was read at; forwarded to every job.
    pub revision_hash: String,
}

/// Source of per-tenant configuration documents.
#[async_trait]
pub trait ConfigSource: Send + Sync {
    /// Fetch and parse the configuration for `identity`, pinned to `revision` when set.
    async fn get_config(
        &self,
        identity: &EventIdentity,
        revision: Option<&str>,
    ) -> Result<FetchedConfig, CoreError>;
}

/// Receiver of started and finished events.
#[async_trait]
pub trait OutcomeSink: Send + Sync {
    async fn send(&self, event: &OutcomeEvent) -> Result<(), CoreError>;
}

/// Registration of an integration with the control plane.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Integration {
    pub id: String,
    pub name: String,
}

/// Error report published on the side channel when no outcome event can be produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorLogEntry {
    pub integration_id: String,
    /// Id of the triggering event.
    pub triggered_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shkeptncontext: Option<String>,
    pub message: String,
}

/// Control-plane registry used for error logs.
#[async_trait]
pub trait IntegrationRegistry: Send + Sync {
    /// Registrations whose name equals `name`.
    async fn integrations(&self, name: &str) -> Result<Vec<Integration>, CoreError>;

    async fn publish_error_log(&self, entry: &ErrorLogEntry) -> Result<(), CoreError>;
}

/// The one registration named `name`; zero or several is an error.
pub async fn single_integration(
    registry: &dyn IntegrationRegistry,
    name: &str,
) -> Result<Integration, CoreError> {
    let mut found = registry.integrations(name).await?;
    match found.len() {
        1 => Ok(found.remove(0)),
        0 => Err(CoreError::Registry(format!(
            "no integration registered as '{name}'"
        ))),
        n => Err(CoreError::Registry(format!(
            "{n} integrations registered as '{name}', expected exactly one"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed(Vec<Integration>);

    #[async_trait]
    impl IntegrationRegistry for Fixed {
        async fn integrations(&self, name: &str) -> Result<Vec<Integration>, CoreError> {
            Ok(self.0.iter().filter(|i| i.name == name).cloned().collect())
        }

        async fn publish_error_log(&self, _: &ErrorLogEntry) -> Result<(), CoreError> {
            Ok(())
        }
    }

    fn reg(id: &str, name: &str) -> Integration {
        Integration {
            id: id.into(),
            name: name.into(),
        }
    }

    #[tokio::test]
    async fn exactly_one_registration_is_required() {
        let one = Fixed(vec![reg("1", "jexec"), reg("2", "other")]);
        assert_eq!(single_integration(&one, "jexec").await.unwrap().id, "1");

        let none = Fixed(vec![reg("2", "other")]);
        assert!(matches!(
            single_integration(&none, "jexec").await,
            Err(CoreError::Registry(_))
        ));

        let two = Fixed(vec![reg("1", "jexec"), reg("3", "jexec")]);
        let err = single_integration(&two, "jexec").await.unwrap_err();
        assert!(err.to_string().contains("2 integrations"));
    }
}
