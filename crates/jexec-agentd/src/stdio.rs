use async_trait::async_trait;
use jexec_core::{
    collab::{ErrorLogEntry, Integration, IntegrationRegistry, OutcomeSink},
    error::CoreError,
};
use jexec_model::OutcomeEvent;
use tokio::{
    io::{AsyncWrite, AsyncWriteExt, Stdout},
    sync::Mutex,
};
use tracing::error;

/// Writes outcome events as JSON lines.
pub struct LineSink<W> {
    out: Mutex<W>,
}

impl LineSink<Stdout> {
    pub fn stdout() -> Self {
        Self::new(tokio::io::stdout())
    }
}

impl<W> LineSink<W> {
    pub fn new(out: W) -> Self {
        Self {
            out: Mutex::new(out),
        }
    }

    #[cfg(test)]
    fn into_inner(self) -> W {
        self.out.into_inner()
    }
}

#[async_trait]
impl<W> OutcomeSink for LineSink<W>
where
    W: AsyncWrite + Unpin + Send,
{
    async fn send(&self, event: &OutcomeEvent) -> Result<(), CoreError> {
        let mut line =
            serde_json::to_vec(event).map_err(|e| CoreError::Delivery(e.to_string()))?;
        line.push(b'\n');

        let mut out = self.out.lock().await;
        out.write_all(&line)
            .await
            .map_err(|e| CoreError::Delivery(e.to_string()))?;
        out.flush()
            .await
            .map_err(|e| CoreError::Delivery(e.to_string()))
    }
}

/// Registry knowing only this process; error logs go to the log output.
#[derive(Debug, Clone)]
pub struct LocalRegistry {
    name: String,
}

impl LocalRegistry {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[async_trait]
impl IntegrationRegistry for LocalRegistry {
    async fn integrations(&self, name: &str) -> Result<Vec<Integration>, CoreError> {
        if name != self.name {
            return Ok(Vec::new());
        }
        Ok(vec![Integration {
            id: format!("local-{}", self.name),
            name: self.name.clone(),
        }])
    }

    async fn publish_error_log(&self, entry: &ErrorLogEntry) -> Result<(), CoreError> {
        error!(
            integration = %entry.integration_id,
            triggered_id = %entry.triggered_id,
            context = entry.shkeptncontext.as_deref().unwrap_or_default(),
            message = %entry.message,
            "error log"
        );
        Ok(())
    }
}
