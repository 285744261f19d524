//! Per-event orchestration: configuration lookup, rule matching, pre-flight checks,
//! sequential job dispatch and outcome synthesis.
mod dispatch;
pub use dispatch::{DispatchReport, TaskFailure, TaskLog};

use std::sync::Arc;

use jexec_model::{Action, CloudEvent, OutcomeEvent, event::task_category};
use time::OffsetDateTime;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::{
    backend::Connector,
    collab::{ConfigSource, ErrorLogEntry, IntegrationRegistry, OutcomeSink, single_integration},
    engine::dispatch::Dispatch,
    error::CoreError,
    metrics::{MetricsHandle, noop_metrics},
    policy::ImageFilter,
    settings::JobSettings,
};

/// Task category whose outcome events carry the dispatch window.
const TEST_CATEGORY: &str = "test";

/// How the handling of one event ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleOutcome {
    /// No action matched; nothing was emitted.
    NoMatch,
    /// Every task of the matched action completed.
    Succeeded { reported: bool },
    /// The matched action failed before or during dispatch.
    Failed { reported: bool },
}

#[derive(Clone)]
struct ErrorLog {
    registry: Arc<dyn IntegrationRegistry>,
    integration: String,
}

/// Reacts to inbound events by running the tasks of the first matching action.
///
/// Cheap to clone; every clone shares the same immutable state.
#[derive(Clone)]
pub struct EventHandler {
    settings: Arc<JobSettings>,
    images: Arc<ImageFilter>,
    configs: Arc<dyn ConfigSource>,
    connector: Arc<dyn Connector>,
    sink: Arc<dyn OutcomeSink>,
    error_log: Option<ErrorLog>,
    metrics: MetricsHandle,
    shutdown: CancellationToken,
}

impl EventHandler {
    pub fn new(
        settings: Arc<JobSettings>,
        images: Arc<ImageFilter>,
        configs: Arc<dyn ConfigSource>,
        connector: Arc<dyn Connector>,
        sink: Arc<dyn OutcomeSink>,
    ) -> Self {
        Self {
            settings,
            images,
            configs,
            connector,
            sink,
            error_log: None,
            metrics: noop_metrics(),
            shutdown: CancellationToken::new(),
        }
    }

    /// Publish configuration failures to `registry` under the integration named `integration`.
    pub fn with_error_log(
        mut self,
        registry: Arc<dyn IntegrationRegistry>,
        integration: impl Into<String>,
    ) -> Self {
        self.error_log = Some(ErrorLog {
            registry,
            integration: integration.into(),
        });
        self
    }

    pub fn with_metrics(mut self, metrics: MetricsHandle) -> Self {
        self.metrics = metrics;
        self
    }

    /// Token whose cancellation interrupts every in-flight completion wait.
    pub fn with_shutdown(mut self, shutdown: CancellationToken) -> Self {
        self.shutdown = shutdown;
        self
    }

    /// Handle `event` on its own task.
    pub fn spawn(&self, event: CloudEvent) -> JoinHandle<Result<HandleOutcome, CoreError>> {
        let handler = self.clone();
        tokio::spawn(async move { handler.handle(&event).await })
    }

    /// Handle one event to completion.
    ///
    /// Only a configuration failure is returned as `Err`; every failure after a match
    /// is reported through the outcome sink instead (unless the action is silent).
    #[instrument(level = "info", skip(self, event), fields(event_id = %event.id, event_type = %event.event_type))]
    pub async fn handle(&self, event: &CloudEvent) -> Result<HandleOutcome, CoreError> {
        let identity = event.identity();
        let payload = event.payload();

        let fetched = match self.configs.get_config(&identity, event.revision()).await {
            Ok(fetched) => fetched,
            Err(e) => {
                let e = match e {
                    CoreError::Configuration(_) => e,
                    other => CoreError::Configuration(other.to_string()),
                };
                error!(error = %e, "cannot load configuration");
                self.publish_error_log(event, &e).await;
                return Err(e);
            }
        };

        let Some((action_index, action)) = fetched
            .config
            .is_event_match(&event.event_type, &payload)
        else {
            debug!("no action matches the event");
            return Ok(HandleOutcome::NoMatch);
        };
        info!(action = %action.name, tasks = action.tasks.len(), "action matched");

        if let Err(e) = self.images.check_action(action) {
            return Ok(self.fail(event, action, CoreError::from(e).to_string()).await);
        }

        let backend = match self.connector.connect().await {
            Ok(backend) => backend,
            Err(e) => {
                self.metrics.record_backend_error("connector", "connect");
                return Ok(self.fail(event, action, e.to_string()).await);
            }
        };

        if !action.silent {
            self.emit(&OutcomeEvent::started(event)).await;
        }

        let dispatch = Dispatch {
            backend: backend.as_ref(),
            settings: &self.settings,
            metrics: &self.metrics,
            cancel: &self.shutdown,
            event: Arc::new(event.clone()),
            identity,
            payload: Arc::new(payload),
            revision_hash: &fetched.revision_hash,
        };
        let start = OffsetDateTime::now_utc();
        let report = dispatch.run(action_index, action).await;
        let end = OffsetDateTime::now_utc();

        let (outcome, finished) = match &report.failure {
            None => (
                HandleOutcome::Succeeded {
                    reported: !action.silent,
                },
                OutcomeEvent::succeeded(event, report.success_message()),
            ),
            Some(failure) => (
                HandleOutcome::Failed {
                    reported: !action.silent,
                },
                OutcomeEvent::errored(event, failure.message()),
            ),
        };

        if action.silent {
            debug!(action = %action.name, "silent action, outcome not reported");
            return Ok(outcome);
        }

        let finished = if task_category(&event.event_type) == TEST_CATEGORY {
            finished.with_window(start, end)
        } else {
            finished
        };
        self.emit(&finished).await;
        Ok(outcome)
    }

    async fn fail(&self, event: &CloudEvent, action: &Action, message: String) -> HandleOutcome {
        warn!(action = %action.name, reason = %message, "action aborted before dispatch");
        if action.silent {
            return HandleOutcome::Failed { reported: false };
        }
        self.emit(&OutcomeEvent::errored(event, message)).await;
        HandleOutcome::Failed { reported: true }
    }

    async fn emit(&self, outcome: &OutcomeEvent) {
        if let Err(e) = self.sink.send(outcome).await {
            error!(event_type = %outcome.event_type, error = %e, "cannot deliver outcome event");
        }
    }

    async fn publish_error_log(&self, event: &CloudEvent, err: &CoreError) {
        let Some(log) = &self.error_log else {
            return;
        };
        let published = async {
            let integration = single_integration(log.registry.as_ref(), &log.integration).await?;
            log.registry
                .publish_error_log(&ErrorLogEntry {
                    integration_id: integration.id,
                    triggered_id: event.id.clone(),
                    shkeptncontext: event.shkeptncontext.clone(),
                    message: err.to_string(),
                })
                .await
        };
        if let Err(e) = published.await {
            warn!(error = %e, "cannot publish error log");
        }
    }
}
