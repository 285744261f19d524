//! Payloads of the events reported back to the bus.
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::event::{CloudEvent, EventIdentity, finished_type, started_type};

/// Processing status of a finished event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Succeeded,
    Errored,
}

/// Verdict of a finished event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Pass,
    Fail,
}

/// `data` body of a started or finished event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutcomeData {
    pub project: String,
    pub stage: String,
    pub service: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    pub status: Status,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Verdict>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,
    /// Dispatch start, populated for `test` triggers only.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "time::serde::rfc3339::option"
    )]
    pub start: Option<OffsetDateTime>,
    /// Dispatch end, populated for `test` triggers only.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "time::serde::rfc3339::option"
    )]
    pub end: Option<OffsetDateTime>,
}

impl OutcomeData {
    fn from_identity(identity: EventIdentity, status: Status) -> Self {
        Self {
            project: identity.project,
            stage: identity.stage,
            service: identity.service,
            labels: identity.labels,
            status,
            result: None,
            message: String::new(),
            start: None,
            end: None,
        }
    }
}

/// Phase of an outcome event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Started,
    Finished,
}

/// Event produced in reaction to a triggering [`CloudEvent`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutcomeEvent {
    pub phase: Phase,
    #[serde(rename = "type")]
    pub event_type: String,
    /// Id of the triggering event.
    pub triggered_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shkeptncontext: Option<String>,
    pub data: OutcomeData,
}

impl OutcomeEvent {
    /// `.started` event for `trigger`.
    pub fn started(trigger: &CloudEvent) -> Self {
        Self {
            phase: Phase::Started,
            event_type: started_type(&trigger.event_type),
            triggered_id: trigger.id.clone(),
            shkeptncontext: trigger.shkeptncontext.clone(),
            data: OutcomeData::from_identity(trigger.identity(), Status::Succeeded),
        }
    }

    /// Successful `.finished` event carrying the aggregated task logs.
    pub fn succeeded(trigger: &CloudEvent, message: impl Into<String>) -> Self {
        Self::finished(trigger, Status::Succeeded, Verdict::Pass, message.into())
    }

    /// Failed `.finished` event.
    pub fn errored(trigger: &CloudEvent, message: impl Into<String>) -> Self {
        Self::finished(trigger, Status::Errored, Verdict::Fail, message.into())
    }

    fn finished(trigger: &CloudEvent, status: Status, verdict: Verdict, message: String) -> Self {
        let mut data = OutcomeData::from_identity(trigger.identity(), status);
        data.result = Some(verdict);
        data.message = message;
        Self {
            phase: Phase::Finished,
            event_type: finished_type(&trigger.event_type),
            triggered_id: trigger.id.clone(),
            shkeptncontext: trigger.shkeptncontext.clone(),
            data,
        }
    }

    /// Attach the dispatch window.
    pub fn with_window(mut self, start: OffsetDateTime, end: OffsetDateTime) -> Self {
        self.data.start = Some(start);
        self.data.end = Some(end);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn trigger() -> CloudEvent {
        serde_json::from_value(json!({
            "id": "abc",
            "type": "sh.keptn.event.test.triggered",
            "shkeptncontext": "ctx",
            "data": { "project": "p", "stage": "s", "service": "svc" }
        }))
        .unwrap()
    }

    #[test]
    fn finished_event_echoes_identity() {
        let ev = OutcomeEvent::errored(&trigger(), "boom");
        assert_eq!(ev.event_type, "sh.keptn.event.test.finished");
        assert_eq!(ev.triggered_id, "abc");
        assert_eq!(ev.data.project, "p");
        assert_eq!(ev.data.status, Status::Errored);
        assert_eq!(ev.data.result, Some(Verdict::Fail));
    }

    #[test]
    fn serializes_wire_names() {
        let start = OffsetDateTime::from_unix_timestamp(1_700_000_000).unwrap();
        let end = OffsetDateTime::from_unix_timestamp(1_700_000_060).unwrap();
        let ev = OutcomeEvent::succeeded(&trigger(), "ok").with_window(start, end);

        let v = serde_json::to_value(&ev).unwrap();
        assert_eq!(v["phase"], "finished");
        assert_eq!(v["triggeredId"], "abc");
        assert_eq!(v["data"]["status"], "succeeded");
        assert_eq!(v["data"]["result"], "pass");
        assert_eq!(v["data"]["start"], "2023-11-14T22:13:20Z");
        assert_eq!(v["data"]["end"], "2023-11-14T22:14:20Z");
    }

    #[test]
    fn started_event_has_no_result() {
        let v = serde_json::to_value(OutcomeEvent::started(&trigger())).unwrap();
        assert_eq!(v["type"], "sh.keptn.event.test.started");
        assert!(v["data"].get("result").is_none());
        assert!(v["data"].get("message").is_none());
    }
}
