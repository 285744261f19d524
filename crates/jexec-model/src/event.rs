//! Inbound event envelope and the identity it carries.
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ModelError, ModelResult};

const TRIGGERED_SUFFIX: &str = ".triggered";

fn default_specversion() -> String {
    "1.0".to_string()
}

/// Event received from the bus.
///
/// Serializing the envelope yields the flattened projection that JSONPath
/// predicates and `valueFrom: event` entries are evaluated against.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CloudEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default)]
    pub source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<String>,
    #[serde(default = "default_specversion")]
    pub specversion: String,
    /// Correlation token shared by every event of one delivery sequence.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shkeptncontext: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub triggeredid: Option<String>,
    /// Revision marker pinning configuration retrieval.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gitcommitid: Option<String>,
    #[serde(default)]
    pub data: Value,
}

impl CloudEvent {
    /// Decode an envelope from JSON bytes.
    pub fn from_slice(bytes: &[u8]) -> ModelResult<Self> {
        let event: CloudEvent =
            serde_json::from_slice(bytes).map_err(|e| ModelError::InvalidEvent(e.to_string()))?;
        if event.id.trim().is_empty() {
            return Err(ModelError::InvalidEvent("event id is empty".into()));
        }
        if event.event_type.trim().is_empty() {
            return Err(ModelError::InvalidEvent("event type is empty".into()));
        }
        Ok(event)
    }

    /// Envelope and data flattened into one JSON object.
    pub fn payload(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    /// Revision marker, if the event carries a non-empty one.
    pub fn revision(&self) -> Option<&str> {
        self.gitcommitid.as_deref().filter(|r| !r.is_empty())
    }

    /// Tenant identity echoed from `data`.
    pub fn identity(&self) -> EventIdentity {
        let field = |name: &str| {
            self.data
                .get(name)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string()
        };
        let labels = self
            .data
            .get("labels")
            .and_then(Value::as_object)
            .map(|m| {
                m.iter()
                    .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
                    .collect()
            })
            .unwrap_or_default();

        EventIdentity {
            project: field("project"),
            stage: field("stage"),
            service: field("service"),
            labels,
        }
    }
}

/// Project / stage / service triple identifying the tenant scope of an event.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventIdentity {
    pub project: String,
    pub stage: String,
    pub service: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
}

/// Task category of an event type: `sh.keptn.event.test.triggered` → `test`.
pub fn task_category(event_type: &str) -> &str {
    let base = event_type
        .strip_suffix(TRIGGERED_SUFFIX)
        .unwrap_or(event_type);
    base.rsplit('.').next().unwrap_or(base)
}

/// Event type announcing the start of work for `event_type`.
pub fn started_type(event_type: &str) -> String {
    with_phase(event_type, "started")
}

/// Event type reporting the outcome of work for `event_type`.
pub fn finished_type(event_type: &str) -> String {
    with_phase(event_type, "finished")
}

fn with_phase(event_type: &str, phase: &str) -> String {
    let base = event_type
        .strip_suffix(TRIGGERED_SUFFIX)
        .unwrap_or(event_type);
    format!("{base}.{phase}")
}

#[cfg(test)]
mod tests {
    use super::*;

    const RAW: &str = r#"{
        "id": "f2b878d3-03c0-4e8f-bc3f-454bc1b3d79d",
        "type": "sh.keptn.event.test.triggered",
        "source": "shipyard-controller",
        "specversion": "1.0",
        "shkeptncontext": "a3e5f16d-8888-4720-82c7-6995062905c1",
        "gitcommitid": "6caf78d2c978f7f787",
        "data": {
            "project": "sockshop",
            "stage": "dev",
            "service": "carts",
            "labels": { "owner": "team-a", "build": 7 },
            "deployment": { "url": "https://x" }
        }
    }"#;

    #[test]
    fn decodes_envelope() {
        let ev = CloudEvent::from_slice(RAW.as_bytes()).unwrap();
        assert_eq!(ev.event_type, "sh.keptn.event.test.triggered");
        assert_eq!(ev.revision(), Some("6caf78d2c978f7f787"));
        assert_eq!(ev.time, None);
    }

    #[test]
    fn rejects_missing_id() {
        let err = CloudEvent::from_slice(br#"{"id": "", "type": "x"}"#).unwrap_err();
        assert!(matches!(err, ModelError::InvalidEvent(_)));
        assert!(CloudEvent::from_slice(b"not json").is_err());
    }

    #[test]
    fn payload_flattens_envelope_and_data() {
        let ev = CloudEvent::from_slice(RAW.as_bytes()).unwrap();
        let p = ev.payload();
        assert_eq!(p["type"], "sh.keptn.event.test.triggered");
        assert_eq!(p["shkeptncontext"], "a3e5f16d-8888-4720-82c7-6995062905c1");
        assert_eq!(p["data"]["deployment"]["url"], "https://x");
    }

    #[test]
    fn identity_reads_data_fields() {
        let ev = CloudEvent::from_slice(RAW.as_bytes()).unwrap();
        let id = ev.identity();
        assert_eq!(id.project, "sockshop");
        assert_eq!(id.stage, "dev");
        assert_eq!(id.service, "carts");
        assert_eq!(id.labels.get("owner").map(String::as_str), Some("team-a"));
        assert!(!id.labels.contains_key("build"));
    }

    #[test]
    fn empty_revision_is_none() {
        let mut ev = CloudEvent::from_slice(RAW.as_bytes()).unwrap();
        ev.gitcommitid = Some(String::new());
        assert_eq!(ev.revision(), None);
    }

    #[test]
    fn phase_types() {
        assert_eq!(task_category("sh.keptn.event.test.triggered"), "test");
        assert_eq!(task_category("test.triggered"), "test");
        assert_eq!(task_category("deployment"), "deployment");
        assert_eq!(
            started_type("sh.keptn.event.test.triggered"),
            "sh.keptn.event.test.started"
        );
        assert_eq!(finished_type("test.triggered"), "test.finished");
    }
}
