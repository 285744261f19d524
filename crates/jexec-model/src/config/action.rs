use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{EVENT_TYPE_WILDCARD, config::Task, jsonpath};

/// Optional payload predicate: the value at `property` must equal `match` exactly.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JsonPathMatch {
    /// JSONPath evaluated against the flattened event.
    pub property: String,
    /// Literal compared with the stringified selection.
    #[serde(rename = "match")]
    pub expected: String,
}

/// Event selector of an [`Action`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionEvent {
    /// Event type, or `*` for any type.
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jsonpath: Option<JsonPathMatch>,
}

impl ActionEvent {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            jsonpath: None,
        }
    }

    /// Attach a JSONPath predicate.
    pub fn with_jsonpath(mut self, property: impl Into<String>, expected: impl Into<String>) -> Self {
        self.jsonpath = Some(JsonPathMatch {
            property: property.into(),
            expected: expected.into(),
        });
        self
    }

    /// Whether `event_type` / `payload` satisfy this selector.
    ///
    /// A predicate that cannot be evaluated (missing path, bad syntax) is a non-match.
    pub fn matches(&self, event_type: &str, payload: &Value) -> bool {
        if self.name != event_type && self.name != EVENT_TYPE_WILDCARD {
            return false;
        }
        match &self.jsonpath {
            None => true,
            Some(pred) => jsonpath::select_string(&pred.property, payload)
                .map(|actual| actual == pred.expected)
                .unwrap_or(false),
        }
    }
}

/// Matching rule bundling event selectors with an ordered task list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Action {
    pub name: String,
    pub events: Vec<ActionEvent>,
    pub tasks: Vec<Task>,
    /// Run the tasks without emitting started / finished events.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub silent: bool,
}

impl Action {
    /// First declared selector matching the event, if any.
    pub fn matching_event(&self, event_type: &str, payload: &Value) -> Option<&ActionEvent> {
        self.events.iter().find(|e| e.matches(event_type, payload))
    }

    /// Linear lookup of a task by name.
    pub fn find_task_by_name(&self, name: &str) -> Option<&Task> {
        self.tasks.iter().find(|t| t.name == name)
    }
}
