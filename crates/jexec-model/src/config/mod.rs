//! Declarative rule configuration: schema, parsing and event matching.
mod action;
pub use action::{Action, ActionEvent, JsonPathMatch};

mod env;
pub use env::{EnvEntry, ValueSource};

mod task;
pub use task::{
    Capabilities, ImagePullPolicy, PodSecurityContext, ResourceList, Resources, SecurityContext,
    Task,
};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::{
    CONFIG_API_VERSION, MAX_INDEX, MIN_TTL_SECONDS_AFTER_FINISHED,
    error::{ModelError, ModelResult},
};

/// Parsed rule configuration of one tenant scope.
///
/// Immutable once parsed; fetched again for every event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Configuration {
    pub api_version: String,
    #[serde(default)]
    pub actions: Vec<Action>,
}

impl Configuration {
    /// Parse a YAML (or JSON) document and apply the post-parse corrections.
    pub fn parse(bytes: &[u8]) -> ModelResult<Self> {
        let mut cfg: Configuration = serde_yaml::from_slice(bytes)?;
        cfg.validate()?;
        cfg.apply_corrections();
        Ok(cfg)
    }

    /// Serialize back into the document format accepted by [`Configuration::parse`].
    pub fn to_yaml(&self) -> ModelResult<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    fn validate(&self) -> ModelResult<()> {
        if self.api_version != CONFIG_API_VERSION {
            return Err(ModelError::UnsupportedApiVersion(self.api_version.clone()));
        }
        if self.actions.len() > MAX_INDEX {
            return Err(ModelError::Invalid(format!(
                "too many actions: {} (max {MAX_INDEX})",
                self.actions.len()
            )));
        }
        for action in &self.actions {
            if action.tasks.len() > MAX_INDEX {
                return Err(ModelError::Invalid(format!(
                    "action '{}' has too many tasks: {} (max {MAX_INDEX})",
                    action.name,
                    action.tasks.len()
                )));
            }
        }
        Ok(())
    }

    /// Raise every `ttlSecondsAfterFinished` below the retention floor to the floor.
    pub fn apply_corrections(&mut self) {
        for action in &mut self.actions {
            for task in &mut action.tasks {
                if let Some(ttl) = task.ttl_seconds_after_finished {
                    if ttl < MIN_TTL_SECONDS_AFTER_FINISHED {
                        warn!(
                            action = %action.name,
                            task = %task.name,
                            ttl,
                            floor = MIN_TTL_SECONDS_AFTER_FINISHED,
                            "ttlSecondsAfterFinished below floor, raising it"
                        );
                        task.ttl_seconds_after_finished = Some(MIN_TTL_SECONDS_AFTER_FINISHED);
                    }
                }
            }
        }
    }

    /// First action (in declaration order) matching the event, with its index.
    ///
    /// `None` is the regular "nothing to do" outcome.
    pub fn is_event_match(&self, event_type: &str, payload: &Value) -> Option<(usize, &Action)> {
        self.actions
            .iter()
            .enumerate()
            .find(|(_, a)| a.matching_event(event_type, payload).is_some())
    }

    /// Linear lookup of an action by name.
    pub fn find_action_by_name(&self, name: &str) -> Option<&Action> {
        self.actions.iter().find(|a| a.name == name)
    }

    /// Linear lookup of a task by action and task name.
    pub fn find_task_by_name(&self, action: &str, task: &str) -> Option<&Task> {
        self.find_action_by_name(action)
            .and_then(|a| a.find_task_by_name(task))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const DOC: &str = r#"
apiVersion: v2
actions:
  - name: "Run locust"
    events:
      - name: "sh.keptn.event.test.triggered"
        jsonpath:
          property: "$.data.test.teststrategy"
          match: "locust"
    tasks:
      - name: "Run locust smoke tests"
        files:
          - locust/basic.py
          - locust/
        image: "locustio/locust"
        cmd: ["locust"]
        args: ["--config", "/keptn/locust/locust.conf", "--host", "$(HOST)"]
        env:
          - name: HOST
            value: "$.data.deployment.deploymentURIsLocal[0]"
            valueFrom: event
          - name: locust-secret
            valueFrom: secret
          - name: MODE
            value: headless
        resources:
          limits:
            cpu: "1"
            memory: 512Mi
          requests:
            cpu: 50m
            memory: 128Mi
        maxPollDuration: 600
        ttlSecondsAfterFinished: 10
        workingDir: /keptn
  - name: "Notify"
    silent: true
    events:
      - name: "*"
    tasks:
      - name: "echo"
        image: "alpine"
        cmd: ["echo", "hi"]
        namespace: other
        ttlSecondsAfterFinished: 600
"#;

    fn parsed() -> Configuration {
        Configuration::parse(DOC.as_bytes()).unwrap()
    }

    #[test]
    fn parses_full_document() {
        let cfg = parsed();
        assert_eq!(cfg.actions.len(), 2);

        let task = &cfg.actions[0].tasks[0];
        assert_eq!(task.files, vec!["locust/basic.py", "locust/"]);
        assert_eq!(task.env.len(), 3);
        assert_eq!(task.max_poll_duration, Some(600));
        assert_eq!(
            task.resources.as_ref().unwrap().requests.memory.as_deref(),
            Some("128Mi")
        );
        assert!(cfg.actions[1].silent);
        assert_eq!(cfg.actions[1].tasks[0].namespace.as_deref(), Some("other"));
    }

    #[test]
    fn ttl_below_floor_is_raised() {
        let cfg = parsed();
        assert_eq!(cfg.actions[0].tasks[0].ttl_seconds_after_finished, Some(60));
        assert_eq!(cfg.actions[1].tasks[0].ttl_seconds_after_finished, Some(600));
    }

    #[test]
    fn ttl_at_floor_is_unchanged() {
        let mut cfg = parsed();
        cfg.actions[0].tasks[0].ttl_seconds_after_finished = Some(60);
        cfg.apply_corrections();
        assert_eq!(cfg.actions[0].tasks[0].ttl_seconds_after_finished, Some(60));
    }

    #[test]
    fn malformed_input_is_parse_error() {
        let err = Configuration::parse(b"actions: [ { name: ").unwrap_err();
        assert!(matches!(err, ModelError::Parse(_)), "{err:?}");
    }

    #[test]
    fn wrong_api_version_is_rejected() {
        let err = Configuration::parse(b"apiVersion: v1\nactions: []").unwrap_err();
        assert!(matches!(err, ModelError::UnsupportedApiVersion(v) if v == "v1"));
    }

    #[test]
    fn roundtrip_preserves_actions_and_tasks() {
        let cfg = parsed();
        let yaml = cfg.to_yaml().unwrap();
        let back = Configuration::parse(yaml.as_bytes()).unwrap();
        assert_eq!(cfg, back);
    }

    #[test]
    fn first_matching_action_wins() {
        let cfg = parsed();
        let payload = json!({ "data": { "test": { "teststrategy": "locust" } } });

        let (idx, action) = cfg
            .is_event_match("sh.keptn.event.test.triggered", &payload)
            .unwrap();
        assert_eq!(idx, 0);
        assert_eq!(action.name, "Run locust");

        let other = json!({ "data": { "test": { "teststrategy": "other" } } });
        let (idx, action) = cfg
            .is_event_match("sh.keptn.event.test.triggered", &other)
            .unwrap();
        assert_eq!(idx, 1);
        assert_eq!(action.name, "Notify");
    }

    #[test]
    fn no_match_returns_none() {
        let cfg = Configuration::parse(
            b"apiVersion: v2\nactions:\n  - name: a\n    events: [{name: x}]\n    tasks: []\n",
        )
        .unwrap();
        assert!(cfg.is_event_match("y", &json!({})).is_none());
    }

    #[test]
    fn lookups_by_name() {
        let cfg = parsed();
        assert!(cfg.find_action_by_name("Notify").is_some());
        assert!(cfg.find_action_by_name("missing").is_none());
        assert_eq!(
            cfg.find_task_by_name("Run locust", "Run locust smoke tests")
                .map(|t| t.image.as_str()),
            Some("locustio/locust")
        );
        assert!(cfg.find_task_by_name("Notify", "nope").is_none());
    }
}
