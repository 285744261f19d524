use std::{fmt, str::FromStr, time::Duration};

use serde::{Deserialize, Serialize};

use crate::{ModelError, Seconds, config::EnvEntry};

/// One containerized unit of work inside an [`crate::Action`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    /// Display name, also used to locate the task from the bootstrap stage.
    pub name: String,

    /// Resource paths projected into the task filesystem by the bootstrap stage.
    ///
    /// A path ending in `/` selects every resource below that directory.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub files: Vec<String>,

    /// Container image reference.
    pub image: String,

    /// Entrypoint override.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cmd: Vec<String>,

    /// Arguments passed to the entrypoint.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,

    /// Runtime environment, resolved in declaration order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub env: Vec<EnvEntry>,

    /// CPU / memory override of the process-wide defaults.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<Resources>,

    /// Container security context override.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub security_context: Option<SecurityContext>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub working_dir: Option<String>,

    /// Completion-wait ceiling in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_poll_duration: Option<Seconds>,

    /// Execution namespace override.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,

    /// Seconds the backend keeps a finished job before garbage-collecting it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttl_seconds_after_finished: Option<i32>,

    /// Service account override.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_account: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_pull_policy: Option<ImagePullPolicy>,
}

impl Task {
    /// Task-level poll ceiling, if one is configured and positive.
    pub fn max_poll(&self) -> Option<Duration> {
        self.max_poll_duration
            .filter(|s| *s > 0)
            .map(|s| Duration::from_secs(s as u64))
    }
}

/// Quantities for one side of a resource requirement (`limits` or `requests`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceList {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory: Option<String>,
}

impl ResourceList {
    pub fn new(cpu: impl Into<String>, memory: impl Into<String>) -> Self {
        Self {
            cpu: Some(cpu.into()),
            memory: Some(memory.into()),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.cpu.is_none() && self.memory.is_none()
    }
}

/// Resource requirements of the main task container.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Resources {
    #[serde(default)]
    pub limits: ResourceList,
    #[serde(default)]
    pub requests: ResourceList,
}

/// Linux capabilities to add or drop.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Capabilities {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub add: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub drop: Vec<String>,
}

/// Container security context, mirroring the subset of the cluster schema the service exposes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecurityContext {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_as_user: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_as_group: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_as_non_root: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub privileged: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allow_privilege_escalation: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub read_only_root_filesystem: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capabilities: Option<Capabilities>,
}

impl SecurityContext {
    /// Hardened default used when the operator configures nothing else.
    pub fn restricted() -> Self {
        Self {
            run_as_user: Some(65532),
            run_as_group: Some(65532),
            run_as_non_root: Some(true),
            privileged: Some(false),
            allow_privilege_escalation: Some(false),
            read_only_root_filesystem: Some(true),
            capabilities: Some(Capabilities {
                add: Vec::new(),
                drop: vec!["ALL".to_string()],
            }),
        }
    }

    /// `self` with every field set in `over` replaced by its value there.
    ///
    /// Capabilities are replaced as a whole, not merged list by list.
    pub fn overlay(&self, over: &SecurityContext) -> SecurityContext {
        SecurityContext {
            run_as_user: over.run_as_user.or(self.run_as_user),
            run_as_group: over.run_as_group.or(self.run_as_group),
            run_as_non_root: over.run_as_non_root.or(self.run_as_non_root),
            privileged: over.privileged.or(self.privileged),
            allow_privilege_escalation: over
                .allow_privilege_escalation
                .or(self.allow_privilege_escalation),
            read_only_root_filesystem: over
                .read_only_root_filesystem
                .or(self.read_only_root_filesystem),
            capabilities: over
                .capabilities
                .clone()
                .or_else(|| self.capabilities.clone()),
        }
    }

    /// Whether the context grants elevated privileges.
    pub fn is_privileged(&self) -> bool {
        self.privileged.unwrap_or(false) || self.allow_privilege_escalation.unwrap_or(false)
    }
}

/// Pod-level security context applied to every job pod.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PodSecurityContext {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_as_user: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_as_group: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_as_non_root: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fs_group: Option<i64>,
}

/// Container image pull policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ImagePullPolicy {
    Always,
    IfNotPresent,
    Never,
}

impl ImagePullPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImagePullPolicy::Always => "Always",
            ImagePullPolicy::IfNotPresent => "IfNotPresent",
            ImagePullPolicy::Never => "Never",
        }
    }
}

impl fmt::Display for ImagePullPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ImagePullPolicy {
    type Err = ModelError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "always" => Ok(ImagePullPolicy::Always),
            "ifnotpresent" | "if-not-present" => Ok(ImagePullPolicy::IfNotPresent),
            "never" => Ok(ImagePullPolicy::Never),
            other => Err(ModelError::UnknownPullPolicy(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn max_poll_ignores_non_positive_values() {
        let mut task = Task::default();
        assert_eq!(task.max_poll(), None);

        task.max_poll_duration = Some(0);
        assert_eq!(task.max_poll(), None);

        task.max_poll_duration = Some(42);
        assert_eq!(task.max_poll(), Some(Duration::from_secs(42)));
    }

    #[test]
    fn pull_policy_parses_case_insensitive() {
        assert_eq!("always".parse::<ImagePullPolicy>().unwrap(), ImagePullPolicy::Always);
        assert_eq!(
            "IfNotPresent".parse::<ImagePullPolicy>().unwrap(),
            ImagePullPolicy::IfNotPresent
        );
        assert!("sometimes".parse::<ImagePullPolicy>().is_err());
    }

    #[test]
    fn privileged_detection() {
        assert!(!SecurityContext::restricted().is_privileged());
        let ctx = SecurityContext {
            allow_privilege_escalation: Some(true),
            ..Default::default()
        };
        assert!(ctx.is_privileged());
    }

    #[test]
    fn overlay_keeps_unset_defaults() {
        let over = SecurityContext {
            run_as_user: Some(1000),
            ..Default::default()
        };
        let merged = SecurityContext::restricted().overlay(&over);

        assert_eq!(merged.run_as_user, Some(1000));
        assert_eq!(merged.run_as_group, Some(65532));
        assert_eq!(merged.run_as_non_root, Some(true));
        assert_eq!(merged.allow_privilege_escalation, Some(false));
        assert_eq!(merged.read_only_root_filesystem, Some(true));
        assert_eq!(merged.capabilities.unwrap().drop, vec!["ALL"]);
    }

    #[test]
    fn overlay_replaces_capabilities_whole() {
        let over = SecurityContext {
            capabilities: Some(Capabilities {
                add: vec!["NET_BIND_SERVICE".into()],
                drop: Vec::new(),
            }),
            privileged: Some(true),
            ..Default::default()
        };
        let merged = SecurityContext::restricted().overlay(&over);

        let caps = merged.capabilities.as_ref().unwrap();
        assert_eq!(caps.add, vec!["NET_BIND_SERVICE"]);
        assert!(caps.drop.is_empty());
        assert!(merged.is_privileged());
    }
}
