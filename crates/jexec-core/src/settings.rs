//! Process-wide job settings.
use std::time::Duration;

use jexec_model::{
    Labels,
    config::{ImagePullPolicy, PodSecurityContext, ResourceList, Resources, SecurityContext},
};

/// Default completion-wait ceiling when a task configures none.
pub const DEFAULT_MAX_POLL_DURATION: Duration = Duration::from_secs(300);

/// Interval between two job status checks.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Settings shared by every job the service creates.
///
/// Built once at startup and shared behind an `Arc`; never mutated afterwards.
#[derive(Debug, Clone)]
pub struct JobSettings {
    /// Namespace used when a task does not override it.
    pub namespace: String,
    /// Resource requirements used when a task does not override them.
    pub resources: Resources,
    /// Service account used when a task does not override it. Empty means the namespace default.
    pub service_account: String,
    pub pod_security_context: PodSecurityContext,
    /// Container security context used when a task does not override it.
    pub security_context: SecurityContext,
    /// Whether tasks may run privileged or escalate privileges.
    pub allow_privileged: bool,
    /// Labels attached to every job.
    pub labels: Labels,
    /// Hard deadline applied to each job by the backend.
    pub task_deadline: Option<Duration>,
    /// Image of the bootstrap stage projecting resource files into the task.
    pub init_image: String,
    pub init_image_pull_policy: ImagePullPolicy,
    pub poll_interval: Duration,
    pub max_poll_duration: Duration,
}

impl Default for JobSettings {
    fn default() -> Self {
        Self {
            namespace: "jexec".to_string(),
            resources: Resources {
                limits: ResourceList::new("1", "512Mi"),
                requests: ResourceList::new("50m", "128Mi"),
            },
            service_account: String::new(),
            pod_security_context: PodSecurityContext::default(),
            security_context: SecurityContext::restricted(),
            allow_privileged: false,
            labels: Labels::new(),
            task_deadline: None,
            init_image: "ghcr.io/jexec/jexec-init:latest".to_string(),
            init_image_pull_policy: ImagePullPolicy::IfNotPresent,
            poll_interval: DEFAULT_POLL_INTERVAL,
            max_poll_duration: DEFAULT_MAX_POLL_DURATION,
        }
    }
}

impl JobSettings {
    /// Namespace for a task: its override, else the default.
    pub fn namespace_for<'a>(&'a self, task_namespace: Option<&'a str>) -> &'a str {
        task_namespace
            .filter(|ns| !ns.is_empty())
            .unwrap_or(self.namespace.as_str())
    }

    /// Check invariants the job backend relies on.
    pub fn validate(&self) -> Result<(), String> {
        if self.namespace.trim().is_empty() {
            return Err("default namespace cannot be empty".into());
        }
        if self.init_image.trim().is_empty() {
            return Err("init image cannot be empty".into());
        }
        if self.poll_interval.is_zero() {
            return Err("poll interval cannot be zero".into());
        }
        if self.max_poll_duration < self.poll_interval {
            return Err("max poll duration must not be shorter than the poll interval".into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_settings_are_valid() {
        assert!(JobSettings::default().validate().is_ok());
    }

    #[test]
    fn namespace_override_wins_unless_empty() {
        let s = JobSettings::default();
        assert_eq!(s.namespace_for(Some("team-a")), "team-a");
        assert_eq!(s.namespace_for(Some("")), "jexec");
        assert_eq!(s.namespace_for(None), "jexec");
    }

    #[test]
    fn validate_rejects_zero_interval_and_short_ceiling() {
        let s = JobSettings {
            poll_interval: Duration::ZERO,
            ..Default::default()
        };
        assert!(s.validate().is_err());

        let s = JobSettings {
            max_poll_duration: Duration::from_secs(1),
            ..Default::default()
        };
        assert!(s.validate().is_err());
    }
}
