use std::{path::PathBuf, time::Duration};

use anyhow::Context;
use clap::Parser;
use jexec_core::settings::JobSettings;
use jexec_model::{
    Labels,
    config::{ImagePullPolicy, PodSecurityContext, ResourceList, Resources, SecurityContext},
};
use jexec_observe::{LoggerConfig, LoggerFormat, LoggerLevel};

/// Runs configured container tasks as Kubernetes jobs in reaction to CI/CD events.
///
/// Events are read from stdin as one JSON envelope per line; started and finished
/// events are written to stdout the same way.
#[derive(Debug, Parser)]
#[command(name = "jexec-agentd", version)]
pub struct Args {
    /// Directory holding `<project>/[<stage>/[<service>/]]job/config.yaml`.
    #[arg(long, env = "JEXEC_CONFIG_ROOT", default_value = "/etc/jexec/config")]
    pub config_root: PathBuf,

    /// Image patterns tasks may use (comma separated globs); empty or `*` allows all.
    #[arg(long, env = "JEXEC_ALLOWED_IMAGES", value_delimiter = ',')]
    pub allowed_images: Vec<String>,

    #[arg(long, env = "JEXEC_JOB_NAMESPACE", default_value = "jexec")]
    pub job_namespace: String,

    #[arg(long, env = "JEXEC_DEFAULT_CPU_LIMIT", default_value = "1")]
    pub cpu_limit: String,

    #[arg(long, env = "JEXEC_DEFAULT_MEMORY_LIMIT", default_value = "512Mi")]
    pub memory_limit: String,

    #[arg(long, env = "JEXEC_DEFAULT_CPU_REQUEST", default_value = "50m")]
    pub cpu_request: String,

    #[arg(long, env = "JEXEC_DEFAULT_MEMORY_REQUEST", default_value = "128Mi")]
    pub memory_request: String,

    /// Service account of job pods; empty uses the namespace default.
    #[arg(long, env = "JEXEC_JOB_SERVICE_ACCOUNT", default_value = "")]
    pub service_account: String,

    /// Group owning the shared job volume.
    #[arg(long, env = "JEXEC_JOB_FS_GROUP")]
    pub fs_group: Option<i64>,

    /// Let tasks run privileged or escalate privileges.
    #[arg(long, env = "JEXEC_ALLOW_PRIVILEGED_JOBS")]
    pub allow_privileged: bool,

    /// Labels added to every job, as `k=v,k2=v2`.
    #[arg(long, env = "JEXEC_JOB_LABELS", default_value = "")]
    pub job_labels: String,

    /// Hard deadline of every job, enforced by the cluster.
    #[arg(long, env = "JEXEC_TASK_DEADLINE_SECONDS")]
    pub task_deadline_seconds: Option<u64>,

    #[arg(
        long,
        env = "JEXEC_INIT_IMAGE",
        default_value = "ghcr.io/jexec/jexec-init:latest"
    )]
    pub init_image: String,

    #[arg(long, env = "JEXEC_INIT_IMAGE_PULL_POLICY", default_value = "IfNotPresent")]
    pub init_image_pull_policy: ImagePullPolicy,

    #[arg(long, env = "JEXEC_POLL_INTERVAL_SECONDS", default_value_t = 5)]
    pub poll_interval_seconds: u64,

    /// Completion wait ceiling for tasks that do not set `maxPollDuration`.
    #[arg(long, env = "JEXEC_MAX_POLL_SECONDS", default_value_t = 300)]
    pub max_poll_seconds: u64,

    /// Integration name error logs are published under.
    #[arg(long, env = "JEXEC_INTEGRATION_NAME", default_value = "jexec")]
    pub integration_name: String,

    /// Write the final metrics snapshot here on exit.
    #[arg(long, env = "JEXEC_METRICS_FILE")]
    pub metrics_file: Option<PathBuf>,

    #[arg(long, env = "JEXEC_LOG_FORMAT", default_value = "text")]
    pub log_format: LoggerFormat,

    #[arg(long, env = "JEXEC_LOG_LEVEL", default_value = "info")]
    pub log_level: LoggerLevel,
}

impl Args {
    pub fn logger_config(&self) -> LoggerConfig {
        LoggerConfig {
            format: self.log_format,
            level: self.log_level.clone(),
            ..Default::default()
        }
    }

    pub fn job_settings(&self) -> anyhow::Result<JobSettings> {
        let labels = if self.job_labels.trim().is_empty() {
            Labels::new()
        } else {
            Labels::parse_list(&self.job_labels)
                .with_context(|| format!("invalid job labels '{}'", self.job_labels))?
        };

        let settings = JobSettings {
            namespace: self.job_namespace.clone(),
            resources: Resources {
                limits: ResourceList::new(&self.cpu_limit, &self.memory_limit),
                requests: ResourceList::new(&self.cpu_request, &self.memory_request),
            },
            service_account: self.service_account.clone(),
            pod_security_context: PodSecurityContext {
                fs_group: self.fs_group,
                ..Default::default()
            },
            security_context: SecurityContext::restricted(),
            allow_privileged: self.allow_privileged,
            labels,
            task_deadline: self.task_deadline_seconds.map(Duration::from_secs),
            init_image: self.init_image.clone(),
            init_image_pull_policy: self.init_image_pull_policy,
            poll_interval: Duration::from_secs(self.poll_interval_seconds),
            max_poll_duration: Duration::from_secs(self.max_poll_seconds),
        };
        settings.validate().map_err(anyhow::Error::msg)?;
        Ok(settings)
    }
}
