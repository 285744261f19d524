//! Pure construction of the `batch/v1` Job executing one task.
use std::collections::BTreeMap;

use jexec_core::{backend::JobRequest, env::ResolvedEnv, env::identity_env, error::JobError};
use jexec_model::{
    Labels,
    config::{Capabilities, PodSecurityContext, ResourceList, Resources, SecurityContext},
};
use k8s_openapi::{
    api::{
        batch::v1::{Job, JobSpec},
        core::v1::{
            self as k8s, Container, EmptyDirVolumeSource, EnvVar, EnvVarSource, PodSpec,
            PodTemplateSpec, ResourceRequirements, SecretKeySelector, Volume, VolumeMount,
        },
    },
    apimachinery::pkg::{api::resource::Quantity, apis::meta::v1::ObjectMeta},
};

pub(crate) const INIT_CONTAINER: &str = "init-task";
pub(crate) const TASK_CONTAINER: &str = "task";

const VOLUME_NAME: &str = "job-volume";
const MOUNT_ROOT: &str = "/jexec";

/// Retention of finished jobs when a task configures none.
pub const DEFAULT_TTL_SECONDS_AFTER_FINISHED: i32 = 21600;

const LABEL_MANAGED_BY: &str = "app.kubernetes.io/managed-by";
const MANAGED_BY: &str = "jexec";
const LABEL_ACTION_INDEX: &str = "jexec.io/action-index";
const LABEL_TASK_INDEX: &str = "jexec.io/task-index";

const ANNOTATION_ACTION: &str = "jexec.io/action";
const ANNOTATION_TASK: &str = "jexec.io/task";
const ANNOTATION_EVENT_ID: &str = "jexec.io/event-id";
const ANNOTATION_CONTEXT: &str = "jexec.io/context";

const ENV_JOB_ACTION: &str = "JOB_ACTION";
const ENV_JOB_TASK: &str = "JOB_TASK";
const ENV_GIT_COMMIT_ID: &str = "GIT_COMMIT_ID";
const ENV_CONFIG_REVISION_HASH: &str = "CONFIG_REVISION_HASH";

/// Build the Job for `req` with the already resolved task environment.
///
/// Fails when the effective security context is privileged and the settings forbid it.
pub fn build_job(req: &JobRequest, env: &[ResolvedEnv]) -> Result<Job, JobError> {
    let task = &req.details.task;
    let settings = &req.settings;

    let security = match &task.security_context {
        Some(over) => settings.security_context.overlay(over),
        None => settings.security_context.clone(),
    };
    if !settings.allow_privileged && security.is_privileged() {
        return Err(JobError::Rejected(format!(
            "task '{}' requests a privileged security context, which is not allowed",
            task.name
        )));
    }

    let resources = task.resources.as_ref().unwrap_or(&settings.resources);
    let mount = VolumeMount {
        name: VOLUME_NAME.to_string(),
        mount_path: MOUNT_ROOT.to_string(),
        ..Default::default()
    };

    let init = Container {
        name: INIT_CONTAINER.to_string(),
        image: Some(settings.init_image.clone()),
        image_pull_policy: Some(settings.init_image_pull_policy.to_string()),
        env: Some(init_env(req)),
        resources: Some(resource_requirements(&settings.resources)),
        security_context: Some(security_context(&settings.security_context)),
        volume_mounts: Some(vec![mount.clone()]),
        ..Default::default()
    };

    let main = Container {
        name: TASK_CONTAINER.to_string(),
        image: Some(task.image.clone()),
        image_pull_policy: task.image_pull_policy.map(|p| p.to_string()),
        command: non_empty(&task.cmd),
        args: non_empty(&task.args),
        working_dir: task.working_dir.clone(),
        env: Some(env.iter().map(env_var).collect()),
        resources: Some(resource_requirements(resources)),
        security_context: Some(security_context(&security)),
        volume_mounts: Some(vec![mount]),
        ..Default::default()
    };

    let service_account = task
        .service_account
        .as_deref()
        .unwrap_or(settings.service_account.as_str());

    let labels = labels(req);
    let pod = PodSpec {
        init_containers: Some(vec![init]),
        containers: vec![main],
        restart_policy: Some("Never".to_string()),
        service_account_name: (!service_account.is_empty()).then(|| service_account.to_string()),
        security_context: Some(pod_security_context(&settings.pod_security_context)),
        volumes: Some(vec![Volume {
            name: VOLUME_NAME.to_string(),
            empty_dir: Some(EmptyDirVolumeSource::default()),
            ..Default::default()
        }]),
        ..Default::default()
    };

    Ok(Job {
        metadata: ObjectMeta {
            name: Some(req.name.clone()),
            namespace: Some(req.namespace().to_string()),
            labels: Some(labels.clone()),
            annotations: Some(annotations(req)),
            ..Default::default()
        },
        spec: Some(JobSpec {
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(labels),
                    ..Default::default()
                }),
                spec: Some(pod),
            },
            backoff_limit: Some(0),
            ttl_seconds_after_finished: Some(
                task.ttl_seconds_after_finished
                    .unwrap_or(DEFAULT_TTL_SECONDS_AFTER_FINISHED),
            ),
            active_deadline_seconds: settings
                .task_deadline
                .map(|d| i64::try_from(d.as_secs()).unwrap_or(i64::MAX)),
            ..Default::default()
        }),
        ..Default::default()
    })
}

fn labels(req: &JobRequest) -> BTreeMap<String, String> {
    let own: Labels = [
        (LABEL_MANAGED_BY, MANAGED_BY.to_string()),
        (LABEL_ACTION_INDEX, req.details.action_index.to_string()),
        (LABEL_TASK_INDEX, req.details.task_index.to_string()),
    ]
    .into_iter()
    .collect();
    req.settings.labels.merged(&own).0
}

fn annotations(req: &JobRequest) -> BTreeMap<String, String> {
    let mut out = BTreeMap::from([
        (ANNOTATION_ACTION.to_string(), req.details.action.clone()),
        (ANNOTATION_TASK.to_string(), req.details.task.name.clone()),
        (ANNOTATION_EVENT_ID.to_string(), req.event.id.clone()),
    ]);
    if let Some(ctx) = &req.event.shkeptncontext {
        out.insert(ANNOTATION_CONTEXT.to_string(), ctx.clone());
    }
    out
}

/// Inputs of the bootstrap stage that projects the task's files into the shared volume.
fn init_env(req: &JobRequest) -> Vec<EnvVar> {
    let mut env = vec![
        ResolvedEnv::value(ENV_JOB_ACTION, &req.details.action),
        ResolvedEnv::value(ENV_JOB_TASK, &req.details.task.name),
    ];
    env.extend(identity_env(&req.identity));
    if let Some(rev) = &req.details.revision_id {
        env.push(ResolvedEnv::value(ENV_GIT_COMMIT_ID, rev));
    }
    env.push(ResolvedEnv::value(
        ENV_CONFIG_REVISION_HASH,
        &req.details.config_revision_hash,
    ));
    env.iter().map(env_var).collect()
}

fn env_var(env: &ResolvedEnv) -> EnvVar {
    match env {
        ResolvedEnv::Value { name, value } => EnvVar {
            name: name.clone(),
            value: Some(value.clone()),
            ..Default::default()
        },
        ResolvedEnv::SecretKey { name, secret, key } => EnvVar {
            name: name.clone(),
            value_from: Some(EnvVarSource {
                secret_key_ref: Some(SecretKeySelector {
                    name: secret.clone(),
                    key: key.clone(),
                    optional: None,
                }),
                ..Default::default()
            }),
            ..Default::default()
        },
    }
}

fn non_empty(items: &[String]) -> Option<Vec<String>> {
    (!items.is_empty()).then(|| items.to_vec())
}

fn quantities(list: &ResourceList) -> Option<BTreeMap<String, Quantity>> {
    if list.is_empty() {
        return None;
    }
    let mut out = BTreeMap::new();
    if let Some(cpu) = &list.cpu {
        out.insert("cpu".to_string(), Quantity(cpu.clone()));
    }
    if let Some(memory) = &list.memory {
        out.insert("memory".to_string(), Quantity(memory.clone()));
    }
    Some(out)
}

fn resource_requirements(r: &Resources) -> ResourceRequirements {
    ResourceRequirements {
        limits: quantities(&r.limits),
        requests: quantities(&r.requests),
        ..Default::default()
    }
}

fn security_context(sc: &SecurityContext) -> k8s::SecurityContext {
    k8s::SecurityContext {
        run_as_user: sc.run_as_user,
        run_as_group: sc.run_as_group,
        run_as_non_root: sc.run_as_non_root,
        privileged: sc.privileged,
        allow_privilege_escalation: sc.allow_privilege_escalation,
        read_only_root_filesystem: sc.read_only_root_filesystem,
        capabilities: sc.capabilities.as_ref().map(capabilities),
        ..Default::default()
    }
}

fn capabilities(c: &Capabilities) -> k8s::Capabilities {
    k8s::Capabilities {
        add: non_empty(&c.add),
        drop: non_empty(&c.drop),
    }
}

fn pod_security_context(sc: &PodSecurityContext) -> k8s::PodSecurityContext {
    k8s::PodSecurityContext {
        run_as_user: sc.run_as_user,
        run_as_group: sc.run_as_group,
        run_as_non_root: sc.run_as_non_root,
        fs_group: sc.fs_group,
        ..Default::default()
    }
}
