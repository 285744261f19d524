use jexec_core::backend::JobPhase;
use k8s_openapi::api::batch::v1::Job;

const CONDITION_TRUE: &str = "True";

/// Phase of `job` derived from its status conditions.
///
/// Only conditions whose status is `True` count; the first terminal one wins.
pub fn job_phase(job: &Job) -> JobPhase {
    let conditions = job
        .status
        .as_ref()
        .and_then(|s| s.conditions.as_deref())
        .unwrap_or_default();

    conditions
        .iter()
        .filter(|c| c.status == CONDITION_TRUE)
        .find_map(|c| match c.type_.as_str() {
            "Complete" => Some(JobPhase::Completed),
            "Failed" => Some(JobPhase::Failed {
                reason: c.reason.clone().unwrap_or_default(),
                message: c.message.clone().unwrap_or_default(),
            }),
            "Suspended" => Some(JobPhase::Suspended),
            _ => None,
        })
        .unwrap_or(JobPhase::Pending)
}
