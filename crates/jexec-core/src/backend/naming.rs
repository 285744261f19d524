use sha2::{Digest, Sha256};

const PREFIX: &str = "jexec-job";
const ID_CHARS: usize = 10;

/// Name of the job running task `task` (1-based) of action `action` (1-based) for event `event_id`.
///
/// Only `[a-z0-9]` of the event id are kept so the result is a valid DNS-1123 label.
/// An id without any of them is replaced by the hex digest of the id.
/// Indices are zero-padded to three digits. The name never exceeds 63 characters.
pub fn job_name(event_id: &str, action: usize, task: usize) -> String {
    let mut id: String = event_id
        .chars()
        .flat_map(char::to_lowercase)
        .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
        .take(ID_CHARS)
        .collect();
    if id.is_empty() {
        id = hex::encode(Sha256::digest(event_id.as_bytes()));
        id.truncate(ID_CHARS);
    }
    format!("{PREFIX}-{id}-{action:03}-{task:03}")
}
