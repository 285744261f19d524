use std::future::Future;

use tokio::time::{Instant, sleep};
use tracing::{debug, trace};

use super::{JobPhase, WaitOptions};
use crate::error::JobError;

/// Probe `phase` until it reports a terminal state.
///
/// The first probe happens immediately; later ones are spaced by `opts.poll_interval`.
/// Exceeding `opts.max_duration` yields [`JobError::TimedOut`], a fired cancel token
/// [`JobError::Canceled`]. Probe errors abort the wait.
pub async fn poll_until_terminal<F, Fut>(
    name: &str,
    opts: &WaitOptions,
    mut phase: F,
) -> Result<(), JobError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<JobPhase, JobError>>,
{
    let deadline = Instant::now() + opts.max_duration;

    loop {
        match phase().await? {
            JobPhase::Completed => {
                debug!(job = name, "job completed");
                return Ok(());
            }
            JobPhase::Failed { reason, message } => {
                return Err(JobError::Failed {
                    name: name.to_string(),
                    reason,
                    message,
                });
            }
            JobPhase::Suspended => {
                return Err(JobError::Suspended {
                    name: name.to_string(),
                });
            }
            JobPhase::Pending => trace!(job = name, "job still running"),
        }

        let now = Instant::now();
        if now >= deadline {
            return Err(JobError::TimedOut {
                name: name.to_string(),
                after: opts.max_duration,
            });
        }
        let nap = opts.poll_interval.min(deadline - now);

        tokio::select! {
            _ = opts.cancel.cancelled() => {
                return Err(JobError::Canceled { name: name.to_string() });
            }
            _ = sleep(nap) => {}
        }
    }
}
