use std::future::Future;

use anyhow::Context;
use jexec_core::{HandleOutcome, error::CoreError};
use jexec_model::CloudEvent;
use tokio::{
    io::{AsyncBufRead, AsyncBufReadExt},
    task::{JoinError, JoinSet},
};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Totals of one input session.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PumpStats {
    pub dispatched: usize,
    pub completed: usize,
    /// Most handlers in flight at any one time.
    pub peak_in_flight: usize,
}

/// Reads one event envelope per line and runs `dispatch` for each in the background.
///
/// Finished handlers are reaped while input is still being read. When `interrupt`
/// fires, `shutdown` is canceled; in-flight handlers are drained either way.
pub async fn pump<R, I, F, Fut>(
    input: R,
    interrupt: I,
    shutdown: &CancellationToken,
    mut dispatch: F,
) -> anyhow::Result<PumpStats>
where
    R: AsyncBufRead + Unpin,
    I: Future<Output = ()>,
    F: FnMut(CloudEvent) -> Fut,
    Fut: Future<Output = Result<HandleOutcome, CoreError>> + Send + 'static,
{
    let mut lines = input.lines();
    let mut running = JoinSet::new();
    let mut stats = PumpStats::default();
    tokio::pin!(interrupt);

    loop {
        tokio::select! {
            Some(done) = running.join_next(), if !running.is_empty() => {
                report(done);
                stats.completed += 1;
            }
            _ = &mut interrupt => {
                info!("interrupted, canceling in-flight jobs");
                shutdown.cancel();
                break;
            }
            line = lines.next_line() => {
                let Some(line) = line.context("cannot read input")? else {
                    info!("input closed");
                    break;
                };
                if line.trim().is_empty() {
                    continue;
                }
                match CloudEvent::from_slice(line.as_bytes()) {
                    Ok(event) => {
                        running.spawn(dispatch(event));
                        stats.dispatched += 1;
                        stats.peak_in_flight = stats.peak_in_flight.max(running.len());
                    }
                    Err(e) => warn!(error = %e, "dropping malformed event"),
                }
            }
        }
    }

    while let Some(done) = running.join_next().await {
        report(done);
        stats.completed += 1;
    }
    Ok(stats)
}

fn report(done: Result<Result<HandleOutcome, CoreError>, JoinError>) {
    match done {
        Ok(Ok(outcome)) => info!(?outcome, "event handled"),
        Ok(Err(e)) => error!(error = %e, "event rejected"),
        Err(e) => error!(error = %e, "event handler aborted"),
    }
}
