use std::future::Future;
use std::time::Duration;

use tokio::time::{sleep, sleep_until, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::errors::{DeployerError, DeployerResult};

#[derive(Debug, Clone, Copy)]
pub struct PollSettings {
    pub interval: Duration,
    pub timeout: Duration,
}

/// Call `check` every `interval` until it yields a value, the caller cancels,
/// or `timeout` elapses. Transient failures of a single check are tolerated.
pub async fn poll_until<T, F, Fut>(
    what: &str,
    settings: PollSettings,
    cancel: &CancellationToken,
    mut check: F,
) -> DeployerResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = DeployerResult<Option<T>>>,
{
    let deadline = Instant::now() + settings.timeout;
    let mut polls: u32 = 0;

    loop {
        polls += 1;
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                return Err(DeployerError::Cancelled(format!("waiting for {}", what)));
            }
            _ = sleep_until(deadline) => {
                return Err(timed_out(what, settings.timeout));
            }
            outcome = check() => match outcome {
                Ok(Some(done)) => {
                    debug!(operation = %what, polls, "Wait finished");
                    return Ok(done);
                }
                Ok(None) => {}
                Err(e) if e.is_retryable() => {
                    warn!(operation = %what, error = %e, "Poll failed; will retry");
                }
                Err(e) => return Err(e),
            },
        }

        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                return Err(DeployerError::Cancelled(format!("waiting for {}", what)));
            }
            _ = sleep_until(deadline) => {
                return Err(timed_out(what, settings.timeout));
            }
            _ = sleep(settings.interval) => {}
        }
    }
}

fn timed_out(what: &str, timeout: Duration) -> DeployerError {
    DeployerError::Timeout(format!("{} did not finish within {:?}", what, timeout))
}
