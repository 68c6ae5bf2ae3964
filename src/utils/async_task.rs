use std::future::Future;

use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio::time::timeout;
use tracing::error;
use tracing::warn;

use crate::BackoffPolicy;
use crate::Error;
use crate::FetchError;
use crate::Result;

/// Runs `task` until it succeeds, bounding every attempt by
/// `policy.timeout_ms` and sleeping a capped, doubling delay between attempts.
/// Errors rejected by `should_retry` are returned immediately.
pub(crate) async fn task_with_timeout_and_exponential_backoff<F, T, P>(
    mut task: F,
    policy: BackoffPolicy,
    should_retry: fn(&Error) -> bool,
) -> Result<P>
where
    F: FnMut() -> T,
    T: Future<Output = Result<P>>,
{
    let mut attempts = 0usize;
    loop {
        attempts += 1;
        let last = match timeout(policy.timeout(), task()).await {
            Ok(Ok(r)) => return Ok(r),
            Ok(Err(e)) if !should_retry(&e) => return Err(e),
            Ok(Err(e)) => {
                warn!(attempts, "task failed with error: {}", e);
                e.to_string()
            }
            Err(_) => {
                warn!(attempts, "task timed out after {:?}", policy.timeout());
                FetchError::Timeout(policy.timeout()).to_string()
            }
        };

        if !policy.allows(attempts) {
            warn!("Task failed after {} attempts", attempts);
            return Err(FetchError::RetryExhausted { attempts, last }.into());
        }
        sleep(policy.delay_for(attempts as u32 - 1)).await;
    }
}

/// Spawns a detached task; its failure is logged under `name` and never
/// propagated.
pub(crate) fn spawn_detached<Fut>(
    name: &str,
    task: Fut,
) -> JoinHandle<()>
where
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    let name = name.to_string();
    tokio::spawn(async move {
        if let Err(e) = task.await {
            error!("spawned task: {name} stopped or encountered an error: {}", e);
        }
    })
}
