//! Races independent fallible operations against a shared timeout.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use tokio::task::JoinSet;
use tokio::time::{Instant, timeout_at};
use tracing::debug;

/// Runs every operation concurrently and collects the successes that
/// complete before `timeout` elapses.
///
/// Operations still pending at the timeout are abandoned: their tasks are
/// aborted at the next await point and their eventual results discarded.
/// Individual failures are excluded from the output rather than
/// propagated, so an empty vector means "no operation succeeded in time"
/// and callers must apply their own policy for it.
pub async fn settle_within<T, E, F>(
    operations: impl IntoIterator<Item = F>,
    timeout: Duration,
) -> Vec<T>
where
    T: Send + 'static,
    E: Display + Send + 'static,
    F: Future<Output = Result<T, E>> + Send + 'static,
{
    let mut pending = JoinSet::new();
    for operation in operations {
        pending.spawn(operation);
    }

    let deadline = Instant::now() + timeout;
    let mut settled = Vec::with_capacity(pending.len());

    loop {
        match timeout_at(deadline, pending.join_next()).await {
            Err(_elapsed) => {
                debug!(
                    settled = settled.len(),
                    abandoned = pending.len(),
                    "settle window elapsed, abandoning pending operations"
                );
                break;
            }
            Ok(None) => break,
            Ok(Some(Ok(Ok(value)))) => settled.push(value),
            Ok(Some(Ok(Err(error)))) => {
                debug!(error = %error, "operation failed, excluding from settled set");
            }
            Ok(Some(Err(join_error))) => {
                debug!(error = %join_error, "operation task failed, excluding from settled set");
            }
        }
    }

    settled
}
