//! Confirmation watchers raced by the engine.
//!
//! Each provider gets two independent channels: a push watcher waiting on
//! a signature subscription and a poll watcher querying the status with
//! exponential backoff. A watcher resolves to `Some` only for a terminal
//! status; everything else (unsupported push, exhausted backoff, transport
//! failure) resolves to `None` and simply drops out of the race.

use std::sync::Arc;
use std::time::Duration;

use backon::{ExponentialBuilder, Retryable};
use solana_signature::Signature;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::blockhash::fetch_max_block_height;
use crate::connection::{ConnectionError, ProviderConnection};
use crate::types::{
    Commitment, ConfirmationOptions, ConfirmedTransaction, EXPIRY_PROBE_CAP, NOMINAL_BLOCK_TIME,
    RetryPolicy, SignatureStatus, short_signature,
};

/// Why a poll attempt did not yield a terminal status.
#[derive(Debug, Error)]
enum PollGap {
    #[error("signature not found yet")]
    NotFound,
    #[error("status below requested commitment")]
    BelowCommitment,
    #[error(transparent)]
    Transient(ConnectionError),
    #[error(transparent)]
    Fatal(ConnectionError),
}

impl PollGap {
    const fn retryable(&self) -> bool {
        !matches!(self, Self::Fatal(_))
    }
}

fn terminal(signature: Signature, status: SignatureStatus) -> ConfirmedTransaction {
    ConfirmedTransaction { signature, slot: status.slot, err: status.err }
}

/// Waits for one pushed status change from `connection`.
pub(crate) async fn watch_push(
    connection: Arc<dyn ProviderConnection>,
    provider: usize,
    signature: Signature,
    commitment: Commitment,
) -> Option<ConfirmedTransaction> {
    let subscription = match connection.subscribe_signature(signature, commitment).await {
        Ok(subscription) => subscription,
        Err(ConnectionError::PubsubUnavailable) => {
            debug!(provider, url = connection.url(), "push channel unsupported, relying on polling");
            return None;
        }
        Err(error) => {
            warn!(provider, url = connection.url(), error = %error, "signature subscription failed");
            return None;
        }
    };

    let status = subscription.recv().await?;
    info!(
        provider,
        slot = status.slot,
        sig = %short_signature(&signature),
        "confirmation pushed by provider"
    );
    Some(terminal(signature, status))
}

/// Polls `connection` for a terminal status with exponential backoff.
///
/// "Not found yet" and a status below the requested commitment are
/// retryable; non-transient transport faults end the channel. Retrying
/// also stops once `halt` is cancelled, so an externally finished engine
/// does not keep issuing status calls.
pub(crate) async fn watch_poll(
    connection: Arc<dyn ProviderConnection>,
    provider: usize,
    signature: Signature,
    options: ConfirmationOptions,
    policy: RetryPolicy,
    halt: CancellationToken,
) -> Option<ConfirmedTransaction> {
    let backoff = ExponentialBuilder::default()
        .with_min_delay(policy.poll_min_delay)
        .with_max_delay(policy.poll_max_delay)
        .with_max_times(policy.poll_attempts());

    let requested = options.commitment;
    let search_history = options.search_transaction_history;

    let poll = || async {
        match connection.get_signature_status(signature, search_history).await {
            Ok(Some(status)) if status.satisfies(requested) => Ok(status),
            Ok(Some(_)) => Err(PollGap::BelowCommitment),
            Ok(None) => Err(PollGap::NotFound),
            Err(error) if error.is_transient() => Err(PollGap::Transient(error)),
            Err(error) => Err(PollGap::Fatal(error)),
        }
    };

    let outcome = poll
        .retry(backoff)
        .sleep(tokio::time::sleep)
        .when(|gap: &PollGap| gap.retryable() && !halt.is_cancelled())
        .notify(|gap: &PollGap, delay: Duration| {
            debug!(
                provider,
                sig = %short_signature(&signature),
                error = %gap,
                delay_ms = delay.as_millis() as u64,
                "status not terminal, polling again"
            );
        })
        .await;

    match outcome {
        Ok(status) => {
            info!(
                provider,
                slot = status.slot,
                sig = %short_signature(&signature),
                "confirmation observed by polling"
            );
            Some(terminal(signature, status))
        }
        Err(gap) => {
            debug!(
                provider,
                sig = %short_signature(&signature),
                error = %gap,
                "polling channel ended without a confirmation"
            );
            None
        }
    }
}

/// Resolves once the chain height passes `expiry_height`.
///
/// Sleeps proportionally to the distance from expiry, capped at
/// [`EXPIRY_PROBE_CAP`]: far from expiry there is no point probing often.
pub(crate) async fn watch_expiry(
    connections: &[Arc<dyn ProviderConnection>],
    expiry_height: u64,
    commitment: Commitment,
) {
    loop {
        match fetch_max_block_height(connections, commitment).await {
            Ok(height) if height > expiry_height => {
                warn!(height, expiry_height, "chain height passed expiry");
                return;
            }
            Ok(height) => {
                let blocks_remaining = expiry_height.saturating_sub(height);
                let proportional = NOMINAL_BLOCK_TIME
                    .saturating_mul(u32::try_from(blocks_remaining).unwrap_or(u32::MAX));
                let wait = proportional.clamp(NOMINAL_BLOCK_TIME, EXPIRY_PROBE_CAP);
                debug!(
                    height,
                    expiry_height,
                    wait_ms = wait.as_millis() as u64,
                    "expiry watchdog sleeping"
                );
                tokio::time::sleep(wait).await;
            }
            Err(error) => {
                debug!(error = %error, "expiry watchdog could not sample chain height");
                tokio::time::sleep(EXPIRY_PROBE_CAP).await;
            }
        }
    }
}
