//! Shared configuration and result types.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use solana_hash::Hash;
use solana_signature::Signature;

/// Default total deadline for one send-and-confirm cycle.
pub const DEFAULT_CONFIRM_DEADLINE: Duration = Duration::from_secs(60);
/// Default interval between rebroadcasts of the same transaction.
pub const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_secs(2);
/// Default starting delay of the polling confirmation channel.
pub const DEFAULT_POLL_MIN_DELAY: Duration = Duration::from_millis(400);
/// Default delay cap of the polling confirmation channel.
pub const DEFAULT_POLL_MAX_DELAY: Duration = Duration::from_secs(5);

/// Nominal time one block takes to be produced, used to scale expiry probes.
pub const NOMINAL_BLOCK_TIME: Duration = Duration::from_millis(400);
/// Upper bound on the sleep between two expiry-watchdog height probes.
pub const EXPIRY_PROBE_CAP: Duration = Duration::from_secs(5);

/// Consistency level requested from providers.
///
/// Ordered from weakest to strongest, so levels can be compared directly:
/// a status at [`Commitment::Finalized`] satisfies a request for
/// [`Commitment::Confirmed`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Commitment {
    /// Observed by the node, may still be dropped.
    Processed,
    /// Voted on by a supermajority.
    #[default]
    Confirmed,
    /// Rooted, cannot be rolled back.
    Finalized,
}

impl Commitment {
    /// Wire name of the commitment level.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Processed => "processed",
            Self::Confirmed => "confirmed",
            Self::Finalized => "finalized",
        }
    }
}

impl std::fmt::Display for Commitment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable confirmation configuration, created once per engine.
#[derive(Debug, Clone)]
pub struct ConfirmationOptions {
    /// Consistency level a status must reach to resolve the race.
    pub commitment: Commitment,
    /// Skip pre-flight simulation when broadcasting.
    pub skip_preflight: bool,
    /// Disable the push-notification confirmation channel entirely.
    pub disable_push_channel: bool,
    /// Ask providers to search full transaction history when polling.
    pub search_transaction_history: bool,
}

impl Default for ConfirmationOptions {
    fn default() -> Self {
        Self {
            commitment: Commitment::Confirmed,
            skip_preflight: true,
            disable_push_channel: false,
            search_transaction_history: false,
        }
    }
}

impl ConfirmationOptions {
    /// Broadcast options derived from this configuration.
    #[must_use]
    pub const fn send_options(&self) -> SendOptions {
        SendOptions {
            skip_preflight: self.skip_preflight,
            preflight_commitment: Some(self.commitment),
        }
    }
}

/// Per-broadcast tuning passed to provider connections.
#[derive(Debug, Clone, Copy)]
pub struct SendOptions {
    /// Skip pre-flight simulation.
    pub skip_preflight: bool,
    /// Commitment used for pre-flight when it is not skipped.
    pub preflight_commitment: Option<Commitment>,
}

impl Default for SendOptions {
    fn default() -> Self {
        Self { skip_preflight: true, preflight_commitment: None }
    }
}

/// Deadline, rebroadcast and backoff tuning, fixed at engine construction.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total deadline for the whole send-and-confirm cycle.
    pub deadline: Duration,
    /// Sleep between rebroadcasts.
    pub retry_interval: Duration,
    /// Starting delay of the polling channel's exponential backoff.
    pub poll_min_delay: Duration,
    /// Delay cap of the polling channel's exponential backoff.
    pub poll_max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            deadline: DEFAULT_CONFIRM_DEADLINE,
            retry_interval: DEFAULT_RETRY_INTERVAL,
            poll_min_delay: DEFAULT_POLL_MIN_DELAY,
            poll_max_delay: DEFAULT_POLL_MAX_DELAY,
        }
    }
}

impl RetryPolicy {
    /// Number of polling attempts the deadline affords at the retry interval.
    #[must_use]
    pub fn poll_attempts(&self) -> usize {
        let interval = self.retry_interval.as_millis().max(1);
        usize::try_from((self.deadline.as_millis() / interval).max(1)).unwrap_or(usize::MAX)
    }
}

/// Status of a signature as reported by one provider.
#[derive(Debug, Clone, PartialEq)]
pub struct SignatureStatus {
    /// Slot the transaction was processed in.
    pub slot: u64,
    /// Confirmation count, `None` once rooted.
    pub confirmations: Option<u64>,
    /// Highest commitment the provider reports for the signature.
    pub confirmation_status: Option<Commitment>,
    /// On-chain execution error, if the transaction landed but failed.
    pub err: Option<serde_json::Value>,
}

impl SignatureStatus {
    /// Whether this status is terminal for a confirmation at `requested`.
    ///
    /// A status carrying an execution error is always terminal. Providers
    /// that predate `confirmationStatus` report only a confirmation count,
    /// where `None` means rooted.
    #[must_use]
    pub fn satisfies(&self, requested: Commitment) -> bool {
        if self.err.is_some() {
            return true;
        }
        match self.confirmation_status {
            Some(reached) => reached >= requested,
            None => self.confirmations.is_none(),
        }
    }
}

/// Latest reference blockhash together with its expiry height.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockhashInfo {
    /// Reference hash to stamp into a transaction.
    pub blockhash: Hash,
    /// Last block height at which a transaction using the hash can land.
    pub last_valid_block_height: u64,
}

/// Outcome of a confirmed transaction.
///
/// `err` carries an on-chain execution failure; the transaction still
/// landed, which is distinct from any transport-level failure.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfirmedTransaction {
    /// Signature that was confirmed.
    pub signature: Signature,
    /// Slot the confirmation was observed at.
    pub slot: u64,
    /// On-chain execution error, `None` for a successful execution.
    pub err: Option<serde_json::Value>,
}

/// Truncated signature rendering for log lines.
pub(crate) fn short_signature(signature: &Signature) -> String {
    let mut rendered = signature.to_string();
    rendered.truncate(8);
    rendered
}
