use std::time::Duration;

use solana_signer::SignerError;
use thiserror::Error;

use crate::connection::ConnectionError;

/// Errors surfaced by the sender engine and its helpers.
///
/// On-chain execution failures are never represented here: a transaction
/// that landed with an error is a successful confirmation whose
/// [`err`](crate::ConfirmedTransaction::err) field is set.
#[derive(Error, Debug)]
pub enum SenderError {
    /// `try_confirm` was called before `send` or `track_signature`.
    #[error("no transaction has been sent yet")]
    NotSent,

    /// The engine already tracks an in-flight transaction.
    #[error("a transaction is already in flight on this sender")]
    AlreadySent,

    /// A caller-supplied signature did not decode to 64 bytes of base58.
    #[error("invalid signature: {message}")]
    InvalidSignature {
        /// Parse failure description.
        message: String,
    },

    /// The engine was constructed without any provider connection.
    #[error("at least one provider connection is required")]
    NoConnections,

    /// The initial broadcast on the primary connection was rejected.
    #[error("initial send failed: {0}")]
    Send(#[source] ConnectionError),

    /// The transaction could not be serialized to wire bytes.
    #[error("failed to serialize transaction: {0}")]
    Serialize(#[from] bincode::Error),

    /// Signer validation or signing failed while building a transaction.
    #[error("failed to sign transaction: {0}")]
    Sign(#[from] SignerError),

    /// No provider returned a recent blockhash within the retry budget.
    #[error("no provider returned a recent blockhash after {rounds} rounds")]
    BlockhashUnavailable {
        /// Query rounds attempted before giving up.
        rounds: u32,
    },

    /// No provider returned a block height within the retry budget.
    #[error("no provider returned a block height after {rounds} rounds")]
    BlockHeightUnavailable {
        /// Query rounds attempted before giving up.
        rounds: u32,
    },

    /// No confirmation channel produced a terminal status in time.
    ///
    /// Raised both on the plain deadline and when the expiry watchdog
    /// declares the transaction unconfirmable.
    #[error("transaction was not confirmed in {:.2} seconds", .elapsed.as_secs_f64())]
    NotConfirmed {
        /// Time spent waiting for a confirmation.
        elapsed: Duration,
    },

    /// A provider connection failed outside the send path.
    #[error(transparent)]
    Connection(#[from] ConnectionError),
}
