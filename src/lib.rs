//! tx-lander is a library for landing Solana transactions: broadcast with
//! retries across multiple RPC providers and race every confirmation
//! channel until the transaction is confirmed or provably cannot land.
//!
//! The main entry point is [`RetrySender`], created over one or more
//! [`ProviderConnection`](connection::ProviderConnection)s. Each sender
//! owns the lifecycle of exactly one transaction: call
//! [`send`](RetrySender::send) (or adopt an external signature with
//! [`track_signature`](RetrySender::track_signature)), then await
//! [`try_confirm`](RetrySender::try_confirm).
//!
//! # Confirmation channels
//!
//! Per provider, a push channel (signature subscription, where the
//! provider supports one) and a polling channel run concurrently. The
//! first terminal status wins. A transaction that landed with an on-chain
//! execution error is a *successful* confirmation whose
//! [`err`](ConfirmedTransaction::err) field is set; `Err` is reserved for
//! "did not land".
//!
//! # Expiry
//!
//! Passing the blockhash's last valid block height to
//! [`try_confirm`](RetrySender::try_confirm) arms a watchdog that gives
//! up as soon as the chain height passes it, well before the wall-clock
//! deadline would fire. Expiry and deadline both surface as
//! [`SenderError::NotConfirmed`].
//!
//! # Failover
//!
//! The [`failover`] module provides
//! [`FailoverConnection`](failover::FailoverConnection), a wrapper that
//! routes idempotent calls across an ordered endpoint list, advancing on
//! transient faults.

pub mod blockhash;
pub mod builder;
pub mod connection;
pub mod failover;
pub mod sender;
pub mod settle;

mod error;
mod types;

pub use builder::TransactionBuilder;
pub use error::SenderError;
pub use sender::RetrySender;
pub use types::{
    BlockhashInfo, Commitment, ConfirmationOptions, ConfirmedTransaction,
    DEFAULT_CONFIRM_DEADLINE, DEFAULT_POLL_MAX_DELAY, DEFAULT_POLL_MIN_DELAY,
    DEFAULT_RETRY_INTERVAL, RetryPolicy, SendOptions, SignatureStatus,
};
