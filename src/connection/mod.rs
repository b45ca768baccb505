//! Provider connection surface.
//!
//! [`ProviderConnection`] is the capability set the engine expects from an
//! RPC endpoint: broadcasting raw transaction bytes, reporting signature
//! statuses, pushing status-change notifications, and serving the latest
//! blockhash and block height. Connections are supplied by the caller and
//! held behind `Arc<dyn ProviderConnection>`; the engine never creates or
//! destroys them.
//!
//! [`HttpConnection`] is a JSON-RPC-over-HTTP implementation of the trait.
//! HTTP endpoints cannot push, so its [`subscribe_signature`] reports
//! [`ConnectionError::PubsubUnavailable`] and the engine falls back to the
//! polling channel for that provider.
//!
//! [`subscribe_signature`]: ProviderConnection::subscribe_signature

mod http;

use async_trait::async_trait;
use solana_signature::Signature;
use thiserror::Error;
use tokio::sync::oneshot;

pub use http::HttpConnection;

use crate::types::{BlockhashInfo, Commitment, SendOptions, SignatureStatus};

/// Transport-level errors reported by provider connections.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConnectionError {
    /// The request did not complete in time.
    #[error("request timed out")]
    Timeout,

    /// The endpoint reported it cannot currently serve requests.
    #[error("service unavailable: {0}")]
    Unavailable(String),

    /// The endpoint refused the connection.
    #[error("connection refused: {0}")]
    Refused(String),

    /// The connection has no push-notification channel.
    #[error("push notifications are not supported by this connection")]
    PubsubUnavailable,

    /// The endpoint answered with a JSON-RPC error object.
    #[error("rpc error {code}: {message}")]
    Rpc {
        /// JSON-RPC error code.
        code: i64,
        /// Human-readable message.
        message: String,
    },

    /// The endpoint answered with a payload that could not be decoded.
    #[error("malformed response: {0}")]
    MalformedResponse(String),

    /// Any other transport failure.
    #[error("transport error: {0}")]
    Transport(String),

    /// Every eligible endpoint failed with a transient fault.
    #[error("no provider could serve {method} across {attempted} endpoints")]
    Exhausted {
        /// Wire name of the failed method.
        method: &'static str,
        /// Endpoints that were actually tried.
        attempted: usize,
    },
}

impl ConnectionError {
    /// Whether retrying the same call elsewhere could succeed.
    ///
    /// Protocol-level faults are deliberately non-transient: retrying a
    /// request the endpoint rejected as invalid would only mask the bug.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Timeout | Self::Unavailable(_) | Self::Refused(_))
    }
}

/// One-shot handle for a pushed signature status change.
///
/// Dropping the handle unregisters the underlying listener, so a losing
/// subscription in a confirmation race cleans itself up.
pub struct SignatureSubscription {
    receiver: oneshot::Receiver<SignatureStatus>,
    unsubscribe: Option<Box<dyn FnOnce() + Send>>,
}

impl SignatureSubscription {
    /// Wraps a receiver together with an unsubscribe hook.
    #[must_use]
    pub fn new(
        receiver: oneshot::Receiver<SignatureStatus>,
        unsubscribe: impl FnOnce() + Send + 'static,
    ) -> Self {
        Self { receiver, unsubscribe: Some(Box::new(unsubscribe)) }
    }

    /// Wraps a receiver with no server-side listener to tear down.
    #[must_use]
    pub fn without_unsubscribe(receiver: oneshot::Receiver<SignatureStatus>) -> Self {
        Self { receiver, unsubscribe: None }
    }

    /// Waits for the pushed status. `None` if the provider dropped the
    /// subscription without ever delivering one.
    pub async fn recv(mut self) -> Option<SignatureStatus> {
        (&mut self.receiver).await.ok()
    }
}

impl Drop for SignatureSubscription {
    fn drop(&mut self) {
        if let Some(unsubscribe) = self.unsubscribe.take() {
            unsubscribe();
        }
    }
}

impl std::fmt::Debug for SignatureSubscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignatureSubscription")
            .field("registered", &self.unsubscribe.is_some())
            .finish_non_exhaustive()
    }
}

/// Capability set of one RPC provider endpoint.
#[async_trait]
pub trait ProviderConnection: Send + Sync {
    /// Endpoint address, used for duplicate detection and log context.
    fn url(&self) -> &str;

    /// Submits raw transaction bytes and returns the reported signature.
    async fn send_raw_transaction(
        &self,
        wire: &[u8],
        options: &SendOptions,
    ) -> Result<Signature, ConnectionError>;

    /// Returns the current status of a signature, `None` while unknown.
    async fn get_signature_status(
        &self,
        signature: Signature,
        search_history: bool,
    ) -> Result<Option<SignatureStatus>, ConnectionError>;

    /// Registers for one status-change notification at the given level.
    async fn subscribe_signature(
        &self,
        signature: Signature,
        commitment: Commitment,
    ) -> Result<SignatureSubscription, ConnectionError>;

    /// Returns the latest blockhash together with its expiry height.
    async fn get_latest_blockhash(
        &self,
        commitment: Commitment,
    ) -> Result<BlockhashInfo, ConnectionError>;

    /// Returns the current block height.
    async fn get_block_height(&self, commitment: Commitment) -> Result<u64, ConnectionError>;
}
