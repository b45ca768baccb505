use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use solana_signature::Signature;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::connection::{ConnectionError, ProviderConnection, SignatureSubscription};
use crate::types::{BlockhashInfo, Commitment, SendOptions, SignatureStatus};

/// Statically known identity of every remote call the proxy can route.
///
/// Replacing method-name strings with an enum keeps the eligible set and
/// blacklists checkable at compile time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RpcMethod {
    /// Broadcast raw transaction bytes.
    SendTransaction,
    /// Fetch the status of a signature.
    GetSignatureStatuses,
    /// Register for a signature status push.
    SignatureSubscribe,
    /// Fetch the latest blockhash and its expiry height.
    GetLatestBlockhash,
    /// Fetch the current block height.
    GetBlockHeight,
}

impl RpcMethod {
    /// Wire name of the method.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::SendTransaction => "sendTransaction",
            Self::GetSignatureStatuses => "getSignatureStatuses",
            Self::SignatureSubscribe => "signatureSubscribe",
            Self::GetLatestBlockhash => "getLatestBlockhash",
            Self::GetBlockHeight => "getBlockHeight",
        }
    }
}

impl std::fmt::Display for RpcMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Single logical connection routing calls across an ordered endpoint list.
///
/// Stateless between calls: every invocation walks the list from the
/// front, so a recovered primary is preferred again on the next call.
pub struct FailoverConnection {
    pub(crate) connections: Vec<Arc<dyn ProviderConnection>>,
    pub(crate) call_timeout: Duration,
    pub(crate) eligible: HashSet<RpcMethod>,
    pub(crate) blacklist: HashMap<String, HashSet<RpcMethod>>,
}

impl FailoverConnection {
    fn primary(&self) -> &Arc<dyn ProviderConnection> {
        // The builder guarantees at least one connection.
        &self.connections[0]
    }

    fn is_blacklisted(&self, url: &str, method: RpcMethod) -> bool {
        self.blacklist.get(url).is_some_and(|methods| methods.contains(&method))
    }

    /// Routes one call, failing over on transient faults for eligible
    /// methods and passing everything else through to the primary.
    async fn call<T, F, Fut>(&self, method: RpcMethod, operation: F) -> Result<T, ConnectionError>
    where
        F: Fn(Arc<dyn ProviderConnection>) -> Fut,
        Fut: Future<Output = Result<T, ConnectionError>>,
    {
        if !self.eligible.contains(&method) {
            return operation(self.primary().clone()).await;
        }

        let mut attempted = 0usize;
        for (index, connection) in self.connections.iter().enumerate() {
            if self.is_blacklisted(connection.url(), method) {
                debug!(
                    method = %method,
                    provider = index,
                    url = connection.url(),
                    "skipping blacklisted endpoint"
                );
                continue;
            }
            attempted += 1;

            match timeout(self.call_timeout, operation(connection.clone())).await {
                Ok(Ok(value)) => {
                    if index > 0 {
                        info!(method = %method, provider = index, "fallback endpoint succeeded");
                    }
                    return Ok(value);
                }
                Ok(Err(error)) if error.is_transient() => {
                    warn!(
                        method = %method,
                        provider = index,
                        url = connection.url(),
                        error = %error,
                        "transient fault, advancing to next endpoint"
                    );
                }
                Ok(Err(error)) => return Err(error),
                Err(_elapsed) => {
                    warn!(
                        method = %method,
                        provider = index,
                        url = connection.url(),
                        timeout_ms = self.call_timeout.as_millis() as u64,
                        "call timed out, advancing to next endpoint"
                    );
                }
            }
        }

        Err(ConnectionError::Exhausted { method: method.as_str(), attempted })
    }
}

#[async_trait]
impl ProviderConnection for FailoverConnection {
    fn url(&self) -> &str {
        self.primary().url()
    }

    async fn send_raw_transaction(
        &self,
        wire: &[u8],
        options: &SendOptions,
    ) -> Result<Signature, ConnectionError> {
        self.call(RpcMethod::SendTransaction, |connection| async move {
            connection.send_raw_transaction(wire, options).await
        })
        .await
    }

    async fn get_signature_status(
        &self,
        signature: Signature,
        search_history: bool,
    ) -> Result<Option<SignatureStatus>, ConnectionError> {
        self.call(RpcMethod::GetSignatureStatuses, |connection| async move {
            connection.get_signature_status(signature, search_history).await
        })
        .await
    }

    async fn subscribe_signature(
        &self,
        signature: Signature,
        commitment: Commitment,
    ) -> Result<SignatureSubscription, ConnectionError> {
        self.call(RpcMethod::SignatureSubscribe, |connection| async move {
            connection.subscribe_signature(signature, commitment).await
        })
        .await
    }

    async fn get_latest_blockhash(
        &self,
        commitment: Commitment,
    ) -> Result<BlockhashInfo, ConnectionError> {
        self.call(RpcMethod::GetLatestBlockhash, |connection| async move {
            connection.get_latest_blockhash(commitment).await
        })
        .await
    }

    async fn get_block_height(&self, commitment: Commitment) -> Result<u64, ConnectionError> {
        self.call(RpcMethod::GetBlockHeight, |connection| async move {
            connection.get_block_height(commitment).await
        })
        .await
    }
}

impl std::fmt::Debug for FailoverConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FailoverConnection")
            .field("endpoints", &self.connections.len())
            .field("call_timeout", &self.call_timeout)
            .field("eligible", &self.eligible)
            .finish_non_exhaustive()
    }
}
