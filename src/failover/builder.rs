use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use super::connection::{FailoverConnection, RpcMethod};
use crate::connection::ProviderConnection;

/// Default per-call timeout before advancing to the next endpoint.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(10);

/// Methods that fail over by default.
///
/// All of them are idempotent reads. `sendTransaction` and
/// `signatureSubscribe` are deliberately absent so that side-effecting
/// and stateful calls stay pinned to the primary endpoint unless a
/// caller opts them in explicitly.
#[must_use]
pub fn default_eligible_methods() -> HashSet<RpcMethod> {
    HashSet::from([
        RpcMethod::GetSignatureStatuses,
        RpcMethod::GetLatestBlockhash,
        RpcMethod::GetBlockHeight,
    ])
}

/// Builder for a [`FailoverConnection`].
pub struct FailoverConnectionBuilder {
    connections: Vec<Arc<dyn ProviderConnection>>,
    call_timeout: Duration,
    eligible: HashSet<RpcMethod>,
    blacklist: HashMap<String, HashSet<RpcMethod>>,
}

impl FailoverConnectionBuilder {
    /// Starts a builder with `primary` as the first endpoint in order.
    #[must_use]
    pub fn new(primary: Arc<dyn ProviderConnection>) -> Self {
        Self {
            connections: vec![primary],
            call_timeout: DEFAULT_CALL_TIMEOUT,
            eligible: default_eligible_methods(),
            blacklist: HashMap::new(),
        }
    }

    /// Appends a fallback endpoint, tried after everything added before it.
    #[must_use]
    pub fn fallback(mut self, connection: Arc<dyn ProviderConnection>) -> Self {
        self.connections.push(connection);
        self
    }

    /// Sets the per-call timeout before advancing to the next endpoint.
    #[must_use]
    pub const fn call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    /// Replaces the set of failover-eligible methods.
    #[must_use]
    pub fn eligible_methods(mut self, methods: impl IntoIterator<Item = RpcMethod>) -> Self {
        self.eligible = methods.into_iter().collect();
        self
    }

    /// Never routes `method` to the endpoint at `url`.
    ///
    /// Used to route around providers known to mis-implement a call.
    #[must_use]
    pub fn blacklist(mut self, url: impl Into<String>, method: RpcMethod) -> Self {
        self.blacklist.entry(url.into()).or_default().insert(method);
        self
    }

    /// Final builder method: consumes the builder and returns the
    /// assembled [`FailoverConnection`].
    #[must_use]
    pub fn build(self) -> FailoverConnection {
        debug!(
            endpoints = self.connections.len(),
            call_timeout_ms = self.call_timeout.as_millis() as u64,
            eligible = self.eligible.len(),
            blacklisted_endpoints = self.blacklist.len(),
            "building failover connection"
        );
        FailoverConnection {
            connections: self.connections,
            call_timeout: self.call_timeout,
            eligible: self.eligible,
            blacklist: self.blacklist,
        }
    }
}
