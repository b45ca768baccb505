use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, Weak};
use std::time::Instant;

use solana_signature::Signature;
use solana_transaction::versioned::VersionedTransaction;
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::confirm;
use crate::connection::ProviderConnection;
use crate::error::SenderError;
use crate::types::{
    ConfirmationOptions, ConfirmedTransaction, RetryPolicy, SendOptions, short_signature,
};

/// Broadcast-and-confirmation engine for one in-flight transaction.
///
/// [`send`](Self::send) serializes the transaction once, broadcasts it on
/// the primary connection (a rejection there fails immediately), fires it
/// best-effort at every additional connection, and spawns a rebroadcast
/// loop that keeps resending until the engine is done or the deadline
/// passes. [`try_confirm`](Self::try_confirm) races push and poll
/// confirmation channels per provider, a hard deadline, and an optional
/// block-height expiry watchdog, then caches the terminal outcome: at
/// most one non-cancelled confirmation is ever recorded, and repeated
/// calls return the cached value without touching the network.
///
/// The engine holds references to caller-supplied connections and never
/// creates or destroys them. All state transitions are forward-only:
/// once `done`, an engine never becomes live again.
pub struct RetrySender {
    inner: Arc<Inner>,
}

struct Inner {
    connections: RwLock<Vec<Arc<dyn ProviderConnection>>>,
    options: ConfirmationOptions,
    policy: RetryPolicy,
    done: AtomicBool,
    halt: CancellationToken,
    state: Mutex<FlightState>,
}

#[derive(Default)]
struct FlightState {
    signature: Option<Signature>,
    /// Set while a `send` is between its guard and its stored signature.
    broadcasting: bool,
    sent_at: Option<Instant>,
    result: Option<ConfirmedTransaction>,
    rebroadcast: Option<JoinHandle<()>>,
}

impl Inner {
    fn lock_state(&self) -> MutexGuard<'_, FlightState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn snapshot(&self) -> Vec<Arc<dyn ProviderConnection>> {
        self.connections.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Forward-only transition; also releases every pending sleep.
    fn mark_done(&self) {
        self.done.store(true, Ordering::Release);
        self.halt.cancel();
    }
}

impl RetrySender {
    /// Creates an engine over `connections` with default options and policy.
    ///
    /// The first connection is the primary; the rest receive advisory
    /// broadcasts and extra confirmation channels.
    ///
    /// # Errors
    ///
    /// Returns [`SenderError::NoConnections`] for an empty list.
    pub fn new(connections: Vec<Arc<dyn ProviderConnection>>) -> Result<Self, SenderError> {
        Self::with_config(connections, ConfirmationOptions::default(), RetryPolicy::default())
    }

    /// Creates an engine with explicit confirmation options and retry policy.
    ///
    /// # Errors
    ///
    /// Returns [`SenderError::NoConnections`] for an empty list.
    pub fn with_config(
        connections: Vec<Arc<dyn ProviderConnection>>,
        options: ConfirmationOptions,
        policy: RetryPolicy,
    ) -> Result<Self, SenderError> {
        if connections.is_empty() {
            return Err(SenderError::NoConnections);
        }
        Ok(Self {
            inner: Arc::new(Inner {
                connections: RwLock::new(connections),
                options,
                policy,
                done: AtomicBool::new(false),
                halt: CancellationToken::new(),
                state: Mutex::new(FlightState::default()),
            }),
        })
    }

    /// Appends another provider connection, ignoring duplicate endpoints.
    ///
    /// Returns whether the connection was added.
    pub fn add_connection(&self, connection: Arc<dyn ProviderConnection>) -> bool {
        let mut connections =
            self.inner.connections.write().unwrap_or_else(PoisonError::into_inner);
        if connections.iter().any(|existing| existing.url() == connection.url()) {
            debug!(url = connection.url(), "duplicate endpoint ignored");
            return false;
        }
        connections.push(connection);
        true
    }

    /// Number of provider connections currently held.
    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.inner.connections.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Signature being tracked, once known.
    #[must_use]
    pub fn signature(&self) -> Option<Signature> {
        self.inner.lock_state().signature
    }

    /// Whether the engine reached a terminal state.
    #[must_use]
    pub fn is_done(&self) -> bool {
        self.inner.done.load(Ordering::Acquire)
    }

    /// Marks the engine done and releases every pending sleep promptly.
    ///
    /// Cancellation is cooperative: RPC calls already in flight are not
    /// aborted at the transport level, but no new work starts and a
    /// pending [`try_confirm`](Self::try_confirm) unwinds with a
    /// not-confirmed error.
    pub fn cancel(&self) {
        info!("cancellation requested");
        self.inner.mark_done();
    }

    /// Adopts an externally produced signature for confirmation tracking.
    ///
    /// Validates that the string decodes to exactly 64 bytes of base58
    /// before anything touches the network.
    ///
    /// # Errors
    ///
    /// [`SenderError::InvalidSignature`] for a malformed string and
    /// [`SenderError::AlreadySent`] when the engine already tracks one.
    pub fn track_signature(&self, signature: &str) -> Result<Signature, SenderError> {
        let signature = signature
            .parse::<Signature>()
            .map_err(|error| SenderError::InvalidSignature { message: error.to_string() })?;
        let mut state = self.inner.lock_state();
        if state.signature.is_some() || state.broadcasting {
            return Err(SenderError::AlreadySent);
        }
        state.signature = Some(signature);
        state.sent_at = Some(Instant::now());
        Ok(signature)
    }

    /// Broadcasts `transaction` and starts the background rebroadcast loop.
    ///
    /// The transaction is serialized exactly once. A rejection on the
    /// primary connection fails the call immediately and no retry loop is
    /// started. The call returns as soon as the primary accepted the
    /// broadcast; advisory broadcasts to additional connections run in
    /// the background with failures logged and swallowed. Confirmation
    /// is a separate, subsequent call.
    ///
    /// # Errors
    ///
    /// [`SenderError::AlreadySent`] on a second call,
    /// [`SenderError::Serialize`] when encoding fails, and
    /// [`SenderError::Send`] when the primary rejects the broadcast.
    pub async fn send(
        &self,
        transaction: &VersionedTransaction,
    ) -> Result<Signature, SenderError> {
        {
            let mut state = self.inner.lock_state();
            if state.signature.is_some() || state.broadcasting {
                return Err(SenderError::AlreadySent);
            }
            // Reserve the in-flight slot before the first await so a
            // concurrent send cannot pass the guard.
            state.broadcasting = true;
        }
        match self.broadcast(transaction).await {
            Ok(signature) => Ok(signature),
            Err(error) => {
                self.inner.lock_state().broadcasting = false;
                Err(error)
            }
        }
    }

    async fn broadcast(
        &self,
        transaction: &VersionedTransaction,
    ) -> Result<Signature, SenderError> {
        let wire: Arc<[u8]> = bincode::serialize(transaction)?.into();
        let connections = self.inner.snapshot();
        let send_options = self.inner.options.send_options();

        let primary = connections[0].clone();
        let signature = primary
            .send_raw_transaction(&wire, &send_options)
            .await
            .map_err(SenderError::Send)?;
        info!(
            sig = %short_signature(&signature),
            url = primary.url(),
            "transaction broadcast"
        );
        spawn_advisory(connections[1..].to_vec(), wire.clone(), send_options, signature);

        let handle = spawn_rebroadcast(
            Arc::downgrade(&self.inner),
            self.inner.halt.clone(),
            wire,
            send_options,
            self.inner.policy.clone(),
            signature,
        );

        let mut state = self.inner.lock_state();
        state.signature = Some(signature);
        state.sent_at = Some(Instant::now());
        state.rebroadcast = Some(handle);
        Ok(signature)
    }

    /// Waits until the tracked transaction is confirmed, expired, timed
    /// out, or cancelled, using the engine's confirmation options.
    ///
    /// See [`try_confirm_with`](Self::try_confirm_with).
    ///
    /// # Errors
    ///
    /// See [`try_confirm_with`](Self::try_confirm_with).
    pub async fn try_confirm(
        &self,
        expiry_height: Option<u64>,
    ) -> Result<ConfirmedTransaction, SenderError> {
        self.try_confirm_with(expiry_height, None).await
    }

    /// Waits for a terminal confirmation outcome, overriding the engine
    /// options for this call when `options` is supplied.
    ///
    /// Opens a push and a poll channel per provider (push skipped when
    /// disabled or unsupported) and races them against the deadline and,
    /// when `expiry_height` is given, the expiry watchdog. The first
    /// terminal status wins; losing push subscriptions are unregistered.
    /// An on-chain execution error is returned as a successful result
    /// with [`err`](ConfirmedTransaction::err) set, never as an `Err`.
    ///
    /// Idempotent after resolution: the cached result is returned without
    /// any further network calls. Whatever the outcome, the engine is
    /// marked done so the rebroadcast loop stops on its next wake.
    ///
    /// # Errors
    ///
    /// [`SenderError::NotSent`] before `send`/`track_signature`, and
    /// [`SenderError::NotConfirmed`] when no channel produced a terminal
    /// status before the deadline, the expiry, or cancellation.
    pub async fn try_confirm_with(
        &self,
        expiry_height: Option<u64>,
        options: Option<&ConfirmationOptions>,
    ) -> Result<ConfirmedTransaction, SenderError> {
        if let Some(result) = self.inner.lock_state().result.clone() {
            return Ok(result);
        }
        let signature = self.inner.lock_state().signature.ok_or(SenderError::NotSent)?;
        let options = options.cloned().unwrap_or_else(|| self.inner.options.clone());
        let connections = self.inner.snapshot();
        let policy = self.inner.policy.clone();
        let started = Instant::now();

        let mut watchers = JoinSet::new();
        for (provider, connection) in connections.iter().enumerate() {
            if !options.disable_push_channel {
                watchers.spawn(confirm::watch_push(
                    connection.clone(),
                    provider,
                    signature,
                    options.commitment,
                ));
            }
            watchers.spawn(confirm::watch_poll(
                connection.clone(),
                provider,
                signature,
                options.clone(),
                policy.clone(),
                self.inner.halt.clone(),
            ));
        }

        let watchdog_connections = connections.clone();
        let commitment = options.commitment;
        let watchdog = async move {
            match expiry_height {
                Some(expiry) => {
                    confirm::watch_expiry(&watchdog_connections, expiry, commitment).await;
                }
                None => std::future::pending::<()>().await,
            }
        };
        tokio::pin!(watchdog);
        let deadline = tokio::time::sleep(policy.deadline);
        tokio::pin!(deadline);

        let mut outcome = None;
        loop {
            tokio::select! {
                () = &mut deadline => {
                    warn!(
                        sig = %short_signature(&signature),
                        deadline_ms = policy.deadline.as_millis() as u64,
                        "confirmation deadline elapsed"
                    );
                    break;
                }
                () = self.inner.halt.cancelled() => {
                    debug!(sig = %short_signature(&signature), "confirmation race released");
                    break;
                }
                () = &mut watchdog => {
                    warn!(
                        sig = %short_signature(&signature),
                        expiry_height = expiry_height.unwrap_or_default(),
                        "transaction expired before confirmation"
                    );
                    break;
                }
                joined = watchers.join_next() => match joined {
                    None => break,
                    Some(Ok(Some(result))) => {
                        outcome = Some(result);
                        break;
                    }
                    Some(Ok(None)) => {}
                    Some(Err(join_error)) => {
                        debug!(error = %join_error, "confirmation watcher stopped");
                    }
                },
            }
        }
        // Dropping the set aborts losing watchers; their subscriptions
        // unregister on drop.
        watchers.abort_all();
        drop(watchers);

        let elapsed = started.elapsed();

        match outcome {
            Some(result) => {
                info!(
                    sig = %short_signature(&result.signature),
                    slot = result.slot,
                    elapsed_ms = elapsed.as_millis() as u64,
                    on_chain_err = result.err.is_some(),
                    "transaction confirmed"
                );
                // Cache before releasing the race so a concurrent caller
                // woken by the cancellation finds the result.
                let result = {
                    let mut state = self.inner.lock_state();
                    state.result.get_or_insert(result).clone()
                };
                self.inner.mark_done();
                Ok(result)
            }
            None => {
                self.inner.mark_done();
                // A concurrent caller may have resolved the race while
                // this one was unwinding.
                if let Some(result) = self.inner.lock_state().result.clone() {
                    return Ok(result);
                }
                Err(SenderError::NotConfirmed { elapsed })
            }
        }
    }
}

impl Drop for RetrySender {
    fn drop(&mut self) {
        // No background work outlives the engine.
        self.inner.halt.cancel();
        if let Some(handle) = self.inner.lock_state().rebroadcast.take() {
            handle.abort();
        }
    }
}

impl std::fmt::Debug for RetrySender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetrySender")
            .field("connections", &self.connection_count())
            .field("done", &self.is_done())
            .field("signature", &self.signature())
            .finish_non_exhaustive()
    }
}

/// Fires `wire` at every connection from a spawned task, best-effort:
/// failures are logged with their provider index and swallowed, and a
/// slow endpoint never gates the primary path.
fn spawn_advisory(
    connections: Vec<Arc<dyn ProviderConnection>>,
    wire: Arc<[u8]>,
    options: SendOptions,
    signature: Signature,
) {
    if connections.is_empty() {
        return;
    }
    tokio::spawn(async move {
        let wire = &wire;
        let sends = connections.iter().enumerate().map(|(index, connection)| async move {
            if let Err(err) = connection.send_raw_transaction(wire, &options).await {
                warn!(
                    provider = index + 1,
                    url = connection.url(),
                    sig = %short_signature(&signature),
                    error = %err,
                    "advisory broadcast failed"
                );
            }
        });
        futures_util::future::join_all(sends).await;
    });
}

/// Spawns the background rebroadcast loop.
///
/// The task holds only a weak reference to the engine internals, so the
/// loop winds down once the engine is dropped. A rebroadcast failure on
/// the primary connection is fatal and marks the engine done, so callers
/// are not left waiting past definite failure.
fn spawn_rebroadcast(
    engine: Weak<Inner>,
    halt: CancellationToken,
    wire: Arc<[u8]>,
    options: SendOptions,
    policy: RetryPolicy,
    signature: Signature,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let started = Instant::now();
        loop {
            tokio::select! {
                () = halt.cancelled() => break,
                () = tokio::time::sleep(policy.retry_interval) => {}
            }
            let Some(inner) = engine.upgrade() else { break };
            if inner.done.load(Ordering::Acquire) {
                break;
            }
            if started.elapsed() >= policy.deadline {
                debug!(sig = %short_signature(&signature), "rebroadcast window exhausted");
                break;
            }

            let connections = inner.snapshot();
            let Some((primary, rest)) = connections.split_first() else { break };
            if let Err(err) = primary.send_raw_transaction(&wire, &options).await {
                error!(
                    sig = %short_signature(&signature),
                    url = primary.url(),
                    error = %err,
                    "rebroadcast rejected by primary connection, halting retries"
                );
                inner.mark_done();
                break;
            }
            debug!(
                sig = %short_signature(&signature),
                elapsed_ms = started.elapsed().as_millis() as u64,
                "transaction rebroadcast"
            );
            spawn_advisory(rest.to_vec(), wire.clone(), options, signature);
        }
    })
}
