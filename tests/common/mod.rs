#![allow(dead_code)]

//! Scripted provider connection shared by the integration tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use solana_hash::Hash;
use solana_signature::Signature;
use tokio::sync::oneshot;
use tx_lander::connection::{ConnectionError, ProviderConnection, SignatureSubscription};
use tx_lander::{BlockhashInfo, Commitment, SendOptions, SignatureStatus};

/// Deterministic signature for assertions.
pub fn test_signature(seed: u8) -> Signature {
    Signature::from([seed; 64])
}

/// Status at `confirmed` commitment.
pub fn confirmed_status(slot: u64) -> SignatureStatus {
    SignatureStatus {
        slot,
        confirmations: Some(12),
        confirmation_status: Some(Commitment::Confirmed),
        err: None,
    }
}

/// Status still below `confirmed` commitment.
pub fn pending_status(slot: u64) -> SignatureStatus {
    SignatureStatus {
        slot,
        confirmations: Some(0),
        confirmation_status: Some(Commitment::Processed),
        err: None,
    }
}

/// Blockhash info with a deterministic hash per expiry height.
pub fn blockhash_info(expiry_height: u64) -> BlockhashInfo {
    let mut seed = [0_u8; 32];
    seed[..8].copy_from_slice(&expiry_height.to_le_bytes());
    BlockhashInfo { blockhash: Hash::new_from_array(seed), last_valid_block_height: expiry_height }
}

/// Provider connection driven entirely by per-method scripts.
///
/// Scripted responses are consumed front to back; once a script runs dry
/// the method falls back to its default. Every method counts its calls so
/// tests can assert what did (and did not) touch the network.
pub struct MockConnection {
    url: String,
    delay: Duration,
    send_script: Mutex<VecDeque<Result<Signature, ConnectionError>>>,
    send_default: Result<Signature, ConnectionError>,
    status_script: Mutex<VecDeque<Result<Option<SignatureStatus>, ConnectionError>>>,
    status_default: Result<Option<SignatureStatus>, ConnectionError>,
    push_status: Mutex<Option<SignatureStatus>>,
    blockhash: Result<BlockhashInfo, ConnectionError>,
    height_script: Mutex<VecDeque<u64>>,
    height_default: Result<u64, ConnectionError>,
    send_calls: AtomicUsize,
    status_calls: AtomicUsize,
    subscribe_calls: AtomicUsize,
    unsubscribe_calls: Arc<AtomicUsize>,
}

impl MockConnection {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            delay: Duration::ZERO,
            send_script: Mutex::new(VecDeque::new()),
            send_default: Ok(test_signature(1)),
            status_script: Mutex::new(VecDeque::new()),
            status_default: Ok(None),
            push_status: Mutex::new(None),
            blockhash: Err(ConnectionError::Unavailable("unscripted blockhash".into())),
            height_script: Mutex::new(VecDeque::new()),
            height_default: Err(ConnectionError::Unavailable("unscripted height".into())),
            send_calls: AtomicUsize::new(0),
            status_calls: AtomicUsize::new(0),
            subscribe_calls: AtomicUsize::new(0),
            unsubscribe_calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Sleeps this long before answering any call.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Queues one broadcast response.
    pub fn script_send(self, result: Result<Signature, ConnectionError>) -> Self {
        self.send_script.lock().unwrap().push_back(result);
        self
    }

    /// Broadcast response once the script runs dry.
    pub fn with_send_default(mut self, result: Result<Signature, ConnectionError>) -> Self {
        self.send_default = result;
        self
    }

    /// Queues one status response.
    pub fn script_status(self, result: Result<Option<SignatureStatus>, ConnectionError>) -> Self {
        self.status_script.lock().unwrap().push_back(result);
        self
    }

    /// Status response once the script runs dry.
    pub fn with_status_default(
        mut self,
        result: Result<Option<SignatureStatus>, ConnectionError>,
    ) -> Self {
        self.status_default = result;
        self
    }

    /// Makes the next subscription deliver `status` immediately.
    pub fn with_push_status(self, status: SignatureStatus) -> Self {
        *self.push_status.lock().unwrap() = Some(status);
        self
    }

    /// Fixed blockhash response.
    pub fn with_blockhash(mut self, info: BlockhashInfo) -> Self {
        self.blockhash = Ok(info);
        self
    }

    /// Fixed block-height response.
    pub fn with_height(mut self, height: u64) -> Self {
        self.height_default = Ok(height);
        self
    }

    /// Queues block heights returned before falling back to the default.
    pub fn script_heights(self, heights: impl IntoIterator<Item = u64>) -> Self {
        self.height_script.lock().unwrap().extend(heights);
        self
    }

    pub fn send_calls(&self) -> usize {
        self.send_calls.load(Ordering::SeqCst)
    }

    pub fn status_calls(&self) -> usize {
        self.status_calls.load(Ordering::SeqCst)
    }

    pub fn subscribe_calls(&self) -> usize {
        self.subscribe_calls.load(Ordering::SeqCst)
    }

    pub fn unsubscribe_calls(&self) -> usize {
        self.unsubscribe_calls.load(Ordering::SeqCst)
    }

    async fn pause(&self) {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
    }
}

#[async_trait]
impl ProviderConnection for MockConnection {
    fn url(&self) -> &str {
        &self.url
    }

    async fn send_raw_transaction(
        &self,
        _wire: &[u8],
        _options: &SendOptions,
    ) -> Result<Signature, ConnectionError> {
        self.send_calls.fetch_add(1, Ordering::SeqCst);
        self.pause().await;
        let scripted = self.send_script.lock().unwrap().pop_front();
        scripted.unwrap_or_else(|| self.send_default.clone())
    }

    async fn get_signature_status(
        &self,
        _signature: Signature,
        _search_history: bool,
    ) -> Result<Option<SignatureStatus>, ConnectionError> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        self.pause().await;
        let scripted = self.status_script.lock().unwrap().pop_front();
        scripted.unwrap_or_else(|| self.status_default.clone())
    }

    async fn subscribe_signature(
        &self,
        _signature: Signature,
        _commitment: Commitment,
    ) -> Result<SignatureSubscription, ConnectionError> {
        self.subscribe_calls.fetch_add(1, Ordering::SeqCst);
        self.pause().await;
        let Some(status) = self.push_status.lock().unwrap().take() else {
            return Err(ConnectionError::PubsubUnavailable);
        };
        let (sender, receiver) = oneshot::channel();
        let _ = sender.send(status);
        let unsubscribes = self.unsubscribe_calls.clone();
        Ok(SignatureSubscription::new(receiver, move || {
            unsubscribes.fetch_add(1, Ordering::SeqCst);
        }))
    }

    async fn get_latest_blockhash(
        &self,
        _commitment: Commitment,
    ) -> Result<BlockhashInfo, ConnectionError> {
        self.pause().await;
        self.blockhash.clone()
    }

    async fn get_block_height(&self, _commitment: Commitment) -> Result<u64, ConnectionError> {
        self.pause().await;
        let scripted = self.height_script.lock().unwrap().pop_front();
        scripted.map_or_else(|| self.height_default.clone(), Ok)
    }
}
