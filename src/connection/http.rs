//! JSON-RPC-over-HTTP provider connection.

use std::time::Duration;

use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64_STANDARD};
use serde::{Deserialize, de::DeserializeOwned};
use solana_hash::Hash;
use solana_signature::Signature;
use tracing::debug;

use super::{ConnectionError, ProviderConnection, SignatureSubscription};
use crate::types::{BlockhashInfo, Commitment, SendOptions, SignatureStatus};

/// Default per-request timeout of the HTTP client.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Provider connection speaking Solana JSON-RPC over HTTP.
#[derive(Debug, Clone)]
pub struct HttpConnection {
    client: reqwest::Client,
    url: String,
}

impl HttpConnection {
    /// Creates a connection to `url` with the default request timeout.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectionError::Transport`] when the HTTP client cannot
    /// be constructed.
    pub fn new(url: impl Into<String>) -> Result<Self, ConnectionError> {
        Self::with_timeout(url, DEFAULT_REQUEST_TIMEOUT)
    }

    /// Creates a connection with an explicit per-request timeout.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectionError::Transport`] when the HTTP client cannot
    /// be constructed.
    pub fn with_timeout(
        url: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, ConnectionError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|error| ConnectionError::Transport(error.to_string()))?;
        Ok(Self { client, url: url.into() })
    }

    async fn request<R: DeserializeOwned>(
        &self,
        method: &str,
        params: serde_json::Value,
    ) -> Result<R, ConnectionError> {
        let payload = serde_json::json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params,
        });

        let response = self
            .client
            .post(&self.url)
            .json(&payload)
            .send()
            .await
            .map_err(map_transport_error)?
            .error_for_status()
            .map_err(map_transport_error)?;

        let parsed: RpcResponse<R> =
            response.json().await.map_err(|error| {
                ConnectionError::MalformedResponse(error.to_string())
            })?;

        if let Some(error) = parsed.error {
            return Err(ConnectionError::Rpc { code: error.code, message: error.message });
        }
        parsed.result.ok_or_else(|| {
            ConnectionError::MalformedResponse("rpc returned neither result nor error".to_owned())
        })
    }
}

#[async_trait]
impl ProviderConnection for HttpConnection {
    fn url(&self) -> &str {
        &self.url
    }

    async fn send_raw_transaction(
        &self,
        wire: &[u8],
        options: &SendOptions,
    ) -> Result<Signature, ConnectionError> {
        let encoded = BASE64_STANDARD.encode(wire);
        let config = serde_json::json!({
            "encoding": "base64",
            "skipPreflight": options.skip_preflight,
            "preflightCommitment": options.preflight_commitment.map(Commitment::as_str),
        });

        let signature: String =
            self.request("sendTransaction", serde_json::json!([encoded, config])).await?;
        signature
            .parse::<Signature>()
            .map_err(|error| ConnectionError::MalformedResponse(error.to_string()))
    }

    async fn get_signature_status(
        &self,
        signature: Signature,
        search_history: bool,
    ) -> Result<Option<SignatureStatus>, ConnectionError> {
        let params = serde_json::json!([
            [signature.to_string()],
            { "searchTransactionHistory": search_history },
        ]);
        let response: WithContext<Vec<Option<WireSignatureStatus>>> =
            self.request("getSignatureStatuses", params).await?;

        let status = response.value.into_iter().next().flatten();
        Ok(status.map(WireSignatureStatus::into_status))
    }

    async fn subscribe_signature(
        &self,
        signature: Signature,
        _commitment: Commitment,
    ) -> Result<SignatureSubscription, ConnectionError> {
        debug!(
            url = %self.url,
            sig = %crate::types::short_signature(&signature),
            "http connection has no push channel"
        );
        Err(ConnectionError::PubsubUnavailable)
    }

    async fn get_latest_blockhash(
        &self,
        commitment: Commitment,
    ) -> Result<BlockhashInfo, ConnectionError> {
        let params = serde_json::json!([{ "commitment": commitment.as_str() }]);
        let response: WithContext<WireBlockhash> =
            self.request("getLatestBlockhash", params).await?;

        let blockhash = response
            .value
            .blockhash
            .parse::<Hash>()
            .map_err(|error| ConnectionError::MalformedResponse(error.to_string()))?;
        Ok(BlockhashInfo {
            blockhash,
            last_valid_block_height: response.value.last_valid_block_height,
        })
    }

    async fn get_block_height(&self, commitment: Commitment) -> Result<u64, ConnectionError> {
        let params = serde_json::json!([{ "commitment": commitment.as_str() }]);
        self.request("getBlockHeight", params).await
    }
}

fn map_transport_error(error: reqwest::Error) -> ConnectionError {
    if error.is_timeout() {
        ConnectionError::Timeout
    } else if error.is_connect() {
        ConnectionError::Refused(error.to_string())
    } else if error.status() == Some(reqwest::StatusCode::SERVICE_UNAVAILABLE) {
        ConnectionError::Unavailable(error.to_string())
    } else {
        ConnectionError::Transport(error.to_string())
    }
}

#[derive(Debug, Deserialize)]
struct RpcResponse<R> {
    result: Option<R>,
    error: Option<RpcErrorObject>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorObject {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
struct WithContext<V> {
    value: V,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireSignatureStatus {
    slot: u64,
    confirmations: Option<u64>,
    confirmation_status: Option<Commitment>,
    err: Option<serde_json::Value>,
}

impl WireSignatureStatus {
    fn into_status(self) -> SignatureStatus {
        SignatureStatus {
            slot: self.slot,
            confirmations: self.confirmations,
            confirmation_status: self.confirmation_status,
            err: self.err,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireBlockhash {
    blockhash: String,
    last_valid_block_height: u64,
}
