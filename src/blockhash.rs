//! Blockhash and block-height acquisition across providers.
//!
//! Every query fans out to all providers through
//! [`settle_within`](crate::settle::settle_within). When no provider
//! answers inside the current window, the window doubles (capped) and the
//! round repeats, bounded by [`MAX_QUERY_ROUNDS`].
//!
//! Among the answers received, [`fetch_latest_blockhash`] selects the one
//! with the **largest expiry height**, not the first to arrive: a lagging
//! provider can answer quickly yet carry an older hash, and expiry-based
//! cancellation is only sound against the freshest expiry observed.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::connection::ProviderConnection;
use crate::error::SenderError;
use crate::settle::settle_within;
use crate::types::{BlockhashInfo, Commitment};

/// First settle window for a query round.
pub const INITIAL_QUERY_TIMEOUT: Duration = Duration::from_secs(2);
/// Cap on the doubled settle window.
pub const MAX_QUERY_TIMEOUT: Duration = Duration::from_secs(16);
/// Query rounds attempted before giving up.
pub const MAX_QUERY_ROUNDS: u32 = 5;

/// Fetches the latest blockhash, selecting by largest expiry height.
///
/// # Errors
///
/// Returns [`SenderError::BlockhashUnavailable`] when no provider answers
/// within any query round.
pub async fn fetch_latest_blockhash(
    connections: &[Arc<dyn ProviderConnection>],
    commitment: Commitment,
) -> Result<BlockhashInfo, SenderError> {
    let mut window = INITIAL_QUERY_TIMEOUT;
    for round in 0..MAX_QUERY_ROUNDS {
        let queries = connections.iter().cloned().map(|connection| async move {
            connection.get_latest_blockhash(commitment).await
        });
        let answers = settle_within(queries, window).await;

        if let Some(best) = answers.into_iter().max_by_key(|info| info.last_valid_block_height) {
            debug!(
                expiry_height = best.last_valid_block_height,
                round, "selected blockhash with largest expiry height"
            );
            return Ok(best);
        }

        window = (window * 2).min(MAX_QUERY_TIMEOUT);
        warn!(
            round,
            next_window_ms = window.as_millis() as u64,
            "no provider returned a blockhash, widening settle window"
        );
    }
    Err(SenderError::BlockhashUnavailable { rounds: MAX_QUERY_ROUNDS })
}

/// Fetches the maximum block height any provider currently reports.
///
/// Same concurrent-query-with-backoff shape as
/// [`fetch_latest_blockhash`]; used by the expiry watchdog.
///
/// # Errors
///
/// Returns [`SenderError::BlockHeightUnavailable`] when no provider
/// answers within any query round.
pub async fn fetch_max_block_height(
    connections: &[Arc<dyn ProviderConnection>],
    commitment: Commitment,
) -> Result<u64, SenderError> {
    let mut window = INITIAL_QUERY_TIMEOUT;
    for round in 0..MAX_QUERY_ROUNDS {
        let queries = connections
            .iter()
            .cloned()
            .map(|connection| async move { connection.get_block_height(commitment).await });
        let answers = settle_within(queries, window).await;

        if let Some(highest) = answers.into_iter().max() {
            return Ok(highest);
        }

        window = (window * 2).min(MAX_QUERY_TIMEOUT);
        debug!(
            round,
            next_window_ms = window.as_millis() as u64,
            "no provider returned a block height, widening settle window"
        );
    }
    Err(SenderError::BlockHeightUnavailable { rounds: MAX_QUERY_ROUNDS })
}
