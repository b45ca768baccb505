//! Failover routing across an ordered list of provider connections.
//!
//! [`FailoverConnection`] wraps N connections behind a single logical
//! [`ProviderConnection`](crate::connection::ProviderConnection). For the
//! configured set of eligible [`RpcMethod`]s, a transient fault on one
//! endpoint (timeout, service-unavailable, connection-refused) advances
//! the call to the next endpoint in order; any other fault propagates
//! immediately so protocol errors are never masked. Methods outside the
//! eligible set pass straight through to the primary endpoint, which
//! keeps side-effecting calls out of retry logic they do not expect.
//!
//! Per-endpoint blacklists route around providers known to mis-implement
//! a specific method.
//!
//! # Examples
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tx_lander::connection::{HttpConnection, ProviderConnection};
//! use tx_lander::failover::FailoverConnectionBuilder;
//!
//! # fn example() -> Result<(), tx_lander::connection::ConnectionError> {
//! let primary = Arc::new(HttpConnection::new("https://api.mainnet-beta.solana.com")?);
//! let backup = Arc::new(HttpConnection::new("https://solana.example-rpc.com")?);
//!
//! let connection: Arc<dyn ProviderConnection> = Arc::new(
//!     FailoverConnectionBuilder::new(primary)
//!         .fallback(backup)
//!         .build(),
//! );
//! # Ok(()) }
//! ```

mod builder;
mod connection;

pub use builder::{DEFAULT_CALL_TIMEOUT, FailoverConnectionBuilder, default_eligible_methods};
pub use connection::{FailoverConnection, RpcMethod};
