//! spaceindex-rpc — JSON-RPC transport and spaces node client for SpaceIndex.
//!
//! # Overview
//!
//! - [`RpcTransport`] — async trait every transport implements
//! - [`HttpRpcClient`] — `reqwest` transport with basic auth and retry
//! - [`SpacesClient`] — typed node client; implements
//!   [`ChainClient`](spaceindex_core::ChainClient)
//! - [`TransportError`] — structured error type, convertible into
//!   [`IndexerError`](spaceindex_core::IndexerError)
//!
//! ```rust,no_run
//! use spaceindex_rpc::{HttpClientConfig, HttpRpcClient, SpacesClient};
//!
//! # fn example() -> Result<(), spaceindex_rpc::TransportError> {
//! let config = HttpClientConfig::default().with_basic_auth("test", "test");
//! let node = SpacesClient::new(HttpRpcClient::new("http://127.0.0.1:7225", config)?);
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod http;
pub mod request;
pub mod retry;
pub mod spaces;
pub mod transport;

pub use error::TransportError;
pub use http::{BasicAuth, HttpClientConfig, HttpRpcClient};
pub use request::{JsonRpcError, JsonRpcRequest, JsonRpcResponse, RpcId};
pub use retry::{RetryConfig, RetryPolicy};
pub use spaces::{ListingPayload, ServerInfo, SpacesClient};
pub use transport::RpcTransport;
