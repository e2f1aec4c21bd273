//! Typed client for the spaces node RPC.
//!
//! Wraps any [`RpcTransport`] and implements [`ChainClient`] on top of three
//! node methods:
//!
//! | method           | params                                   | result               |
//! |------------------|------------------------------------------|----------------------|
//! | `getserverinfo`  | none                                     | `{chain, tip}`       |
//! | `getblockmeta`   | height (number) or hash (hex string)     | block hash + tx meta |
//! | `verifylisting`  | `{space, price, seller, signature}`      | `null`, or an error  |

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

use spaceindex_core::chain::{ChainClient, Verification};
use spaceindex_core::error::IndexerError;
use spaceindex_core::types::{display_space_name, BlockMeta, BlockRef, ChainTip, TxChanges};

use crate::error::TransportError;
use crate::request::JsonRpcRequest;
use crate::transport::RpcTransport;

// ─── Wire types ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct ServerInfo {
    #[serde(default)]
    pub chain: String,
    pub tip: TipInfo,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TipInfo {
    pub hash: String,
    pub height: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BlockMetaResponse {
    #[serde(default)]
    pub height: Option<u64>,
    pub hash: String,
    #[serde(default, alias = "tx_meta")]
    pub transactions: Vec<TxMeta>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TxMeta {
    #[serde(default)]
    pub creates: Vec<NamedOutput>,
    #[serde(default)]
    pub updates: Vec<SpaceUpdate>,
    #[serde(default)]
    pub spends: Vec<SpaceSpend>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NamedOutput {
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SpaceUpdate {
    pub output: NamedOutput,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SpaceSpend {
    #[serde(default)]
    pub script_error: Option<NamedOutput>,
}

impl From<TxMeta> for TxChanges {
    fn from(tx: TxMeta) -> Self {
        TxChanges {
            creates: tx.creates.into_iter().map(|c| c.name).collect(),
            updates: tx.updates.into_iter().map(|u| u.output.name).collect(),
            rejected_claims: tx
                .spends
                .into_iter()
                .filter_map(|s| s.script_error.map(|e| e.name))
                .collect(),
        }
    }
}

/// Payload of `verifylisting`. The space carries its `@` sigil.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ListingPayload {
    pub space: String,
    pub price: u64,
    pub seller: String,
    pub signature: String,
}

fn decode_hash(hash: &str) -> Result<Vec<u8>, TransportError> {
    hex::decode(hash).map_err(|e| TransportError::Other(format!("invalid block hash {hash:?}: {e}")))
}

// ─── SpacesClient ────────────────────────────────────────────────────────────

/// Spaces node client over a JSON-RPC transport.
pub struct SpacesClient<T> {
    transport: T,
    next_id: AtomicU64,
}

impl<T: RpcTransport> SpacesClient<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            next_id: AtomicU64::new(1),
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    fn id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    pub async fn server_info(&self) -> Result<ServerInfo, TransportError> {
        self.transport.call(self.id(), "getserverinfo", vec![]).await
    }

    /// `getblockmeta`; an application error or a `null` result means the
    /// block is not available. Reserved protocol/server errors are failures.
    pub async fn block_meta(&self, at: &BlockRef) -> Result<Option<BlockMetaResponse>, TransportError> {
        let param = match at {
            BlockRef::Height(h) => json!(h),
            BlockRef::Hash(hash) => json!(hex::encode(hash)),
        };
        let resp = self
            .transport
            .send(JsonRpcRequest::new(self.id(), "getblockmeta", vec![param]))
            .await?;

        match resp.into_result() {
            Ok(Value::Null) => Ok(None),
            Ok(value) => Ok(Some(serde_json::from_value(value)?)),
            Err(err) if err.is_reserved() => Err(TransportError::Rpc(err)),
            Err(err) => {
                debug!(block = %at, code = err.code, message = %err.message, "block not available");
                Ok(None)
            }
        }
    }

    /// `verifylisting`; `Ok(())` when the node accepts the listing.
    pub async fn verify(&self, listing: &ListingPayload) -> Result<(), TransportError> {
        let params = vec![serde_json::to_value(listing)?];
        let resp = self
            .transport
            .send(JsonRpcRequest::new(self.id(), "verifylisting", params))
            .await?;
        resp.into_result().map(|_| ()).map_err(TransportError::Rpc)
    }
}

#[async_trait]
impl<T: RpcTransport> ChainClient for SpacesClient<T> {
    async fn tip(&self) -> Result<ChainTip, IndexerError> {
        let info = self.server_info().await?;
        Ok(ChainTip {
            height: info.tip.height,
            hash: decode_hash(&info.tip.hash)?,
        })
    }

    async fn block(&self, at: BlockRef) -> Result<Option<BlockMeta>, IndexerError> {
        let Some(meta) = self.block_meta(&at).await? else {
            return Ok(None);
        };
        let height = match (meta.height, &at) {
            (Some(h), _) => h,
            (None, BlockRef::Height(h)) => *h,
            (None, BlockRef::Hash(_)) => {
                return Err(IndexerError::Rpc(format!("block meta for {at} has no height")));
            }
        };
        Ok(Some(BlockMeta {
            height,
            hash: decode_hash(&meta.hash)?,
            transactions: meta.transactions.into_iter().map(TxChanges::from).collect(),
        }))
    }

    async fn verify_listing(
        &self,
        name: &str,
        seller: &str,
        signature: &[u8],
        price: u64,
    ) -> Verification {
        let payload = ListingPayload {
            space: display_space_name(name),
            price,
            seller: seller.to_string(),
            signature: hex::encode(signature),
        };
        match self.verify(&payload).await {
            Ok(()) => Verification::Valid,
            Err(TransportError::Rpc(err)) if !err.is_reserved() => Verification::Invalid {
                reason: err.message,
            },
            Err(e) => {
                debug!(space = %payload.space, error = %e, "listing oracle unavailable");
                Verification::Unavailable(e.into())
            }
        }
    }
}
