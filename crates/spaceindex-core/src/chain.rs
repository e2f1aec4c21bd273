//! The chain client seam: tip, block metadata and the listing oracle.

use async_trait::async_trait;

use crate::error::IndexerError;
use crate::types::{BlockMeta, BlockRef, ChainTip};

/// Outcome of asking the node whether a listing currently holds.
#[derive(Debug)]
pub enum Verification {
    /// Signature is valid and the seller controls the space right now.
    Valid,
    /// Bad signature, stale ownership, malformed offer, ...
    Invalid { reason: String },
    /// The oracle could not be consulted; nothing should be persisted.
    Unavailable(IndexerError),
}

impl Verification {
    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Valid)
    }
}

/// Read access to the canonical chain.
///
/// Implementations must be `Send + Sync` so they can be shared across the
/// sync loop and the market service as `Arc<dyn ChainClient>`.
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Current tip height and hash.
    async fn tip(&self) -> Result<ChainTip, IndexerError>;

    /// Block metadata by height or hash.
    ///
    /// Returns `Ok(None)` when the node does not have the block yet; that is
    /// a short read, not a failure.
    async fn block(&self, at: BlockRef) -> Result<Option<BlockMeta>, IndexerError>;

    /// Canonical hash at `height`, or `None` if the chain is not that tall.
    async fn block_hash(&self, height: u64) -> Result<Option<Vec<u8>>, IndexerError> {
        Ok(self.block(BlockRef::Height(height)).await?.map(|b| b.hash))
    }

    /// Ask the oracle whether `seller` holds `name` and signed an offer for
    /// it at `price`.
    async fn verify_listing(
        &self,
        name: &str,
        seller: &str,
        signature: &[u8],
        price: u64,
    ) -> Verification;
}
