//! Head resolution: find where local block history still agrees with the chain.
//!
//! Walks back from the highest persisted height, comparing the stored hash
//! against the node's hash at the same height. The first match is the synced
//! head; everything persisted above it is flagged orphaned. A divergence
//! deeper than the whole persisted history orphans every block and resyncs
//! from the configured start height.
//!
//! Heights above the observed tip count as diverged (the chain got shorter).
//! A block missing at or below the tip is a node failure and aborts.

use std::sync::Arc;

use crate::chain::ChainClient;
use crate::error::IndexerError;
use crate::store::BlockStore;
use crate::types::BlockRecord;

/// Describes a detected chain reorganization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReorgEvent {
    /// Highest persisted height before resolution.
    pub previous_head: u64,
    /// Deepest common height, `None` when no persisted block matched.
    pub fork_height: Option<u64>,
    /// Number of block entries flagged orphaned.
    pub orphaned: u64,
}

impl ReorgEvent {
    /// Number of heights rolled back.
    pub fn depth(&self) -> u64 {
        match self.fork_height {
            Some(fork) => self.previous_head - fork,
            None => self.orphaned,
        }
    }
}

/// Result of one head resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    /// The synced head, `None` if nothing usable is persisted.
    pub head: Option<BlockRecord>,
    /// Present when blocks had to be orphaned.
    pub reorg: Option<ReorgEvent>,
}

impl Resolution {
    /// First height the replayer should process.
    pub fn next_height(&self, from_height: u64) -> u64 {
        match &self.head {
            Some(head) => head.height + 1,
            None => from_height,
        }
    }
}

/// Finds the deepest block shared by the local store and the canonical chain.
pub struct HeadResolver {
    chain: Arc<dyn ChainClient>,
    blocks: Arc<dyn BlockStore>,
}

impl HeadResolver {
    pub fn new(chain: Arc<dyn ChainClient>, blocks: Arc<dyn BlockStore>) -> Self {
        Self { chain, blocks }
    }

    /// Resolve the synced head against a chain whose tip is at `tip`,
    /// orphaning any persisted blocks above it.
    ///
    /// Any chain or store error aborts resolution unmodified.
    pub async fn resolve(&self, tip: u64) -> Result<Resolution, IndexerError> {
        let Some(top) = self.blocks.max_height().await? else {
            return Ok(Resolution {
                head: None,
                reorg: None,
            });
        };

        let mut height = top;
        // Live blocks are contiguous, so the first gap ends the persisted history.
        while let Some(local) = self.blocks.hash_at(height).await? {
            if self.chain_agrees(height, &local, tip).await? {
                let reorg = if height < top {
                    Some(self.orphan_above(top, Some(height)).await?)
                } else {
                    None
                };
                return Ok(Resolution {
                    head: Some(BlockRecord::new(height, local)),
                    reorg,
                });
            }
            if height == 0 {
                break;
            }
            height -= 1;
        }

        let reorg = self.orphan_above(top, None).await?;
        Ok(Resolution {
            head: None,
            reorg: Some(reorg),
        })
    }

    async fn chain_agrees(&self, height: u64, local: &[u8], tip: u64) -> Result<bool, IndexerError> {
        let remote = self.chain.block_hash(height).await?;
        if remote.as_deref() == Some(local) {
            return Ok(true);
        }
        if remote.is_none() && height <= tip {
            return Err(IndexerError::Rpc(format!(
                "node has no block at height {height} below its tip {tip}"
            )));
        }
        tracing::debug!(
            height,
            local = %hex::encode(local),
            remote = %remote.as_deref().map(hex::encode).unwrap_or_default(),
            "block hash mismatch"
        );
        Ok(false)
    }

    async fn orphan_above(
        &self,
        previous_head: u64,
        fork_height: Option<u64>,
    ) -> Result<ReorgEvent, IndexerError> {
        let orphaned = self.blocks.mark_orphaned_above(fork_height).await?;
        let event = ReorgEvent {
            previous_head,
            fork_height,
            orphaned,
        };
        tracing::warn!(
            previous_head,
            fork_height = ?fork_height,
            depth = event.depth(),
            orphaned,
            "Reorg detected, orphaned stale blocks"
        );
        Ok(event)
    }
}
