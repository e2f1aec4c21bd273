//! Storage seams for block progress and listings.
//!
//! Backends live in `spaceindex-storage` (memory, SQLite, Postgres). Every
//! method is a single atomic write or read against its store, so concurrent
//! readers never see a listing whose `valid` flag disagrees with its `height`.

use async_trait::async_trait;

use crate::error::IndexerError;
use crate::types::{BlockRecord, Listing};

/// Append-only log of synced blocks.
///
/// Entries superseded by a reorg are flagged orphaned rather than deleted;
/// every query below only sees live (non-orphaned) entries.
#[async_trait]
pub trait BlockStore: Send + Sync {
    /// Highest live height, or `None` if nothing has been synced.
    async fn max_height(&self) -> Result<Option<u64>, IndexerError>;

    /// Hash of the live block at `height`.
    async fn hash_at(&self, height: u64) -> Result<Option<Vec<u8>>, IndexerError>;

    /// The live block with the highest height.
    async fn latest_block(&self) -> Result<Option<BlockRecord>, IndexerError>;

    /// Insert the block, or overwrite the hash of the live entry at that height.
    async fn upsert_block(&self, height: u64, hash: &[u8]) -> Result<(), IndexerError>;

    /// Flag every live block above `height` as orphaned (`None` = all of them).
    ///
    /// Returns the number of entries flagged.
    async fn mark_orphaned_above(&self, height: Option<u64>) -> Result<u64, IndexerError>;
}

/// Listings keyed by signature.
#[async_trait]
pub trait ListingStore: Send + Sync {
    /// Every listing on record for a canonical name, valid or not.
    async fn listings_by_name(&self, name: &str) -> Result<Vec<Listing>, IndexerError>;

    /// Cheapest currently valid listing for a canonical name.
    async fn valid_listing(&self, name: &str) -> Result<Option<Listing>, IndexerError>;

    /// The cheapest valid listing of every name, newest `timestamp` first
    /// (ties by name), at most `limit` of them.
    async fn latest_listings(&self, limit: u64) -> Result<Vec<Listing>, IndexerError>;

    /// Set `valid` and `height` together for the listing with `signature`.
    async fn update_validity(
        &self,
        signature: &[u8],
        valid: bool,
        height: u64,
    ) -> Result<(), IndexerError>;

    /// Insert a listing, replacing any existing listing with the same signature.
    async fn insert_listing(&self, listing: &Listing) -> Result<(), IndexerError>;
}
