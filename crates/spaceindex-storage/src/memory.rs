//! In-memory storage backend.
//!
//! Keeps the block log and listings in RAM. Useful for tests and for
//! short-lived indexers that don't need persistence.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};

use spaceindex_core::error::IndexerError;
use spaceindex_core::store::{BlockStore, ListingStore};
use spaceindex_core::types::{BlockRecord, Listing};

use crate::OrphanedBlock;

#[derive(Debug, Clone)]
struct BlockEntry {
    height: u64,
    hash: Vec<u8>,
    orphaned_at: Option<i64>,
}

#[derive(Default)]
struct BlockLog {
    /// Every entry ever written, in insertion order.
    entries: Vec<BlockEntry>,
    /// Live height → index into `entries`.
    live: BTreeMap<u64, usize>,
}

/// In-memory block and listing storage.
///
/// All data is lost when the process exits.
#[derive(Default)]
pub struct InMemoryStorage {
    blocks: Mutex<BlockLog>,
    listings: Mutex<HashMap<Vec<u8>, Listing>>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Blocks flagged orphaned by head resolution, oldest write first.
    pub fn orphaned_blocks(&self) -> Result<Vec<OrphanedBlock>, IndexerError> {
        Ok(self
            .block_log()?
            .entries
            .iter()
            .filter_map(|e| {
                e.orphaned_at.map(|at| OrphanedBlock {
                    height: e.height,
                    hash: e.hash.clone(),
                    orphaned_at: at,
                })
            })
            .collect())
    }

    /// Every live block, ascending by height.
    pub fn live_blocks(&self) -> Result<Vec<BlockRecord>, IndexerError> {
        let log = self.block_log()?;
        Ok(log
            .live
            .values()
            .map(|&i| BlockRecord::new(log.entries[i].height, log.entries[i].hash.clone()))
            .collect())
    }

    /// Look up a listing by signature.
    pub fn listing(&self, signature: &[u8]) -> Result<Option<Listing>, IndexerError> {
        Ok(self.listing_map()?.get(signature).cloned())
    }

    /// Total number of listings, valid or not.
    pub fn listing_count(&self) -> Result<usize, IndexerError> {
        Ok(self.listing_map()?.len())
    }

    fn block_log(&self) -> Result<MutexGuard<'_, BlockLog>, IndexerError> {
        self.blocks
            .lock()
            .map_err(|_| IndexerError::Storage("block log lock poisoned".into()))
    }

    fn listing_map(&self) -> Result<MutexGuard<'_, HashMap<Vec<u8>, Listing>>, IndexerError> {
        self.listings
            .lock()
            .map_err(|_| IndexerError::Storage("listing table lock poisoned".into()))
    }
}

#[async_trait]
impl BlockStore for InMemoryStorage {
    async fn max_height(&self) -> Result<Option<u64>, IndexerError> {
        Ok(self.block_log()?.live.keys().next_back().copied())
    }

    async fn hash_at(&self, height: u64) -> Result<Option<Vec<u8>>, IndexerError> {
        let log = self.block_log()?;
        Ok(log.live.get(&height).map(|&i| log.entries[i].hash.clone()))
    }

    async fn latest_block(&self) -> Result<Option<BlockRecord>, IndexerError> {
        let log = self.block_log()?;
        Ok(log
            .live
            .values()
            .next_back()
            .map(|&i| BlockRecord::new(log.entries[i].height, log.entries[i].hash.clone())))
    }

    async fn upsert_block(&self, height: u64, hash: &[u8]) -> Result<(), IndexerError> {
        let mut log = self.block_log()?;
        match log.live.get(&height).copied() {
            Some(i) => log.entries[i].hash = hash.to_vec(),
            None => {
                log.entries.push(BlockEntry {
                    height,
                    hash: hash.to_vec(),
                    orphaned_at: None,
                });
                let i = log.entries.len() - 1;
                log.live.insert(height, i);
            }
        }
        Ok(())
    }

    async fn mark_orphaned_above(&self, height: Option<u64>) -> Result<u64, IndexerError> {
        let mut log = self.block_log()?;
        let stale = match height {
            Some(h) => log.live.split_off(&(h + 1)),
            None => std::mem::take(&mut log.live),
        };
        let now = chrono::Utc::now().timestamp();
        for &i in stale.values() {
            log.entries[i].orphaned_at = Some(now);
        }
        Ok(stale.len() as u64)
    }
}

#[async_trait]
impl ListingStore for InMemoryStorage {
    async fn listings_by_name(&self, name: &str) -> Result<Vec<Listing>, IndexerError> {
        let mut found: Vec<_> = self
            .listing_map()?
            .values()
            .filter(|l| l.name == name)
            .cloned()
            .collect();
        found.sort_by(|a, b| a.price.cmp(&b.price).then_with(|| a.signature.cmp(&b.signature)));
        Ok(found)
    }

    async fn valid_listing(&self, name: &str) -> Result<Option<Listing>, IndexerError> {
        Ok(self
            .listings_by_name(name)
            .await?
            .into_iter()
            .find(|l| l.valid))
    }

    async fn latest_listings(&self, limit: u64) -> Result<Vec<Listing>, IndexerError> {
        let mut cheapest: BTreeMap<String, Listing> = BTreeMap::new();
        for listing in self.listing_map()?.values().filter(|l| l.valid) {
            let replace = match cheapest.get(&listing.name) {
                Some(best) => {
                    (listing.price, &listing.signature) < (best.price, &best.signature)
                }
                None => true,
            };
            if replace {
                cheapest.insert(listing.name.clone(), listing.clone());
            }
        }

        let mut found: Vec<_> = cheapest.into_values().collect();
        found.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then_with(|| a.name.cmp(&b.name)));
        found.truncate(usize::try_from(limit).unwrap_or(usize::MAX));
        Ok(found)
    }

    async fn update_validity(
        &self,
        signature: &[u8],
        valid: bool,
        height: u64,
    ) -> Result<(), IndexerError> {
        if let Some(listing) = self.listing_map()?.get_mut(signature) {
            listing.valid = valid;
            listing.height = height;
        }
        Ok(())
    }

    async fn insert_listing(&self, listing: &Listing) -> Result<(), IndexerError> {
        self.listing_map()?
            .insert(listing.signature.clone(), listing.clone());
        Ok(())
    }
}
