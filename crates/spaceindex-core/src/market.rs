//! Read/write surface consumed by the marketplace API.
//!
//! Looks up the current listing for a space, accepts new listings (validated
//! at this boundary, then stored as valid until the next revalidation), and
//! reports indexer health against the chain tip.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::chain::{ChainClient, Verification};
use crate::error::IndexerError;
use crate::store::{BlockStore, ListingStore};
use crate::types::{normalize_space_name, Listing};

/// Number of listings `MarketService::listings` returns when no limit is given.
pub const DEFAULT_LISTINGS_LIMIT: u64 = 9;

/// A listing as posted by a seller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewListing {
    /// Space name, with or without the `@` sigil.
    pub space: String,
    /// Signed so that a negative price reaches validation instead of failing
    /// deserialization.
    pub price: i64,
    pub seller: String,
    /// Hex-encoded signature.
    pub signature: String,
}

/// Locally synced head next to the node's tip.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthReport {
    /// Highest synced height, `None` before the first commit.
    pub height: Option<u64>,
    /// Hash of the synced head (hex).
    pub hash: Option<String>,
    pub chain_height: u64,
    /// Hash of the chain tip (hex).
    pub chain_hash: String,
}

impl HealthReport {
    /// How many blocks the indexer is behind the chain.
    pub fn lag(&self) -> u64 {
        match self.height {
            Some(h) => self.chain_height.saturating_sub(h),
            None => self.chain_height + 1,
        }
    }
}

/// Listing queries, listing submission and health status.
pub struct MarketService {
    chain: Arc<dyn ChainClient>,
    blocks: Arc<dyn BlockStore>,
    listings: Arc<dyn ListingStore>,
}

impl MarketService {
    pub fn new(
        chain: Arc<dyn ChainClient>,
        blocks: Arc<dyn BlockStore>,
        listings: Arc<dyn ListingStore>,
    ) -> Self {
        Self {
            chain,
            blocks,
            listings,
        }
    }

    /// Cheapest currently valid listing for `name` (`@alice` or `alice`).
    pub async fn listing(&self, name: &str) -> Result<Listing, IndexerError> {
        let name = normalize_space_name(name);
        if name.is_empty() {
            return Err(IndexerError::invalid_listing("name is required"));
        }
        self.listings
            .valid_listing(name)
            .await?
            .ok_or_else(|| IndexerError::NotFound(format!("no listing found for @{name}")))
    }

    /// The cheapest valid listing of each space, newest first.
    ///
    /// `None` or `Some(0)` falls back to [`DEFAULT_LISTINGS_LIMIT`].
    pub async fn listings(&self, limit: Option<u64>) -> Result<Vec<Listing>, IndexerError> {
        let limit = match limit {
            Some(n) if n > 0 => n,
            _ => DEFAULT_LISTINGS_LIMIT,
        };
        let found = self.listings.latest_listings(limit).await?;
        if found.is_empty() {
            return Err(IndexerError::NotFound("no listings found".into()));
        }
        Ok(found)
    }

    /// Validate, verify and store a new listing.
    ///
    /// The listing starts out valid at the current synced height; the sync
    /// loop re-checks it whenever its space is touched.
    pub async fn post_listing(&self, new: NewListing) -> Result<Listing, IndexerError> {
        let mut listing = check_new_listing(&new)?;

        match self
            .chain
            .verify_listing(&listing.name, &listing.seller, &listing.signature, listing.price)
            .await
        {
            Verification::Valid => {}
            Verification::Invalid { reason } => {
                return Err(IndexerError::ListingRejected { reason });
            }
            Verification::Unavailable(err) => return Err(err),
        }

        listing.height = self.blocks.max_height().await?.unwrap_or(0);
        listing.timestamp = chrono::Utc::now().timestamp();
        self.listings.insert_listing(&listing).await?;

        tracing::info!(
            name = %listing.name,
            price = listing.price,
            height = listing.height,
            "listing stored"
        );
        Ok(listing)
    }

    pub async fn health(&self) -> Result<HealthReport, IndexerError> {
        let synced = self.blocks.latest_block().await?;
        let tip = self.chain.tip().await?;
        Ok(HealthReport {
            height: synced.as_ref().map(|b| b.height),
            hash: synced.as_ref().map(|b| b.hash_hex()),
            chain_height: tip.height,
            chain_hash: hex::encode(&tip.hash),
        })
    }
}

/// Write-boundary checks; nothing that fails here reaches the store.
fn check_new_listing(new: &NewListing) -> Result<Listing, IndexerError> {
    let name = normalize_space_name(new.space.trim());
    if name.is_empty() {
        return Err(IndexerError::invalid_listing("space is required"));
    }
    if new.seller.trim().is_empty() {
        return Err(IndexerError::invalid_listing("seller is required"));
    }
    let price = u64::try_from(new.price)
        .map_err(|_| IndexerError::invalid_listing("price must not be negative"))?;
    let signature = hex::decode(new.signature.trim().trim_start_matches("0x"))
        .map_err(|e| IndexerError::invalid_listing(format!("invalid signature format: {e}")))?;
    if signature.is_empty() {
        return Err(IndexerError::invalid_listing("signature is required"));
    }

    Ok(Listing {
        name: name.to_string(),
        price,
        seller: new.seller.trim().to_string(),
        signature,
        timestamp: 0,
        height: 0,
        valid: true,
    })
}
