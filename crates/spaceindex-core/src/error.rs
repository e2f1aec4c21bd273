//! Error types for the spaceindex pipeline.

use thiserror::Error;

/// Errors that can occur while syncing blocks or serving listings.
#[derive(Debug, Error)]
pub enum IndexerError {
    /// The chain client could not be reached or returned garbage.
    #[error("RPC error: {0}")]
    Rpc(String),

    #[error("Storage error: {0}")]
    Storage(String),

    /// A listing failed validation at the write boundary.
    #[error("Invalid listing: {reason}")]
    InvalidListing { reason: String },

    /// The verification oracle refused a newly posted listing.
    #[error("Listing rejected: {reason}")]
    ListingRejected { reason: String },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("{0}")]
    Other(String),
}

impl IndexerError {
    /// Returns `true` for transport / unavailability errors.
    ///
    /// These never change persisted state; the sync loop simply retries the
    /// whole pass on its next tick.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Rpc(_) | Self::Storage(_))
    }

    pub(crate) fn invalid_listing(reason: impl Into<String>) -> Self {
        Self::InvalidListing {
            reason: reason.into(),
        }
    }
}
