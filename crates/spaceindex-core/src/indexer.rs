//! Indexer configuration and state types.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::IndexerError;

/// Configuration for a sync loop instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexerConfig {
    /// First height to replay when no block has been synced yet.
    pub from_height: u64,
    /// Delay between two successful passes (milliseconds).
    pub poll_interval_ms: u64,
    /// Delay before retrying after a failed pass (milliseconds).
    pub retry_delay_ms: u64,
    /// How many touched names of one height may be revalidated concurrently.
    pub max_concurrent_names: usize,
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            from_height: 0,
            poll_interval_ms: 10_000,
            retry_delay_ms: 1_000,
            max_concurrent_names: 4,
        }
    }
}

impl IndexerConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    /// Reject settings the sync loop cannot run with.
    pub fn validate(&self) -> Result<(), IndexerError> {
        if self.poll_interval_ms == 0 {
            return Err(IndexerError::Config("poll_interval_ms must be > 0".into()));
        }
        if self.max_concurrent_names == 0 {
            return Err(IndexerError::Config(
                "max_concurrent_names must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

/// Runtime state of the sync loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncState {
    /// Waiting for the next tick.
    Idle,
    /// Looking for the synced head.
    Resolving,
    /// Replaying blocks and revalidating listings.
    Replaying,
    /// Waiting out the retry delay after a failed pass.
    BackingOff,
    /// Shut down.
    Stopped,
}

impl SyncState {
    /// `true` while a pass is in progress.
    pub fn is_busy(&self) -> bool {
        matches!(self, Self::Resolving | Self::Replaying)
    }
}

impl std::fmt::Display for SyncState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Resolving => write!(f, "resolving"),
            Self::Replaying => write!(f, "replaying"),
            Self::BackingOff => write!(f, "backing-off"),
            Self::Stopped => write!(f, "stopped"),
        }
    }
}
