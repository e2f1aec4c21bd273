//! Fluent builder API for sync loop configuration.
//!
//! # Example
//!
//! ```rust
//! use spaceindex_core::IndexerBuilder;
//!
//! let config = IndexerBuilder::new()
//!     .from_height(840_000)
//!     .poll_interval_ms(5_000)
//!     .max_concurrent_names(8)
//!     .build_config();
//! assert_eq!(config.from_height, 840_000);
//! ```

use crate::indexer::IndexerConfig;

/// Fluent builder for `IndexerConfig`.
#[derive(Debug, Default)]
pub struct IndexerBuilder {
    config: IndexerConfig,
}

impl IndexerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// First height to replay on an empty block store.
    pub fn from_height(mut self, height: u64) -> Self {
        self.config.from_height = height;
        self
    }

    /// Delay between successful passes, in milliseconds.
    pub fn poll_interval_ms(mut self, ms: u64) -> Self {
        self.config.poll_interval_ms = ms;
        self
    }

    /// Backoff after a failed pass, in milliseconds.
    pub fn retry_delay_ms(mut self, ms: u64) -> Self {
        self.config.retry_delay_ms = ms;
        self
    }

    pub fn max_concurrent_names(mut self, n: usize) -> Self {
        self.config.max_concurrent_names = n;
        self
    }

    pub fn build_config(self) -> IndexerConfig {
        self.config
    }
}
