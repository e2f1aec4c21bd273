//! spaceindex-storage — block and listing store backends for SpaceIndex.
//!
//! Backends:
//! - [`memory`] — in-memory (dev/testing, no persistence)
//! - `sqlite` — SQLite via `sqlx` (embedded, single-file persistence)
//! - `postgres` — PostgreSQL via `sqlx` (production)
//!
//! Each backend implements both [`BlockStore`](spaceindex_core::BlockStore)
//! and [`ListingStore`](spaceindex_core::ListingStore).

pub mod memory;

#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(feature = "postgres")]
pub mod postgres;

pub use memory::InMemoryStorage;

/// A block entry superseded by a reorg, kept for audit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrphanedBlock {
    pub height: u64,
    pub hash: Vec<u8>,
    /// Unix timestamp of when head resolution flagged it.
    pub orphaned_at: i64,
}
