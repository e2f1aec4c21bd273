//! spaceindex-core — reorg-aware sync engine for the spaces listing marketplace.
//!
//! # Architecture
//!
//! ```text
//! SyncLoop (one pass per tick)
//!     ├── HeadResolver        (walk back to the deepest matching block, orphan the rest)
//!     ├── BlockReplayer       (head+1 ..= tip, touched names per block, commit per height)
//!     │     └── ListingRevalidator (oracle call per listing, persist valid + height)
//!     ├── ChainClient         (tip, block meta, verification oracle)
//!     └── BlockStore / ListingStore (memory / SQLite / Postgres)
//!
//! MarketService               (listing lookup, listing submission, health)
//! ```

pub mod builder;
pub mod chain;
pub mod error;
pub mod indexer;
pub mod market;
pub mod reorg;
pub mod replay;
pub mod revalidate;
pub mod store;
pub mod sync;
pub mod types;

pub use builder::IndexerBuilder;
pub use chain::{ChainClient, Verification};
pub use error::IndexerError;
pub use indexer::{IndexerConfig, SyncState};
pub use market::{HealthReport, MarketService, NewListing, DEFAULT_LISTINGS_LIMIT};
pub use reorg::{HeadResolver, ReorgEvent, Resolution};
pub use replay::{BlockReplayer, ReplayReport};
pub use revalidate::{ListingRevalidator, RevalidationReport};
pub use store::{BlockStore, ListingStore};
pub use sync::{PassReport, SyncLoop};
pub use types::{
    display_space_name, normalize_space_name, BlockMeta, BlockRecord, BlockRef, ChainTip, Listing,
    TxChanges,
};
