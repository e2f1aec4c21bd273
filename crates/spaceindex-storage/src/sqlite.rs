//! SQLite storage backend for SpaceIndex.
//!
//! Persists the block log and listings to a single SQLite file.
//! Uses `sqlx` with WAL mode for concurrent read performance.
//!
//! # Usage
//! ```rust,no_run
//! use spaceindex_storage::sqlite::SqliteStorage;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! // File-backed (persistent)
//! let store = SqliteStorage::open("./spaceindex.db").await?;
//!
//! // In-memory (tests / ephemeral)
//! let store = SqliteStorage::in_memory().await?;
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use sqlx::sqlite::{SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use tracing::debug;

use spaceindex_core::error::IndexerError;
use spaceindex_core::store::{BlockStore, ListingStore};
use spaceindex_core::types::{BlockRecord, Listing};

use crate::OrphanedBlock;

/// SQLite-backed block log and listing table.
pub struct SqliteStorage {
    pool: SqlitePool,
}

impl SqliteStorage {
    /// Open (or create) a SQLite database at `path`.
    ///
    /// The path may be a plain file path (`"./spaceindex.db"`) or a full
    /// SQLite URL (`"sqlite:./spaceindex.db?mode=rwc"`).
    /// `sqlite://<path>`, `sqlite:<path>` and bare paths open the same file,
    /// creating it if missing unless the URL sets its own `mode`.
    pub async fn open(path: &str) -> Result<Self, IndexerError> {
        let url = match sqlite_url(path) {
            Some(url) => url,
            None => return Self::in_memory().await,
        };

        let pool = SqlitePool::connect(&url)
            .await
            .map_err(|e| IndexerError::Storage(e.to_string()))?;

        let storage = Self { pool };
        storage.init_schema().await?;
        Ok(storage)
    }

    /// Open an in-memory SQLite database.
    ///
    /// The pool holds a single connection so every query sees the same
    /// database. All data is lost when the pool is dropped.
    pub async fn in_memory() -> Result<Self, IndexerError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .map_err(|e| IndexerError::Storage(e.to_string()))?;

        let storage = Self { pool };
        storage.init_schema().await?;
        Ok(storage)
    }

    /// Create tables and enable WAL mode.
    async fn init_schema(&self) -> Result<(), IndexerError> {
        sqlx::query("PRAGMA journal_mode=WAL;")
            .execute(&self.pool)
            .await
            .map_err(|e| IndexerError::Storage(e.to_string()))?;

        // Append-only block log; orphaned entries stay for audit.
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS blocks (
                id           INTEGER PRIMARY KEY AUTOINCREMENT,
                height       INTEGER NOT NULL,
                hash         BLOB    NOT NULL,
                orphaned     INTEGER NOT NULL DEFAULT 0,
                orphaned_at  INTEGER
            );",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| IndexerError::Storage(e.to_string()))?;

        // At most one live entry per height
        sqlx::query(
            "CREATE UNIQUE INDEX IF NOT EXISTS idx_blocks_live_height
             ON blocks (height) WHERE orphaned = 0;",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| IndexerError::Storage(e.to_string()))?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS listings (
                signature  BLOB    PRIMARY KEY,
                name       TEXT    NOT NULL,
                price      INTEGER NOT NULL CHECK (price >= 0),
                seller     TEXT    NOT NULL,
                timestamp  INTEGER NOT NULL,
                height     INTEGER NOT NULL,
                valid      INTEGER NOT NULL DEFAULT 1
            );",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| IndexerError::Storage(e.to_string()))?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_listings_name ON listings (name);")
            .execute(&self.pool)
            .await
            .map_err(|e| IndexerError::Storage(e.to_string()))?;

        Ok(())
    }

    /// Blocks flagged orphaned by head resolution, oldest write first.
    pub async fn orphaned_blocks(&self) -> Result<Vec<OrphanedBlock>, IndexerError> {
        let rows = sqlx::query(
            "SELECT height, hash, orphaned_at FROM blocks
             WHERE orphaned = 1 ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| IndexerError::Storage(e.to_string()))?;

        Ok(rows
            .into_iter()
            .map(|r| OrphanedBlock {
                height: r.get::<i64, _>("height") as u64,
                hash: r.get("hash"),
                orphaned_at: r.get::<Option<i64>, _>("orphaned_at").unwrap_or_default(),
            })
            .collect())
    }
}

/// Connection URL for a path or SQLite URL; `None` for an in-memory database.
fn sqlite_url(path: &str) -> Option<String> {
    let path = path
        .strip_prefix("sqlite://")
        .or_else(|| path.strip_prefix("sqlite:"))
        .unwrap_or(path);
    if path == ":memory:" {
        return None;
    }
    if path.contains("mode=") {
        Some(format!("sqlite:{path}"))
    } else if path.contains('?') {
        Some(format!("sqlite:{path}&mode=rwc"))
    } else {
        Some(format!("sqlite:{path}?mode=rwc"))
    }
}

fn listing_from_row(r: &SqliteRow) -> Listing {
    Listing {
        name: r.get("name"),
        price: r.get::<i64, _>("price") as u64,
        seller: r.get("seller"),
        signature: r.get("signature"),
        timestamp: r.get("timestamp"),
        height: r.get::<i64, _>("height") as u64,
        valid: r.get("valid"),
    }
}

// ─── BlockStore impl ─────────────────────────────────────────────────────────

#[async_trait]
impl BlockStore for SqliteStorage {
    async fn max_height(&self) -> Result<Option<u64>, IndexerError> {
        let row = sqlx::query("SELECT MAX(height) AS max_height FROM blocks WHERE orphaned = 0")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| IndexerError::Storage(e.to_string()))?;

        Ok(row.get::<Option<i64>, _>("max_height").map(|h| h as u64))
    }

    async fn hash_at(&self, height: u64) -> Result<Option<Vec<u8>>, IndexerError> {
        let row = sqlx::query("SELECT hash FROM blocks WHERE height = ? AND orphaned = 0")
            .bind(height as i64)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| IndexerError::Storage(e.to_string()))?;

        Ok(row.map(|r| r.get::<Vec<u8>, _>("hash")))
    }

    async fn latest_block(&self) -> Result<Option<BlockRecord>, IndexerError> {
        let row = sqlx::query(
            "SELECT height, hash FROM blocks
             WHERE orphaned = 0 ORDER BY height DESC LIMIT 1",
        )
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| IndexerError::Storage(e.to_string()))?;

        Ok(row.map(|r| BlockRecord::new(r.get::<i64, _>("height") as u64, r.get::<Vec<u8>, _>("hash"))))
    }

    async fn upsert_block(&self, height: u64, hash: &[u8]) -> Result<(), IndexerError> {
        sqlx::query(
            "INSERT INTO blocks (height, hash) VALUES (?, ?)
             ON CONFLICT (height) WHERE orphaned = 0
             DO UPDATE SET hash = excluded.hash",
        )
        .bind(height as i64)
        .bind(hash)
        .execute(&self.pool)
        .await
        .map_err(|e| IndexerError::Storage(e.to_string()))?;

        debug!(height, "block committed");
        Ok(())
    }

    async fn mark_orphaned_above(&self, height: Option<u64>) -> Result<u64, IndexerError> {
        let floor = height.map(|h| h as i64).unwrap_or(-1);
        let result = sqlx::query(
            "UPDATE blocks SET orphaned = 1, orphaned_at = ?
             WHERE orphaned = 0 AND height > ?",
        )
        .bind(chrono::Utc::now().timestamp())
        .bind(floor)
        .execute(&self.pool)
        .await
        .map_err(|e| IndexerError::Storage(e.to_string()))?;

        debug!(above = floor, count = result.rows_affected(), "blocks orphaned");
        Ok(result.rows_affected())
    }
}

// ─── ListingStore impl ───────────────────────────────────────────────────────

#[async_trait]
impl ListingStore for SqliteStorage {
    async fn listings_by_name(&self, name: &str) -> Result<Vec<Listing>, IndexerError> {
        let rows = sqlx::query(
            "SELECT name, price, seller, signature, timestamp, height, valid
             FROM listings WHERE name = ? ORDER BY price ASC, signature ASC",
        )
        .bind(name)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| IndexerError::Storage(e.to_string()))?;

        Ok(rows.iter().map(listing_from_row).collect())
    }

    async fn valid_listing(&self, name: &str) -> Result<Option<Listing>, IndexerError> {
        let row = sqlx::query(
            "SELECT name, price, seller, signature, timestamp, height, valid
             FROM listings WHERE name = ? AND valid = 1
             ORDER BY price ASC, signature ASC LIMIT 1",
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| IndexerError::Storage(e.to_string()))?;

        Ok(row.as_ref().map(listing_from_row))
    }

    async fn latest_listings(&self, limit: u64) -> Result<Vec<Listing>, IndexerError> {
        let rows = sqlx::query(
            "SELECT name, price, seller, signature, timestamp, height, valid FROM (
                SELECT *, ROW_NUMBER() OVER (
                    PARTITION BY name ORDER BY price ASC, signature ASC
                ) AS rn
                FROM listings WHERE valid = 1
             )
             WHERE rn = 1
             ORDER BY timestamp DESC, name ASC
             LIMIT ?",
        )
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| IndexerError::Storage(e.to_string()))?;

        Ok(rows.iter().map(listing_from_row).collect())
    }

    async fn update_validity(
        &self,
        signature: &[u8],
        valid: bool,
        height: u64,
    ) -> Result<(), IndexerError> {
        sqlx::query("UPDATE listings SET valid = ?, height = ? WHERE signature = ?")
            .bind(valid)
            .bind(height as i64)
            .bind(signature)
            .execute(&self.pool)
            .await
            .map_err(|e| IndexerError::Storage(e.to_string()))?;

        Ok(())
    }

    async fn insert_listing(&self, listing: &Listing) -> Result<(), IndexerError> {
        sqlx::query(
            "INSERT INTO listings (signature, name, price, seller, timestamp, height, valid)
             VALUES (?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT (signature) DO UPDATE SET
                name      = excluded.name,
                price     = excluded.price,
                seller    = excluded.seller,
                timestamp = excluded.timestamp,
                height    = excluded.height,
                valid     = excluded.valid",
        )
        .bind(&listing.signature)
        .bind(&listing.name)
        .bind(listing.price as i64)
        .bind(&listing.seller)
        .bind(listing.timestamp)
        .bind(listing.height as i64)
        .bind(listing.valid)
        .execute(&self.pool)
        .await
        .map_err(|e| IndexerError::Storage(e.to_string()))?;

        debug!(name = %listing.name, signature = %listing.signature_hex(), "listing stored");
        Ok(())
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn listing(name: &str, price: u64, sig: &[u8]) -> Listing {
        Listing {
            name: name.into(),
            price,
            seller: "bcrt1pseller".into(),
            signature: sig.to_vec(),
            timestamp: 1_700_000_000,
            height: 0,
            valid: true,
        }
    }

    #[test]
    fn url_forms_resolve_to_the_same_file() {
        let expected = Some("sqlite:./data/index.db?mode=rwc".to_string());
        assert_eq!(sqlite_url("./data/index.db"), expected);
        assert_eq!(sqlite_url("sqlite:./data/index.db"), expected);
        assert_eq!(sqlite_url("sqlite://./data/index.db"), expected);
        assert_eq!(
            sqlite_url("sqlite:index.db?mode=ro"),
            Some("sqlite:index.db?mode=ro".to_string())
        );
        assert_eq!(
            sqlite_url("sqlite:index.db?cache=shared"),
            Some("sqlite:index.db?cache=shared&mode=rwc".to_string())
        );
        assert_eq!(sqlite_url("sqlite::memory:"), None);
    }

    #[tokio::test]
    async fn open_creates_missing_file() {
        let path = std::env::temp_dir().join(format!("spaceindex-open-{}.db", std::process::id()));
        let _ = std::fs::remove_file(&path);
        let url = format!("sqlite:{}", path.display());

        let store = SqliteStorage::open(&url).await.unwrap();
        store.upsert_block(1, &[0x01]).await.unwrap();
        drop(store);

        let reopened = SqliteStorage::open(&url).await.unwrap();
        assert_eq!(reopened.max_height().await.unwrap(), Some(1));
        drop(reopened);
        let _ = std::fs::remove_file(&path);
    }

    // ── BlockStore ────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn empty_block_log() {
        let store = SqliteStorage::in_memory().await.unwrap();
        assert_eq!(store.max_height().await.unwrap(), None);
        assert!(store.latest_block().await.unwrap().is_none());
        assert!(store.hash_at(0).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn block_upsert_by_height() {
        let store = SqliteStorage::in_memory().await.unwrap();

        store.upsert_block(100, &[0xaa]).await.unwrap();
        store.upsert_block(101, &[0xbb]).await.unwrap();
        store.upsert_block(101, &[0xcc]).await.unwrap();

        assert_eq!(store.max_height().await.unwrap(), Some(101));
        assert_eq!(store.hash_at(101).await.unwrap(), Some(vec![0xcc]));
        let latest = store.latest_block().await.unwrap().unwrap();
        assert_eq!(latest, BlockRecord::new(101, vec![0xcc]));
    }

    #[tokio::test]
    async fn orphaned_blocks_leave_live_view() {
        let store = SqliteStorage::in_memory().await.unwrap();
        for h in 0u64..=10 {
            store.upsert_block(h, &[h as u8]).await.unwrap();
        }

        let n = store.mark_orphaned_above(Some(9)).await.unwrap();
        assert_eq!(n, 1);
        assert_eq!(store.max_height().await.unwrap(), Some(9));
        assert!(store.hash_at(10).await.unwrap().is_none());

        // The height can be synced again while the orphan stays on record.
        store.upsert_block(10, &[0xff]).await.unwrap();
        assert_eq!(store.hash_at(10).await.unwrap(), Some(vec![0xff]));

        let orphans = store.orphaned_blocks().await.unwrap();
        assert_eq!(orphans.len(), 1);
        assert_eq!(orphans[0].height, 10);
        assert_eq!(orphans[0].hash, vec![10]);
    }

    #[tokio::test]
    async fn orphan_all_blocks() {
        let store = SqliteStorage::in_memory().await.unwrap();
        store.upsert_block(0, &[0]).await.unwrap();
        store.upsert_block(1, &[1]).await.unwrap();

        assert_eq!(store.mark_orphaned_above(None).await.unwrap(), 2);
        assert_eq!(store.max_height().await.unwrap(), None);
    }

    // ── ListingStore ──────────────────────────────────────────────────────────

    #[tokio::test]
    async fn listing_insert_and_query() {
        let store = SqliteStorage::in_memory().await.unwrap();

        store.insert_listing(&listing("alice", 100, b"sig1")).await.unwrap();
        store.insert_listing(&listing("alice", 40, b"sig2")).await.unwrap();
        store.insert_listing(&listing("bob", 7, b"sig3")).await.unwrap();

        let alice = store.listings_by_name("alice").await.unwrap();
        assert_eq!(alice.len(), 2);
        assert_eq!(alice[0].price, 40);

        let cheapest = store.valid_listing("alice").await.unwrap().unwrap();
        assert_eq!(cheapest.signature, b"sig2".to_vec());
    }

    #[tokio::test]
    async fn validity_and_height_update_together() {
        let store = SqliteStorage::in_memory().await.unwrap();
        store.insert_listing(&listing("alice", 100, b"sig1")).await.unwrap();

        store.update_validity(b"sig1", false, 20).await.unwrap();

        let all = store.listings_by_name("alice").await.unwrap();
        assert!(!all[0].valid);
        assert_eq!(all[0].height, 20);
        assert!(store.valid_listing("alice").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn latest_listings_cheapest_per_name() {
        let store = SqliteStorage::in_memory().await.unwrap();
        let mut alice_high = listing("alice", 100, b"sig1");
        alice_high.timestamp = 10;
        let mut alice_low = listing("alice", 40, b"sig2");
        alice_low.timestamp = 10;
        let mut bob = listing("bob", 7, b"sig3");
        bob.timestamp = 20;
        let mut gone = listing("carol", 1, b"sig4");
        gone.valid = false;
        for l in [&alice_high, &alice_low, &bob, &gone] {
            store.insert_listing(l).await.unwrap();
        }

        let latest = store.latest_listings(10).await.unwrap();
        let summary: Vec<_> = latest.iter().map(|l| (l.name.as_str(), l.price)).collect();
        assert_eq!(summary, vec![("bob", 7), ("alice", 40)]);
        assert_eq!(store.latest_listings(1).await.unwrap()[0].name, "bob");
    }

    #[tokio::test]
    async fn listing_upsert_by_signature() {
        let store = SqliteStorage::in_memory().await.unwrap();
        store.insert_listing(&listing("alice", 100, b"sig1")).await.unwrap();
        let mut relisted = listing("alice", 100, b"sig1");
        relisted.height = 30;
        store.insert_listing(&relisted).await.unwrap();

        let all = store.listings_by_name("alice").await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].height, 30);
    }
}
