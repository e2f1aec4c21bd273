//! Shared types for the sync pipeline and the listing store.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// Display sigil that prefixes space names in user-facing form (`@alice`).
pub const SPACE_SIGIL: char = '@';

/// Strip a single leading `@` from a space name.
///
/// Stored listings always use the canonical, unsigiled form.
pub fn normalize_space_name(name: &str) -> &str {
    name.strip_prefix(SPACE_SIGIL).unwrap_or(name)
}

/// Render a canonical space name in sigiled display form.
pub fn display_space_name(name: &str) -> String {
    format!("{SPACE_SIGIL}{}", normalize_space_name(name))
}

// ─── Blocks ──────────────────────────────────────────────────────────────────

/// One persisted `(height, hash)` pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockRecord {
    pub height: u64,
    #[serde(with = "hex_bytes")]
    pub hash: Vec<u8>,
}

impl BlockRecord {
    pub fn new(height: u64, hash: impl Into<Vec<u8>>) -> Self {
        Self {
            height,
            hash: hash.into(),
        }
    }

    /// Hex rendering of the block hash, for logs and status output.
    pub fn hash_hex(&self) -> String {
        hex::encode(&self.hash)
    }
}

/// The chain tip as reported by the node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainTip {
    pub height: u64,
    #[serde(with = "hex_bytes")]
    pub hash: Vec<u8>,
}

/// How to address a block when asking the chain client for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockRef {
    Height(u64),
    Hash(Vec<u8>),
}

impl std::fmt::Display for BlockRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Height(h) => write!(f, "height {h}"),
            Self::Hash(hash) => write!(f, "hash {}", hex::encode(hash)),
        }
    }
}

/// Space-level effects of one transaction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TxChanges {
    /// Names of newly created spaces.
    pub creates: Vec<String>,
    /// Names of spaces whose output was updated (transfer, renewal, ...).
    pub updates: Vec<String>,
    /// Names a spend tried to claim but whose script evaluation failed.
    pub rejected_claims: Vec<String>,
}

/// Block metadata: hash plus the space changes of each transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockMeta {
    pub height: u64,
    pub hash: Vec<u8>,
    pub transactions: Vec<TxChanges>,
}

impl BlockMeta {
    /// Every space name this block touched, normalized and deduplicated.
    ///
    /// Ordered so that revalidation of a height is deterministic.
    pub fn touched_names(&self) -> BTreeSet<String> {
        self.transactions
            .iter()
            .flat_map(|tx| {
                tx.creates
                    .iter()
                    .chain(&tx.updates)
                    .chain(&tx.rejected_claims)
            })
            .map(|name| normalize_space_name(name))
            .filter(|name| !name.is_empty())
            .map(str::to_owned)
            .collect()
    }
}

// ─── Listings ────────────────────────────────────────────────────────────────

/// A third-party sell offer for a space.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Listing {
    /// Canonical space name (no `@`).
    pub name: String,
    /// Asking price in satoshis.
    pub price: u64,
    /// Address the seller wants to be paid at.
    pub seller: String,
    /// Seller's signature over the offer; primary key of the store.
    #[serde(with = "hex_bytes")]
    pub signature: Vec<u8>,
    /// Unix timestamp of when the listing was posted.
    pub timestamp: i64,
    /// Height at which validity was last confirmed.
    pub height: u64,
    pub valid: bool,
}

impl Listing {
    pub fn signature_hex(&self) -> String {
        hex::encode(&self.signature)
    }
}

/// Serde helper: `Vec<u8>` as a lowercase hex string.
pub mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(d)?;
        hex::decode(s.trim_start_matches("0x")).map_err(serde::de::Error::custom)
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
