//! Scripted chain for integration tests.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use spaceindex_core::{
    normalize_space_name, BlockMeta, BlockRef, ChainClient, ChainTip, IndexerBuilder,
    IndexerError, Listing, SyncLoop, TxChanges, Verification,
};
use spaceindex_storage::InMemoryStorage;

/// Deterministic hash for `height` on fork `tag`.
pub fn block_hash(height: u64, tag: u8) -> Vec<u8> {
    let mut hash = height.to_be_bytes().to_vec();
    hash.push(tag);
    hash
}

#[derive(Default)]
struct ChainState {
    /// Index is height.
    blocks: Vec<BlockMeta>,
    /// Extra heights the tip claims beyond what `block` can serve.
    tip_ahead: u64,
    failing_heights: HashSet<u64>,
    /// Heights the node answers "no such block" for.
    hidden_heights: HashSet<u64>,
    /// space name → current holder address
    owners: HashMap<String, String>,
    oracle_down: bool,
    verify_calls: Vec<String>,
}

/// In-memory chain with a listing oracle backed by an ownership table.
#[derive(Default)]
pub struct MockChain {
    state: Mutex<ChainState>,
}

impl MockChain {
    /// A chain with empty blocks `0..=height` on fork 0.
    pub fn with_height(height: u64) -> Arc<Self> {
        let chain = Arc::new(Self::default());
        chain.extend_to(height);
        chain
    }

    pub fn height(&self) -> u64 {
        self.state.lock().unwrap().blocks.len() as u64 - 1
    }

    /// Append empty blocks until the chain reaches `height`.
    pub fn extend_to(&self, height: u64) {
        let mut st = self.state.lock().unwrap();
        while (st.blocks.len() as u64) <= height {
            let h = st.blocks.len() as u64;
            st.blocks.push(BlockMeta {
                height: h,
                hash: block_hash(h, 0),
                transactions: Vec::new(),
            });
        }
    }

    /// Append one block whose single transaction creates/updates `names`.
    pub fn push_block(&self, creates: &[&str], updates: &[&str]) -> u64 {
        let mut st = self.state.lock().unwrap();
        let h = st.blocks.len() as u64;
        st.blocks.push(BlockMeta {
            height: h,
            hash: block_hash(h, 0),
            transactions: vec![TxChanges {
                creates: creates.iter().map(|s| s.to_string()).collect(),
                updates: updates.iter().map(|s| s.to_string()).collect(),
                rejected_claims: Vec::new(),
            }],
        });
        h
    }

    /// Append a block with arbitrary transactions.
    pub fn push_transactions(&self, transactions: Vec<TxChanges>) -> u64 {
        let mut st = self.state.lock().unwrap();
        let h = st.blocks.len() as u64;
        st.blocks.push(BlockMeta {
            height: h,
            hash: block_hash(h, 0),
            transactions,
        });
        h
    }

    /// Replace every block from `height` up with fork `tag`, keeping the
    /// chain length.
    pub fn reorg_from(&self, height: u64, tag: u8) {
        let mut st = self.state.lock().unwrap();
        for block in st.blocks.iter_mut().skip(height as usize) {
            block.hash = block_hash(block.height, tag);
        }
    }

    /// Switch to branch `tag` from `height` up: blocks at and above
    /// `height` are replaced by `branch`, one entry of transactions per
    /// block. The chain may end up shorter or longer than before.
    pub fn fork(&self, height: u64, tag: u8, branch: Vec<Vec<TxChanges>>) {
        let mut st = self.state.lock().unwrap();
        st.blocks.truncate(height as usize);
        for transactions in branch {
            let h = st.blocks.len() as u64;
            st.blocks.push(BlockMeta {
                height: h,
                hash: block_hash(h, tag),
                transactions,
            });
        }
    }

    pub fn hide_block(&self, height: u64) {
        self.state.lock().unwrap().hidden_heights.insert(height);
    }

    pub fn unhide_block(&self, height: u64) {
        self.state.lock().unwrap().hidden_heights.remove(&height);
    }

    pub fn set_tip_ahead(&self, extra: u64) {
        self.state.lock().unwrap().tip_ahead = extra;
    }

    pub fn fail_block(&self, height: u64) {
        self.state.lock().unwrap().failing_heights.insert(height);
    }

    pub fn heal_block(&self, height: u64) {
        self.state.lock().unwrap().failing_heights.remove(&height);
    }

    pub fn set_owner(&self, name: &str, seller: &str) {
        self.state
            .lock()
            .unwrap()
            .owners
            .insert(name.to_string(), seller.to_string());
    }

    pub fn set_oracle_down(&self, down: bool) {
        self.state.lock().unwrap().oracle_down = down;
    }

    /// Names passed to `verify_listing`, in call order.
    pub fn verify_calls(&self) -> Vec<String> {
        self.state.lock().unwrap().verify_calls.clone()
    }

    pub fn clear_verify_calls(&self) {
        self.state.lock().unwrap().verify_calls.clear();
    }
}

#[async_trait]
impl ChainClient for MockChain {
    async fn tip(&self) -> Result<ChainTip, IndexerError> {
        let st = self.state.lock().unwrap();
        let last = st
            .blocks
            .last()
            .ok_or_else(|| IndexerError::Rpc("chain has no blocks".into()))?;
        Ok(ChainTip {
            height: last.height + st.tip_ahead,
            hash: last.hash.clone(),
        })
    }

    async fn block(&self, at: BlockRef) -> Result<Option<BlockMeta>, IndexerError> {
        let st = self.state.lock().unwrap();
        match at {
            BlockRef::Height(h) => {
                if st.failing_heights.contains(&h) {
                    return Err(IndexerError::Rpc(format!("timeout fetching block {h}")));
                }
                if st.hidden_heights.contains(&h) {
                    return Ok(None);
                }
                Ok(st.blocks.get(h as usize).cloned())
            }
            BlockRef::Hash(hash) => Ok(st.blocks.iter().find(|b| b.hash == hash).cloned()),
        }
    }

    async fn verify_listing(
        &self,
        name: &str,
        seller: &str,
        signature: &[u8],
        _price: u64,
    ) -> Verification {
        let mut st = self.state.lock().unwrap();
        st.verify_calls.push(name.to_string());
        if st.oracle_down {
            return Verification::Unavailable(IndexerError::Rpc("oracle unreachable".into()));
        }
        if signature.is_empty() {
            return Verification::Invalid {
                reason: "empty signature".into(),
            };
        }
        match st.owners.get(normalize_space_name(name)) {
            Some(owner) if owner == seller => Verification::Valid,
            _ => Verification::Invalid {
                reason: format!("{seller} does not hold @{name}"),
            },
        }
    }
}

/// Transactions of a block that updates each of `names`.
pub fn touching(names: &[&str]) -> Vec<TxChanges> {
    vec![TxChanges {
        creates: Vec::new(),
        updates: names.iter().map(|s| s.to_string()).collect(),
        rejected_claims: Vec::new(),
    }]
}

pub fn listing(name: &str, price: u64, seller: &str, sig: u8) -> Listing {
    Listing {
        name: name.into(),
        price,
        seller: seller.into(),
        signature: vec![0xa0, sig],
        timestamp: 1_700_000_000,
        height: 0,
        valid: true,
    }
}

pub fn sync_loop(chain: &Arc<MockChain>, store: &Arc<InMemoryStorage>) -> SyncLoop {
    sync_loop_from(chain, store, 0)
}

pub fn sync_loop_from(chain: &Arc<MockChain>, store: &Arc<InMemoryStorage>, from: u64) -> SyncLoop {
    let config = IndexerBuilder::new()
        .from_height(from)
        .poll_interval_ms(10)
        .retry_delay_ms(10)
        .build_config();
    SyncLoop::new(config, chain.clone(), store.clone(), store.clone())
}
