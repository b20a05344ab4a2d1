//! The block tree index: every known `BlockNode` keyed by hash, plus the
//! height-indexed main-chain array.
//!
//! Grounded on `protocol/state/blockindex.go`. `SetMainChain`'s walk stops as
//! soon as it reaches a height whose slot already holds `node` — the only
//! thing keeping repeated calls sub-linear once a reorg has settled onto a
//! long common prefix, and worth preserving exactly (see SPEC_FULL.md §B).

use crate::block::BlockHeader;
use crate::consensus;
use crate::difficulty;
use crate::hash::Hash;
use num_bigint::BigUint;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// Roughly how many blocks accumulate per day at the target block interval;
/// used only to size the main-chain array's initial allocation.
const APPROX_NODES_PER_DAY: usize = (24 * 60 * 60) / difficulty::TARGET_SECONDS_PER_BLOCK as usize;

#[derive(Debug, Clone)]
pub struct BlockNode {
    pub parent: Option<Arc<BlockNode>>,
    pub hash: Hash,
    pub work_sum: BigUint,

    pub version: u64,
    pub height: u64,
    pub timestamp: u64,
    pub target: u64,
    pub transaction_root: Hash,
    pub witness_root: Hash,
}

impl BlockNode {
    pub fn new(header: &BlockHeader, parent: Option<Arc<BlockNode>>) -> BlockNode {
        let target = header.proof.target();
        let mut work_sum = difficulty::work(target);
        if header.height != 0 {
            let parent = parent.as_ref().expect("non-genesis node must have a parent");
            work_sum += &parent.work_sum;
        }

        BlockNode {
            parent,
            hash: header.hash(),
            work_sum,
            version: header.version,
            height: header.height,
            timestamp: header.timestamp,
            target,
            transaction_root: header.transaction_root,
            witness_root: header.witness_root,
        }
    }

    pub fn previous_hash(&self) -> Hash {
        self.parent.as_ref().map(|p| p.hash).unwrap_or(Hash::ZERO)
    }

    /// Median of this node and up to `MEDIAN_TIME_BLOCKS - 1` ancestors'
    /// timestamps, used to bound how far back a child's timestamp may fall.
    pub fn calc_past_median_time(&self) -> u64 {
        let mut timestamps = Vec::with_capacity(consensus::MEDIAN_TIME_BLOCKS);
        timestamps.push(self.timestamp);
        let mut cur = self.parent.clone();
        while let Some(node) = cur {
            if timestamps.len() >= consensus::MEDIAN_TIME_BLOCKS {
                break;
            }
            timestamps.push(node.timestamp);
            cur = node.parent.clone();
        }
        timestamps.sort_unstable();
        timestamps[timestamps.len() / 2]
    }

    /// Target the next block on top of this node must satisfy.
    pub fn hint_next_target(&self) -> u64 {
        let next_height = self.height + 1;
        if next_height % difficulty::BLOCKS_PER_RETARGET != 0 {
            return self.target;
        }

        let first_retarget_time = self
            .ancestor_at(next_height.saturating_sub(difficulty::BLOCKS_PER_RETARGET))
            .map(|n| n.timestamp)
            .unwrap_or(self.timestamp);

        difficulty::calc_next_required_difficulty(
            self.target,
            next_height,
            self.timestamp,
            first_retarget_time,
        )
    }

    /// Walks parent pointers from this node down to `height`, inclusive.
    fn ancestor_at(&self, height: u64) -> Option<Arc<BlockNode>> {
        if height > self.height {
            return None;
        }
        let mut cur = self.parent.clone()?;
        if self.height == height {
            return None; // no parent arc for self; callers fall back to self.timestamp
        }
        while cur.height > height {
            cur = cur.parent.clone()?;
        }
        Some(cur)
    }
}

/// Hash-keyed tree of every known block, plus a growable height-indexed
/// main-chain array.
pub struct BlockIndex {
    inner: RwLock<Inner>,
}

struct Inner {
    index: HashMap<Hash, Arc<BlockNode>>,
    main_chain: Vec<Option<Arc<BlockNode>>>,
}

impl BlockIndex {
    pub fn new() -> BlockIndex {
        BlockIndex {
            inner: RwLock::new(Inner {
                index: HashMap::new(),
                main_chain: Vec::with_capacity(APPROX_NODES_PER_DAY),
            }),
        }
    }

    pub fn add_node(&self, node: Arc<BlockNode>) {
        self.inner.write().index.insert(node.hash, node);
    }

    pub fn get_node(&self, hash: &Hash) -> Option<Arc<BlockNode>> {
        self.inner.read().index.get(hash).cloned()
    }

    pub fn block_exists(&self, hash: &Hash) -> bool {
        self.inner.read().index.contains_key(hash)
    }

    pub fn best_node(&self) -> Option<Arc<BlockNode>> {
        self.inner.read().main_chain.last().cloned().flatten()
    }

    fn node_by_height_locked(inner: &Inner, height: u64) -> Option<Arc<BlockNode>> {
        inner
            .main_chain
            .get(height as usize)
            .cloned()
            .flatten()
    }

    pub fn node_by_height(&self, height: u64) -> Option<Arc<BlockNode>> {
        Self::node_by_height_locked(&self.inner.read(), height)
    }

    pub fn in_main_chain(&self, hash: &Hash) -> bool {
        let inner = self.inner.read();
        match inner.index.get(hash) {
            Some(node) => Self::node_by_height_locked(&inner, node.height)
                .map(|n| n.hash == node.hash)
                .unwrap_or(false),
            None => false,
        }
    }

    /// Grows `main_chain` to cover `node`'s height, then walks parent
    /// pointers writing each ancestor into its height slot until it finds a
    /// slot that already holds that exact node.
    pub fn set_main_chain(&self, mut node: Arc<BlockNode>) {
        let mut inner = self.inner.write();
        let needed = (node.height + 1) as usize;
        if inner.main_chain.len() < needed {
            inner.main_chain.resize(needed, None);
        } else {
            inner.main_chain.truncate(needed);
        }

        loop {
            let height = node.height as usize;
            let already_set = inner.main_chain[height]
                .as_ref()
                .map(|n| n.hash == node.hash)
                .unwrap_or(false);
            if already_set {
                break;
            }
            inner.main_chain[height] = Some(node.clone());
            match &node.parent {
                Some(p) => node = p.clone(),
                None => break,
            }
        }
    }
}

impl Default for BlockIndex {
    fn default() -> Self {
        Self::new()
    }
}
