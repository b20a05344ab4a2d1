//! Orphan block cache: blocks that arrived before their parent.
//!
//! Grounded on `protocol/orphan_manage.go`'s `OrphanManage`. Same shape —
//! a bounded, TTL'd map keyed by block hash plus a reverse index keyed by
//! `previous` — ported from its mutex+goroutine-ticker idiom to
//! `parking_lot::RwLock` plus an explicit `expire` call a `tokio::time`
//! interval task drives, matching how `store::BlockCache` is driven in this
//! crate rather than spawning its own timer.

use crate::block::Block;
use crate::hash::Hash;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

pub const NUM_ORPHAN_BLOCK_LIMIT: usize = 256;
pub const ORPHAN_BLOCK_TTL: Duration = Duration::from_secs(60 * 60);
pub const ORPHAN_EXPIRE_SCAN_INTERVAL: Duration = Duration::from_secs(3 * 60);

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before unix epoch")
        .as_secs()
}

struct OrphanBlock {
    block: Arc<Block>,
    expiration: u64,
}

struct Inner {
    orphan: HashMap<Hash, OrphanBlock>,
    prev_orphans: HashMap<Hash, Vec<Hash>>,
}

/// Parentless blocks, kept around in case their parent shows up. Spec §4.4.
pub struct OrphanManage {
    inner: RwLock<Inner>,
}

impl OrphanManage {
    pub fn new() -> OrphanManage {
        OrphanManage {
            inner: RwLock::new(Inner {
                orphan: HashMap::new(),
                prev_orphans: HashMap::new(),
            }),
        }
    }

    pub fn block_exists(&self, hash: &Hash) -> bool {
        self.inner.read().orphan.contains_key(hash)
    }

    pub fn get(&self, hash: &Hash) -> Option<Arc<Block>> {
        self.inner.read().orphan.get(hash).map(|o| o.block.clone())
    }

    /// Children waiting on `previous` to arrive, oldest-inserted first.
    pub fn get_prev_orphans(&self, previous: &Hash) -> Vec<Hash> {
        self.inner
            .read()
            .prev_orphans
            .get(previous)
            .cloned()
            .unwrap_or_default()
    }

    /// Parks `block`. No-op if already present or if the cache is at
    /// capacity (spec §4.4: `add` is a no-op at the cap, not an eviction —
    /// confirmed by the §8 "orphan cap" scenario expecting exactly 256
    /// entries after 300 adds).
    pub fn add(&self, block: Arc<Block>) {
        let hash = block.hash();
        let previous = block.header.previous;
        let mut inner = self.inner.write();

        if inner.orphan.contains_key(&hash) || inner.orphan.len() >= NUM_ORPHAN_BLOCK_LIMIT {
            return;
        }

        inner.orphan.insert(
            hash,
            OrphanBlock {
                block,
                expiration: now_secs() + ORPHAN_BLOCK_TTL.as_secs(),
            },
        );
        inner.prev_orphans.entry(previous).or_default().push(hash);
        log::debug!("[orphan] cached {hash}, {} orphan(s) total", inner.orphan.len());
    }

    pub fn delete_block(&self, hash: &Hash) {
        let mut inner = self.inner.write();
        Self::delete(&mut inner, hash);
    }

    fn delete(inner: &mut Inner, hash: &Hash) {
        let Some(orphan) = inner.orphan.remove(hash) else {
            return;
        };
        let previous = orphan.block.header.previous;
        if let Some(siblings) = inner.prev_orphans.get_mut(&previous) {
            siblings.retain(|h| h != hash);
            if siblings.is_empty() {
                inner.prev_orphans.remove(&previous);
            }
        }
    }

    /// Evicts every orphan whose TTL elapsed at or before `now`. Intended to
    /// be driven by a `tokio::time::interval(ORPHAN_EXPIRE_SCAN_INTERVAL)`
    /// loop at the crate's edge.
    pub fn expire(&self, now: u64) {
        let mut inner = self.inner.write();
        let expired: Vec<Hash> = inner
            .orphan
            .iter()
            .filter(|(_, o)| o.expiration <= now)
            .map(|(h, _)| *h)
            .collect();
        for hash in expired {
            Self::delete(&mut inner, &hash);
        }
    }
}

impl Default for OrphanManage {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::BlockHeader;
    use crate::proof::Proof;

    fn block_with(previous: Hash, height: u64) -> Arc<Block> {
        Arc::new(Block {
            header: BlockHeader {
                chain_id: Hash::ZERO,
                version: 1,
                height,
                timestamp: height,
                previous,
                transaction_root: Hash::ZERO,
                witness_root: Hash::ZERO,
                proof: Proof::Pow {
                    target: u64::MAX,
                    nonce: 0,
                },
            },
            transactions: vec![],
        })
    }

    #[test]
    fn add_then_lookup_by_hash_and_prev() {
        let manage = OrphanManage::new();
        let block = block_with(Hash::sha3(b"parent"), 5);
        let hash = block.hash();
        manage.add(block.clone());

        assert!(manage.block_exists(&hash));
        assert_eq!(manage.get(&hash).unwrap().header.height, 5);
        assert_eq!(manage.get_prev_orphans(&Hash::sha3(b"parent")), vec![hash]);
    }

    #[test]
    fn delete_clears_both_indexes() {
        let manage = OrphanManage::new();
        let block = block_with(Hash::sha3(b"parent"), 5);
        let hash = block.hash();
        manage.add(block);
        manage.delete_block(&hash);

        assert!(!manage.block_exists(&hash));
        assert!(manage.get_prev_orphans(&Hash::sha3(b"parent")).is_empty());
    }

    #[test]
    fn expire_evicts_past_ttl_only() {
        let manage = OrphanManage::new();
        let block = block_with(Hash::sha3(b"parent"), 5);
        let hash = block.hash();
        manage.add(block);

        manage.expire(now_secs());
        assert!(manage.block_exists(&hash));

        manage.expire(now_secs() + ORPHAN_BLOCK_TTL.as_secs() + 1);
        assert!(!manage.block_exists(&hash));
    }

    #[test]
    fn add_past_limit_is_a_no_op() {
        let manage = OrphanManage::new();
        for i in 0..300 {
            manage.add(block_with(Hash::sha3(format!("p{i}").as_bytes()), i as u64));
        }
        assert_eq!(manage.inner.read().orphan.len(), NUM_ORPHAN_BLOCK_LIMIT);

        let extra = block_with(Hash::sha3(b"extra"), 9999);
        manage.add(extra.clone());
        assert_eq!(manage.inner.read().orphan.len(), NUM_ORPHAN_BLOCK_LIMIT);
        assert!(!manage.block_exists(&extra.hash()));
    }
}
