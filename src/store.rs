//! The persistence contract. `store.rs` only defines the shape a real
//! key/value-backed engine must satisfy — the engine itself is out of scope
//! (spec §1) — plus an in-memory double used by this crate's own tests.
//!
//! Key layout and the `Store` method set are grounded on `protocol/store.go`
//! and `database/leveldb/{store,cache,tx}.go`.

use crate::block::Block;
use crate::error::{CoreError, CoreResult};
use crate::hash::Hash;
use crate::state::{BlockIndex, BlockNode, UtxoViewpoint};
use crate::tx::{Evidence, Tx};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::broadcast;

/// Key prefixes a backend must use so this crate's locator math lines up
/// with what it writes (spec §6).
pub mod keys {
    pub const BLOCK_STORE: &[u8] = b"blockStore";
    pub const BLOCK_PREFIX: &[u8] = b"B:";
    pub const BLOCK_HEADER_PREFIX: &[u8] = b"BH:";
    pub const UTXO_PREFIX: &[u8] = b"UT:";
    pub const TX_LOC_PREFIX: &[u8] = b"TL:";
    pub const EVIDENCE_LOC_PREFIX: &[u8] = b"EVIDL:";

    use crate::hash::Hash;

    pub fn block_key(hash: &Hash) -> Vec<u8> {
        [BLOCK_PREFIX, hash.bytes()].concat()
    }

    pub fn block_header_key(height: u64, hash: &Hash) -> Vec<u8> {
        let mut k = Vec::with_capacity(BLOCK_HEADER_PREFIX.len() + 8 + 32);
        k.extend_from_slice(BLOCK_HEADER_PREFIX);
        k.extend_from_slice(&height.to_be_bytes());
        k.extend_from_slice(hash.bytes());
        k
    }

    pub fn utxo_key(hash: &Hash) -> Vec<u8> {
        [UTXO_PREFIX, hash.to_hex().as_bytes()].concat()
    }

    pub fn tx_loc_key(txid: &Hash, block_hash: &Hash, offset: u64, length: u64) -> Vec<u8> {
        let mut k = Vec::with_capacity(TX_LOC_PREFIX.len() + 32 + 32 + 8 + 8);
        k.extend_from_slice(TX_LOC_PREFIX);
        k.extend_from_slice(txid.bytes());
        k.extend_from_slice(block_hash.bytes());
        k.extend_from_slice(&offset.to_le_bytes());
        k.extend_from_slice(&length.to_le_bytes());
        k
    }

    pub fn evidence_loc_key(evidence_hash: &Hash, txid: &Hash, index: u64) -> Vec<u8> {
        let mut k = Vec::with_capacity(EVIDENCE_LOC_PREFIX.len() + 32 + 32 + 8);
        k.extend_from_slice(EVIDENCE_LOC_PREFIX);
        k.extend_from_slice(evidence_hash.bytes());
        k.extend_from_slice(txid.bytes());
        k.extend_from_slice(&index.to_le_bytes());
        k
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockStoreState {
    pub height: u64,
    pub hash: Hash,
}

/// Narrow persistence contract the chain driver depends on. A real
/// implementation backs this with a KV engine; this crate ships only
/// `MemStore` (below), for tests.
pub trait Store: Send + Sync {
    fn block_exists(&self, hash: &Hash) -> bool;
    fn get_block(&self, hash: &Hash) -> CoreResult<Block>;
    fn get_store_status(&self) -> CoreResult<BlockStoreState>;
    fn get_transactions_utxo(&self, view: &mut UtxoViewpoint, txs: &[Tx]) -> CoreResult<()>;
    fn get_utxo(&self, hash: &Hash) -> CoreResult<crate::state::UtxoEntry>;
    fn load_block_index(&self, best_height: u64) -> CoreResult<BlockIndex>;
    fn save_block(&self, block: &Block) -> CoreResult<()>;
    fn save_chain_status(
        &self,
        node: &crate::state::BlockNode,
        view: &UtxoViewpoint,
    ) -> CoreResult<()>;
    fn get_transaction(&self, hash: &Hash) -> CoreResult<Tx>;
    fn get_evidence(&self, hash: &Hash) -> CoreResult<Evidence>;
}

const MAX_CACHED_BLOCKS: usize = 30;

enum CacheState {
    Ready(Arc<Block>),
    Filling(broadcast::Sender<Option<Arc<Block>>>),
}

/// LRU block cache with single-flight coalescing: concurrent misses for the
/// same hash share one `store.get_block` call instead of each re-fetching.
/// Grounded on `database/leveldb/cache.go`'s `blockCache`; the
/// `lru.Cache` + `singleflight.Group` pairing there becomes a
/// `Mutex<HashMap<..>>` keyed by cache state plus a broadcast channel that
/// waiters subscribe to while a fill is in flight.
pub struct BlockCache {
    inner: Mutex<Inner>,
}

struct Inner {
    states: HashMap<Hash, CacheState>,
    order: VecDeque<Hash>,
}

impl BlockCache {
    pub fn new() -> BlockCache {
        BlockCache {
            inner: Mutex::new(Inner {
                states: HashMap::new(),
                order: VecDeque::new(),
            }),
        }
    }

    pub async fn lookup(&self, store: &dyn Store, hash: &Hash) -> CoreResult<Arc<Block>> {
        let mut waiter = None;
        {
            let mut inner = self.inner.lock();
            match inner.states.get(hash) {
                Some(CacheState::Ready(block)) => return Ok(block.clone()),
                Some(CacheState::Filling(tx)) => waiter = Some(tx.subscribe()),
                None => {
                    let (tx, _rx) = broadcast::channel(1);
                    inner.states.insert(*hash, CacheState::Filling(tx));
                }
            }
        }

        if let Some(mut rx) = waiter {
            return match rx.recv().await {
                Ok(Some(block)) => Ok(block),
                _ => Err(CoreError::BlockNotFound),
            };
        }

        let result = store.get_block(hash).map(Arc::new);
        let mut inner = self.inner.lock();
        let sender = match inner.states.remove(hash) {
            Some(CacheState::Filling(tx)) => tx,
            _ => unreachable!("this call registered the Filling state itself"),
        };

        match &result {
            Ok(block) => {
                inner.states.insert(*hash, CacheState::Ready(block.clone()));
                inner.order.push_back(*hash);
                while inner.order.len() > MAX_CACHED_BLOCKS {
                    if let Some(evict) = inner.order.pop_front() {
                        inner.states.remove(&evict);
                    }
                }
                let _ = sender.send(Some(block.clone()));
            }
            Err(_) => {
                let _ = sender.send(None);
            }
        }

        result
    }
}

impl Default for BlockCache {
    fn default() -> Self {
        Self::new()
    }
}

/// In-memory `Store` double for tests — no persistence, no key encoding,
/// just the data plumbing the trait demands.
#[derive(Default)]
pub struct MemStore {
    inner: Mutex<MemStoreInner>,
}

#[derive(Default)]
struct MemStoreInner {
    blocks: HashMap<Hash, Block>,
    utxos: HashMap<Hash, crate::state::UtxoEntry>,
    txs: HashMap<Hash, (Tx, Hash)>,
    evidences: HashMap<Hash, Evidence>,
    status: Option<BlockStoreState>,
}

impl MemStore {
    pub fn new() -> MemStore {
        MemStore::default()
    }

    pub fn put_utxo(&self, hash: Hash, entry: crate::state::UtxoEntry) {
        self.inner.lock().utxos.insert(hash, entry);
    }
}

impl Store for MemStore {
    fn block_exists(&self, hash: &Hash) -> bool {
        self.inner.lock().blocks.contains_key(hash)
    }

    fn get_block(&self, hash: &Hash) -> CoreResult<Block> {
        self.inner
            .lock()
            .blocks
            .get(hash)
            .cloned()
            .ok_or(CoreError::BlockNotFound)
    }

    fn get_store_status(&self) -> CoreResult<BlockStoreState> {
        self.inner
            .lock()
            .status
            .ok_or(CoreError::Corrupt("no chain status saved".into()))
    }

    fn get_transactions_utxo(&self, view: &mut UtxoViewpoint, txs: &[Tx]) -> CoreResult<()> {
        let inner = self.inner.lock();
        for tx in txs {
            for input in &tx.inputs {
                let outpoint = input.value_source.hash();
                if view.has_utxo(&outpoint) {
                    continue;
                }
                if let Some(entry) = inner.utxos.get(&outpoint) {
                    view.entries.insert(outpoint, *entry);
                }
            }
        }
        Ok(())
    }

    fn get_utxo(&self, hash: &Hash) -> CoreResult<crate::state::UtxoEntry> {
        self.inner
            .lock()
            .utxos
            .get(hash)
            .copied()
            .ok_or(CoreError::UtxoNotFound)
    }

    /// Rebuilds the full known block tree from every block this store has
    /// ever accepted, then restores `SetMainChain` up to whichever node is
    /// named by the saved chain status. A real backend walks its
    /// height-keyed block-header index instead of scanning every block.
    fn load_block_index(&self, _best_height: u64) -> CoreResult<BlockIndex> {
        let inner = self.inner.lock();
        let index = BlockIndex::new();

        let mut by_height: Vec<&Block> = inner.blocks.values().collect();
        by_height.sort_by_key(|b| b.header.height);

        let mut nodes: HashMap<Hash, Arc<BlockNode>> = HashMap::new();
        for block in by_height {
            let parent = if block.header.height == 0 {
                None
            } else {
                nodes.get(&block.header.previous).cloned()
            };
            let node = Arc::new(BlockNode::new(&block.header, parent));
            nodes.insert(node.hash, node.clone());
            index.add_node(node);
        }

        if let Some(status) = inner.status {
            if let Some(tip) = nodes.get(&status.hash) {
                index.set_main_chain(tip.clone());
            }
        }

        Ok(index)
    }

    fn save_block(&self, block: &Block) -> CoreResult<()> {
        let mut inner = self.inner.lock();
        let hash = block.hash();
        for tx in &block.transactions {
            inner.txs.insert(tx.hash(), (tx.clone(), hash));
            for evid in &tx.evidences {
                let txid = tx.hash();
                inner.evidences.insert(evid.hash(&txid, 0), evid.clone());
            }
        }
        inner.blocks.insert(hash, block.clone());
        Ok(())
    }

    fn save_chain_status(
        &self,
        node: &crate::state::BlockNode,
        view: &UtxoViewpoint,
    ) -> CoreResult<()> {
        let mut inner = self.inner.lock();
        inner.status = Some(BlockStoreState {
            height: node.height,
            hash: node.hash,
        });
        for (hash, entry) in &view.entries {
            if entry.spent && !entry.is_coinbase {
                inner.utxos.remove(hash);
            } else {
                inner.utxos.insert(*hash, *entry);
            }
        }
        Ok(())
    }

    fn get_transaction(&self, hash: &Hash) -> CoreResult<Tx> {
        self.inner
            .lock()
            .txs
            .get(hash)
            .map(|(tx, _)| tx.clone())
            .ok_or(CoreError::TransactionNotFound)
    }

    fn get_evidence(&self, hash: &Hash) -> CoreResult<Evidence> {
        self.inner
            .lock()
            .evidences
            .get(hash)
            .cloned()
            .ok_or(CoreError::EvidenceNotFound)
    }
}
