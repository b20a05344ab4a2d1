//! Narrow publish interface for mempool and chain-tip notifications.
//!
//! The original dispatches through a general-purpose pub/sub bus
//! (`event.Dispatcher`); this crate only ever has two event families, so it
//! follows the teacher's own `state::Inner` pattern instead — one
//! `tokio::sync::broadcast` channel per event family, subscribed to directly.

use crate::hash::Hash;
use crate::mempool::TxDesc;
use tokio::sync::broadcast;

#[derive(Debug, Clone)]
pub enum TxMsgEvent {
    NewTx(TxDesc),
    RemoveTx(TxDesc),
}

#[derive(Debug, Clone, Copy)]
pub struct NewMinedBlockEvent {
    pub height: u64,
    pub hash: Hash,
}

/// Broadcasts mempool and new-block events to whoever is listening.
/// Publishing never blocks on subscriber backpressure: `broadcast::Sender`
/// drops the message for lagging subscribers rather than stalling the
/// publisher, which matches this crate's event semantics (best-effort
/// notification, not a durable log).
pub struct Dispatcher {
    tx: broadcast::Sender<TxMsgEvent>,
    block: broadcast::Sender<NewMinedBlockEvent>,
}

const CHANNEL_CAPACITY: usize = 1024;

impl Dispatcher {
    pub fn new() -> Dispatcher {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        let (block, _) = broadcast::channel(CHANNEL_CAPACITY);
        Dispatcher { tx, block }
    }

    pub fn subscribe_tx(&self) -> broadcast::Receiver<TxMsgEvent> {
        self.tx.subscribe()
    }

    pub fn subscribe_blocks(&self) -> broadcast::Receiver<NewMinedBlockEvent> {
        self.block.subscribe()
    }

    pub fn publish_tx(&self, event: TxMsgEvent) {
        let _ = self.tx.send(event);
    }

    pub fn publish_block(&self, event: NewMinedBlockEvent) {
        let _ = self.block.send(event);
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}
