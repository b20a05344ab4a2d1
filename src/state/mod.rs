//! In-memory chain state: the block index tree and UTXO viewpoint staging.
//!
//! Split out of the teacher's single `state::Inner` god-struct (which bundled
//! storage, mempool, and p2p concerns together) into the two pieces this
//! crate's scope actually calls for; the `Arc<RwLock<..>>` plus
//! `tokio::sync::broadcast` idiom that struct used for notifying watchers is
//! reused in `chain.rs`, which is where the rest of `Inner`'s responsibility
//! (tip tracking, locking around block application) lands here.

pub mod block_index;
pub mod utxo;

pub use block_index::{BlockIndex, BlockNode};
pub use utxo::{check_coinbase_amount, UtxoEntry, UtxoViewpoint};
