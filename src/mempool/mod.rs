//! The unconfirmed-transaction pool: accepted transactions, an outpoint
//! overlay, and an orphan side-pool keyed by missing parent txid.
//!
//! Split out of the teacher's fee-market-oriented `Mempool` (which tracked a
//! byte budget and evicted by fee rate — a policy this spec never asks for)
//! into the orphan-tracking pool spec §4.5 actually describes, grounded on
//! `protocol/txpool.go`.

pub mod pool;

pub use pool::{MempoolError, Outcome, OrphanTx, TxDesc, TxPool};
