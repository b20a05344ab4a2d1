//! Block and transaction validation.
//!
//! Grounded on `protocol/validation/block.go` and `protocol/validation/tx.go`.
//! The original splits "does this block's proof/header check out" from "is
//! every transaction inside it well-formed and properly funded" into
//! `ValidateBlockHeader`/`ValidateBlock`/`ValidateTx`; this keeps that split.

use crate::block::Block;
use crate::consensus;
use crate::error::{CoreError, CoreResult};
use crate::merkle;
use crate::state::{check_coinbase_amount, BlockNode};
use crate::store::Store;
use crate::tx::Tx;
use std::time::{SystemTime, UNIX_EPOCH};

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before unix epoch")
        .as_secs()
}

/// Checks version, height, parent linkage, timestamp bounds, and the proof
/// itself against the target `parent` hints for the next block (spec §4.6).
pub fn validate_block_header(block: &Block, parent: &BlockNode) -> CoreResult<()> {
    let header = &block.header;

    if header.version < 1 {
        return Err(CoreError::VersionRegression {
            parent: parent.version,
            block: header.version,
        });
    }
    if header.height != parent.height + 1 {
        return Err(CoreError::MisorderedBlockHeight {
            expected: parent.height + 1,
            got: header.height,
        });
    }
    if header.previous != parent.hash {
        return Err(CoreError::MismatchedBlock);
    }

    let earliest = parent.calc_past_median_time();
    let latest = now_secs() + consensus::MAX_TIME_OFFSET_SECONDS;
    if header.timestamp <= earliest || header.timestamp > latest {
        return Err(CoreError::BadTimestamp);
    }

    let expected_target = parent.hint_next_target();
    if header.proof.target() != expected_target {
        return Err(CoreError::BadBits);
    }
    if !header.proof.validate(&block.hash()) {
        return Err(CoreError::BadWork);
    }

    Ok(())
}

/// Full block validation: header, per-tx structure, coinbase conservation,
/// and both merkle roots (spec §4.6).
pub fn validate_block(store: &dyn Store, block: &Block, parent: &BlockNode) -> CoreResult<()> {
    validate_block_header(block, parent)?;

    let mut total_in: u64 = 0;
    let mut total_out: u64 = 0;
    for tx in block.transactions.iter().skip(1) {
        for input in &tx.inputs {
            let source_tx = store.get_transaction(&input.value_source.txid)?;
            let output = source_tx
                .outputs
                .get(input.value_source.index as usize)
                .ok_or(CoreError::UtxoNotFound)?;
            total_in += output.value;
        }
        for output in &tx.outputs {
            total_out += output.value;
        }
    }
    if total_in < total_out {
        return Err(CoreError::NegativeFee);
    }
    let fee = total_in - total_out;

    let subsidy = consensus::block_subsidy(block.header.height);
    check_coinbase_amount(block, subsidy.saturating_add(fee))?;

    for tx in &block.transactions {
        validate_tx(tx, block.header.height)?;
    }

    let computed_tx_root = merkle::tx_merkle_root(&block.transactions);
    if computed_tx_root != block.header.transaction_root {
        return Err(CoreError::MismatchedMerkleRoot);
    }
    let computed_witness_root = merkle::tx_witness_root(&block.transactions);
    if computed_witness_root != block.header.witness_root {
        return Err(CoreError::MismatchedMerkleRoot);
    }

    Ok(())
}

/// Structural checks for a transaction relative to its enclosing block's
/// height (spec §4.7). Evidence scripts are hashed into the witness root,
/// never executed here.
pub fn validate_tx(tx: &Tx, block_height: u64) -> CoreResult<()> {
    if tx.serialized_size() == 0 {
        return Err(CoreError::InvalidTransactionSize);
    }

    if tx.lock_time != 0 && tx.lock_time >= block_height {
        return Err(CoreError::BadLockTime);
    }

    for input in &tx.inputs {
        if input.value_source.txid.is_zero() {
            return Err(CoreError::EmptyInputIDs);
        }
        if input.redeem_script.is_empty() || input.unlock_script.is_empty() {
            return Err(CoreError::MissingField("input script"));
        }
    }

    if tx.outputs.is_empty() {
        return Err(CoreError::MissingField("outputs"));
    }
    for output in &tx.outputs {
        if output.script_hash.is_zero() {
            return Err(CoreError::EmptyScriptHash);
        }
    }

    Ok(())
}
