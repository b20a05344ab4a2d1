//! Chain-wide consensus constants and the coinbase subsidy schedule.
//!
//! Values are carried over verbatim from `consensus.General` in the original
//! implementation (spec §8's constants table).

/// Number of blocks a coinbase output must age before it can be spent.
pub const COINBASE_PENDING_BLOCK_NUMBER: u64 = 100;

/// Height interval at which the coinbase subsidy is halved.
pub const SUBSIDY_REDUCTION_INTERVAL: u64 = 840_000;

/// Subsidy paid per block once halving begins, before any halvings.
pub const BASE_SUBSIDY: u64 = 41_250_000_000;

/// One-time subsidy paid to the genesis coinbase.
pub const INITIAL_BLOCK_SUBSIDY: u64 = 140_700_041_250_000_000;

/// Maximum number of seconds a block's timestamp may be ahead of local time.
pub const MAX_TIME_OFFSET_SECONDS: u64 = 60 * 60;

/// Number of preceding blocks averaged to compute a node's past median time.
pub const MEDIAN_TIME_BLOCKS: usize = 11;

pub const COINBASE_ARBITRARY_SIZE_LIMIT: usize = 128;

/// Coinbase reward due at `height`, per the halving schedule.
pub fn block_subsidy(height: u64) -> u64 {
    if height == 0 {
        return INITIAL_BLOCK_SUBSIDY;
    }
    BASE_SUBSIDY >> (height / SUBSIDY_REDUCTION_INTERVAL)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn genesis_gets_initial_subsidy() {
        assert_eq!(block_subsidy(0), INITIAL_BLOCK_SUBSIDY);
    }

    #[test]
    fn subsidy_halves_on_schedule() {
        let first = block_subsidy(1);
        let after_one_halving = block_subsidy(SUBSIDY_REDUCTION_INTERVAL);
        assert_eq!(first, BASE_SUBSIDY);
        assert_eq!(after_one_halving, BASE_SUBSIDY >> 1);
    }
}
