//! PoW target accounting: chain work, retargeting and the proof check
//! itself.
//!
//! Hashing uses `scrypt` the way `algorithms::yescrypt` hashes mining input:
//! header bytes are salted with themselves and fed through scrypt with fixed
//! parameters, producing a 32-byte digest. The parameters here
//! (`N=1024, r=1, p=1`) are deliberately lighter than the teacher's mining
//! defaults (`N=4096, r=8, p=1`) since this crate only verifies proofs, never
//! mines them, and a verification-only workload does not need the teacher's
//! anti-ASIC memory budget.

use crate::hash::Hash;
use num_bigint::BigUint;
use scrypt::{scrypt, Params as ScryptParams};

pub const BLOCKS_PER_RETARGET: u64 = 2016;
pub const TARGET_SECONDS_PER_BLOCK: u64 = 150;
pub const TARGET_TIMESPAN: u64 = BLOCKS_PER_RETARGET * TARGET_SECONDS_PER_BLOCK;

const SCRYPT_LOG_N: u8 = 10; // log2(1024)
const SCRYPT_R: u32 = 1;
const SCRYPT_P: u32 = 1;

/// Scrypt-hash of a block content hash salted with nonce, used both to mine
/// and to verify. Returns the digest interpreted as a big-endian u64 from its
/// first 8 bytes, which is what gets compared against the target.
fn pow_digest(content_hash: &Hash, nonce: u64) -> [u8; 32] {
    let mut input = content_hash.bytes().to_vec();
    input.extend_from_slice(&nonce.to_le_bytes());

    let params = ScryptParams::new(SCRYPT_LOG_N, SCRYPT_R, SCRYPT_P, 32)
        .expect("fixed scrypt parameters are always valid");

    let mut out = [0u8; 32];
    scrypt(&input, content_hash.bytes(), &params, &mut out)
        .expect("fixed-length scrypt output buffer always succeeds");
    out
}

fn digest_leading_u64(digest: &[u8; 32]) -> u64 {
    let mut b = [0u8; 8];
    b.copy_from_slice(&digest[..8]);
    u64::from_be_bytes(b)
}

/// True if the scrypt digest of `(content_hash, nonce)` is at or below `target`.
pub fn check_proof_of_work(content_hash: &Hash, nonce: u64, target: u64) -> bool {
    digest_leading_u64(&pow_digest(content_hash, nonce)) <= target
}

/// Chain work contributed by a block with the given target. Smaller targets
/// represent harder-to-find proofs and therefore more work; this is the
/// quantity accumulated along a chain to pick the best tip.
pub fn work(target: u64) -> BigUint {
    let denom = BigUint::from(target.saturating_add(1));
    (BigUint::from(u64::MAX) + BigUint::from(1u8)) / denom
}

/// Bitcoin-style retarget: every `BLOCKS_PER_RETARGET` blocks, scale the
/// previous target by `actual_timespan / TARGET_TIMESPAN`, clamped to
/// [1/4x, 4x] of the previous target so a single retarget step cannot move
/// difficulty more than 4x in either direction.
///
/// `height` is the height of the block this target will apply to;
/// `last_header_time` is the timestamp of its immediate parent,
/// `first_retarget_header_time` is the timestamp of the block
/// `BLOCKS_PER_RETARGET` heights back from the parent (the start of the
/// window being closed out).
pub fn calc_next_required_difficulty(
    previous_target: u64,
    height: u64,
    last_header_time: u64,
    first_retarget_header_time: u64,
) -> u64 {
    if height % BLOCKS_PER_RETARGET != 0 {
        return previous_target;
    }

    let actual_timespan = last_header_time.saturating_sub(first_retarget_header_time);
    let clamped = actual_timespan
        .max(TARGET_TIMESPAN / 4)
        .min(TARGET_TIMESPAN * 4);

    let scaled = (previous_target as u128 * clamped as u128) / TARGET_TIMESPAN as u128;
    scaled.min(u64::MAX as u128) as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn work_is_monotone_in_target() {
        let small_target = work(1000);
        let large_target = work(2_000_000);
        assert!(small_target > large_target);
    }

    #[test]
    fn retarget_only_fires_on_boundary() {
        let t = calc_next_required_difficulty(1_000_000, 2015, 1000, 0);
        assert_eq!(t, 1_000_000);
    }

    #[test]
    fn retarget_clamps_to_quarter_and_quadruple() {
        // actual timespan way under target: clamp to 1/4 window, target shrinks to 1/4.
        let shrunk = calc_next_required_difficulty(1_000_000, BLOCKS_PER_RETARGET, 1, 0);
        assert_eq!(shrunk, 250_000);

        // actual timespan way over target: clamp to 4x window, target grows to 4x.
        let grown = calc_next_required_difficulty(
            1_000_000,
            BLOCKS_PER_RETARGET,
            TARGET_TIMESPAN * 100,
            0,
        );
        assert_eq!(grown, 4_000_000);
    }

    #[test]
    fn proof_check_is_deterministic() {
        let h = Hash::sha3(b"block-content");
        let a = check_proof_of_work(&h, 7, u64::MAX);
        let b = check_proof_of_work(&h, 7, u64::MAX);
        assert_eq!(a, b);
        assert!(a, "target u64::MAX accepts any digest");
    }

    #[test]
    fn proof_check_rejects_too_small_target() {
        let h = Hash::sha3(b"block-content");
        assert!(!check_proof_of_work(&h, 7, 0));
    }
}
