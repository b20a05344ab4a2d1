//! Proof-of-work envelope.
//!
//! The original chain represented a block's proof as a dynamically dispatched
//! `Proof` interface so alternative consensus algorithms could be swapped in.
//! This crate only ever carries one variant (scrypt-based PoW), so the
//! interface collapses to a small tagged enum with a dispatch table — the
//! shape stays open for a future variant without touching call sites in
//! `validation` or `chain`. The tagging is in-memory only: spec §3/§6 pin the
//! PoW proof's external byte layout at exactly 16 bytes
//! (`target:u64(LE) ‖ nonce:u64(LE)`), so `bytes`/`from_bytes` carry no
//! discriminant — a future variant would need its own wire-compatible framing
//! decision, not a byte tag bolted onto this one.

use crate::difficulty;
use crate::hash::Hash;
use crate::wire;
use std::io::{self, Write};

/// A block's proof of work: the retarget target and the nonce that satisfies it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Proof {
    Pow { target: u64, nonce: u64 },
}

impl Proof {
    /// `target:u64(LE) ‖ nonce:u64(LE)`, 16 bytes (spec §3/§6).
    pub const ENCODED_SIZE: usize = 16;

    pub fn bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(Self::ENCODED_SIZE);
        match self {
            Proof::Pow { target, nonce } => {
                out.extend_from_slice(&target.to_le_bytes());
                out.extend_from_slice(&nonce.to_le_bytes());
            }
        }
        out
    }

    pub fn from_bytes(buf: &[u8]) -> io::Result<Proof> {
        let mut cur = buf;
        let target = wire::read_u64(&mut cur)?;
        let nonce = wire::read_u64(&mut cur)?;
        Ok(Proof::Pow { target, nonce })
    }

    pub fn encode(&self, w: &mut impl Write) -> io::Result<()> {
        w.write_all(&self.bytes())
    }

    /// Produces the proof a child block should target, given the ancestor
    /// chain needed to retarget (spec §5: retarget every `BLOCKS_PER_RETARGET`
    /// blocks).
    pub fn hint_next_proof(
        &self,
        height: u64,
        last_header_time: u64,
        first_retarget_header_time: u64,
    ) -> Proof {
        match self {
            Proof::Pow { target, .. } => {
                let next_target = difficulty::calc_next_required_difficulty(
                    *target,
                    height,
                    last_header_time,
                    first_retarget_header_time,
                );
                Proof::Pow {
                    target: next_target,
                    nonce: 0,
                }
            }
        }
    }

    /// Validates that this proof actually satisfies its own target, for the
    /// given block content hash.
    pub fn validate(&self, content_hash: &Hash) -> bool {
        match self {
            Proof::Pow { target, nonce } => {
                difficulty::check_proof_of_work(content_hash, *nonce, *target)
            }
        }
    }

    pub fn target(&self) -> u64 {
        match self {
            Proof::Pow { target, .. } => *target,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bytes_roundtrip() {
        let p = Proof::Pow {
            target: 0x00ff_ffff_ffff_ffff,
            nonce: 424242,
        };
        let encoded = p.bytes();
        assert_eq!(encoded.len(), Proof::ENCODED_SIZE);
        let back = Proof::from_bytes(&encoded).unwrap();
        assert_eq!(p, back);
    }

    #[test]
    fn short_buffer_is_rejected() {
        let buf = vec![9u8; Proof::ENCODED_SIZE - 1];
        assert!(Proof::from_bytes(&buf).is_err());
    }
}
