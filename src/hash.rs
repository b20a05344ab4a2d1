//! Content-addressed identifiers. All hashing in this crate is sha3-256;
//! see spec §6 ("Hashing: sha3-256 throughout").

use serde::{Deserialize, Serialize};
use sha3::{Digest, Sha3_256};
use std::fmt;

pub const HASH_SIZE: usize = 32;
pub const HASH160_SIZE: usize = 20;

/// 32-byte content id, textually represented as big-endian hex.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
pub struct Hash(pub [u8; HASH_SIZE]);

impl Hash {
    pub const ZERO: Hash = Hash([0u8; HASH_SIZE]);

    pub fn sha3(data: &[u8]) -> Hash {
        let mut hasher = Sha3_256::new();
        hasher.update(data);
        let out = hasher.finalize();
        let mut b = [0u8; HASH_SIZE];
        b.copy_from_slice(&out);
        Hash(b)
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; HASH_SIZE]
    }

    pub fn bytes(&self) -> &[u8; HASH_SIZE] {
        &self.0
    }

    pub fn from_hex(s: &str) -> Result<Hash, hex::FromHexError> {
        let v = hex::decode(s)?;
        let mut b = [0u8; HASH_SIZE];
        let n = v.len().min(HASH_SIZE);
        b[..n].copy_from_slice(&v[..n]);
        Ok(Hash(b))
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Debug for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash({})", self.to_hex())
    }
}

/// 20-byte script commitment hash (spec §3 TxOut.script_hash).
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
pub struct Hash160(pub [u8; HASH160_SIZE]);

impl Hash160 {
    pub const ZERO: Hash160 = Hash160([0u8; HASH160_SIZE]);

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; HASH160_SIZE]
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for Hash160 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Debug for Hash160 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash160({})", self.to_hex())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sha3_is_deterministic() {
        let a = Hash::sha3(b"hello");
        let b = Hash::sha3(b"hello");
        assert_eq!(a, b);
    }

    #[test]
    fn hex_roundtrip() {
        let h = Hash::sha3(b"round-trip");
        let s = h.to_hex();
        let back = Hash::from_hex(&s).unwrap();
        assert_eq!(h, back);
    }

    #[test]
    fn zero_is_distinguished() {
        assert!(Hash::ZERO.is_zero());
        assert!(!Hash::sha3(b"x").is_zero());
    }
}
